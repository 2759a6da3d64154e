//! Reference resolution for songplays
//!
//! Attaches song_id/artist_id to songplay candidates by left-joining them
//! against the songs ⋈ artists reference set on (title, artist name,
//! duration). Candidates without a match keep null keys and are still
//! loaded.

use std::collections::HashMap;
use tracing::debug;

use crate::error::{EtlError, Result};
use crate::models::{ReferenceSong, SongPlay};
use crate::queries::REFERENCE_SELECT;
use crate::storage::{ResultTable, StorageSession};
use crate::transform::PlayCandidate;

/// How durations are compared when matching
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum DurationMatch {
    /// Bit-for-bit `f64` equality
    #[default]
    Exact,
    /// `|duration - length| <= tolerance`
    Tolerance(f64),
}

impl DurationMatch {
    pub fn from_tolerance(tolerance: Option<f64>) -> Self {
        tolerance.map_or(DurationMatch::Exact, DurationMatch::Tolerance)
    }

    fn matches(&self, duration: f64, length: f64) -> bool {
        match self {
            DurationMatch::Exact => duration == length,
            DurationMatch::Tolerance(tolerance) => (duration - length).abs() <= *tolerance,
        }
    }
}

/// Reference songs indexed by (title, artist name)
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    by_title_artist: HashMap<(String, String), Vec<ReferenceSong>>,
    len: usize,
}

impl ReferenceIndex {
    /// Build an index; candidates sharing a (title, artist) keep the input
    /// order, which decides ties.
    pub fn new(songs: Vec<ReferenceSong>) -> Self {
        let len = songs.len();
        let mut by_title_artist: HashMap<(String, String), Vec<ReferenceSong>> = HashMap::new();
        for song in songs {
            by_title_artist
                .entry((song.title.clone(), song.artist_name.clone()))
                .or_default()
                .push(song);
        }
        Self {
            by_title_artist,
            len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Reference song matching the triple, if any. Under a tolerance the
    /// closest duration wins; equal distances fall back to input order.
    pub fn lookup(
        &self,
        title: &str,
        artist_name: &str,
        length: f64,
        mode: DurationMatch,
    ) -> Option<&ReferenceSong> {
        self.by_title_artist
            .get(&(title.to_string(), artist_name.to_string()))?
            .iter()
            .filter(|song| mode.matches(song.duration, length))
            .min_by(|a, b| {
                (a.duration - length)
                    .abs()
                    .total_cmp(&(b.duration - length).abs())
            })
    }
}

/// Fetch the current reference set from the engine
pub async fn fetch_reference<S>(session: &mut S) -> Result<ReferenceIndex>
where
    S: StorageSession + ?Sized,
{
    let table = session.query(&REFERENCE_SELECT).await?;
    let songs = reference_songs(&table)?;
    debug!(rows = songs.len(), "Fetched reference songs");
    Ok(ReferenceIndex::new(songs))
}

/// Decode the rows of a reference query
pub fn reference_songs(table: &ResultTable) -> Result<Vec<ReferenceSong>> {
    let column = |name: &str| {
        table
            .column_index(name)
            .ok_or_else(|| EtlError::Storage(format!("reference query lacks column '{}'", name)))
    };
    let song_id = column("song_id")?;
    let artist_id = column("artist_id")?;
    let title = column("title")?;
    let artist_name = column("artist_name")?;
    let duration = column("duration")?;

    let mut songs = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let text = |idx: usize| row.get(idx).and_then(|v| v.as_str()).map(str::to_string);
        // Rows with null keys or duration can never match a log event
        let (Some(song_id), Some(artist_id), Some(title), Some(artist_name), Some(duration)) = (
            text(song_id),
            text(artist_id),
            text(title),
            text(artist_name),
            row.get(duration).and_then(|v| v.as_f64()),
        ) else {
            continue;
        };
        songs.push(ReferenceSong {
            song_id,
            artist_id,
            title,
            artist_name,
            duration,
        });
    }
    Ok(songs)
}

/// Left-join candidates against the index; every candidate yields one play
pub fn resolve_plays(
    candidates: Vec<PlayCandidate>,
    index: &ReferenceIndex,
    mode: DurationMatch,
) -> Vec<SongPlay> {
    candidates
        .into_iter()
        .map(|candidate| {
            let reference = match (&candidate.song, &candidate.artist, candidate.length) {
                (Some(song), Some(artist), Some(length)) => index.lookup(song, artist, length, mode),
                _ => None,
            };

            SongPlay {
                start_time: candidate.start_time,
                user_id: candidate.user_id,
                level: candidate.level,
                song_id: reference.map(|r| r.song_id.clone()),
                artist_id: reference.map(|r| r.artist_id.clone()),
                session_id: candidate.session_id,
                location: candidate.location,
                user_agent: candidate.user_agent,
            }
        })
        .collect()
}
