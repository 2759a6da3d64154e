//! Record extraction
//!
//! Parses one newline-delimited JSON file into typed rows. Song files yield
//! a song and an artist row from their first record; log files yield the
//! "track played" events, everything else being dropped before any further
//! processing.

use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{EtlError, Result};
use crate::models::{Artist, LogEvent, LogRecord, Song, SongRecord, UserIdField};

/// Rows extracted from one song file
#[derive(Debug, Clone)]
pub struct SongFile {
    pub path: PathBuf,
    pub song: Song,
    pub artist: Artist,
    /// Records after the first; song files are expected to hold one
    pub ignored_records: usize,
}

/// Rows extracted from one log file
#[derive(Debug, Clone)]
pub struct LogFile {
    pub path: PathBuf,
    /// Events whose page matched the filter, in file order
    pub events: Vec<LogEvent>,
    /// Records discarded by the page filter
    pub filtered_out: usize,
}

/// Read every non-blank line of `path` as a JSON object of type `T`,
/// returning `(line_number, record)` pairs.
pub fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<(usize, T)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let number = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record = serde_json::from_str(trimmed).map_err(|e| EtlError::Parse {
            path: path.to_path_buf(),
            line: number,
            message: e.to_string(),
        })?;
        records.push((number, record));
    }

    Ok(records)
}

/// Extract the song and artist rows of a song file
pub fn extract_song_file(path: &Path) -> Result<SongFile> {
    let records = read_json_lines::<SongRecord>(path)?;
    let total = records.len();

    let (line, record) = records.into_iter().next().ok_or_else(|| EtlError::EmptyFile {
        path: path.to_path_buf(),
    })?;

    let fields = Fields { path, line };

    let song = Song {
        song_id: fields.required("song_id", record.song_id)?,
        title: fields.required("title", record.title)?,
        artist_id: fields.required("artist_id", record.artist_id.clone())?,
        year: fields.required("year", record.year)?,
        duration: fields.required("duration", record.duration)?,
    };

    let artist = Artist {
        artist_id: fields.required("artist_id", record.artist_id)?,
        name: fields.required("artist_name", record.artist_name)?,
        location: record.artist_location,
        latitude: record.artist_latitude,
        longitude: record.artist_longitude,
    };

    debug!(path = %path.display(), song_id = %song.song_id, "Extracted song record");

    Ok(SongFile {
        path: path.to_path_buf(),
        song,
        artist,
        ignored_records: total - 1,
    })
}

/// Extract the events of a log file whose `page` equals `played_page`
pub fn extract_log_file(path: &Path, played_page: &str) -> Result<LogFile> {
    let records = read_json_lines::<LogRecord>(path)?;
    let total = records.len();

    let mut events = Vec::new();
    for (line, record) in records {
        if record.page.as_deref() != Some(played_page) {
            continue;
        }
        events.push(to_event(Fields { path, line }, record)?);
    }

    debug!(
        path = %path.display(),
        kept = events.len(),
        total,
        "Extracted log events"
    );

    Ok(LogFile {
        path: path.to_path_buf(),
        filtered_out: total - events.len(),
        events,
    })
}

fn to_event(fields: Fields<'_>, record: LogRecord) -> Result<LogEvent> {
    let user_id = match fields.required("userId", record.user_id)? {
        UserIdField::Number(n) => fields.to_i32("userId", n)?,
        UserIdField::Text(s) => {
            let n = s.trim().parse::<i64>().map_err(|e| fields.invalid("userId", e))?;
            fields.to_i32("userId", n)?
        },
    };

    let session_id = fields.required("sessionId", record.session_id)?;

    Ok(LogEvent {
        line: fields.line,
        ts: fields.required("ts", record.ts)?,
        user_id,
        first_name: fields.required("firstName", record.first_name)?,
        last_name: fields.required("lastName", record.last_name)?,
        gender: record.gender,
        level: fields.required("level", record.level)?,
        song: record.song,
        artist: record.artist,
        length: record.length,
        session_id: fields.to_i32("sessionId", session_id)?,
        location: record.location,
        user_agent: record.user_agent,
        page: fields.required("page", record.page)?,
    })
}

/// Error context for the fields of one source line
#[derive(Clone, Copy)]
struct Fields<'a> {
    path: &'a Path,
    line: usize,
}

impl Fields<'_> {
    fn required<T>(&self, field: &'static str, value: Option<T>) -> Result<T> {
        value.ok_or_else(|| EtlError::MissingField {
            path: self.path.to_path_buf(),
            line: self.line,
            field,
        })
    }

    fn invalid(&self, field: &'static str, message: impl std::fmt::Display) -> EtlError {
        EtlError::InvalidField {
            path: self.path.to_path_buf(),
            line: self.line,
            field,
            message: message.to_string(),
        }
    }

    fn to_i32(&self, field: &'static str, value: i64) -> Result<i32> {
        i32::try_from(value).map_err(|e| self.invalid(field, e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_lines(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file
    }

    const SONG: &str = r#"{"num_songs": 1, "artist_id": "ARQTC121187FB3B0A4", "artist_latitude": null, "artist_longitude": null, "artist_location": "", "artist_name": "Bitter:Sweet", "song_id": "SOSVGKG12AB0184039", "title": "Girl In The Village", "duration": 175.0, "year": 0}"#;

    fn log_line(page: &str, user: &str, ts: i64) -> String {
        format!(
            r#"{{"artist":"Des'ree","auth":"Logged In","firstName":"Kaylee","gender":"F","itemInSession":1,"lastName":"Summers","length":246.30812,"level":"free","location":"Phoenix-Mesa-Scottsdale, AZ","method":"PUT","page":"{}","registration":1540344794796.0,"sessionId":139,"song":"You Gotta Be","status":200,"ts":{},"userAgent":"Mozilla\/5.0","userId":{}}}"#,
            page, ts, user
        )
    }

    #[test]
    fn test_extract_song_file() {
        let file = write_lines(&[SONG]);
        let extracted = extract_song_file(file.path()).unwrap();

        assert_eq!(extracted.song.song_id, "SOSVGKG12AB0184039");
        assert_eq!(extracted.song.title, "Girl In The Village");
        assert_eq!(extracted.song.artist_id, "ARQTC121187FB3B0A4");
        assert_eq!(extracted.song.year, 0);
        assert_eq!(extracted.song.duration, 175.0);
        assert_eq!(extracted.artist.artist_id, "ARQTC121187FB3B0A4");
        assert_eq!(extracted.artist.name, "Bitter:Sweet");
        assert_eq!(extracted.artist.location.as_deref(), Some(""));
        assert_eq!(extracted.artist.latitude, None);
        assert_eq!(extracted.ignored_records, 0);
    }

    #[test]
    fn test_song_file_uses_first_record_only() {
        let file = write_lines(&[SONG, &SONG.replace("SOSVGKG12AB0184039", "SOOTHER")]);
        let extracted = extract_song_file(file.path()).unwrap();
        assert_eq!(extracted.song.song_id, "SOSVGKG12AB0184039");
        assert_eq!(extracted.ignored_records, 1);
    }

    #[test]
    fn test_song_file_missing_field() {
        let file = write_lines(&[&SONG.replace(r#""title": "Girl In The Village", "#, "")]);
        let err = extract_song_file(file.path()).unwrap_err();
        assert!(matches!(err, EtlError::MissingField { field: "title", line: 1, .. }));
    }

    #[test]
    fn test_empty_song_file() {
        let file = write_lines(&[]);
        let err = extract_song_file(file.path()).unwrap_err();
        assert!(matches!(err, EtlError::EmptyFile { .. }));
    }

    #[test]
    fn test_malformed_json_reports_line() {
        let file = write_lines(&[&log_line("NextSong", "\"8\"", 1), "{not json"]);
        let err = extract_log_file(file.path(), "NextSong").unwrap_err();
        assert!(matches!(err, EtlError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_log_filter_keeps_only_played_events() {
        let file = write_lines(&[
            &log_line("Home", "\"8\"", 1541105830796),
            &log_line("NextSong", "\"8\"", 1541106106796),
            "",
            &log_line("Logout", "\"\"", 1541106106797),
            &log_line("NextSong", "26", 1541106132796),
        ]);

        let extracted = extract_log_file(file.path(), "NextSong").unwrap();

        assert_eq!(extracted.events.len(), 2);
        assert_eq!(extracted.filtered_out, 2);
        assert!(extracted.events.iter().all(|e| e.page == "NextSong"));
        assert_eq!(extracted.events[0].user_id, 8);
        assert_eq!(extracted.events[0].line, 2);
        assert_eq!(extracted.events[1].user_id, 26);
        assert_eq!(extracted.events[1].line, 5);
        assert_eq!(extracted.events[1].length, Some(246.30812));
    }

    #[test]
    fn test_played_event_with_blank_user_id_is_invalid() {
        let file = write_lines(&[&log_line("NextSong", "\"\"", 1)]);
        let err = extract_log_file(file.path(), "NextSong").unwrap_err();
        assert!(matches!(err, EtlError::InvalidField { field: "userId", .. }));
    }
}
