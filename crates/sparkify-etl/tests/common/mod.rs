//! Common fixtures for Sparkify loader integration tests
//!
//! Builds song and log data trees in a temporary directory, laid out the
//! way the real dataset is (`song_data/A/B/C/TRxxx.json`,
//! `log_data/2018/11/2018-11-dd-events.json`).

#![allow(dead_code)]

use anyhow::{Context, Result};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Initialize tracing for tests
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,sparkify_etl=debug")),
        )
        .with_test_writer()
        .try_init();
}

/// A temporary song_data/log_data tree
pub struct Dataset {
    dir: TempDir,
}

impl Dataset {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp dir")?;
        Ok(Self { dir })
    }

    pub fn song_root(&self) -> PathBuf {
        self.dir.path().join("song_data")
    }

    pub fn log_root(&self) -> PathBuf {
        self.dir.path().join("log_data")
    }

    /// Write one song file at `song_data/<relative>`
    pub fn add_song(&self, relative: &str, song: &SongFixture) -> Result<PathBuf> {
        write_lines(&self.song_root().join(relative), &[song.to_json()])
    }

    /// Write raw lines at `song_data/<relative>`
    pub fn add_song_lines(&self, relative: &str, lines: &[String]) -> Result<PathBuf> {
        write_lines(&self.song_root().join(relative), lines)
    }

    /// Write one log file at `log_data/<relative>`
    pub fn add_log(&self, relative: &str, events: &[EventFixture]) -> Result<PathBuf> {
        let lines: Vec<String> = events.iter().map(EventFixture::to_json).collect();
        write_lines(&self.log_root().join(relative), &lines)
    }
}

fn write_lines(path: &Path, lines: &[String]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let mut content = lines.join("\n");
    content.push('\n');
    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// One song metadata record
#[derive(Debug, Clone)]
pub struct SongFixture {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub artist_name: String,
    pub year: i32,
    pub duration: f64,
}

impl SongFixture {
    pub fn new(song_id: &str, title: &str, artist_id: &str, artist_name: &str, duration: f64) -> Self {
        Self {
            song_id: song_id.to_string(),
            title: title.to_string(),
            artist_id: artist_id.to_string(),
            artist_name: artist_name.to_string(),
            year: 0,
            duration,
        }
    }

    /// "Girl In The Village" by Bitter:Sweet
    pub fn girl_in_the_village() -> Self {
        Self::new(
            "SOSVGKG12AB0184039",
            "Girl In The Village",
            "ARQTC121187FB3B0A4",
            "Bitter:Sweet",
            175.0,
        )
    }

    pub fn to_json(&self) -> String {
        json!({
            "num_songs": 1,
            "artist_id": self.artist_id,
            "artist_latitude": null,
            "artist_longitude": null,
            "artist_location": "",
            "artist_name": self.artist_name,
            "song_id": self.song_id,
            "title": self.title,
            "duration": self.duration,
            "year": self.year,
        })
        .to_string()
    }
}

/// One listening-session event
#[derive(Debug, Clone)]
pub struct EventFixture {
    pub page: String,
    pub user_id: String,
    pub ts: i64,
    pub session_id: i64,
    pub level: String,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub length: Option<f64>,
}

impl EventFixture {
    /// A "NextSong" event with no song details
    pub fn played(user_id: &str, ts: i64, session_id: i64) -> Self {
        Self {
            page: "NextSong".to_string(),
            user_id: user_id.to_string(),
            ts,
            session_id,
            level: "free".to_string(),
            song: None,
            artist: None,
            length: None,
        }
    }

    pub fn page(mut self, page: &str) -> Self {
        self.page = page.to_string();
        self
    }

    pub fn level(mut self, level: &str) -> Self {
        self.level = level.to_string();
        self
    }

    pub fn song(mut self, title: &str, artist: &str, length: f64) -> Self {
        self.song = Some(title.to_string());
        self.artist = Some(artist.to_string());
        self.length = Some(length);
        self
    }

    pub fn to_json(&self) -> String {
        json!({
            "artist": self.artist,
            "auth": "Logged In",
            "firstName": "Lily",
            "gender": "F",
            "itemInSession": 0,
            "lastName": "Koch",
            "length": self.length,
            "level": self.level,
            "location": "Chicago-Naperville-Elgin, IL-IN-WI",
            "method": "PUT",
            "page": self.page,
            "registration": 1541048010796.0,
            "sessionId": self.session_id,
            "song": self.song,
            "status": 200,
            "ts": self.ts,
            "userAgent": "\"Mozilla/5.0 (X11; Linux x86_64)\"",
            "userId": self.user_id,
        })
        .to_string()
    }
}
