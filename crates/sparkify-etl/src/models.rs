// Data models for song metadata, listening logs and destination rows

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::storage::{SqlValue, ToSqlValues};

// ============================================================================
// Source records (one JSON object per line)
// ============================================================================

/// Raw song metadata record. Fields are optional so that missing values are
/// reported by name instead of as a generic deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongRecord {
    pub num_songs: Option<i64>,
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub year: Option<i32>,
    pub duration: Option<f64>,
    pub artist_name: Option<String>,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
}

/// Raw listening-session event. Only the fields the loader uses are
/// declared; everything else in the line is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub artist: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub length: Option<f64>,
    pub level: Option<String>,
    pub location: Option<String>,
    pub page: Option<String>,
    pub session_id: Option<i64>,
    pub song: Option<String>,
    pub ts: Option<i64>,
    pub user_agent: Option<String>,
    pub user_id: Option<UserIdField>,
}

/// `userId` appears both as a JSON string ("39") and as a number, and is an
/// empty string for logged-out events.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum UserIdField {
    Number(i64),
    Text(String),
}

// ============================================================================
// Extracted rows
// ============================================================================

/// A "track played" event that passed the page filter
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    /// 1-based line number in the source file
    pub line: usize,
    pub ts: i64,
    pub user_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub gender: Option<String>,
    pub level: String,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub length: Option<f64>,
    pub session_id: i32,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    pub page: String,
}

// ============================================================================
// Destination rows
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    pub song_id: String,
    pub title: String,
    pub artist_id: String,
    pub year: i32,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Artist {
    pub artist_id: String,
    pub name: String,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
    pub user_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub gender: Option<String>,
    pub level: String,
}

/// Calendar decomposition of one observed instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeBucket {
    pub start_time: NaiveDateTime,
    pub hour: i32,
    pub day: i32,
    /// ISO-8601 week of year
    pub week: i32,
    pub month: i32,
    pub year: i32,
    /// Monday = 0 .. Sunday = 6
    pub weekday: i32,
}

/// A songplay fact row. song_id/artist_id are `None` when the event did not
/// match any reference song.
#[derive(Debug, Clone, PartialEq)]
pub struct SongPlay {
    pub start_time: NaiveDateTime,
    pub user_id: i32,
    pub level: String,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: i32,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

impl SongPlay {
    /// Natural key enforced unique by the songplays table
    pub fn natural_key(&self) -> (NaiveDateTime, i32, i32) {
        (self.start_time, self.user_id, self.session_id)
    }
}

/// One row of the songs ⋈ artists reference set
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSong {
    pub song_id: String,
    pub artist_id: String,
    pub title: String,
    pub artist_name: String,
    pub duration: f64,
}

// ============================================================================
// Column mappings
// ============================================================================

impl ToSqlValues for Song {
    fn to_sql_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(&self.song_id),
            SqlValue::from(&self.title),
            SqlValue::from(&self.artist_id),
            SqlValue::from(self.year),
            SqlValue::from(self.duration),
        ]
    }
}

impl ToSqlValues for Artist {
    fn to_sql_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(&self.artist_id),
            SqlValue::from(&self.name),
            SqlValue::from(&self.location),
            SqlValue::from(self.latitude),
            SqlValue::from(self.longitude),
        ]
    }
}

impl ToSqlValues for User {
    fn to_sql_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.user_id),
            SqlValue::from(&self.first_name),
            SqlValue::from(&self.last_name),
            SqlValue::from(&self.gender),
            SqlValue::from(&self.level),
        ]
    }
}

impl ToSqlValues for TimeBucket {
    fn to_sql_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.start_time),
            SqlValue::from(self.hour),
            SqlValue::from(self.day),
            SqlValue::from(self.week),
            SqlValue::from(self.month),
            SqlValue::from(self.year),
            SqlValue::from(self.weekday),
        ]
    }
}

impl ToSqlValues for SongPlay {
    fn to_sql_values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::from(self.start_time),
            SqlValue::from(self.user_id),
            SqlValue::from(&self.level),
            SqlValue::from(&self.song_id),
            SqlValue::from(&self.artist_id),
            SqlValue::from(self.session_id),
            SqlValue::from(&self.location),
            SqlValue::from(&self.user_agent),
        ]
    }
}
