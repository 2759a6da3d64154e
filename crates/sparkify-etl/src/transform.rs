//! Field transformation for log events
//!
//! Converts epoch-millisecond timestamps, derives the calendar fields of the
//! time table and projects events onto the users and songplays column sets.
//! Exact-duplicate time rows are dropped here, first occurrence wins, so
//! output order follows the source file. Users collapse to one row per
//! user_id carrying the latest observation in the file.

use chrono::{DateTime, Datelike, NaiveDateTime, Timelike};
use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use crate::error::{EtlError, Result};
use crate::extract::LogFile;
use crate::models::{LogEvent, TimeBucket, User};

/// A songplay before its song/artist keys are resolved
#[derive(Debug, Clone, PartialEq)]
pub struct PlayCandidate {
    pub start_time: NaiveDateTime,
    pub user_id: i32,
    pub level: String,
    pub session_id: i32,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    /// Match triple against the reference set
    pub song: Option<String>,
    pub artist: Option<String>,
    pub length: Option<f64>,
}

/// Destination tables derived from one log file
#[derive(Debug, Clone, Default)]
pub struct LogTables {
    pub time_buckets: Vec<TimeBucket>,
    pub users: Vec<User>,
    pub plays: Vec<PlayCandidate>,
}

/// Epoch milliseconds to a UTC timestamp without zone
pub fn timestamp_from_millis(ms: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.naive_utc())
}

impl TimeBucket {
    /// Derive every calendar field from `start_time`
    pub fn from_start_time(start_time: NaiveDateTime) -> Self {
        Self {
            start_time,
            hour: start_time.hour() as i32,
            day: start_time.day() as i32,
            week: start_time.iso_week().week() as i32,
            month: start_time.month() as i32,
            year: start_time.year(),
            weekday: start_time.weekday().num_days_from_monday() as i32,
        }
    }
}

/// Build the time, users and songplay-candidate tables of a log file
pub fn transform_log(file: &LogFile) -> Result<LogTables> {
    let mut time_buckets = Vec::with_capacity(file.events.len());
    let mut users = Vec::with_capacity(file.events.len());
    let mut plays = Vec::with_capacity(file.events.len());

    for event in &file.events {
        let start_time = timestamp_from_millis(event.ts).ok_or_else(|| EtlError::InvalidField {
            path: file.path.clone(),
            line: event.line,
            field: "ts",
            message: format!("{} is outside the representable range", event.ts),
        })?;

        time_buckets.push(TimeBucket::from_start_time(start_time));
        users.push(project_user(event));
        plays.push(project_play(event, start_time));
    }

    Ok(LogTables {
        time_buckets: dedup_preserving_order(time_buckets),
        users: latest_per_key(users, |user| user.user_id),
        plays,
    })
}

fn project_user(event: &LogEvent) -> User {
    User {
        user_id: event.user_id,
        first_name: event.first_name.clone(),
        last_name: event.last_name.clone(),
        gender: event.gender.clone(),
        level: event.level.clone(),
    }
}

fn project_play(event: &LogEvent, start_time: NaiveDateTime) -> PlayCandidate {
    PlayCandidate {
        start_time,
        user_id: event.user_id,
        level: event.level.clone(),
        session_id: event.session_id,
        location: event.location.clone(),
        user_agent: event.user_agent.clone(),
        song: event.song.clone(),
        artist: event.artist.clone(),
        length: event.length,
    }
}

/// One row per key: the position of its first occurrence, the value of its last
pub fn latest_per_key<T, K, F>(rows: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut slots: HashMap<K, usize> = HashMap::with_capacity(rows.len());
    let mut latest: Vec<T> = Vec::with_capacity(rows.len());
    for row in rows {
        match slots.get(&key(&row)) {
            Some(&slot) => latest[slot] = row,
            None => {
                slots.insert(key(&row), latest.len());
                latest.push(row);
            }
        }
    }
    latest
}

/// Drop exact duplicates, keeping the first occurrence of each row
pub fn dedup_preserving_order<T: Clone + Eq + Hash>(rows: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter().filter(|row| seen.insert(row.clone())).collect()
}
