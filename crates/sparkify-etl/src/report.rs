//! Per-file outcomes and run reports

use std::ops::AddAssign;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::FileErrorKind;
use crate::pipeline::DataType;

/// Rows written per destination table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub songs: u64,
    pub artists: u64,
    pub users: u64,
    pub time: u64,
    pub songplays: u64,
    /// Songplays whose song/artist keys were resolved
    pub songplays_matched: u64,
}

impl RowCounts {
    pub fn total(&self) -> u64 {
        self.songs + self.artists + self.users + self.time + self.songplays
    }
}

impl AddAssign for RowCounts {
    fn add_assign(&mut self, other: Self) {
        self.songs += other.songs;
        self.artists += other.artists;
        self.users += other.users;
        self.time += other.time;
        self.songplays += other.songplays;
        self.songplays_matched += other.songplays_matched;
    }
}

/// How one file ended
#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    Succeeded,
    /// Committed, but some source records were ignored
    PartiallySucceeded { reason: String },
    /// Rolled back; nothing from the file was committed
    Failed { kind: FileErrorKind, reason: String },
}

impl FileStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, FileStatus::Failed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    /// 1-based position in discovery order
    pub index: usize,
    pub path: PathBuf,
    pub status: FileStatus,
    /// Rows committed; zero for failed files
    pub rows: RowCounts,
}

/// Result of one data-type run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub data_type: DataType,
    pub root: PathBuf,
    pub discovered: usize,
    pub outcomes: Vec<FileOutcome>,
    /// Set when fail-fast stopped the run before every file was attempted
    pub stopped_early: bool,
}

impl RunReport {
    pub fn new(data_type: DataType, root: PathBuf, discovered: usize) -> Self {
        Self {
            data_type,
            root,
            discovered,
            outcomes: Vec::with_capacity(discovered),
            stopped_early: false,
        }
    }

    pub fn record(&mut self, outcome: FileOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn attempted(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Succeeded))
    }

    pub fn partially_succeeded(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::PartiallySucceeded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(FileStatus::is_failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_failed())
    }

    /// Rows committed across all files
    pub fn rows(&self) -> RowCounts {
        let mut total = RowCounts::default();
        for outcome in &self.outcomes {
            total += outcome.rows;
        }
        total
    }

    fn count(&self, predicate: impl Fn(&FileStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| predicate(&o.status)).count()
    }

    /// Emit the end-of-run summary
    pub fn log_summary(&self) {
        let rows = self.rows();
        info!(
            data_type = %self.data_type,
            root = %self.root.display(),
            discovered = self.discovered,
            attempted = self.attempted(),
            succeeded = self.succeeded(),
            partial = self.partially_succeeded(),
            failed = self.failed(),
            songs = rows.songs,
            artists = rows.artists,
            users = rows.users,
            time = rows.time,
            songplays = rows.songplays,
            songplays_matched = rows.songplays_matched,
            "Run summary"
        );

        for outcome in self.failures() {
            if let FileStatus::Failed { kind, reason } = &outcome.status {
                warn!(
                    path = %outcome.path.display(),
                    kind = %kind,
                    "Failed file: {}",
                    reason
                );
            }
        }

        if self.stopped_early {
            warn!(
                remaining = self.discovered - self.attempted(),
                "Stopped after first failed file"
            );
        }
    }
}
