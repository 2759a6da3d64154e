//! Batch driver
//!
//! `Discover -> for each file: Extract -> Transform -> [Resolve] -> Load ->
//! Commit -> Report`. Every file is its own unit of work: a file-level error
//! rolls back that file only and the run moves on to the next one, unless
//! fail-fast is set. Fatal errors end the run.

use std::fmt;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::discovery::discover_files;
use crate::error::{EtlError, Result};
use crate::extract::{extract_log_file, extract_song_file};
use crate::load::{bulk_append, point_write, BulkTarget};
use crate::progress::create_file_progress;
use crate::queries::{TableName, ARTIST_INSERT, SONGPLAY_COPY, SONG_INSERT, USER_UPSERT};
use crate::report::{FileOutcome, FileStatus, RowCounts, RunReport};
use crate::resolve::{fetch_reference, resolve_plays, DurationMatch};
use crate::storage::StorageSession;
use crate::transform::transform_log;
use sparkify_common::config::{EtlConfig, DEFAULT_FILE_EXTENSION, DEFAULT_PLAYED_PAGE};

/// Kind of source data a run processes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Song,
    Log,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Song => "song",
            DataType::Log => "log",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Knobs of a batch run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub file_extension: String,
    pub played_page: String,
    pub duration_match: DurationMatch,
    /// Stop after the first failed file
    pub fail_fast: bool,
    pub show_progress: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            played_page: DEFAULT_PLAYED_PAGE.to_string(),
            duration_match: DurationMatch::Exact,
            fail_fast: false,
            show_progress: false,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &EtlConfig) -> Self {
        Self {
            file_extension: config.file_extension.clone(),
            played_page: config.played_page.clone(),
            duration_match: DurationMatch::from_tolerance(config.duration_tolerance),
            fail_fast: config.fail_fast,
            show_progress: false,
        }
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

/// What a successfully processed file produced
#[derive(Debug, Clone, Default)]
pub struct FileLoad {
    pub rows: RowCounts,
    /// Set when some source records were skipped
    pub ignored: Option<String>,
}

/// Drives one storage session through song and log runs
pub struct BatchDriver<S: StorageSession> {
    session: S,
    options: PipelineOptions,
}

impl<S: StorageSession> BatchDriver<S> {
    pub fn new(session: S, options: PipelineOptions) -> Self {
        Self { session, options }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn into_session(self) -> S {
        self.session
    }

    /// Load songs, then logs. With fail-fast, a failed song file skips the
    /// log run entirely.
    pub async fn run_all(&mut self, song_root: &Path, log_root: &Path) -> Result<Vec<RunReport>> {
        let songs = self.run(DataType::Song, song_root).await?;
        let stop = self.options.fail_fast && songs.has_failures();
        let mut reports = vec![songs];

        if stop {
            warn!("Skipping log data after a failed song file");
            return Ok(reports);
        }

        reports.push(self.run(DataType::Log, log_root).await?);
        Ok(reports)
    }

    /// Process every file of `data_type` below `root`
    pub async fn run(&mut self, data_type: DataType, root: &Path) -> Result<RunReport> {
        let discovered = discover_files(root, &self.options.file_extension)?;
        let total = discovered.count();
        info!("{} files found in {}", total, discovered.root.display());

        let mut report = RunReport::new(data_type, discovered.root.clone(), total);
        let progress = create_file_progress(
            total as u64,
            &format!("{} files", data_type),
            self.options.show_progress,
        );

        for (i, path) in discovered.files.iter().enumerate() {
            let index = i + 1;
            let outcome = match self.load_file(data_type, path).await {
                Ok(load) => {
                    let status = match load.ignored {
                        Some(reason) => {
                            warn!(path = %path.display(), "{}", reason);
                            FileStatus::PartiallySucceeded { reason }
                        },
                        None => FileStatus::Succeeded,
                    };
                    FileOutcome {
                        index,
                        path: path.clone(),
                        status,
                        rows: load.rows,
                    }
                },
                Err(err) => self.fail_file(index, path, err).await?,
            };

            let failed = outcome.status.is_failed();
            report.record(outcome);
            progress.inc(1);
            info!("{}/{} files processed.", index, total);

            if failed && self.options.fail_fast {
                report.stopped_early = index < total;
                break;
            }
        }

        progress.finish_and_clear();
        report.log_summary();
        Ok(report)
    }

    async fn load_file(&mut self, data_type: DataType, path: &Path) -> Result<FileLoad> {
        let load = match data_type {
            DataType::Song => process_song_file(&mut self.session, path).await?,
            DataType::Log => process_log_file(&mut self.session, path, &self.options).await?,
        };
        self.session.commit().await?;
        Ok(load)
    }

    /// Roll back a failed file; returns its outcome, or the error itself
    /// when it is fatal
    async fn fail_file(&mut self, index: usize, path: &Path, err: EtlError) -> Result<FileOutcome> {
        let rollback = self.session.rollback().await;

        let Some(kind) = err.file_error_kind() else {
            error!(path = %path.display(), error = %err, "Fatal error, aborting run");
            if let Err(rb) = rollback {
                warn!(error = %rb, "Rollback after fatal error failed");
            }
            return Err(err);
        };

        if let Err(rb) = rollback {
            error!(path = %path.display(), error = %rb, "Rollback failed");
            return Err(EtlError::Rollback {
                path: path.to_path_buf(),
                message: rb.to_string(),
            });
        }

        warn!(
            path = %path.display(),
            kind = %kind,
            error = %err,
            "File failed and was rolled back"
        );

        Ok(FileOutcome {
            index,
            path: path.to_path_buf(),
            status: FileStatus::Failed {
                kind,
                reason: err.to_string(),
            },
            rows: RowCounts::default(),
        })
    }
}

/// Insert the song and artist of one song file
pub async fn process_song_file<S>(session: &mut S, path: &Path) -> Result<FileLoad>
where
    S: StorageSession + ?Sized,
{
    let file = extract_song_file(path)?;

    let rows = RowCounts {
        songs: point_write(session, &SONG_INSERT, std::slice::from_ref(&file.song)).await?,
        artists: point_write(session, &ARTIST_INSERT, std::slice::from_ref(&file.artist)).await?,
        ..RowCounts::default()
    };

    let ignored = (file.ignored_records > 0).then(|| {
        format!(
            "{} record(s) after the first were ignored",
            file.ignored_records
        )
    });

    Ok(FileLoad { rows, ignored })
}

/// Load the time, users and songplays rows of one log file.
///
/// Time rows go first and users second so that songplays can reference both
/// within the same transaction.
pub async fn process_log_file<S>(
    session: &mut S,
    path: &Path,
    options: &PipelineOptions,
) -> Result<FileLoad>
where
    S: StorageSession + ?Sized,
{
    let file = extract_log_file(path, &options.played_page)?;
    let tables = transform_log(&file)?;

    let time = bulk_append(session, BulkTarget::Table(TableName::Time), &tables.time_buckets).await?;
    let users = point_write(session, &USER_UPSERT, &tables.users).await?;

    let reference = fetch_reference(session).await?;
    let plays = resolve_plays(tables.plays, &reference, options.duration_match);
    let matched = plays.iter().filter(|p| p.song_id.is_some()).count() as u64;
    let songplays = bulk_append(session, BulkTarget::Statement(&SONGPLAY_COPY), &plays).await?;

    debug!(
        path = %path.display(),
        events = file.events.len(),
        filtered_out = file.filtered_out,
        reference_songs = reference.len(),
        matched,
        "Log file loaded"
    );

    Ok(FileLoad {
        rows: RowCounts {
            time,
            users,
            songplays,
            songplays_matched: matched,
            ..RowCounts::default()
        },
        ignored: None,
    })
}
