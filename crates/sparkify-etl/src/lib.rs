//! Sparkify ETL Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch loader that turns newline-delimited JSON song metadata and
//! listening logs into the five-table Sparkify schema
//! (`songs`, `artists`, `users`, `time`, `songplays`).
//!
//! # Pipeline
//!
//! - [`discovery`]: recursive, sorted file enumeration
//! - [`extract`]: JSON-lines parsing and page filtering
//! - [`transform`]: timestamp decomposition and row projection
//! - [`resolve`]: songplay key resolution against songs ⋈ artists
//! - [`load`]: point writes with conflict policy and bulk appends
//! - [`pipeline`]: the per-file batch driver
//!
//! All storage goes through a [`storage::StorageSession`]; PostgreSQL and an
//! in-memory engine are provided.
//!
//! # Example
//!
//! ```no_run
//! use sparkify_etl::pipeline::{BatchDriver, PipelineOptions};
//! use sparkify_etl::storage::MemorySession;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut driver = BatchDriver::new(MemorySession::new(), PipelineOptions::default());
//!     let reports = driver
//!         .run_all(Path::new("data/song_data"), Path::new("data/log_data"))
//!         .await?;
//!     for report in &reports {
//!         report.log_summary();
//!     }
//!     Ok(())
//! }
//! ```

pub mod discovery;
pub mod error;
pub mod extract;
pub mod load;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod queries;
pub mod report;
pub mod resolve;
pub mod storage;
pub mod transform;
pub mod tsv;

pub use error::{EtlError, FileErrorKind, Result};
pub use pipeline::{BatchDriver, DataType, PipelineOptions};
pub use report::{FileOutcome, FileStatus, RowCounts, RunReport};
