//! Sparkify Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared configuration, logging, and error handling for the Sparkify
//! loader workspace.
//!
//! # Overview
//!
//! - **Configuration**: environment-driven settings for the batch loader
//! - **Logging**: tracing subscriber setup (console, file, JSON)
//! - **Error Handling**: shared error and result types
//!
//! # Example
//!
//! ```no_run
//! use sparkify_common::config::EtlConfig;
//! use sparkify_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     let config = EtlConfig::load()?;
//!     tracing::info!(song_data = %config.song_data.display(), "Configuration loaded");
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{Result, SparkifyError};
