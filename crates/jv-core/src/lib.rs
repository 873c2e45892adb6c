//! # jv-core
//!
//! Shared foundation for the jailvote pipeline: the error taxonomy, the
//! immutable per-run study configuration, and the result types exchanged
//! between the modeling and reporting layers.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Run and study configuration.
pub mod config;
/// Error types.
pub mod error;
/// Common result types.
pub mod types;

pub use config::{DataSource, RunOptions, ScoreColumn, StudyConfig};
pub use error::{Error, Result};
pub use types::{FStatistic, ParamSummary};

/// Crate version, surfaced by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
