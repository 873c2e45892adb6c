//! # jv-pipeline
//!
//! The confinement/turnout study pipeline: record prep, per-cell cohort
//! construction, the balance grid search, experimental-window selection,
//! outcome modeling, and artifact I/O.
//!
//! Stages communicate only through on-disk artifacts keyed by the run's
//! combo path, so each stage can be invoked independently:
//!
//! ```text
//! prep ──▶ balance grid ──▶ window selection ──▶ balance / turnout /
//!          (rayon fan-out)                        heterogeneity re-fits
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Artifact paths and whole-buffer CSV/JSON I/O.
pub mod artifacts;
/// Balance grid search and selected-window balance re-fits.
pub mod balance;
/// Cohort construction and the design-matrix builder.
pub mod cohort;
/// Heterogeneity (interaction) modeling.
pub mod heterogeneity;
/// Record preparation and sample-selection filters.
pub mod prep;
/// Booking/voter-match records.
pub mod records;
/// Result assembly for the reporting layer.
pub mod report;
/// Turnout modeling over selected windows.
pub mod turnout;
/// Experimental-window selection.
pub mod windows;

#[cfg(test)]
pub(crate) mod testutil;

pub use artifacts::ArtifactPaths;
pub use balance::BalanceRecord;
pub use cohort::{Cohort, CohortRow};
pub use records::Record;
pub use windows::ExperimentalWindow;
