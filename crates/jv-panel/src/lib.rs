//! # jv-panel
//!
//! Fixed-effects panel regression with cluster-robust inference.
//!
//! This crate is the estimation capability the jailvote pipeline consumes:
//! an entity/time "within" estimator (demeaned OLS) with Liang–Zeger
//! cluster-robust covariance (two-way via Cameron–Gelbach–Miller) and a
//! joint Wald F-test of the regressors. The pipeline depends only on the
//! [`PanelRegressor`] trait, so tests substitute [`StubRegressor`].
//!
//! # References
//!
//! - Wooldridge, *Econometric Analysis of Cross Section and Panel Data*, Ch. 10.
//! - Arellano (1987), "Computing robust standard errors for within-groups estimators."
//! - Cameron, Gelbach & Miller (2011), "Robust inference with multiway clustering."

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Fixed-effects absorption (iterated demeaning).
pub mod absorb;
/// Cluster-robust covariance estimators.
pub mod cluster;
/// The `PanelRegressor` trait and its implementations.
pub mod fit;

pub use absorb::Absorber;
pub use cluster::{cluster_covariance, two_way_cluster_covariance};
pub use fit::{FitSpec, PanelData, PanelFit, PanelRegressor, StubRegressor, WithinRegressor};
