//! The panel-regression capability consumed by the pipeline.
//!
//! [`PanelRegressor`] is the seam: the pipeline depends on the trait, not on
//! a concrete solver. [`WithinRegressor`] is the production implementation —
//! an entity/time fixed-effects "within" estimator with cluster-robust
//! inference. [`StubRegressor`] returns scripted statistics so grid-search
//! and window-selection logic can be exercised without a real solver.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};

use jv_core::{Error, FStatistic, ParamSummary, Result};

use crate::absorb::Absorber;
use crate::cluster::{cluster_covariance, two_way_cluster_covariance};

/// Column-oriented observation set for one model fit.
///
/// Entity and time ids are dense-mapped internally; callers may pass any
/// `u64` labels (hashed jail ids, ISO week numbers).
#[derive(Debug, Clone)]
pub struct PanelData {
    entity: Vec<u64>,
    time: Vec<u64>,
    columns: Vec<(String, Vec<f64>)>,
    n: usize,
}

impl PanelData {
    /// Create a panel from per-observation entity and time labels.
    pub fn new(entity: Vec<u64>, time: Vec<u64>) -> Result<Self> {
        if entity.len() != time.len() {
            return Err(Error::Validation(format!(
                "entity length ({}) != time length ({})",
                entity.len(),
                time.len()
            )));
        }
        let n = entity.len();
        Ok(Self { entity, time, columns: Vec::new(), n })
    }

    /// Attach a named numeric column of length `n`.
    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> Result<Self> {
        if values.len() != self.n {
            return Err(Error::Validation(format!(
                "column '{}' has length {}, expected {}",
                name,
                values.len(),
                self.n
            )));
        }
        if self.column(name).is_some() {
            return Err(Error::Validation(format!("duplicate column '{}'", name)));
        }
        self.columns.push((name.to_string(), values));
        Ok(self)
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_slice())
    }

    /// Number of observations.
    pub fn n_obs(&self) -> usize {
        self.n
    }

    /// Entity labels.
    pub fn entity(&self) -> &[u64] {
        &self.entity
    }

    /// Time labels.
    pub fn time(&self) -> &[u64] {
        &self.time
    }
}

/// Model specification: `dependent ~ Σ independent [+ entity FE][+ time FE]`,
/// clustered by whichever effect dimensions are active.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitSpec {
    /// Dependent variable column.
    pub dependent: String,
    /// Independent variable columns.
    pub independent: Vec<String>,
    /// Absorb entity fixed effects (and cluster by entity).
    pub entity_effects: bool,
    /// Absorb time fixed effects (and cluster by time).
    pub time_effects: bool,
}

/// Fit output: per-parameter estimates plus the joint F-test on all
/// independent variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanelFit {
    /// One summary per independent variable, in specification order.
    pub params: Vec<ParamSummary>,
    /// Joint Wald F-test of all independents being zero, computed against
    /// the cluster-robust covariance.
    pub f_statistic: FStatistic,
    /// Observation count used in the fit.
    pub n_obs: usize,
}

impl PanelFit {
    /// Look up one parameter's summary by name.
    pub fn param(&self, name: &str) -> Option<&ParamSummary> {
        self.params.iter().find(|p| p.parameter == name)
    }
}

/// The panel-regression capability.
pub trait PanelRegressor: Send + Sync {
    /// Fit `spec` against `data`.
    ///
    /// Returns [`Error::Estimation`] when the cell cannot be estimated
    /// (no rows, rank-deficient design after demeaning, exhausted degrees of
    /// freedom) — callers decide whether that is fatal.
    fn fit(&self, data: &PanelData, spec: &FitSpec) -> Result<PanelFit>;
}

/// Production within-estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct WithinRegressor;

impl WithinRegressor {
    /// Create a regressor.
    pub fn new() -> Self {
        Self
    }
}

impl PanelRegressor for WithinRegressor {
    fn fit(&self, data: &PanelData, spec: &FitSpec) -> Result<PanelFit> {
        let n = data.n_obs();
        if n == 0 {
            return Err(Error::Estimation("no observations".into()));
        }
        if spec.independent.is_empty() {
            return Err(Error::Validation("at least one independent variable required".into()));
        }

        let y_raw = data
            .column(&spec.dependent)
            .ok_or_else(|| Error::Validation(format!("missing column '{}'", spec.dependent)))?;
        let mut x_cols: Vec<&[f64]> = Vec::with_capacity(spec.independent.len());
        for name in &spec.independent {
            x_cols.push(
                data.column(name)
                    .ok_or_else(|| Error::Validation(format!("missing column '{}'", name)))?,
            );
        }
        let q = x_cols.len();

        // Absorb fixed effects, or fall back to an explicit intercept.
        let mut dims: Vec<Vec<usize>> = Vec::new();
        if spec.entity_effects {
            dims.push(dense_levels(data.entity()));
        }
        if spec.time_effects {
            dims.push(dense_levels(data.time()));
        }

        let with_intercept = dims.is_empty();
        let p = if with_intercept { q + 1 } else { q };

        let (y_dm, x_flat, df_absorbed) = if with_intercept {
            let mut flat = vec![0.0_f64; n * p];
            for i in 0..n {
                for (j, col) in x_cols.iter().enumerate() {
                    flat[i * p + j] = col[i];
                }
                flat[i * p + q] = 1.0;
            }
            (y_raw.to_vec(), flat, 0usize)
        } else {
            let absorber = Absorber::new(dims)?;
            let y_dm = absorber.demean(y_raw)?;
            let mut flat = vec![0.0_f64; n * p];
            for (j, col) in x_cols.iter().enumerate() {
                let dm = absorber.demean(col)?;
                for i in 0..n {
                    flat[i * p + j] = dm[i];
                }
            }
            (y_dm, flat, absorber.absorbed_df())
        };

        let k_model = p + df_absorbed;
        let df_resid = n as i64 - k_model as i64;
        if df_resid <= 0 {
            return Err(Error::Estimation(format!(
                "no residual degrees of freedom (n = {}, parameters = {})",
                n, k_model
            )));
        }

        // OLS on the (demeaned) data: beta = (X'X)^{-1} X'y.
        let x_mat = DMatrix::from_row_slice(n, p, &x_flat);
        let y_vec = DVector::from_column_slice(&y_dm);
        let xtx = x_mat.transpose() * &x_mat;
        let xty = x_mat.transpose() * &y_vec;
        let xtx_inv = xtx
            .try_inverse()
            .ok_or_else(|| Error::Estimation("design matrix is singular after demeaning".into()))?;
        let beta = &xtx_inv * &xty;

        let y_hat = &x_mat * &beta;
        let resid = &y_vec - &y_hat;

        // Clustered covariance, matching the active effect dimensions.
        let vcov = match (spec.entity_effects, spec.time_effects) {
            (true, true) => two_way_cluster_covariance(
                &x_mat,
                &resid,
                &xtx_inv,
                data.entity(),
                data.time(),
                k_model,
            )?,
            (false, true) => {
                cluster_covariance(&x_mat, &resid, &xtx_inv, data.time(), k_model)?
            }
            // Entity-effects-only and the interceptized no-effects case both
            // cluster by entity.
            _ => cluster_covariance(&x_mat, &resid, &xtx_inv, data.entity(), k_model)?,
        };

        // Per-parameter t-based p-values against Student's t(df_resid).
        let t_dist = StudentsT::new(0.0, 1.0, df_resid as f64)
            .map_err(|e| Error::Computation(format!("t distribution: {}", e)))?;
        let mut params = Vec::with_capacity(q);
        for (j, name) in spec.independent.iter().enumerate() {
            let se = vcov[(j, j)].max(0.0).sqrt();
            let coef = beta[j];
            let p_value = if se > 0.0 {
                2.0 * (1.0 - t_dist.cdf((coef / se).abs()))
            } else {
                f64::NAN
            };
            params.push(ParamSummary {
                parameter: name.clone(),
                coefficient: coef,
                std_error: se,
                p_value,
            });
        }

        let f_statistic = wald_f(&beta, &vcov, q, df_resid as f64)?;

        Ok(PanelFit { params, f_statistic, n_obs: n })
    }
}

/// Joint Wald test of the first `q` coefficients being zero, scaled to an
/// F(q, df_resid) reference distribution.
fn wald_f(beta: &DVector<f64>, vcov: &DMatrix<f64>, q: usize, df_resid: f64) -> Result<FStatistic> {
    let b = beta.rows(0, q).into_owned();
    let v = vcov.view((0, 0), (q, q)).into_owned();
    let v_inv = v
        .try_inverse()
        .ok_or_else(|| Error::Estimation("clustered covariance is singular".into()))?;
    let wald = (b.transpose() * v_inv * &b)[(0, 0)];
    let stat = wald / q as f64;
    let f_dist = FisherSnedecor::new(q as f64, df_resid)
        .map_err(|e| Error::Computation(format!("F distribution: {}", e)))?;
    let pval = if stat.is_finite() { 1.0 - f_dist.cdf(stat) } else { f64::NAN };
    Ok(FStatistic { stat, pval })
}

/// Map arbitrary labels to dense 0-based levels in first-seen order.
fn dense_levels(labels: &[u64]) -> Vec<usize> {
    let mut map = std::collections::HashMap::new();
    let mut out = Vec::with_capacity(labels.len());
    for &l in labels {
        let next = map.len();
        out.push(*map.entry(l).or_insert(next));
    }
    out
}

/// Deterministic regressor for tests: scripted joint F, fixed per-parameter
/// statistics, real observation counts. Errors on empty input exactly like
/// the production estimator.
#[derive(Debug, Clone)]
pub struct StubRegressor {
    /// Joint F returned by every fit.
    pub f_statistic: FStatistic,
    /// Coefficient reported for each independent variable.
    pub coefficient: f64,
    /// Standard error reported for each independent variable.
    pub std_error: f64,
    /// p-value reported for each independent variable.
    pub p_value: f64,
}

impl StubRegressor {
    /// Stub returning the given joint F statistic and p-value.
    pub fn new(stat: f64, pval: f64) -> Self {
        Self {
            f_statistic: FStatistic { stat, pval },
            coefficient: 0.0,
            std_error: 1.0,
            p_value: 0.5,
        }
    }
}

impl PanelRegressor for StubRegressor {
    fn fit(&self, data: &PanelData, spec: &FitSpec) -> Result<PanelFit> {
        if data.n_obs() == 0 {
            return Err(Error::Estimation("no observations".into()));
        }
        let params = spec
            .independent
            .iter()
            .map(|name| ParamSummary {
                parameter: name.clone(),
                coefficient: self.coefficient,
                std_error: self.std_error,
                p_value: self.p_value,
            })
            .collect();
        Ok(PanelFit { params, f_statistic: self.f_statistic, n_obs: data.n_obs() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(entity: Vec<u64>, time: Vec<u64>) -> PanelData {
        PanelData::new(entity, time).unwrap()
    }

    #[test]
    fn within_recovers_slope_across_entities() {
        // Entity 1: y = 2x exactly; entity 2: y = 2x at a different level.
        let data = panel(vec![1, 1, 1, 2, 2, 2], vec![1, 2, 3, 1, 2, 3])
            .with_column("x", vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0])
            .unwrap()
            .with_column("y", vec![2.0, 4.0, 6.0, 20.0, 40.0, 60.0])
            .unwrap();
        let spec = FitSpec {
            dependent: "y".into(),
            independent: vec!["x".into()],
            entity_effects: true,
            time_effects: false,
        };
        let fit = WithinRegressor::new().fit(&data, &spec).unwrap();
        assert_eq!(fit.n_obs, 6);
        let x = fit.param("x").unwrap();
        assert!((x.coefficient - 2.0).abs() < 1e-10, "beta = {}", x.coefficient);
    }

    #[test]
    fn within_absorbs_entity_intercepts_under_noise() {
        // Entity 1: y ~ 5 + 3x; entity 2: y ~ 10 + 3x.
        let data = panel(vec![1; 4].into_iter().chain(vec![2; 4]).collect(), vec![1, 2, 3, 4, 1, 2, 3, 4])
            .with_column("x", vec![1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0])
            .unwrap()
            .with_column("y", vec![8.1, 11.0, 13.9, 17.1, 13.0, 16.1, 18.9, 22.0])
            .unwrap();
        let spec = FitSpec {
            dependent: "y".into(),
            independent: vec!["x".into()],
            entity_effects: true,
            time_effects: false,
        };
        let fit = WithinRegressor::new().fit(&data, &spec).unwrap();
        let x = fit.param("x").unwrap();
        assert!((x.coefficient - 3.0).abs() < 0.2, "beta = {}", x.coefficient);
        assert!(x.std_error > 0.0);
        assert!(x.p_value < 0.05);
        assert!(fit.f_statistic.stat > 0.0);
        assert!(fit.f_statistic.pval < 0.05);
    }

    #[test]
    fn two_way_effects_with_clustering() {
        // Balanced 3x4 panel, strong signal on x.
        let mut entity = Vec::new();
        let mut time = Vec::new();
        let mut x = Vec::new();
        let mut y = Vec::new();
        for e in 1..=3u64 {
            for t in 1..=4u64 {
                entity.push(e);
                time.push(t);
                let xi = (e * t) as f64;
                x.push(xi);
                y.push(4.0 * xi + e as f64 * 2.0 + t as f64 * 0.5);
            }
        }
        let data = panel(entity, time)
            .with_column("x", x)
            .unwrap()
            .with_column("y", y)
            .unwrap();
        let spec = FitSpec {
            dependent: "y".into(),
            independent: vec!["x".into()],
            entity_effects: true,
            time_effects: true,
        };
        let fit = WithinRegressor::new().fit(&data, &spec).unwrap();
        let x = fit.param("x").unwrap();
        assert!((x.coefficient - 4.0).abs() < 1e-8, "beta = {}", x.coefficient);
        assert!(x.std_error.is_finite());
    }

    #[test]
    fn no_effects_fits_with_intercept() {
        // y = 1 + 2x, no fixed effects: intercept must be absorbed by the
        // explicit constant column, leaving beta = 2.
        let data = panel(vec![1, 1, 2, 2, 3, 3], vec![1, 2, 1, 2, 1, 2])
            .with_column("x", vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap()
            .with_column("y", vec![1.0, 3.0, 5.0, 7.0, 9.0, 11.0])
            .unwrap();
        let spec = FitSpec {
            dependent: "y".into(),
            independent: vec!["x".into()],
            entity_effects: false,
            time_effects: false,
        };
        let fit = WithinRegressor::new().fit(&data, &spec).unwrap();
        assert!((fit.param("x").unwrap().coefficient - 2.0).abs() < 1e-10);
    }

    #[test]
    fn empty_panel_is_estimation_error() {
        let data = panel(vec![], vec![]);
        let spec = FitSpec {
            dependent: "y".into(),
            independent: vec!["x".into()],
            entity_effects: true,
            time_effects: false,
        };
        match WithinRegressor::new().fit(&data, &spec) {
            Err(Error::Estimation(_)) => {}
            other => panic!("expected estimation error, got {:?}", other.map(|f| f.n_obs)),
        }
    }

    #[test]
    fn collinear_design_is_estimation_error() {
        // x2 = 2 * x1 exactly.
        let data = panel(vec![1, 1, 1, 2, 2, 2], vec![1, 2, 3, 1, 2, 3])
            .with_column("x1", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap()
            .with_column("x2", vec![2.0, 4.0, 6.0, 8.0, 10.0, 12.0])
            .unwrap()
            .with_column("y", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .unwrap();
        let spec = FitSpec {
            dependent: "y".into(),
            independent: vec!["x1".into(), "x2".into()],
            entity_effects: true,
            time_effects: false,
        };
        assert!(matches!(
            WithinRegressor::new().fit(&data, &spec),
            Err(Error::Estimation(_))
        ));
    }

    #[test]
    fn missing_column_is_validation_error() {
        let data = panel(vec![1, 2], vec![1, 1])
            .with_column("y", vec![1.0, 2.0])
            .unwrap();
        let spec = FitSpec {
            dependent: "y".into(),
            independent: vec!["nope".into()],
            entity_effects: true,
            time_effects: false,
        };
        assert!(matches!(
            WithinRegressor::new().fit(&data, &spec),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn stub_reports_scripted_statistics() {
        let data = panel(vec![1, 2, 3], vec![1, 1, 1])
            .with_column("treatment", vec![1.0, 0.0, 1.0])
            .unwrap()
            .with_column("age", vec![30.0, 40.0, 50.0])
            .unwrap();
        let spec = FitSpec {
            dependent: "treatment".into(),
            independent: vec!["age".into()],
            entity_effects: true,
            time_effects: false,
        };
        let stub = StubRegressor::new(1.7, 0.042);
        let fit = stub.fit(&data, &spec).unwrap();
        assert_eq!(fit.n_obs, 3);
        assert!((fit.f_statistic.pval - 0.042).abs() < 1e-15);

        let empty = panel(vec![], vec![]);
        assert!(matches!(stub.fit(&empty, &spec), Err(Error::Estimation(_))));
    }
}
