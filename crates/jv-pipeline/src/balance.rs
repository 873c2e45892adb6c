//! Balance grid search over (control window × treatment rollback).
//!
//! Every grid cell is independent: it reads only the shared record slice and
//! configuration, builds its own cohort, and fits the balance model. Cells
//! fan out over the rayon pool and are re-sorted deterministically after
//! collection — nothing depends on completion order. A cell whose regression
//! cannot be estimated stays in the output as an unfit row; it never aborts
//! the rest of the grid.

use chrono::{Duration, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use jv_core::{Error, Result, RunOptions, StudyConfig};
use jv_panel::{FitSpec, PanelRegressor};

use crate::artifacts::{self, ArtifactPaths};
use crate::cohort::{self, balance_covariates, model_frame, Cohort, CohortRow};
use crate::records::Record;
use crate::report::{self, BalanceModel};
use crate::windows::ExperimentalWindow;

/// One grid cell's balance-check result.
///
/// `f_statistic`/`p_value` are empty when the cell could not be estimated
/// (degenerate design, no rows); the cell still appears in the grid so the
/// artifact stays rectangular.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceRecord {
    /// Control-window length in days.
    pub control_days: i64,
    /// Treatment-rollback offset in days.
    pub rollback_days: i64,
    /// Earliest admission date of the cell's treatment window.
    pub earliest_date: NaiveDate,
    /// Joint balance F statistic.
    pub f_statistic: Option<f64>,
    /// Joint balance p-value.
    pub p_value: Option<f64>,
    /// Observation count of the fit (0 for unfit cells). Not persisted.
    #[serde(skip)]
    pub observations: usize,
}

/// The balance model specification: covariates predicting treatment
/// assignment, entity effects only.
fn balance_spec(opts: &RunOptions) -> FitSpec {
    FitSpec {
        dependent: "treatment".to_string(),
        independent: balance_covariates(opts.source).iter().map(|s| s.to_string()).collect(),
        entity_effects: true,
        time_effects: false,
    }
}

/// Run the full balance grid.
///
/// When `paths` is given, each cell's cohort is persisted under
/// `c_{control}/t_{treatment_days}.csv` for reuse by the selected-window
/// re-fits — the same [`cohort::split`] output both times. Returns balance
/// records sorted by (control_days, earliest_date).
pub fn run_grid(
    records: &[Record],
    opts: &RunOptions,
    config: &StudyConfig,
    regressor: &dyn PanelRegressor,
    paths: Option<&ArtifactPaths>,
) -> Result<Vec<BalanceRecord>> {
    let cells: Vec<(i64, i64)> = config
        .control_windows
        .iter()
        .flat_map(|&c| (0..config.rollback_days).map(move |r| (c, r)))
        .collect();
    tracing::info!(cells = cells.len(), "running balance grid");

    let spec = balance_spec(opts);
    let columns = spec_columns(&spec);

    let outcomes: Vec<Result<(i64, i64, BalanceRecord, Cohort)>> = cells
        .par_iter()
        .map(|&(control, rollback)| {
            let cohort = cohort::split(records, control, rollback, opts, config);
            let frame = model_frame(&cohort.rows, &columns)?;
            let earliest_date = config.earliest_voting_date + Duration::days(rollback);
            let record = match regressor.fit(&frame, &spec) {
                Ok(fit) => BalanceRecord {
                    control_days: control,
                    rollback_days: rollback,
                    earliest_date,
                    f_statistic: Some(fit.f_statistic.stat),
                    p_value: Some(fit.f_statistic.pval),
                    observations: fit.n_obs,
                },
                Err(Error::Estimation(reason)) => {
                    tracing::warn!(control, rollback, %reason, "grid cell not estimable");
                    BalanceRecord {
                        control_days: control,
                        rollback_days: rollback,
                        earliest_date,
                        f_statistic: None,
                        p_value: None,
                        observations: 0,
                    }
                }
                Err(other) => return Err(other),
            };
            Ok((control, rollback, record, cohort))
        })
        .collect();

    let mut balance_records = Vec::with_capacity(outcomes.len());
    let mut cohorts = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        let (control, rollback, record, cohort) = outcome?;
        balance_records.push(record);
        cohorts.push((control, rollback, cohort));
    }

    // Persist per-cell cohorts after the whole grid has succeeded in memory.
    if let Some(paths) = paths {
        for (control, rollback, cohort) in &cohorts {
            let treatment_days = config.treatment_days_remaining(*rollback);
            artifacts::write_csv(&paths.cohort_csv(*control, treatment_days), &cohort.rows)?;
        }
    }

    balance_records.sort_by(|a, b| {
        a.control_days.cmp(&b.control_days).then(a.earliest_date.cmp(&b.earliest_date))
    });
    Ok(balance_records)
}

/// Re-fit the balance model on the persisted cohort of each selected window
/// and assemble the full parameter tables.
pub fn refit_selected(
    windows: &[ExperimentalWindow],
    opts: &RunOptions,
    regressor: &dyn PanelRegressor,
    paths: &ArtifactPaths,
) -> Result<Vec<BalanceModel>> {
    let spec = balance_spec(opts);
    let columns = spec_columns(&spec);

    let mut models = Vec::with_capacity(windows.len());
    for window in windows {
        let rows: Vec<CohortRow> =
            artifacts::read_csv(&paths.cohort_csv(window.control_days, window.treatment_days))?;
        let frame = model_frame(&rows, &columns)?;
        let fit = regressor.fit(&frame, &spec)?;
        models.push(report::balance_model((window.control_days, window.treatment_days), &fit));
    }
    Ok(models)
}

/// Dependent + independents, as model-frame column names.
fn spec_columns(spec: &FitSpec) -> Vec<&str> {
    let mut cols = vec![spec.dependent.as_str()];
    cols.extend(spec.independent.iter().map(|s| s.as_str()));
    cols
}
