//! Turnout modeling over the selected experimental windows.
//!
//! For each selected split, the persisted cohort is re-read and four designs
//! are fit: confinement indicator and share-of-voting-days-confined, each
//! with and without covariates, all with entity and time effects and two-way
//! clustering.

use jv_core::{Error, Result, RunOptions};
use jv_panel::{FitSpec, PanelRegressor};

use crate::artifacts::{self, ArtifactPaths};
use crate::cohort::{model_frame, turnout_covariates, CohortRow};
use crate::report::{self, TurnoutModel};
use crate::windows::ExperimentalWindow;

/// The two exposure variables of the turnout designs.
const EXPOSURES: [&str; 2] = ["treatment", "pct_votable_days_in_custody"];

/// Fit the four turnout designs for every selected window.
pub fn model_selected(
    windows: &[ExperimentalWindow],
    opts: &RunOptions,
    regressor: &dyn PanelRegressor,
    paths: &ArtifactPaths,
) -> Result<Vec<TurnoutModel>> {
    let covariates = turnout_covariates(opts.source);

    let mut models = Vec::with_capacity(windows.len());
    for window in windows {
        let split = (window.control_days, window.treatment_days);
        let rows: Vec<CohortRow> =
            artifacts::read_csv(&paths.cohort_csv(split.0, split.1))?;

        let mut fits = Vec::with_capacity(4);
        let mut observations = 0;
        for exposure in EXPOSURES {
            for with_covariates in [false, true] {
                let mut independent = vec![exposure.to_string()];
                if with_covariates {
                    independent.extend(covariates.iter().map(|s| s.to_string()));
                }
                let spec = FitSpec {
                    dependent: "voted".to_string(),
                    independent,
                    entity_effects: true,
                    time_effects: true,
                };
                let mut columns = vec![spec.dependent.as_str()];
                columns.extend(spec.independent.iter().map(|s| s.as_str()));
                let frame = model_frame(&rows, &columns)?;
                let fit = regressor.fit(&frame, &spec)?;
                observations = fit.n_obs;
                fits.push(report::design_fit(exposure, with_covariates, &fit)?);
            }
        }

        let summary = confinement_summary(&rows, split)?;
        models.push(TurnoutModel {
            split,
            observations,
            fits,
            mean_control_turnout: summary.control_turnout,
            mean_proportion_confined: summary.mean_confined,
            max_proportion_confined: summary.max_confined,
        });
    }
    Ok(models)
}

struct ConfinementSummary {
    control_turnout: f64,
    mean_confined: f64,
    max_confined: f64,
}

/// Control-group turnout rate and treatment-group confinement shares.
fn confinement_summary(rows: &[CohortRow], split: (i64, i64)) -> Result<ConfinementSummary> {
    let n_control = rows.iter().filter(|r| r.treatment == 0).count();
    let n_treatment = rows.iter().filter(|r| r.treatment == 1).count();
    if n_control == 0 || n_treatment == 0 {
        return Err(Error::Estimation(format!(
            "split c_{}/t_{} has an empty treatment or control group",
            split.0, split.1
        )));
    }
    let control_voters = rows
        .iter()
        .filter(|r| r.treatment == 0 && r.voted == Some(1))
        .count();
    let confined: Vec<f64> = rows
        .iter()
        .filter(|r| r.treatment == 1)
        .map(|r| r.pct_votable_days_in_custody)
        .collect();
    let mean_confined = confined.iter().sum::<f64>() / confined.len() as f64;
    let max_confined = confined.iter().cloned().fold(f64::MIN, f64::max);
    Ok(ConfinementSummary {
        control_turnout: control_voters as f64 / n_control as f64,
        mean_confined,
        max_confined,
    })
}
