//! Turnout-effect heterogeneity by race over the selected windows.
//!
//! Subsets each cohort to Black/White rows, interacts the exposure with the
//! Black indicator, and reports main and interaction terms. Optionally
//! restricts to states that report race directly rather than modeling it.

use jv_core::{Error, Result, RunOptions};
use jv_panel::{FitSpec, PanelFit, PanelRegressor};

use crate::artifacts::{self, ArtifactPaths};
use crate::cohort::{heterogeneity_covariates, model_frame, CohortRow};
use crate::records::Race;
use crate::report::{HeterogeneityFit, HeterogeneityModel};
use crate::windows::ExperimentalWindow;

/// States whose race field is reported by the state, not modeled.
pub const RACE_REPORTING_STATES: [&str; 8] =
    ["AL", "FL", "GA", "LA", "NC", "SC", "TN", "TX"];

const EXPOSURES: [&str; 2] = ["treatment", "pct_votable_days_in_custody"];

/// Fit the interaction designs for every selected window.
pub fn model_selected(
    windows: &[ExperimentalWindow],
    opts: &RunOptions,
    regressor: &dyn PanelRegressor,
    paths: &ArtifactPaths,
    race_reporting_only: bool,
) -> Result<Vec<HeterogeneityModel>> {
    let covariates = heterogeneity_covariates(opts.source);

    let mut models = Vec::with_capacity(windows.len());
    for window in windows {
        let split = (window.control_days, window.treatment_days);
        let mut rows: Vec<CohortRow> =
            artifacts::read_csv(&paths.cohort_csv(split.0, split.1))?;
        rows.retain(|r| matches!(r.race, Some(Race::Black) | Some(Race::White)));
        if race_reporting_only {
            rows.retain(|r| RACE_REPORTING_STATES.contains(&r.state.as_str()));
        }

        let mut fits = Vec::with_capacity(EXPOSURES.len());
        let mut observations = 0;
        for exposure in EXPOSURES {
            let interaction = format!("{}_x_black", exposure);
            let mut independent = vec![exposure.to_string(), "race_black".to_string(), interaction.clone()];
            independent.extend(covariates.iter().map(|s| s.to_string()));
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
            fits.push(HeterogeneityFit {
                design: exposure.to_string(),
                params: vec![extract(&fit, exposure)?, extract(&fit, &interaction)?],
            });
        }
        models.push(HeterogeneityModel { split, observations, fits });
    }
    Ok(models)
}

fn extract(fit: &PanelFit, name: &str) -> Result<jv_core::ParamSummary> {
    fit.param(name)
        .cloned()
        .ok_or_else(|| Error::Computation(format!("fit is missing parameter '{}'", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::balance;
    use crate::testutil::{full_options, record, study_config, tmp_artifacts};
    use crate::windows;
    use chrono::{Duration, NaiveDate};
    use jv_panel::StubRegressor;

    #[test]
    fn interaction_terms_reported_per_design() {
        let mut config = study_config();
        config.control_windows = vec![7];
        config.rollback_days = 1;
        let opts = full_options();
        let (paths, dir) = tmp_artifacts("hetero");

        let mut records = Vec::new();
        for i in 0..10 {
            let day = NaiveDate::from_ymd_opt(2020, 10, 14).unwrap() + Duration::days(i);
            let mut r = record("TX-Travis", &format!("t{}", i), &format!("bt{}", i), day);
            if i % 2 == 0 {
                r.race = Some(Race::Black);
            }
            records.push(r);
        }
        for i in 0..4 {
            let day = NaiveDate::from_ymd_opt(2020, 11, 4).unwrap() + Duration::days(i % 2);
            records.push(record("TX-Travis", &format!("c{}", i), &format!("bc{}", i), day));
        }

        let stub = StubRegressor::new(1.0, 0.9);
        let grid = balance::run_grid(&records, &opts, &config, &stub, Some(&paths)).unwrap();
        let selected = windows::select(&grid, &config);

        let models = model_selected(&selected, &opts, &stub, &paths, false).unwrap();
        assert_eq!(models.len(), 1);
        let m = &models[0];
        assert_eq!(m.fits.len(), 2);
        assert_eq!(m.fits[0].design, "treatment");
        assert_eq!(m.fits[0].params[1].parameter, "treatment_x_black");
        assert_eq!(
            m.fits[1].params[1].parameter,
            "pct_votable_days_in_custody_x_black"
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
