//! Result assembly: reshape fits plus split metadata into the uniform
//! records the reporting layer consumes. No business logic beyond field
//! renaming and merging fit variants.

use serde::{Deserialize, Serialize};

use jv_core::{Error, ParamSummary, Result};
use jv_panel::PanelFit;

/// A selected split: (control window days, treatment window days).
pub type Split = (i64, i64);

/// Balance re-fit record for one selected split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceModel {
    /// (control_days, treatment_days).
    pub split: Split,
    /// Observation count of the fit.
    pub observations: usize,
    /// Joint balance F-test p-value.
    pub p_value: f64,
    /// Full parameter table, sorted by parameter name.
    pub params: Vec<ParamSummary>,
}

/// One turnout design's headline estimate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignFit {
    /// (exposure variable, "co_variates" | "no_co_variates").
    pub design: (String, String),
    /// Coefficient on the exposure variable.
    pub coefficient: f64,
    /// Cluster-robust standard error.
    pub std_error: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

/// Turnout modeling record for one selected split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnoutModel {
    /// (control_days, treatment_days).
    pub split: Split,
    /// Observation count of the final design's fit.
    pub observations: usize,
    /// The four design variants.
    pub fits: Vec<DesignFit>,
    /// Control-group turnout rate.
    pub mean_control_turnout: f64,
    /// Mean share of votable days confined, treatment group.
    pub mean_proportion_confined: f64,
    /// Maximum share of votable days confined, treatment group.
    pub max_proportion_confined: f64,
}

/// One heterogeneity design: main effect and interaction terms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeterogeneityFit {
    /// Exposure variable of the design.
    pub design: String,
    /// Main-effect and interaction parameter summaries.
    pub params: Vec<ParamSummary>,
}

/// Heterogeneity modeling record for one selected split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeterogeneityModel {
    /// (control_days, treatment_days).
    pub split: Split,
    /// Observation count of the final design's fit.
    pub observations: usize,
    /// One entry per exposure design.
    pub fits: Vec<HeterogeneityFit>,
}

/// Full parameter table of a fit, sorted by parameter name.
pub fn param_table(fit: &PanelFit) -> Vec<ParamSummary> {
    let mut params = fit.params.clone();
    params.sort_by(|a, b| a.parameter.cmp(&b.parameter));
    params
}

/// Assemble the balance record for one selected split.
pub fn balance_model(split: Split, fit: &PanelFit) -> BalanceModel {
    BalanceModel {
        split,
        observations: fit.n_obs,
        p_value: fit.f_statistic.pval,
        params: param_table(fit),
    }
}

/// Extract one design's headline estimate from its fit.
pub fn design_fit(variable: &str, covariates: bool, fit: &PanelFit) -> Result<DesignFit> {
    let param = fit
        .param(variable)
        .ok_or_else(|| Error::Computation(format!("fit is missing parameter '{}'", variable)))?;
    let label = if covariates { "co_variates" } else { "no_co_variates" };
    Ok(DesignFit {
        design: (variable.to_string(), label.to_string()),
        coefficient: param.coefficient,
        std_error: param.std_error,
        p_value: param.p_value,
    })
}
