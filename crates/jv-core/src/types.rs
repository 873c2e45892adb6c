//! Common result types for jailvote

use serde::{Deserialize, Serialize};

/// Joint F-test result (statistic and p-value).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FStatistic {
    /// F statistic.
    pub stat: f64,
    /// Upper-tail p-value.
    pub pval: f64,
}

/// One estimated parameter: coefficient, standard error, p-value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSummary {
    /// Parameter name.
    pub parameter: String,
    /// Point estimate.
    pub coefficient: f64,
    /// Cluster-robust standard error.
    pub std_error: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}
