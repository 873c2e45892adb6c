//! Run configuration for the confinement/turnout study.
//!
//! Everything that was ambient in the source analysis — election day, the
//! per-state voting-date table, window grids — is built once at startup into
//! an immutable [`StudyConfig`] and passed by reference to every stage.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Which record source the run operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Voter-matched bookings only (demographics from the voter file,
    /// including party affiliation).
    Matched,
    /// Every booking, matched or not; unmatched rows are assumed non-voters.
    Full,
}

/// Match-probability column on which records are thresholded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreColumn {
    ScoreWeighted,
    ScoreUnweighted,
}

impl fmt::Display for ScoreColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreColumn::ScoreWeighted => write!(f, "score_weighted"),
            ScoreColumn::ScoreUnweighted => write!(f, "score_unweighted"),
        }
    }
}

/// Per-run sample-selection options.
///
/// The combination of these flags determines the deterministic path key under
/// which every artifact of the run is stored, so independently-invoked stages
/// of the same configuration find each other's output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOptions {
    /// Record source (matched-only or full bookings).
    pub source: DataSource,
    /// Only consider voters demarcated as active.
    pub active: bool,
    /// Match probability column on which to threshold.
    pub column: ScoreColumn,
    /// Only consider voters registered prior to election day.
    pub registered: bool,
    /// Threshold above which a match record counts as a match.
    pub threshold: f64,
    /// Exclude records from jails that do not report bond amounts.
    pub exclude_no_bond: bool,
    /// Exclude records from jails that do not report charges.
    pub exclude_no_charge: bool,
}

impl RunOptions {
    /// Check flag consistency. Fatal before any I/O.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::Config(format!(
                "match threshold must lie in [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }

    /// Deterministic artifact path key for this flag combination, e.g.
    /// `a_f_c_score_weighted_r_f_t_0.75_xb_f_xc_t`.
    pub fn combo_path(&self) -> String {
        fn tf(b: bool) -> char {
            if b {
                't'
            } else {
                'f'
            }
        }
        format!(
            "a_{}_c_{}_r_{}_t_{}_xb_{}_xc_{}",
            tf(self.active),
            self.column,
            tf(self.registered),
            self.threshold,
            tf(self.exclude_no_bond),
            tf(self.exclude_no_charge),
        )
    }
}

/// Immutable study-level configuration shared by every pipeline stage.
#[derive(Debug, Clone)]
pub struct StudyConfig {
    /// Election day (2020-11-03 in the source study).
    pub election_day: NaiveDate,
    /// Earliest voting date across all states (widest treatment window).
    pub earliest_voting_date: NaiveDate,
    /// Earliest voting date per state code.
    pub voting_dates: BTreeMap<String, NaiveDate>,
    /// Control-window lengths to sweep (days past election day).
    pub control_windows: Vec<i64>,
    /// Treatment-rollback offsets swept per control window: `0..rollback_days`.
    pub rollback_days: i64,
    /// Joint-balance p-value at or below which a split counts as imbalanced.
    pub balance_p_threshold: f64,
    /// Windows shorter than this many treatment days are dropped.
    pub min_treatment_days: i64,
}

impl StudyConfig {
    /// Build a config from an election day and the per-state voting-date
    /// table. The global earliest voting date is the table minimum.
    pub fn new(election_day: NaiveDate, voting_dates: BTreeMap<String, NaiveDate>) -> Result<Self> {
        let earliest_voting_date = voting_dates
            .values()
            .min()
            .copied()
            .ok_or_else(|| Error::Config("voting-date table is empty".into()))?;
        if earliest_voting_date >= election_day {
            return Err(Error::Config(format!(
                "earliest voting date {} is not before election day {}",
                earliest_voting_date, election_day
            )));
        }
        Ok(Self {
            election_day,
            earliest_voting_date,
            voting_dates,
            // Control windows are weekly multiples, 7..=42 days.
            control_windows: (1..=6).map(|n| 7 * n).collect(),
            rollback_days: 54,
            balance_p_threshold: 0.1,
            min_treatment_days: 7,
        })
    }

    /// Widest possible treatment window, in days.
    pub fn max_voting_window_days(&self) -> i64 {
        (self.election_day - self.earliest_voting_date).num_days()
    }

    /// Treatment days remaining once the window start is rolled back by
    /// `rollback` days. Keys the per-cell cohort artifact.
    pub fn treatment_days_remaining(&self, rollback: i64) -> i64 {
        self.max_voting_window_days() - rollback
    }
}
