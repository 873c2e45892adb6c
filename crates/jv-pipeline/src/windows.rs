//! Experimental-window selection from the balance grid.
//!
//! Per control window the rule is *last violation*, not first crossing: the
//! earliest viable treatment start is one day after the latest date at which
//! the joint balance test still rejects. p-value sequences over rollback are
//! noisy — a window only counts as safe once every later date is clean.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use jv_core::StudyConfig;

use crate::balance::BalanceRecord;

/// A selected (control length, treatment length) pair with its start date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentalWindow {
    /// Control-window length in days.
    pub control_days: i64,
    /// Earliest treatment start date at which balance holds.
    pub earliest_viable_date: NaiveDate,
    /// Treatment-window length in days.
    pub treatment_days: i64,
}

/// Choose one experimental window per control window.
///
/// Windows whose treatment span falls below the configured minimum (one
/// week) are dropped as not meaningfully estimable. Unfit grid cells carry
/// no p-value and never count as violations.
pub fn select(records: &[BalanceRecord], config: &StudyConfig) -> Vec<ExperimentalWindow> {
    let mut by_control: BTreeMap<i64, Vec<&BalanceRecord>> = BTreeMap::new();
    for r in records {
        by_control.entry(r.control_days).or_default().push(r);
    }

    let mut windows = Vec::with_capacity(by_control.len());
    for (control_days, cells) in by_control {
        let earliest_overall = match cells.iter().map(|r| r.earliest_date).min() {
            Some(d) => d,
            None => continue,
        };
        let last_imbalanced = cells
            .iter()
            .filter(|r| r.p_value.map(|p| p <= config.balance_p_threshold).unwrap_or(false))
            .map(|r| r.earliest_date)
            .max();
        let earliest_viable_date = match last_imbalanced {
            Some(d) => d + Duration::days(1),
            // No imbalance anywhere in this control window: the widest
            // rollback-0 window is usable.
            None => earliest_overall,
        };
        let treatment_days = (config.election_day - earliest_viable_date).num_days();
        if treatment_days < config.min_treatment_days {
            tracing::info!(control_days, treatment_days, "dropping short window");
            continue;
        }
        windows.push(ExperimentalWindow { control_days, earliest_viable_date, treatment_days });
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::study_config;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn cell(control: i64, rollback: i64, base: NaiveDate, p: Option<f64>) -> BalanceRecord {
        BalanceRecord {
            control_days: control,
            rollback_days: rollback,
            earliest_date: base + Duration::days(rollback),
            f_statistic: p.map(|_| 1.0),
            p_value: p,
            observations: 100,
        }
    }

    #[test]
    fn last_violation_wins_over_first_recovery() {
        let config = study_config();
        let base = config.earliest_voting_date;
        // p-values over increasing earliest dates d0..d5; violations (<= 0.1)
        // at d1 and d3. A first-crossing rule would pick d2 — the correct
        // answer is one day after d3.
        let ps = [0.20, 0.05, 0.30, 0.02, 0.50, 0.50];
        let records: Vec<_> =
            ps.iter().enumerate().map(|(i, &p)| cell(7, i as i64, base, Some(p))).collect();
        let windows = select(&records, &config);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].earliest_viable_date, base + Duration::days(4));
        assert_eq!(
            windows[0].treatment_days,
            (config.election_day - (base + Duration::days(4))).num_days()
        );
    }

    #[test]
    fn no_violation_falls_back_to_widest_window() {
        let config = study_config();
        let base = config.earliest_voting_date;
        let records: Vec<_> =
            (0..6).map(|i| cell(14, i, base, Some(0.5))).collect();
        let windows = select(&records, &config);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].earliest_viable_date, base);
    }

    #[test]
    fn unfit_cells_are_not_violations() {
        let config = study_config();
        let base = config.earliest_voting_date;
        let records = vec![
            cell(7, 0, base, Some(0.05)),
            cell(7, 1, base, None), // unfit — must not extend the violation
            cell(7, 2, base, Some(0.9)),
        ];
        let windows = select(&records, &config);
        assert_eq!(windows[0].earliest_viable_date, base + Duration::days(1));
    }

    #[test]
    fn seven_day_boundary_is_inclusive() {
        let mut config = study_config();
        config.election_day = d(2020, 11, 3);
        let base = config.earliest_voting_date;
        let span = (config.election_day - base).num_days();

        // Violation placed so the surviving window is exactly 7 days.
        let exact = vec![cell(7, span - 8, base, Some(0.01)), cell(7, span - 7, base, Some(0.5))];
        let windows = select(&exact, &config);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].treatment_days, 7);

        // One day later: 6 days remain and the window is dropped.
        let short = vec![cell(7, span - 7, base, Some(0.01)), cell(7, span - 6, base, Some(0.5))];
        assert!(select(&short, &config).is_empty());
    }

    #[test]
    fn one_window_per_control_length() {
        let config = study_config();
        let base = config.earliest_voting_date;
        let mut records = Vec::new();
        for control in [7, 14] {
            for i in 0..3 {
                records.push(cell(control, i, base, Some(0.5)));
            }
        }
        let windows = select(&records, &config);
        assert_eq!(windows.iter().map(|w| w.control_days).collect::<Vec<_>>(), vec![7, 14]);
    }
}
