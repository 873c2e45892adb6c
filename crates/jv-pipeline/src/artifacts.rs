//! On-disk artifacts: path derivation and whole-buffer CSV/JSON I/O.
//!
//! Every artifact lives under the run's combo path, so independently-invoked
//! stages of the same configuration find each other's output. Writers
//! serialize the full payload in memory and hit the filesystem once — a
//! failed stage leaves no partial CSV/JSON behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use jv_core::{Result, RunOptions};

/// Artifact locations for one run configuration.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    root: PathBuf,
    combo: String,
}

impl ArtifactPaths {
    /// Derive the artifact tree under `root` for `opts`.
    pub fn new(root: impl Into<PathBuf>, opts: &RunOptions) -> Self {
        Self { root: root.into(), combo: opts.combo_path() }
    }

    /// The run's combo path key.
    pub fn combo(&self) -> &str {
        &self.combo
    }

    /// Prepped record CSV written by the prep stage.
    pub fn prepped_records_csv(&self) -> PathBuf {
        self.root.join("prepped_data").join(&self.combo).join("merged.csv")
    }

    /// Directory holding the balance grid and its per-cell cohorts.
    pub fn balance_dir(&self) -> PathBuf {
        self.root.join("balance_iteration").join(&self.combo)
    }

    /// Per-cell cohort CSV, keyed by control window and remaining
    /// treatment days.
    pub fn cohort_csv(&self, control_days: i64, treatment_days: i64) -> PathBuf {
        self.balance_dir().join(format!("c_{}", control_days)).join(format!("t_{}.csv", treatment_days))
    }

    /// Grid-level balance CSV.
    pub fn grid_csv(&self) -> PathBuf {
        self.balance_dir().join("full_splits.csv")
    }

    /// Selected experimental windows CSV.
    pub fn windows_csv(&self) -> PathBuf {
        self.balance_dir().join("experimental_windows.csv")
    }

    /// Balance re-fit results for the selected windows.
    pub fn balance_models_json(&self) -> PathBuf {
        self.root.join("modeled_balance").join(format!("{}.json", self.combo))
    }

    /// Turnout modeling results.
    pub fn turnout_models_json(&self) -> PathBuf {
        self.root.join("modeled_turnout").join(format!("{}.json", self.combo))
    }

    /// Heterogeneity modeling results; the race-reporting restriction gets
    /// its own directory.
    pub fn heterogeneity_models_json(&self, race_reporting_only: bool) -> PathBuf {
        let dir = if race_reporting_only {
            "modeled_turnout_heterogeneous_race_reporting"
        } else {
            "modeled_turnout_heterogeneous"
        };
        self.root.join(dir).join(format!("{}.json", self.combo))
    }
}

/// Serialize `rows` to CSV in memory, then write the file in one call.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut w = csv::Writer::from_writer(Vec::new());
    for row in rows {
        w.serialize(row)?;
    }
    let buf = w.into_inner().map_err(|e| jv_core::Error::Io(e.into_error()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, buf)?;
    Ok(())
}

/// Read a whole CSV file into typed rows.
pub fn read_csv<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rd = csv::Reader::from_path(path)?;
    let rows = rd.deserialize().collect::<std::result::Result<Vec<T>, csv::Error>>()?;
    Ok(rows)
}

/// Serialize `value` to pretty JSON in memory, then write the file once.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let buf = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, buf)?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct VotingDateRow {
    state: String,
    earliest_voting_date: NaiveDate,
}

/// Load the per-state earliest-voting-date table.
pub fn read_voting_dates(path: &Path) -> Result<BTreeMap<String, NaiveDate>> {
    let rows: Vec<VotingDateRow> = read_csv(path)?;
    Ok(rows.into_iter().map(|r| (r.state, r.earliest_voting_date)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jv_core::{DataSource, ScoreColumn};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn opts() -> RunOptions {
        RunOptions {
            source: DataSource::Full,
            active: false,
            column: ScoreColumn::ScoreWeighted,
            registered: false,
            threshold: 0.75,
            exclude_no_bond: false,
            exclude_no_charge: true,
        }
    }

    fn tmp_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        std::env::temp_dir().join(format!("jailvote_{}_{}_{}", std::process::id(), nanos, label))
    }

    #[test]
    fn paths_follow_the_combo_key() {
        let p = ArtifactPaths::new("/out", &opts());
        assert_eq!(p.combo(), "a_f_c_score_weighted_r_f_t_0.75_xb_f_xc_t");
        assert_eq!(
            p.cohort_csv(14, 40),
            PathBuf::from("/out/balance_iteration/a_f_c_score_weighted_r_f_t_0.75_xb_f_xc_t/c_14/t_40.csv")
        );
        assert!(p.grid_csv().ends_with("full_splits.csv"));
        assert!(p.windows_csv().ends_with("experimental_windows.csv"));
        assert!(p
            .turnout_models_json()
            .ends_with("modeled_turnout/a_f_c_score_weighted_r_f_t_0.75_xb_f_xc_t.json"));
    }

    #[test]
    fn csv_round_trip_creates_parents() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Row {
            name: String,
            value: Option<f64>,
        }
        let dir = tmp_dir("csv");
        let path = dir.join("nested").join("rows.csv");
        let rows =
            vec![Row { name: "a".into(), value: Some(1.5) }, Row { name: "b".into(), value: None }];
        write_csv(&path, &rows).unwrap();
        let back: Vec<Row> = read_csv(&path).unwrap();
        assert_eq!(back, rows);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn voting_dates_table_parses() {
        let dir = tmp_dir("dates");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("voting_dates.csv");
        fs::write(&path, "state,earliest_voting_date\nTX,2020-10-13\nWI,2020-09-17\n").unwrap();
        let table = read_voting_dates(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(
            table["WI"],
            NaiveDate::from_ymd_opt(2020, 9, 17).unwrap()
        );
        fs::remove_dir_all(&dir).unwrap();
    }
}
