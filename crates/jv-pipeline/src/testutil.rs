//! Shared fixtures for pipeline tests.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::NaiveDate;

use jv_core::{DataSource, RunOptions, ScoreColumn, StudyConfig};

use crate::artifacts::ArtifactPaths;
use crate::records::{ChargeType, Gender, Race, Record};

/// Study config over a three-state voting-date table, election 2020-11-03.
pub(crate) fn study_config() -> StudyConfig {
    let mut dates = BTreeMap::new();
    dates.insert("AZ".to_string(), NaiveDate::from_ymd_opt(2020, 10, 7).unwrap());
    dates.insert("TX".to_string(), NaiveDate::from_ymd_opt(2020, 10, 13).unwrap());
    dates.insert("WI".to_string(), NaiveDate::from_ymd_opt(2020, 9, 17).unwrap());
    StudyConfig::new(NaiveDate::from_ymd_opt(2020, 11, 3).unwrap(), dates).unwrap()
}

/// Full-bookings options with every optional filter off.
pub(crate) fn full_options() -> RunOptions {
    RunOptions {
        source: DataSource::Full,
        active: false,
        column: ScoreColumn::ScoreWeighted,
        registered: false,
        threshold: 0.75,
        exclude_no_bond: false,
        exclude_no_charge: false,
    }
}

/// Matched-bookings options with every optional filter off.
pub(crate) fn matched_options() -> RunOptions {
    RunOptions { source: DataSource::Matched, ..full_options() }
}

/// A covariate-complete unmatched booking. State is taken from the jail id
/// prefix; the voting date matches the TX table entry.
pub(crate) fn record(jail: &str, person: &str, booking: &str, admission: NaiveDate) -> Record {
    let state = jail.split('-').next().unwrap_or("TX").to_string();
    Record {
        jail_id: jail.to_string(),
        person_id: person.to_string(),
        booking_id: booking.to_string(),
        state,
        admission_date: admission,
        release_date: admission + chrono::Duration::days(3),
        age: Some(34.0),
        gender: Some(Gender::M),
        race: Some(Race::White),
        party: None,
        charge_type: Some(ChargeType::Drug),
        num_charges: Some(2.0),
        bond: Some(500.0),
        voter_id: None,
        score_weighted: None,
        score_unweighted: None,
        active: None,
        registration_date: None,
        voted: None,
        earliest_voting_date: Some(NaiveDate::from_ymd_opt(2020, 10, 13).unwrap()),
        matched: None,
        length_of_stay: None,
        votable_days: None,
        votable_days_in_custody: None,
        pct_votable_days_in_custody: None,
    }
}

/// Artifact paths rooted in a fresh temp directory. Returns the paths and
/// the directory for cleanup.
pub(crate) fn tmp_artifacts(label: &str) -> (ArtifactPaths, PathBuf) {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let dir = std::env::temp_dir().join(format!(
        "jailvote_{}_{}_{}",
        std::process::id(),
        nanos,
        label
    ));
    (ArtifactPaths::new(&dir, &full_options()), dir)
}
