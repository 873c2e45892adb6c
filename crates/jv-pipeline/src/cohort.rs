//! Treatment/control cohort construction for one grid cell.
//!
//! [`split`] applies the temporal and eligibility filters for a
//! (control window, rollback) pair, deduplicates to one booking per person,
//! and enforces person-level disjointness between the groups. It is a pure
//! function of its inputs; an empty cohort is a valid outcome.
//!
//! [`model_frame`] is the single design-matrix builder used by the grid
//! search and every later re-fit, so a persisted cohort always models
//! identically to a fresh one.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use jv_core::{DataSource, Error, Result, RunOptions, StudyConfig};
use jv_panel::PanelData;

use crate::records::{ChargeType, Gender, Party, Race, Record};

/// One cohort member with every derived column the modeling stages read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortRow {
    /// Jail identifier (the entity fixed-effect key).
    pub jail_id: String,
    /// Person identifier within the jail.
    pub person_id: String,
    /// State code.
    pub state: String,
    /// Admission date.
    pub admission_date: chrono::NaiveDate,
    /// Release date.
    pub release_date: chrono::NaiveDate,
    /// 1 = admitted on or before election day (treatment), 0 = control.
    pub treatment: u8,
    /// ISO week of admission (the time fixed-effect key).
    pub week: u32,
    /// Age at detention.
    pub age: Option<f64>,
    /// Reported gender.
    pub gender: Option<Gender>,
    /// Simplified race.
    pub race: Option<Race>,
    /// Party affiliation (matched records only).
    pub party: Option<Party>,
    /// Most severe charge type.
    pub charge_type: Option<ChargeType>,
    /// Number of charges.
    pub num_charges: Option<f64>,
    /// Bond amount.
    pub bond: Option<f64>,
    /// 1 when the booking carries a voter match.
    pub matched: u8,
    /// Voted in the study election.
    pub voted: Option<u8>,
    /// Days from admission to release, inclusive.
    pub length_of_stay: f64,
    /// Days in the state's voting window.
    pub votable_days: f64,
    /// Voting-window days spent in custody.
    pub votable_days_in_custody: f64,
    /// Share of the voting window spent in custody.
    pub pct_votable_days_in_custody: f64,
}

impl CohortRow {
    fn build(record: &Record, treatment: u8, config: &StudyConfig) -> Self {
        // Re-derive duration features through the same code path prep uses,
        // so a cohort built from raw records matches one built from a
        // prepped file byte for byte.
        let mut r = record.clone();
        r.derive_features(config.election_day);
        CohortRow {
            jail_id: r.jail_id,
            person_id: r.person_id,
            state: r.state,
            admission_date: r.admission_date,
            release_date: r.release_date,
            treatment,
            week: record.admission_week(),
            age: r.age,
            gender: r.gender,
            race: r.race,
            party: r.party,
            charge_type: r.charge_type,
            num_charges: r.num_charges,
            bond: r.bond,
            matched: r.matched.unwrap_or(0),
            voted: r.voted,
            length_of_stay: r.length_of_stay.unwrap_or(0.0),
            votable_days: r.votable_days.unwrap_or(0.0),
            votable_days_in_custody: r.votable_days_in_custody.unwrap_or(0.0),
            pct_votable_days_in_custody: r.pct_votable_days_in_custody.unwrap_or(0.0),
        }
    }
}

/// The treatment+control record set for one grid cell's model fit.
#[derive(Debug, Clone, Default)]
pub struct Cohort {
    /// Treatment rows followed by control rows, each group ordered by
    /// (person key, admission date).
    pub rows: Vec<CohortRow>,
}

impl Cohort {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the cohort has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Split `records` into the deduplicated treatment/control cohort for one
/// (control window, rollback) pair.
pub fn split(
    records: &[Record],
    control_days: i64,
    rollback_days: i64,
    opts: &RunOptions,
    config: &StudyConfig,
) -> Cohort {
    let window_start = config.earliest_voting_date + Duration::days(rollback_days);
    let window_end = config.election_day + Duration::days(control_days);

    // Window filters and treatment assignment. A record must fall inside the
    // grid cell's admission window and inside its own state's voting period.
    let mut treatment_group: Vec<(String, &Record)> = Vec::new();
    let mut control_group: Vec<(String, &Record)> = Vec::new();
    for r in records {
        if r.admission_date < window_start || r.admission_date > window_end {
            continue;
        }
        let state_earliest = match r.earliest_voting_date {
            Some(d) => d,
            None => continue,
        };
        if r.admission_date < state_earliest {
            continue;
        }
        let key = r.person_key(opts.source);
        if r.admission_date <= config.election_day {
            treatment_group.push((key, r));
        } else {
            control_group.push((key, r));
        }
    }

    // One booking per person per group: keep the latest admission.
    let treatment_group = dedup_keep_latest(treatment_group);
    let mut control_group = dedup_keep_latest(control_group);

    // A person admitted during the voting window can never serve as their own
    // control: treatment membership wins.
    let treated: std::collections::HashSet<&str> =
        treatment_group.iter().map(|(k, _)| k.as_str()).collect();
    control_group.retain(|(k, _)| !treated.contains(k.as_str()));

    let complete = |r: &Record| -> bool {
        r.age.is_some()
            && r.gender.is_some()
            && r.race.is_some()
            && (opts.source != DataSource::Matched || r.party.is_some())
            && (!opts.exclude_no_charge || (r.charge_type.is_some() && r.num_charges.is_some()))
            && (!opts.exclude_no_bond || r.bond.is_some())
    };

    let mut rows = Vec::new();
    for (group, flag) in [(treatment_group, 1u8), (control_group, 0u8)] {
        for (_, r) in group {
            if !complete(r) {
                continue;
            }
            let mut row = CohortRow::build(r, flag, config);
            if opts.source == DataSource::Full {
                // Unmatched bookings are assumed non-voters.
                row.voted = Some(row.voted.unwrap_or(0));
            }
            rows.push(row);
        }
    }
    Cohort { rows }
}

/// Stable sort by (person key, admission date) ascending, then keep the last
/// booking per person key.
fn dedup_keep_latest(mut group: Vec<(String, &Record)>) -> Vec<(String, &Record)> {
    group.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.admission_date.cmp(&b.1.admission_date)));
    let mut out: Vec<(String, &Record)> = Vec::with_capacity(group.len());
    for item in group {
        if out.last().map(|(k, _)| k == &item.0).unwrap_or(false) {
            out.pop();
        }
        out.push(item);
    }
    out
}

// ---------------------------------------------------------------------------
// Covariate sets and the design-matrix builder
// ---------------------------------------------------------------------------

/// Balance-check covariates: demographics + charge one-hots + charge count.
///
/// Length of stay is deliberately excluded — it is itself a function of the
/// temporal window under test. Gender F, race Other, party Other, and the
/// criminal-traffic charge are the leave-one-out references.
pub fn balance_covariates(source: DataSource) -> Vec<&'static str> {
    let mut cols = vec!["age", "gender_m", "race_white", "race_black"];
    if source == DataSource::Matched {
        cols.extend(["party_republican", "party_democratic"]);
    }
    cols.extend([
        "charge_violent",
        "charge_public_order",
        "charge_property",
        "charge_dui",
        "charge_drug",
        "num_charges",
    ]);
    cols
}

/// Turnout covariates: the balance set plus length of stay.
pub fn turnout_covariates(source: DataSource) -> Vec<&'static str> {
    let mut cols = balance_covariates(source);
    cols.push("length_of_stay");
    cols
}

/// Heterogeneity covariates: the turnout set without the race dummies,
/// which enter the interaction design directly.
pub fn heterogeneity_covariates(source: DataSource) -> Vec<&'static str> {
    turnout_covariates(source)
        .into_iter()
        .filter(|c| *c != "race_white" && *c != "race_black")
        .collect()
}

/// Build the panel design frame for `columns` over `rows`.
///
/// Rows missing a value for any requested column are dropped, matching the
/// NA-row handling of formula-based fitting. Jail ids map to dense entity
/// labels in sorted order; the ISO week is the time label.
pub fn model_frame(rows: &[CohortRow], columns: &[&str]) -> Result<PanelData> {
    let mut kept: Vec<&CohortRow> = Vec::with_capacity(rows.len());
    let mut values: Vec<Vec<f64>> = Vec::with_capacity(rows.len());
    'rows: for row in rows {
        let mut row_values = Vec::with_capacity(columns.len());
        for col in columns {
            match column_value(row, col)? {
                Some(v) => row_values.push(v),
                None => continue 'rows,
            }
        }
        kept.push(row);
        values.push(row_values);
    }

    let mut jail_ids: Vec<&str> = kept.iter().map(|r| r.jail_id.as_str()).collect();
    jail_ids.sort_unstable();
    jail_ids.dedup();

    let entity: Vec<u64> = kept
        .iter()
        .map(|r| jail_ids.binary_search(&r.jail_id.as_str()).unwrap_or(0) as u64)
        .collect();
    let time: Vec<u64> = kept.iter().map(|r| u64::from(r.week)).collect();

    let mut data = PanelData::new(entity, time)?;
    for (j, col) in columns.iter().enumerate() {
        data = data.with_column(col, values.iter().map(|v| v[j]).collect())?;
    }
    Ok(data)
}

/// Numeric value of a named model column for one row; `None` when the row is
/// missing the underlying field. Unknown names are a validation error.
fn column_value(row: &CohortRow, name: &str) -> Result<Option<f64>> {
    let dummy = |hit: bool| Some(if hit { 1.0 } else { 0.0 });
    let v = match name {
        "treatment" => Some(f64::from(row.treatment)),
        "voted" => row.voted.map(f64::from),
        "age" => row.age,
        "gender_m" => row.gender.and_then(|g| dummy(g == Gender::M)),
        "race_white" => row.race.and_then(|x| dummy(x == Race::White)),
        "race_black" => row.race.and_then(|x| dummy(x == Race::Black)),
        "party_republican" => row.party.and_then(|p| dummy(p == Party::Republican)),
        "party_democratic" => row.party.and_then(|p| dummy(p == Party::Democratic)),
        "charge_violent" => row.charge_type.and_then(|c| dummy(c == ChargeType::Violent)),
        "charge_public_order" => row.charge_type.and_then(|c| dummy(c == ChargeType::PublicOrder)),
        "charge_property" => row.charge_type.and_then(|c| dummy(c == ChargeType::Property)),
        "charge_dui" => row.charge_type.and_then(|c| dummy(c == ChargeType::Dui)),
        "charge_drug" => row.charge_type.and_then(|c| dummy(c == ChargeType::Drug)),
        "num_charges" => row.num_charges,
        "bond" => row.bond,
        "matched" => Some(f64::from(row.matched)),
        "length_of_stay" => Some(row.length_of_stay),
        "pct_votable_days_in_custody" => Some(row.pct_votable_days_in_custody),
        "treatment_x_black" => row
            .race
            .map(|x| if x == Race::Black { f64::from(row.treatment) } else { 0.0 }),
        "pct_votable_days_in_custody_x_black" => row
            .race
            .map(|x| if x == Race::Black { row.pct_votable_days_in_custody } else { 0.0 }),
        other => {
            return Err(Error::Validation(format!("unknown model column '{}'", other)));
        }
    };
    Ok(v)
}
