//! Record preparation: integrity checks, sample-selection filters, and
//! derived features.
//!
//! The prep stage turns the raw merged booking/match extract into the
//! prepped record set every later stage consumes. Integrity violations are
//! fatal — they mean the upstream extract is corrupt, and nothing downstream
//! should run on it.

use std::collections::HashMap;

use chrono::Duration;

use jv_core::{DataSource, Result, RunOptions, ScoreColumn, StudyConfig};

use crate::records::Record;

/// Admissions farther than this from election day are out of scope.
const ADMISSION_MARGIN_DAYS: i64 = 90;

/// Prep the raw record set for one run configuration.
pub fn prep(raw: Vec<Record>, opts: &RunOptions, config: &StudyConfig) -> Result<Vec<Record>> {
    for r in &raw {
        r.check_integrity()?;
    }
    let n_raw = raw.len();

    let earliest = config.election_day - Duration::days(ADMISSION_MARGIN_DAYS);
    let latest = config.election_day + Duration::days(ADMISSION_MARGIN_DAYS);

    let mut out: Vec<Record> = Vec::with_capacity(raw.len());
    for mut r in raw {
        // Only people 18 years old at detention; unknown ages stay.
        if r.age.map(|a| a < 18.0).unwrap_or(false) {
            continue;
        }
        if r.admission_date < earliest || r.admission_date > latest {
            continue;
        }

        // Merge the state's earliest voting date.
        r.earliest_voting_date = config.voting_dates.get(&r.state).copied();

        // Screen the voter-match annotation: probability threshold on the
        // configured score column, plus the optional active/registered
        // filters.
        let score = match opts.column {
            ScoreColumn::ScoreWeighted => r.score_weighted,
            ScoreColumn::ScoreUnweighted => r.score_unweighted,
        };
        let match_ok = r.voter_id.is_some()
            && score.map(|s| s > opts.threshold).unwrap_or(false)
            && (!opts.active || r.active == Some(1))
            && (!opts.registered
                || r.registration_date.map(|d| d <= config.election_day).unwrap_or(false));

        match opts.source {
            // Matched runs keep only rows that survive the screen.
            DataSource::Matched => {
                if !match_ok {
                    continue;
                }
            }
            // Full-bookings runs keep the booking and strip a failed match
            // annotation, so the row models as unmatched.
            DataSource::Full => {
                if !match_ok {
                    r.voter_id = None;
                    r.voted = None;
                    r.active = None;
                    r.registration_date = None;
                }
            }
        }

        r.derive_features(config.election_day);
        out.push(r);
    }

    if opts.exclude_no_charge {
        exclude_no_charge_jails(&mut out);
    }
    if opts.exclude_no_bond {
        exclude_no_bond_jails(&mut out);
    }

    tracing::info!(records_in = n_raw, records_out = out.len(), "prep complete");
    Ok(out)
}

/// Drop every record from jails that report no charge counts at all, or no
/// charge types at all — their missingness is a jail-level reporting gap,
/// not person-level.
fn exclude_no_charge_jails(records: &mut Vec<Record>) {
    let mut totals: HashMap<String, (f64, bool)> = HashMap::new();
    for r in records.iter() {
        let entry = totals.entry(r.jail_id.clone()).or_insert((0.0, false));
        entry.0 += r.num_charges.unwrap_or(0.0);
        entry.1 |= r.charge_type.is_some();
    }
    let before = records.len();
    records.retain(|r| {
        let (charges, any_type) = totals[&r.jail_id];
        charges > 0.0 && any_type
    });
    tracing::info!(dropped = before - records.len(), "excluded records from no-charge jails");
}

/// Drop every record from jails whose reported bond amounts sum to zero.
fn exclude_no_bond_jails(records: &mut Vec<Record>) {
    let mut totals: HashMap<String, f64> = HashMap::new();
    for r in records.iter() {
        *totals.entry(r.jail_id.clone()).or_insert(0.0) += r.bond.unwrap_or(0.0);
    }
    let before = records.len();
    records.retain(|r| totals[&r.jail_id] > 0.0);
    tracing::info!(dropped = before - records.len(), "excluded records from no-bond jails");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{full_options, matched_options, record, study_config};
    use chrono::NaiveDate;
    use jv_core::Error;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn integrity_violation_aborts_the_run() {
        let config = study_config();
        let opts = full_options();
        let mut bad = record("TX-Travis", "p1", "b1", d(2020, 10, 20));
        bad.num_charges = Some(0.0); // but a charge type is present
        assert!(matches!(prep(vec![bad], &opts, &config), Err(Error::DataIntegrity(_))));
    }

    #[test]
    fn under_18_and_out_of_range_rows_dropped() {
        let config = study_config();
        let opts = full_options();
        let mut minor = record("TX-Travis", "p1", "b1", d(2020, 10, 20));
        minor.age = Some(17.0);
        let stale = record("TX-Travis", "p2", "b2", d(2020, 5, 1));
        let keep = record("TX-Travis", "p3", "b3", d(2020, 10, 20));
        let out = prep(vec![minor, stale, keep], &opts, &config).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].person_id, "p3");
    }

    #[test]
    fn voting_dates_merge_by_state() {
        let config = study_config();
        let opts = full_options();
        let mut r = record("WI-Dane", "p1", "b1", d(2020, 10, 20));
        r.state = "WI".to_string();
        r.earliest_voting_date = None;
        let out = prep(vec![r], &opts, &config).unwrap();
        assert_eq!(out[0].earliest_voting_date, Some(d(2020, 9, 17)));
        assert!(out[0].pct_votable_days_in_custody.is_some());
    }

    #[test]
    fn matched_run_drops_rows_below_threshold() {
        let config = study_config();
        let opts = matched_options();
        let mut strong = record("TX-Travis", "p1", "b1", d(2020, 10, 20));
        strong.voter_id = Some("v1".to_string());
        strong.score_weighted = Some(0.9);
        strong.party = Some(crate::records::Party::Democratic);
        strong.voted = Some(1);
        let mut weak = strong.clone();
        weak.person_id = "p2".to_string();
        weak.voter_id = Some("v2".to_string());
        weak.score_weighted = Some(0.5);
        let out = prep(vec![strong, weak], &opts, &config).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].voter_id.as_deref(), Some("v1"));
        assert_eq!(out[0].matched, Some(1));
    }

    #[test]
    fn full_run_strips_failed_match_annotations() {
        let config = study_config();
        let opts = full_options();
        let mut weak = record("TX-Travis", "p1", "b1", d(2020, 10, 20));
        weak.voter_id = Some("v1".to_string());
        weak.score_weighted = Some(0.5);
        weak.voted = Some(1);
        let out = prep(vec![weak], &opts, &config).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].voter_id.is_none());
        assert!(out[0].voted.is_none());
        assert_eq!(out[0].matched, Some(0));
    }

    #[test]
    fn registered_filter_uses_registration_date() {
        let config = study_config();
        let mut opts = matched_options();
        opts.registered = true;
        let mut late = record("TX-Travis", "p1", "b1", d(2020, 10, 20));
        late.voter_id = Some("v1".to_string());
        late.score_weighted = Some(0.9);
        late.party = Some(crate::records::Party::Republican);
        late.registration_date = Some(d(2020, 11, 10));
        let mut on_time = late.clone();
        on_time.person_id = "p2".to_string();
        on_time.voter_id = Some("v2".to_string());
        on_time.registration_date = Some(d(2020, 9, 1));
        let out = prep(vec![late, on_time], &opts, &config).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].person_id, "p2");
    }

    #[test]
    fn no_charge_jails_excluded_wholesale() {
        let config = study_config();
        let mut opts = full_options();
        opts.exclude_no_charge = true;
        // TX-Silent reports no charge data on any booking.
        let mut silent_a = record("TX-Silent", "p1", "b1", d(2020, 10, 20));
        silent_a.charge_type = None;
        silent_a.num_charges = None;
        let mut silent_b = record("TX-Silent", "p2", "b2", d(2020, 10, 21));
        silent_b.charge_type = None;
        silent_b.num_charges = None;
        let reporting = record("TX-Travis", "p3", "b3", d(2020, 10, 22));
        let out = prep(vec![silent_a, silent_b, reporting], &opts, &config).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].jail_id, "TX-Travis");
    }

    #[test]
    fn no_bond_jails_excluded_wholesale() {
        let config = study_config();
        let mut opts = full_options();
        opts.exclude_no_bond = true;
        let mut no_bond = record("TX-Silent", "p1", "b1", d(2020, 10, 20));
        no_bond.bond = None;
        let with_bond = record("TX-Travis", "p2", "b2", d(2020, 10, 21));
        let out = prep(vec![no_bond, with_bond], &opts, &config).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].jail_id, "TX-Travis");
    }
}
