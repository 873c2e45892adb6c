//! Booking/voter-match records and their derived features.
//!
//! A [`Record`] is one booking, optionally annotated with a voter-file match.
//! Raw inputs carry the source fields; the prep stage fills the derived
//! duration features and never mutates a source field. Categorical values are
//! closed enums so a malformed file fails at parse time, not inside a model.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use jv_core::{DataSource, Error, Result};

/// Reported gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    /// Male.
    M,
    /// Female.
    F,
}

/// Simplified race/ethnicity coding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Race {
    /// White.
    White,
    /// Black.
    Black,
    /// All other categories.
    Other,
}

/// Simplified party affiliation (voter-matched records only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Party {
    /// Democratic.
    Democratic,
    /// Republican.
    Republican,
    /// Non-partisan or other affiliation.
    #[serde(rename = "Non-Partisan or Other")]
    NonPartisanOrOther,
}

/// Most severe charge type on the booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeType {
    /// Violent offense.
    Violent,
    /// Public-order offense.
    PublicOrder,
    /// Property offense.
    Property,
    /// DUI.
    Dui,
    /// Drug offense.
    Drug,
    /// Criminal traffic offense.
    CriminalTraffic,
}

/// One booking record, optionally voter-matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Jail identifier (state + county key).
    pub jail_id: String,
    /// Person identifier, unique within a jail.
    pub person_id: String,
    /// Booking identifier.
    pub booking_id: String,
    /// State code.
    pub state: String,
    /// Admission date.
    pub admission_date: NaiveDate,
    /// Release date (last-seen on roster).
    pub release_date: NaiveDate,
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
    /// Voter-file identifier when matched.
    pub voter_id: Option<String>,
    /// Name-weighted match probability.
    pub score_weighted: Option<f64>,
    /// Unweighted match probability.
    pub score_unweighted: Option<f64>,
    /// Active-voter flag from the voter file (1 = active).
    pub active: Option<u8>,
    /// Voter registration date.
    pub registration_date: Option<NaiveDate>,
    /// Voted in the study election (1 = voted). Absent for unmatched rows.
    pub voted: Option<u8>,
    /// Earliest voting date for the record's state (merged during prep).
    #[serde(default)]
    pub earliest_voting_date: Option<NaiveDate>,
    /// 1 when the booking carries a voter match (derived).
    #[serde(default)]
    pub matched: Option<u8>,
    /// Days from admission to release, inclusive (derived).
    #[serde(default)]
    pub length_of_stay: Option<f64>,
    /// Days in the state's voting window (derived).
    #[serde(default)]
    pub votable_days: Option<f64>,
    /// Days of the voting window spent in custody (derived).
    #[serde(default)]
    pub votable_days_in_custody: Option<f64>,
    /// Share of the voting window spent in custody (derived).
    #[serde(default)]
    pub pct_votable_days_in_custody: Option<f64>,
}

impl Record {
    /// Person identity used for deduplication and cohort disjointness.
    ///
    /// Matched runs identify people by voter id (one person across jails);
    /// full-bookings runs only have within-jail person ids.
    pub fn person_key(&self, source: DataSource) -> String {
        match source {
            DataSource::Matched => {
                self.voter_id.clone().unwrap_or_else(|| format!("{}-{}", self.jail_id, self.person_id))
            }
            DataSource::Full => format!("{}-{}", self.jail_id, self.person_id),
        }
    }

    /// ISO week number of the admission date (the time fixed-effect bucket).
    pub fn admission_week(&self) -> u32 {
        self.admission_date.iso_week().week()
    }

    /// Source-data invariants. Violations are fatal: they indicate upstream
    /// corruption, not a condition a later filter should paper over.
    pub fn check_integrity(&self) -> Result<()> {
        if self.release_date < self.admission_date {
            return Err(Error::DataIntegrity(format!(
                "booking {}: release {} precedes admission {}",
                self.booking_id, self.release_date, self.admission_date
            )));
        }
        if self.num_charges == Some(0.0) && self.charge_type.is_some() {
            return Err(Error::DataIntegrity(format!(
                "booking {}: zero charges but a charge type is present",
                self.booking_id
            )));
        }
        if let Some(v) = self.voted {
            if v > 1 {
                return Err(Error::DataIntegrity(format!(
                    "booking {}: voted flag {} is not 0/1",
                    self.booking_id, v
                )));
            }
        }
        if let Some(a) = self.active {
            if a > 1 {
                return Err(Error::DataIntegrity(format!(
                    "booking {}: active flag {} is not 0/1",
                    self.booking_id, a
                )));
            }
        }
        Ok(())
    }

    /// Fill the derived duration features from the source dates.
    ///
    /// `votable_days` spans the state's earliest voting date through election
    /// day inclusive; custody overlap is the inclusive intersection with
    /// `[admission, release]`.
    pub fn derive_features(&mut self, election_day: NaiveDate) {
        self.matched = Some(u8::from(self.voter_id.is_some()));
        self.length_of_stay =
            Some((self.release_date - self.admission_date).num_days() as f64 + 1.0);

        if let Some(earliest) = self.earliest_voting_date {
            let votable = (election_day - earliest).num_days() + 1;
            let overlap_start = self.admission_date.max(earliest);
            let overlap_end = self.release_date.min(election_day);
            let in_custody = ((overlap_end - overlap_start).num_days() + 1).max(0);
            self.votable_days = Some(votable as f64);
            self.votable_days_in_custody = Some(in_custody as f64);
            self.pct_votable_days_in_custody = Some(in_custody as f64 / votable as f64);
        }
    }
}
