//! Working-set selection
//!
//! Caller-side view filters (working-day and weather multi-selects plus an
//! optional date range). The analytics core never filters; callers apply a
//! `RecordFilter` first and hand the resulting view to the pipeline.

use crate::features::parse_record_date;
use crate::types::Record;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Selection over a record set. Empty selections mean "everything".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordFilter {
    /// Accepted `workingday` values
    pub workingday: Vec<u8>,
    /// Accepted `weathersit` values
    pub weathersit: Vec<u8>,
    /// Inclusive lower date bound
    pub from: Option<NaiveDate>,
    /// Inclusive upper date bound
    pub to: Option<NaiveDate>,
}

impl RecordFilter {
    pub fn is_empty(&self) -> bool {
        self.workingday.is_empty()
            && self.weathersit.is_empty()
            && self.from.is_none()
            && self.to.is_none()
    }

    /// Whether `record` belongs to the view.
    ///
    /// With a date bound set, records whose date does not parse are excluded.
    pub fn matches(&self, record: &Record) -> bool {
        if !self.workingday.is_empty() && !self.workingday.contains(&record.workingday) {
            return false;
        }
        if !self.weathersit.is_empty() && !self.weathersit.contains(&record.weathersit) {
            return false;
        }
        if self.from.is_none() && self.to.is_none() {
            return true;
        }
        match parse_record_date(&record.dteday) {
            Some(date) => {
                self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
            }
            None => false,
        }
    }

    /// Copy of the records in the view, in input order
    pub fn apply(&self, records: &[Record]) -> Vec<Record> {
        records.iter().filter(|r| self.matches(r)).cloned().collect()
    }
}
