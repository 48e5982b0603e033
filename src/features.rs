//! RFM metric derivation
//!
//! This module derives Recency / Frequency / Monetary metrics from raw records:
//! - Recency: days from each record's date to the latest date in the working set
//! - Frequency: total rentals
//! - Monetary: registered-user rentals
//!
//! Recency is relative to the set passed in, so a different filtered view of
//! the same dataset yields different recency values.

use crate::error::{ComputeError, InvalidInput};
use crate::types::{DerivedMetrics, Record, RfmRecord, SkippedRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Output of metric derivation over one working set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    /// Records with parseable dates, in input order
    pub records: Vec<RfmRecord>,
    /// Records excluded because their date did not parse
    pub skipped: Vec<SkippedRecord>,
    /// Latest date in the working set; recency is measured from here
    pub reference_date: NaiveDate,
}

impl MetricReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Deriver for computing RFM metrics
pub struct MetricDeriver;

impl MetricDeriver {
    /// Derive RFM metrics for every record with a parseable date
    pub fn derive(records: &[Record]) -> Result<MetricReport, ComputeError> {
        if records.is_empty() {
            return Err(InvalidInput::EmptyInput.into());
        }

        let mut dated: Vec<(&Record, NaiveDate)> = Vec::with_capacity(records.len());
        let mut skipped = Vec::new();

        for (index, record) in records.iter().enumerate() {
            match parse_record_date(&record.dteday) {
                Some(date) => dated.push((record, date)),
                None => {
                    warn!(index, dteday = %record.dteday, "Skipping record with malformed date");
                    skipped.push(SkippedRecord {
                        index,
                        dteday: record.dteday.clone(),
                    });
                }
            }
        }

        let reference_date = dated
            .iter()
            .map(|(_, date)| *date)
            .max()
            .ok_or(InvalidInput::NoValidTimestamps)?;

        let records = dated
            .into_iter()
            .map(|(record, date)| RfmRecord {
                record: record.clone(),
                date,
                metrics: DerivedMetrics {
                    recency: days_between(reference_date, date),
                    frequency: record.cnt,
                    monetary: record.registered,
                },
            })
            .collect::<Vec<_>>();

        debug!(
            derived = records.len(),
            skipped = skipped.len(),
            %reference_date,
            "Derived RFM metrics"
        );

        Ok(MetricReport {
            records,
            skipped,
            reference_date,
        })
    }
}

/// Parse a dataset date into a calendar date
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS`, and RFC 3339 timestamps; the
/// time of day is dropped.
pub fn parse_record_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(datetime.date());
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|datetime| datetime.date_naive())
}

/// Whole days from `date` up to `reference`; zero when `date` is not earlier
fn days_between(reference: NaiveDate, date: NaiveDate) -> u32 {
    let days = (reference - date).num_days().max(0);
    u32::try_from(days).unwrap_or(u32::MAX)
}
