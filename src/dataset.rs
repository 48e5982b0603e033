//! Dataset adapter
//!
//! Decodes rental records from CSV (the dataset's native format), JSON arrays
//! or NDJSON, and checks them for problems the core would otherwise absorb
//! silently.

use crate::error::ComputeError;
use crate::features::parse_record_date;
use crate::types::Record;
use serde::Serialize;
use std::io::Read;

/// Adapter for decoding and validating record sets
pub struct DatasetAdapter;

impl DatasetAdapter {
    /// Parse CSV with a header row naming the dataset columns
    pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<Record>, ComputeError> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut records = Vec::new();
        for result in rdr.deserialize() {
            records.push(result?);
        }
        Ok(records)
    }

    /// Parse a JSON string containing an array of records
    pub fn parse_array(json: &str) -> Result<Vec<Record>, ComputeError> {
        let records: Vec<Record> = serde_json::from_str(json)?;
        Ok(records)
    }

    /// Parse NDJSON (newline-delimited JSON) containing records
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<Record>, ComputeError> {
        let mut records = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Record>(trimmed) {
                Ok(record) => records.push(record),
                Err(e) => {
                    return Err(ComputeError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(records)
    }

    /// Check every record and return the problems found
    pub fn validate_records(records: &[Record]) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (index, record) in records.iter().enumerate() {
            for problem in record_problems(record) {
                issues.push(ValidationIssue {
                    index,
                    instant: record.instant,
                    problem,
                });
            }
        }
        issues
    }
}

/// One problem found on one record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationIssue {
    pub index: usize,
    pub instant: Option<u64>,
    pub problem: RecordProblem,
}

/// Kinds of record-level problems
#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordProblem {
    #[error("malformed date '{value}'")]
    MalformedTimestamp { value: String },

    #[error("weather category {value} outside 1-4")]
    WeatherOutOfRange { value: u8 },

    #[error("field '{field}' has invalid value {value}")]
    InvalidCovariate { field: &'static str, value: f64 },

    #[error("cnt {cnt} != casual {casual} + registered {registered}")]
    CountMismatch {
        cnt: u32,
        casual: u32,
        registered: u32,
    },
}

fn record_problems(record: &Record) -> Vec<RecordProblem> {
    let mut problems = Vec::new();

    if parse_record_date(&record.dteday).is_none() {
        problems.push(RecordProblem::MalformedTimestamp {
            value: record.dteday.clone(),
        });
    }

    if !(1..=4).contains(&record.weathersit) {
        problems.push(RecordProblem::WeatherOutOfRange {
            value: record.weathersit,
        });
    }

    for (field, value) in [
        ("temp", record.temp),
        ("atemp", record.atemp),
        ("hum", record.hum),
        ("windspeed", record.windspeed),
    ] {
        if !value.is_finite() || value < 0.0 {
            problems.push(RecordProblem::InvalidCovariate { field, value });
        }
    }

    // Some exports only carry `cnt`; the split is checked when present.
    let split = u64::from(record.casual) + u64::from(record.registered);
    if split != 0 && split != u64::from(record.cnt) {
        problems.push(RecordProblem::CountMismatch {
            cnt: record.cnt,
            casual: record.casual,
            registered: record.registered,
        });
    }

    problems
}
