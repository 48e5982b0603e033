//! Core types for the rideseg pipeline
//!
//! This module defines the data structures that flow through each stage of the
//! pipeline: raw rental records, derived RFM metrics, and the typed feature
//! names used to build clustering input.

use crate::error::InvalidInput;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One observational unit of rental activity (one hour or one day)
///
/// Field names follow the bike-sharing dataset columns so CSV and JSON inputs
/// deserialize without a mapping layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Row identifier, when the source carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instant: Option<u64>,
    /// Calendar date (YYYY-MM-DD)
    pub dteday: String,
    /// Season (1 = spring, 2 = summer, 3 = fall, 4 = winter)
    #[serde(default)]
    pub season: u8,
    /// Year offset (0 = 2011, 1 = 2012)
    #[serde(default)]
    pub yr: u8,
    /// Month (1-12)
    #[serde(default)]
    pub mnth: u8,
    /// Hour of day (0-23), hourly rows only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hr: Option<u8>,
    /// Public holiday flag
    #[serde(default)]
    pub holiday: u8,
    /// Day of week (0 = Sunday)
    #[serde(default)]
    pub weekday: u8,
    /// Working day flag (neither weekend nor holiday)
    pub workingday: u8,
    /// Weather category (1 = clear .. 4 = heavy rain/snow)
    pub weathersit: u8,
    /// Normalized temperature
    pub temp: f64,
    /// Normalized feeling temperature
    #[serde(default)]
    pub atemp: f64,
    /// Normalized humidity
    pub hum: f64,
    /// Normalized wind speed
    pub windspeed: f64,
    /// Rentals by casual users
    #[serde(default)]
    pub casual: u32,
    /// Rentals by registered users
    #[serde(default)]
    pub registered: u32,
    /// Total rentals
    pub cnt: u32,
}

/// Recency / Frequency / Monetary metrics for one record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    /// Days between the record's date and the latest date in the working set
    pub recency: u32,
    /// Total rentals (`cnt`)
    pub frequency: u32,
    /// Registered-user rentals (`registered`)
    pub monetary: u32,
}

/// A record augmented with its parsed date and derived metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmRecord {
    #[serde(flatten)]
    pub record: Record,
    /// Parsed calendar date of `record.dteday`
    pub date: NaiveDate,
    #[serde(flatten)]
    pub metrics: DerivedMetrics,
}

/// A record left out of metric derivation because its date did not parse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
    /// Position in the input slice
    pub index: usize,
    /// The offending date value
    pub dteday: String,
}

/// Typed name of a numeric attribute usable as a clustering column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureField {
    Season,
    Mnth,
    Hr,
    Holiday,
    Weekday,
    Workingday,
    Weathersit,
    Temp,
    Atemp,
    Hum,
    Windspeed,
    Casual,
    Registered,
    Cnt,
    Recency,
    Frequency,
    Monetary,
}

impl FeatureField {
    pub const ALL: [FeatureField; 17] = [
        FeatureField::Season,
        FeatureField::Mnth,
        FeatureField::Hr,
        FeatureField::Holiday,
        FeatureField::Weekday,
        FeatureField::Workingday,
        FeatureField::Weathersit,
        FeatureField::Temp,
        FeatureField::Atemp,
        FeatureField::Hum,
        FeatureField::Windspeed,
        FeatureField::Casual,
        FeatureField::Registered,
        FeatureField::Cnt,
        FeatureField::Recency,
        FeatureField::Frequency,
        FeatureField::Monetary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureField::Season => "season",
            FeatureField::Mnth => "mnth",
            FeatureField::Hr => "hr",
            FeatureField::Holiday => "holiday",
            FeatureField::Weekday => "weekday",
            FeatureField::Workingday => "workingday",
            FeatureField::Weathersit => "weathersit",
            FeatureField::Temp => "temp",
            FeatureField::Atemp => "atemp",
            FeatureField::Hum => "hum",
            FeatureField::Windspeed => "windspeed",
            FeatureField::Casual => "casual",
            FeatureField::Registered => "registered",
            FeatureField::Cnt => "cnt",
            FeatureField::Recency => "recency",
            FeatureField::Frequency => "frequency",
            FeatureField::Monetary => "monetary",
        }
    }

    /// Whether the field only exists after metric derivation
    pub fn is_derived(&self) -> bool {
        matches!(
            self,
            FeatureField::Recency | FeatureField::Frequency | FeatureField::Monetary
        )
    }
}

impl fmt::Display for FeatureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        FeatureField::ALL
            .iter()
            .copied()
            .find(|field| field.as_str() == name)
            .ok_or_else(|| format!("unknown feature field '{}'", s.trim()))
    }
}

/// Anything that can supply named numeric features for clustering
pub trait FeatureSource {
    /// Value of `field`, or `None` when this source does not carry it
    fn feature(&self, field: FeatureField) -> Option<f64>;

    /// Build the ordered feature vector for `fields`
    fn feature_vector(&self, fields: &[FeatureField]) -> Result<Vec<f64>, InvalidInput> {
        fields
            .iter()
            .map(|&field| {
                self.feature(field).ok_or(InvalidInput::UnavailableField {
                    field: field.as_str().to_string(),
                })
            })
            .collect()
    }
}

impl FeatureSource for Record {
    fn feature(&self, field: FeatureField) -> Option<f64> {
        match field {
            FeatureField::Season => Some(f64::from(self.season)),
            FeatureField::Mnth => Some(f64::from(self.mnth)),
            FeatureField::Hr => self.hr.map(f64::from),
            FeatureField::Holiday => Some(f64::from(self.holiday)),
            FeatureField::Weekday => Some(f64::from(self.weekday)),
            FeatureField::Workingday => Some(f64::from(self.workingday)),
            FeatureField::Weathersit => Some(f64::from(self.weathersit)),
            FeatureField::Temp => Some(self.temp),
            FeatureField::Atemp => Some(self.atemp),
            FeatureField::Hum => Some(self.hum),
            FeatureField::Windspeed => Some(self.windspeed),
            FeatureField::Casual => Some(f64::from(self.casual)),
            FeatureField::Registered => Some(f64::from(self.registered)),
            FeatureField::Cnt => Some(f64::from(self.cnt)),
            FeatureField::Recency | FeatureField::Frequency | FeatureField::Monetary => None,
        }
    }
}

impl FeatureSource for RfmRecord {
    fn feature(&self, field: FeatureField) -> Option<f64> {
        match field {
            FeatureField::Recency => Some(f64::from(self.metrics.recency)),
            FeatureField::Frequency => Some(f64::from(self.metrics.frequency)),
            FeatureField::Monetary => Some(f64::from(self.metrics.monetary)),
            other => self.record.feature(other),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_record(dteday: &str, temp: f64, cnt: u32) -> Record {
        Record {
            instant: None,
            dteday: dteday.to_string(),
            season: 1,
            yr: 0,
            mnth: 1,
            hr: None,
            holiday: 0,
            weekday: 1,
            workingday: 1,
            weathersit: 1,
            temp,
            atemp: temp,
            hum: 0.5,
            windspeed: 0.2,
            casual: cnt / 4,
            registered: cnt - cnt / 4,
            cnt,
        }
    }

    #[test]
    fn test_feature_field_parse() {
        assert_eq!("temp".parse::<FeatureField>(), Ok(FeatureField::Temp));
        assert_eq!(" CNT ".parse::<FeatureField>(), Ok(FeatureField::Cnt));
        assert_eq!("recency".parse::<FeatureField>(), Ok(FeatureField::Recency));
        assert!("rainfall".parse::<FeatureField>().is_err());
    }

    #[test]
    fn test_feature_field_names_round_trip() {
        for field in FeatureField::ALL {
            assert_eq!(field.as_str().parse::<FeatureField>(), Ok(field));
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.as_str()));
        }
    }

    #[test]
    fn test_record_feature_vector() {
        let record = make_record("2024-01-01", 0.3, 120);
        let vector = record
            .feature_vector(&[FeatureField::Temp, FeatureField::Cnt, FeatureField::Weathersit])
            .unwrap();
        assert_eq!(vector, vec![0.3, 120.0, 1.0]);
    }

    #[test]
    fn test_record_lacks_derived_fields() {
        let record = make_record("2024-01-01", 0.3, 120);
        let err = record
            .feature_vector(&[FeatureField::Temp, FeatureField::Recency])
            .unwrap_err();
        assert_eq!(
            err,
            InvalidInput::UnavailableField {
                field: "recency".to_string()
            }
        );
    }

    #[test]
    fn test_daily_record_has_no_hour() {
        let record = make_record("2024-01-01", 0.3, 120);
        assert_eq!(record.feature(FeatureField::Hr), None);
    }

    #[test]
    fn test_rfm_record_features() {
        let rfm = RfmRecord {
            record: make_record("2024-01-01", 0.3, 120),
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            metrics: DerivedMetrics {
                recency: 4,
                frequency: 120,
                monetary: 90,
            },
        };
        let vector = rfm
            .feature_vector(&[
                FeatureField::Recency,
                FeatureField::Frequency,
                FeatureField::Monetary,
                FeatureField::Temp,
            ])
            .unwrap();
        assert_eq!(vector, vec![4.0, 120.0, 90.0, 0.3]);
    }
}
