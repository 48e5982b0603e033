//! Report encoding
//!
//! This module encodes a segmented view into a versioned JSON report that a
//! presentation layer can render as charts and tables.

use crate::error::ComputeError;
use crate::features::MetricReport;
use crate::pipeline::{ClusterSummary, SegmentationConfig, SegmentedRecord, SegmentedView};
use crate::types::{FeatureField, RfmRecord, SkippedRecord};
use crate::{PRODUCER_NAME, RIDESEG_VERSION};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current report schema version
pub const REPORT_VERSION: &str = "1.0.0";

/// Producer metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Fit-level figures for a segmented view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationSummary {
    pub records: usize,
    pub skipped_records: usize,
    pub feature_fields: Vec<FeatureField>,
    pub degenerate_fields: Vec<FeatureField>,
    pub inertia: f64,
    pub silhouette: f64,
    pub iterations: usize,
    pub converged: bool,
    pub best_restart: usize,
}

/// Complete segmentation report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub config: SegmentationConfig,
    pub summary: SegmentationSummary,
    pub clusters: Vec<ClusterSummary>,
    pub skipped: Vec<SkippedRecord>,
    pub records: Vec<SegmentedRecord>,
}

/// RFM-only report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub report_version: String,
    pub producer: ReportProducer,
    pub computed_at_utc: String,
    pub reference_date: NaiveDate,
    pub skipped: Vec<SkippedRecord>,
    pub records: Vec<RfmRecord>,
}

/// Encoder for producing report payloads
pub struct ReportEncoder {
    instance_id: String,
}

impl Default for ReportEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    fn producer(&self) -> ReportProducer {
        ReportProducer {
            name: PRODUCER_NAME.to_string(),
            version: RIDESEG_VERSION.to_string(),
            instance_id: self.instance_id.clone(),
        }
    }

    /// Encode a segmented view
    pub fn encode(&self, view: SegmentedView, config: &SegmentationConfig) -> SegmentationReport {
        let summary = SegmentationSummary {
            records: view.records.len(),
            skipped_records: view.skipped.len(),
            feature_fields: view.feature_fields,
            degenerate_fields: view.degenerate_fields,
            inertia: view.inertia,
            silhouette: view.silhouette,
            iterations: view.iterations,
            converged: view.converged,
            best_restart: view.best_restart,
        };

        SegmentationReport {
            report_version: REPORT_VERSION.to_string(),
            producer: self.producer(),
            computed_at_utc: Utc::now().to_rfc3339(),
            config: config.clone(),
            summary,
            clusters: view.clusters,
            skipped: view.skipped,
            records: view.records,
        }
    }

    /// Encode an RFM derivation result
    pub fn encode_metrics(&self, report: MetricReport) -> MetricsReport {
        MetricsReport {
            report_version: REPORT_VERSION.to_string(),
            producer: self.producer(),
            computed_at_utc: Utc::now().to_rfc3339(),
            reference_date: report.reference_date,
            skipped: report.skipped,
            records: report.records,
        }
    }

    /// Encode to a pretty-printed JSON string
    pub fn encode_to_json(
        &self,
        view: SegmentedView,
        config: &SegmentationConfig,
    ) -> Result<String, ComputeError> {
        let report = self.encode(view, config);
        serde_json::to_string_pretty(&report).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{derive_rfm, segment_records};
    use crate::types::tests::make_record;
    use crate::types::Record;

    fn records() -> Vec<Record> {
        vec![
            make_record("2012-05-01", 0.2, 100),
            make_record("2012-05-02", 0.25, 120),
            make_record("2012-05-03", 0.8, 900),
            make_record("2012-05-04", 0.85, 950),
        ]
    }

    #[test]
    fn test_encode_segmentation_report() {
        let config = SegmentationConfig {
            n_clusters: 2,
            ..Default::default()
        };
        let view = segment_records(&records(), &config).unwrap();
        let encoder = ReportEncoder::with_instance_id("test-instance".to_string());

        let json = encoder.encode_to_json(view, &config).unwrap();
        let payload: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(payload["report_version"], "1.0.0");
        assert_eq!(payload["producer"]["name"], "rideseg");
        assert_eq!(payload["producer"]["instance_id"], "test-instance");
        assert_eq!(payload["config"]["n_clusters"], 2);
        assert_eq!(payload["summary"]["records"], 4);
        assert_eq!(payload["summary"]["feature_fields"][1], "cnt");
        assert_eq!(payload["clusters"].as_array().unwrap().len(), 2);

        let first = &payload["records"][0];
        assert_eq!(first["dteday"], "2012-05-01");
        assert!(first["cluster"].as_u64().unwrap() < 2);
        assert!(first.get("recency").is_none());
    }

    #[test]
    fn test_rfm_fields_are_flattened() {
        let config = SegmentationConfig {
            feature_fields: vec![FeatureField::Recency, FeatureField::Frequency],
            n_clusters: 2,
            ..Default::default()
        };
        let view = segment_records(&records(), &config).unwrap();
        let report = ReportEncoder::new().encode(view, &config);
        let payload = serde_json::to_value(&report).unwrap();

        assert_eq!(payload["records"][3]["recency"], 0);
        assert_eq!(payload["records"][0]["recency"], 3);
        assert_eq!(payload["records"][0]["frequency"], 100);
    }

    #[test]
    fn test_encode_metrics_report() {
        let report = derive_rfm(&records()).unwrap();
        let encoded = ReportEncoder::new().encode_metrics(report);
        let payload = serde_json::to_value(&encoded).unwrap();

        assert_eq!(payload["reference_date"], "2012-05-04");
        assert_eq!(payload["records"][1]["recency"], 2);
        assert_eq!(payload["records"][1]["monetary"], 90);
    }

    #[test]
    fn test_unique_instance_ids() {
        let a = ReportEncoder::new();
        let b = ReportEncoder::new();
        assert_ne!(a.instance_id, b.instance_id);
    }
}
