//! Pipeline orchestration
//!
//! This module provides the public API for rideseg.
//! It runs one filtered working set through metric derivation, feature
//! extraction, standardization and clustering, and assembles the labeled
//! records plus a per-cluster summary table.

use crate::error::{ComputeError, InvalidInput};
use crate::features::{MetricDeriver, MetricReport};
use crate::segment::{
    Segmentation, SegmentationEngine, SegmentationParams, DEFAULT_CLUSTERS,
    DEFAULT_MAX_ITERATIONS, DEFAULT_RESTARTS, DEFAULT_SEED,
};
use crate::types::{
    DerivedMetrics, FeatureField, FeatureSource, Record, SkippedRecord,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Caller-supplied configuration for one segmentation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SegmentationConfig {
    /// Fields that make up each feature vector, in order
    pub feature_fields: Vec<FeatureField>,
    /// Number of clusters (K)
    pub n_clusters: usize,
    /// Number of independent restarts (R)
    pub n_restarts: usize,
    /// Base random seed
    pub seed: u64,
    /// Bound on assignment passes per restart
    pub max_iterations: usize,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            feature_fields: vec![FeatureField::Temp, FeatureField::Cnt],
            n_clusters: DEFAULT_CLUSTERS,
            n_restarts: DEFAULT_RESTARTS,
            seed: DEFAULT_SEED,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl SegmentationConfig {
    /// Load configuration from JSON; missing keys take their defaults
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn params(&self) -> SegmentationParams {
        SegmentationParams {
            n_clusters: self.n_clusters,
            n_restarts: self.n_restarts,
            seed: self.seed,
            max_iterations: self.max_iterations,
        }
    }

    /// Whether any selected field needs RFM derivation first
    pub fn needs_metrics(&self) -> bool {
        self.feature_fields.iter().any(FeatureField::is_derived)
    }
}

/// A record with its cluster label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedRecord {
    #[serde(flatten)]
    pub record: Record,
    /// Present when the call derived RFM metrics
    #[serde(flatten)]
    pub metrics: Option<DerivedMetrics>,
    pub cluster: usize,
}

/// Per-cluster row of the centroid table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster: usize,
    /// Number of member records
    pub size: usize,
    /// Fraction of the working set in this cluster
    pub share: f64,
    /// Centroid in original feature units
    pub centroid: Vec<f64>,
    /// Centroid in standardized space
    pub centroid_standardized: Vec<f64>,
    /// Mean total rentals of members
    pub mean_cnt: Option<f64>,
    /// Mean normalized temperature of members
    pub mean_temp: Option<f64>,
}

/// Labeled working set plus cluster table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentedView {
    pub records: Vec<SegmentedRecord>,
    /// Records dropped for malformed dates (only when metrics were derived)
    pub skipped: Vec<SkippedRecord>,
    pub feature_fields: Vec<FeatureField>,
    /// Selected fields that were constant over the working set
    pub degenerate_fields: Vec<FeatureField>,
    pub clusters: Vec<ClusterSummary>,
    pub inertia: f64,
    pub silhouette: f64,
    pub iterations: usize,
    pub converged: bool,
    pub best_restart: usize,
}

/// Derive RFM metrics for a working set
pub fn derive_rfm(records: &[Record]) -> Result<MetricReport, ComputeError> {
    MetricDeriver::derive(records)
}

/// Segment a filtered working set.
///
/// RFM metrics are derived only when a selected feature field needs them;
/// otherwise every record is clustered as-is and no record is skipped.
pub fn segment_records(
    records: &[Record],
    config: &SegmentationConfig,
) -> Result<SegmentedView, ComputeError> {
    run(records, config).map(|(view, _)| view)
}

/// Fit on a working set and assign one new feature vector (original units)
pub fn predict_segment(
    records: &[Record],
    config: &SegmentationConfig,
    vector: &[f64],
) -> Result<(usize, SegmentedView), ComputeError> {
    let (view, segmentation) = run(records, config)?;
    let cluster = segmentation.predict(vector)?;
    Ok((cluster, view))
}

fn run(
    records: &[Record],
    config: &SegmentationConfig,
) -> Result<(SegmentedView, Segmentation), ComputeError> {
    if config.feature_fields.is_empty() {
        return Err(InvalidInput::EmptyFeatureSet.into());
    }
    if records.is_empty() {
        return Err(InvalidInput::EmptyInput.into());
    }
    let engine = SegmentationEngine::new(config.params());

    if config.needs_metrics() {
        let report = MetricDeriver::derive(records)?;
        let vectors = extract_vectors(&report.records, &config.feature_fields)?;
        let segmentation = engine.fit(&vectors)?;
        let labeled = report
            .records
            .into_iter()
            .map(|rfm| (rfm.record, Some(rfm.metrics)))
            .collect();
        let view = assemble(labeled, report.skipped, &vectors, &segmentation, config);
        Ok((view, segmentation))
    } else {
        let vectors = extract_vectors(records, &config.feature_fields)?;
        let segmentation = engine.fit(&vectors)?;
        let labeled = records.iter().map(|r| (r.clone(), None)).collect();
        let view = assemble(labeled, Vec::new(), &vectors, &segmentation, config);
        Ok((view, segmentation))
    }
}

fn extract_vectors<S: FeatureSource>(
    sources: &[S],
    fields: &[FeatureField],
) -> Result<Vec<Vec<f64>>, InvalidInput> {
    sources.iter().map(|s| s.feature_vector(fields)).collect()
}

fn assemble(
    labeled: Vec<(Record, Option<DerivedMetrics>)>,
    skipped: Vec<SkippedRecord>,
    vectors: &[Vec<f64>],
    segmentation: &Segmentation,
    config: &SegmentationConfig,
) -> SegmentedView {
    let sizes = segmentation.cluster_sizes();
    let original = segmentation.centroids_original();
    let total = labeled.len() as f64;

    let clusters = (0..segmentation.n_clusters())
        .map(|cluster| {
            let members = labeled
                .iter()
                .zip(&segmentation.labels)
                .filter(|&(_, &label)| label == cluster)
                .map(|((record, _), _)| record);
            let (cnt_sum, temp_sum) = members.fold((0.0, 0.0), |(c, t), r| {
                (c + f64::from(r.cnt), t + r.temp)
            });
            let size = sizes[cluster];
            let mean = |sum: f64| (size > 0).then(|| sum / size as f64);
            ClusterSummary {
                cluster,
                size,
                share: size as f64 / total,
                centroid: original[cluster].clone(),
                centroid_standardized: segmentation.centroids[cluster].clone(),
                mean_cnt: mean(cnt_sum),
                mean_temp: mean(temp_sum),
            }
        })
        .collect();

    let degenerate_fields = segmentation
        .standardizer
        .degenerate_dimensions()
        .into_iter()
        .map(|dim| config.feature_fields[dim])
        .collect();

    let silhouette = segmentation.silhouette(vectors);

    info!(
        records = labeled.len(),
        skipped = skipped.len(),
        clusters = segmentation.n_clusters(),
        inertia = segmentation.inertia,
        silhouette,
        "Working set segmented"
    );

    let records = labeled
        .into_iter()
        .zip(&segmentation.labels)
        .map(|((record, metrics), &cluster)| SegmentedRecord {
            record,
            metrics,
            cluster,
        })
        .collect();

    SegmentedView {
        records,
        skipped,
        feature_fields: config.feature_fields.clone(),
        degenerate_fields,
        clusters,
        inertia: segmentation.inertia,
        silhouette,
        iterations: segmentation.iterations,
        converged: segmentation.converged,
        best_restart: segmentation.best_restart,
    }
}
