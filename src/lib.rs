//! Rideseg - Deterministic segmentation of bike-rental usage records
//!
//! Rideseg turns a filtered set of daily or hourly rental records into cluster
//! labels through a deterministic pipeline: dataset decoding → view filtering →
//! RFM derivation → feature standardization → seeded multi-restart k-means →
//! report encoding.
//!
//! ## Modules
//!
//! - **Metric Deriver** ([`features`]): recency, frequency and monetary value per record
//! - **Segmentation Engine** ([`segment`]): standardization plus k-means with restarts
//! - **Pipeline** ([`pipeline`]): one call from records and config to a labeled view

pub mod dataset;
pub mod encoder;
pub mod error;
pub mod features;
pub mod filter;
pub mod normalizer;
pub mod pipeline;
pub mod segment;
pub mod types;

pub use dataset::DatasetAdapter;
pub use encoder::{ReportEncoder, SegmentationReport};
pub use error::{ComputeError, InvalidInput};
pub use features::{MetricDeriver, MetricReport};
pub use filter::RecordFilter;
pub use normalizer::Standardizer;
pub use pipeline::{derive_rfm, predict_segment, segment_records, SegmentationConfig, SegmentedView};
pub use segment::{Segmentation, SegmentationEngine, SegmentationParams};
pub use types::{FeatureField, Record};

/// Rideseg version embedded in all reports
pub const RIDESEG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for reports
pub const PRODUCER_NAME: &str = "rideseg";
