//! Feature standardization
//!
//! This module rescales feature vectors to zero mean and unit variance per
//! dimension so that distance-based clustering is insensitive to differing
//! feature scales.
//! - Population standard deviation (divide by N)
//! - Constant dimensions map to 0 instead of dividing by zero

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Per-dimension mean and standard deviation fitted on a working set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    means: Vec<f64>,
    std_devs: Vec<f64>,
}

impl Standardizer {
    /// Fit on a non-empty set of equal-length vectors.
    ///
    /// Callers validate shape first; an empty slice yields a zero-dimension
    /// standardizer.
    pub fn fit(vectors: &[Vec<f64>]) -> Self {
        let dims = vectors.first().map_or(0, Vec::len);
        let mut means = Vec::with_capacity(dims);
        let mut std_devs = Vec::with_capacity(dims);
        let mut column = Vec::with_capacity(vectors.len());

        for dim in 0..dims {
            column.clear();
            column.extend(vectors.iter().map(|v| v[dim]));
            let (mean, std_dev) = column_moments(&column);
            means.push(mean);
            std_devs.push(std_dev);
        }

        let standardizer = Self { means, std_devs };
        let degenerate = standardizer.degenerate_dimensions();
        if !degenerate.is_empty() {
            debug!(?degenerate, "Zero-variance dimensions map to 0");
        }
        standardizer
    }

    /// Number of dimensions this standardizer was fitted on
    pub fn dimensions(&self) -> usize {
        self.means.len()
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn std_devs(&self) -> &[f64] {
        &self.std_devs
    }

    /// Indices of dimensions whose standard deviation is zero
    pub fn degenerate_dimensions(&self) -> Vec<usize> {
        self.std_devs
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s == 0.0)
            .map(|(i, _)| i)
            .collect()
    }

    /// Standardize a single vector
    pub fn transform(&self, vector: &[f64]) -> Vec<f64> {
        vector
            .iter()
            .zip(self.means.iter().zip(&self.std_devs))
            .map(|(value, (mean, std_dev))| {
                if *std_dev == 0.0 {
                    0.0
                } else {
                    // Split so that `value - mean` cannot overflow.
                    value / std_dev - mean / std_dev
                }
            })
            .collect()
    }

    /// Standardize every vector
    pub fn transform_all(&self, vectors: &[Vec<f64>]) -> Vec<Vec<f64>> {
        vectors.iter().map(|v| self.transform(v)).collect()
    }

    /// Map a standardized vector back to original units
    ///
    /// Constant dimensions come back as their (only) observed value.
    pub fn inverse_transform(&self, vector: &[f64]) -> Vec<f64> {
        vector
            .iter()
            .zip(self.means.iter().zip(&self.std_devs))
            .map(|(value, (mean, std_dev))| value * std_dev + mean)
            .collect()
    }
}

/// Mean and population standard deviation of one column.
///
/// Welford's running update over values rescaled by a power of two near the
/// column's largest magnitude, so sums of squares stay finite for any finite
/// input. A column whose values are all equal has standard deviation 0.
fn column_moments(values: &[f64]) -> (f64, f64) {
    let Some(&first) = values.first() else {
        return (0.0, 0.0);
    };
    if values.iter().all(|&v| v == first) {
        return (first, 0.0);
    }

    let max_abs = values.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
    let exponent = (max_abs.log2().ceil() as i32).clamp(-1022, 1023);
    let scale = 2.0_f64.powi(exponent);

    let mut mean = 0.0;
    let mut m2 = 0.0;
    for (i, &value) in values.iter().enumerate() {
        let x = value / scale;
        let delta = x - mean;
        mean += delta / (i + 1) as f64;
        m2 += delta * (x - mean);
    }
    let variance = (m2 / values.len() as f64).max(0.0);
    (mean * scale, variance.sqrt() * scale)
}
