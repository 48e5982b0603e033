//! Segmentation engine
//!
//! K-means over standardized feature vectors: seeded initialization from
//! distinct points, Lloyd iterations, and several independent restarts of
//! which the lowest-inertia one wins.
//!
//! **Objective**: minimize the within-cluster sum of squares
//!
//! ```text
//! J = Σ_k Σ_{x ∈ C_k} ||x - μ_k||²
//! ```
//!
//! Every random choice comes from a `StdRng` seeded from `seed + restart`, so
//! a fixed seed, cluster count, restart count and input order always produce
//! the same labels and centroids.

use crate::error::{ComputeError, InvalidInput};
use crate::normalizer::Standardizer;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, info};

/// Default number of clusters
pub const DEFAULT_CLUSTERS: usize = 3;

/// Default number of independent restarts
pub const DEFAULT_RESTARTS: usize = 10;

/// Default base seed
pub const DEFAULT_SEED: u64 = 42;

/// Default bound on assignment passes per restart
pub const DEFAULT_MAX_ITERATIONS: usize = 300;

/// Clustering parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentationParams {
    /// Number of clusters (K)
    pub n_clusters: usize,
    /// Number of independent restarts (R)
    pub n_restarts: usize,
    /// Base seed; restart `r` uses `seed + r`
    pub seed: u64,
    /// Maximum assignment passes per restart
    pub max_iterations: usize,
}

impl Default for SegmentationParams {
    fn default() -> Self {
        Self {
            n_clusters: DEFAULT_CLUSTERS,
            n_restarts: DEFAULT_RESTARTS,
            seed: DEFAULT_SEED,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

impl SegmentationParams {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Default::default()
        }
    }

    pub fn with_restarts(mut self, n_restarts: usize) -> Self {
        self.n_restarts = n_restarts;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn validate(&self) -> Result<(), InvalidInput> {
        if self.n_clusters == 0 {
            return Err(InvalidInput::InvalidParameter {
                name: "n_clusters",
                message: "must be at least 1",
            });
        }
        if self.n_restarts == 0 {
            return Err(InvalidInput::InvalidParameter {
                name: "n_restarts",
                message: "must be at least 1",
            });
        }
        if self.max_iterations == 0 {
            return Err(InvalidInput::InvalidParameter {
                name: "max_iterations",
                message: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// Result of a segmentation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    /// Cluster label per input vector, in input order
    pub labels: Vec<usize>,
    /// Cluster centroids in standardized space
    pub centroids: Vec<Vec<f64>>,
    /// Within-cluster sum of squares of the winning restart
    pub inertia: f64,
    /// Assignment passes run by the winning restart
    pub iterations: usize,
    /// Whether the winning restart reached a fixed point before the bound
    pub converged: bool,
    /// Index of the winning restart
    pub best_restart: usize,
    /// Standardizer fitted on the input
    pub standardizer: Standardizer,
}

impl Segmentation {
    pub fn n_clusters(&self) -> usize {
        self.centroids.len()
    }

    /// Number of vectors assigned to each cluster
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters()];
        for &label in &self.labels {
            sizes[label] += 1;
        }
        sizes
    }

    /// Centroids mapped back to original feature units
    pub fn centroids_original(&self) -> Vec<Vec<f64>> {
        self.centroids
            .iter()
            .map(|c| self.standardizer.inverse_transform(c))
            .collect()
    }

    /// Assign a new vector (original units) to its nearest centroid
    pub fn predict(&self, vector: &[f64]) -> Result<usize, ComputeError> {
        let expected = self.standardizer.dimensions();
        if vector.len() != expected {
            return Err(InvalidInput::DimensionMismatch {
                index: 0,
                expected,
                found: vector.len(),
            }
            .into());
        }
        if let Some(dimension) = vector.iter().position(|v| !v.is_finite()) {
            return Err(InvalidInput::NonFiniteValue {
                index: 0,
                dimension,
            }
            .into());
        }
        let scaled = self.standardizer.transform(vector);
        Ok(nearest_centroid(&scaled, &self.centroids))
    }

    /// Mean silhouette coefficient of this labeling over `vectors` (original units)
    pub fn silhouette(&self, vectors: &[Vec<f64>]) -> f64 {
        let points = self.standardizer.transform_all(vectors);
        silhouette_score(&points, &self.labels)
    }
}

/// K-means engine with seeded multi-restart selection
#[derive(Debug, Clone, Default)]
pub struct SegmentationEngine {
    params: SegmentationParams,
}

impl SegmentationEngine {
    pub fn new(params: SegmentationParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SegmentationParams {
        &self.params
    }

    /// Standardize `vectors` and cluster them
    pub fn fit(&self, vectors: &[Vec<f64>]) -> Result<Segmentation, ComputeError> {
        self.params.validate()?;
        validate_vectors(vectors)?;

        let standardizer = Standardizer::fit(vectors);
        let points = standardizer.transform_all(vectors);

        // Counted after scaling: distinct raw points can collapse.
        let distinct = distinct_points(&points);
        let k = self.params.n_clusters;
        if k > distinct.len() {
            return Err(InvalidInput::TooManyClusters {
                requested: k,
                distinct: distinct.len(),
            }
            .into());
        }

        let mut best: Option<(usize, RestartOutcome)> = None;
        for restart in 0..self.params.n_restarts {
            let mut rng = StdRng::seed_from_u64(self.params.seed.wrapping_add(restart as u64));
            let outcome = run_restart(&points, &distinct, k, self.params.max_iterations, &mut rng);
            debug!(
                restart,
                inertia = outcome.inertia,
                iterations = outcome.iterations,
                converged = outcome.converged,
                "Restart finished"
            );
            if best
                .as_ref()
                .map_or(true, |(_, b)| outcome.inertia < b.inertia)
            {
                best = Some((restart, outcome));
            }
        }

        let (best_restart, outcome) = best.ok_or(InvalidInput::InvalidParameter {
            name: "n_restarts",
            message: "must be at least 1",
        })?;

        info!(
            n = points.len(),
            k,
            best_restart,
            inertia = outcome.inertia,
            "Segmentation complete"
        );

        Ok(Segmentation {
            labels: outcome.labels,
            centroids: outcome.centroids,
            inertia: outcome.inertia,
            iterations: outcome.iterations,
            converged: outcome.converged,
            best_restart,
            standardizer,
        })
    }
}

struct RestartOutcome {
    labels: Vec<usize>,
    centroids: Vec<Vec<f64>>,
    inertia: f64,
    iterations: usize,
    converged: bool,
}

/// Check that every vector is non-empty, finite and of one length
fn validate_vectors(vectors: &[Vec<f64>]) -> Result<(), InvalidInput> {
    let first = vectors.first().ok_or(InvalidInput::EmptyInput)?;
    let dims = first.len();
    if dims == 0 {
        return Err(InvalidInput::EmptyFeatureSet);
    }

    for (index, vector) in vectors.iter().enumerate() {
        if vector.len() != dims {
            return Err(InvalidInput::DimensionMismatch {
                index,
                expected: dims,
                found: vector.len(),
            });
        }
        if let Some(dimension) = vector.iter().position(|v| !v.is_finite()) {
            return Err(InvalidInput::NonFiniteValue { index, dimension });
        }
    }
    Ok(())
}

/// Index of the first occurrence of each distinct point, in input order
fn distinct_points(points: &[Vec<f64>]) -> Vec<usize> {
    let mut seen: HashSet<Vec<u64>> = HashSet::with_capacity(points.len());
    let mut distinct = Vec::new();
    for (index, point) in points.iter().enumerate() {
        // +0.0 and -0.0 are the same point.
        let key = point
            .iter()
            .map(|&v| if v == 0.0 { 0u64 } else { v.to_bits() })
            .collect();
        if seen.insert(key) {
            distinct.push(index);
        }
    }
    distinct
}

fn run_restart(
    points: &[Vec<f64>],
    distinct: &[usize],
    k: usize,
    max_iterations: usize,
    rng: &mut StdRng,
) -> RestartOutcome {
    let mut centroids: Vec<Vec<f64>> = rand::seq::index::sample(rng, distinct.len(), k)
        .iter()
        .map(|i| points[distinct[i]].clone())
        .collect();

    let mut labels = vec![usize::MAX; points.len()];
    let mut iterations = 0;
    let mut converged = false;

    // Centroids are refreshed after every pass that moved a label, so they are
    // always the means of the final members.
    while iterations < max_iterations {
        let changed = assign(points, &centroids, &mut labels);
        iterations += 1;
        if changed == 0 {
            converged = true;
            break;
        }
        update_centroids(points, &labels, &mut centroids);
    }

    let inertia = inertia(points, &labels, &centroids);
    RestartOutcome {
        labels,
        centroids,
        inertia,
        iterations,
        converged,
    }
}

/// Relabel every point with its nearest centroid; returns how many labels changed
fn assign(points: &[Vec<f64>], centroids: &[Vec<f64>], labels: &mut [usize]) -> usize {
    let mut changed = 0;
    for (point, label) in points.iter().zip(labels.iter_mut()) {
        let nearest = nearest_centroid(point, centroids);
        if *label != nearest {
            *label = nearest;
            changed += 1;
        }
    }
    changed
}

/// Index of the closest centroid; ties go to the lowest index
fn nearest_centroid(point: &[f64], centroids: &[Vec<f64>]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (idx, centroid) in centroids.iter().enumerate() {
        let dist = squared_euclidean(point, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = idx;
        }
    }
    best
}

/// Move each centroid to the mean of its members. Empty clusters keep their
/// previous centroid.
///
/// Running means keep a cluster of identical points exactly on that point.
fn update_centroids(points: &[Vec<f64>], labels: &[usize], centroids: &mut [Vec<f64>]) {
    let dims = centroids.first().map_or(0, Vec::len);
    let mut means = vec![vec![0.0; dims]; centroids.len()];
    let mut counts = vec![0usize; centroids.len()];

    for (point, &label) in points.iter().zip(labels) {
        counts[label] += 1;
        let n = counts[label] as f64;
        for (mean, value) in means[label].iter_mut().zip(point) {
            *mean += (value - *mean) / n;
        }
    }

    for ((centroid, mean), &count) in centroids.iter_mut().zip(means).zip(&counts) {
        if count > 0 {
            *centroid = mean;
        }
    }
}

fn inertia(points: &[Vec<f64>], labels: &[usize], centroids: &[Vec<f64>]) -> f64 {
    points
        .iter()
        .zip(labels)
        .map(|(point, &label)| squared_euclidean(point, &centroids[label]))
        .sum()
}

#[inline]
fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Mean silhouette coefficient over all points
///
/// Points in singleton clusters score 0. Returns 0 when fewer than two
/// clusters are populated.
pub fn silhouette_score(points: &[Vec<f64>], labels: &[usize]) -> f64 {
    let n = points.len().min(labels.len());
    let n_clusters = labels[..n].iter().max().map_or(0, |&m| m + 1);
    let mut sizes = vec![0usize; n_clusters];
    for &label in &labels[..n] {
        sizes[label] += 1;
    }
    if sizes.iter().filter(|&&s| s > 0).count() < 2 {
        return 0.0;
    }

    let mut total = 0.0;
    for i in 0..n {
        let own = labels[i];
        if sizes[own] <= 1 {
            continue;
        }

        let mut dist_sums = vec![0.0; n_clusters];
        for j in 0..n {
            if i != j {
                dist_sums[labels[j]] += squared_euclidean(&points[i], &points[j]).sqrt();
            }
        }

        let a = dist_sums[own] / (sizes[own] - 1) as f64;
        let b = (0..n_clusters)
            .filter(|&c| c != own && sizes[c] > 0)
            .map(|c| dist_sums[c] / sizes[c] as f64)
            .fold(f64::INFINITY, f64::min);

        let denom = a.max(b);
        if denom > 0.0 {
            total += (b - a) / denom;
        }
    }
    total / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_groups() -> Vec<Vec<f64>> {
        let counts = [1.0, 2.0, 3.0, 10.0, 11.0, 12.0];
        let temps = [0.1, 0.11, 0.12, 0.9, 0.91, 0.92];
        counts
            .iter()
            .zip(&temps)
            .map(|(&c, &t)| vec![c, t])
            .collect()
    }

    fn fit(vectors: &[Vec<f64>], params: SegmentationParams) -> Segmentation {
        SegmentationEngine::new(params).fit(vectors).unwrap()
    }

    #[test]
    fn test_low_and_high_groups_separate() {
        let data = two_groups();
        let seg = fit(&data, SegmentationParams::new(2).with_restarts(5).with_seed(42));

        assert_eq!(seg.labels[0], seg.labels[1]);
        assert_eq!(seg.labels[1], seg.labels[2]);
        assert_eq!(seg.labels[3], seg.labels[4]);
        assert_eq!(seg.labels[4], seg.labels[5]);
        assert_ne!(seg.labels[0], seg.labels[3]);
        assert!(seg.converged);
    }

    #[test]
    fn test_partition_independent_of_input_order() {
        let base = two_groups();
        let orders: [[usize; 6]; 3] = [[5, 4, 3, 2, 1, 0], [3, 0, 4, 1, 5, 2], [1, 5, 0, 3, 2, 4]];

        for order in orders {
            let data: Vec<Vec<f64>> = order.iter().map(|&i| base[i].clone()).collect();
            let seg = fit(&data, SegmentationParams::new(2).with_restarts(5).with_seed(42));

            let label_of = |original: usize| {
                let pos = order.iter().position(|&i| i == original).unwrap();
                seg.labels[pos]
            };
            assert_eq!(label_of(0), label_of(1));
            assert_eq!(label_of(0), label_of(2));
            assert_eq!(label_of(3), label_of(4));
            assert_eq!(label_of(3), label_of(5));
            assert_ne!(label_of(0), label_of(3));
        }
    }

    #[test]
    fn test_deterministic_for_fixed_seed() {
        let data: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let x = i as f64;
                vec![(x * 0.37).sin() * 10.0, (x * 0.91).cos() * 3.0, x % 7.0]
            })
            .collect();
        let params = SegmentationParams::new(4).with_restarts(6).with_seed(7);

        let first = fit(&data, params);
        let second = fit(&data, params);
        assert_eq!(first, second);
    }

    #[test]
    fn test_label_set_is_complete() {
        let data = two_groups();
        let seg = fit(&data, SegmentationParams::new(3));

        let mut seen: Vec<usize> = seg.labels.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(seg.cluster_sizes().iter().sum::<usize>(), data.len());
    }

    #[test]
    fn test_single_cluster() {
        let data = two_groups();
        let seg = fit(&data, SegmentationParams::new(1));

        assert!(seg.labels.iter().all(|&l| l == 0));
        for value in &seg.centroids[0] {
            assert!(value.abs() < 1e-9);
        }
        let original = seg.centroids_original();
        assert!((original[0][0] - 6.5).abs() < 1e-9);
    }

    #[test]
    fn test_one_cluster_per_distinct_point() {
        let data = two_groups();
        let seg = fit(&data, SegmentationParams::new(6).with_restarts(2));

        assert!(seg.inertia.abs() < 1e-12);
        assert_eq!(seg.cluster_sizes(), vec![1; 6]);
    }

    #[test]
    fn test_more_restarts_never_worse() {
        let data: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let x = i as f64;
                vec![(x * 1.3).sin() * 5.0, (x * 0.7).cos() * 5.0]
            })
            .collect();
        let one = fit(&data, SegmentationParams::new(5).with_restarts(1).with_seed(3));
        let many = fit(&data, SegmentationParams::new(5).with_restarts(10).with_seed(3));
        assert!(many.inertia <= one.inertia);
    }

    #[test]
    fn test_constant_feature_is_not_an_error() {
        let data: Vec<Vec<f64>> = two_groups()
            .into_iter()
            .map(|mut v| {
                v.push(0.5);
                v
            })
            .collect();
        let seg = fit(&data, SegmentationParams::new(2).with_restarts(5));

        assert_eq!(seg.standardizer.degenerate_dimensions(), vec![2]);
        assert_ne!(seg.labels[0], seg.labels[5]);
        for centroid in &seg.centroids {
            assert_eq!(centroid[2], 0.0);
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = SegmentationEngine::default().fit(&[]).unwrap_err();
        assert!(matches!(
            err,
            ComputeError::InvalidInput(InvalidInput::EmptyInput)
        ));
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let data = vec![vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0]];
        let err = SegmentationEngine::new(SegmentationParams::new(2))
            .fit(&data)
            .unwrap_err();
        assert!(matches!(
            err,
            ComputeError::InvalidInput(InvalidInput::DimensionMismatch {
                index: 2,
                expected: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn test_too_many_clusters_counts_distinct_points() {
        let data = vec![vec![1.0, 1.0], vec![1.0, 1.0], vec![2.0, 2.0], vec![-0.0, 0.0], vec![0.0, 0.0]];
        let err = SegmentationEngine::new(SegmentationParams::new(4))
            .fit(&data)
            .unwrap_err();
        assert!(matches!(
            err,
            ComputeError::InvalidInput(InvalidInput::TooManyClusters {
                requested: 4,
                distinct: 3
            })
        ));

        let seg = fit(&data, SegmentationParams::new(3));
        assert_eq!(seg.labels[0], seg.labels[1]);
        assert_eq!(seg.labels[3], seg.labels[4]);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let data = two_groups();
        for params in [
            SegmentationParams::new(0),
            SegmentationParams::new(2).with_restarts(0),
            SegmentationParams::new(2).with_max_iterations(0),
        ] {
            let err = SegmentationEngine::new(params).fit(&data).unwrap_err();
            assert!(matches!(
                err,
                ComputeError::InvalidInput(InvalidInput::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_non_finite_rejected() {
        let data = vec![vec![1.0, 2.0], vec![f64::NAN, 4.0]];
        let err = SegmentationEngine::new(SegmentationParams::new(1))
            .fit(&data)
            .unwrap_err();
        assert!(matches!(
            err,
            ComputeError::InvalidInput(InvalidInput::NonFiniteValue {
                index: 1,
                dimension: 0
            })
        ));
    }

    #[test]
    fn test_zero_length_vectors_rejected() {
        let data = vec![vec![], vec![]];
        let err = SegmentationEngine::new(SegmentationParams::new(1))
            .fit(&data)
            .unwrap_err();
        assert!(matches!(
            err,
            ComputeError::InvalidInput(InvalidInput::EmptyFeatureSet)
        ));
    }

    #[test]
    fn test_values_near_f64_max() {
        let data = vec![vec![1e308], vec![1e308], vec![0.0], vec![0.0]];
        let seg = fit(&data, SegmentationParams::new(2).with_restarts(3));

        assert!(seg.inertia.is_finite());
        assert!(seg.centroids.iter().flatten().all(|c| c.is_finite()));
        assert_eq!(seg.labels[0], seg.labels[1]);
        assert_eq!(seg.labels[2], seg.labels[3]);
        assert_ne!(seg.labels[0], seg.labels[2]);
        assert_eq!(seg.cluster_sizes(), vec![2, 2]);
    }

    #[test]
    fn test_distinct_points_counted_after_scaling() {
        let next_after_one = f64::from_bits(1.0f64.to_bits() + 1);
        let data = vec![vec![1.0], vec![next_after_one], vec![1e10]];

        let err = SegmentationEngine::new(SegmentationParams::new(3))
            .fit(&data)
            .unwrap_err();
        assert!(matches!(
            err,
            ComputeError::InvalidInput(InvalidInput::TooManyClusters {
                requested: 3,
                distinct: 2
            })
        ));

        let seg = fit(&data, SegmentationParams::new(2).with_restarts(4));
        assert_eq!(seg.labels[0], seg.labels[1]);
        assert_ne!(seg.labels[0], seg.labels[2]);
        assert!(seg.cluster_sizes().iter().all(|&size| size > 0));
    }

    #[test]
    fn test_iteration_bound_respected() {
        let data: Vec<Vec<f64>> = (0..50).map(|i| vec![(i as f64 * 0.61).sin(), i as f64]).collect();
        let seg = fit(&data, SegmentationParams::new(4).with_max_iterations(1));
        assert_eq!(seg.iterations, 1);
        assert!(!seg.converged);
        assert_eq!(seg.cluster_sizes().iter().sum::<usize>(), 50);
    }

    #[test]
    fn test_nearest_centroid_ties_go_low() {
        let centroids = vec![vec![1.0], vec![-1.0], vec![1.0]];
        assert_eq!(nearest_centroid(&[0.0], &centroids), 0);
        assert_eq!(nearest_centroid(&[1.0], &centroids), 0);
        assert_eq!(nearest_centroid(&[-0.9], &centroids), 1);
    }

    #[test]
    fn test_empty_cluster_keeps_centroid() {
        let points = vec![vec![0.0, 0.0], vec![2.0, 2.0]];
        let labels = vec![0, 0];
        let mut centroids = vec![vec![9.0, 9.0], vec![5.0, -5.0]];
        update_centroids(&points, &labels, &mut centroids);

        assert_eq!(centroids[0], vec![1.0, 1.0]);
        assert_eq!(centroids[1], vec![5.0, -5.0]);
    }

    #[test]
    fn test_predict_new_point() {
        let data = two_groups();
        let seg = fit(&data, SegmentationParams::new(2).with_restarts(5));

        assert_eq!(seg.predict(&[2.5, 0.115]).unwrap(), seg.labels[0]);
        assert_eq!(seg.predict(&[11.5, 0.95]).unwrap(), seg.labels[5]);
        assert!(seg.predict(&[1.0]).is_err());
    }

    #[test]
    fn test_silhouette_well_separated() {
        let data = two_groups();
        let seg = fit(&data, SegmentationParams::new(2).with_restarts(5));
        assert!(seg.silhouette(&data) > 0.8);
    }

    #[test]
    fn test_silhouette_single_cluster_is_zero() {
        let points = vec![vec![0.0], vec![1.0], vec![2.0]];
        assert_eq!(silhouette_score(&points, &[0, 0, 0]), 0.0);
    }
}
