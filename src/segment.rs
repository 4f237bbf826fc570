//! K-Means segmentation of normalized profiles and partition validity scoring

use std::ops::RangeInclusive;

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AnalysisError, AnalysisResult};
use crate::features::CustomerProfiles;
use crate::normalize::NormalizedMatrix;

/// Source of randomness for centroid initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedPolicy {
    /// Reproducible: the same input always yields the same partition
    Fixed(u64),
    /// Seeded from OS entropy, so partitions may differ between runs
    Random,
}

impl Default for SeedPolicy {
    fn default() -> Self {
        Self::Fixed(42)
    }
}

impl SeedPolicy {
    fn rng(self) -> StdRng {
        match self {
            Self::Fixed(seed) => StdRng::seed_from_u64(seed),
            Self::Random => StdRng::from_entropy(),
        }
    }
}

/// Parameters of one K-Means run
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansParams {
    pub n_clusters: usize,
    /// Upper bound on assignment passes
    pub max_iterations: usize,
    pub seed: SeedPolicy,
}

impl KMeansParams {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            max_iterations: 300,
            seed: SeedPolicy::default(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_seed(mut self, seed: SeedPolicy) -> Self {
        self.seed = seed;
        self
    }
}

/// Result of a segmentation run
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    /// Customer identity of each row, in matrix order
    pub customer_ids: Vec<String>,
    /// Cluster label of each row
    pub labels: Array1<usize>,
    /// Cluster centroids in normalized space
    pub centroids: Array2<f64>,
    pub n_clusters: usize,
    /// Davies-Bouldin index of the partition (lower is better)
    pub davies_bouldin: f64,
    /// Within-cluster sum of squares
    pub inertia: f64,
    pub iterations: usize,
    /// False when the iteration bound was hit before assignments settled
    pub converged: bool,
}

impl ClusterAssignment {
    pub fn label_of(&self, customer_id: &str) -> Option<usize> {
        self.customer_ids
            .iter()
            .position(|id| id == customer_id)
            .map(|i| self.labels[i])
    }

    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            sizes[label] += 1;
        }
        sizes
    }

    /// Nearest centroid for a normalized feature vector
    pub fn predict(&self, features: ArrayView1<'_, f64>) -> AnalysisResult<usize> {
        if features.len() != self.centroids.ncols() {
            return Err(AnalysisError::invalid(format!(
                "feature vector must have {} dimensions, got {}",
                self.centroids.ncols(),
                features.len()
            )));
        }
        Ok(nearest_centroid(&self.centroids, features).0)
    }
}

/// Partition the normalized matrix into `params.n_clusters` groups.
///
/// Centroids start from k-means++ seeding driven by `params.seed`. Each pass
/// assigns every row to its nearest centroid (ties go to the lower index) and
/// stops once no assignment changes or `max_iterations` passes have run.
///
/// A cluster that loses all its rows mid-run is reseeded with the row farthest
/// from its own centroid. A cluster can only stay empty when there are fewer
/// distinct rows than clusters; it is then left out of the validity score.
pub fn segment(matrix: &NormalizedMatrix, params: &KMeansParams) -> AnalysisResult<ClusterAssignment> {
    let features = &matrix.values;
    let n = features.nrows();
    let k = params.n_clusters;

    if k < 2 || k >= n {
        return Err(AnalysisError::invalid(format!(
            "n_clusters must be in 2..{n} for {n} customers, got {k}"
        )));
    }
    if params.max_iterations == 0 {
        return Err(AnalysisError::invalid("max_iterations must be positive"));
    }

    let mut rng = params.seed.rng();
    let mut centroids = kmeans_plus_plus(features, k, &mut rng);
    let mut labels = Array1::from_elem(n, usize::MAX);
    let mut iterations = 0;
    let mut converged = false;

    while iterations < params.max_iterations {
        iterations += 1;

        let mut changed = false;
        for (i, row) in features.outer_iter().enumerate() {
            let (nearest, _) = nearest_centroid(&centroids, row);
            if labels[i] != nearest {
                labels[i] = nearest;
                changed = true;
            }
        }
        if !changed {
            converged = true;
            break;
        }

        reseed_empty_clusters(features, &centroids, &mut labels, k);
        centroids = compute_centroids(features, &labels, &centroids);
    }

    if !converged {
        warn!(
            n_clusters = k,
            max_iterations = params.max_iterations,
            "k-means stopped at the iteration bound before assignments settled"
        );
    }

    let inertia = compute_inertia(features, &labels, &centroids);
    let davies_bouldin = davies_bouldin(features, &labels)?;

    debug!(
        n_clusters = k,
        iterations,
        converged,
        inertia,
        davies_bouldin,
        "k-means finished"
    );

    Ok(ClusterAssignment {
        customer_ids: matrix.customer_ids.clone(),
        labels,
        centroids,
        n_clusters: k,
        davies_bouldin,
        inertia,
        iterations,
        converged,
    })
}

/// Run one trial per seed in parallel and keep the lowest-inertia partition.
///
/// Equal inertia keeps the earlier seed.
pub fn best_of_seeds(
    matrix: &NormalizedMatrix,
    params: &KMeansParams,
    seeds: &[u64],
) -> AnalysisResult<ClusterAssignment> {
    if seeds.is_empty() {
        return Err(AnalysisError::invalid("at least one seed is required"));
    }

    let trials = seeds
        .par_iter()
        .map(|&seed| segment(matrix, &params.clone().with_seed(SeedPolicy::Fixed(seed))))
        .collect::<AnalysisResult<Vec<_>>>()?;

    trials
        .into_iter()
        .reduce(|best, trial| if trial.inertia < best.inertia { trial } else { best })
        .ok_or_else(|| AnalysisError::invalid("no clustering trial produced a result"))
}

/// Davies-Bouldin score per evaluated cluster count
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSweep {
    pub scores: Vec<(usize, f64)>,
}

impl ClusterSweep {
    /// Cluster count with the lowest Davies-Bouldin index (first one on ties)
    pub fn best(&self) -> Option<(usize, f64)> {
        self.scores
            .iter()
            .copied()
            .fold(None, |best, (k, score)| match best {
                Some((_, best_score)) if best_score <= score => best,
                _ => Some((k, score)),
            })
    }
}

/// Restrict `counts` to the cluster counts `segment` accepts for `n_rows` rows
pub fn feasible_cluster_counts(
    counts: RangeInclusive<usize>,
    n_rows: usize,
) -> Option<RangeInclusive<usize>> {
    let start = (*counts.start()).max(2);
    let end = (*counts.end()).min(n_rows.saturating_sub(1));
    (start <= end).then(|| start..=end)
}

/// Segment once per cluster count in `counts`, in parallel
pub fn sweep_cluster_counts(
    matrix: &NormalizedMatrix,
    counts: RangeInclusive<usize>,
    params: &KMeansParams,
) -> AnalysisResult<ClusterSweep> {
    let counts: Vec<usize> = counts.collect();
    if counts.is_empty() {
        return Err(AnalysisError::invalid("cluster count range is empty"));
    }

    let scores = counts
        .par_iter()
        .map(|&k| {
            let run = KMeansParams {
                n_clusters: k,
                ..params.clone()
            };
            segment(matrix, &run).map(|assignment| (k, assignment.davies_bouldin))
        })
        .collect::<AnalysisResult<Vec<_>>>()?;

    Ok(ClusterSweep { scores })
}

/// Davies-Bouldin index of a labeling, computed only from the rows and labels.
///
/// Scatter of a cluster is the mean Euclidean distance of its rows to their
/// mean. For each cluster the worst ratio (s_i + s_j) / d(c_i, c_j) against any
/// other cluster is taken and those ratios are averaged. Empty clusters are
/// skipped, coincident centroids contribute 0 and a labeling with a single
/// non-empty cluster scores 0.
pub fn davies_bouldin(features: &Array2<f64>, labels: &Array1<usize>) -> AnalysisResult<f64> {
    if features.nrows() != labels.len() {
        return Err(AnalysisError::invalid(format!(
            "{} labels for {} rows",
            labels.len(),
            features.nrows()
        )));
    }
    if labels.is_empty() {
        return Ok(0.0);
    }

    let n_clusters = labels.iter().max().map_or(0, |&m| m + 1);
    let mut sums = Array2::<f64>::zeros((n_clusters, features.ncols()));
    let mut counts = vec![0usize; n_clusters];
    for (row, &label) in features.outer_iter().zip(labels.iter()) {
        let mut sum = sums.row_mut(label);
        sum += &row;
        counts[label] += 1;
    }

    let present: Vec<usize> = (0..n_clusters).filter(|&c| counts[c] > 0).collect();
    if present.len() < 2 {
        return Ok(0.0);
    }

    for &c in &present {
        let count = counts[c] as f64;
        sums.row_mut(c).mapv_inplace(|v| v / count);
    }
    let centroids = sums;

    let mut scatter = vec![0.0; n_clusters];
    for (row, &label) in features.outer_iter().zip(labels.iter()) {
        scatter[label] += euclidean_distance(row, centroids.row(label));
    }
    for &c in &present {
        scatter[c] /= counts[c] as f64;
    }

    let total: f64 = present
        .iter()
        .map(|&i| {
            present
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| {
                    let separation = euclidean_distance(centroids.row(i), centroids.row(j));
                    if separation == 0.0 {
                        0.0
                    } else {
                        (scatter[i] + scatter[j]) / separation
                    }
                })
                .fold(0.0, f64::max)
        })
        .sum();

    Ok(total / present.len() as f64)
}

/// Mean silhouette coefficient over all rows
pub fn silhouette_score(features: &Array2<f64>, labels: &Array1<usize>) -> f64 {
    let n_samples = features.nrows().min(labels.len());
    if n_samples < 2 {
        return 0.0;
    }
    let n_clusters = labels.iter().max().map_or(0, |&m| m + 1);

    let mut silhouette_sum = 0.0;

    for i in 0..n_samples {
        let point = features.row(i);
        let cluster_label = labels[i];

        let mut same_cluster_distances = Vec::new();
        let mut other_cluster_distances: Vec<Vec<f64>> = vec![Vec::new(); n_clusters];

        for j in 0..n_samples {
            if i == j {
                continue;
            }

            let distance = euclidean_distance(point, features.row(j));
            let other_label = labels[j];

            if other_label == cluster_label {
                same_cluster_distances.push(distance);
            } else {
                other_cluster_distances[other_label].push(distance);
            }
        }

        // Singleton clusters score 0
        if same_cluster_distances.is_empty() {
            continue;
        }
        let a_i = same_cluster_distances.iter().sum::<f64>() / same_cluster_distances.len() as f64;

        let b_i = other_cluster_distances
            .iter()
            .filter(|distances| !distances.is_empty())
            .map(|distances| distances.iter().sum::<f64>() / distances.len() as f64)
            .fold(f64::INFINITY, f64::min);

        let silhouette_i = if b_i.is_infinite() || (a_i == 0.0 && b_i == 0.0) {
            0.0
        } else {
            (b_i - a_i) / a_i.max(b_i)
        };

        silhouette_sum += silhouette_i;
    }

    silhouette_sum / n_samples as f64
}

/// Size and mean unnormalized profile of one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub size: usize,
    /// Mean raw profile of the members; `None` for an empty cluster
    pub mean_profile: Option<Array1<f64>>,
}

/// Describe each cluster in the units of the original profile columns
pub fn summarize_clusters(
    profiles: &CustomerProfiles,
    assignment: &ClusterAssignment,
) -> AnalysisResult<Vec<ClusterSummary>> {
    let mut sums = Array2::<f64>::zeros((assignment.n_clusters, profiles.values.ncols()));
    let mut sizes = vec![0usize; assignment.n_clusters];

    for (customer_id, &label) in assignment.customer_ids.iter().zip(assignment.labels.iter()) {
        let row = profiles
            .row(customer_id)
            .ok_or_else(|| AnalysisError::not_found("profiled customer", customer_id))?;
        let mut sum = sums.row_mut(label);
        sum += &row;
        sizes[label] += 1;
    }

    Ok(sums
        .outer_iter()
        .zip(sizes)
        .enumerate()
        .map(|(cluster, (sum, size))| ClusterSummary {
            cluster,
            size,
            mean_profile: (size > 0).then(|| sum.mapv(|v| v / size as f64)),
        })
        .collect())
}

fn kmeans_plus_plus(features: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = features.nrows();
    let mut chosen = Vec::with_capacity(k);
    chosen.push(rng.gen_range(0..n));

    let mut closest: Vec<f64> = features
        .outer_iter()
        .map(|row| squared_distance(row, features.row(chosen[0])))
        .collect();

    while chosen.len() < k {
        let total: f64 = closest.iter().sum();
        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut pick = closest.iter().rposition(|&d| d > 0.0).unwrap_or(n - 1);
            for (i, &d) in closest.iter().enumerate() {
                if d > 0.0 && target < d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            // Every row coincides with a chosen centroid
            let remaining: Vec<usize> = (0..n).filter(|i| !chosen.contains(i)).collect();
            remaining[rng.gen_range(0..remaining.len())]
        };

        chosen.push(next);
        for (i, row) in features.outer_iter().enumerate() {
            let d = squared_distance(row, features.row(next));
            if d < closest[i] {
                closest[i] = d;
            }
        }
    }

    features.select(Axis(0), &chosen)
}

fn reseed_empty_clusters(
    features: &Array2<f64>,
    centroids: &Array2<f64>,
    labels: &mut Array1<usize>,
    k: usize,
) {
    let mut sizes = vec![0usize; k];
    for &label in labels.iter() {
        sizes[label] += 1;
    }

    for cluster in 0..k {
        if sizes[cluster] > 0 {
            continue;
        }

        let farthest = features
            .outer_iter()
            .enumerate()
            .filter(|(i, _)| sizes[labels[*i]] > 1)
            .map(|(i, row)| (i, squared_distance(row, centroids.row(labels[i]))))
            .filter(|&(_, d)| d > 0.0)
            .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                Some((_, best_d)) if best_d >= d => best,
                _ => Some((i, d)),
            });

        match farthest {
            Some((row, _)) => {
                warn!(cluster, row, "empty cluster reseeded with farthest row");
                sizes[labels[row]] -= 1;
                labels[row] = cluster;
                sizes[cluster] = 1;
            }
            None => warn!(cluster, "empty cluster left empty, no row to move"),
        }
    }
}

/// Member means; a cluster without members keeps its previous centroid
fn compute_centroids(
    features: &Array2<f64>,
    labels: &Array1<usize>,
    previous: &Array2<f64>,
) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(previous.dim());
    let mut counts = vec![0usize; previous.nrows()];
    for (row, &label) in features.outer_iter().zip(labels.iter()) {
        let mut sum = sums.row_mut(label);
        sum += &row;
        counts[label] += 1;
    }

    for (cluster, mut centroid) in sums.outer_iter_mut().enumerate() {
        if counts[cluster] == 0 {
            centroid.assign(&previous.row(cluster));
        } else {
            let count = counts[cluster] as f64;
            centroid.mapv_inplace(|v| v / count);
        }
    }
    sums
}

fn nearest_centroid(centroids: &Array2<f64>, point: ArrayView1<'_, f64>) -> (usize, f64) {
    let mut min_distance = f64::INFINITY;
    let mut closest_cluster = 0;

    for (cluster_idx, centroid) in centroids.outer_iter().enumerate() {
        let distance = squared_distance(point, centroid);
        if distance < min_distance {
            min_distance = distance;
            closest_cluster = cluster_idx;
        }
    }

    (closest_cluster, min_distance)
}

fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    features
        .outer_iter()
        .zip(labels.iter())
        .map(|(row, &cluster)| squared_distance(row, centroids.row(cluster)))
        .sum()
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn euclidean_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    squared_distance(a, b).sqrt()
}
