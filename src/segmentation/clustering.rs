use super::types::{RiverMask, SegmentError, Segmenter};
use crate::tile::Tile;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

type Rgb = [f64; 3];

/// Rule for picking which cluster is water
///
/// This is a heuristic, not a law: shadowed land or dark roofs can win it.
/// Changing the rule is a product decision, so new rules get new variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiverPolicy {
    /// Centroid with the smallest red + green sum; water reflects little of
    /// either in true-colour imagery. Ties go to the lowest cluster index.
    #[default]
    LowestRedGreen,
}

impl RiverPolicy {
    pub fn select(&self, centroids: &[Rgb]) -> usize {
        match self {
            RiverPolicy::LowestRedGreen => centroids
                .iter()
                .enumerate()
                .fold((0, f64::INFINITY), |best, (i, c)| {
                    let score = c[0] + c[1];
                    if score < best.1 {
                        (i, score)
                    } else {
                        best
                    }
                })
                .0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringParams {
    /// Number of colour clusters
    pub k: usize,
    /// Fixes k-means++ seeding; `None` draws from OS entropy
    pub seed: Option<u64>,
    pub max_iterations: usize,
    /// Convergence threshold, relative to the mean per-channel variance
    pub tolerance: f64,
    /// Independent seedings; the lowest-inertia run is kept
    pub attempts: usize,
    /// Fail instead of returning the partition found at the iteration cap
    pub strict_convergence: bool,
    pub policy: RiverPolicy,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self {
            k: 2,
            seed: None,
            max_iterations: 300,
            tolerance: 1e-4,
            attempts: 1,
            strict_convergence: false,
            policy: RiverPolicy::default(),
        }
    }
}

impl ClusteringParams {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<(), SegmentError> {
        if self.k == 0 {
            return Err(SegmentError::InvalidParameter("k must be at least 1".into()));
        }
        if self.max_iterations == 0 {
            return Err(SegmentError::InvalidParameter(
                "max_iterations must be at least 1".into(),
            ));
        }
        if self.attempts == 0 {
            return Err(SegmentError::InvalidParameter("attempts must be at least 1".into()));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(SegmentError::InvalidParameter(format!(
                "tolerance must be finite and non-negative, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Everything one clustering run produced
#[derive(Debug, Clone)]
pub struct ClusteringOutcome {
    /// Cluster label per pixel, row-major
    pub labels: Vec<usize>,
    pub centroids: Vec<Rgb>,
    pub river_cluster: usize,
    pub iterations: usize,
    /// Sum of squared distances from each pixel to its centroid
    pub inertia: f64,
    pub converged: bool,
    pub mask: RiverMask,
}

/// Colour-clustering strategy producing a [`RiverMask`]
#[derive(Debug, Clone, Default)]
pub struct ClusteringSegmenter {
    pub params: ClusteringParams,
}

impl ClusteringSegmenter {
    pub fn new(params: ClusteringParams) -> Self {
        Self { params }
    }
}

impl Segmenter for ClusteringSegmenter {
    type Output = ClusteringOutcome;

    fn segment(&self, tile: &Tile) -> Result<ClusteringOutcome, SegmentError> {
        cluster_tile(tile, &self.params)
    }

    fn name(&self) -> &'static str {
        "cluster"
    }
}

/// Binary river mask from k-means over pixel colours
pub fn segment_by_clustering(
    tile: &Tile,
    params: &ClusteringParams,
) -> Result<RiverMask, SegmentError> {
    cluster_tile(tile, params).map(|outcome| outcome.mask)
}

/// Run k-means over the tile's pixels and keep the labels for reporting
pub fn cluster_tile(
    tile: &Tile,
    params: &ClusteringParams,
) -> Result<ClusteringOutcome, SegmentError> {
    let _span = tracing::debug_span!("cluster", tile = %tile.label()).entered();

    params.validate()?;
    let needed = params.k.max(2);
    if tile.pixel_count() < needed {
        return Err(SegmentError::InvalidInput(format!(
            "{}x{} tile has {} pixel(s), clustering into {} needs at least {}",
            tile.width(),
            tile.height(),
            tile.pixel_count(),
            params.k,
            needed
        )));
    }

    let points: Vec<Rgb> = tile
        .image()
        .pixels()
        .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
        .collect();

    let mut rng = match params.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let tolerance = params.tolerance * mean_channel_variance(&points);

    let mut best: Option<Partition> = None;
    for attempt in 0..params.attempts {
        let initial = init_plus_plus(&points, params.k, &mut rng);
        let run = lloyd(&points, initial, params.max_iterations, tolerance);
        tracing::debug!(
            "attempt {}: inertia={:.1} iterations={} converged={}",
            attempt,
            run.inertia,
            run.iterations,
            run.converged
        );
        if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }
    let Some(best) = best else {
        return Err(SegmentError::InvalidParameter("attempts must be at least 1".into()));
    };

    if !best.converged {
        if params.strict_convergence {
            return Err(SegmentError::ConvergenceFailure {
                iterations: best.iterations,
            });
        }
        tracing::warn!(
            "Clustering of {} stopped at the {}-iteration cap; using best partition",
            tile.label(),
            best.iterations
        );
    }

    let river_cluster = params.policy.select(&best.centroids);
    let mask = RiverMask::from_labels(tile.width(), tile.height(), &best.labels, river_cluster);

    tracing::debug!(
        "river cluster {} at {:?}, {} river pixel(s)",
        river_cluster,
        best.centroids[river_cluster],
        mask.river_pixel_count()
    );

    Ok(ClusteringOutcome {
        labels: best.labels,
        centroids: best.centroids,
        river_cluster,
        iterations: best.iterations,
        inertia: best.inertia,
        converged: best.converged,
        mask,
    })
}

struct Partition {
    labels: Vec<usize>,
    centroids: Vec<Rgb>,
    inertia: f64,
    iterations: usize,
    converged: bool,
}

fn sq_dist(a: &Rgb, b: &Rgb) -> f64 {
    (0..3).map(|c| (a[c] - b[c]).powi(2)).sum()
}

fn mean_channel_variance(points: &[Rgb]) -> f64 {
    let n = points.len() as f64;
    (0..3)
        .map(|c| {
            let mean = points.iter().map(|p| p[c]).sum::<f64>() / n;
            points.iter().map(|p| (p[c] - mean).powi(2)).sum::<f64>() / n
        })
        .sum::<f64>()
        / 3.0
}

/// k-means++ seeding: each new centre is drawn with probability proportional
/// to its squared distance from the nearest existing centre. When every point
/// already sits on a centre the draw falls back to uniform.
fn init_plus_plus(points: &[Rgb], k: usize, rng: &mut StdRng) -> Vec<Rgb> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);

    let mut closest: Vec<f64> = points.iter().map(|p| sq_dist(p, &centroids[0])).collect();

    while centroids.len() < k {
        let total: f64 = closest.iter().sum();
        let chosen = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = closest.iter().rposition(|&d| d > 0.0).unwrap_or(0);
            for (i, &d) in closest.iter().enumerate() {
                if target < d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.gen_range(0..points.len())
        };

        let centre = points[chosen];
        for (d, p) in closest.iter_mut().zip(points) {
            *d = d.min(sq_dist(p, &centre));
        }
        centroids.push(centre);
    }

    centroids
}

/// Nearest centroid per point (ties to the lowest index); returns inertia
fn assign(points: &[Rgb], centroids: &[Rgb], labels: &mut [usize]) -> f64 {
    let mut inertia = 0.0;
    for (label, p) in labels.iter_mut().zip(points) {
        let (best, dist) = centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (i, sq_dist(p, c)))
            .fold((0, f64::INFINITY), |acc, cur| {
                if cur.1 < acc.1 {
                    cur
                } else {
                    acc
                }
            });
        *label = best;
        inertia += dist;
    }
    inertia
}

/// Mean of each cluster's points; an empty cluster keeps its old centre
fn recompute(points: &[Rgb], labels: &[usize], previous: &[Rgb]) -> Vec<Rgb> {
    let k = previous.len();
    let mut sums = vec![[0.0f64; 3]; k];
    let mut counts = vec![0usize; k];
    for (p, &label) in points.iter().zip(labels) {
        for c in 0..3 {
            sums[label][c] += p[c];
        }
        counts[label] += 1;
    }
    (0..k)
        .map(|i| {
            if counts[i] == 0 {
                previous[i]
            } else {
                let n = counts[i] as f64;
                [sums[i][0] / n, sums[i][1] / n, sums[i][2] / n]
            }
        })
        .collect()
}

fn lloyd(
    points: &[Rgb],
    mut centroids: Vec<Rgb>,
    max_iterations: usize,
    tolerance: f64,
) -> Partition {
    let mut labels = vec![0usize; points.len()];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        iterations += 1;
        assign(points, &centroids, &mut labels);
        let updated = recompute(points, &labels, &centroids);
        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(a, b)| sq_dist(a, b))
            .sum();
        centroids = updated;
        if shift <= tolerance {
            converged = true;
            break;
        }
    }

    // Labels must agree with the final centroids.
    let inertia = assign(points, &centroids, &mut labels);

    Partition {
        labels,
        centroids,
        inertia,
        iterations,
        converged,
    }
}
