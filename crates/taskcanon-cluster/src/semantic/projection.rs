//! Neighbor-graph projection (UMAP-style) for dense embeddings.
//!
//! ```text
//! vectors ──► cosine kNN ──► fuzzy simplicial set ──► symmetrize (fuzzy union)
//!                                                         │
//!         low-dim layout ◄── SGD (attract edges, repel samples) ◄──┘
//! ```
//!
//! The layout is seeded, single-threaded and therefore reproducible; only the
//! pairwise distance rows are computed in parallel.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ClusterError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionParams {
    pub n_neighbors: usize,
    pub min_dist: f32,
    pub n_components: usize,
    pub n_epochs: usize,
    pub learning_rate: f32,
    pub negative_sample_rate: usize,
    pub seed: u64,
}

impl Default for ProjectionParams {
    fn default() -> Self {
        Self {
            n_neighbors: 15,
            min_dist: 0.0,
            n_components: 5,
            n_epochs: 500,
            learning_rate: 1.0,
            negative_sample_rate: 5,
            seed: 42,
        }
    }
}

impl ProjectionParams {
    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.n_neighbors < 2 {
            return Err(ClusterError::InvalidParameter(format!(
                "n_neighbors must be >= 2 (got {})",
                self.n_neighbors
            )));
        }
        if self.n_components == 0 {
            return Err(ClusterError::InvalidParameter("n_components must be >= 1".into()));
        }
        if !(0.0..1.0).contains(&self.min_dist) {
            return Err(ClusterError::InvalidParameter(format!(
                "min_dist must be in [0, 1) (got {})",
                self.min_dist
            )));
        }
        if self.n_epochs == 0 {
            return Err(ClusterError::InvalidParameter("n_epochs must be >= 1".into()));
        }
        Ok(())
    }
}

/// Project `vectors` to `params.n_components` dimensions.
///
/// Inputs with fewer than three points are returned as zero vectors: there is
/// no neighborhood structure to preserve.
pub fn project(vectors: &[Vec<f32>], params: &ProjectionParams) -> Result<Vec<Vec<f32>>, ClusterError> {
    params.validate()?;
    let n = vectors.len();
    if n < 3 {
        return Ok(vec![vec![0.0; params.n_components]; n]);
    }
    let dim = vectors[0].len();
    if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
        return Err(ClusterError::Embedding(format!(
            "vector {bad} has {} dimensions, expected {dim}",
            vectors[bad].len()
        )));
    }

    let k = params.n_neighbors.min(n - 1);
    let distances = cosine_distances(vectors);
    let knn = nearest_neighbors(&distances, k);
    let edges = fuzzy_union(&knn, n);
    let (a, b) = fit_ab(params.min_dist, 1.0);
    tracing::debug!(n, k, edges = edges.len(), a, b, "projection graph built");

    Ok(optimize_layout(&edges, n, a, b, params))
}

fn cosine_distances(vectors: &[Vec<f32>]) -> Vec<Vec<f32>> {
    let unit: Vec<Vec<f32>> = vectors
        .iter()
        .map(|v| {
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                v.iter().map(|x| x / norm).collect()
            } else {
                v.clone()
            }
        })
        .collect();

    unit.par_iter()
        .map(|a| {
            unit.iter()
                .map(|b| {
                    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
                    (1.0 - dot).max(0.0)
                })
                .collect()
        })
        .collect()
}

/// `k` nearest neighbors of each point (self excluded), ties by index.
fn nearest_neighbors(distances: &[Vec<f32>], k: usize) -> Vec<Vec<(usize, f32)>> {
    distances
        .par_iter()
        .enumerate()
        .map(|(i, row)| {
            let mut others: Vec<(usize, f32)> = row
                .iter()
                .copied()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .collect();
            others.sort_by(|x, y| x.1.total_cmp(&y.1).then(x.0.cmp(&y.0)));
            others.truncate(k);
            others
        })
        .collect()
}

/// Membership strengths per point, then `w = a + b - a * b` across the two
/// directions of each edge.
fn fuzzy_union(knn: &[Vec<(usize, f32)>], n: usize) -> Vec<(usize, usize, f32)> {
    let mut directed = vec![std::collections::BTreeMap::<usize, f32>::new(); n];

    for (i, neighbors) in knn.iter().enumerate() {
        let k = neighbors.len();
        let rho = neighbors
            .iter()
            .map(|(_, d)| *d)
            .find(|d| *d > 0.0)
            .unwrap_or(0.0);
        let sigma = smooth_knn_sigma(neighbors, rho, (k as f32).log2());
        for &(j, d) in neighbors {
            let w = if d - rho <= 0.0 { 1.0 } else { (-(d - rho) / sigma).exp() };
            directed[i].insert(j, w);
        }
    }

    let mut edges = Vec::new();
    for i in 0..n {
        for (&j, &w_ij) in &directed[i] {
            let w_ji = directed[j].get(&i).copied().unwrap_or(0.0);
            if i < j || w_ji == 0.0 {
                let w = w_ij + w_ji - w_ij * w_ji;
                if w > 0.0 {
                    edges.push((i.min(j), i.max(j), w));
                }
            }
        }
    }
    edges.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));
    edges.dedup_by(|x, y| x.0 == y.0 && x.1 == y.1);
    edges
}

/// Binary search for sigma with `sum exp(-(d - rho) / sigma) = target`.
fn smooth_knn_sigma(neighbors: &[(usize, f32)], rho: f32, target: f32) -> f32 {
    const TOLERANCE: f32 = 1e-5;
    let (mut lo, mut hi, mut mid) = (0.0f32, f32::INFINITY, 1.0f32);

    for _ in 0..64 {
        let psum: f32 = neighbors
            .iter()
            .map(|(_, d)| {
                let excess = d - rho;
                if excess > 0.0 {
                    (-excess / mid).exp()
                } else {
                    1.0
                }
            })
            .sum();
        if (psum - target).abs() < TOLERANCE {
            break;
        }
        if psum > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
        }
    }

    let mean = neighbors.iter().map(|(_, d)| *d).sum::<f32>() / neighbors.len().max(1) as f32;
    mid.max(1e-3 * mean).max(f32::EPSILON)
}

/// Fit `1 / (1 + a * x^(2b))` to the target curve (`1` below `min_dist`,
/// exponential decay above) by least squares over a refined grid.
pub fn fit_ab(min_dist: f32, spread: f32) -> (f32, f32) {
    let xs: Vec<f32> = (0..300).map(|i| i as f32 * 3.0 * spread / 299.0).collect();
    let ys: Vec<f32> = xs
        .iter()
        .map(|&x| if x < min_dist { 1.0 } else { (-(x - min_dist) / spread).exp() })
        .collect();
    let loss = |a: f32, b: f32| -> f32 {
        xs.iter()
            .zip(&ys)
            .map(|(&x, &y)| {
                let f = 1.0 / (1.0 + a * x.powf(2.0 * b));
                (f - y) * (f - y)
            })
            .sum()
    };

    let (mut best_a, mut best_b) = (1.0f32, 1.0f32);
    let (mut a_range, mut b_range) = ((0.05f32, 6.0f32), (0.2f32, 2.0f32));
    for _ in 0..4 {
        let mut best = f32::INFINITY;
        for ia in 0..=40 {
            let a = a_range.0 + (a_range.1 - a_range.0) * ia as f32 / 40.0;
            for ib in 0..=40 {
                let b = b_range.0 + (b_range.1 - b_range.0) * ib as f32 / 40.0;
                let l = loss(a, b);
                if l < best {
                    best = l;
                    best_a = a;
                    best_b = b;
                }
            }
        }
        let (da, db) = ((a_range.1 - a_range.0) / 20.0, (b_range.1 - b_range.0) / 20.0);
        a_range = ((best_a - da).max(1e-3), best_a + da);
        b_range = ((best_b - db).max(1e-2), best_b + db);
    }
    (best_a, best_b)
}

fn optimize_layout(
    edges: &[(usize, usize, f32)],
    n: usize,
    a: f32,
    b: f32,
    params: &ProjectionParams,
) -> Vec<Vec<f32>> {
    let dim = params.n_components;
    let n_epochs = params.n_epochs;
    let mut rng = XorShift64::new(params.seed);

    let mut layout: Vec<Vec<f32>> = (0..n)
        .map(|_| (0..dim).map(|_| rng.next_f32() * 20.0 - 10.0).collect())
        .collect();

    let max_w = edges.iter().map(|e| e.2).fold(0.0f32, f32::max);
    let active: Vec<(usize, usize, f32)> = edges
        .iter()
        .copied()
        .filter(|e| e.2 >= max_w / n_epochs as f32)
        .collect();
    if active.is_empty() {
        return layout;
    }

    let epochs_per_sample: Vec<f32> = active.iter().map(|e| max_w / e.2).collect();
    let neg_rate = params.negative_sample_rate.max(1) as f32;
    let epochs_per_negative: Vec<f32> = epochs_per_sample.iter().map(|e| e / neg_rate).collect();
    let mut next_sample = epochs_per_sample.clone();
    let mut next_negative = epochs_per_negative.clone();

    for epoch in 0..n_epochs {
        let alpha = params.learning_rate * (1.0 - epoch as f32 / n_epochs as f32);
        let now = epoch as f32;

        for (e, &(i, j, _)) in active.iter().enumerate() {
            if next_sample[e] > now {
                continue;
            }

            let d2 = squared_distance(&layout[i], &layout[j]);
            if d2 > 0.0 {
                let coeff = (-2.0 * a * b * d2.powf(b - 1.0)) / (a * d2.powf(b) + 1.0);
                for c in 0..dim {
                    let grad = clip(coeff * (layout[i][c] - layout[j][c])) * alpha;
                    layout[i][c] += grad;
                    layout[j][c] -= grad;
                }
            }
            next_sample[e] += epochs_per_sample[e];

            let n_neg = ((now - next_negative[e]) / epochs_per_negative[e]).max(0.0) as usize;
            for _ in 0..n_neg {
                let k = rng.next_index(n);
                if k == i {
                    continue;
                }
                let d2 = squared_distance(&layout[i], &layout[k]);
                let coeff = if d2 > 0.0 {
                    2.0 * b / ((0.001 + d2) * (a * d2.powf(b) + 1.0))
                } else {
                    0.0
                };
                for c in 0..dim {
                    let grad = if coeff > 0.0 {
                        clip(coeff * (layout[i][c] - layout[k][c]))
                    } else {
                        4.0
                    };
                    layout[i][c] += grad * alpha;
                }
            }
            next_negative[e] += n_neg as f32 * epochs_per_negative[e];
        }
    }

    layout
}

fn squared_distance(x: &[f32], y: &[f32]) -> f32 {
    x.iter().zip(y).map(|(p, q)| (p - q) * (p - q)).sum()
}

fn clip(v: f32) -> f32 {
    v.clamp(-4.0, 4.0)
}

/// xorshift64* generator; enough for layout init and negative sampling.
struct XorShift64(u64);

impl XorShift64 {
    fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.0 = x;
        x.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }

    fn next_index(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}
