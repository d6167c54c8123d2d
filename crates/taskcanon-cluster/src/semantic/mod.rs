//! Semantic clustering of labels.
//!
//! ```text
//! labels ──► Embedder ──► projection ──► HDBSCAN ──► clusters + noise
//!                                                        │
//!                     lexical rescue (similarity | stem) ◄┘
//! ```
//!
//! The result is a separate clustering for human reconciliation. It is never
//! unioned with the lexical grouping.

pub mod density;
pub mod embed;
pub mod projection;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use taskcanon_text::{similarity, stem};

use crate::ClusterError;
use density::{hdbscan, DensityParams, NOISE};
use embed::Embedder;
use projection::{project, ProjectionParams};

pub const DEFAULT_OUTLIER_SIMILARITY: f64 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SemanticOptions {
    pub projection: ProjectionParams,
    pub density: DensityParams,
    /// Noise points join a cluster whose center is at least this similar.
    pub outlier_similarity: f64,
}

impl Default for SemanticOptions {
    fn default() -> Self {
        Self {
            projection: ProjectionParams::default(),
            density: DensityParams::default(),
            outlier_similarity: DEFAULT_OUTLIER_SIMILARITY,
        }
    }
}

impl SemanticOptions {
    /// Clusters born closer than `distance` in the projected space are merged
    /// into their parent.
    pub fn with_distance_threshold(mut self, distance: f64) -> Self {
        self.density.cluster_selection_epsilon = distance;
        self
    }

    pub fn validate(&self) -> Result<(), ClusterError> {
        self.projection.validate()?;
        self.density.validate()?;
        if !(0.0..=1.0).contains(&self.outlier_similarity) {
            return Err(ClusterError::InvalidParameter(format!(
                "outlier_similarity must be in [0, 1], got {}",
                self.outlier_similarity
            )));
        }
        Ok(())
    }
}

/// Outcome of [`cluster_semantic`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticClustering {
    pub model: String,
    /// Cluster id → members. Density clusters come first; rescued-but-
    /// unmatched noise points get their own ids after them.
    pub clusters: BTreeMap<i64, BTreeSet<String>>,
    /// Cluster id → representative member (medoid in the projected space).
    pub centers: BTreeMap<i64, String>,
    /// Noise points that joined an existing cluster.
    pub rescued: BTreeMap<String, i64>,
    /// Number of points the density stage labelled as noise.
    pub noise: usize,
}

impl SemanticClustering {
    pub fn cluster_of(&self, label: &str) -> Option<i64> {
        self.clusters
            .iter()
            .find(|(_, members)| members.contains(label))
            .map(|(id, _)| *id)
    }
}

/// Embed, project and density-cluster `labels`, then rescue noise points
/// lexically.
pub fn cluster_semantic(
    labels: &[String],
    embedder: &dyn Embedder,
    opts: &SemanticOptions,
) -> Result<SemanticClustering, ClusterError> {
    opts.validate()?;
    let labels: Vec<String> = labels
        .iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut out = SemanticClustering {
        model: embedder.model_id(),
        ..SemanticClustering::default()
    };
    if labels.is_empty() {
        return Ok(out);
    }

    let vectors = embedder.embed(&labels)?;
    if vectors.len() != labels.len() {
        return Err(ClusterError::Embedding(format!(
            "{} returned {} vectors for {} labels",
            out.model,
            vectors.len(),
            labels.len()
        )));
    }
    let reduced = project(&vectors, &opts.projection)?;
    let assignment = hdbscan(&reduced, &opts.density)?;

    let mut points: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    let mut noise = Vec::new();
    for (i, &cluster) in assignment.iter().enumerate() {
        if cluster == NOISE {
            noise.push(i);
        } else {
            points.entry(cluster).or_default().push(i);
        }
    }
    out.noise = noise.len();

    let mut centroids: BTreeMap<i64, Vec<f32>> = BTreeMap::new();
    for (&id, members) in &points {
        let centroid = centroid(&reduced, members);
        let medoid = members
            .iter()
            .copied()
            .min_by(|&a, &b| {
                squared_distance(&reduced[a], &centroid)
                    .total_cmp(&squared_distance(&reduced[b], &centroid))
                    .then_with(|| labels[a].cmp(&labels[b]))
            })
            .unwrap_or(members[0]);
        out.centers.insert(id, labels[medoid].clone());
        out.clusters
            .insert(id, members.iter().map(|&i| labels[i].clone()).collect());
        centroids.insert(id, centroid);
    }

    let mut next_id = points.keys().next_back().map_or(0, |last| last + 1);
    for i in noise {
        let label = &labels[i];
        let mut candidates: Vec<(f32, i64)> = centroids
            .iter()
            .map(|(&id, c)| (squared_distance(&reduced[i], c), id))
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let label_stem = stem(label);
        let home = candidates.into_iter().map(|(_, id)| id).find(|id| {
            let center = &out.centers[id];
            similarity(label, center) >= opts.outlier_similarity || stem(center) == label_stem
        });

        match home {
            Some(id) => {
                tracing::debug!(label = %label, cluster = id, "rescued noise point");
                out.clusters.entry(id).or_default().insert(label.clone());
                out.rescued.insert(label.clone(), id);
            }
            None => {
                out.clusters.insert(next_id, BTreeSet::from([label.clone()]));
                out.centers.insert(next_id, label.clone());
                centroids.insert(next_id, reduced[i].clone());
                next_id += 1;
            }
        }
    }

    tracing::info!(
        labels = labels.len(),
        clusters = out.clusters.len(),
        noise = out.noise,
        rescued = out.rescued.len(),
        model = %out.model,
        "semantic clustering done"
    );
    Ok(out)
}

fn centroid(points: &[Vec<f32>], members: &[usize]) -> Vec<f32> {
    let dim = points.first().map_or(0, Vec::len);
    let mut c = vec![0.0f32; dim];
    for &m in members {
        for (acc, x) in c.iter_mut().zip(&points[m]) {
            *acc += x;
        }
    }
    let count = members.len().max(1) as f32;
    c.iter_mut().for_each(|x| *x /= count);
    c
}

fn squared_distance(x: &[f32], y: &[f32]) -> f32 {
    x.iter().zip(y).map(|(p, q)| (p - q) * (p - q)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use embed::TokenHashEmbedder;

    /// Fixed vectors per label, so clustering tests do not depend on hashing.
    struct TableEmbedder(BTreeMap<&'static str, Vec<f32>>);

    impl Embedder for TableEmbedder {
        fn model_id(&self) -> String {
            "table".into()
        }

        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ClusterError> {
            texts
                .iter()
                .map(|t| {
                    self.0
                        .get(t.as_str())
                        .cloned()
                        .ok_or_else(|| ClusterError::Embedding(format!("no vector for {t}")))
                })
                .collect()
        }
    }

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_input_gives_empty_clustering() {
        let out = cluster_semantic(&[], &TokenHashEmbedder::default(), &SemanticOptions::default()).unwrap();
        assert!(out.clusters.is_empty());
        assert_eq!(out.model, "token-hash-128");
    }

    #[test]
    fn synonyms_with_close_vectors_share_a_cluster() {
        let embedder = TableEmbedder(BTreeMap::from([
            ("higienizar", vec![1.0, 0.02, 0.0, 0.0]),
            ("limpar", vec![1.0, 0.0, 0.02, 0.0]),
            ("lavar", vec![1.0, 0.01, 0.01, 0.0]),
            ("trocar", vec![0.0, 0.0, 1.0, 0.02]),
            ("substituir", vec![0.02, 0.0, 1.0, 0.0]),
            ("troca", vec![0.0, 0.01, 1.0, 0.01]),
        ]));
        let opts = SemanticOptions {
            projection: ProjectionParams {
                n_neighbors: 3,
                n_components: 2,
                ..ProjectionParams::default()
            },
            ..SemanticOptions::default()
        };
        let out = cluster_semantic(
            &labels(&["higienizar", "limpar", "lavar", "trocar", "substituir", "troca"]),
            &embedder,
            &opts,
        )
        .unwrap();

        assert_eq!(out.cluster_of("higienizar"), out.cluster_of("limpar"));
        assert_eq!(out.cluster_of("trocar"), out.cluster_of("substituir"));
        assert_ne!(out.cluster_of("limpar"), out.cluster_of("trocar"));
        let total: usize = out.clusters.values().map(BTreeSet::len).sum();
        assert_eq!(total, 6);
    }

    #[test]
    fn noise_is_rescued_by_spelling_or_left_alone() {
        // Two points cannot form a density cluster: both start as noise.
        let out = cluster_semantic(
            &labels(&["substituir", "subistituir", "calibrar"]),
            &TokenHashEmbedder::default(),
            &SemanticOptions {
                density: DensityParams {
                    min_cluster_size: 5,
                    ..DensityParams::default()
                },
                ..SemanticOptions::default()
            },
        )
        .unwrap();

        assert_eq!(out.noise, 3);
        assert_eq!(out.clusters.len(), 2);
        assert_eq!(out.cluster_of("substituir"), out.cluster_of("subistituir"));
        assert_eq!(out.rescued.len(), 1);
        assert_ne!(out.cluster_of("calibrar"), out.cluster_of("substituir"));
    }

    #[test]
    fn rejects_out_of_range_similarity() {
        let opts = SemanticOptions {
            outlier_similarity: 1.5,
            ..SemanticOptions::default()
        };
        assert!(cluster_semantic(&labels(&["a"]), &TokenHashEmbedder::default(), &opts).is_err());
    }
}
