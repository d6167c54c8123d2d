//! Hierarchical density-based clustering (HDBSCAN).
//!
//! ```text
//! points ──► core distances ──► mutual reachability ──► MST (Prim)
//!                                                        │
//!   labels ◄── select (EOM | Leaf, epsilon) ◄── condensed tree ◄── single linkage
//! ```
//!
//! The number of clusters is not an input. Points that never belong to a
//! selected cluster get [`NOISE`].

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ClusterError;

/// Label of a point that belongs to no cluster.
pub const NOISE: i64 = -1;

/// Lambda used for zero-distance merges.
const MAX_LAMBDA: f64 = 1e12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ClusterSelectionMethod {
    /// Excess of mass: keep the most persistent clusters.
    #[default]
    Eom,
    /// Keep the leaves of the condensed tree.
    Leaf,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityParams {
    pub min_cluster_size: usize,
    /// Neighbors counted for the core distance, the point itself included.
    pub min_samples: usize,
    pub selection: ClusterSelectionMethod,
    /// Clusters born below this distance are replaced by their ancestor.
    pub cluster_selection_epsilon: f64,
}

impl Default for DensityParams {
    fn default() -> Self {
        Self {
            min_cluster_size: 2,
            min_samples: 1,
            selection: ClusterSelectionMethod::Eom,
            cluster_selection_epsilon: 0.0,
        }
    }
}

impl DensityParams {
    pub fn validate(&self) -> Result<(), ClusterError> {
        if self.min_cluster_size < 2 {
            return Err(ClusterError::InvalidParameter(format!(
                "min_cluster_size must be >= 2, got {}",
                self.min_cluster_size
            )));
        }
        if self.min_samples < 1 {
            return Err(ClusterError::InvalidParameter(format!(
                "min_samples must be >= 1, got {}",
                self.min_samples
            )));
        }
        if self.cluster_selection_epsilon.is_nan() || self.cluster_selection_epsilon < 0.0 {
            return Err(ClusterError::InvalidParameter(format!(
                "cluster_selection_epsilon must be >= 0, got {}",
                self.cluster_selection_epsilon
            )));
        }
        Ok(())
    }
}

/// Cluster `points` (Euclidean). Returns one label per point; clusters are
/// numbered from 0 in order of their lowest point index.
pub fn hdbscan(points: &[Vec<f32>], params: &DensityParams) -> Result<Vec<i64>, ClusterError> {
    params.validate()?;
    let n = points.len();
    if n < params.min_cluster_size {
        return Ok(vec![NOISE; n]);
    }

    let distances = euclidean_distances(points);
    let core = core_distances(&distances, params.min_samples);
    let mst = minimum_spanning_tree(&distances, &core);
    let dendrogram = single_linkage(n, mst);
    let tree = CondensedTree::build(&dendrogram, n, params.min_cluster_size);
    let selected = tree.select(params);
    let labels = tree.label_points(&selected, n);

    tracing::debug!(
        points = n,
        clusters = selected.len(),
        noise = labels.iter().filter(|l| **l == NOISE).count(),
        "density clustering done"
    );
    Ok(labels)
}

fn euclidean_distances(points: &[Vec<f32>]) -> Vec<Vec<f64>> {
    points
        .par_iter()
        .map(|a| {
            points
                .iter()
                .map(|b| {
                    a.iter()
                        .zip(b)
                        .map(|(x, y)| f64::from(x - y).powi(2))
                        .sum::<f64>()
                        .sqrt()
                })
                .collect()
        })
        .collect()
}

fn core_distances(distances: &[Vec<f64>], min_samples: usize) -> Vec<f64> {
    distances
        .par_iter()
        .map(|row| {
            let mut sorted = row.clone();
            sorted.sort_by(f64::total_cmp);
            sorted[(min_samples - 1).min(sorted.len() - 1)]
        })
        .collect()
}

/// Prim's algorithm over the dense mutual-reachability graph.
fn minimum_spanning_tree(distances: &[Vec<f64>], core: &[f64]) -> Vec<(usize, usize, f64)> {
    let n = distances.len();
    let mut in_tree = vec![false; n];
    let mut best = vec![f64::INFINITY; n];
    let mut from = vec![0usize; n];
    let mut edges = Vec::with_capacity(n.saturating_sub(1));

    let mut current = 0;
    in_tree[0] = true;
    for _ in 1..n {
        for j in 0..n {
            if in_tree[j] {
                continue;
            }
            let mr = distances[current][j].max(core[current]).max(core[j]);
            if mr < best[j] {
                best[j] = mr;
                from[j] = current;
            }
        }
        let mut next = usize::MAX;
        let mut next_w = f64::INFINITY;
        for j in 0..n {
            if !in_tree[j] && (next == usize::MAX || best[j] < next_w) {
                next = j;
                next_w = best[j];
            }
        }
        in_tree[next] = true;
        edges.push((from[next], next, next_w));
        current = next;
    }

    edges.sort_by(|a, b| a.2.total_cmp(&b.2).then((a.0, a.1).cmp(&(b.0, b.1))));
    edges
}

/// Merge step of single linkage; node `n + i` is created by the `i`-th merge.
#[derive(Debug, Clone, Copy)]
struct Merge {
    left: usize,
    right: usize,
    distance: f64,
    size: usize,
}

fn single_linkage(n: usize, mst: Vec<(usize, usize, f64)>) -> Vec<Merge> {
    let mut parent: Vec<usize> = (0..2 * n).collect();
    let mut size = vec![1usize; 2 * n];
    let mut merges = Vec::with_capacity(n.saturating_sub(1));

    fn find(parent: &mut [usize], mut x: usize) -> usize {
        while parent[x] != x {
            parent[x] = parent[parent[x]];
            x = parent[x];
        }
        x
    }

    for (a, b, distance) in mst {
        let ra = find(&mut parent, a);
        let rb = find(&mut parent, b);
        let node = n + merges.len();
        parent[ra] = node;
        parent[rb] = node;
        size[node] = size[ra] + size[rb];
        merges.push(Merge {
            left: ra,
            right: rb,
            distance,
            size: size[node],
        });
    }
    merges
}

// ============================================================================
// Condensed tree
// ============================================================================

/// Row of the condensed tree. Clusters are numbered from `n` (the root);
/// children below `n` are points.
#[derive(Debug, Clone, Copy)]
struct CondensedEdge {
    parent: usize,
    child: usize,
    lambda: f64,
    size: usize,
}

struct CondensedTree {
    edges: Vec<CondensedEdge>,
    root: usize,
    next_cluster: usize,
}

fn lambda_of(distance: f64) -> f64 {
    if distance > 0.0 {
        (1.0 / distance).min(MAX_LAMBDA)
    } else {
        MAX_LAMBDA
    }
}

impl CondensedTree {
    fn build(merges: &[Merge], n: usize, min_cluster_size: usize) -> Self {
        let root = n;
        let mut tree = Self {
            edges: Vec::new(),
            root,
            next_cluster: root + 1,
        };
        if merges.is_empty() {
            return tree;
        }

        let node_size = |node: usize| if node < n { 1 } else { merges[node - n].size };

        // (dendrogram node, cluster label it carries)
        let mut stack = vec![(n + merges.len() - 1, root)];
        while let Some((node, cluster)) = stack.pop() {
            if node < n {
                continue;
            }
            let merge = merges[node - n];
            let lambda = lambda_of(merge.distance);
            let (left, right) = (merge.left, merge.right);
            let (left_size, right_size) = (node_size(left), node_size(right));
            let left_big = left_size >= min_cluster_size;
            let right_big = right_size >= min_cluster_size;

            match (left_big, right_big) {
                (true, true) => {
                    for (child, size) in [(left, left_size), (right, right_size)] {
                        let label = tree.next_cluster;
                        tree.next_cluster += 1;
                        tree.edges.push(CondensedEdge {
                            parent: cluster,
                            child: label,
                            lambda,
                            size,
                        });
                        stack.push((child, label));
                    }
                }
                (true, false) => {
                    tree.fall_out(right, cluster, lambda, merges, n);
                    stack.push((left, cluster));
                }
                (false, true) => {
                    tree.fall_out(left, cluster, lambda, merges, n);
                    stack.push((right, cluster));
                }
                (false, false) => {
                    tree.fall_out(left, cluster, lambda, merges, n);
                    tree.fall_out(right, cluster, lambda, merges, n);
                }
            }
        }
        tree
    }

    /// Every point under `node` leaves `cluster` at `lambda`.
    fn fall_out(&mut self, node: usize, cluster: usize, lambda: f64, merges: &[Merge], n: usize) {
        let mut stack = vec![node];
        while let Some(x) = stack.pop() {
            if x < n {
                self.edges.push(CondensedEdge {
                    parent: cluster,
                    child: x,
                    lambda,
                    size: 1,
                });
            } else {
                let m = merges[x - n];
                stack.push(m.left);
                stack.push(m.right);
            }
        }
    }

    fn cluster_ids(&self) -> std::ops::Range<usize> {
        self.root..self.next_cluster
    }

    fn birth_lambda(&self) -> Vec<f64> {
        let mut birth = vec![0.0; self.next_cluster - self.root];
        for e in &self.edges {
            if e.child >= self.root {
                birth[e.child - self.root] = e.lambda;
            }
        }
        birth
    }

    fn parent_of(&self) -> Vec<Option<usize>> {
        let mut parent = vec![None; self.next_cluster - self.root];
        for e in &self.edges {
            if e.child >= self.root {
                parent[e.child - self.root] = Some(e.parent);
            }
        }
        parent
    }

    fn children_of(&self) -> Vec<Vec<usize>> {
        let mut children = vec![Vec::new(); self.next_cluster - self.root];
        for e in &self.edges {
            if e.child >= self.root {
                children[e.parent - self.root].push(e.child);
            }
        }
        children
    }

    fn stability(&self) -> Vec<f64> {
        let birth = self.birth_lambda();
        let mut stability = vec![0.0; birth.len()];
        for e in &self.edges {
            let p = e.parent - self.root;
            stability[p] += (e.lambda - birth[p]) * e.size as f64;
        }
        stability
    }

    /// Selected cluster ids (root never selected).
    fn select(&self, params: &DensityParams) -> Vec<usize> {
        let children = self.children_of();
        let mut selected = vec![false; children.len()];

        match params.selection {
            ClusterSelectionMethod::Leaf => {
                for c in self.cluster_ids().skip(1) {
                    selected[c - self.root] = children[c - self.root].is_empty();
                }
            }
            ClusterSelectionMethod::Eom => {
                let mut stability = self.stability();
                // Children always carry larger ids than their parent.
                for c in self.cluster_ids().skip(1).rev() {
                    let idx = c - self.root;
                    let subtree: f64 = children[idx].iter().map(|k| stability[k - self.root]).sum();
                    if children[idx].is_empty() || stability[idx] >= subtree {
                        selected[idx] = true;
                        self.clear_descendants(idx, &children, &mut selected);
                    } else {
                        stability[idx] = subtree;
                    }
                }
            }
        }

        if params.cluster_selection_epsilon > 0.0 {
            self.apply_epsilon(&mut selected, &children, params.cluster_selection_epsilon);
        }

        self.cluster_ids()
            .filter(|c| selected[c - self.root])
            .collect()
    }

    fn clear_descendants(&self, idx: usize, children: &[Vec<usize>], selected: &mut [bool]) {
        let mut stack: Vec<usize> = children[idx].clone();
        while let Some(c) = stack.pop() {
            selected[c - self.root] = false;
            stack.extend(children[c - self.root].iter().copied());
        }
    }

    /// Replace clusters born below `epsilon` by their nearest ancestor born at
    /// or above it (the root excluded).
    fn apply_epsilon(&self, selected: &mut [bool], children: &[Vec<usize>], epsilon: f64) {
        let birth = self.birth_lambda();
        let parent = self.parent_of();
        let birth_distance = |idx: usize| 1.0 / birth[idx];

        let chosen: Vec<usize> = (0..selected.len()).filter(|&i| selected[i]).collect();
        for idx in chosen {
            if !selected[idx] || birth_distance(idx) >= epsilon {
                continue;
            }
            let mut target = idx;
            while let Some(p) = parent[target] {
                let p_idx = p - self.root;
                if p == self.root {
                    break;
                }
                target = p_idx;
                if birth_distance(p_idx) >= epsilon {
                    break;
                }
            }
            if target != idx {
                selected[target] = true;
                self.clear_descendants(target, children, selected);
            }
        }
    }

    fn label_points(&self, selected: &[usize], n: usize) -> Vec<i64> {
        let parent = self.parent_of();
        let mut cluster_label: Vec<Option<usize>> = vec![None; self.next_cluster - self.root];
        for (k, c) in selected.iter().enumerate() {
            cluster_label[c - self.root] = Some(k);
        }

        let mut point_parent = vec![self.root; n];
        for e in &self.edges {
            if e.child < self.root {
                point_parent[e.child] = e.parent;
            }
        }

        let raw: Vec<Option<usize>> = point_parent
            .iter()
            .map(|&start| {
                let mut c = Some(start);
                while let Some(cluster) = c {
                    if let Some(k) = cluster_label[cluster - self.root] {
                        return Some(k);
                    }
                    c = parent[cluster - self.root];
                }
                None
            })
            .collect();

        // Renumber clusters by their lowest point index.
        let mut order: Vec<Option<i64>> = vec![None; selected.len()];
        let mut next = 0i64;
        raw.iter()
            .map(|r| match r {
                Some(k) => *order[*k].get_or_insert_with(|| {
                    let id = next;
                    next += 1;
                    id
                }),
                None => NOISE,
            })
            .collect()
    }
}
