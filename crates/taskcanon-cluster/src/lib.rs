//! Taskcanon Cluster: grouping stages of the canonicalization pipeline
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────────┐
//! │                      GROUPING STAGES                               │
//! ├────────────────────────────────────────────────────────────────────┤
//! │                                                                    │
//! │  action tokens ──► lexical (CenterFixed | Windowed) ──► merge      │
//! │                                                   (stem, synonym)  │
//! │                                                          │         │
//! │  phrases per verb ──► lexical on objects ──► refine oversized      │
//! │                                                                    │
//! │  labels ──► semantic (embed ► project ► HDBSCAN ► rescue)          │
//! │             (separate report, never unioned)                       │
//! │                                                                    │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every stage consumes the previous stage's groups by value and returns new
//! ones; nothing is shared across stages.

pub mod group;
pub mod lexical;
pub mod merge;
pub mod refine;
pub mod semantic;

use thiserror::Error;

pub use group::{Admission, Group, GroupKey, GroupingPolicy, Stage};
pub use lexical::{group_by_distance, group_by_similarity, group_with, LexicalOptions};
pub use merge::{keyed_by_center, merge_groups};
pub use refine::{refine_oversized, RefineOptions, Refinement};
pub use semantic::density::{ClusterSelectionMethod, DensityParams, NOISE};
pub use semantic::embed::{Embedder, TokenHashEmbedder};
#[cfg(feature = "ollama")]
pub use semantic::embed::OllamaEmbedder;
pub use semantic::projection::ProjectionParams;
pub use semantic::{cluster_semantic, SemanticClustering, SemanticOptions};

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("a group needs at least one member")]
    EmptyGroup,
    #[error("unknown grouping policy `{0}` (expected center-fixed or windowed)")]
    UnknownPolicy(String),
    #[error("unknown grouping key `{0}` (expected full or object)")]
    UnknownKey(String),
    #[error("embedding failed: {0}")]
    Embedding(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}
