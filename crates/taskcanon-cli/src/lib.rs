//! # Taskcanon CLI library
//!
//! The pieces the `taskcanon` binary is assembled from, exposed as a library
//! so the workspace integration tests can drive a whole run without a
//! subprocess.
//!
//! - [`dataset`]: delimited task table → [`Corpus`](taskcanon_dictionary::Corpus)
//! - [`config`]: JSON/flag configuration validated into typed [`Settings`]
//! - [`filter`]: whole-word include/exclude keyword filter
//! - [`pipeline`]: the lexical stages end to end, plus the semantic report

pub mod config;
pub mod dataset;
pub mod filter;
pub mod pipeline;

pub use config::{
    ConfigError, EmbeddingBackend, PipelineConfig, SemanticConfig, SemanticSettings, Settings,
    Similarity, Threshold,
};
pub use dataset::{parse_dataset, read_dataset, DatasetError, DatasetOptions};
pub use filter::KeywordFilter;
pub use pipeline::{make_embedder, run_pipeline, semantic_report, PipelineRun, StageCounts};
