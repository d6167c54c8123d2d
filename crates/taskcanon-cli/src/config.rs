//! Pipeline configuration.
//!
//! [`PipelineConfig`] is the raw, serde-facing shape (JSON file, CLI
//! overrides). [`PipelineConfig::validate`] turns it into [`Settings`], whose
//! thresholds are typed; nothing downstream sees an unvalidated number.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use taskcanon_cluster::{
    DensityParams, GroupingPolicy, LexicalOptions, ProjectionParams, RefineOptions, SemanticOptions,
};
use taskcanon_text::{ActionRules, DEFAULT_MIN_SECOND_TOKEN_LEN, DEFAULT_STOP_WORDS};
use thiserror::Error;

use crate::dataset::{DatasetOptions, DEFAULT_DESCRIPTION_COLUMN, DEFAULT_ID_COLUMN};
use crate::filter::KeywordFilter;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid threshold `{name}`: {value} (expected a non-negative integer)")]
    InvalidThreshold { name: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("cannot read config `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Typed values
// ============================================================================

/// A validated non-negative integer threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Threshold(pub usize);

impl Threshold {
    pub fn parse(name: &'static str, raw: f64) -> Result<Self, ConfigError> {
        if !raw.is_finite() || raw < 0.0 || raw.fract() != 0.0 || raw > u32::MAX as f64 {
            return Err(ConfigError::InvalidThreshold {
                name,
                value: raw.to_string(),
            });
        }
        Ok(Self(raw as usize))
    }
}

/// A validated similarity in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Similarity(pub f64);

impl Similarity {
    pub fn parse(name: &'static str, raw: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&raw) {
            return Err(ConfigError::InvalidThreshold {
                name,
                value: raw.to_string(),
            });
        }
        Ok(Self(raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EmbeddingBackend {
    #[default]
    TokenHash,
    Ollama,
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EmbeddingBackend::TokenHash => "token-hash",
            EmbeddingBackend::Ollama => "ollama",
        })
    }
}

impl FromStr for EmbeddingBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token-hash" | "tokenhash" | "hash" => Ok(EmbeddingBackend::TokenHash),
            "ollama" => Ok(EmbeddingBackend::Ollama),
            other => Err(ConfigError::Invalid(format!(
                "unknown embedding backend `{other}` (expected token-hash or ollama)"
            ))),
        }
    }
}

// ============================================================================
// Raw configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub enabled: bool,
    pub backend: String,
    pub model: String,
    pub n_neighbors: f64,
    pub min_dist: f64,
    pub n_components: f64,
    pub min_cluster_size: f64,
    pub min_samples: f64,
    /// Clusters born closer than this in the projected space are merged.
    pub distance_threshold: f64,
    pub outlier_similarity: f64,
    /// Request timeout for remote embedding backends; 0 disables it.
    pub timeout_secs: u64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: EmbeddingBackend::TokenHash.to_string(),
            model: "nomic-embed-text".to_string(),
            n_neighbors: 15.0,
            min_dist: 0.0,
            n_components: 5.0,
            min_cluster_size: 2.0,
            min_samples: 1.0,
            distance_threshold: 0.0,
            outlier_similarity: 0.80,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub separator: String,
    pub description_column: String,
    pub id_column: String,

    pub action_threshold: f64,
    pub action_policy: String,
    pub first_letter_pruning: bool,
    pub action_min_second_token_len: f64,
    pub stop_words: Vec<String>,

    pub object_threshold: f64,
    pub refine_max_size: f64,
    pub refine_threshold: f64,
    pub keep_singletons: bool,
    pub ambiguity_diameter: f64,

    pub include_words: Vec<String>,
    pub exclude_words: Vec<String>,

    pub synonyms: Option<PathBuf>,
    pub verbs: Option<PathBuf>,

    pub semantic: SemanticConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            separator: ";".to_string(),
            description_column: DEFAULT_DESCRIPTION_COLUMN.to_string(),
            id_column: DEFAULT_ID_COLUMN.to_string(),
            action_threshold: 2.0,
            action_policy: GroupingPolicy::CenterFixed.to_string(),
            first_letter_pruning: true,
            action_min_second_token_len: DEFAULT_MIN_SECOND_TOKEN_LEN as f64,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
            object_threshold: 4.0,
            refine_max_size: 10.0,
            refine_threshold: 4.0,
            keep_singletons: false,
            ambiguity_diameter: taskcanon_dictionary::DEFAULT_AMBIGUITY_DIAMETER as f64,
            include_words: Vec::new(),
            exclude_words: Vec::new(),
            synonyms: None,
            verbs: None,
            semantic: SemanticConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Check every field and build typed settings.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        let mut seps = self.separator.chars();
        let separator = match (seps.next(), seps.next()) {
            (Some(c), None) if c != '"' && c != '\n' => c,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "separator must be a single character, got `{}`",
                    self.separator
                )))
            }
        };
        if self.description_column.trim().is_empty() || self.id_column.trim().is_empty() {
            return Err(ConfigError::Invalid("column names must not be empty".to_string()));
        }

        let action_threshold = Threshold::parse("action_threshold", self.action_threshold)?;
        let policy: GroupingPolicy = self
            .action_policy
            .parse()
            .map_err(|e: taskcanon_cluster::ClusterError| ConfigError::Invalid(e.to_string()))?;
        let min_second = Threshold::parse("action_min_second_token_len", self.action_min_second_token_len)?;
        let object_threshold = Threshold::parse("object_threshold", self.object_threshold)?;
        let refine_max_size = Threshold::parse("refine_max_size", self.refine_max_size)?;
        let refine_threshold = Threshold::parse("refine_threshold", self.refine_threshold)?;
        let ambiguity_diameter = Threshold::parse("ambiguity_diameter", self.ambiguity_diameter)?;
        if refine_max_size.0 == 0 {
            return Err(ConfigError::InvalidThreshold {
                name: "refine_max_size",
                value: "0".to_string(),
            });
        }

        let semantic = if self.semantic.enabled {
            Some(self.semantic.validate()?)
        } else {
            None
        };

        Ok(Settings {
            dataset: DatasetOptions {
                separator,
                description_column: self.description_column.trim().to_string(),
                id_column: self.id_column.trim().to_string(),
            },
            action_rules: ActionRules::new(min_second.0, &self.stop_words),
            action: LexicalOptions::new(action_threshold.0, policy).with_pruning(self.first_letter_pruning),
            object_threshold,
            refine: RefineOptions {
                max_size: refine_max_size.0,
                threshold: refine_threshold.0,
                keep_singletons: self.keep_singletons,
            },
            ambiguity_diameter: ambiguity_diameter.0,
            filter: KeywordFilter::new(self.include_words.as_slice(), self.exclude_words.as_slice()),
            synonyms: self.synonyms.clone(),
            verbs: self.verbs.clone(),
            semantic,
        })
    }
}

impl SemanticConfig {
    pub fn validate(&self) -> Result<SemanticSettings, ConfigError> {
        let backend: EmbeddingBackend = self.backend.parse()?;
        let n_neighbors = Threshold::parse("semantic.n_neighbors", self.n_neighbors)?;
        let n_components = Threshold::parse("semantic.n_components", self.n_components)?;
        let min_cluster_size = Threshold::parse("semantic.min_cluster_size", self.min_cluster_size)?;
        let min_samples = Threshold::parse("semantic.min_samples", self.min_samples)?;
        let outlier = Similarity::parse("semantic.outlier_similarity", self.outlier_similarity)?;
        if !self.min_dist.is_finite() || self.min_dist < 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "semantic.min_dist",
                value: self.min_dist.to_string(),
            });
        }
        if !self.distance_threshold.is_finite() || self.distance_threshold < 0.0 {
            return Err(ConfigError::InvalidThreshold {
                name: "semantic.distance_threshold",
                value: self.distance_threshold.to_string(),
            });
        }

        let options = SemanticOptions {
            projection: ProjectionParams {
                n_neighbors: n_neighbors.0,
                min_dist: self.min_dist as f32,
                n_components: n_components.0,
                ..ProjectionParams::default()
            },
            density: DensityParams {
                min_cluster_size: min_cluster_size.0,
                min_samples: min_samples.0,
                ..DensityParams::default()
            },
            outlier_similarity: outlier.0,
        }
        .with_distance_threshold(self.distance_threshold);
        options
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(SemanticSettings {
            backend,
            model: self.model.trim().to_string(),
            timeout_secs: self.timeout_secs,
            options,
        })
    }
}

// ============================================================================
// Validated settings
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticSettings {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub timeout_secs: u64,
    pub options: SemanticOptions,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub dataset: DatasetOptions,
    pub action_rules: ActionRules,
    pub action: LexicalOptions,
    pub object_threshold: Threshold,
    pub refine: RefineOptions,
    pub ambiguity_diameter: usize,
    pub filter: KeywordFilter,
    pub synonyms: Option<PathBuf>,
    pub verbs: Option<PathBuf>,
    pub semantic: Option<SemanticSettings>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskcanon_cluster::Admission;

    #[test]
    fn defaults_validate() {
        let settings = PipelineConfig::default().validate().unwrap();
        assert_eq!(settings.dataset.separator, ';');
        assert_eq!(settings.action.admission, Admission::MaxDistance(2));
        assert_eq!(settings.action.policy, GroupingPolicy::CenterFixed);
        assert!(settings.action.first_letter_pruning);
        assert_eq!(settings.object_threshold, Threshold(4));
        assert_eq!(settings.refine.max_size, 10);
        assert!(settings.semantic.is_none());
    }

    #[test]
    fn rejects_negative_and_fractional_thresholds() {
        for raw in [-1.0, 2.5, f64::NAN] {
            let config = PipelineConfig {
                action_threshold: raw,
                ..PipelineConfig::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidThreshold { name: "action_threshold", .. })
            ));
        }
    }

    #[test]
    fn json_overrides_and_semantic_section() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "action_threshold": 3,
                "action_policy": "windowed",
                "semantic": {"enabled": true, "n_neighbors": 5, "distance_threshold": 0.4}
            }"#,
        )
        .unwrap();
        let settings = config.validate().unwrap();
        assert_eq!(settings.action.admission, Admission::MaxDistance(3));
        assert_eq!(settings.action.policy, GroupingPolicy::Windowed);
        let semantic = settings.semantic.unwrap();
        assert_eq!(semantic.backend, EmbeddingBackend::TokenHash);
        assert_eq!(semantic.options.projection.n_neighbors, 5);
        assert_eq!(semantic.options.density.cluster_selection_epsilon, 0.4);
    }

    #[test]
    fn rejects_bad_policy_separator_and_similarity() {
        let bad_policy = PipelineConfig {
            action_policy: "greedy".into(),
            ..PipelineConfig::default()
        };
        assert!(matches!(bad_policy.validate(), Err(ConfigError::Invalid(_))));

        let bad_sep = PipelineConfig {
            separator: ";;".into(),
            ..PipelineConfig::default()
        };
        assert!(matches!(bad_sep.validate(), Err(ConfigError::Invalid(_))));

        let mut bad_sim = PipelineConfig::default();
        bad_sim.semantic.enabled = true;
        bad_sim.semantic.outlier_similarity = 1.2;
        assert!(matches!(bad_sim.validate(), Err(ConfigError::InvalidThreshold { .. })));
    }
}
