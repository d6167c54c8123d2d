//! End-to-end canonicalization run.
//!
//! ```text
//! corpus ─► normalize ─► action tokens ─► lexical groups ─► merge (stem/synonym)
//!                                                              │
//!              verb label per merged group ◄──────────────────┘
//!                        │
//! phrases bucketed by verb ─► object groups ─► refine oversized ─► dictionary
//! ```
//!
//! Every stage takes the previous stage's output by value or shared reference
//! and returns a fresh structure.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use taskcanon_cluster::{
    cluster_semantic, group_with, keyed_by_center, merge_groups, refine_oversized, ClusterError,
    Embedder, Group, GroupKey, GroupingPolicy, LexicalOptions, Refinement, SemanticClustering,
    Stage, TokenHashEmbedder,
};
use taskcanon_dictionary::{canonical_label, Corpus, DictionaryBuilder, DictionaryDraft, VerbLexicon};
use taskcanon_text::{extract_action, stem, SynonymTable};

use crate::config::{EmbeddingBackend, SemanticSettings, Settings};

/// Counts logged and printed after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub records: usize,
    pub phrases: usize,
    pub normalized: usize,
    pub actions: usize,
    pub action_groups: usize,
    pub merged_groups: usize,
    pub object_groups: usize,
    pub refined_groups: usize,
    pub ungrouped: usize,
    pub entries: usize,
    pub labels: usize,
    pub ambiguous: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    /// Normalized phrase → action token.
    pub actions: BTreeMap<String, String>,
    pub action_groups: Vec<Group>,
    pub merged: BTreeMap<String, Group>,
    /// Action token → canonical verb label.
    pub verb_of: BTreeMap<String, String>,
    pub object_groups: BTreeMap<String, Vec<Group>>,
    pub refinement: Refinement,
    pub draft: DictionaryDraft,
    pub counts: StageCounts,
}

impl PipelineRun {
    /// Distinct verb labels, the input of the semantic report.
    pub fn verb_labels(&self) -> Vec<String> {
        self.verb_of
            .values()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Run every lexical stage and build the automatic dictionary.
pub fn run_pipeline(
    corpus: &Corpus,
    settings: &Settings,
    synonyms: &SynonymTable,
    lexicon: &VerbLexicon,
) -> PipelineRun {
    let forms = corpus.normalized();

    let actions: BTreeMap<String, String> = forms
        .iter()
        .map(|form| (form.clone(), extract_action(form, &settings.action_rules)))
        .filter(|(_, action)| !action.is_empty())
        .collect();
    let distinct_actions: BTreeSet<&String> = actions.values().collect();

    let action_groups = group_with(distinct_actions.iter().map(|a| a.as_str()), &settings.action);
    tracing::info!(
        actions = distinct_actions.len(),
        groups = action_groups.len(),
        policy = %settings.action.policy,
        threshold = %settings.action.admission,
        "action tokens grouped"
    );

    let merged = merge_groups(keyed_by_center(action_groups.clone()), synonyms, stem);
    tracing::info!(groups = merged.len(), "stem/synonym merge done");

    let mut verb_of = BTreeMap::new();
    for group in merged.values() {
        let Some(verb) = canonical_label(group.members(), lexicon) else {
            continue;
        };
        for action in group.members() {
            verb_of.insert(action.clone(), verb.to_string());
        }
    }

    let mut buckets: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for (form, action) in &actions {
        let verb = verb_of.get(action).cloned().unwrap_or_else(|| action.clone());
        buckets.entry(verb).or_default().push(form.as_str());
    }

    let object_opts = LexicalOptions::new(settings.object_threshold.0, GroupingPolicy::CenterFixed)
        .with_pruning(false)
        .with_key(GroupKey::Object)
        .with_stage(Stage::Object);
    let object_groups: BTreeMap<String, Vec<Group>> = buckets
        .into_iter()
        .map(|(verb, phrases)| (verb, group_with(phrases, &object_opts)))
        .collect();
    let object_group_count: usize = object_groups.values().map(Vec::len).sum();
    tracing::info!(
        verbs = object_groups.len(),
        groups = object_group_count,
        "phrases grouped by object"
    );

    let refinement = refine_oversized(object_groups.clone(), &settings.refine);
    tracing::info!(
        groups = refinement.group_count(),
        ungrouped = refinement.ungrouped.len(),
        max_size = settings.refine.max_size,
        "oversized groups refined"
    );

    let draft = DictionaryBuilder::new(lexicon.clone())
        .with_ambiguity_diameter(settings.ambiguity_diameter)
        .build_keyed(corpus, &refinement.groups);

    let counts = StageCounts {
        records: corpus.record_count(),
        phrases: corpus.len(),
        normalized: forms.len(),
        actions: distinct_actions.len(),
        action_groups: action_groups.len(),
        merged_groups: merged.len(),
        object_groups: object_group_count,
        refined_groups: refinement.group_count(),
        ungrouped: refinement.ungrouped.len(),
        entries: draft.dictionary.len(),
        labels: draft.dictionary.label_count(),
        ambiguous: draft.ambiguous().count(),
    };

    PipelineRun {
        actions,
        action_groups,
        merged,
        verb_of,
        object_groups,
        refinement,
        draft,
        counts,
    }
}

/// Embedder for the configured backend.
pub fn make_embedder(settings: &SemanticSettings) -> Result<Box<dyn Embedder>, ClusterError> {
    match settings.backend {
        EmbeddingBackend::TokenHash => Ok(Box::new(TokenHashEmbedder::default())),
        #[cfg(feature = "llm-ollama")]
        EmbeddingBackend::Ollama => {
            let timeout = (settings.timeout_secs > 0).then(|| std::time::Duration::from_secs(settings.timeout_secs));
            Ok(Box::new(taskcanon_cluster::OllamaEmbedder::from_env(&settings.model, timeout)))
        }
        #[cfg(not(feature = "llm-ollama"))]
        EmbeddingBackend::Ollama => Err(ClusterError::Embedding(
            "ollama backend not compiled in (enable the `llm-ollama` feature)".to_string(),
        )),
    }
}

/// Semantic clustering of `labels`; a separate report, never merged into the
/// dictionary.
pub fn semantic_report(labels: &[String], settings: &SemanticSettings) -> Result<SemanticClustering, ClusterError> {
    let embedder = make_embedder(settings)?;
    cluster_semantic(labels, embedder.as_ref(), &settings.options)
}
