//! Edit-distance grouping (`CenterFixed` and `Windowed`).
//!
//! Items are deduplicated and processed in lexicographic order, so the output
//! depends only on the item set.
//!
//! ```text
//! CenterFixed:  item ──► first open group whose CENTER admits it ──► join
//!                   └──► none ─────────────────────────────────────► new group
//!
//! Windowed:     item ──► PREVIOUS item admits it ──► join running group
//!                   └──► otherwise ─────────────────► close, start new group
//! ```
//!
//! First-letter pruning (`CenterFixed` only) skips every group whose center
//! key starts with a different character. Items that only differ in their
//! first letter therefore never meet in this stage.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use taskcanon_text::clean_for_distance;

use crate::group::{Admission, Group, GroupKey, GroupingPolicy, Stage};

/// Knobs for one lexical grouping run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LexicalOptions {
    pub admission: Admission,
    pub policy: GroupingPolicy,
    pub first_letter_pruning: bool,
    pub key: GroupKey,
    pub stage: Stage,
}

impl LexicalOptions {
    pub fn new(threshold: usize, policy: GroupingPolicy) -> Self {
        Self {
            admission: Admission::MaxDistance(threshold),
            policy,
            first_letter_pruning: true,
            key: GroupKey::Full,
            stage: Stage::Lexical,
        }
    }

    pub fn with_pruning(mut self, enabled: bool) -> Self {
        self.first_letter_pruning = enabled;
        self
    }

    pub fn with_key(mut self, key: GroupKey) -> Self {
        self.key = key;
        self
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }
}

/// Group `items` by edit distance with first-letter pruning on.
pub fn group_by_distance<I, S>(items: I, threshold: usize, policy: GroupingPolicy) -> Vec<Group>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    group_with(items, &LexicalOptions::new(threshold, policy))
}

/// `CenterFixed` grouping that admits on similarity (`1 - d / max(len)`)
/// instead of a raw distance.
pub fn group_by_similarity<I, S>(items: I, min_similarity: f64, first_letter_pruning: bool) -> Vec<Group>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let opts = LexicalOptions {
        admission: Admission::MinSimilarity(min_similarity),
        policy: GroupingPolicy::CenterFixed,
        first_letter_pruning,
        key: GroupKey::Full,
        stage: Stage::Lexical,
    };
    group_with(items, &opts)
}

/// Group `items` under explicit options.
pub fn group_with<I, S>(items: I, opts: &LexicalOptions) -> Vec<Group>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let sorted: BTreeSet<String> = items
        .into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let groups = match opts.policy {
        GroupingPolicy::CenterFixed => center_fixed(sorted, opts),
        GroupingPolicy::Windowed => windowed(sorted, opts),
    };
    tracing::debug!(
        groups = groups.len(),
        policy = %opts.policy,
        admission = %opts.admission,
        "lexical grouping done"
    );
    groups
}

struct OpenGroup {
    group: Group,
    center_key: String,
    lead: Option<char>,
}

fn center_fixed(sorted: BTreeSet<String>, opts: &LexicalOptions) -> Vec<Group> {
    let mut open: Vec<OpenGroup> = Vec::new();

    for item in sorted {
        let key = opts.key.key_of(&item);
        let lead = clean_for_distance(&key).chars().next();

        let target = open.iter_mut().find(|g| {
            (!opts.first_letter_pruning || g.lead == lead) && opts.admission.admits(&g.center_key, &key)
        });

        match target {
            Some(g) => {
                tracing::trace!(item = %item, center = %g.group.center(), "admitted");
                g.group.push(item);
            }
            None => open.push(OpenGroup {
                group: Group::new(item, opts.admission, opts.stage, opts.policy, opts.key),
                center_key: key,
                lead,
            }),
        }
    }

    open.into_iter().map(|g| g.group).collect()
}

fn windowed(sorted: BTreeSet<String>, opts: &LexicalOptions) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut prev_key: Option<String> = None;

    for item in sorted {
        let key = opts.key.key_of(&item);
        let joins = prev_key
            .as_deref()
            .is_some_and(|prev| opts.admission.admits(prev, &key));
        match groups.last_mut() {
            Some(current) if joins => current.push(item),
            _ => groups.push(Group::new(item, opts.admission, opts.stage, opts.policy, opts.key)),
        }
        prev_key = Some(key);
    }

    groups
}
