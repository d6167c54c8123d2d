//! The `Group` type shared by every grouping stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use taskcanon_text::{edit_distance, extract_object, similarity, within_distance};

use crate::ClusterError;

// ============================================================================
// Provenance
// ============================================================================

/// Pipeline stage that produced a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Edit-distance grouping over action tokens or full phrases.
    Lexical,
    /// Stem/synonym merge of lexical groups.
    Merged,
    /// Per-verb grouping over the object portion.
    Object,
    /// Sub-group produced by splitting an oversized group.
    Refined,
    /// Group whose label came from the escalation collaborator.
    Escalated,
}

/// How a candidate is compared against an open group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupingPolicy {
    /// Compare against the group's first member, which is never replaced.
    #[default]
    CenterFixed,
    /// Compare against the previous item in sorted order. Chains.
    Windowed,
}

impl fmt::Display for GroupingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupingPolicy::CenterFixed => f.write_str("center-fixed"),
            GroupingPolicy::Windowed => f.write_str("windowed"),
        }
    }
}

impl FromStr for GroupingPolicy {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "center-fixed" | "centre-fixed" | "center" => Ok(GroupingPolicy::CenterFixed),
            "windowed" | "window" => Ok(GroupingPolicy::Windowed),
            other => Err(ClusterError::UnknownPolicy(other.to_string())),
        }
    }
}

/// Which part of a member is compared by the distance metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    /// The whole string.
    #[default]
    Full,
    /// Everything after the first token.
    Object,
    /// Everything after the first token, or the whole string for one-token
    /// phrases.
    ObjectOrFull,
}

impl GroupKey {
    pub fn key_of(self, member: &str) -> String {
        match self {
            GroupKey::Full => member.to_string(),
            GroupKey::Object => extract_object(member),
            GroupKey::ObjectOrFull => {
                let object = extract_object(member);
                if object.is_empty() {
                    member.to_string()
                } else {
                    object
                }
            }
        }
    }

    pub fn distance(self, a: &str, b: &str) -> usize {
        edit_distance(&self.key_of(a), &self.key_of(b))
    }
}

impl FromStr for GroupKey {
    type Err = ClusterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(GroupKey::Full),
            "object" => Ok(GroupKey::ObjectOrFull),
            "object-strict" => Ok(GroupKey::Object),
            other => Err(ClusterError::UnknownKey(other.to_string())),
        }
    }
}

/// Admission rule a group was built with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Admission {
    /// Edit distance to the comparison point at most this value.
    MaxDistance(usize),
    /// `1 - d / max(len)` to the comparison point at least this value.
    MinSimilarity(f64),
}

impl Admission {
    /// Whether two already-keyed strings satisfy the rule.
    pub fn admits(self, a: &str, b: &str) -> bool {
        match self {
            Admission::MaxDistance(max) => within_distance(a, b, max),
            Admission::MinSimilarity(min) => similarity(a, b) >= min,
        }
    }
}

impl fmt::Display for Admission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Admission::MaxDistance(d) => write!(f, "{d}"),
            Admission::MinSimilarity(s) => write!(f, "{s:.2}"),
        }
    }
}

// ============================================================================
// Group
// ============================================================================

/// An ordered, non-empty set of phrases believed to denote one concept.
///
/// `members[0]` is the center. For `CenterFixed` groups built by this crate
/// every member satisfies `admission` against the center under `key`; merged
/// groups carry no such bound (see [`Group::is_bounded`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    members: Vec<String>,
    admission: Admission,
    stage: Stage,
    policy: GroupingPolicy,
    key: GroupKey,
}

impl Group {
    /// Start a group with `center` as its only member.
    pub fn new(
        center: impl Into<String>,
        admission: Admission,
        stage: Stage,
        policy: GroupingPolicy,
        key: GroupKey,
    ) -> Self {
        Self {
            members: vec![center.into()],
            admission,
            stage,
            policy,
            key,
        }
    }

    /// Build a group from explicit members (the first is the center).
    pub fn from_members(
        members: Vec<String>,
        admission: Admission,
        stage: Stage,
        policy: GroupingPolicy,
        key: GroupKey,
    ) -> Result<Self, ClusterError> {
        if members.is_empty() {
            return Err(ClusterError::EmptyGroup);
        }
        Ok(Self {
            members,
            admission,
            stage,
            policy,
            key,
        })
    }

    pub(crate) fn push(&mut self, member: String) {
        self.members.push(member);
    }

    pub fn center(&self) -> &str {
        &self.members[0]
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn into_members(self) -> Vec<String> {
        self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false: groups are never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn admission(&self) -> Admission {
        self.admission
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn policy(&self) -> GroupingPolicy {
        self.policy
    }

    pub fn key(&self) -> GroupKey {
        self.key
    }

    pub fn contains(&self, member: &str) -> bool {
        self.members.iter().any(|m| m == member)
    }

    /// Same members under a different stage tag.
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = stage;
        self
    }

    /// True when the admission bound against the center holds by construction.
    pub fn is_bounded(&self) -> bool {
        self.policy == GroupingPolicy::CenterFixed
            && matches!(self.stage, Stage::Lexical | Stage::Object | Stage::Refined)
    }

    /// Check the admission rule for every member against the center.
    pub fn satisfies_admission(&self) -> bool {
        let center = self.key.key_of(self.center());
        self.members
            .iter()
            .all(|m| self.admission.admits(&center, &self.key.key_of(m)))
    }

    /// Largest key distance between the center and any member.
    pub fn max_distance_to_center(&self) -> usize {
        let center = self.center();
        self.members
            .iter()
            .map(|m| self.key.distance(center, m))
            .max()
            .unwrap_or(0)
    }

    /// Largest full-string distance between any two members.
    pub fn diameter(&self) -> usize {
        let mut widest = 0;
        for (i, a) in self.members.iter().enumerate() {
            for b in &self.members[i + 1..] {
                widest = widest.max(edit_distance(a, b));
            }
        }
        widest
    }
}
