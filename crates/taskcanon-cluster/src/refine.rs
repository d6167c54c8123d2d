//! Re-split of oversized groups on the object portion of each phrase.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::group::{Group, GroupKey, GroupingPolicy, Stage};
use crate::lexical::{group_with, LexicalOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefineOptions {
    /// Groups with more members than this are split.
    pub max_size: usize,
    /// Object distance used for the split.
    pub threshold: usize,
    /// Keep size-1 sub-groups instead of reverting them to ungrouped.
    pub keep_singletons: bool,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            max_size: 10,
            threshold: 4,
            keep_singletons: false,
        }
    }
}

/// Output of [`refine_oversized`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Refinement {
    pub groups: BTreeMap<String, Vec<Group>>,
    /// Phrases whose sub-group had a single member, in encounter order.
    pub ungrouped: Vec<String>,
}

impl Refinement {
    pub fn group_count(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }
}

/// Split every group larger than `max_size` with `CenterFixed` grouping over
/// the object portion, without first-letter pruning.
pub fn refine_oversized(groups: BTreeMap<String, Vec<Group>>, opts: &RefineOptions) -> Refinement {
    let split_opts = LexicalOptions::new(opts.threshold, GroupingPolicy::CenterFixed)
        .with_key(GroupKey::Object)
        .with_pruning(false)
        .with_stage(Stage::Refined);

    let mut out = Refinement::default();
    for (verb, verb_groups) in groups {
        let mut kept = Vec::with_capacity(verb_groups.len());
        for group in verb_groups {
            if group.len() <= opts.max_size {
                kept.push(group);
                continue;
            }

            let size = group.len();
            let subgroups = group_with(group.into_members(), &split_opts);
            tracing::debug!(verb = %verb, size, parts = subgroups.len(), "split oversized group");
            for sub in subgroups {
                if sub.len() == 1 && !opts.keep_singletons {
                    out.ungrouped.extend(sub.into_members());
                } else {
                    kept.push(sub);
                }
            }
        }
        if !kept.is_empty() {
            out.groups.insert(verb, kept);
        }
    }

    tracing::info!(
        groups = out.group_count(),
        ungrouped = out.ungrouped.len(),
        "refinement done"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Admission;

    fn object_group(members: Vec<String>) -> Group {
        Group::from_members(
            members,
            Admission::MaxDistance(4),
            Stage::Object,
            GroupingPolicy::CenterFixed,
            GroupKey::Object,
        )
        .unwrap()
    }

    fn filters_and_pump() -> Vec<String> {
        let mut members: Vec<String> = ('a'..='k').map(|c| format!("trocar filtro {c}")).collect();
        members.push("trocar bomba x".to_string());
        members
    }

    #[test]
    fn oversized_group_is_split_and_singleton_dropped() {
        let input = BTreeMap::from([("trocar".to_string(), vec![object_group(filters_and_pump())])]);
        let out = refine_oversized(input, &RefineOptions::default());

        let groups = &out.groups["trocar"];
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 11);
        assert_eq!(groups[0].stage(), Stage::Refined);
        assert!(groups[0].satisfies_admission());
        assert_eq!(out.ungrouped, ["trocar bomba x"]);
    }

    #[test]
    fn singletons_can_be_kept() {
        let input = BTreeMap::from([("trocar".to_string(), vec![object_group(filters_and_pump())])]);
        let opts = RefineOptions {
            keep_singletons: true,
            ..RefineOptions::default()
        };
        let out = refine_oversized(input, &opts);
        assert_eq!(out.groups["trocar"].len(), 2);
        assert!(out.ungrouped.is_empty());
    }

    #[test]
    fn small_groups_pass_through_unchanged() {
        let small = object_group(vec!["limpar filtro".into(), "limpar filtros".into()]);
        let lone = object_group(vec!["limpar tanque".into()]);
        let input = BTreeMap::from([("limpar".to_string(), vec![small.clone(), lone.clone()])]);
        let out = refine_oversized(input, &RefineOptions::default());
        assert_eq!(out.groups["limpar"], vec![small, lone]);
        assert!(out.ungrouped.is_empty());
    }
}
