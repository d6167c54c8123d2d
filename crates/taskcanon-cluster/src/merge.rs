//! Stem/synonym merge of labelled groups.
//!
//! Two groups are linked when their labels share a stem, or when the synonym
//! table maps one label directly onto the other group's label or one of its
//! members. Links are closed transitively inside one call; synonym chains
//! are followed for one hop only (`a -> b -> c` with no `b` group leaves `a`
//! and `c` apart). Call again to run another pass.

use std::collections::BTreeMap;

use taskcanon_text::SynonymTable;

use crate::group::{Group, Stage};

/// Key groups by their center.
pub fn keyed_by_center(groups: Vec<Group>) -> BTreeMap<String, Group> {
    groups
        .into_iter()
        .map(|g| (g.center().to_string(), g))
        .collect()
}

/// Merge groups whose labels are stem-equal or one-hop synonyms.
///
/// Each output group is labelled by its lexicographically smallest member.
/// Groups that are not linked to anything pass through with their stage and
/// member order intact.
pub fn merge_groups<F>(
    groups: BTreeMap<String, Group>,
    synonyms: &SynonymTable,
    stem_fn: F,
) -> BTreeMap<String, Group>
where
    F: Fn(&str) -> String,
{
    let labels: Vec<String> = groups.keys().cloned().collect();
    let mut index: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, group) in groups.values().enumerate() {
        for member in group.members() {
            index.entry(member.as_str()).or_insert(i);
        }
    }
    for (i, label) in labels.iter().enumerate() {
        index.insert(label.as_str(), i);
    }
    let mut sets = DisjointSets::new(labels.len());

    let mut by_stem: BTreeMap<String, usize> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        let root = stem_fn(label);
        match by_stem.get(&root) {
            Some(&j) => {
                tracing::debug!(a = %labels[j], b = %label, stem = %root, "stem link");
                sets.union(i, j);
            }
            None => {
                by_stem.insert(root, i);
            }
        }
    }

    for (i, label) in labels.iter().enumerate() {
        let Some(canonical) = synonyms.get(label) else {
            continue;
        };
        if let Some(&j) = index.get(canonical).filter(|&&j| j != i) {
            tracing::debug!(a = %label, b = %canonical, "synonym link");
            sets.union(i, j);
        }
    }

    let mut components: BTreeMap<usize, Vec<Group>> = BTreeMap::new();
    for (i, (_, group)) in groups.into_iter().enumerate() {
        components.entry(sets.find(i)).or_default().push(group);
    }

    let mut merged = BTreeMap::new();
    for (_, parts) in components {
        let group = if parts.len() == 1 {
            parts.into_iter().next()
        } else {
            fuse(parts)
        };
        if let Some(group) = group {
            let label = group
                .members()
                .iter()
                .min()
                .cloned()
                .unwrap_or_else(|| group.center().to_string());
            merged.insert(label, group);
        }
    }

    tracing::debug!(groups = merged.len(), "merge pass done");
    merged
}

fn fuse(parts: Vec<Group>) -> Option<Group> {
    let first = parts.first()?;
    let (admission, policy, key) = (first.admission(), first.policy(), first.key());
    let mut members: Vec<String> = parts.into_iter().flat_map(Group::into_members).collect();
    members.sort();
    members.dedup();
    Group::from_members(members, admission, Stage::Merged, policy, key).ok()
}

/// Union-find with path halving; the smaller index becomes the root so
/// component order follows label order.
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[hi] = lo;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::{Admission, GroupKey, GroupingPolicy};
    use taskcanon_text::stem;

    fn lexical(members: &[&str]) -> Group {
        Group::from_members(
            members.iter().map(|m| m.to_string()).collect(),
            Admission::MaxDistance(2),
            Stage::Lexical,
            GroupingPolicy::CenterFixed,
            GroupKey::Full,
        )
        .unwrap()
    }

    fn keyed(groups: &[&[&str]]) -> BTreeMap<String, Group> {
        keyed_by_center(groups.iter().map(|g| lexical(g)).collect())
    }

    #[test]
    fn synonym_merges_unrelated_spellings() {
        let synonyms = SynonymTable::from_pairs([("substituir", "trocar")]).unwrap();
        let merged = merge_groups(keyed(&[&["substituir"], &["trocar", "trocr"]]), &synonyms, stem);
        assert_eq!(merged.len(), 1);
        let group = &merged["substituir"];
        assert_eq!(group.members(), ["substituir", "trocar", "trocr"]);
        assert_eq!(group.stage(), Stage::Merged);
    }

    #[test]
    fn stems_merge_morphological_variants() {
        let merged = merge_groups(
            keyed(&[&["lubrificacao"], &["lubrificar"], &["limpar"]]),
            &SynonymTable::new(),
            stem,
        );
        let labels: Vec<&str> = merged.keys().map(String::as_str).collect();
        // lubrificacao -> lubrifica, lubrificar -> lubrific: no shared stem
        assert_eq!(labels, ["limpar", "lubrificacao", "lubrificar"]);

        let merged = merge_groups(keyed(&[&["limpar"], &["limper"]]), &SynonymTable::new(), stem);
        assert_eq!(merged.keys().collect::<Vec<_>>(), ["limpar"]);
    }

    #[test]
    fn untouched_groups_keep_their_stage() {
        let merged = merge_groups(keyed(&[&["apertar", "aperto de"]]), &SynonymTable::new(), stem);
        assert_eq!(merged["apertar"].stage(), Stage::Lexical);
    }

    #[test]
    fn synonym_target_may_be_a_member() {
        let synonyms = SynonymTable::from_pairs([("substituir", "trocar")]).unwrap();
        let merged = merge_groups(keyed(&[&["substituir"], &["troca", "trocar"]]), &synonyms, stem);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["substituir"].members(), ["substituir", "troca", "trocar"]);
    }

    #[test]
    fn synonym_chains_stop_after_one_hop() {
        let synonyms = SynonymTable::from_pairs([("higienizar", "limpeza"), ("limpeza", "lavar")]).unwrap();
        let once = merge_groups(keyed(&[&["higienizar"], &["lavar"]]), &synonyms, stem);
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn links_are_transitive_within_a_pass() {
        let synonyms = SynonymTable::from_pairs([("substituir", "trocar")]).unwrap();
        // substituir ~ trocar by synonym, trocar ~ trocer by stem
        let merged = merge_groups(keyed(&[&["substituir"], &["trocar"], &["trocer"]]), &synonyms, stem);
        assert_eq!(merged.len(), 1);
        assert!(merged.contains_key("substituir"));
    }
}
