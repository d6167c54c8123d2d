//! Property-based tests for the grouping stages
//!
//! 1. CenterFixed groups keep every member within the threshold of the center
//! 2. Grouping partitions its input
//! 3. Grouping ignores input order
//! 4. Merge labels are the smallest member and members are never lost
//! 5. Refinement never grows a group past the bound it was split for

use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;
use taskcanon_cluster::*;
use taskcanon_text::{edit_distance, stem, SynonymTable};

// ============================================================================
// Strategies
// ============================================================================

fn token_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "(tro|sub|lim|ape)[a-z]{0,6}",
        "[a-z]{1,8}",
    ]
}

fn tokens_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(token_strategy(), 0..40)
}

fn policy_strategy() -> impl Strategy<Value = GroupingPolicy> {
    prop_oneof![Just(GroupingPolicy::CenterFixed), Just(GroupingPolicy::Windowed)]
}

fn member_set(groups: &[Group]) -> BTreeSet<String> {
    groups.iter().flat_map(|g| g.members().iter().cloned()).collect()
}

// ============================================================================
// Lexical grouping
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    #[test]
    fn center_fixed_membership_is_bounded(items in tokens_strategy(), threshold in 0usize..5) {
        for group in group_by_distance(&items, threshold, GroupingPolicy::CenterFixed) {
            for member in group.members() {
                prop_assert!(edit_distance(member, group.center()) <= threshold);
            }
            prop_assert!(group.satisfies_admission());
        }
    }

    #[test]
    fn grouping_partitions_input(items in tokens_strategy(), threshold in 0usize..5, policy in policy_strategy()) {
        let groups = group_by_distance(&items, threshold, policy);
        let expected: BTreeSet<String> = items.iter().cloned().collect();
        let total: usize = groups.iter().map(Group::len).sum();
        prop_assert_eq!(total, expected.len());
        prop_assert_eq!(member_set(&groups), expected);
    }

    #[test]
    fn grouping_ignores_input_order(items in tokens_strategy(), threshold in 0usize..5, policy in policy_strategy()) {
        let mut reversed = items.clone();
        reversed.reverse();
        prop_assert_eq!(
            group_by_distance(&items, threshold, policy),
            group_by_distance(&reversed, threshold, policy)
        );
    }

    #[test]
    fn pruned_groups_share_first_letter(items in tokens_strategy(), threshold in 0usize..5) {
        for group in group_by_distance(&items, threshold, GroupingPolicy::CenterFixed) {
            let lead = group.center().chars().next();
            prop_assert!(group.members().iter().all(|m| m.chars().next() == lead));
        }
    }
}

// ============================================================================
// Merge
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn merge_keeps_members_and_labels_by_minimum(items in tokens_strategy(), threshold in 0usize..3) {
        let groups = group_by_distance(&items, threshold, GroupingPolicy::CenterFixed);
        let before = member_set(&groups);
        let synonyms = SynonymTable::from_pairs([("substituir", "trocar")]).unwrap();
        let merged = merge_groups(keyed_by_center(groups), &synonyms, stem);

        let after: BTreeSet<String> = merged.values().flat_map(|g| g.members().iter().cloned()).collect();
        prop_assert_eq!(before, after);
        for (label, group) in &merged {
            prop_assert_eq!(Some(label), group.members().iter().min());
        }
        let stems: Vec<String> = merged.keys().map(|l| stem(l)).collect();
        let distinct: BTreeSet<&String> = stems.iter().collect();
        prop_assert_eq!(stems.len(), distinct.len());
    }
}

// ============================================================================
// Refinement
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn refinement_preserves_or_reports_every_phrase(
        objects in prop::collection::vec("[a-f]{1,4}", 1..30),
        max_size in 1usize..8,
    ) {
        let phrases: BTreeSet<String> = objects.iter().map(|o| format!("trocar {o}")).collect();
        let group = Group::from_members(
            phrases.iter().cloned().collect(),
            Admission::MaxDistance(4),
            Stage::Object,
            GroupingPolicy::CenterFixed,
            GroupKey::Object,
        ).unwrap();
        let input = BTreeMap::from([("trocar".to_string(), vec![group])]);
        let out = refine_oversized(input, &RefineOptions { max_size, threshold: 1, keep_singletons: false });

        let mut seen: BTreeSet<String> = out.ungrouped.iter().cloned().collect();
        for groups in out.groups.values() {
            for g in groups {
                if g.stage() == Stage::Refined {
                    prop_assert!(g.len() >= 2);
                    prop_assert!(g.satisfies_admission());
                }
                seen.extend(g.members().iter().cloned());
            }
        }
        prop_assert_eq!(seen, phrases);
    }
}
