//! Property-based tests for the text primitives
//!
//! 1. Normalization is idempotent and lands in `[a-z ]`
//! 2. Edit distance is a symmetric metric with the empty-string boundary
//! 3. The bounded check agrees with the full distance
//! 4. Stems never disappear

use proptest::prelude::*;
use taskcanon_text::*;

// ============================================================================
// Strategies
// ============================================================================

/// Phrases shaped like real maintenance descriptions.
fn phrase_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-zÀ-ÿ ,./-]{0,30}",
        "(TROCAR|Substituir|aperto|LIMPEZA|revisão) (de |do |da )?[a-zçãé]{2,10}",
    ]
}

fn word_strategy() -> impl Strategy<Value = String> {
    "[a-z]{0,12}"
}

// ============================================================================
// Normalizer
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn normalize_is_idempotent(s in any::<String>()) {
        let once = normalize(&s);
        prop_assert_eq!(normalize(&once), once);
    }

    #[test]
    fn normalize_output_alphabet(s in phrase_strategy()) {
        let out = normalize(&s);
        prop_assert!(out.chars().all(|c| c.is_ascii_lowercase() || c == ' '));
        prop_assert!(!out.starts_with(' ') && !out.ends_with(' '));
        prop_assert!(!out.contains("  "));
    }

    #[test]
    fn action_is_a_prefix_of_the_normalized_phrase(s in phrase_strategy()) {
        let rules = ActionRules::default();
        let action = extract_action(&s, &rules);
        prop_assert!(normalize(&s).starts_with(&action));
    }
}

// ============================================================================
// Edit distance
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn distance_is_symmetric(a in phrase_strategy(), b in phrase_strategy()) {
        prop_assert_eq!(edit_distance(&a, &b), edit_distance(&b, &a));
    }

    #[test]
    fn distance_to_self_is_zero(a in any::<String>()) {
        prop_assert_eq!(edit_distance(&a, &a), 0);
    }

    #[test]
    fn empty_boundary_is_length(a in word_strategy()) {
        prop_assert_eq!(edit_distance("", &a), a.chars().count());
        prop_assert_eq!(edit_distance(&a, ""), a.chars().count());
    }

    #[test]
    fn triangle_inequality(a in word_strategy(), b in word_strategy(), c in word_strategy()) {
        prop_assert!(edit_distance(&a, &c) <= edit_distance(&a, &b) + edit_distance(&b, &c));
    }

    #[test]
    fn bounded_check_matches(a in word_strategy(), b in word_strategy(), max in 0usize..8) {
        prop_assert_eq!(within_distance(&a, &b, max), edit_distance(&a, &b) <= max);
    }

    #[test]
    fn similarity_in_unit_interval(a in phrase_strategy(), b in phrase_strategy()) {
        let s = similarity(&a, &b);
        prop_assert!((0.0..=1.0).contains(&s));
    }
}

// ============================================================================
// Stemming
// ============================================================================

proptest! {
    #[test]
    fn stem_is_a_non_empty_prefix(w in "[a-z]{1,12}") {
        let s = stem(&w);
        prop_assert!(!s.is_empty());
        prop_assert!(w.starts_with(&s));
    }
}
