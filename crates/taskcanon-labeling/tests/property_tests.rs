//! Property-based tests for mapping extraction
//!
//! 1. A serialized mapping is recovered from any surrounding prose
//! 2. The largest of several embedded mappings wins
//! 3. Text without braces never yields a mapping

use std::collections::BTreeMap;

use proptest::prelude::*;
use taskcanon_labeling::{extract_mapping, LabelingError};

// ============================================================================
// Strategies
// ============================================================================

fn mapping_strategy(min: usize) -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z]{1,8}( [a-z]{1,8})?", "[a-z]{1,8}", min..8)
}

fn prose_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9 .,:!\n]{0,40}"
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn mapping_survives_surrounding_prose(
        mapping in mapping_strategy(1),
        before in prose_strategy(),
        after in prose_strategy(),
    ) {
        let json = serde_json::to_string(&mapping).unwrap();
        let text = format!("{before}{json}{after}");
        prop_assert_eq!(extract_mapping(&text).unwrap(), mapping);
    }

    #[test]
    fn largest_mapping_wins(
        small in mapping_strategy(1),
        extra in mapping_strategy(1),
        prose in prose_strategy(),
    ) {
        let mut large = small.clone();
        for (k, v) in extra {
            large.insert(format!("{k} extra"), v);
        }
        let text = format!(
            "{}{prose}{}",
            serde_json::to_string(&small).unwrap(),
            serde_json::to_string(&large).unwrap()
        );
        prop_assert_eq!(extract_mapping(&text).unwrap(), large);
    }

    #[test]
    fn brace_free_text_has_no_mapping(text in prose_strategy()) {
        prop_assert!(matches!(extract_mapping(&text), Err(LabelingError::NoValidMapping)));
    }
}
