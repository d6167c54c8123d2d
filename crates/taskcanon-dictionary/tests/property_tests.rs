//! Property-based tests for the dictionary
//!
//! 1. Totality: every observed phrase is a key exactly once
//! 2. Fixed points: a label looked up as a key maps to itself
//! 3. The chosen label is always a member of its group

use proptest::prelude::*;
use taskcanon_cluster::{group_by_distance, GroupingPolicy};
use taskcanon_dictionary::*;

fn phrase_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "(trocar|troca|troc|limpar|limpeza|apertar|aperto de) [a-z]{1,6}",
        "[A-Za-z !?]{0,12}",
        "(TROCAR|Trocar) (OLEO|Óleo|filtro)",
    ]
}

fn corpus_strategy() -> impl Strategy<Value = Corpus> {
    prop::collection::vec(phrase_strategy(), 0..40).prop_map(|phrases| {
        Corpus::from_records(
            phrases
                .into_iter()
                .enumerate()
                .map(|(i, p)| RawPhrase::new(p, i.to_string())),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn dictionary_is_total_and_labels_are_fixed_points(corpus in corpus_strategy(), threshold in 0usize..5) {
        let groups = group_by_distance(corpus.normalized(), threshold, GroupingPolicy::CenterFixed);
        let draft = DictionaryBuilder::default().build(&corpus, &groups);
        let dictionary = &draft.dictionary;

        for phrase in corpus.phrases() {
            prop_assert!(dictionary.lookup(phrase).is_some(), "missing {phrase:?}");
        }
        let keys: std::collections::BTreeSet<String> = corpus.phrases().map(dictionary_key).collect();
        prop_assert_eq!(dictionary.len(), keys.len());

        for (_, label) in dictionary.iter() {
            if let Some(again) = dictionary.lookup(label) {
                prop_assert_eq!(again, label);
            }
        }
    }

    #[test]
    fn label_is_a_member(members in prop::collection::vec("[a-z]{1,8}( [a-z]{1,5})?", 1..10)) {
        let lexicon = VerbLexicon::builtin();
        let label = canonical_label(&members, &lexicon).unwrap();
        prop_assert!(members.iter().any(|m| m == label));
    }
}
