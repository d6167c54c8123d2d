//! Final groups → canonical dictionary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use taskcanon_cluster::Group;
use taskcanon_text::normalize;

use crate::corpus::Corpus;
use crate::dictionary::CanonicalDictionary;
use crate::label::canonical_label;
use crate::lexicon::VerbLexicon;

pub const DEFAULT_AMBIGUITY_DIAMETER: usize = 6;

/// A final group with its chosen label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledGroup {
    /// 1-based position in build order.
    pub id: usize,
    /// Verb bucket the group came from, or the label's first word.
    pub context: String,
    pub label: String,
    pub members: Vec<String>,
    /// Admission threshold the group was built with.
    pub threshold: String,
    pub max_distance: usize,
    pub diameter: usize,
    pub ambiguous: bool,
}

/// Output of [`DictionaryBuilder::build`]: the automatic dictionary plus the
/// groups behind it, kept for escalation and audit.
#[derive(Debug, Clone, Default)]
pub struct DictionaryDraft {
    pub dictionary: CanonicalDictionary,
    pub groups: Vec<LabeledGroup>,
    /// Normalized form → raw descriptions producing it.
    pub raw_forms: BTreeMap<String, Vec<String>>,
}

impl DictionaryDraft {
    pub fn ambiguous(&self) -> impl Iterator<Item = &LabeledGroup> {
        self.groups.iter().filter(|g| g.ambiguous)
    }

    /// Raw descriptions behind a group member.
    pub fn raw_phrases(&self, member: &str) -> &[String] {
        self.raw_forms.get(member).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct DictionaryBuilder {
    lexicon: VerbLexicon,
    ambiguity_diameter: usize,
}

impl Default for DictionaryBuilder {
    fn default() -> Self {
        Self::new(VerbLexicon::builtin())
    }
}

impl DictionaryBuilder {
    pub fn new(lexicon: VerbLexicon) -> Self {
        Self {
            lexicon,
            ambiguity_diameter: DEFAULT_AMBIGUITY_DIAMETER,
        }
    }

    /// Groups of two or more whose widest pair is farther apart than this
    /// are escalated.
    pub fn with_ambiguity_diameter(mut self, diameter: usize) -> Self {
        self.ambiguity_diameter = diameter;
        self
    }

    pub fn lexicon(&self) -> &VerbLexicon {
        &self.lexicon
    }

    /// Build from plain groups; contexts come from each label's first word.
    pub fn build(&self, corpus: &Corpus, groups: &[Group]) -> DictionaryDraft {
        self.build_from(corpus, groups.iter().map(|g| (None, g)))
    }

    /// Build from groups bucketed by verb.
    pub fn build_keyed(&self, corpus: &Corpus, groups: &BTreeMap<String, Vec<Group>>) -> DictionaryDraft {
        self.build_from(
            corpus,
            groups
                .iter()
                .flat_map(|(verb, gs)| gs.iter().map(move |g| (Some(verb.as_str()), g))),
        )
    }

    fn build_from<'g, I>(&self, corpus: &Corpus, groups: I) -> DictionaryDraft
    where
        I: IntoIterator<Item = (Option<&'g str>, &'g Group)>,
    {
        let raw_forms = corpus.by_normalized();
        let mut draft = DictionaryDraft {
            raw_forms,
            ..DictionaryDraft::default()
        };

        for (context, group) in groups {
            let Some(label) = canonical_label(group.members(), &self.lexicon) else {
                continue;
            };
            let label = label.to_string();
            let diameter = group.diameter();
            let recognized = group.members().iter().any(|m| self.lexicon.recognizes(m));
            let ambiguous = group.len() >= 2 && (!recognized || diameter > self.ambiguity_diameter);

            for member in group.members() {
                for raw in draft.raw_forms.get(member).into_iter().flatten() {
                    draft.dictionary.insert_new(raw, label.clone());
                }
            }

            let context = context
                .map(str::to_string)
                .unwrap_or_else(|| label.split(' ').next().unwrap_or(&label).to_string());
            draft.groups.push(LabeledGroup {
                id: draft.groups.len() + 1,
                context,
                label,
                members: group.members().to_vec(),
                threshold: group.admission().to_string(),
                max_distance: group.max_distance_to_center(),
                diameter,
                ambiguous,
            });
        }

        // Forms no group claimed label themselves; blank forms keep the raw text.
        for phrase in corpus.phrases() {
            let form = normalize(phrase);
            let label = if form.is_empty() { phrase.trim().to_string() } else { form };
            draft.dictionary.insert_new(phrase, label);
        }

        let pinned = draft.dictionary.enforce_fixed_points();
        tracing::info!(
            groups = draft.groups.len(),
            ambiguous = draft.ambiguous().count(),
            entries = draft.dictionary.len(),
            labels = draft.dictionary.label_count(),
            pinned,
            "dictionary built"
        );
        draft
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::RawPhrase;
    use taskcanon_cluster::{Admission, GroupKey, GroupingPolicy, Stage};

    fn group(members: &[&str]) -> Group {
        Group::from_members(
            members.iter().map(|m| m.to_string()).collect(),
            Admission::MaxDistance(4),
            Stage::Object,
            GroupingPolicy::CenterFixed,
            GroupKey::Object,
        )
        .unwrap()
    }

    fn corpus(phrases: &[&str]) -> Corpus {
        Corpus::from_records(
            phrases
                .iter()
                .enumerate()
                .map(|(i, p)| RawPhrase::new(*p, i.to_string())),
        )
    }

    #[test]
    fn every_phrase_gets_its_group_label() {
        let corpus = corpus(&["TROCAR FILTRO", "Troca filtro", "trocar filtros", "LIMPAR TANQUE", "!!!"]);
        let groups = vec![group(&["troca filtro", "trocar filtro", "trocar filtros"])];
        let draft = DictionaryBuilder::default().build(&corpus, &groups);

        assert_eq!(draft.dictionary.len(), 5);
        assert_eq!(draft.dictionary.lookup("troca filtro"), Some("trocar filtro"));
        assert_eq!(draft.dictionary.lookup("TROCAR FILTROS"), Some("trocar filtro"));
        assert_eq!(draft.dictionary.lookup("limpar tanque"), Some("limpar tanque"));
        assert_eq!(draft.dictionary.lookup("!!!"), Some("!!!"));
        assert_eq!(draft.groups[0].context, "trocar");
        assert_eq!(draft.groups[0].threshold, "4");
        assert!(!draft.groups[0].ambiguous);
        assert!(draft.dictionary.fixed_point_violations().is_empty());
    }

    #[test]
    fn unrecognized_or_wide_groups_are_ambiguous() {
        let corpus = corpus(&["xpto abc", "xpto abd", "trocar filtro", "trocar bomba de agua"]);
        let groups = BTreeMap::from([
            ("xpto".to_string(), vec![group(&["xpto abc", "xpto abd"])]),
            ("trocar".to_string(), vec![group(&["trocar bomba de agua", "trocar filtro"])]),
        ]);
        let draft = DictionaryBuilder::default().build_keyed(&corpus, &groups);

        let flags: Vec<(&str, bool)> = draft
            .groups
            .iter()
            .map(|g| (g.context.as_str(), g.ambiguous))
            .collect();
        assert_eq!(flags, [("trocar", true), ("xpto", true)]);

        let relaxed = DictionaryBuilder::default()
            .with_ambiguity_diameter(50)
            .build_keyed(&corpus, &groups);
        assert_eq!(relaxed.ambiguous().count(), 1);
    }

    #[test]
    fn singleton_groups_are_never_ambiguous() {
        let corpus = corpus(&["xpto"]);
        let draft = DictionaryBuilder::default().build(&corpus, &[group(&["xpto"])]);
        assert_eq!(draft.ambiguous().count(), 0);
    }
}
