//! Observed phrases and the task ids they came from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use taskcanon_text::normalize;

/// One observed description and the record it came from.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RawPhrase {
    pub id: String,
    pub text: String,
}

impl RawPhrase {
    pub fn new(text: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Distinct trimmed descriptions, each with the ids of its records in input
/// order. Blank descriptions are dropped; repeated `(description, id)` pairs
/// are kept once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Corpus {
    phrases: BTreeMap<String, Vec<String>>,
    records: usize,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = RawPhrase>,
    {
        let mut corpus = Self::new();
        for record in records {
            corpus.push(record);
        }
        corpus
    }

    /// Add a record; returns false when it was blank or already present.
    pub fn push(&mut self, record: RawPhrase) -> bool {
        let text = record.text.trim();
        if text.is_empty() {
            return false;
        }
        let id = record.id.trim().to_string();
        let ids = self.phrases.entry(text.to_string()).or_default();
        if ids.contains(&id) {
            return false;
        }
        ids.push(id);
        self.records += 1;
        true
    }

    /// Distinct descriptions in sorted order.
    pub fn phrases(&self) -> impl Iterator<Item = &str> {
        self.phrases.keys().map(String::as_str)
    }

    pub fn ids(&self, phrase: &str) -> &[String] {
        self.phrases
            .get(phrase.trim())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every kept record, grouped by description.
    pub fn records(&self) -> impl Iterator<Item = RawPhrase> + '_ {
        self.phrases
            .iter()
            .flat_map(|(text, ids)| ids.iter().map(move |id| RawPhrase::new(text.clone(), id.clone())))
    }

    /// Distinct normalized forms, without the empty one.
    pub fn normalized(&self) -> Vec<String> {
        let mut forms: Vec<String> = self
            .phrases
            .keys()
            .map(|p| normalize(p))
            .filter(|n| !n.is_empty())
            .collect();
        forms.sort();
        forms.dedup();
        forms
    }

    /// Normalized form → the raw descriptions that produce it.
    pub fn by_normalized(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for phrase in self.phrases.keys() {
            let form = normalize(phrase);
            if !form.is_empty() {
                out.entry(form).or_default().push(phrase.clone());
            }
        }
        out
    }

    /// Keep only descriptions accepted by `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.phrases.retain(|text, _| keep(text));
        self.records = self.phrases.values().map(Vec::len).sum();
    }

    pub fn len(&self) -> usize {
        self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phrases.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.records
    }
}
