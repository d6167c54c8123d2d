//! The phrase → canonical label table.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use taskcanon_text::SynonymTable;

use crate::DictionaryError;

/// Observed phrase → canonical label.
///
/// Keys are the trimmed phrase upper-cased, so external tools can match
/// exactly. The caller owns the value; a run builds a fresh one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalDictionary {
    entries: BTreeMap<String, String>,
}

pub fn dictionary_key(phrase: &str) -> String {
    phrase.trim().to_uppercase()
}

/// Rewrite whole-word synonyms of `phrase` to their canonical form.
pub fn apply_synonyms(phrase: &str, synonyms: &SynonymTable) -> String {
    synonyms.apply(phrase)
}

impl CanonicalDictionary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `phrase` to `label`, replacing any previous label.
    pub fn insert(&mut self, phrase: &str, label: impl Into<String>) -> Option<String> {
        self.entries.insert(dictionary_key(phrase), label.into())
    }

    /// Map `phrase` to `label` unless it is already mapped.
    pub fn insert_new(&mut self, phrase: &str, label: impl Into<String>) -> bool {
        let key = dictionary_key(phrase);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, label.into());
        true
    }

    pub fn lookup(&self, phrase: &str) -> Option<&str> {
        self.entries.get(&dictionary_key(phrase)).map(String::as_str)
    }

    /// Label for a description: exact match first, then after synonym
    /// rewriting, else the rewritten text itself.
    pub fn resolve(&self, description: &str, synonyms: &SynonymTable) -> String {
        let trimmed = description.trim();
        if trimmed.is_empty() {
            return String::new();
        }
        if let Some(label) = self.lookup(trimmed) {
            return label.to_string();
        }
        let rewritten = apply_synonyms(trimmed, synonyms);
        match self.lookup(&rewritten) {
            Some(label) => label.to_string(),
            None => rewritten,
        }
    }

    /// Make every label that is also a key map to itself. Returns the number
    /// of entries changed.
    pub fn enforce_fixed_points(&mut self) -> usize {
        let labels: Vec<String> = {
            let mut v: Vec<String> = self.entries.values().cloned().collect();
            v.sort();
            v.dedup();
            v
        };
        let mut changed = 0;
        for label in labels {
            if let Some(current) = self.entries.get_mut(&dictionary_key(&label)) {
                if *current != label {
                    tracing::debug!(label = %label, was = %current, "label pinned to itself");
                    *current = label;
                    changed += 1;
                }
            }
        }
        changed
    }

    /// Labels that are keys but do not map to themselves.
    pub fn fixed_point_violations(&self) -> Vec<&str> {
        self.entries
            .values()
            .filter(|label| {
                self.entries
                    .get(&dictionary_key(label))
                    .is_some_and(|v| v != *label)
            })
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Distinct labels.
    pub fn label_count(&self) -> usize {
        let mut labels: Vec<&String> = self.entries.values().collect();
        labels.sort();
        labels.dedup();
        labels.len()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    pub fn to_json_string(&self) -> Result<String, DictionaryError> {
        Ok(serde_json::to_string_pretty(&self.entries)?)
    }

    /// Parse a flat JSON object. Keys are re-keyed upper-case, so hand-edited
    /// files work too.
    pub fn from_json_str(json: &str) -> Result<Self, DictionaryError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)?;
        let mut dictionary = Self::new();
        for (phrase, label) in raw {
            dictionary.insert(&phrase, label);
        }
        Ok(dictionary)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), DictionaryError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_string()?).map_err(|source| DictionaryError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DictionaryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }
}

/// `(label, count)` over `descriptions`, most frequent first, ties by label.
pub fn task_counts<'a, I>(
    descriptions: I,
    dictionary: &CanonicalDictionary,
    synonyms: &SynonymTable,
) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for description in descriptions {
        let label = dictionary.resolve(description, synonyms);
        if !label.is_empty() {
            *counts.entry(label).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}
