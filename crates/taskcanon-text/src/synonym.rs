//! Flat synonym table (surface form → canonical form).

use std::collections::BTreeMap;
use std::path::Path;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::normalize::normalize;

#[derive(Debug, Error)]
pub enum SynonymError {
    #[error("failed to read synonym table `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("synonym table is not a flat JSON object of strings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("synonym pattern too large: {0}")]
    Pattern(#[from] regex::Error),
}

/// Read-only surface → canonical mapping.
///
/// Keys and values are stored normalized; entries whose key or value
/// normalizes to the empty string, and identity entries, are dropped.
#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    entries: BTreeMap<String, String>,
    pattern: Option<Regex>,
}

impl SynonymTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, SynonymError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut entries = BTreeMap::new();
        for (k, v) in pairs {
            let key = normalize(k.as_ref());
            let value = normalize(v.as_ref());
            if key.is_empty() || value.is_empty() || key == value {
                continue;
            }
            entries.insert(key, value);
        }
        let pattern = build_pattern(&entries)?;
        Ok(Self { entries, pattern })
    }

    pub fn from_json_str(json: &str) -> Result<Self, SynonymError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)?;
        Self::from_pairs(raw)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SynonymError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| SynonymError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Canonical form for `surface`, if the table has one.
    pub fn get(&self, surface: &str) -> Option<&str> {
        self.entries.get(&normalize(surface)).map(String::as_str)
    }

    /// True when one label is listed as a synonym of the other (one hop).
    pub fn links(&self, a: &str, b: &str) -> bool {
        let a = normalize(a);
        let b = normalize(b);
        self.entries.get(&a) == Some(&b) || self.entries.get(&b) == Some(&a)
    }

    /// Normalize `phrase`, then rewrite every whole-word occurrence of a
    /// surface form to its canonical form. Longer surface forms win.
    pub fn apply(&self, phrase: &str) -> String {
        let normalized = normalize(phrase);
        let Some(pattern) = &self.pattern else {
            return normalized;
        };
        pattern
            .replace_all(&normalized, |caps: &Captures<'_>| {
                let hit = &caps[0];
                self.entries
                    .get(hit)
                    .cloned()
                    .unwrap_or_else(|| hit.to_string())
            })
            .into_owned()
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
}

fn build_pattern(entries: &BTreeMap<String, String>) -> Result<Option<Regex>, SynonymError> {
    if entries.is_empty() {
        return Ok(None);
    }
    let mut keys: Vec<&String> = entries.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    let alternation = keys
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");
    Ok(Some(Regex::new(&format!(r"\b(?:{alternation})\b"))?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SynonymTable {
        SynonymTable::from_json_str(
            r#"{"SUBSTITUIR": "trocar", "Higienizar": "limpar", "dar manutenção": "revisar"}"#,
        )
        .unwrap()
    }

    #[test]
    fn keys_and_values_are_normalized() {
        let t = table();
        assert_eq!(t.len(), 3);
        assert_eq!(t.get("substituir"), Some("trocar"));
        assert_eq!(t.get("HIGIENIZAR"), Some("limpar"));
        assert_eq!(t.get("dar manutencao"), Some("revisar"));
        assert_eq!(t.get("trocar"), None);
    }

    #[test]
    fn links_in_either_direction() {
        let t = table();
        assert!(t.links("trocar", "substituir"));
        assert!(t.links("substituir", "trocar"));
        assert!(!t.links("trocar", "limpar"));
    }

    #[test]
    fn apply_rewrites_whole_words_only() {
        let t = table();
        assert_eq!(t.apply("Substituir mangueira"), "trocar mangueira");
        assert_eq!(t.apply("substituirei mangueira"), "substituirei mangueira");
        assert_eq!(t.apply("Dar manutenção no motor"), "revisar no motor");
        assert_eq!(t.apply("higienizar e substituir"), "limpar e trocar");
    }

    #[test]
    fn empty_table_only_normalizes() {
        let t = SynonymTable::new();
        assert!(t.is_empty());
        assert_eq!(t.apply("  Trocar   ÓLEO "), "trocar oleo");
    }

    #[test]
    fn rejects_nested_json() {
        assert!(matches!(
            SynonymTable::from_json_str(r#"{"a": {"b": "c"}}"#),
            Err(SynonymError::Json(_))
        ));
    }

    #[test]
    fn drops_identity_and_empty_entries() {
        let t = SynonymTable::from_pairs([("trocar", "TROCAR"), ("--", "x"), ("a", "b")]).unwrap();
        assert_eq!(t.len(), 1);
    }
}
