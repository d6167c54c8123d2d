//! Taskcanon Dictionary: from final groups to the universal phrase dictionary
//!
//! ```text
//!  Corpus ──┐
//!           ├──► DictionaryBuilder ──► DictionaryDraft ──► escalate_groups
//!  Groups ──┘        (label rule,          │                 (ambiguous only)
//!                     totality)            ├──► audit_table
//!                                          └──► CanonicalDictionary ──► save_json
//! ```
//!
//! Labels are chosen by a fixed rule (recognized verb, then shortest, then
//! lexicographic). Every observed phrase gets exactly one entry, and every
//! label that is itself a key maps to itself.

pub mod audit;
pub mod builder;
pub mod corpus;
pub mod dictionary;
pub mod escalate;
pub mod label;
pub mod lexicon;

pub use audit::{audit_table, write_audit, AUDIT_HEADER};
pub use builder::{DictionaryBuilder, DictionaryDraft, LabeledGroup, DEFAULT_AMBIGUITY_DIAMETER};
pub use corpus::{Corpus, RawPhrase};
pub use dictionary::{apply_synonyms, dictionary_key, task_counts, CanonicalDictionary};
pub use escalate::{escalate_groups, EscalationIncident, EscalationReport};
pub use label::canonical_label;
pub use lexicon::VerbLexicon;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DictionaryError {
    #[error("failed to access `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("dictionary is not a flat JSON object of strings: {0}")]
    Json(#[from] serde_json::Error),
}
