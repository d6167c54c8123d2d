//! Human audit table of the final groups.

use std::fmt::Write as _;
use std::path::Path;

use crate::builder::DictionaryDraft;
use crate::corpus::Corpus;
use crate::DictionaryError;

pub const AUDIT_HEADER: &str = "group;id;description;max_distance";

/// One row per (group member, task id), groups numbered from 1. The last
/// column is the distance threshold the group was built with.
pub fn audit_table(draft: &DictionaryDraft, corpus: &Corpus) -> String {
    let mut out = String::from(AUDIT_HEADER);
    out.push('\n');
    for group in &draft.groups {
        for member in &group.members {
            for raw in draft.raw_phrases(member) {
                for id in corpus.ids(raw) {
                    let _ = writeln!(
                        out,
                        "{};{};{};{}",
                        group.id,
                        escape_field(id),
                        escape_field(raw),
                        group.threshold
                    );
                }
            }
        }
    }
    out
}

pub fn write_audit(path: impl AsRef<Path>, draft: &DictionaryDraft, corpus: &Corpus) -> Result<(), DictionaryError> {
    let path = path.as_ref();
    std::fs::write(path, audit_table(draft, corpus)).map_err(|source| DictionaryError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn escape_field(field: &str) -> String {
    if field.contains([';', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
