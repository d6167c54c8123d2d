//! Delimited task table → [`Corpus`].
//!
//! First row is the header. Fields may be quoted with `"`; a quoted field can
//! hold the separator, newlines and `""` escapes.

use std::path::Path;

use serde::{Deserialize, Serialize};
use taskcanon_dictionary::{Corpus, RawPhrase};
use thiserror::Error;

pub const DEFAULT_SEPARATOR: char = ';';
pub const DEFAULT_DESCRIPTION_COLUMN: &str = "DescricaoManutencao";
pub const DEFAULT_ID_COLUMN: &str = "idtarefa";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("cannot read dataset `{path}`: {source}")]
    Missing {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset `{0}` has no usable rows")]
    Empty(String),
    #[error("dataset `{path}` has no `{column}` column")]
    MissingColumn { path: String, column: String },
    #[error("dataset `{path}`: unterminated quoted field starting on line {line}")]
    Unterminated { path: String, line: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetOptions {
    pub separator: char,
    pub description_column: String,
    pub id_column: String,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            separator: DEFAULT_SEPARATOR,
            description_column: DEFAULT_DESCRIPTION_COLUMN.to_string(),
            id_column: DEFAULT_ID_COLUMN.to_string(),
        }
    }
}

pub fn read_dataset(path: impl AsRef<Path>, opts: &DatasetOptions) -> Result<Corpus, DatasetError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| DatasetError::Missing {
        path: path.display().to_string(),
        source,
    })?;
    parse_dataset(&text, opts, &path.display().to_string())
}

/// Parse table text; `source` names it in errors.
pub fn parse_dataset(text: &str, opts: &DatasetOptions, source: &str) -> Result<Corpus, DatasetError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rows = split_records(text, opts.separator, source)?.into_iter();

    let header = rows.next().ok_or_else(|| DatasetError::Empty(source.to_string()))?;
    let column = |name: &str| {
        header
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| DatasetError::MissingColumn {
                path: source.to_string(),
                column: name.to_string(),
            })
    };
    let description_at = column(&opts.description_column)?;
    let id_at = column(&opts.id_column)?;

    let mut corpus = Corpus::new();
    let mut blank = 0usize;
    for row in rows {
        let description = row.get(description_at).map(String::as_str).unwrap_or("");
        let id = row.get(id_at).map(String::as_str).unwrap_or("");
        if description.trim().is_empty() {
            blank += 1;
            continue;
        }
        corpus.push(RawPhrase::new(description, id));
    }

    if corpus.is_empty() {
        return Err(DatasetError::Empty(source.to_string()));
    }
    tracing::info!(
        source,
        records = corpus.record_count(),
        phrases = corpus.len(),
        blank,
        "dataset loaded"
    );
    Ok(corpus)
}

fn split_records(text: &str, separator: char, source: &str) -> Result<Vec<Vec<String>>, DatasetError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quote_line = 0;
    let mut line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
                quote_line = line;
            }
            c if c == separator => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                line += 1;
                record.push(std::mem::take(&mut field));
                if record.iter().any(|f| !f.trim().is_empty()) {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(DatasetError::Unterminated {
            path: source.to_string(),
            line: quote_line,
        });
    }
    record.push(field);
    if record.iter().any(|f| !f.trim().is_empty()) {
        records.push(record);
    }
    Ok(records)
}
