//! Suffix-stripping stemmer for Portuguese action labels.

/// Inflectional suffixes removed by [`stem`], longest match wins.
pub const STEM_SUFFIXES: &[&str] = &["ção", "cao", "são", "sao", "ar", "er", "ir", "r"];

/// Strip the longest known suffix from the end of `label`.
///
/// A suffix is only removed when something remains, so `"ar"` stems to
/// itself. Multi-word labels are stemmed at their last character
/// (`"aperto de"` is left alone, `"limpar"` becomes `"limp"`).
pub fn stem(label: &str) -> String {
    let trimmed = label.trim();
    let best = STEM_SUFFIXES
        .iter()
        .filter(|suffix| trimmed.len() > suffix.len() && trimmed.ends_with(*suffix))
        .max_by_key(|suffix| suffix.chars().count());

    match best {
        Some(suffix) => trimmed[..trimmed.len() - suffix.len()].to_string(),
        None => trimmed.to_string(),
    }
}
