//! Phrase normalization and action/object splitting.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// A second token shorter than this is glued onto the action token.
pub const DEFAULT_MIN_SECOND_TOKEN_LEN: usize = 3;

/// Prepositions/articles that bind to the preceding verb ("aperto de").
pub const DEFAULT_STOP_WORDS: &[&str] = &["de", "da", "do", "das", "dos", "a", "o", "na", "no"];

/// Normalize a raw phrase.
///
/// Lower-cases, transliterates accented characters to plain ASCII letters,
/// replaces every character that is not a letter with a space, collapses
/// whitespace and trims. The output alphabet is `[a-z ]`, which makes the
/// function idempotent.
pub fn normalize(phrase: &str) -> String {
    let mut folded = String::with_capacity(phrase.len());
    for c in phrase.to_lowercase().nfd() {
        if is_combining_mark(c) {
            continue;
        }
        match c {
            'a'..='z' => folded.push(c),
            'ß' => folded.push_str("ss"),
            'æ' => folded.push_str("ae"),
            'œ' => folded.push_str("oe"),
            'þ' => folded.push_str("th"),
            'ø' => folded.push('o'),
            'đ' | 'ð' => folded.push('d'),
            'ł' => folded.push('l'),
            'ı' => folded.push('i'),
            _ => folded.push(' '),
        }
    }

    let mut out = String::with_capacity(folded.len());
    for token in folded.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(token);
    }
    out
}

/// Rules for gluing a short second token onto the action token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRules {
    pub min_second_token_len: usize,
    pub stop_words: BTreeSet<String>,
}

impl Default for ActionRules {
    fn default() -> Self {
        Self {
            min_second_token_len: DEFAULT_MIN_SECOND_TOKEN_LEN,
            stop_words: DEFAULT_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl ActionRules {
    pub fn new<I, S>(min_second_token_len: usize, stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            min_second_token_len,
            stop_words: stop_words
                .into_iter()
                .map(|w| normalize(w.as_ref()))
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    fn binds(&self, second: &str) -> bool {
        second.chars().count() < self.min_second_token_len || self.stop_words.contains(second)
    }
}

/// The action unit of a phrase.
///
/// Normally the first token. When the second token is short or a stop word,
/// the action is `"<first> <second>"` (e.g. `"aperto de"`).
pub fn extract_action(phrase: &str, rules: &ActionRules) -> String {
    let normalized = normalize(phrase);
    let mut tokens = normalized.split(' ').filter(|t| !t.is_empty());
    let Some(first) = tokens.next() else {
        return String::new();
    };
    match tokens.next() {
        Some(second) if rules.binds(second) => format!("{first} {second}"),
        _ => first.to_string(),
    }
}

/// Everything after the first token; empty for one-token phrases.
pub fn extract_object(phrase: &str) -> String {
    let normalized = normalize(phrase);
    match normalized.split_once(' ') {
        Some((_, rest)) => rest.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_case_and_diacritics() {
        assert_eq!(normalize("SUBSTITUIÇÃO de Mangueira"), "substituicao de mangueira");
        assert_eq!(normalize("  Manutenção   no  Freio "), "manutencao no freio");
        assert_eq!(normalize("Revisão"), "revisao");
    }

    #[test]
    fn non_letters_become_separators() {
        assert_eq!(normalize("troca/limpeza 4º filtro"), "troca limpeza filtro");
        assert_eq!(normalize("1234 -- ;"), "");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn is_idempotent_on_samples() {
        for s in ["Aperto de PARAFUSO!!", "ÇÃO ção", "Straße", "  x  y  "] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn action_glues_short_or_stop_second_token() {
        let rules = ActionRules::new(3, ["de"]);
        assert_eq!(extract_action("apertar parafuso", &rules), "apertar");
        assert_eq!(extract_action("aperto de parafuso", &rules), "aperto de");
        assert_eq!(extract_action("aprert de parafuso", &rules), "aprert de");
        assert_eq!(extract_action("troca do filtro", &rules), "troca do");
        assert_eq!(extract_action("trocar", &rules), "trocar");
        assert_eq!(extract_action("   ", &rules), "");
    }

    #[test]
    fn action_uses_stop_set_for_long_prepositions() {
        let rules = ActionRules::new(2, ["das"]);
        assert_eq!(extract_action("limpeza das rodas", &rules), "limpeza das");
        assert_eq!(extract_action("limpeza dos filtros", &rules), "limpeza");
    }

    #[test]
    fn object_is_everything_after_first_token() {
        assert_eq!(extract_object("SUBSTITUIR BARRA DE DIREÇÃO"), "barra de direcao");
        assert_eq!(extract_object("trocar"), "");
    }
}
