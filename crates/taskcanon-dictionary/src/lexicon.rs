//! Curated list of maintenance verbs.

use std::collections::BTreeSet;
use std::path::Path;

use taskcanon_text::normalize;

use crate::DictionaryError;

const BUILTIN_VERBS: &[&str] = &[
    "abastecer", "ajustar", "alinhar", "apertar", "aplicar", "avaliar", "calibrar", "colar",
    "colocar", "completar", "confeccionar", "conferir", "consertar", "corrigir", "desempenar",
    "desengrenar", "desmontar", "desobstruir", "drenar", "engraxar", "executar", "fazer", "fixar",
    "higienizar", "inspecionar", "instalar", "lavar", "limpar", "lubrificar", "medir", "montar",
    "pintar", "preparar", "realizar", "reapertar", "rebitar", "recarregar", "recolher",
    "recondicionar", "reconectar", "recuperar", "reforcar", "reformar", "regular", "remover",
    "reparar", "repor", "retirar", "revisar", "sanar", "soldar", "substituir", "tensionar",
    "testar", "tirar", "trocar", "verificar", "vulcanizar",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbLexicon {
    verbs: BTreeSet<String>,
}

impl Default for VerbLexicon {
    fn default() -> Self {
        Self::builtin()
    }
}

impl VerbLexicon {
    pub fn builtin() -> Self {
        Self::from_words(BUILTIN_VERBS.iter().copied())
    }

    pub fn from_words<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            verbs: words
                .into_iter()
                .map(|w| normalize(w.as_ref()))
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    /// One verb per line; blank lines and `#` comments are skipped.
    pub fn from_lines(text: &str) -> Self {
        Self::from_words(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#')),
        )
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DictionaryError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| DictionaryError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_lines(&text))
    }

    pub fn contains(&self, word: &str) -> bool {
        self.verbs.contains(&normalize(word))
    }

    /// A phrase is recognized when it is a verb or starts with one.
    pub fn recognizes(&self, phrase: &str) -> bool {
        let phrase = normalize(phrase);
        self.verbs.contains(&phrase)
            || phrase
                .split(' ')
                .next()
                .is_some_and(|first| self.verbs.contains(first))
    }

    pub fn len(&self) -> usize {
        self.verbs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.verbs.is_empty()
    }
}
