use taskcanon_text::normalize;

/// Whole-word include/exclude filter over raw descriptions.
///
/// Words are compared after normalization, so case and accents do not
/// matter. An empty include list accepts everything not excluded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeywordFilter {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl KeywordFilter {
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Self {
        let clean = |words: &[S]| {
            words
                .iter()
                .map(|w| normalize(w.as_ref()))
                .filter(|w| !w.is_empty())
                .collect()
        };
        Self {
            include: clean(include),
            exclude: clean(exclude),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn accepts(&self, description: &str) -> bool {
        let padded = format!(" {} ", normalize(description));
        let has = |word: &String| padded.contains(&format!(" {word} "));
        (self.include.is_empty() || self.include.iter().any(has)) && !self.exclude.iter().any(has)
    }
}
