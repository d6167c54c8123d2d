use crate::lexicon::VerbLexicon;

/// Canonical label of a group: recognized verbs first, then the shortest,
/// then the lexicographically smallest member. `None` for an empty slice.
pub fn canonical_label<'a, S: AsRef<str>>(members: &'a [S], lexicon: &VerbLexicon) -> Option<&'a str> {
    members
        .iter()
        .map(AsRef::as_ref)
        .min_by_key(|m| (!lexicon.recognizes(m), m.chars().count(), *m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_recognized_then_shortest_then_lexicographic() {
        let lexicon = VerbLexicon::from_words(["trocar", "limpar"]);
        assert_eq!(canonical_label(&["troca", "trocar", "troc"], &lexicon), Some("trocar"));
        assert_eq!(canonical_label(&["lavagem", "lava", "lavx"], &lexicon), Some("lava"));
        assert_eq!(canonical_label(&["limpar", "trocar"], &lexicon), Some("limpar"));
        assert_eq!(
            canonical_label(&["trocar filtro", "troca filtro", "trocar filtros"], &lexicon),
            Some("trocar filtro")
        );
        assert_eq!(canonical_label::<&str>(&[], &lexicon), None);
    }
}
