//! Escalation prompt.

use std::collections::BTreeMap;
use std::fmt::Write;

/// Tokens without meaning that must map to themselves.
pub const DEFAULT_RESERVED_TOKENS: &[&str] = &["--", "xxxx", "pt"];

/// Key each group by `<verb>_<n>`, numbering groups of the same verb from 1.
pub fn context_keys<'a, I>(groups: I) -> BTreeMap<String, Vec<String>>
where
    I: IntoIterator<Item = (&'a str, Vec<String>)>,
{
    let mut counters: BTreeMap<&str, usize> = BTreeMap::new();
    let mut out = BTreeMap::new();
    for (verb, members) in groups {
        let n = counters.entry(verb).or_insert(0);
        *n += 1;
        out.insert(format!("{verb}_{n}"), members);
    }
    out
}

/// Render the labeling request for `groups` (context key → phrases).
pub fn render_prompt(groups: &BTreeMap<String, Vec<String>>, reserved: &[&str]) -> String {
    let reserved = reserved
        .iter()
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let mut listing = String::new();
    for (key, members) in groups {
        let quoted: Vec<String> = members
            .iter()
            .map(|m| serde_json::to_string(m).unwrap_or_else(|_| format!("\"{m}\"")))
            .collect();
        let _ = writeln!(listing, "{key}: [{}]", quoted.join(", "));
    }

    format!(
        "Você é um sistema especializado em normalização de descrições de tarefas de manutenção.

Tarefa: gerar UM dicionário universal que mapeia cada frase abaixo para um valor universal.

Regras:
1. Responda somente com um objeto JSON {{\"frase\": \"valor universal\"}}, sem texto antes ou depois.
2. Unifique apenas frases que descrevem a mesma ação sobre o mesmo objeto.
3. Corrija erros de digitação e flexões usando somente termos que já aparecem nos grupos; não invente palavras.
4. Entre verbo e substantivo de mesmo sentido, prefira o verbo (ex.: \"troca\" -> \"trocar\").
5. Frases sem relação com as demais do grupo mantêm o próprio valor.
6. Termos sem significado claro ({reserved}) apontam para si mesmos.
7. Toda frase listada deve aparecer como chave exatamente uma vez.

Grupos:
{listing}
Gere apenas o objeto JSON final."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keys_number_per_verb() {
        let keys = context_keys([
            ("trocar", vec!["trocar filtro".to_string()]),
            ("limpar", vec!["limpar tanque".to_string()]),
            ("trocar", vec!["trocar bomba".to_string()]),
        ]);
        let names: Vec<&str> = keys.keys().map(String::as_str).collect();
        assert_eq!(names, ["limpar_1", "trocar_1", "trocar_2"]);
        assert_eq!(keys["trocar_2"], ["trocar bomba"]);
    }

    #[test]
    fn prompt_lists_groups_and_reserved_tokens() {
        let groups = BTreeMap::from([(
            "trocar_1".to_string(),
            vec!["trocar filtro".to_string(), "troca filtro \"a\"".to_string()],
        )]);
        let prompt = render_prompt(&groups, DEFAULT_RESERVED_TOKENS);
        assert!(prompt.contains(r#"trocar_1: ["trocar filtro", "troca filtro \"a\""]"#));
        assert!(prompt.contains(r#""--", "xxxx", "pt""#));
        assert!(prompt.contains(r#"{"frase": "valor universal"}"#));
    }
}
