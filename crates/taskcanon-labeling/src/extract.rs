//! Extraction of a `phrase → label` mapping from free-form service output.
//!
//! The whole text is tried as JSON first. Otherwise every balanced-brace span
//! (quote aware) is a candidate, parsed as JSON and then as a flat
//! Python-style dict literal. The longest span that parses into a non-empty
//! string-to-string mapping wins; ties go to the one with more entries, then
//! to the earliest.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::LabelingError;

pub type LabelMapping = BTreeMap<String, String>;

/// Pull the mapping out of `text`.
pub fn extract_mapping(text: &str) -> Result<LabelMapping, LabelingError> {
    let trimmed = text.trim();
    if let Some(mapping) = parse_json_mapping(trimmed) {
        return Ok(mapping);
    }

    let mut best: Option<(usize, usize, LabelMapping)> = None;
    for span in brace_spans(trimmed) {
        let Some(mapping) = parse_json_mapping(span).or_else(|| parse_dict_literal(span)) else {
            continue;
        };
        let rank = (span.chars().count(), mapping.len());
        let better = match &best {
            Some((len, entries, _)) => rank > (*len, *entries),
            None => true,
        };
        if better {
            best = Some((rank.0, rank.1, mapping));
        }
    }

    best.map(|(_, _, mapping)| mapping)
        .ok_or(LabelingError::NoValidMapping)
}

/// Text of a finished task payload: the `output_text` items of
/// `output[].content[]` joined by newlines, else a `result` string (or the
/// JSON of a `result` object).
pub fn response_text(payload: &Value) -> Option<String> {
    if let Some(blocks) = payload.get("output").and_then(Value::as_array) {
        let texts: Vec<&str> = blocks
            .iter()
            .filter_map(|block| block.get("content").and_then(Value::as_array))
            .flatten()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("output_text"))
            .filter_map(|item| item.get("text").and_then(Value::as_str))
            .collect();
        if !texts.is_empty() {
            return Some(texts.join("\n"));
        }
    }
    match payload.get("result") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(v @ Value::Object(_)) => Some(v.to_string()),
        _ => None,
    }
}

fn parse_json_mapping(text: &str) -> Option<LabelMapping> {
    let value: BTreeMap<String, Value> = serde_json::from_str(text).ok()?;
    if value.is_empty() {
        return None;
    }
    value
        .into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect()
}

/// Every `{ ... }` span whose braces balance outside string literals.
fn brace_spans(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();

    for (start, _) in text.match_indices('{') {
        let mut depth = 0usize;
        let mut quote: Option<u8> = None;
        let mut escaped = false;

        for (offset, &b) in bytes[start..].iter().enumerate() {
            if let Some(q) = quote {
                if escaped {
                    escaped = false;
                } else if b == b'\\' {
                    escaped = true;
                } else if b == q {
                    quote = None;
                }
                continue;
            }
            match b {
                b'"' | b'\'' => quote = Some(b),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        spans.push(&text[start..=start + offset]);
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    spans
}

/// Flat `{'k': 'v', "k2": "v2",}` literal with string keys and values.
fn parse_dict_literal(text: &str) -> Option<LabelMapping> {
    let mut chars = text.chars().peekable();
    let mut out = LabelMapping::new();

    skip_ws(&mut chars);
    if chars.next()? != '{' {
        return None;
    }
    loop {
        skip_ws(&mut chars);
        match chars.peek()? {
            '}' => {
                chars.next();
                break;
            }
            _ => {
                let key = parse_string(&mut chars)?;
                skip_ws(&mut chars);
                if chars.next()? != ':' {
                    return None;
                }
                skip_ws(&mut chars);
                let value = parse_string(&mut chars)?;
                out.insert(key, value);
                skip_ws(&mut chars);
                match chars.next()? {
                    ',' => continue,
                    '}' => break,
                    _ => return None,
                }
            }
        }
    }

    skip_ws(&mut chars);
    if chars.next().is_some() || out.is_empty() {
        return None;
    }
    Some(out)
}

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn skip_ws(chars: &mut Chars<'_>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn parse_string(chars: &mut Chars<'_>) -> Option<String> {
    let quote = chars.next()?;
    if quote != '\'' && quote != '"' {
        return None;
    }
    let mut out = String::new();
    loop {
        match chars.next()? {
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                'u' => {
                    let hex: String = (0..4).map(|_| chars.next()).collect::<Option<String>>()?;
                    out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
                }
                other => out.push(other),
            },
            c if c == quote => return Some(out),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_json_object() {
        let m = extract_mapping(r#"{"TROCAR OLEO": "TROCAR OLEO", "TROCA OLEO": "TROCAR OLEO"}"#).unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m["TROCA OLEO"], "TROCAR OLEO");
    }

    #[test]
    fn mapping_surrounded_by_prose() {
        let text = "Claro! Aqui está o dicionário:\n```json\n{\"a\": \"b\", \"c\": \"b\"}\n```\nQualquer dúvida, avise.";
        let m = extract_mapping(text).unwrap();
        assert_eq!(m, LabelMapping::from([("a".into(), "b".into()), ("c".into(), "b".into())]));
    }

    #[test]
    fn picks_the_largest_valid_mapping() {
        let text = r#"Exemplo: {"x": "y"}. Resposta final: {"trocar": "trocar", "troca": "trocar", "subistituir": "trocar"}"#;
        let m = extract_mapping(text).unwrap();
        assert_eq!(m.len(), 3);
        assert_eq!(m["subistituir"], "trocar");
    }

    #[test]
    fn accepts_python_dict_literals() {
        let text = "resultado = {'limpar': 'limpar', 'higienizar': 'limpar', \"d'agua\": 'agua',}";
        let m = extract_mapping(text).unwrap();
        assert_eq!(m["higienizar"], "limpar");
        assert_eq!(m["d'agua"], "agua");
    }

    #[test]
    fn braces_inside_strings_do_not_split_spans() {
        let m = extract_mapping(r#"ok {"chave {1}": "valor }"} fim"#).unwrap();
        assert_eq!(m["chave {1}"], "valor }");
    }

    #[test]
    fn nested_or_non_string_values_are_rejected() {
        assert!(matches!(
            extract_mapping(r#"{"a": {"b": 1}}"#),
            Err(LabelingError::NoValidMapping)
        ));
        assert!(matches!(extract_mapping("sem dicionario"), Err(LabelingError::NoValidMapping)));
        assert!(matches!(extract_mapping("{}"), Err(LabelingError::NoValidMapping)));
    }

    #[test]
    fn nested_valid_span_is_still_found() {
        // Outer object is not a flat mapping, inner one is.
        let m = extract_mapping(r#"{"meta": 1, "data": {"a": "b"}}"#).unwrap();
        assert_eq!(m["a"], "b");
    }

    #[test]
    fn response_text_joins_output_text_items() {
        let payload = serde_json::json!({
            "status": "completed",
            "output": [
                {"role": "assistant", "content": [
                    {"type": "output_text", "text": "parte 1"},
                    {"type": "output_file", "fileUrl": "x"}
                ]},
                {"role": "assistant", "content": [{"type": "output_text", "text": "parte 2"}]}
            ]
        });
        assert_eq!(response_text(&payload).unwrap(), "parte 1\nparte 2");
        assert_eq!(
            response_text(&serde_json::json!({"result": "{\"a\": \"b\"}"})).unwrap(),
            "{\"a\": \"b\"}"
        );
        assert!(response_text(&serde_json::json!({"status": "completed"})).is_none());
    }
}
