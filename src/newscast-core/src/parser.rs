//! Parsing of raw model output into dialogue turns.
//!
//! Models often wrap the JSON array in prose or code fences, or leave a
//! trailing comma before a closing bracket. Both defects are repaired; any
//! other deviation from the `[{speaker, text}, ...]` shape rejects the whole
//! chunk.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::error::{NewscastError, Result};
use crate::script::Turn;

static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([\]}])").expect("valid trailing comma regex"));

static JSON_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("valid array regex"));

/// Parse a model response into an ordered list of turns.
pub fn parse_turns(raw: &str) -> Result<Vec<Turn>> {
    let cleaned = repair_trailing_commas(raw);

    let value = match serde_json::from_str::<Value>(&cleaned) {
        Ok(value) => value,
        Err(_) => {
            let span = JSON_ARRAY.find(&cleaned).ok_or_else(|| {
                NewscastError::MalformedOutput("no JSON array found in model output".to_string())
            })?;
            let candidate = repair_trailing_commas(span.as_str());
            serde_json::from_str(&candidate).map_err(|e| {
                NewscastError::MalformedOutput(format!("embedded array is not valid JSON: {}", e))
            })?
        }
    };

    let Value::Array(items) = value else {
        return Err(NewscastError::MalformedOutput(
            "parsed JSON is not an array".to_string(),
        ));
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let Value::Object(fields) = item else {
                return Err(NewscastError::MalformedOutput(format!(
                    "element {} is not an object",
                    i
                )));
            };
            match (
                fields.get("speaker").and_then(Value::as_str),
                fields.get("text").and_then(Value::as_str),
            ) {
                (Some(speaker), Some(text)) => Ok(Turn::new(speaker.trim(), text.trim())),
                _ => Err(NewscastError::MalformedOutput(format!(
                    "element {} must have string 'speaker' and 'text'",
                    i
                ))),
            }
        })
        .collect()
}

/// Drop commas that directly precede a closing bracket or brace.
fn repair_trailing_commas(text: &str) -> String {
    TRAILING_COMMA.replace_all(text, "$1").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let turns =
            parse_turns(r#"[{"speaker": "Alex", "text": "Hi."}, {"speaker": "Sam", "text": "Yo."}]"#)
                .unwrap();
        assert_eq!(turns, vec![Turn::new("Alex", "Hi."), Turn::new("Sam", "Yo.")]);
    }

    #[test]
    fn test_parse_trailing_comma_in_object() {
        let turns = parse_turns("[{\"speaker\": \"Alex\", \"text\": \"Hi there\",}]").unwrap();
        assert_eq!(turns, vec![Turn::new("Alex", "Hi there")]);
    }

    #[test]
    fn test_parse_trailing_comma_in_array() {
        let turns = parse_turns("[{\"speaker\": \"Alex\", \"text\": \"Hi\"},\n ]").unwrap();
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn test_parse_embedded_in_prose() {
        let raw = "Sure! Here is the script:\n```json\n[\n  {\"speaker\": \"Sam\", \"text\": \"Big news today.\"},\n]\n```\nEnjoy!";
        let turns = parse_turns(raw).unwrap();
        assert_eq!(turns, vec![Turn::new("Sam", "Big news today.")]);
    }

    #[test]
    fn test_parse_trims_fields() {
        let turns = parse_turns(r#"[{"speaker": " Alex ", "text": "  Hello.\n"}]"#).unwrap();
        assert_eq!(turns, vec![Turn::new("Alex", "Hello.")]);
    }

    #[test]
    fn test_parse_empty_array() {
        assert!(parse_turns("[]").unwrap().is_empty());
    }

    #[test]
    fn test_reject_missing_field() {
        let err = parse_turns(r#"[{"speaker": "Alex"}]"#).unwrap_err();
        assert!(matches!(err, NewscastError::MalformedOutput(_)));
    }

    #[test]
    fn test_reject_non_string_field() {
        let err = parse_turns(r#"[{"speaker": "Alex", "text": 42}]"#).unwrap_err();
        assert!(matches!(err, NewscastError::MalformedOutput(_)));
    }

    #[test]
    fn test_reject_non_object_element() {
        let err =
            parse_turns(r#"[{"speaker": "Alex", "text": "ok"}, "stray string"]"#).unwrap_err();
        assert!(matches!(err, NewscastError::MalformedOutput(_)));
    }

    #[test]
    fn test_reject_non_array_value() {
        let err = parse_turns(r#"{"speaker": "Alex", "text": "Hi"}"#).unwrap_err();
        assert!(matches!(err, NewscastError::MalformedOutput(_)));
    }

    #[test]
    fn test_reject_no_array() {
        let err = parse_turns("I'd rather not write that.").unwrap_err();
        assert!(matches!(err, NewscastError::MalformedOutput(_)));
    }

    #[test]
    fn test_order_preserved_and_no_dedup() {
        let turns = parse_turns(
            r#"[{"speaker":"Sam","text":"A"},{"speaker":"Alex","text":"B"},{"speaker":"Sam","text":"A"}]"#,
        )
        .unwrap();
        let texts: Vec<_> = turns.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B", "A"]);
    }
}
