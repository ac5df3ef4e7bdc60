//! Validation and repair boundary for model output.
//!
//! The LLM gives no schema guarantee, so every stage hands raw completion
//! text to this crate and gets back either strictly-typed records or a
//! [`PipelineError::MalformedResponse`] carrying a preview of the raw text.
//!
//! Parsing happens in two passes:
//! 1. Strict: strip Markdown code fences and parse as JSON.
//! 2. Recovery (arrays only): locate the named array field by pattern,
//!    keep its leading well-formed elements, wrap them in a minimal
//!    envelope and re-parse. Truncated or broken trailing elements are
//!    dropped, never guessed.
//!
//! Field-level coercion lives in [`coerce`]; record shapes in [`topic`] and
//! [`article`].

pub mod article;
pub mod coerce;
pub mod text;
pub mod topic;

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use visapress_shared::{PipelineError, Result};

pub use article::sanitize_article;
pub use text::{count_words, slugify, strip_html};
pub use topic::{SanitizedTopics, TOPICS_FIELD, sanitize_topic, sanitize_topics};

/// How an array was obtained from the raw text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// The whole response parsed as JSON.
    Strict,
    /// Only a leading run of elements could be salvaged.
    Recovered,
}

/// Elements of a named array field plus how they were obtained.
#[derive(Debug, Clone)]
pub struct ExtractedArray {
    pub items: Vec<Value>,
    pub mode: ParseMode,
}

/// Strip surrounding whitespace and Markdown code fences.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .trim_end()
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
}

/// Parse `raw` as a JSON object.
///
/// Tolerates code fences and prose around a single top-level object.
pub fn parse_object(raw: &str) -> Result<serde_json::Map<String, Value>> {
    if raw.trim().is_empty() {
        return Err(PipelineError::malformed("empty response", raw));
    }

    match parse_strict(raw) {
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(PipelineError::malformed(
            format!("expected a JSON object, got {}", kind_of(&other)),
            raw,
        )),
        None => Err(PipelineError::malformed("response is not valid JSON", raw)),
    }
}

/// Extract the array stored under `field`.
///
/// A bare top-level array is accepted as the field itself.
pub fn extract_array(raw: &str, field: &str) -> Result<ExtractedArray> {
    if raw.trim().is_empty() {
        return Err(PipelineError::malformed("empty response", raw));
    }

    if let Some(value) = parse_strict(raw) {
        return match value {
            Value::Object(mut map) => match map.remove(field) {
                Some(Value::Array(items)) => Ok(ExtractedArray {
                    items,
                    mode: ParseMode::Strict,
                }),
                Some(other) => Err(PipelineError::malformed(
                    format!("field `{field}` is {}, expected array", kind_of(&other)),
                    raw,
                )),
                None => Err(PipelineError::malformed(
                    format!("field `{field}` missing from response"),
                    raw,
                )),
            },
            Value::Array(items) => Ok(ExtractedArray {
                items,
                mode: ParseMode::Strict,
            }),
            other => Err(PipelineError::malformed(
                format!("expected object or array, got {}", kind_of(&other)),
                raw,
            )),
        };
    }

    debug!(field, "strict parse failed, attempting recovery");
    let items = recover_array(raw, field)?;
    warn!(
        field,
        recovered = items.len(),
        "recovered partial array from malformed response"
    );
    Ok(ExtractedArray {
        items,
        mode: ParseMode::Recovered,
    })
}

/// Strict pass: fenced body first, then the outermost `{...}` span.
fn parse_strict(raw: &str) -> Option<Value> {
    let body = strip_code_fences(raw);
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }

    // A cut-off bare array must not be mistaken for its first object.
    if body.starts_with('[') {
        return None;
    }
    let start = body.find('{')?;
    let end = body.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&body[start..=end]).ok()
}

/// Recovery pass for truncated or partially broken arrays.
fn recover_array(raw: &str, field: &str) -> Result<Vec<Value>> {
    let pattern = format!(r#""{}"\s*:\s*\["#, regex::escape(field));
    let re = Regex::new(&pattern).map_err(|e| PipelineError::malformed(e.to_string(), raw))?;

    // Named field first; otherwise a bare top-level array.
    let after_open = match re.find(raw) {
        Some(open) => &raw[open.end()..],
        None => strip_code_fences(raw).strip_prefix('[').ok_or_else(|| {
            PipelineError::malformed(format!("could not locate `{field}` array"), raw)
        })?,
    };

    let elements = split_elements(after_open);
    let mut valid = Vec::with_capacity(elements.len());
    for slice in elements {
        if serde_json::from_str::<Value>(slice).is_err() {
            debug!(element = valid.len(), "stopping recovery at unparseable element");
            break;
        }
        valid.push(slice);
    }

    if valid.is_empty() {
        return Err(PipelineError::malformed(
            format!("no complete elements in `{field}` array"),
            raw,
        ));
    }

    let envelope = format!(r#"{{"{field}":[{}]}}"#, valid.join(","));
    match serde_json::from_str::<Value>(&envelope) {
        Ok(Value::Object(mut map)) => match map.remove(field) {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(PipelineError::malformed("recovered envelope lost its array", raw)),
        },
        _ => Err(PipelineError::malformed("recovered envelope did not parse", raw)),
    }
}

/// Split the text following an opening `[` into complete top-level elements.
///
/// Scanning stops at the matching `]` or at end of input; an element still
/// open at end of input is discarded.
fn split_elements(after_open: &str) -> Vec<&str> {
    let mut elements = Vec::new();
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut start: Option<usize> = None;

    for (i, ch) in after_open.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            c if c.is_whitespace() => {}
            ',' if depth == 0 => {
                if let Some(s) = start.take() {
                    elements.push(after_open[s..i].trim());
                }
            }
            ']' if depth == 0 => {
                if let Some(s) = start.take() {
                    elements.push(after_open[s..i].trim());
                }
                return elements;
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
                match ch {
                    '"' => in_string = true,
                    '{' | '[' => depth += 1,
                    '}' | ']' => depth -= 1,
                    _ => {}
                }
            }
        }
    }

    elements
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic_json(i: usize) -> String {
        format!(r#"{{"title": "Topic {i}", "category": "culture", "priority": {i}}}"#)
    }

    #[test]
    fn strips_fences() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("```\n[1]\n```"), "[1]");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn strict_object_envelope() {
        let raw = format!(r#"{{"topics": [{}, {}]}}"#, topic_json(1), topic_json(2));
        let extracted = extract_array(&raw, "topics").expect("strict parse");
        assert_eq!(extracted.mode, ParseMode::Strict);
        assert_eq!(extracted.items.len(), 2);
    }

    #[test]
    fn bare_array_accepted() {
        let raw = format!("```json\n[{}]\n```", topic_json(1));
        let extracted = extract_array(&raw, "topics").expect("bare array");
        assert_eq!(extracted.items.len(), 1);
    }

    #[test]
    fn prose_around_object_is_tolerated() {
        let raw = r#"Here is your plan: {"topics": []} Hope it helps!"#;
        let extracted = extract_array(raw, "topics").expect("parse");
        assert!(extracted.items.is_empty());
        assert_eq!(extracted.mode, ParseMode::Strict);
    }

    #[test]
    fn truncated_array_keeps_complete_elements() {
        let complete: Vec<String> = (1..=7).map(topic_json).collect();
        let raw = format!(
            r#"{{"topics": [{}, {{"title": "Topic 8", "category": "cul"#,
            complete.join(", ")
        );
        let extracted = extract_array(&raw, "topics").expect("recovery");
        assert_eq!(extracted.mode, ParseMode::Recovered);
        assert_eq!(extracted.items.len(), 7);
        assert_eq!(extracted.items[6]["title"], "Topic 7");
    }

    #[test]
    fn truncated_bare_array_keeps_complete_elements() {
        let complete: Vec<String> = (1..=7).map(topic_json).collect();
        let bare = format!(r#"[{}, {{"title": "Topic 8", "categ"#, complete.join(", "));
        let fenced = format!("```json\n{bare}");

        for raw in [bare, fenced] {
            let extracted = extract_array(&raw, "topics").expect("recovery");
            assert_eq!(extracted.mode, ParseMode::Recovered);
            assert_eq!(extracted.items.len(), 7);
            assert_eq!(extracted.items[0]["title"], "Topic 1");
        }
    }

    #[test]
    fn cut_off_bare_array_is_not_read_as_its_first_object() {
        let raw = format!(r#"[{}, {{"title": "Topic 2"}}, {{"ti"#, topic_json(1));
        let extracted = extract_array(&raw, "topics").expect("recovery");
        assert_eq!(extracted.mode, ParseMode::Recovered);
        assert_eq!(extracted.items.len(), 2);
    }

    #[test]
    fn syntax_error_after_good_elements_stops_recovery() {
        let complete: Vec<String> = (1..=7).map(topic_json).collect();
        let raw = format!(
            r#"{{"topics": [{}, {{"title": }}, {}]}}"#,
            complete.join(", "),
            topic_json(9)
        );
        let extracted = extract_array(&raw, "topics").expect("recovery");
        assert_eq!(extracted.items.len(), 7);
    }

    #[test]
    fn brackets_inside_strings_do_not_confuse_scanner() {
        let raw = r#"{"topics": [{"title": "Visa [2025] {guide}, part 1"}, {"title": "tru"#;
        let extracted = extract_array(raw, "topics").expect("recovery");
        assert_eq!(extracted.items.len(), 1);
        assert_eq!(extracted.items[0]["title"], "Visa [2025] {guide}, part 1");
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let raw = r#"{"topics": [{"title": "The \"golden\" visa"}, {"title"#;
        let extracted = extract_array(raw, "topics").expect("recovery");
        assert_eq!(extracted.items[0]["title"], "The \"golden\" visa");
    }

    #[test]
    fn unrecoverable_is_malformed_with_preview() {
        let raw = "I'm sorry, I cannot help with that request.";
        match extract_array(raw, "topics") {
            Err(PipelineError::MalformedResponse { preview, .. }) => {
                assert!(preview.starts_with("I'm sorry"));
            }
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn empty_array_prefix_is_malformed() {
        let raw = r#"{"topics": [{"title": "cut off"#;
        assert!(matches!(
            extract_array(raw, "topics"),
            Err(PipelineError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn wrong_field_type_is_malformed() {
        let raw = r#"{"topics": "none today"}"#;
        let err = extract_array(raw, "topics").unwrap_err();
        assert!(err.to_string().contains("expected array"));
    }

    #[test]
    fn empty_response_is_malformed() {
        assert!(parse_object("   ").is_err());
        assert!(extract_array("", "topics").is_err());
    }

    #[test]
    fn parse_object_rejects_array() {
        assert!(parse_object("[1, 2]").is_err());
        assert!(parse_object(r#"{"content": "<p>hi</p>"}"#).is_ok());
    }
}
