//! Structured model output
//!
//! Providers ask for JSON matching a step schema and get back whatever the
//! model produced: fenced, wrapped in prose, cut off mid-string. This module
//! states the contract going out and salvages a `Value` coming back, then
//! checks the schema's top-level `required` fields are present.
//!
//! Anything that cannot be salvaged is an `LlmError` with
//! [`ErrorCategory::ParseError`], which the step runner records as invalid
//! output rather than a collaborator outage.

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{ErrorCategory, LlmError, Result, RfpError};

const PREVIEW_CHARS: usize = 160;

/// Append the JSON contract for `schema` to `preamble`.
///
/// A null schema only asks for JSON.
pub fn schema_instructions(preamble: &str, schema: &Value) -> String {
    if schema.is_null() {
        return format!("{}\n\nAnswer with a single JSON object.", preamble);
    }
    let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    format!(
        "{}\n\n## Output format\n\nAnswer with a single JSON object that validates against this schema:\n```json\n{}\n```\nDo not add commentary before or after the JSON.",
        preamble, schema
    )
}

/// Turn a model reply into JSON that carries every field `schema` requires.
pub fn parse_structured(raw: &str, schema: &Value) -> Result<Value> {
    let value = salvage(raw).ok_or_else(|| {
        parse_error(format!(
            "no usable JSON in model reply: {}",
            raw.chars().take(PREVIEW_CHARS).collect::<String>()
        ))
    })?;
    check_required(&value, schema)?;
    Ok(value)
}

fn parse_error(message: String) -> RfpError {
    LlmError::new(ErrorCategory::ParseError, message).into()
}

fn salvage(raw: &str) -> Option<Value> {
    let body = unfence(raw.trim().trim_start_matches('\u{feff}'));
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return Some(value);
    }

    let start = body.find(['{', '['])?;
    let candidate = &body[start..];
    let repaired = close_first_value(candidate);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) => {
            warn!(
                "Salvaged malformed JSON from model reply ({} bytes kept of {})",
                repaired.len(),
                raw.len()
            );
            Some(value)
        }
        Err(e) => {
            debug!("JSON salvage failed: {}", e);
            None
        }
    }
}

/// Body of the first fenced block, or `text` when there is none.
///
/// An unterminated fence (truncated reply) yields everything after it.
fn unfence(text: &str) -> &str {
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    let body = match after.find('\n') {
        Some(newline) if !after[..newline].contains(['{', '[']) => &after[newline + 1..],
        _ => after,
    };
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Rewrite `candidate`, which starts at `{` or `[`, into one well-formed value.
///
/// Single pass with a stack of pending closers:
/// - stops after the first top-level value, dropping trailing prose
/// - drops commas directly before a closer
/// - escapes raw newlines and tabs inside strings, drops other control chars
/// - on truncation, closes the open string and containers innermost first
fn close_first_value(candidate: &str) -> String {
    let mut out = String::with_capacity(candidate.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut pending_comma = false;

    for ch in candidate.chars() {
        if in_string {
            match ch {
                _ if escaped => {
                    escaped = false;
                    out.push(ch);
                }
                '\\' => {
                    escaped = true;
                    out.push(ch);
                }
                '"' => {
                    in_string = false;
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {}
                c => out.push(c),
            }
            continue;
        }

        if ch == ',' {
            pending_comma = true;
            continue;
        }
        if ch.is_whitespace() {
            if !pending_comma {
                out.push(ch);
            }
            continue;
        }
        if pending_comma && !matches!(ch, '}' | ']') {
            out.push(',');
        }
        pending_comma = false;

        match ch {
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '"' => in_string = true,
            '}' | ']' => {
                // Unmatched closers are noise.
                let Some(depth) = closers.iter().rposition(|c| *c == ch) else {
                    continue;
                };
                out.extend(closers.drain(depth..).rev());
                if closers.is_empty() {
                    return out;
                }
                continue;
            }
            _ => {}
        }
        out.push(ch);
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    let len = out.trim_end().len();
    if out[..len].ends_with(':') {
        out.truncate(len);
        out.push_str(" null");
    }
    out.extend(closers.iter().rev());
    out
}

fn check_required(value: &Value, schema: &Value) -> Result<()> {
    let Some(required) = schema.get("required").and_then(Value::as_array) else {
        return Ok(());
    };
    let Some(object) = value.as_object() else {
        return Err(parse_error(format!(
            "expected a JSON object, got {}",
            match value {
                Value::Array(_) => "an array",
                Value::String(_) => "a string",
                Value::Number(_) => "a number",
                Value::Bool(_) => "a boolean",
                _ => "null",
            }
        )));
    };

    let missing: Vec<&str> = required
        .iter()
        .filter_map(Value::as_str)
        .filter(|field| !object.contains_key(*field))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(parse_error(format!(
            "model reply is missing required field(s): {}",
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StepError;
    use serde_json::json;

    fn challenge_schema() -> Value {
        json!({"type": "object", "required": ["challenges"]})
    }

    #[test]
    fn test_fenced_reply_inside_prose() {
        let raw = "Here is the analysis:\n```json\n{\"executiveSummary\": \"Cloud claims platform\"}\n```\nLet me know if you need more.";
        let value = parse_structured(raw, &json!({"required": ["executiveSummary"]})).unwrap();
        assert_eq!(value["executiveSummary"], "Cloud claims platform");
    }

    #[test]
    fn test_truncated_reply_closes_innermost_first() {
        let raw = r#"{"challenges": [{"title": "Manual re-keying", "description": "Adjusters copy da"#;
        let value = parse_structured(raw, &challenge_schema()).unwrap();
        assert_eq!(value["challenges"][0]["description"], "Adjusters copy da");
    }

    #[test]
    fn test_unterminated_fence() {
        let raw = "```json\n{\"challenges\": [{\"title\": \"Backlog\"},";
        let value = parse_structured(raw, &challenge_schema()).unwrap();
        assert_eq!(value["challenges"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_trailing_commas_dropped() {
        let raw = r#"{"matches": [{"caseStudyId": "cs-1", "relevance": 0.8,},],}"#;
        let value = parse_structured(raw, &json!({"required": ["matches"]})).unwrap();
        assert_eq!(value["matches"][0]["relevance"], 0.8);
    }

    #[test]
    fn test_raw_newline_in_string_is_kept() {
        let raw = "{\"title\": \"Proposal\", \"sections\": [{\"heading\": \"Approach\", \"body\": \"Phase one\nPhase two\"}]} trailing";
        let value = parse_structured(raw, &json!({"required": ["title", "sections"]})).unwrap();
        assert_eq!(value["sections"][0]["body"], "Phase one\nPhase two");
    }

    #[test]
    fn test_dangling_key_becomes_null() {
        let value = parse_structured(r#"{"title": "Plan", "sections":"#, &Value::Null).unwrap();
        assert_eq!(value["title"], "Plan");
        assert!(value["sections"].is_null());
    }

    #[test]
    fn test_missing_required_field_is_invalid_output() {
        let err = parse_structured(r#"{"title": "Plan"}"#, &json!({"required": ["title", "sections"]}))
            .unwrap_err();
        match &err {
            RfpError::Llm(llm) => {
                assert_eq!(llm.category, ErrorCategory::ParseError);
                assert!(llm.message.contains("sections"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(matches!(StepError::from(err), StepError::InvalidOutput(_)));
    }

    #[test]
    fn test_array_where_object_required() {
        let err = parse_structured("[1, 2]", &challenge_schema()).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_no_json_at_all() {
        let err = parse_structured("I could not find any challenges.", &challenge_schema()).unwrap_err();
        assert!(matches!(err, RfpError::Llm(ref llm) if llm.category == ErrorCategory::ParseError));
    }

    #[test]
    fn test_schema_instructions() {
        let text = schema_instructions("Extract challenges", &challenge_schema());
        assert!(text.starts_with("Extract challenges"));
        assert!(text.contains("\"challenges\""));

        let plain = schema_instructions("Extract challenges", &Value::Null);
        assert!(plain.ends_with("single JSON object."));
    }
}
