//! JSON extraction from raw model output.
//!
//! Model responses wrap the JSON payload in code fences, prefix it with
//! prose, or emit several fragments. The extractor strips fences, then
//! scans for bracket-balanced candidates (ignoring brackets inside string
//! literals) and parses each one until a valid value is found.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors from extracting JSON out of a model response.
///
/// Both variants carry the untouched response text for diagnostics.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("model returned an empty response")]
    EmptyResponse { raw: String },

    #[error("no valid JSON object or array found in model response")]
    NoValidJson { raw: String },
}

impl ParseError {
    /// The raw response text that failed to parse.
    pub fn raw(&self) -> &str {
        match self {
            Self::EmptyResponse { raw } | Self::NoValidJson { raw } => raw,
        }
    }
}

/// Parse the first balanced JSON object or array found in `raw`.
pub fn extract_json(raw: &str) -> Result<Value, ParseError> {
    let text = prepare(raw)?;

    let mut from = 0;
    while let Some(start) = next_candidate(&text, from) {
        if let Some(end) = balanced_end(&text, start) {
            match serde_json::from_str::<Value>(&text[start..=end]) {
                Ok(value) => return Ok(value),
                Err(e) => debug!(start, end, error = %e, "rejected JSON candidate"),
            }
        }
        from = start + 1;
    }

    Err(ParseError::NoValidJson {
        raw: raw.to_string(),
    })
}

/// Parse every balanced JSON candidate in `raw` and return the longest.
///
/// Used when a large composite object may be preceded by an unrelated
/// smaller fragment in the same response. Ties keep the earlier candidate.
pub fn extract_largest_json(raw: &str) -> Result<Value, ParseError> {
    let text = prepare(raw)?;

    let mut best: Option<(usize, Value)> = None;
    let mut from = 0;
    while let Some(start) = next_candidate(&text, from) {
        let Some(end) = balanced_end(&text, start) else {
            from = start + 1;
            continue;
        };
        let slice = &text[start..=end];
        match serde_json::from_str::<Value>(slice) {
            Ok(value) => {
                let len = slice.chars().count();
                if best.as_ref().is_none_or(|(best_len, _)| len > *best_len) {
                    best = Some((len, value));
                }
                // Anything that starts inside this value is strictly smaller.
                from = end + 1;
            }
            Err(e) => {
                debug!(start, end, error = %e, "rejected JSON candidate");
                from = start + 1;
            }
        }
    }

    best.map(|(_, value)| value).ok_or_else(|| ParseError::NoValidJson {
        raw: raw.to_string(),
    })
}

fn prepare(raw: &str) -> Result<String, ParseError> {
    if raw.trim().is_empty() {
        return Err(ParseError::EmptyResponse {
            raw: raw.to_string(),
        });
    }
    Ok(strip_code_fences(raw))
}

/// Remove ``` markers that open a line, together with any language tag
/// that follows them. JSON strings cannot span lines, so a fence at the
/// start of a line is never part of a string value.
fn strip_code_fences(raw: &str) -> String {
    const FENCE: &str = "```";
    let mut out = String::with_capacity(raw.len());
    for line in raw.split_inclusive('\n') {
        match line.trim_start().strip_prefix(FENCE) {
            Some(after) => out.push_str(
                after.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
            ),
            None => out.push_str(line),
        }
    }
    out
}

fn next_candidate(text: &str, from: usize) -> Option<usize> {
    text.get(from..)?
        .find(['{', '['])
        .map(|offset| from + offset)
}

/// Return the byte index of the bracket closing the one at `start`.
///
/// Brackets inside string literals are ignored; a mismatched closer or
/// running off the end of the text yields `None`.
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (idx, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push(b'}'),
            b'[' => stack.push(b']'),
            b'}' | b']' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fenced_block() {
        let value = extract_json("```json\n{\"a\":1}\n```").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn parses_object_surrounded_by_prose() {
        let value = extract_json("text {\"a\":1} more").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn parses_top_level_array() {
        let value = extract_json("Here you go: [1, 2, {\"x\": [3]}] done").unwrap();
        assert_eq!(value, json!([1, 2, {"x": [3]}]));
    }

    #[test]
    fn fails_without_json() {
        let err = extract_json("no json").unwrap_err();
        assert!(matches!(err, ParseError::NoValidJson { .. }));
        assert_eq!(err.raw(), "no json");
    }

    #[test]
    fn fails_on_empty_response() {
        let err = extract_json("  \n\t").unwrap_err();
        assert!(matches!(err, ParseError::EmptyResponse { .. }));
    }

    #[test]
    fn keeps_backticks_inside_string_values() {
        let value = extract_json(r#"{"note":"wrap code in ```python blocks"}"#).unwrap();
        assert_eq!(value["note"], "wrap code in ```python blocks");

        let fenced = "```json\n{\"note\":\"use ```sh here\"}\n```";
        assert_eq!(extract_json(fenced).unwrap()["note"], "use ```sh here");
    }

    #[test]
    fn ignores_braces_inside_strings() {
        let value = extract_json(r#"note: {"title": "use {curly} and [square]", "n": 2}"#).unwrap();
        assert_eq!(value["title"], "use {curly} and [square]");
        assert_eq!(value["n"], 2);
    }

    #[test]
    fn respects_escaped_quotes() {
        let value = extract_json(r#"{"quote": "she said \"{\" loudly", "ok": true}"#).unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn skips_invalid_candidate_and_keeps_scanning() {
        // `{not json}` balances but does not parse; the next candidate does.
        let value = extract_json("first {not json} then {\"b\": 2}").unwrap();
        assert_eq!(value, json!({"b": 2}));
    }

    #[test]
    fn unbalanced_prefix_does_not_abort() {
        let value = extract_json("oops { \"a\": [1, 2 ... {\"c\": 3}").unwrap();
        assert_eq!(value, json!({"c": 3}));
    }

    #[test]
    fn largest_mode_prefers_bigger_object() {
        let value = extract_largest_json(r#"{"a":1} and {"b":{"c":2},"d":[1,2,3]}"#).unwrap();
        assert_eq!(value, json!({"b": {"c": 2}, "d": [1, 2, 3]}));
    }

    #[test]
    fn largest_mode_fails_without_json() {
        assert!(matches!(
            extract_largest_json("nothing here").unwrap_err(),
            ParseError::NoValidJson { .. }
        ));
    }

    #[test]
    fn fence_language_tags_are_removed() {
        assert_eq!(strip_code_fences("```json\n{}\n```"), "\n{}\n");
        assert_eq!(strip_code_fences("no fences"), "no fences");
    }
}
