//! Recovers a JSON object from free-text model output.
//!
//! Models asked for "JSON only" still wrap their answer in code fences,
//! prepend a sentence of prose, or get cut off by the token limit. The
//! strategies below are tried in order:
//! 1. A fenced code block (```json or plain ```) holding an object
//! 2. The whole reply, when it already is an object
//! 3. The largest parseable object anywhere in the reply (later wins ties)
//!
//! When nothing parses, the reply is checked for an unterminated object so
//! truncation can be reported separately from "no JSON at all".

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// Error type for JSON extraction failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed} unclosed delimiters. Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed: usize,
    },
    #[error("No JSON object found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"```(?:[A-Za-z]+)?[ \t]*\n?([\s\S]*?)\n?```").expect("fence regex is valid")
    })
}

fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

fn parses(candidate: &str) -> bool {
    matches!(serde_json::from_str::<Value>(candidate), Ok(Value::Object(_)))
}

/// Byte index of the `}` closing the object that starts at `s[0]`.
///
/// Braces inside string literals (including escaped quotes) are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Counts braces and brackets left open at the end of `s`.
pub fn unclosed_delimiters(s: &str) -> usize {
    let mut stack = 0isize;
    let mut in_string = false;
    let mut escape_next = false;

    for c in s.chars() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => stack += 1,
            '}' | ']' if !in_string => stack -= 1,
            _ => {}
        }
    }
    stack.max(0) as usize + usize::from(in_string)
}

fn object_in_fence(content: &str) -> Option<String> {
    fence_regex().captures_iter(content).find_map(|caps| {
        let body = caps.get(1)?.as_str().trim();
        let start = body.find('{')?;
        let end = find_matching_brace(&body[start..])?;
        let candidate = &body[start..=start + end];
        parses(candidate).then(|| candidate.to_string())
    })
}

fn largest_object(content: &str) -> Option<String> {
    content
        .char_indices()
        .filter(|&(_, c)| c == '{')
        .filter_map(|(start, _)| {
            let end = find_matching_brace(&content[start..])?;
            let candidate = &content[start..=start + end];
            parses(candidate).then_some((start, candidate))
        })
        .max_by(|(pos_a, a), (pos_b, b)| a.len().cmp(&b.len()).then(pos_a.cmp(pos_b)))
        .map(|(_, json)| json.to_string())
}

/// Extracts the JSON object carried by a model reply.
pub fn extract_json_object(content: &str) -> Result<String, JsonExtractionError> {
    let trimmed = content.trim();

    if let Some(json) = object_in_fence(trimmed) {
        return Ok(json);
    }

    if trimmed.starts_with('{') && parses(trimmed) {
        return Ok(trimmed.to_string());
    }

    if let Some(json) = largest_object(trimmed) {
        return Ok(json);
    }

    if let Some(start) = trimmed.find('{') {
        let partial = &trimmed[start..];
        let unclosed = unclosed_delimiters(partial);
        if unclosed > 0 {
            return Err(JsonExtractionError::Truncated {
                partial_preview: preview(partial, 100),
                unclosed,
            });
        }
    }

    Err(JsonExtractionError::NotFound {
        content_preview: preview(trimmed, 50),
    })
}
