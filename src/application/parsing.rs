//! # Response Parsing
//!
//! Turns raw agent output into a validated [`AgentResponse`]. Models
//! wrap their JSON in prose, code fences, or an extra envelope object,
//! so extraction is tolerant: a single linear scan finds the first
//! balanced JSON object, one level of wrapping is unwrapped, and
//! anything that still fails to validate degrades to a talk action
//! carrying the raw text. The caller always receives at least one
//! action.

use crate::domain::error::SchemaError;
use crate::domain::types::{Action, AgentResponse};
use tracing::{debug, warn};

/// Parse raw model output. Malformed or partial output degrades to a
/// single talk action with the raw text; the only hard failure is a
/// candidate that carries an actions collection yet violates the
/// action schema.
pub fn parse_response(raw: &str) -> Result<AgentResponse, SchemaError> {
    let candidate = strip_code_fences(raw);

    let Some(json_text) = extract_first_json(candidate) else {
        debug!("No JSON object in response, falling back to talk");
        return Ok(fallback(raw));
    };

    let value: serde_json::Value = match serde_json::from_str(json_text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Extracted JSON failed to parse: {}", e);
            return Ok(fallback(raw));
        }
    };

    let Some(shaped) = unwrap_envelope(&value) else {
        // No actions collection anywhere; salvage any free text.
        let text = ["message", "summary", "content"]
            .iter()
            .find_map(|key| value.get(key).and_then(|v| v.as_str()))
            .map(str::to_string)
            .unwrap_or_else(|| raw.trim().to_string());
        return Ok(AgentResponse {
            actions: vec![Action::talk(text)],
            summary: None,
            conversation_id: value
                .get("conversation_id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            message: None,
        });
    };

    // Fully shaped: schema violations are terminal from here on.
    let mut response: AgentResponse = serde_json::from_value(shaped.clone())?;
    if response.actions.is_empty() {
        let text = response
            .message
            .clone()
            .or_else(|| response.summary.clone())
            .unwrap_or_else(|| raw.trim().to_string());
        response.actions.push(Action::talk(text));
    }
    Ok(response)
}

/// Locate the object holding the actions collection: the value itself,
/// or the payload of a single-key envelope like `{"response": {...}}`.
/// One level only; deeper nesting is not unwrapped.
fn unwrap_envelope(value: &serde_json::Value) -> Option<&serde_json::Value> {
    if value.get("actions").is_some() {
        return Some(value);
    }
    let obj = value.as_object()?;
    if obj.len() == 1 {
        let inner = obj.values().next()?;
        if inner.get("actions").is_some() {
            return Some(inner);
        }
    }
    None
}

/// Find the first balanced JSON object in `text`. Brace depth is only
/// tracked outside string literals, and escape sequences inside strings
/// are skipped, so braces in string values cannot unbalance the scan.
/// One pass, no backtracking.
pub fn extract_first_json(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if start.is_none() {
            if b == b'{' {
                start = Some(i);
                depth = 1;
            }
            continue;
        }
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let s = start?;
                    return Some(&text[s..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drop a surrounding markdown code fence, if present.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text;
    };
    // Skip the language tag on the fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest)
}

fn fallback(raw: &str) -> AgentResponse {
    AgentResponse {
        actions: vec![Action::talk(raw.trim().to_string())],
        summary: None,
        conversation_id: None,
        message: None,
    }
}
