//! Pull a JSON object out of model output.
//!
//! Models asked for JSON sometimes wrap it in a markdown fence or add a
//! sentence before it. Anything that still does not parse is reported as an
//! `InvalidResponse`, which the retry wrapper will try again.

use casegraph_core::error::{CaseGraphError, Result};

pub fn extract_json_object(service: &str, text: &str) -> Result<serde_json::Value> {
    let trimmed = strip_fence(text.trim());

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if value.is_object() {
            return Ok(value);
        }
    }

    // Fall back to the outermost braces.
    let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) else {
        return Err(CaseGraphError::invalid_response(
            service,
            "no JSON object in model output",
        ));
    };
    if end < start {
        return Err(CaseGraphError::invalid_response(
            service,
            "no JSON object in model output",
        ));
    }

    serde_json::from_str::<serde_json::Value>(&trimmed[start..=end])
        .ok()
        .filter(|v| v.is_object())
        .ok_or_else(|| CaseGraphError::invalid_response(service, "malformed JSON in model output"))
}

fn strip_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop an optional language tag on the opening line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
