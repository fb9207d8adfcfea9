//! Turns model text into typed results.
//!
//! Models often wrap JSON in a markdown fence even when asked not to, so
//! every structured parse strips one surrounding fence first.

use std::sync::LazyLock;

use dealdesk_core::{Analysis, GeneratedLead};
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::AiError;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```\s*$").expect("valid fence regex")
});

/// Removes a single surrounding ```` ``` ```` / ```` ```json ```` fence, if any.
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    match FENCE_RE.captures(text).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => text.trim(),
    }
}

/// Decodes `text` as JSON of type `T` after stripping fences.
///
/// # Errors
///
/// Returns [`AiError::MalformedResponse`] if the text is not valid JSON for `T`.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, AiError> {
    let body = strip_code_fences(text);
    serde_json::from_str(body).map_err(|e| {
        AiError::MalformedResponse(format!(
            "model output is not the expected JSON ({e}): {}",
            preview(body)
        ))
    })
}

/// # Errors
///
/// Returns [`AiError::MalformedResponse`] when the output is not an analysis object.
pub fn parse_analysis(text: &str) -> Result<Analysis, AiError> {
    parse_json(text)
}

/// Decodes a generated batch. The batch is rejected as a whole if any lead
/// lacks a property description.
///
/// # Errors
///
/// Returns [`AiError::MalformedResponse`] when the output is not an array of
/// leads or any lead has blank `propertyDetails`.
pub fn parse_generated_leads(text: &str) -> Result<Vec<GeneratedLead>, AiError> {
    let leads: Vec<GeneratedLead> = parse_json(text)?;
    if let Some(index) = leads
        .iter()
        .position(|lead| lead.property_details.trim().is_empty())
    {
        return Err(AiError::MalformedResponse(format!(
            "generated lead {index} has no propertyDetails"
        )));
    }
    Ok(leads)
}

/// Free-text responses (offer letters, market narratives) are used as-is
/// apart from surrounding whitespace.
///
/// # Errors
///
/// Returns [`AiError::MalformedResponse`] if the model returned only whitespace.
pub fn parse_text(text: &str) -> Result<String, AiError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AiError::MalformedResponse(
            "model returned empty text".to_owned(),
        ));
    }
    Ok(trimmed.to_owned())
}

fn preview(text: &str) -> String {
    const MAX: usize = 120;
    if text.chars().count() <= MAX {
        return text.to_owned();
    }
    let mut out: String = text.chars().take(MAX).collect();
    out.push('…');
    out
}
