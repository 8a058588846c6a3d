// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Boundary between generated text and the validator.
//!
//! Generated text is expected to hold a single JSON object, possibly
//! wrapped in a fenced code block and surrounded by chatter. Anything
//! that still fails to parse is a [`MalformedInputError`]; retrying is
//! the caller's business.

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use super::validate::{PatternValidator, Validated, ValidationError};
use super::TrackSet;

/// Generated text could not be read as a pattern object
#[derive(Debug, Error)]
pub enum MalformedInputError {
    /// Nothing but whitespace (or an empty fence)
    #[error("generated text is empty")]
    Empty,
    /// Not valid JSON after fence stripping
    #[error("generated text is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Valid JSON, but not an object at the top level
    #[error("expected a JSON object at the top level, found {found}")]
    NotAnObject { found: &'static str },
}

/// Return the body of the first fenced code block, or the trimmed text.
///
/// An info string after the opening fence (`json`, `JSON`, ...) is skipped,
/// whether the body starts on the next line or on the fence line itself.
/// An unterminated fence yields everything after the info string.
pub fn strip_code_fence(text: &str) -> &str {
    const FENCE: &str = "```";

    let Some(open) = text.find(FENCE) else {
        return text.trim();
    };

    let after_open = &text[open + FENCE.len()..];
    let info_len = after_open
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(after_open.len());
    let body = &after_open[info_len..];

    match body.find(FENCE) {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Parse generated text into a raw JSON object
pub fn parse_generated(text: &str) -> Result<Value, MalformedInputError> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(MalformedInputError::Empty);
    }

    let value = match serde_json::from_str::<Value>(body) {
        Ok(value) => value,
        Err(err) => {
            // Fall back to the outermost brace span, for prose around bare JSON
            let span = body
                .find('{')
                .zip(body.rfind('}'))
                .filter(|(start, end)| start < end)
                .map(|(start, end)| &body[start..=end]);
            match span.and_then(|s| serde_json::from_str::<Value>(s).ok()) {
                Some(value) => {
                    debug!("recovered JSON object from surrounding text");
                    value
                }
                None => return Err(MalformedInputError::Json(err)),
            }
        }
    };

    if !value.is_object() {
        return Err(MalformedInputError::NotAnObject {
            found: json_type_name(&value),
        });
    }

    Ok(value)
}

/// Parse and validate generated text in one step
pub fn from_generated_text(text: &str, requested: &TrackSet) -> Result<Validated, ValidationError> {
    let raw = parse_generated(text)?;
    PatternValidator::new().validate(&raw, requested)
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
