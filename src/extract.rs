//! Turning free-form model text into an extraction response.
//!
//! The pipeline has three stages: locate a JSON candidate (fenced block or the
//! whole answer), parse it, and check it against the response schema. Any
//! failure yields [`Extraction::Fallback`], which becomes a `clarify` reply.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::requirements::{requirements_typedef, RequirementsUpdate};
use crate::types::{validate, FieldDef, TypeDef};

/// Prompt shown to the user when the model answer could not be used.
pub const REPHRASE_PROMPT: &str = "Could you please rephrase your requirements?";

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\n?(.*?)\n?```").expect("valid regex"));
static ANY_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```\n?(.*?)\n?```").expect("valid regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Extract,
    Clarify,
    Confirm,
}

impl Action {
    pub const ALL: &'static [&'static str] = &["extract", "clarify", "confirm"];
}

/// Reply of the extraction endpoint, as seen by the chat client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResponse {
    pub action: Action,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<RequirementsUpdate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarifications: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<Vec<String>>,
}

/// Schema every model answer has to satisfy before it is passed on.
pub fn response_typedef() -> TypeDef {
    TypeDef::Object(vec![
        FieldDef::required("action", TypeDef::OneOf(Action::ALL)),
        FieldDef::required("message", TypeDef::Text),
        FieldDef::optional("requirements", TypeDef::nullable(requirements_typedef())),
        FieldDef::optional("clarifications", TypeDef::nullable(TypeDef::list(TypeDef::Text))),
        FieldDef::optional("changes", TypeDef::nullable(TypeDef::list(TypeDef::Text))),
    ])
}

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// Schema-conforming JSON object, passed through unchanged.
    Parsed(Value),
    /// The raw model text, which could not be used as structured output.
    Fallback(String),
}

impl Extraction {
    /// The JSON body returned to the client.
    pub fn into_body(self) -> Value {
        match self {
            Extraction::Parsed(value) => value,
            Extraction::Fallback(raw) => json!({
                "action": "clarify",
                "message": raw,
                "clarifications": [REPHRASE_PROMPT],
            }),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Extraction::Fallback(_))
    }
}

/// Find the JSON candidate inside a model answer.
///
/// A ```` ```json ```` block wins over an untagged fence; with no fence the
/// whole answer is the candidate.
pub fn locate_json(raw: &str) -> &str {
    JSON_FENCE
        .captures(raw)
        .or_else(|| ANY_FENCE.captures(raw))
        .and_then(|caps| caps.get(1))
        .map_or(raw, |m| m.as_str())
}

/// Run the full pipeline over a model answer.
pub fn extract(raw: &str, schema: &TypeDef) -> Extraction {
    let candidate = locate_json(raw).trim();

    let value: Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "model answer is not valid JSON, falling back to clarify");
            tracing::debug!(answer = raw, "unparseable model answer");
            return Extraction::Fallback(raw.to_string());
        }
    };

    if let Err(errors) = validate(schema, &value) {
        let problems: Vec<String> = errors.iter().map(ToString::to_string).collect();
        tracing::warn!(
            problems = ?problems,
            "model answer does not match the response schema, falling back to clarify"
        );
        return Extraction::Fallback(raw.to_string());
    }

    Extraction::Parsed(value)
}
