use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::types::TypeDef;

/// Role of one turn in a chat-completion conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Anything that can answer a chat-completion request with plain text.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, Error>;
}

/// Client for an OpenAI-compatible chat-completions endpoint.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl LlmClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            model: model.into(),
            api_key,
            temperature: 0.1,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("temperature", &self.temperature)
            .finish()
    }
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[async_trait]
impl CompletionModel for LlmClient {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, Error> {
        let api_key = self.api_key.as_deref().ok_or(Error::MissingCredential)?;

        let resp = self
            .http
            .post(&self.url)
            .bearer_auth(api_key)
            .json(&CompletionRequest {
                model: &self.model,
                messages,
                temperature: self.temperature,
            })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::TOO_MANY_REQUESTS => Error::RateLimited,
                StatusCode::PAYMENT_REQUIRED => Error::UsageLimit,
                _ => {
                    let body = resp.text().await.unwrap_or_else(|_| "Unknown error".to_string());
                    Error::Upstream {
                        status: status.as_u16(),
                        body,
                    }
                }
            });
        }

        // No content is malformed output, not a failure: extraction falls back on it.
        let body: CompletionResponse = resp.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content);
        if content.is_none() {
            tracing::warn!("AI service returned no message content");
        }
        Ok(content.unwrap_or_default())
    }
}

/// Build the system instruction for one extraction turn.
///
/// `current` is embedded verbatim so the model can update it incrementally.
pub fn build_prompt(current: Option<&Value>, output_schema: &TypeDef) -> String {
    let mut s = String::new();

    s.push_str("You are a requirement parser for a precision product builder. ");
    s.push_str("Your job is to extract STRUCTURED requirements from user descriptions.\n\n");

    s.push_str("CRITICAL RULES:\n");
    s.push_str("1. ONLY extract what the user EXPLICITLY states. Never infer or add features.\n");
    s.push_str("2. If something is ambiguous, ask for clarification instead of assuming.\n");
    s.push_str("3. Always output in the exact JSON structure specified.\n");
    s.push_str("4. Be precise and deterministic - no creative additions.\n\n");

    s.push_str("Current requirements (if any):\n");
    let empty = Value::Object(Default::default());
    let current = current.filter(|v| !v.is_null()).unwrap_or(&empty);
    s.push_str(&serde_json::to_string_pretty(current).unwrap_or_else(|_| "{}".to_string()));
    s.push_str("\n\n");

    s.push_str("OUTPUT FORMAT (always respond with a single valid JSON object):\n");
    s.push_str(&describe_schema(output_schema, 0));
    s.push('\n');

    s.push_str("`clarifications` lists the questions to ask when action is \"clarify\".\n");
    s.push_str("`changes` lists what changed compared to the current requirements.\n\n");

    s.push_str("If the user says something unclear, set action to \"clarify\" and ask specific questions.\n");
    s.push_str("If you have enough info, set action to \"extract\" and provide the structured requirements.\n");
    s.push_str("If the user confirms they're ready, set action to \"confirm\".\n");

    s
}

// Human-readable schema description for the prompt.
fn describe_schema(ty: &TypeDef, indent: usize) -> String {
    let pad = " ".repeat(indent);
    match ty {
        TypeDef::Object(fields) => {
            let mut s = format!("{pad}- object with fields:\n");
            for f in fields {
                let marker = if f.optional { " (optional)" } else { "" };
                s.push_str(&format!("{pad}  - {}{marker}: ", f.name));
                s.push_str(&describe_inline(&f.ty, indent + 4));
            }
            s
        }
        other => format!("{pad}- {}", describe_inline(other, indent + 2)),
    }
}

fn describe_inline(ty: &TypeDef, indent: usize) -> String {
    use TypeDef::*;

    match ty {
        Text => "string\n".to_string(),
        Bool => "boolean\n".to_string(),
        OneOf(values) => {
            let quoted: Vec<String> = values.iter().map(|v| format!("\"{v}\"")).collect();
            format!("one of {}\n", quoted.join(" | "))
        }
        Nullable(inner) => match inner.as_ref() {
            Object(_) | List(_) => format!("null or {}", describe_inline(inner, indent)),
            _ => format!("{} or null\n", describe_inline(inner, indent).trim_end()),
        },
        List(inner) => match inner.as_ref() {
            Object(_) => format!("array of:\n{}", describe_schema(inner, indent)),
            _ => format!("array of {}", describe_inline(inner, indent)),
        },
        Object(_) => format!("nested object:\n{}", describe_schema(ty, indent)),
    }
}
