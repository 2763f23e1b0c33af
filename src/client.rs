use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ErrorBody;
use crate::extract::ExtractionResponse;
use crate::llm::PromptMessage;
use crate::requirements::Requirements;

/// What the chat client sends for every turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionRequest {
    pub messages: Vec<PromptMessage>,
    pub current_requirements: Option<Requirements>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("extraction endpoint returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request to extraction endpoint failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("extraction request aborted: {0}")]
    Aborted(String),
}

impl TransportError {
    /// HTTP status of the endpoint reply, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Http(e) => e.status().map(|s| s.as_u16()),
            TransportError::Timeout(_) | TransportError::Aborted(_) => None,
        }
    }
}

/// The extraction endpoint as seen from the chat client.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    async fn parse_requirements(
        &self,
        request: ExtractionRequest,
    ) -> Result<ExtractionResponse, TransportError>;
}

/// Calls a remote extraction endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    url: String,
    timeout: Option<Duration>,
}

impl HttpBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call(&self, request: &ExtractionRequest) -> Result<ExtractionResponse, TransportError> {
        let resp = self.http.post(&self.url).json(request).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&text)
                .map(|body| body.error)
                .unwrap_or(text);
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl ExtractionBackend for HttpBackend {
    async fn parse_requirements(
        &self,
        request: ExtractionRequest,
    ) -> Result<ExtractionResponse, TransportError> {
        match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.call(&request))
                .await
                .map_err(|_| TransportError::Timeout(timeout))?,
            None => self.call(&request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_missing_requirements_as_null() {
        let request = ExtractionRequest {
            messages: vec![],
            current_requirements: None,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"messages": [], "currentRequirements": null})
        );
    }

    #[test]
    fn status_is_exposed_for_endpoint_errors() {
        let err = TransportError::Status {
            status: 429,
            message: "slow down".into(),
        };
        assert_eq!(err.status(), Some(429));
        assert_eq!(TransportError::Timeout(Duration::from_secs(1)).status(), None);
    }
}
