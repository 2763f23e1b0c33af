//! Errors of the extraction endpoint and their HTTP mapping.
//!
//! Every error leaves the service as `{"error": "..."}`. Rate and usage limits
//! keep their upstream status so clients can tell them apart; everything else
//! is a 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("LLM_API_KEY is not configured")]
    MissingCredential,

    #[error("Rate limit exceeded. Please try again.")]
    RateLimited,

    #[error("Usage limit reached. Please add credits.")]
    UsageLimit,

    #[error("AI service error (status {status})")]
    Upstream { status: u16, body: String },

    #[error("AI service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid request body: {0}")]
    InvalidRequest(String),
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Error::UsageLimit => StatusCode::PAYMENT_REQUIRED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Configuration and upstream details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Error::MissingCredential => "AI service is not configured".to_string(),
            Error::Upstream { .. } => "AI service error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::MissingCredential => tracing::error!("{self}"),
            Error::Upstream { status, body } => {
                tracing::error!(status, body = %body, "AI gateway error")
            }
            Error::RateLimited | Error::UsageLimit => tracing::warn!("{self}"),
            _ => tracing::error!(error = %self, "parse-requirements failed"),
        }

        let body = ErrorBody {
            error: self.public_message(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}
