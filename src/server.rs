use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method,
    },
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::error::Error;
use crate::extract::{extract, response_typedef};
use crate::llm::{build_prompt, CompletionModel, PromptMessage};
use crate::types::TypeDef;

pub const PARSE_REQUIREMENTS_PATH: &str = "/parse-requirements";

/// Body accepted by the extraction endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseRequest {
    pub messages: Vec<PromptMessage>,
    #[serde(default)]
    pub current_requirements: Option<Value>,
}

#[derive(Clone)]
pub struct AppState {
    model: Arc<dyn CompletionModel>,
    schema: Arc<TypeDef>,
}

impl AppState {
    pub fn new(model: Arc<dyn CompletionModel>) -> Self {
        Self {
            model,
            schema: Arc::new(response_typedef()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(PARSE_REQUIREMENTS_PATH, post(parse_requirements))
        .layer(cors())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Browser clients call the endpoint directly, so any origin is allowed.
fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([
            AUTHORIZATION,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
            CONTENT_TYPE,
        ])
}

#[tracing::instrument(skip_all)]
async fn parse_requirements(
    State(state): State<AppState>,
    payload: Result<Json<ParseRequest>, JsonRejection>,
) -> Result<Json<Value>, Error> {
    let Json(request) = payload.map_err(|e| Error::InvalidRequest(e.body_text()))?;
    tracing::debug!(
        turns = request.messages.len(),
        has_requirements = request.current_requirements.is_some(),
        "parse-requirements request"
    );

    let system = build_prompt(request.current_requirements.as_ref(), &state.schema);
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(PromptMessage::system(system));
    messages.extend(request.messages);

    let answer = state.model.complete(&messages).await?;

    let extraction = extract(&answer, &state.schema);
    if extraction.is_fallback() {
        tracing::info!("returning clarify fallback");
    }

    Ok(Json(extraction.into_body()))
}
