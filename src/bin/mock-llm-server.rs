use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use clap::{Parser, ValueEnum};
use precision_builder::llm::{PromptMessage, Role};
use precision_builder::telemetry;
use serde::Deserialize;
use serde_json::{json, Value};

/// How the scripted answer is wrapped.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mode {
    /// JSON inside a ```json fence with some prose around it
    Fenced,
    /// Bare JSON
    Plain,
    /// Prose only, which the endpoint has to fall back on
    Prose,
}

#[derive(Parser)]
#[command(name = "mock-llm-server")]
#[command(about = "Scripted chat-completions upstream for local runs")]
struct Cli {
    #[arg(long, env = "MOCK_LLM_PORT", default_value = "8081")]
    port: u16,

    #[arg(long, env = "MOCK_LLM_MODE", value_enum, default_value = "fenced")]
    mode: Mode,

    /// Answer the first N requests with 429 to exercise rate-limit handling
    #[arg(long, env = "MOCK_LLM_FAIL_ATTEMPTS", default_value = "0")]
    fail_attempts: usize,
}

#[derive(Clone)]
struct MockState {
    attempt_count: Arc<AtomicUsize>,
    fail_attempts: usize,
    mode: Mode,
}

#[derive(Deserialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<PromptMessage>,
}

async fn completions(
    State(state): State<MockState>,
    Json(req): Json<CompletionRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let attempt = state.attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
    tracing::info!(attempt, model = %req.model, turns = req.messages.len(), "completion request");

    if attempt <= state.fail_attempts {
        tracing::info!("returning 429");
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({"error": {"message": "mock rate limit"}})),
        ));
    }

    let last_user = req
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    let content = scripted_answer(last_user, state.mode);
    Ok(Json(json!({
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })))
}

fn scripted_answer(last_user: &str, mode: Mode) -> String {
    let feature: String = last_user.chars().take(60).collect();
    let body = json!({
        "action": "extract",
        "message": format!("Noted: {feature}"),
        "requirements": {
            "features": [{
                "name": feature,
                "description": last_user,
                "priority": "must-have"
            }]
        },
        "changes": [format!("Added feature '{feature}'")]
    });

    match mode {
        Mode::Fenced => format!(
            "Here is what I extracted:\n```json\n{}\n```",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        ),
        Mode::Plain => body.to_string(),
        Mode::Prose => format!("I think you want something like: {last_user}"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(0);

    let state = MockState {
        attempt_count: Arc::new(AtomicUsize::new(0)),
        fail_attempts: cli.fail_attempts,
        mode: cli.mode,
    };

    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("mock LLM listening on http://{addr}/v1/chat/completions");
    tracing::info!(mode = ?cli.mode, fail_attempts = cli.fail_attempts, "scripted behaviour");

    axum::serve(listener, app).await?;
    Ok(())
}
