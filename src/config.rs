use std::net::SocketAddr;

use clap::Parser;

use crate::llm::LlmClient;

pub const DEFAULT_LLM_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Configuration of the extraction endpoint server.
#[derive(Debug, Clone, Parser)]
#[command(name = "precision-builder")]
#[command(about = "Requirement extraction endpoint for the precision product builder")]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8787")]
    pub bind: SocketAddr,

    /// Chat-completions URL of the upstream model service
    #[arg(long, env = "LLM_BASE_URL", default_value = DEFAULT_LLM_URL)]
    pub llm_base_url: String,

    /// Model identifier sent upstream
    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Sampling temperature; kept low for repeatable output
    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.1)]
    pub temperature: f32,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Upstream credential. Only read from the environment; requests fail while unset.
    #[arg(skip = std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()))]
    pub api_key: Option<String>,
}

impl ServerConfig {
    pub fn llm_client(&self) -> LlmClient {
        LlmClient::new(&self.llm_base_url, &self.model, self.api_key.clone())
            .with_temperature(self.temperature)
    }
}
