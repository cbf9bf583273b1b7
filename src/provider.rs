use std::sync::Arc;

use anyhow::{Context, Result};

use crate::agents::reasoning::{AnthropicReasoning, DEFAULT_MODEL, DisconnectedReasoning, ReasoningEngine};
use crate::agents::search::{DisconnectedSearch, SearchEngine, SerperSearch};
use crate::config::RuntimeConfig;

pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const SERPER_API_KEY_ENV: &str = "SERPER_API_KEY";

/// The two outbound capabilities the orchestrator drives.
#[derive(Clone)]
pub struct Capabilities {
    pub reasoning: Arc<dyn ReasoningEngine>,
    pub search: Arc<dyn SearchEngine>,
}

impl Capabilities {
    pub fn disconnected() -> Self {
        Self {
            reasoning: Arc::new(DisconnectedReasoning),
            search: Arc::new(DisconnectedSearch),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.reasoning.model_version() != DisconnectedReasoning::MODEL_VERSION
    }
}

pub fn validate_model(model_name: &str) -> Result<()> {
    if model_name.starts_with("claude") {
        return Ok(());
    }
    Err(anyhow::anyhow!(
        "model '{}' is not an Anthropic model; expected a 'claude-*' identifier",
        model_name
    ))
}

pub fn resolve_model_name(cfg: &RuntimeConfig) -> String {
    cfg.model
        .clone()
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

/// Build live adapters from the environment. With `offline` set, missing keys
/// fall back to disconnected adapters instead of failing, so canned test-mode
/// requests keep working.
pub fn resolve_capabilities(cfg: &RuntimeConfig, offline: bool) -> Result<Capabilities> {
    let anthropic_key = read_secret(ANTHROPIC_API_KEY_ENV);
    let serper_key = read_secret(SERPER_API_KEY_ENV);

    let (Some(anthropic_key), Some(serper_key)) = (anthropic_key, serper_key) else {
        if offline {
            tracing::warn!(
                anthropic = env_present(ANTHROPIC_API_KEY_ENV),
                serper = env_present(SERPER_API_KEY_ENV),
                "API keys missing; only test-mode analyses will succeed"
            );
            return Ok(Capabilities::disconnected());
        }
        if !env_present(ANTHROPIC_API_KEY_ENV) {
            return Err(anyhow::anyhow!(
                "{ANTHROPIC_API_KEY_ENV} is required for company analysis"
            ));
        }
        return Err(anyhow::anyhow!(
            "{SERPER_API_KEY_ENV} is required for company analysis web research"
        ));
    };

    let model_name = resolve_model_name(cfg);
    validate_model(&model_name)?;

    let reasoning = AnthropicReasoning::new(
        anthropic_key,
        model_name,
        cfg.max_tokens,
        cfg.request_timeout(),
    )
    .context("failed to initialise Anthropic reasoning adapter")?;
    let search = SerperSearch::new(serper_key, cfg.search_results, cfg.request_timeout())
        .context("failed to initialise Serper search adapter")?;

    Ok(Capabilities {
        reasoning: Arc::new(reasoning),
        search: Arc::new(search),
    })
}

fn read_secret(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn env_present(key: &str) -> bool {
    std::env::var(key)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}
