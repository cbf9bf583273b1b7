use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::agents::orchestrator::OrchestratorConfig;
use crate::cli::*;
use crate::retry::RetryPolicy;

pub const DEFAULT_CACHE_DIR: &str = ".hiring-analytics/cache";
pub const DEFAULT_TELEMETRY_PATH: &str = ".hiring-analytics/telemetry/events.jsonl";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub profile: String,
    pub config_path: String,
    pub model: Option<String>,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    pub search_results: usize,
    pub cache_enabled: bool,
    pub cache_backend: CacheBackendKind,
    pub cache_dir: String,
    pub cache_ttl_secs: u64,
    pub retry_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub retry_max_backoff_ms: u64,
    pub rate_limit_pause_ms: u64,
    pub cooldown_ms: u64,
    pub dispatch_mode: DispatchMode,
    pub telemetry_enabled: bool,
    pub telemetry_path: String,
}

impl RuntimeConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts,
            initial_backoff: Duration::from_millis(self.retry_initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry_max_backoff_ms),
            rate_limit_pause: Duration::from_millis(self.rate_limit_pause_ms),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            dispatch: self.dispatch_mode,
            cooldown: Duration::from_millis(self.cooldown_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub search_results: Option<usize>,
    pub cache_enabled: Option<bool>,
    pub cache_backend: Option<CacheBackendKind>,
    pub cache_dir: Option<String>,
    pub cache_ttl_secs: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_initial_backoff_ms: Option<u64>,
    pub retry_max_backoff_ms: Option<u64>,
    pub rate_limit_pause_ms: Option<u64>,
    pub cooldown_ms: Option<u64>,
    pub dispatch_mode: Option<DispatchMode>,
    pub telemetry_enabled: Option<bool>,
    pub telemetry_path: Option<String>,
}

pub fn load_profiles(config_path: &str) -> Result<ProfilesFile> {
    let path = Path::new(config_path);
    if !path.exists() {
        return Ok(ProfilesFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile config file at '{}'", path.display()))?;
    toml::from_str::<ProfilesFile>(&content).with_context(|| {
        format!(
            "invalid profile configuration in '{}'. Check cache/dispatch values and field names.",
            path.display()
        )
    })
}

pub fn resolve_runtime_config(cli: &Cli, profiles: &ProfilesFile) -> Result<RuntimeConfig> {
    let selected = cli.profile.trim();
    if selected.is_empty() {
        return Err(anyhow::anyhow!(
            "profile name cannot be empty. Set --profile <name>."
        ));
    }

    let profile = if selected == "default" && !profiles.profiles.contains_key("default") {
        ProfileConfig::default()
    } else {
        profiles.profiles.get(selected).cloned().ok_or_else(|| {
            let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
            names.sort();
            if names.is_empty() {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. No profiles are defined yet.",
                    selected,
                    cli.config_path
                )
            } else {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. Available profiles: {}",
                    selected,
                    cli.config_path,
                    names.join(", ")
                )
            }
        })?
    };

    let cache_enabled = if cli.no_cache {
        false
    } else {
        profile.cache_enabled.unwrap_or(true)
    };

    let retry_initial_backoff_ms = cli
        .retry_initial_backoff_ms
        .or(profile.retry_initial_backoff_ms)
        .unwrap_or(4_000);

    Ok(RuntimeConfig {
        profile: selected.to_string(),
        config_path: cli.config_path.clone(),
        model: cli.model.clone().or(profile.model),
        max_tokens: cli
            .max_tokens
            .or(profile.max_tokens)
            .unwrap_or(4_096)
            .max(256),
        request_timeout_secs: cli
            .request_timeout_secs
            .or(profile.request_timeout_secs)
            .unwrap_or(120)
            .max(1),
        search_results: cli
            .search_results
            .or(profile.search_results)
            .unwrap_or(5)
            .clamp(1, 20),
        cache_enabled,
        cache_backend: cli
            .cache_backend
            .or(profile.cache_backend)
            .unwrap_or(CacheBackendKind::File),
        cache_dir: cli
            .cache_dir
            .clone()
            .or(profile.cache_dir)
            .unwrap_or_else(|| DEFAULT_CACHE_DIR.to_string()),
        cache_ttl_secs: cli
            .cache_ttl_secs
            .or(profile.cache_ttl_secs)
            .unwrap_or(DEFAULT_CACHE_TTL_SECS),
        retry_attempts: cli
            .retry_attempts
            .or(profile.retry_attempts)
            .unwrap_or(3)
            .max(1),
        retry_initial_backoff_ms,
        retry_max_backoff_ms: cli
            .retry_max_backoff_ms
            .or(profile.retry_max_backoff_ms)
            .unwrap_or(10_000)
            .max(retry_initial_backoff_ms),
        rate_limit_pause_ms: cli
            .rate_limit_pause_ms
            .or(profile.rate_limit_pause_ms)
            .unwrap_or(60_000),
        cooldown_ms: cli
            .cooldown_ms
            .or(profile.cooldown_ms)
            .unwrap_or(2_000),
        dispatch_mode: cli
            .dispatch_mode
            .or(profile.dispatch_mode)
            .unwrap_or(DispatchMode::Parallel),
        telemetry_enabled: cli
            .telemetry_enabled
            .or(profile.telemetry_enabled)
            .unwrap_or(true),
        telemetry_path: cli
            .telemetry_path
            .clone()
            .or(profile.telemetry_path)
            .unwrap_or_else(|| DEFAULT_TELEMETRY_PATH.to_string()),
    })
}
