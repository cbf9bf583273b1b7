use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::CacheBackendKind;
use crate::config::RuntimeConfig;
use crate::provider::{ANTHROPIC_API_KEY_ENV, SERPER_API_KEY_ENV, env_present, resolve_model_name, validate_model};
use crate::server::SERVER_AUTH_TOKEN_ENV;

pub async fn run_doctor(cfg: &RuntimeConfig) -> Result<()> {
    println!(
        "Active profile: '{}' (config: {})",
        cfg.profile, cfg.config_path
    );

    let checks = [
        (ANTHROPIC_API_KEY_ENV, env_present(ANTHROPIC_API_KEY_ENV)),
        (SERPER_API_KEY_ENV, env_present(SERPER_API_KEY_ENV)),
        (SERVER_AUTH_TOKEN_ENV, env_present(SERVER_AUTH_TOKEN_ENV)),
    ];

    println!("Environment check:");
    for (key, ok) in checks {
        let status = if ok { "set" } else { "missing" };
        println!("- {key}: {status}");
    }
    if !env_present(ANTHROPIC_API_KEY_ENV) || !env_present(SERPER_API_KEY_ENV) {
        println!("Tip: export both API keys, or run `analyze --test-mode` for canned output");
    }

    let model = resolve_model_name(cfg);
    match validate_model(&model) {
        Ok(()) => println!("Model: {model}"),
        Err(err) => println!("Model: {model} (warning: {err})"),
    }

    println!(
        "Orchestration: dispatch={} cooldown_ms={} retry_attempts={} backoff_ms={}..{} rate_limit_pause_ms={}",
        cfg.dispatch_mode.label(),
        cfg.cooldown_ms,
        cfg.retry_attempts,
        cfg.retry_initial_backoff_ms,
        cfg.retry_max_backoff_ms,
        cfg.rate_limit_pause_ms
    );
    println!(
        "Cache: enabled={} backend={} ttl_secs={}",
        cfg.cache_enabled,
        cfg.cache_backend.label(),
        cfg.cache_ttl_secs
    );

    if cfg.cache_enabled && cfg.cache_backend == CacheBackendKind::File {
        check_cache_dir(Path::new(&cfg.cache_dir)).await?;
        println!("Cache directory check: ok ({})", cfg.cache_dir);
    }

    println!(
        "Telemetry: enabled={} path={}",
        cfg.telemetry_enabled, cfg.telemetry_path
    );

    Ok(())
}

/// Create the cache directory if needed and prove it is writable.
pub async fn check_cache_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create cache directory '{}'", dir.display()))?;
    let marker = dir.join(".doctor-write-check");
    tokio::fs::write(&marker, b"ok")
        .await
        .with_context(|| format!("cache directory '{}' is not writable", dir.display()))?;
    tokio::fs::remove_file(&marker)
        .await
        .with_context(|| format!("failed to remove cache write marker '{}'", marker.display()))?;
    Ok(())
}
