use anyhow::Result;

use crate::config::{ProfilesFile, RuntimeConfig};
use crate::provider::resolve_model_name;

pub fn run_profiles_list(profiles: &ProfilesFile, cfg: &RuntimeConfig) -> Result<()> {
    let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
    if !names.iter().any(|name| name == "default") {
        names.push("default".to_string());
    }
    names.sort();

    println!("Configured profiles (active='{}'):", cfg.profile);
    for name in names {
        let marker = if name == cfg.profile { "*" } else { " " };
        let source = if profiles.profiles.contains_key(&name) {
            "configured"
        } else {
            "implicit"
        };
        println!("{marker} {name} ({source})");
    }

    Ok(())
}

pub fn run_profiles_show(cfg: &RuntimeConfig) -> Result<()> {
    println!("Active profile: {}", cfg.profile);
    println!("Config path: {}", cfg.config_path);
    println!("Model: {}", resolve_model_name(cfg));
    println!("Max tokens: {}", cfg.max_tokens);
    println!("Request timeout (secs): {}", cfg.request_timeout_secs);
    println!("Search results per query: {}", cfg.search_results);
    println!("Cache enabled: {}", cfg.cache_enabled);
    println!("Cache backend: {}", cfg.cache_backend.label());
    println!("Cache dir: {}", cfg.cache_dir);
    println!("Cache TTL (secs): {}", cfg.cache_ttl_secs);
    println!("Retry attempts: {}", cfg.retry_attempts);
    println!(
        "Retry backoff (ms): initial={} max={}",
        cfg.retry_initial_backoff_ms, cfg.retry_max_backoff_ms
    );
    println!("Rate-limit pause (ms): {}", cfg.rate_limit_pause_ms);
    println!("Cooldown (ms): {}", cfg.cooldown_ms);
    println!("Dispatch mode: {}", cfg.dispatch_mode.label());
    println!("Telemetry enabled: {}", cfg.telemetry_enabled);
    println!("Telemetry path: {}", cfg.telemetry_path);
    Ok(())
}
