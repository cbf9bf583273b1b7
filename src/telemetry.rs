use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{Value, json};

use crate::config::RuntimeConfig;

fn new_run_id() -> String {
    format!("run-{}-{}", Utc::now().timestamp_millis(), std::process::id())
}

/// Append-only JSONL event log for analysis runs.
#[derive(Debug, Clone)]
pub struct TelemetrySink {
    pub enabled: bool,
    pub path: PathBuf,
    pub run_id: String,
    pub command: String,
    pub profile: String,
    pub file_lock: Arc<std::sync::Mutex<()>>,
}

impl TelemetrySink {
    pub fn new(cfg: &RuntimeConfig, command: String) -> Self {
        Self {
            enabled: cfg.telemetry_enabled,
            path: PathBuf::from(&cfg.telemetry_path),
            run_id: new_run_id(),
            command,
            profile: cfg.profile.clone(),
            file_lock: Arc::new(std::sync::Mutex::new(())),
        }
    }

    /// A sink that drops every event.
    pub fn disabled(command: impl Into<String>) -> Self {
        Self {
            enabled: false,
            path: PathBuf::new(),
            run_id: new_run_id(),
            command: command.into(),
            profile: "default".to_string(),
            file_lock: Arc::new(std::sync::Mutex::new(())),
        }
    }

    pub fn emit(&self, event: &str, payload: Value) {
        if !self.enabled {
            return;
        }

        let mut record = serde_json::Map::new();
        record.insert("ts_ms".to_string(), json!(Utc::now().timestamp_millis()));
        record.insert("event".to_string(), json!(event));
        record.insert("run_id".to_string(), json!(self.run_id));
        record.insert("command".to_string(), json!(self.command));
        record.insert("profile".to_string(), json!(self.profile));
        if let Some(fields) = payload.as_object() {
            record.extend(fields.clone());
        }

        if let Err(err) = self.append(&Value::Object(record)) {
            tracing::warn!(
                event = event,
                path = %self.path.display(),
                error = %err,
                "telemetry write failed"
            );
        }
    }

    fn append(&self, value: &Value) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create telemetry directory '{}'", parent.display())
            })?;
        }

        let _guard = self.file_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open telemetry path '{}'", self.path.display()))?;
        serde_json::to_writer(&mut file, value)
            .with_context(|| format!("failed to encode '{}' telemetry event", self.command))?;
        writeln!(file).context("failed to terminate telemetry line")
    }
}

/// Per-company tally of analysis outcomes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompanyActivity {
    pub analyses: usize,
    pub served_from_cache: usize,
    pub failures: usize,
}

/// What `telemetry report` shows: analysis health and cache effectiveness
/// over the most recent events.
#[derive(Debug, Default)]
pub struct AnalyticsDigest {
    pub lines_in_file: usize,
    pub events: usize,
    pub malformed: usize,
    pub runs: BTreeSet<String>,
    pub analyses_started: usize,
    pub analyses_completed: usize,
    pub analyses_failed: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub retried_attempts: usize,
    pub failure_kinds: BTreeMap<String, usize>,
    pub companies: BTreeMap<String, CompanyActivity>,
    pub live_latency_ms: Vec<u64>,
    pub latest_ts_ms: Option<i64>,
}

impl AnalyticsDigest {
    /// Digest the newest `limit` lines of a telemetry file.
    pub fn from_lines(lines: Vec<String>, limit: usize) -> Self {
        let mut digest = Self {
            lines_in_file: lines.len(),
            ..Self::default()
        };

        for line in lines.iter().rev().take(limit.max(1)) {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(event) => digest.absorb(&event),
                Err(_) => digest.malformed += 1,
            }
        }
        digest
    }

    fn absorb(&mut self, event: &Value) {
        self.events += 1;
        if let Some(run_id) = event.get("run_id").and_then(Value::as_str)
            && !run_id.is_empty()
        {
            self.runs.insert(run_id.to_string());
        }
        if let Some(ts) = event.get("ts_ms").and_then(Value::as_i64) {
            self.latest_ts_ms = Some(self.latest_ts_ms.map_or(ts, |seen| seen.max(ts)));
        }

        let company = event
            .get("company")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty());
        let activity = company.map(|name| self.companies.entry(name.to_string()).or_default());

        match event.get("event").and_then(Value::as_str).unwrap_or_default() {
            "analysis.started" => self.analyses_started += 1,
            "analysis.completed" => {
                self.analyses_completed += 1;
                let source = event.get("source").and_then(Value::as_str);
                if let Some(activity) = activity {
                    activity.analyses += 1;
                    if source == Some("cache") {
                        activity.served_from_cache += 1;
                    }
                }
                if source == Some("live")
                    && let Some(latency) = event.get("latency_ms").and_then(Value::as_u64)
                {
                    self.live_latency_ms.push(latency);
                }
            }
            "analysis.failed" => {
                self.analyses_failed += 1;
                if let Some(activity) = activity {
                    activity.failures += 1;
                }
                let kind = event
                    .get("kind")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown");
                *self.failure_kinds.entry(kind.to_string()).or_default() += 1;
            }
            "cache.hit" => self.cache_hits += 1,
            "cache.miss" => self.cache_misses += 1,
            "run.attempt.failed" => self.retried_attempts += 1,
            _ => {}
        }
    }

    pub fn hit_rate(&self) -> String {
        format_hit_rate(self.cache_hits, self.cache_misses)
    }

    pub fn mean_live_latency_ms(&self) -> Option<u64> {
        if self.live_latency_ms.is_empty() {
            return None;
        }
        let total: u64 = self.live_latency_ms.iter().sum();
        Some(total / self.live_latency_ms.len() as u64)
    }

    pub fn render(&self, path: &Path) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Telemetry report");
        let _ = writeln!(out, "Path: {}", path.display());
        let _ = writeln!(
            out,
            "Events: {} of {} lines ({} malformed), {} runs",
            self.events,
            self.lines_in_file,
            self.malformed,
            self.runs.len()
        );
        let _ = writeln!(
            out,
            "Analyses: started={} completed={} failed={}",
            self.analyses_started, self.analyses_completed, self.analyses_failed
        );
        let _ = writeln!(
            out,
            "Cache: hits={} misses={} hit_rate={}",
            self.cache_hits,
            self.cache_misses,
            self.hit_rate()
        );
        let _ = writeln!(out, "Retried run attempts: {}", self.retried_attempts);
        if let Some(mean) = self.mean_live_latency_ms() {
            let _ = writeln!(out, "Mean live analysis latency: {mean} ms");
        }

        if !self.failure_kinds.is_empty() {
            let _ = writeln!(out, "Failures by kind:");
            for (kind, count) in &self.failure_kinds {
                let _ = writeln!(out, "- {kind}: {count}");
            }
        }

        if !self.companies.is_empty() {
            let mut busiest = self.companies.iter().collect::<Vec<_>>();
            busiest.sort_by_key(|(name, activity)| {
                (std::cmp::Reverse(activity.analyses + activity.failures), (*name).clone())
            });
            let _ = writeln!(out, "Companies:");
            for (name, activity) in busiest.into_iter().take(10) {
                let _ = writeln!(
                    out,
                    "- {name}: analyses={} from_cache={} failed={}",
                    activity.analyses, activity.served_from_cache, activity.failures
                );
            }
        }

        if let Some(ts) = self.latest_ts_ms
            && let Some(at) = chrono::DateTime::from_timestamp_millis(ts)
        {
            let _ = writeln!(out, "Latest event: {}", at.to_rfc3339());
        }
        out
    }
}

pub fn format_hit_rate(hits: usize, misses: usize) -> String {
    let total = hits + misses;
    if total == 0 {
        return "n/a".to_string();
    }
    format!("{:.1}%", hits as f64 * 100.0 / total as f64)
}

pub fn run_telemetry_report(
    cfg: &RuntimeConfig,
    path_override: Option<String>,
    limit: usize,
) -> Result<()> {
    let path = PathBuf::from(path_override.unwrap_or_else(|| cfg.telemetry_path.clone()));
    if !path.exists() {
        println!("No telemetry recorded at '{}'.", path.display());
        return Ok(());
    }

    let file = std::fs::File::open(&path)
        .with_context(|| format!("failed to open telemetry file '{}'", path.display()))?;
    let lines = io::BufReader::new(file)
        .lines()
        .collect::<std::result::Result<Vec<String>, std::io::Error>>()
        .with_context(|| format!("failed to read telemetry file '{}'", path.display()))?;

    print!("{}", AnalyticsDigest::from_lines(lines, limit).render(&path));
    Ok(())
}
