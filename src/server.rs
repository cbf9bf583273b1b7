use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::analysis::{Analyzer, ReportSource};
use crate::config::RuntimeConfig;
use crate::error::{AnalysisError, redact_sensitive_text};
use crate::normalizer::{AnalysisReport, TaskOutput};
use crate::provider::resolve_capabilities;
use crate::report::Dashboard;
use crate::telemetry::TelemetrySink;

pub const SERVER_AUTH_TOKEN_ENV: &str = "HIRING_ANALYTICS_SERVER_AUTH_TOKEN";

#[derive(Clone)]
pub struct ServerState {
    pub cfg: RuntimeConfig,
    pub analyzer: Arc<Analyzer>,
    pub telemetry: TelemetrySink,
    pub auth_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ServerHealthResponse {
    pub status: &'static str,
    pub profile: String,
    pub model: String,
    pub cache_enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ServerAnalyzeRequest {
    pub company: String,
    #[serde(default)]
    pub test_mode: bool,
}

#[derive(Debug, Serialize)]
pub struct ServerAnalyzeResponse {
    pub company: String,
    pub source: ReportSource,
    pub report: AnalysisReport,
    pub tasks_output: Vec<TaskOutput>,
    pub dashboard: Dashboard,
}

pub type ApiError = (StatusCode, Json<Value>);
pub type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(json!({ "error": message.into() })))
}

/// 429 covers both rate limiting and a spent retry budget; 503 means the
/// server was started without live capabilities.
pub fn analysis_status(err: &AnalysisError) -> StatusCode {
    if matches!(err, AnalysisError::RunExhausted { .. }) {
        return StatusCode::TOO_MANY_REQUESTS;
    }
    match err {
        AnalysisError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        AnalysisError::CapabilityFatal(_) => StatusCode::PAYMENT_REQUIRED,
        AnalysisError::CapabilityTransient(_) => StatusCode::TOO_MANY_REQUESTS,
        AnalysisError::CapabilityUnconfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn analysis_api_error(err: &AnalysisError) -> ApiError {
    let status = analysis_status(err);
    let message = match err {
        AnalysisError::InvalidInput(_) => err.to_string(),
        _ => err.user_message(),
    };
    api_error(status, redact_sensitive_text(&message))
}

pub fn check_server_auth(
    state: &ServerState,
    headers: &axum::http::HeaderMap,
) -> Result<(), ApiError> {
    let Some(expected_token) = state.auth_token.as_deref() else {
        return Ok(());
    };

    let header_value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let provided_token = header_value
        .strip_prefix("Bearer ")
        .unwrap_or_default()
        .trim();

    if provided_token.is_empty() || provided_token != expected_token {
        return Err(api_error(
            StatusCode::UNAUTHORIZED,
            "missing or invalid Authorization bearer token",
        ));
    }

    Ok(())
}

pub async fn handle_server_health(
    State(state): State<Arc<ServerState>>,
) -> Json<ServerHealthResponse> {
    Json(ServerHealthResponse {
        status: "ok",
        profile: state.cfg.profile.clone(),
        model: state.analyzer.model_version().to_string(),
        cache_enabled: state.analyzer.settings().cache_enabled,
    })
}

pub async fn handle_server_analyze(
    State(state): State<Arc<ServerState>>,
    headers: axum::http::HeaderMap,
    Json(request): Json<ServerAnalyzeRequest>,
) -> ApiResult<ServerAnalyzeResponse> {
    check_server_auth(&state, &headers)?;
    let started_at = Instant::now();

    let company = request.company.trim().to_string();
    if company.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "company cannot be empty for /v1/analyze",
        ));
    }

    let outcome = match state
        .analyzer
        .analyze_detailed(&company, request.test_mode)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            let response = analysis_api_error(&err);
            state.telemetry.emit(
                "server.analyze.failed",
                json!({
                    "company": company,
                    "status": response.0.as_u16(),
                    "kind": err.kind().label(),
                }),
            );
            return Err(response);
        }
    };

    state.telemetry.emit(
        "server.analyze.completed",
        json!({
            "company": company,
            "source": outcome.source.label(),
            "test_mode": request.test_mode,
            "latency_ms": started_at.elapsed().as_millis() as u64,
        }),
    );

    Ok(Json(ServerAnalyzeResponse {
        company: outcome.company,
        source: outcome.source,
        tasks_output: outcome.report.tasks_output(),
        dashboard: Dashboard::from_report(&outcome.report),
        report: outcome.report,
    }))
}

pub fn build_server_router(state: Arc<ServerState>) -> AxumRouter {
    AxumRouter::new()
        .route("/healthz", get(handle_server_health))
        .route("/v1/analyze", post(handle_server_analyze))
        .with_state(state)
}

pub async fn run_server(
    cfg: RuntimeConfig,
    host: String,
    port: u16,
    telemetry: &TelemetrySink,
) -> Result<()> {
    let addr = format!("{host}:{port}")
        .parse::<SocketAddr>()
        .with_context(|| format!("invalid server bind address '{}:{}'", host, port))?;

    let capabilities = resolve_capabilities(&cfg, true)?;
    let connected = capabilities.is_connected();
    let analyzer = Arc::new(Analyzer::from_config(&cfg, capabilities, telemetry.clone()));
    let model = analyzer.model_version().to_string();

    let state = Arc::new(ServerState {
        cfg: cfg.clone(),
        analyzer,
        telemetry: telemetry.clone(),
        auth_token: std::env::var(SERVER_AUTH_TOKEN_ENV)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()),
    });

    telemetry.emit(
        "server.started",
        json!({
            "host": host,
            "port": port,
            "profile": cfg.profile,
            "model": model,
            "connected": connected,
            "cache_enabled": cfg.cache_enabled,
            "cache_backend": cfg.cache_backend.label(),
            "auth": state.auth_token.is_some(),
        }),
    );

    println!(
        "Server mode listening on http://{} (health: /healthz, analyze: /v1/analyze)",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("failed to bind server listener")?;
    axum::serve(listener, build_server_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server runtime failed")
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { println!("\nReceived Ctrl+C, shutting down gracefully..."); }
        _ = terminate => { println!("\nReceived SIGTERM, shutting down gracefully..."); }
    }
}
