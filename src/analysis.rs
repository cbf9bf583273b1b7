/// Analyzer - the inbound entry point.
///
/// Validates the request, consults the result cache, runs the orchestrator
/// under the whole-run retry policy, stores fresh results and normalizes
/// everything into the two-bucket report.
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use serde::Serialize;
use serde_json::json;

use crate::agents::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::agents::tasks::{TaskGraph, TaskId, TaskResult};
use crate::agents::time::TimeContext;
use crate::agents::{AgentProfile, default_agents};
use crate::cache::{ResultCache, build_result_cache, fingerprint};
use crate::config::RuntimeConfig;
use crate::error::AnalysisError;
use crate::normalizer::{AnalysisReport, normalize};
use crate::provider::Capabilities;
use crate::retry::RetryPolicy;
use crate::telemetry::TelemetrySink;

#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub cache_enabled: bool,
    pub retry: RetryPolicy,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSource {
    Canned,
    Cache,
    Live,
}

impl ReportSource {
    pub fn label(self) -> &'static str {
        match self {
            ReportSource::Canned => "canned",
            ReportSource::Cache => "cache",
            ReportSource::Live => "live",
        }
    }
}

/// A report plus how it was produced.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub company: String,
    pub report: AnalysisReport,
    pub source: ReportSource,
    pub cache_key: Option<String>,
    /// Hit count observed by the read that served this report.
    pub hit_count: Option<u64>,
    pub attempts: u32,
    pub elapsed_ms: u64,
}

pub struct Analyzer {
    orchestrator: Orchestrator,
    agents: Vec<AgentProfile>,
    cache: Option<ResultCache>,
    settings: AnalyzerSettings,
    telemetry: TelemetrySink,
}

impl Analyzer {
    pub fn new(
        capabilities: Capabilities,
        orchestrator_config: OrchestratorConfig,
        cache: Option<ResultCache>,
        settings: AnalyzerSettings,
        telemetry: TelemetrySink,
    ) -> Self {
        Self {
            orchestrator: Orchestrator::new(
                capabilities.reasoning,
                capabilities.search,
                orchestrator_config,
            ),
            agents: default_agents(),
            cache,
            settings,
            telemetry,
        }
    }

    pub fn from_config(
        cfg: &RuntimeConfig,
        capabilities: Capabilities,
        telemetry: TelemetrySink,
    ) -> Self {
        let cache = cfg.cache_enabled.then(|| build_result_cache(cfg));
        Self::new(
            capabilities,
            cfg.orchestrator_config(),
            cache,
            AnalyzerSettings {
                cache_enabled: cfg.cache_enabled,
                retry: cfg.retry_policy(),
            },
            telemetry,
        )
    }

    pub fn with_agents(mut self, agents: Vec<AgentProfile>) -> Self {
        self.agents = agents;
        self
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    pub fn model_version(&self) -> &str {
        self.orchestrator.model_version()
    }

    /// Cache key the analyzer would use for `company_name` right now.
    pub fn cache_key(&self, company_name: &str, graph: &TaskGraph, time: &TimeContext) -> String {
        fingerprint(
            company_name,
            &graph.descriptions(),
            self.model_version(),
            time,
        )
    }

    pub async fn analyze(
        &self,
        company_name: &str,
        test_mode: bool,
    ) -> Result<AnalysisReport, AnalysisError> {
        self.analyze_detailed(company_name, test_mode)
            .await
            .map(|outcome| outcome.report)
    }

    pub async fn analyze_detailed(
        &self,
        company_name: &str,
        test_mode: bool,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let company = company_name.trim();
        if company.is_empty() {
            return Err(AnalysisError::InvalidInput(
                "company name cannot be empty".to_string(),
            ));
        }

        let started_at = Instant::now();
        if test_mode {
            tracing::info!(company = company, "serving canned test-mode report");
            return Ok(AnalysisOutcome {
                company: company.to_string(),
                report: canned_report(),
                source: ReportSource::Canned,
                cache_key: None,
                hit_count: None,
                attempts: 0,
                elapsed_ms: 0,
            });
        }

        self.telemetry.emit(
            "analysis.started",
            json!({
                "company": company,
                "model": self.model_version(),
                "cache_enabled": self.cache_enabled(),
            }),
        );

        let result = self.run_analysis(company, started_at).await;
        match &result {
            Ok(outcome) => self.telemetry.emit(
                "analysis.completed",
                json!({
                    "company": company,
                    "source": outcome.source.label(),
                    "attempts": outcome.attempts,
                    "latency_ms": outcome.elapsed_ms,
                }),
            ),
            Err(err) => self.telemetry.emit(
                "analysis.failed",
                json!({
                    "company": company,
                    "kind": err.kind().label(),
                    "error": crate::error::redact_sensitive_text(&err.to_string()),
                    "latency_ms": started_at.elapsed().as_millis() as u64,
                }),
            ),
        }
        result
    }

    fn cache_enabled(&self) -> bool {
        self.settings.cache_enabled && self.cache.is_some()
    }

    async fn run_analysis(
        &self,
        company: &str,
        started_at: Instant,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        let graph = TaskGraph::for_company(company)?;
        let time = TimeContext::now();

        let cache = self.cache.as_ref().filter(|_| self.settings.cache_enabled);
        let cache_key = cache.map(|_| self.cache_key(company, &graph, &time));

        if let (Some(cache), Some(key)) = (cache, cache_key.as_deref()) {
            if let Some(entry) = cache.lookup(key).await {
                tracing::info!(
                    company = company,
                    key = key,
                    hit_count = entry.metadata.hit_count,
                    "cache hit"
                );
                self.telemetry.emit(
                    "cache.hit",
                    json!({
                        "company": company,
                        "backend": cache.backend_name(),
                        "hit_count": entry.metadata.hit_count,
                    }),
                );
                return Ok(AnalysisOutcome {
                    company: company.to_string(),
                    report: normalize(&entry.payload),
                    source: ReportSource::Cache,
                    cache_key: Some(entry.key),
                    hit_count: Some(entry.metadata.hit_count),
                    attempts: 0,
                    elapsed_ms: started_at.elapsed().as_millis() as u64,
                });
            }
            self.telemetry.emit(
                "cache.miss",
                json!({ "company": company, "backend": cache.backend_name() }),
            );
        }

        let attempts = AtomicU32::new(0);
        let attempt_counter = &attempts;
        let orchestrator = &self.orchestrator;
        let agents = self.agents.as_slice();
        let graph_ref = &graph;
        let telemetry = &self.telemetry;

        let results = self
            .settings
            .retry
            .run(move |attempt| async move {
                attempt_counter.store(attempt, Ordering::SeqCst);
                let outcome = orchestrator.run(agents, graph_ref).await;
                if let Err(err) = &outcome {
                    telemetry.emit(
                        "run.attempt.failed",
                        json!({
                            "company": company,
                            "attempt": attempt,
                            "kind": err.kind().label(),
                            "retryable": err.is_retryable(),
                        }),
                    );
                }
                outcome
            })
            .await?;

        if let (Some(cache), Some(key)) = (cache, cache_key.as_deref()) {
            cache.store(key, &results).await;
        }

        Ok(AnalysisOutcome {
            company: company.to_string(),
            report: normalize(&results),
            source: ReportSource::Live,
            cache_key,
            hit_count: None,
            attempts: attempts.load(Ordering::SeqCst),
            elapsed_ms: started_at.elapsed().as_millis() as u64,
        })
    }
}

/// Fixed task output served in test mode. Deterministic and I/O free.
pub fn canned_results() -> Vec<TaskResult> {
    vec![
        TaskResult::success(
            TaskId::Financial,
            "Financial Metrics:\n\
             - Revenue: $4.2B latest quarter, up 12% year over year\n\
             - Profit Margins: 18% operating margin\n\
             - Market Cap: $85B\n\
             - Cash Position: $6.1B",
        ),
        TaskResult::success(
            TaskId::Hiring,
            "Hiring Metrics:\n\
             - Active Openings: 340 open roles\n\
             - Key Departments: Engineering, Sales, Customer Success\n\
             - Growth Areas: Machine learning, cloud infrastructure\n\
             - Locations: Austin, Dublin, Singapore",
        ),
        TaskResult::success(
            TaskId::Growth,
            "Growth Indicators:\n\
             - Employee Growth: 9% headcount growth this year\n\
             - Expansion Plans: Second EU data center planned\n\
             - Investments: $500M committed to R&D\n\
             - Future Outlook: Continued expansion in enterprise segment",
        ),
        TaskResult::success(
            TaskId::Market,
            "Market Position:\n\
             Competitors:\n\
             - Globex Corporation\n\
             - Initech\n\
             Market Share:\n\
             - 14% of the mid-market segment\n\
             Industry Trends:\n\
             - Consolidation among mid-size vendors\n\
             - Rising demand for AI-assisted tooling\n\
             Challenges:\n\
             - Pricing pressure from larger incumbents",
        ),
    ]
}

pub fn canned_report() -> AnalysisReport {
    normalize(&canned_results())
}
