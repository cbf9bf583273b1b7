use std::time::Instant;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use serde_json::json;
use tracing::level_filters::LevelFilter;

use hiring_analytics::agents::tasks::TaskGraph;
use hiring_analytics::agents::time::TimeContext;
use hiring_analytics::analysis::{AnalysisOutcome, Analyzer};
use hiring_analytics::cache::{build_result_cache, fingerprint};
use hiring_analytics::cli::*;
use hiring_analytics::config::{RuntimeConfig, load_profiles, resolve_runtime_config};
use hiring_analytics::doctor::run_doctor;
use hiring_analytics::error::{categorize_error, format_cli_error};
use hiring_analytics::profiles::{run_profiles_list, run_profiles_show};
use hiring_analytics::provider::{Capabilities, resolve_capabilities, resolve_model_name};
use hiring_analytics::report::Dashboard;
use hiring_analytics::server::run_server;
use hiring_analytics::telemetry::{TelemetrySink, run_telemetry_report};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Err(err) = run_cli(cli).await {
        eprintln!("{}", format_cli_error(&err));
        tracing::error!(category = %categorize_error(&err).code(), error = %err, "command failed");
        std::process::exit(1);
    }

    Ok(())
}

async fn run_cli(cli: Cli) -> Result<()> {
    init_tracing(&cli.log_filter)?;
    let profiles = load_profiles(&cli.config_path)?;
    let cfg = resolve_runtime_config(&cli, &profiles)?;

    let Some(command) = cli.command else {
        Cli::command()
            .print_help()
            .context("failed to print help")?;
        println!();
        return Ok(());
    };

    let label = command_label(&command);
    let telemetry = TelemetrySink::new(&cfg, label.clone());
    let started_at = Instant::now();
    telemetry.emit("command.started", json!({}));

    let result = match command {
        Commands::Analyze {
            company,
            test_mode,
            format,
        } => run_analyze(&cfg, &telemetry, &company.join(" "), test_mode, format).await,
        Commands::Doctor => run_doctor(&cfg).await,
        Commands::Profiles { command } => match command {
            ProfileCommands::List => run_profiles_list(&profiles, &cfg),
            ProfileCommands::Show => run_profiles_show(&cfg),
        },
        Commands::Cache { command } => match command {
            CacheCommands::Inspect { company } => run_cache_inspect(&cfg, &company.join(" ")).await,
            CacheCommands::Clear { force } => run_cache_clear(&cfg, force).await,
        },
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { path, limit } => run_telemetry_report(&cfg, path, limit),
        },
        Commands::Server { command } => match command {
            ServerCommands::Serve { host, port } => run_server(cfg.clone(), host, port, &telemetry).await,
        },
    };

    let elapsed_ms = started_at.elapsed().as_millis() as u64;
    match &result {
        Ok(()) => telemetry.emit("command.completed", json!({ "duration_ms": elapsed_ms })),
        Err(err) => telemetry.emit(
            "command.failed",
            json!({
                "duration_ms": elapsed_ms,
                "category": categorize_error(err).code(),
            }),
        ),
    }
    result
}

async fn run_analyze(
    cfg: &RuntimeConfig,
    telemetry: &TelemetrySink,
    company: &str,
    test_mode: bool,
    format: OutputFormat,
) -> Result<()> {
    let capabilities = if test_mode {
        Capabilities::disconnected()
    } else {
        resolve_capabilities(cfg, false)?
    };
    let analyzer = Analyzer::from_config(cfg, capabilities, telemetry.clone());
    tracing::info!(
        model = analyzer.model_version(),
        cache = cfg.cache_enabled,
        dispatch = cfg.dispatch_mode.label(),
        "starting analysis"
    );

    let outcome = analyzer.analyze_detailed(company, test_mode).await?;
    match format {
        OutputFormat::Markdown => print_markdown(&outcome),
        OutputFormat::Json => print_json(&outcome)?,
    }
    Ok(())
}

fn print_markdown(outcome: &AnalysisOutcome) {
    let dashboard = Dashboard::from_report(&outcome.report);
    print!("{}", dashboard.render_markdown(&outcome.company));
    match outcome.hit_count {
        Some(hits) => println!("\n_Source: {} (hit {hits})_", outcome.source.label()),
        None => println!("\n_Source: {}_", outcome.source.label()),
    }
}

fn print_json(outcome: &AnalysisOutcome) -> Result<()> {
    let payload = json!({
        "company": outcome.company,
        "source": outcome.source,
        "report": outcome.report,
        "tasks_output": outcome.report.tasks_output(),
        "dashboard": Dashboard::from_report(&outcome.report),
        "hit_count": outcome.hit_count,
        "attempts": outcome.attempts,
    });
    let rendered =
        serde_json::to_string_pretty(&payload).context("failed to serialize analysis report")?;
    println!("{rendered}");
    Ok(())
}

async fn run_cache_inspect(cfg: &RuntimeConfig, company: &str) -> Result<()> {
    let company = company.trim();
    let graph = TaskGraph::for_company(company)?;
    let model = resolve_model_name(cfg);
    let key = fingerprint(company, &graph.descriptions(), &model, &TimeContext::now());
    let cache = build_result_cache(cfg);

    println!("Company: {company}");
    println!("Model: {model}");
    println!("Backend: {}", cache.backend_name());
    println!("Key: {key}");
    match cache.peek(&key).await? {
        Some(meta) => {
            println!("Created: {}", meta.timestamp.to_rfc3339());
            println!("TTL (secs): {}", meta.ttl_seconds);
            println!("Hit count: {}", meta.hit_count);
        }
        None => println!("No cached analysis for today."),
    }
    Ok(())
}

async fn run_cache_clear(cfg: &RuntimeConfig, force: bool) -> Result<()> {
    if !force {
        return Err(anyhow::anyhow!(
            "refusing to clear the {} cache at '{}' without --force",
            cfg.cache_backend.label(),
            cfg.cache_dir
        ));
    }
    let removed = build_result_cache(cfg).clear().await?;
    println!("Removed {removed} cached analyses.");
    Ok(())
}

fn init_tracing(log_filter: &str) -> Result<()> {
    let level = log_filter
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_env_filter(log_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {e}"))
}
