use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    Memory,
    File,
}

impl CacheBackendKind {
    pub fn label(self) -> &'static str {
        match self {
            CacheBackendKind::Memory => "memory",
            CacheBackendKind::File => "file",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Parallel,
    Sequential,
}

impl DispatchMode {
    pub fn label(self) -> &'static str {
        match self {
            DispatchMode::Parallel => "parallel",
            DispatchMode::Sequential => "sequential",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum ProfileCommands {
    #[command(about = "List configured profiles and highlight the active profile")]
    List,
    #[command(about = "Show the active profile's resolved runtime settings")]
    Show,
}

#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    #[command(about = "Show today's cache entry metadata for a company")]
    Inspect {
        #[arg(required = true)]
        company: Vec<String>,
    },
    #[command(about = "Remove every cached analysis (requires --force)")]
    Clear {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum TelemetryCommands {
    #[command(about = "Summarize telemetry events from a JSONL stream")]
    Report {
        #[arg(long)]
        path: Option<String>,
        #[arg(long, default_value_t = 5000)]
        limit: usize,
    },
}

#[derive(Debug, Subcommand)]
pub enum ServerCommands {
    #[command(about = "Run HTTP server mode for health and analysis endpoints")]
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 8787)]
        port: u16,
    },
}

const CLI_EXAMPLES: &str = "Examples:\n\
  hiring-analytics analyze \"Acme Corp\"\n\
  hiring-analytics analyze \"Acme Corp\" --format json\n\
  hiring-analytics analyze \"Acme Corp\" --test-mode\n\
  hiring-analytics --cache-backend file --cache-ttl-secs 3600 analyze Globex\n\
  hiring-analytics --no-cache --dispatch-mode sequential analyze Initech\n\
  hiring-analytics cache inspect \"Acme Corp\"\n\
  hiring-analytics cache clear --force\n\
  hiring-analytics profiles show\n\
  hiring-analytics server serve --host 127.0.0.1 --port 8787\n\
  hiring-analytics telemetry report --limit 2000\n\
\n\
Secrets:\n\
  - ANTHROPIC_API_KEY is required for reasoning, SERPER_API_KEY for web search.\n\
  - --test-mode returns a canned report and needs neither.";

#[derive(Debug, Parser)]
#[command(name = "hiring-analytics")]
#[command(about = "Multi-agent company hiring analysis with cached results")]
#[command(after_long_help = CLI_EXAMPLES)]
pub struct Cli {
    #[arg(long, env = "HIRING_ANALYTICS_MODEL")]
    pub model: Option<String>,

    #[arg(long, env = "HIRING_ANALYTICS_PROFILE", default_value = "default")]
    pub profile: String,

    #[arg(
        long,
        env = "HIRING_ANALYTICS_CONFIG",
        default_value = ".hiring-analytics/config.toml"
    )]
    pub config_path: String,

    #[arg(long, env = "HIRING_ANALYTICS_MAX_TOKENS")]
    pub max_tokens: Option<u32>,

    #[arg(long, env = "HIRING_ANALYTICS_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    #[arg(long, env = "HIRING_ANALYTICS_SEARCH_RESULTS")]
    pub search_results: Option<usize>,

    #[arg(long, env = "HIRING_ANALYTICS_NO_CACHE", default_value_t = false)]
    pub no_cache: bool,

    #[arg(long, env = "HIRING_ANALYTICS_CACHE_BACKEND", value_enum)]
    pub cache_backend: Option<CacheBackendKind>,

    #[arg(long, env = "HIRING_ANALYTICS_CACHE_DIR")]
    pub cache_dir: Option<String>,

    #[arg(long, env = "HIRING_ANALYTICS_CACHE_TTL_SECS")]
    pub cache_ttl_secs: Option<u64>,

    #[arg(long, env = "HIRING_ANALYTICS_RETRY_ATTEMPTS")]
    pub retry_attempts: Option<u32>,

    #[arg(long, env = "HIRING_ANALYTICS_RETRY_INITIAL_BACKOFF_MS")]
    pub retry_initial_backoff_ms: Option<u64>,

    #[arg(long, env = "HIRING_ANALYTICS_RETRY_MAX_BACKOFF_MS")]
    pub retry_max_backoff_ms: Option<u64>,

    #[arg(long, env = "HIRING_ANALYTICS_RATE_LIMIT_PAUSE_MS")]
    pub rate_limit_pause_ms: Option<u64>,

    #[arg(long, env = "HIRING_ANALYTICS_COOLDOWN_MS")]
    pub cooldown_ms: Option<u64>,

    #[arg(long, env = "HIRING_ANALYTICS_DISPATCH_MODE", value_enum)]
    pub dispatch_mode: Option<DispatchMode>,

    #[arg(long, env = "HIRING_ANALYTICS_TELEMETRY_ENABLED", action = clap::ArgAction::Set)]
    pub telemetry_enabled: Option<bool>,

    #[arg(long, env = "HIRING_ANALYTICS_TELEMETRY_PATH")]
    pub telemetry_path: Option<String>,

    #[arg(long, env = "RUST_LOG", default_value = "error")]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Analyze a company's finances, hiring, growth and market position")]
    Analyze {
        #[arg(required = true)]
        company: Vec<String>,
        #[arg(long, default_value_t = false)]
        test_mode: bool,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
    },
    #[command(about = "Validate API credentials and cache configuration")]
    Doctor,
    #[command(about = "Inspect profile configuration and active resolved profile state")]
    Profiles {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    #[command(about = "Inspect or clear cached analyses")]
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
    #[command(about = "Telemetry utilities and reporting")]
    Telemetry {
        #[command(subcommand)]
        command: TelemetryCommands,
    },
    #[command(about = "Server mode for the analysis API")]
    Server {
        #[command(subcommand)]
        command: ServerCommands,
    },
}

pub fn command_label(command: &Commands) -> String {
    match command {
        Commands::Analyze { .. } => "analyze".to_string(),
        Commands::Doctor => "doctor".to_string(),
        Commands::Profiles { command } => match command {
            ProfileCommands::List => "profiles.list".to_string(),
            ProfileCommands::Show => "profiles.show".to_string(),
        },
        Commands::Cache { command } => match command {
            CacheCommands::Inspect { .. } => "cache.inspect".to_string(),
            CacheCommands::Clear { .. } => "cache.clear".to_string(),
        },
        Commands::Telemetry { command } => match command {
            TelemetryCommands::Report { .. } => "telemetry.report".to_string(),
        },
        Commands::Server { command } => match command {
            ServerCommands::Serve { .. } => "server.serve".to_string(),
        },
    }
}
