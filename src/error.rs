use thiserror::Error;

use crate::cache::CacheError;

/// Failure reported by a capability adapter (reasoning engine or search).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("credit balance exhausted: {0}")]
    BillingExhausted(String),

    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("{0}")]
    Other(String),
}

impl CapabilityError {
    /// Sort a raw provider error message into the transient/fatal buckets.
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();

        if lower.contains("credit balance is too low")
            || lower.contains("billing")
            || lower.contains("insufficient credit")
            || lower.contains("quota exceeded")
        {
            return CapabilityError::BillingExhausted(message);
        }

        if lower.contains("rate limit")
            || lower.contains("rate_limit")
            || lower.contains("too many requests")
            || lower.contains("overloaded")
        {
            return CapabilityError::RateLimited(message);
        }

        CapabilityError::Other(message)
    }

    /// Classify an HTTP failure; the status code wins over the body text.
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            429 | 529 => CapabilityError::RateLimited(format!("HTTP {status}: {body}")),
            402 => CapabilityError::BillingExhausted(format!("HTTP {status}: {body}")),
            _ => CapabilityError::classify(format!("HTTP {status}: {body}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    CapabilityTransient,
    CapabilityFatal,
    CapabilityFailed,
    CapabilityUnconfigured,
    CacheUnavailable,
    TaskGraph,
    RunExhausted,
}

impl ErrorKind {
    pub fn label(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::CapabilityTransient => "capability_transient",
            ErrorKind::CapabilityFatal => "capability_fatal",
            ErrorKind::CapabilityFailed => "capability_failed",
            ErrorKind::CapabilityUnconfigured => "capability_unconfigured",
            ErrorKind::CacheUnavailable => "cache_unavailable",
            ErrorKind::TaskGraph => "task_graph",
            ErrorKind::RunExhausted => "run_exhausted",
        }
    }
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("capability rate limited: {0}")]
    CapabilityTransient(String),

    #[error("capability credits exhausted: {0}")]
    CapabilityFatal(String),

    #[error("capability call failed: {0}")]
    CapabilityFailed(String),

    #[error("capability unavailable: {0}")]
    CapabilityUnconfigured(String),

    #[error("cache unavailable: {0}")]
    CacheUnavailable(#[from] CacheError),

    #[error("task graph error: {0}")]
    TaskGraph(String),

    #[error("analysis failed after {attempts} attempts: {last}")]
    RunExhausted {
        attempts: u32,
        #[source]
        last: Box<AnalysisError>,
    },
}

impl From<CapabilityError> for AnalysisError {
    fn from(err: CapabilityError) -> Self {
        match err {
            CapabilityError::RateLimited(message) => AnalysisError::CapabilityTransient(message),
            CapabilityError::BillingExhausted(message) => AnalysisError::CapabilityFatal(message),
            CapabilityError::NotConfigured(message) => {
                AnalysisError::CapabilityUnconfigured(message)
            }
            CapabilityError::Other(message) => AnalysisError::CapabilityFailed(message),
        }
    }
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AnalysisError::InvalidInput(_) => ErrorKind::InvalidInput,
            AnalysisError::CapabilityTransient(_) => ErrorKind::CapabilityTransient,
            AnalysisError::CapabilityFatal(_) => ErrorKind::CapabilityFatal,
            AnalysisError::CapabilityFailed(_) => ErrorKind::CapabilityFailed,
            AnalysisError::CapabilityUnconfigured(_) => ErrorKind::CapabilityUnconfigured,
            AnalysisError::CacheUnavailable(_) => ErrorKind::CacheUnavailable,
            AnalysisError::TaskGraph(_) => ErrorKind::TaskGraph,
            AnalysisError::RunExhausted { .. } => ErrorKind::RunExhausted,
        }
    }

    /// Whether a whole-run retry may help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::CapabilityTransient(_) | AnalysisError::CapabilityFailed(_)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AnalysisError::CapabilityTransient(_))
    }

    /// The innermost error, looking through `RunExhausted`.
    pub fn root(&self) -> &AnalysisError {
        match self {
            AnalysisError::RunExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// Message shown to dashboard and CLI users.
    pub fn user_message(&self) -> String {
        match self.root() {
            AnalysisError::CapabilityFatal(_) => {
                "API credits depleted. Please check your Anthropic API account.".to_string()
            }
            AnalysisError::CapabilityTransient(_) => {
                "Too many requests. Please wait a few minutes and try again.".to_string()
            }
            _ => format!("Error analyzing company: {self}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Provider,
    Cache,
    Input,
    Internal,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::Provider => "PROVIDER",
            ErrorCategory::Cache => "CACHE",
            ErrorCategory::Input => "INPUT",
            ErrorCategory::Internal => "INTERNAL",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            ErrorCategory::Provider => {
                "Set ANTHROPIC_API_KEY and SERPER_API_KEY, check account credits, or run with --test-mode."
            }
            ErrorCategory::Cache => {
                "Check --cache-dir permissions or run with --no-cache."
            }
            ErrorCategory::Input => "Run hiring-analytics --help and correct command arguments.",
            ErrorCategory::Internal => {
                "Retry with RUST_LOG=debug. If it persists, capture logs and open an issue."
            }
        }
    }
}

pub fn categorize_error(err: &anyhow::Error) -> ErrorCategory {
    if let Some(analysis) = err.downcast_ref::<AnalysisError>() {
        return match analysis.root().kind() {
            ErrorKind::InvalidInput => ErrorCategory::Input,
            ErrorKind::CapabilityTransient
            | ErrorKind::CapabilityFatal
            | ErrorKind::CapabilityFailed
            | ErrorKind::CapabilityUnconfigured => ErrorCategory::Provider,
            ErrorKind::CacheUnavailable => ErrorCategory::Cache,
            ErrorKind::TaskGraph | ErrorKind::RunExhausted => ErrorCategory::Internal,
        };
    }

    let msg = format!("{err:#}").to_ascii_lowercase();

    if msg.contains("api_key") || msg.contains("provider") || msg.contains("credit") {
        return ErrorCategory::Provider;
    }

    if msg.contains("invalid value")
        || msg.contains("unknown argument")
        || msg.contains("profile")
        || msg.contains("company name")
    {
        return ErrorCategory::Input;
    }

    if msg.contains("cache") {
        return ErrorCategory::Cache;
    }

    ErrorCategory::Internal
}

pub fn format_cli_error(err: &anyhow::Error) -> String {
    let category = categorize_error(err);
    let rendered_error = match err.downcast_ref::<AnalysisError>() {
        Some(analysis) => analysis.user_message(),
        None => format!("{err:#}"),
    };
    format!(
        "[{}] {}\nHint: {}",
        category.code(),
        redact_sensitive_text(&rendered_error),
        category.hint()
    )
}

const SECRET_PREFIXES: [&str; 2] = ["sk-ant-", "sk-"];

/// Mask API-key-looking tokens that providers sometimes echo back in errors.
pub fn redact_sensitive_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    while let Some((start, prefix)) = next_secret(&text[cursor..]) {
        let start = cursor + start;
        out.push_str(&text[cursor..start]);

        let remainder = &text[start..];
        let end = remainder
            .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-' || ch == '_'))
            .unwrap_or(remainder.len());
        if end > prefix.len() {
            out.push_str(prefix);
            out.push_str("[REDACTED]");
        } else {
            out.push_str(&remainder[..end]);
        }
        cursor = start + end;
    }

    out.push_str(&text[cursor..]);
    out
}

fn next_secret(text: &str) -> Option<(usize, &'static str)> {
    SECRET_PREFIXES
        .iter()
        .filter_map(|prefix| {
            text.match_indices(prefix)
                .find(|(idx, _)| {
                    !text[..*idx]
                        .chars()
                        .next_back()
                        .is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == '-')
                })
                .map(|(idx, _)| (idx, *prefix))
        })
        .min_by_key(|(idx, prefix)| (*idx, std::cmp::Reverse(prefix.len())))
}
