/// Search capability - web search via the Serper API, returned as snippets.
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CapabilityError;

pub const SERPER_SEARCH_URL: &str = "https://google.serper.dev/search";

#[async_trait]
pub trait SearchEngine: Send + Sync {
    async fn search(&self, query: &str) -> Result<String, CapabilityError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    #[serde(rename = "link")]
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBundle {
    pub query: String,
    pub results: Vec<SearchResult>,
}

impl EvidenceBundle {
    /// Plain-text rendering handed to the reasoning engine.
    pub fn to_snippets(&self) -> String {
        if self.results.is_empty() {
            return format!("No search results for '{}'.", self.query);
        }

        let mut out = format!("Search results for '{}':\n", self.query);
        for (idx, result) in self.results.iter().enumerate() {
            out.push_str(&format!(
                "{}. {} ({})\n   {}\n",
                idx + 1,
                result.title,
                result.url,
                result.snippet.trim()
            ));
        }
        out.trim_end().to_string()
    }
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SearchResult>,
}

#[derive(Debug, Clone)]
pub struct SerperSearch {
    client: reqwest::Client,
    api_key: String,
    max_results: usize,
    endpoint: String,
}

impl SerperSearch {
    pub fn new(api_key: String, max_results: usize, timeout: Duration) -> Result<Self, CapabilityError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| CapabilityError::Other(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            api_key,
            max_results: max_results.max(1),
            endpoint: SERPER_SEARCH_URL.to_string(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SearchEngine for SerperSearch {
    async fn search(&self, query: &str) -> Result<String, CapabilityError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-API-KEY", &self.api_key)
            .json(&json!({ "q": query, "num": self.max_results }))
            .send()
            .await
            .map_err(|err| CapabilityError::classify(format!("search request failed: {err}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| CapabilityError::classify(format!("search response unreadable: {err}")))?;
        if !status.is_success() {
            return Err(CapabilityError::from_status(status.as_u16(), &text));
        }

        let parsed: SerperResponse = serde_json::from_str(&text)
            .map_err(|err| CapabilityError::Other(format!("invalid search response: {err}")))?;
        let bundle = EvidenceBundle {
            query: query.to_string(),
            results: parsed.organic.into_iter().take(self.max_results).collect(),
        };
        Ok(bundle.to_snippets())
    }
}

/// Stand-in used when live capabilities are not configured (test mode).
#[derive(Debug, Clone, Default)]
pub struct DisconnectedSearch;

#[async_trait]
impl SearchEngine for DisconnectedSearch {
    async fn search(&self, _query: &str) -> Result<String, CapabilityError> {
        Err(CapabilityError::NotConfigured(
            "search capability is not configured; set SERPER_API_KEY".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serper_organic_results_render_as_numbered_snippets() {
        let parsed: SerperResponse = serde_json::from_value(json!({
            "organic": [
                { "title": "Acme Q3", "link": "https://news.example/acme", "snippet": " Revenue up 12% " },
                { "title": "Acme jobs", "link": "https://jobs.example/acme" }
            ]
        }))
        .expect("response should parse");
        let bundle = EvidenceBundle {
            query: "Acme revenue".to_string(),
            results: parsed.organic,
        };

        let text = bundle.to_snippets();
        assert!(text.starts_with("Search results for 'Acme revenue':"));
        assert!(text.contains("1. Acme Q3 (https://news.example/acme)\n   Revenue up 12%"));
        assert!(text.contains("2. Acme jobs (https://jobs.example/acme)"));
    }

    #[test]
    fn empty_bundle_says_so() {
        let bundle = EvidenceBundle {
            query: "nothing".to_string(),
            results: Vec::new(),
        };
        assert_eq!(bundle.to_snippets(), "No search results for 'nothing'.");
    }
}
