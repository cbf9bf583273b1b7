/// Analysis agents and the capabilities they call.
///
/// **Capability adapters** (external black boxes):
/// - `reasoning`: prompt in, text out (Anthropic Messages API)
/// - `search`: query in, snippets out (Serper web search)
///
/// **Workflow**:
/// - `tasks`: the fixed task graph (three analyses feeding one synthesis)
/// - `orchestrator`: hierarchical execution of the graph
/// - `time`: run date used for cache fingerprints
use serde::{Deserialize, Serialize};

pub mod orchestrator;
pub mod reasoning;
pub mod search;
pub mod tasks;
pub mod time;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    WebSearch,
}

/// Role binding for one reasoning-engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub capabilities: Vec<Capability>,
}

impl AgentProfile {
    pub fn new(role: &str, goal: &str, backstory: &str) -> Self {
        Self {
            role: role.to_string(),
            goal: goal.to_string(),
            backstory: backstory.to_string(),
            capabilities: vec![Capability::WebSearch],
        }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// System-prompt framing for the reasoning engine.
    pub fn role_context(&self) -> String {
        format!(
            "You are a {}.\nGoal: {}\nBackground: {}",
            self.role, self.goal, self.backstory
        )
    }
}

/// The four fixed profiles, in the same order as `tasks::build_tasks`.
pub fn default_agents() -> Vec<AgentProfile> {
    vec![
        AgentProfile::new(
            "Financial Analyst",
            "Track company financial health and stability indicators",
            "Expert financial analyst specializing in company health assessment through public \
             financial data and market indicators.",
        ),
        AgentProfile::new(
            "Hiring Trends Analyst",
            "Monitor and analyze company hiring patterns and job postings",
            "Recruitment analytics specialist focused on identifying hiring trends, growth areas, \
             and organizational priorities through job posting analysis.",
        ),
        AgentProfile::new(
            "Growth Metrics Analyst",
            "Analyze company growth through employee trends and expansions",
            "Business intelligence expert specializing in company growth analysis through \
             employee metrics, geographical expansion, and product development.",
        ),
        AgentProfile::new(
            "Market Intelligence Specialist",
            "Assess company's market position and competitive landscape",
            "Market research expert focused on competitive analysis, industry trends, and market \
             positioning strategies.",
        ),
    ]
}
