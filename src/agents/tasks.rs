/// Task graph - the fixed set of analyses and their dependency edges.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskId {
    Financial,
    Hiring,
    Growth,
    Market,
}

impl TaskId {
    pub const ALL: [TaskId; 4] = [
        TaskId::Financial,
        TaskId::Hiring,
        TaskId::Growth,
        TaskId::Market,
    ];

    pub fn label(self) -> &'static str {
        match self {
            TaskId::Financial => "financial",
            TaskId::Hiring => "hiring",
            TaskId::Growth => "growth",
            TaskId::Market => "market",
        }
    }

    /// Header line the agent must echo so the normalizer can classify its output.
    pub fn section_header(self) -> &'static str {
        match self {
            TaskId::Financial => "Financial Metrics:",
            TaskId::Hiring => "Hiring Metrics:",
            TaskId::Growth => "Growth Indicators:",
            TaskId::Market => "Market Position:",
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,
    pub description: String,
    pub expected_output: String,
    pub search_query: String,
    pub dependencies: Vec<TaskId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub raw_text: String,
    pub status: TaskStatus,
}

impl TaskResult {
    pub fn success(task_id: TaskId, raw_text: impl Into<String>) -> Self {
        Self {
            task_id,
            raw_text: raw_text.into(),
            status: TaskStatus::Success,
        }
    }

    pub fn failed(task_id: TaskId, error: impl Into<String>) -> Self {
        Self {
            task_id,
            raw_text: error.into(),
            status: TaskStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

/// Build the four task specifications for one company.
///
/// The "Format output as" blocks are a contract with the normalizer and the
/// dashboard parser: their header lines must survive verbatim in agent output.
pub fn build_tasks(company_name: &str) -> Vec<TaskSpec> {
    let company = company_name.trim();
    vec![
        TaskSpec {
            id: TaskId::Financial,
            description: format!(
                "Analyze {company}'s financial health:\n\
                 1. Find latest quarterly revenue and profits\n\
                 2. Calculate burn rate if available\n\
                 3. Identify recent funding events\n\
                 4. Assess cash reserves\n\n\
                 Format output as:\n\
                 Financial Metrics:\n\
                 - Revenue: [Latest quarterly]\n\
                 - Profit Margins: [%]\n\
                 - Burn Rate: [If applicable]\n\
                 - Recent Funding: [Date, Amount]\n\
                 - Cash Position: [Latest figure]"
            ),
            expected_output: "A structured analysis of the company's financial metrics including \
                              revenue, profits, burn rate, funding, and cash position."
                .to_string(),
            search_query: format!("{company} quarterly revenue profit funding cash reserves"),
            dependencies: Vec::new(),
        },
        TaskSpec {
            id: TaskId::Hiring,
            description: format!(
                "Analyze {company}'s hiring patterns:\n\
                 1. Count current job openings\n\
                 2. Identify most frequent roles\n\
                 3. Track department growth\n\
                 4. Note any hiring freezes/slowdowns\n\n\
                 Format output as:\n\
                 Hiring Metrics:\n\
                 - Active Openings: [Number]\n\
                 - Key Departments: [List]\n\
                 - Growth Areas: [Departments]\n\
                 - Hiring Velocity: [Trend]"
            ),
            expected_output: "A detailed analysis of the company's hiring patterns including job \
                              openings, key departments, and hiring trends."
                .to_string(),
            search_query: format!("{company} job openings hiring trends layoffs"),
            dependencies: Vec::new(),
        },
        TaskSpec {
            id: TaskId::Growth,
            description: format!(
                "Analyze {company}'s growth indicators:\n\
                 1. Track LinkedIn employee growth\n\
                 2. Monitor office locations\n\
                 3. Identify new products/services\n\
                 4. Note expansion plans\n\n\
                 Format output as:\n\
                 Growth Indicators:\n\
                 - Employee Growth: [Rate]\n\
                 - Locations: [Changes]\n\
                 - Products: [New launches]\n\
                 - Expansion: [Plans]"
            ),
            expected_output: "A comprehensive analysis of company growth indicators including \
                              employee growth, locations, products, and expansion plans."
                .to_string(),
            search_query: format!("{company} employee growth new offices product launches expansion"),
            dependencies: Vec::new(),
        },
        TaskSpec {
            id: TaskId::Market,
            description: format!(
                "Analyze {company}'s market position:\n\
                 1. Compare with competitors\n\
                 2. Assess market share\n\
                 3. Track industry trends\n\
                 4. Identify market challenges\n\n\
                 Format output as:\n\
                 Market Position:\n\
                 - Competitors: [Key rivals]\n\
                 - Market Share: [Estimate]\n\
                 - Industry Trends: [Key movements]\n\
                 - Challenges: [Main obstacles]"
            ),
            expected_output: "A detailed analysis of the company's market position including \
                              competitors, market share, trends, and challenges."
                .to_string(),
            search_query: format!("{company} competitors market share industry trends"),
            dependencies: vec![TaskId::Financial, TaskId::Hiring, TaskId::Growth],
        },
    ]
}

/// Dependency graph over task specs. Construction rejects duplicate ids,
/// dangling dependencies and cycles, so every `TaskGraph` is a DAG.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    tasks: Vec<TaskSpec>,
    layers: Vec<Vec<TaskId>>,
}

impl TaskGraph {
    pub fn new(tasks: Vec<TaskSpec>) -> Result<Self, AnalysisError> {
        if tasks.is_empty() {
            return Err(AnalysisError::TaskGraph("task graph is empty".to_string()));
        }

        let mut ids = BTreeSet::new();
        for task in &tasks {
            if !ids.insert(task.id) {
                return Err(AnalysisError::TaskGraph(format!(
                    "duplicate task id '{}'",
                    task.id
                )));
            }
        }

        for task in &tasks {
            let mut seen = BTreeSet::new();
            for dep in &task.dependencies {
                if *dep == task.id {
                    return Err(AnalysisError::TaskGraph(format!(
                        "task '{}' depends on itself",
                        task.id
                    )));
                }
                if !ids.contains(dep) {
                    return Err(AnalysisError::TaskGraph(format!(
                        "task '{}' depends on undefined task '{}'",
                        task.id, dep
                    )));
                }
                if !seen.insert(*dep) {
                    return Err(AnalysisError::TaskGraph(format!(
                        "task '{}' lists dependency '{}' twice",
                        task.id, dep
                    )));
                }
            }
        }

        let layers = topological_layers(&tasks)?;
        Ok(Self { tasks, layers })
    }

    /// Graph for the fixed company analysis.
    pub fn for_company(company_name: &str) -> Result<Self, AnalysisError> {
        Self::new(build_tasks(company_name))
    }

    pub fn tasks(&self) -> &[TaskSpec] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskSpec> {
        self.tasks.iter().find(|task| task.id == id)
    }

    /// Position of a task in declaration order; agents are assigned by position.
    pub fn position(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    pub fn dependencies_of(&self, id: TaskId) -> &[TaskId] {
        self.get(id)
            .map(|task| task.dependencies.as_slice())
            .unwrap_or_default()
    }

    /// Execution layers: every task's dependencies sit in earlier layers.
    pub fn layers(&self) -> &[Vec<TaskId>] {
        &self.layers
    }

    pub fn descriptions(&self) -> Vec<&str> {
        self.tasks
            .iter()
            .map(|task| task.description.as_str())
            .collect()
    }
}

fn topological_layers(tasks: &[TaskSpec]) -> Result<Vec<Vec<TaskId>>, AnalysisError> {
    let mut remaining: BTreeMap<TaskId, BTreeSet<TaskId>> = tasks
        .iter()
        .map(|task| (task.id, task.dependencies.iter().copied().collect()))
        .collect();
    let mut layers = Vec::new();

    while !remaining.is_empty() {
        // Declaration order inside a layer keeps dispatch deterministic.
        let ready = tasks
            .iter()
            .map(|task| task.id)
            .filter(|id| remaining.get(id).is_some_and(BTreeSet::is_empty))
            .collect::<Vec<_>>();

        if ready.is_empty() {
            let stuck = remaining
                .keys()
                .map(|id| id.label())
                .collect::<Vec<_>>()
                .join(", ");
            return Err(AnalysisError::TaskGraph(format!(
                "dependency cycle between tasks: {stuck}"
            )));
        }

        for id in &ready {
            remaining.remove(id);
        }
        for deps in remaining.values_mut() {
            for id in &ready {
                deps.remove(id);
            }
        }
        layers.push(ready);
    }

    Ok(layers)
}
