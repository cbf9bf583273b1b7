/// Orchestrator - hierarchical execution of the task graph.
///
/// The orchestrator is the coordinating role: it walks the graph layer by
/// layer, dispatches each layer's tasks to their agents, and only opens the
/// next layer once every task in the current one has finished. Dependent
/// tasks receive their dependencies' results as prompt context.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;

use super::reasoning::ReasoningEngine;
use super::search::SearchEngine;
use super::tasks::{TaskGraph, TaskId, TaskResult, TaskSpec};
use super::{AgentProfile, Capability};
use crate::cli::DispatchMode;
use crate::error::{AnalysisError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Pending,
    RunningIndependent,
    RunningDependent,
    Completed,
    Failed(ErrorKind),
}

impl RunState {
    pub fn label(self) -> &'static str {
        match self {
            RunState::Pending => "pending",
            RunState::RunningIndependent => "running_independent",
            RunState::RunningDependent => "running_dependent",
            RunState::Completed => "completed",
            RunState::Failed(_) => "failed",
        }
    }

    pub fn can_advance_to(self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Pending, RunState::RunningIndependent)
                | (RunState::RunningIndependent, RunState::RunningDependent)
                | (RunState::RunningIndependent, RunState::Completed)
                | (RunState::RunningIndependent, RunState::Failed(_))
                | (RunState::RunningDependent, RunState::RunningDependent)
                | (RunState::RunningDependent, RunState::Completed)
                | (RunState::RunningDependent, RunState::Failed(_))
        )
    }

    pub fn advance(self, next: RunState) -> Result<RunState, AnalysisError> {
        if !self.can_advance_to(next) {
            return Err(AnalysisError::TaskGraph(format!(
                "illegal run transition {} -> {}",
                self.label(),
                next.label()
            )));
        }
        tracing::debug!(from = self.label(), to = next.label(), "run state transition");
        Ok(next)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub dispatch: DispatchMode,
    /// Static throttle before each batch of external calls.
    pub cooldown: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            dispatch: DispatchMode::Parallel,
            cooldown: Duration::from_secs(2),
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    reasoning: Arc<dyn ReasoningEngine>,
    search: Arc<dyn SearchEngine>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        reasoning: Arc<dyn ReasoningEngine>,
        search: Arc<dyn SearchEngine>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            reasoning,
            search,
            config,
        }
    }

    pub fn model_version(&self) -> &str {
        self.reasoning.model_version()
    }

    /// Execute every task once, returning results in graph declaration order.
    /// Agents are matched to tasks by position. Any task failure fails the run.
    pub async fn run(
        &self,
        agents: &[AgentProfile],
        graph: &TaskGraph,
    ) -> Result<Vec<TaskResult>, AnalysisError> {
        if agents.len() != graph.len() {
            return Err(AnalysisError::TaskGraph(format!(
                "{} agents supplied for {} tasks",
                agents.len(),
                graph.len()
            )));
        }

        let started_at = Instant::now();
        let mut state = RunState::Pending;
        let mut completed = HashMap::<TaskId, TaskResult>::new();

        for (layer_idx, layer) in graph.layers().iter().enumerate() {
            let next = if layer_idx == 0 {
                RunState::RunningIndependent
            } else {
                RunState::RunningDependent
            };
            state = state.advance(next)?;
            tracing::info!(
                layer = layer_idx,
                tasks = ?layer,
                dispatch = ?self.config.dispatch,
                "dispatching task layer"
            );
            self.cooldown().await;

            let mut jobs = Vec::with_capacity(layer.len());
            for id in layer {
                let (agent, spec) = assignment(agents, graph, *id)?;
                let context = assemble_context(graph, *id, &completed)?;
                jobs.push(async move { (spec.id, self.execute_task(agent, spec, context).await) });
            }

            let outcomes = match self.config.dispatch {
                DispatchMode::Parallel => join_all(jobs).await,
                DispatchMode::Sequential => {
                    let mut outcomes = Vec::with_capacity(jobs.len());
                    for job in jobs {
                        outcomes.push(job.await);
                    }
                    outcomes
                }
            };

            let mut layer_error: Option<AnalysisError> = None;
            for (id, outcome) in outcomes {
                match outcome {
                    Ok(result) => {
                        completed.insert(id, result);
                    }
                    Err(err) => {
                        tracing::warn!(task = %id, kind = err.kind().label(), error = %err, "task failed");
                        completed.insert(id, TaskResult::failed(id, err.to_string()));
                        layer_error = Some(match layer_error {
                            Some(existing) if !existing.is_retryable() || err.is_retryable() => {
                                existing
                            }
                            _ => err,
                        });
                    }
                }
            }

            if let Some(err) = layer_error {
                state.advance(RunState::Failed(err.kind()))?;
                return Err(err);
            }
        }

        state.advance(RunState::Completed)?;
        tracing::info!(
            tasks = graph.len(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "run completed"
        );

        graph
            .tasks()
            .iter()
            .map(|task| {
                completed.remove(&task.id).ok_or_else(|| {
                    AnalysisError::TaskGraph(format!("task '{}' produced no result", task.id))
                })
            })
            .collect()
    }

    async fn cooldown(&self) {
        if !self.config.cooldown.is_zero() {
            tokio::time::sleep(self.config.cooldown).await;
        }
    }

    async fn execute_task(
        &self,
        agent: &AgentProfile,
        spec: &TaskSpec,
        context: Vec<TaskResult>,
    ) -> Result<TaskResult, AnalysisError> {
        let started_at = Instant::now();
        tracing::info!(task = %spec.id, role = %agent.role, context = context.len(), "task started");

        let evidence = if agent.can(Capability::WebSearch) {
            Some(self.search.search(&spec.search_query).await?)
        } else {
            None
        };

        let prompt = build_prompt(spec, evidence.as_deref(), &context);
        let output = self
            .reasoning
            .invoke(&prompt, &agent.role_context())
            .await?;

        let output = output.trim();
        if output.is_empty() {
            return Err(AnalysisError::CapabilityFailed(format!(
                "agent '{}' returned no output for task '{}'",
                agent.role, spec.id
            )));
        }

        tracing::info!(
            task = %spec.id,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            chars = output.len(),
            "task completed"
        );
        Ok(TaskResult::success(spec.id, output))
    }
}

fn assignment<'a>(
    agents: &'a [AgentProfile],
    graph: &'a TaskGraph,
    id: TaskId,
) -> Result<(&'a AgentProfile, &'a TaskSpec), AnalysisError> {
    let position = graph
        .position(id)
        .ok_or_else(|| AnalysisError::TaskGraph(format!("task '{id}' is not in the graph")))?;
    Ok((&agents[position], &graph.tasks()[position]))
}

/// Results a task receives as context: one per declared dependency, in
/// dependency order. Fails unless every dependency completed successfully.
pub fn assemble_context(
    graph: &TaskGraph,
    id: TaskId,
    completed: &HashMap<TaskId, TaskResult>,
) -> Result<Vec<TaskResult>, AnalysisError> {
    graph
        .dependencies_of(id)
        .iter()
        .map(|dep| match completed.get(dep) {
            Some(result) if result.is_success() => Ok(result.clone()),
            Some(_) => Err(AnalysisError::TaskGraph(format!(
                "task '{id}' cannot start: dependency '{dep}' failed"
            ))),
            None => Err(AnalysisError::TaskGraph(format!(
                "task '{id}' cannot start: dependency '{dep}' has not run"
            ))),
        })
        .collect()
}

pub fn build_prompt(spec: &TaskSpec, evidence: Option<&str>, context: &[TaskResult]) -> String {
    let mut prompt = format!(
        "{}\n\nExpected output: {}\n",
        spec.description, spec.expected_output
    );

    if let Some(evidence) = evidence {
        prompt.push_str("\nWeb research:\n");
        prompt.push_str(evidence.trim());
        prompt.push('\n');
    }

    if !context.is_empty() {
        prompt.push_str("\nResults from prior analyses:\n");
        for result in context {
            prompt.push_str(&format!(
                "--- {} analysis ---\n{}\n",
                result.task_id,
                result.raw_text.trim()
            ));
        }
    }

    prompt.push_str(
        "\nRespond using the \"Format output as\" structure above and keep its header lines verbatim.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed_independents() -> HashMap<TaskId, TaskResult> {
        [
            TaskResult::success(TaskId::Financial, "Financial Metrics:\n- Revenue: 1"),
            TaskResult::success(TaskId::Hiring, "Hiring Metrics:\n- Active Openings: 2"),
            TaskResult::success(TaskId::Growth, "Growth Indicators:\n- Employee Growth: 3"),
        ]
        .into_iter()
        .map(|result| (result.task_id, result))
        .collect()
    }

    #[test]
    fn state_machine_allows_only_forward_transitions() {
        let state = RunState::Pending
            .advance(RunState::RunningIndependent)
            .expect("pending -> independent");
        let state = state
            .advance(RunState::RunningDependent)
            .expect("independent -> dependent");
        assert!(state.can_advance_to(RunState::Completed));
        assert!(state.can_advance_to(RunState::Failed(ErrorKind::CapabilityFatal)));
        assert!(!RunState::Pending.can_advance_to(RunState::RunningDependent));
        assert!(!RunState::Completed.can_advance_to(RunState::RunningIndependent));
        assert!(
            RunState::Failed(ErrorKind::CapabilityFailed)
                .advance(RunState::Completed)
                .is_err()
        );
    }

    #[test]
    fn market_context_holds_each_dependency_once_in_order() {
        let graph = TaskGraph::for_company("Acme").expect("graph should build");
        let context = assemble_context(&graph, TaskId::Market, &completed_independents())
            .expect("context should assemble");
        let ids = context.iter().map(|r| r.task_id).collect::<Vec<_>>();
        assert_eq!(ids, vec![TaskId::Financial, TaskId::Hiring, TaskId::Growth]);
    }

    #[test]
    fn market_context_requires_every_dependency() {
        let graph = TaskGraph::for_company("Acme").expect("graph should build");
        let mut partial = completed_independents();
        partial.remove(&TaskId::Growth);
        let err = assemble_context(&graph, TaskId::Market, &partial)
            .expect_err("missing dependency should fail");
        assert!(err.to_string().contains("'growth' has not run"));

        let mut failed = completed_independents();
        failed.insert(TaskId::Hiring, TaskResult::failed(TaskId::Hiring, "boom"));
        assert!(assemble_context(&graph, TaskId::Market, &failed).is_err());
    }

    #[test]
    fn independent_tasks_get_no_context() {
        let graph = TaskGraph::for_company("Acme").expect("graph should build");
        let context = assemble_context(&graph, TaskId::Hiring, &HashMap::new())
            .expect("independent task needs nothing");
        assert!(context.is_empty());
    }

    #[test]
    fn prompt_includes_evidence_and_prior_results() {
        let graph = TaskGraph::for_company("Acme").expect("graph should build");
        let spec = graph.get(TaskId::Market).expect("market task");
        let context = assemble_context(&graph, TaskId::Market, &completed_independents())
            .expect("context should assemble");

        let prompt = build_prompt(spec, Some("1. Acme vs Globex"), &context);
        assert!(prompt.starts_with("Analyze Acme's market position:"));
        assert!(prompt.contains("Web research:\n1. Acme vs Globex"));
        assert!(prompt.contains("--- financial analysis ---\nFinancial Metrics:"));
        assert!(prompt.contains("--- growth analysis ---\nGrowth Indicators:"));
        assert_eq!(prompt.matches("- Active Openings: 2").count(), 1);
    }
}
