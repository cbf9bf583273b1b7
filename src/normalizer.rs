use serde::{Deserialize, Serialize};

use crate::agents::tasks::TaskResult;

/// Markers that route a result into the market bucket. Checked first.
pub const MARKET_MARKERS: [&str; 3] = ["Market Position", "Competitors", "Market Share"];
/// Markers that route a result into the research bucket.
pub const RESEARCH_MARKERS: [&str; 3] = ["Financial Metrics", "Hiring Metrics", "Growth Indicators"];
/// Lines starting with these (after trimming) are runtime chatter, not content.
pub const NOISE_PREFIXES: [&str; 3] = ["(", "Task", "raw="];

pub const RESEARCH_TASK_LABEL: &str = "Research";
pub const MARKET_TASK_LABEL: &str = "Market Analysis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Research,
    Market,
}

/// UI-facing report: two flat text blobs in the line micro-format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub research_text: String,
    pub market_text: String,
}

/// One entry of the dashboard's `tasks_output` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task: String,
    pub raw: String,
}

impl AnalysisReport {
    pub fn is_empty(&self) -> bool {
        self.research_text.is_empty() && self.market_text.is_empty()
    }

    pub fn tasks_output(&self) -> Vec<TaskOutput> {
        vec![
            TaskOutput {
                task: RESEARCH_TASK_LABEL.to_string(),
                raw: self.research_text.clone(),
            },
            TaskOutput {
                task: MARKET_TASK_LABEL.to_string(),
                raw: self.market_text.clone(),
            },
        ]
    }
}

/// Keyword classification. Market wins when both marker sets match.
pub fn classify(text: &str) -> Option<Bucket> {
    if MARKET_MARKERS.iter().any(|marker| text.contains(marker)) {
        return Some(Bucket::Market);
    }
    if RESEARCH_MARKERS.iter().any(|marker| text.contains(marker)) {
        return Some(Bucket::Research);
    }
    None
}

fn is_noise(line: &str) -> bool {
    line.is_empty() || NOISE_PREFIXES.iter().any(|prefix| line.starts_with(prefix))
}

fn content_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines().map(str::trim).filter(|line| !is_noise(line))
}

/// Fold per-task output into the two report buckets. Never fails: results
/// that match no marker (and failed results) are dropped, empty buckets
/// stay empty strings.
pub fn normalize(results: &[TaskResult]) -> AnalysisReport {
    let mut research = Vec::<&str>::new();
    let mut market = Vec::<&str>::new();

    for result in results.iter().filter(|result| result.is_success()) {
        match classify(&result.raw_text) {
            Some(Bucket::Market) => market.extend(content_lines(&result.raw_text)),
            Some(Bucket::Research) => research.extend(content_lines(&result.raw_text)),
            None => {
                tracing::debug!(task = %result.task_id, "discarding unclassified task output");
            }
        }
    }

    AnalysisReport {
        research_text: research.join("\n"),
        market_text: market.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::tasks::TaskId;

    #[test]
    fn market_markers_take_priority() {
        let results = [TaskResult::success(
            TaskId::Financial,
            "Market Share: 10%\nCompetitors: A, B",
        )];
        let report = normalize(&results);
        assert_eq!(report.market_text, "Market Share: 10%\nCompetitors: A, B");
        assert!(report.research_text.is_empty());

        assert_eq!(
            classify("Financial Metrics:\n- Market Share: 3%"),
            Some(Bucket::Market)
        );
    }

    #[test]
    fn noise_only_output_is_discarded() {
        let results = [
            TaskResult::success(TaskId::Hiring, "(internal) Task complete"),
            TaskResult::success(TaskId::Financial, "Financial Metrics:\n- Revenue: $2B"),
        ];
        let report = normalize(&results);
        assert_eq!(report.research_text, "Financial Metrics:\n- Revenue: $2B");
        assert!(report.market_text.is_empty());
    }

    #[test]
    fn strips_blank_and_noise_lines_inside_buckets() {
        let text = "  Hiring Metrics:\n\n   \n(thinking) draft\nTask output follows\nraw=TaskOutput(...)\n  - Active Openings: 42  \n";
        let report = normalize(&[TaskResult::success(TaskId::Hiring, text)]);
        assert_eq!(report.research_text, "Hiring Metrics:\n- Active Openings: 42");
    }

    #[test]
    fn buckets_keep_result_order() {
        let results = [
            TaskResult::success(TaskId::Financial, "Financial Metrics:\n- Revenue: 1"),
            TaskResult::success(TaskId::Hiring, "Hiring Metrics:\n- Active Openings: 2"),
            TaskResult::success(TaskId::Growth, "Growth Indicators:\n- Employee Growth: 3"),
        ];
        assert_eq!(
            normalize(&results).research_text,
            "Financial Metrics:\n- Revenue: 1\nHiring Metrics:\n- Active Openings: 2\nGrowth Indicators:\n- Employee Growth: 3"
        );
    }

    #[test]
    fn failed_results_are_ignored() {
        let results = [TaskResult::failed(TaskId::Market, "Market Position: timeout")];
        assert!(normalize(&results).is_empty());
    }

    #[test]
    fn normalizing_a_normalized_report_is_stable() {
        let results = [
            TaskResult::success(TaskId::Financial, "Financial Metrics:\n- Revenue: $1B\n(note)"),
            TaskResult::success(TaskId::Market, "Market Position:\n- Competitors: X\n\nTask done"),
        ];
        let once = normalize(&results);
        let twice = normalize(&[
            TaskResult::success(TaskId::Financial, once.research_text.clone()),
            TaskResult::success(TaskId::Market, once.market_text.clone()),
        ]);
        assert_eq!(once, twice);
    }

    #[test]
    fn tasks_output_uses_dashboard_labels() {
        let report = AnalysisReport {
            research_text: "r".to_string(),
            market_text: "m".to_string(),
        };
        let outputs = report.tasks_output();
        assert_eq!(outputs[0].task, "Research");
        assert_eq!(outputs[1].task, "Market Analysis");
        assert_eq!(outputs[1].raw, "m");
    }
}
