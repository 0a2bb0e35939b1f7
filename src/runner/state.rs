use crate::error::StepError;
use crate::parser::types::{ActionKind, Step};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Step execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Error,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Error
        )
    }
}

/// Outcome of executing one step
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    pub step_id: u32,
    pub action: ActionKind,
    pub description: String,
    pub status: StepStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    /// Locator that actually resolved the element
    pub selector_used: Option<String>,
    pub screenshot_path: Option<String>,
    pub healing_applied: bool,
    pub healing_strategy: Option<String>,
    pub retry_count: u32,
}

impl StepResult {
    pub fn new(step: &Step) -> Self {
        Self {
            step_id: step.id,
            action: step.action,
            description: step.label(),
            status: StepStatus::Pending,
            started_at: None,
            finished_at: None,
            duration_ms: None,
            error: None,
            error_kind: None,
            selector_used: None,
            screenshot_path: None,
            healing_applied: false,
            healing_strategy: None,
            retry_count: 0,
        }
    }

    pub fn start(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn complete(&mut self) {
        self.error = None;
        self.error_kind = None;
        self.finish(StepStatus::Completed);
    }

    pub fn fail(&mut self, error: &StepError) {
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind().to_string());
        self.finish(StepStatus::Failed);
    }

    /// A failure that is not the step's fault (e.g. the session was lost)
    pub fn abort(&mut self, message: String, kind: &str) {
        self.error = Some(message);
        self.error_kind = Some(kind.to_string());
        self.finish(StepStatus::Error);
    }

    pub fn passed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    fn finish(&mut self, status: StepStatus) {
        self.status = status;
        let now = Utc::now();
        self.finished_at = Some(now);
        if let Some(start) = self.started_at {
            self.duration_ms = Some((now - start).num_milliseconds().max(0) as u64);
        }
    }
}

/// Aggregate over a list of step results
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSummary {
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub healed: u32,
    pub success_rate: f64,
    pub healing_success_rate: f64,
    pub total_duration_ms: u64,
    pub average_duration_ms: u64,
}

impl ExecutionSummary {
    /// `planned` is the number of steps the run was given; steps never
    /// reached count as skipped.
    pub fn from_results(results: &[StepResult], planned: usize) -> Self {
        if results.is_empty() {
            return Self {
                skipped: planned as u32,
                ..Default::default()
            };
        }

        let total = results.len() as u32;
        let passed = results.iter().filter(|r| r.passed()).count() as u32;
        let failed = results
            .iter()
            .filter(|r| matches!(r.status, StepStatus::Failed | StepStatus::Error))
            .count() as u32;
        let healed = results.iter().filter(|r| r.healing_applied).count() as u32;
        let total_duration_ms: u64 = results.iter().filter_map(|r| r.duration_ms).sum();

        Self {
            total,
            passed,
            failed,
            skipped: planned.saturating_sub(results.len()) as u32,
            healed,
            success_rate: percentage(passed, total),
            healing_success_rate: percentage(healed, total),
            total_duration_ms,
            average_duration_ms: total_duration_ms / total as u64,
        }
    }
}

fn percentage(part: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}

/// Run lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Initializing,
    Running,
    Paused,
    Stopping,
    Completed,
    Failed,
    Stopped,
    Error,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Stopped | RunStatus::Error
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Initializing => "initializing",
            RunStatus::Running => "running",
            RunStatus::Paused => "paused",
            RunStatus::Stopping => "stopping",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Stopped => "stopped",
            RunStatus::Error => "error",
        }
    }
}

/// State of one end-to-end run, retained after completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub session_key: String,
    pub status: RunStatus,
    pub results: Vec<StepResult>,
    pub paused: bool,
    pub stop_requested: bool,
    pub total_steps: usize,
    pub current_step: Option<u32>,
    pub progress: f64,
    pub summary: Option<ExecutionSummary>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
    pub failed_step_id: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(run_id: &str, session_key: &str, total_steps: usize) -> Self {
        Self {
            run_id: run_id.to_string(),
            session_key: session_key.to_string(),
            status: RunStatus::Initializing,
            results: Vec::new(),
            paused: false,
            stop_requested: false,
            total_steps,
            current_step: None,
            progress: 0.0,
            summary: None,
            error: None,
            error_kind: None,
            failed_step_id: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record(&mut self, result: StepResult) {
        self.results.push(result);
        self.progress = if self.total_steps == 0 {
            100.0
        } else {
            (self.results.len() as f64 / self.total_steps as f64 * 100.0).min(100.0)
        };
    }

    /// Move to a terminal status, attaching the summary
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.paused = false;
        self.current_step = None;
        self.summary = Some(ExecutionSummary::from_results(
            &self.results,
            self.total_steps,
        ));
        self.finished_at = Some(Utc::now());
    }

    pub fn fail_with(&mut self, status: RunStatus, message: String, kind: &str, step_id: Option<u32>) {
        self.error = Some(message);
        self.error_kind = Some(kind.to_string());
        self.failed_step_id = step_id;
        self.finish(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: u32, status: StepStatus, healed: bool, duration: u64) -> StepResult {
        let mut r = StepResult::new(&Step::new(id, ActionKind::Click));
        r.status = status;
        r.healing_applied = healed;
        r.duration_ms = Some(duration);
        r
    }

    #[test]
    fn test_empty_summary_is_all_zero() {
        let summary = ExecutionSummary::from_results(&[], 0);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.healing_success_rate, 0.0);
        assert_eq!(summary.average_duration_ms, 0);
    }

    #[test]
    fn test_summary_rates_are_rounded() {
        let results = vec![
            result(1, StepStatus::Completed, false, 100),
            result(2, StepStatus::Completed, true, 200),
            result(3, StepStatus::Failed, false, 300),
        ];
        let summary = ExecutionSummary::from_results(&results, 5);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.success_rate, 66.67);
        assert_eq!(summary.healing_success_rate, 33.33);
        assert_eq!(summary.total_duration_ms, 600);
        assert_eq!(summary.average_duration_ms, 200);
    }

    #[test]
    fn test_step_result_lifecycle() {
        let mut r = StepResult::new(&Step::new(4, ActionKind::Verify));
        r.start();
        r.fail(&StepError::VerificationFailed("text 'Saved' not found".into()));
        assert_eq!(r.status, StepStatus::Failed);
        assert_eq!(r.error_kind.as_deref(), Some("verification_failed"));

        r.complete();
        assert!(r.passed());
        assert!(r.error.is_none());
        assert!(r.duration_ms.is_some());
    }

    #[test]
    fn test_run_state_progress_and_finish() {
        let mut state = RunState::new("run-1", "default", 4);
        state.record(result(1, StepStatus::Completed, false, 10));
        assert_eq!(state.progress, 25.0);

        state.fail_with(
            RunStatus::Failed,
            "Critical step 2 failed".into(),
            "critical_step_failed",
            Some(2),
        );
        assert!(state.status.is_terminal());
        assert_eq!(state.failed_step_id, Some(2));
        assert_eq!(state.summary.as_ref().unwrap().skipped, 3);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&RunStatus::Stopped).unwrap();
        assert_eq!(json, "\"stopped\"");
    }
}
