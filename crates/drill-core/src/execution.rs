use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Serialize, Serializer};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::scenario::StepId;

/// Opaque identifier for one run of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    /// Mint a fresh execution id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Purpose of a run: dry exercise or scored assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Simulation,
    Assessment,
}

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl ExecutionStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    /// Active executions may still be paused or cancelled.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

/// Lifecycle status of a single step result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Skipped,
}

impl StepStatus {
    /// Terminal step statuses unblock dependents.
    pub fn is_terminal(self) -> bool {
        !matches!(self, StepStatus::Pending | StepStatus::Running)
    }
}

/// A value written into the execution context by an extract rule.
///
/// `Absent` records that the rule ran but found nothing; it is distinct
/// from the literal values `null`, `""`, and `0`.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    Absent,
    Value(JsonValue),
}

impl ContextValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, ContextValue::Absent)
    }

    /// Borrow the inner value when present.
    pub fn as_value(&self) -> Option<&JsonValue> {
        match self {
            ContextValue::Absent => None,
            ContextValue::Value(value) => Some(value),
        }
    }
}

impl From<JsonValue> for ContextValue {
    fn from(value: JsonValue) -> Self {
        ContextValue::Value(value)
    }
}

impl Serialize for ContextValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ContextValue::Absent => serializer.serialize_none(),
            ContextValue::Value(value) => value.serialize(serializer),
        }
    }
}

/// The variable mapping accumulated from extract rules, in write order.
pub type Context = IndexMap<String, ContextValue>;

/// One evaluated assertion clause.
#[derive(Debug, Clone, Serialize)]
pub struct AssertionResult {
    /// Stable clause name (`status`, `blocked`, `headerEquals.<name>`, …).
    pub field: String,
    pub expected: JsonValue,
    pub actual: JsonValue,
    pub passed: bool,
}

impl AssertionResult {
    pub fn new(
        field: impl Into<String>,
        expected: impl Into<JsonValue>,
        actual: impl Into<JsonValue>,
        passed: bool,
    ) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            actual: actual.into(),
            passed,
        }
    }
}

/// Outcome of one step within an execution. Appended when the step first
/// becomes executable or skipped, then mutated only by its step runner.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: StepId,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Request attempts behind the final result.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<AssertionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    /// A result for a step that just started running.
    pub fn running(step_id: StepId) -> Self {
        Self {
            step_id,
            status: StepStatus::Running,
            started_at: Some(Utc::now()),
            completed_at: None,
            duration_ms: None,
            attempts: 0,
            assertions: Vec::new(),
            error: None,
        }
    }

    /// A result for a step skipped by its guard; no request is made.
    pub fn skipped(step_id: StepId) -> Self {
        Self {
            step_id,
            status: StepStatus::Skipped,
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
            duration_ms: Some(0),
            attempts: 0,
            assertions: Vec::new(),
            error: None,
        }
    }

    /// Stamp the terminal timestamp and duration.
    pub fn finish(&mut self, status: StepStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds());
    }
}

/// Frozen progress captured while an execution is paused.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedState {
    pub pending_steps: Vec<StepId>,
    pub completed_steps: Vec<StepId>,
    pub context: Context,
    pub passed_steps: u32,
    pub step_results: Vec<StepResult>,
}

/// Score sheet attached to assessment-mode executions on completion.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentReport {
    /// `round(100 * passed / total)`; 100 for an empty scenario.
    pub score: u32,
    pub passed: bool,
    pub summary: String,
    /// Opaque artifact handles resolvable by the host.
    pub artifacts: Vec<String>,
}

/// A live or historical run of a scenario.
///
/// Exclusively owned by its driver while non-terminal; read-only to
/// observers afterwards. Snapshots of this type are the payload of every
/// lifecycle event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    pub id: ExecutionId,
    pub scenario_id: String,
    pub mode: ExecutionMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_execution_id: Option<ExecutionId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_data: Option<JsonValue>,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    /// Step results in the order attempts began.
    pub steps: Vec<StepResult>,
    pub context: Context,
    /// Count of step results with status `completed`.
    pub passed_steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused_state: Option<PausedState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<AssessmentReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Execution {
    /// A fresh pending execution for the given scenario.
    pub fn pending(
        scenario_id: impl Into<String>,
        mode: ExecutionMode,
        trigger_data: Option<JsonValue>,
    ) -> Self {
        Self {
            id: ExecutionId::generate(),
            scenario_id: scenario_id.into(),
            mode,
            parent_execution_id: None,
            trigger_data,
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            steps: Vec::new(),
            context: Context::new(),
            passed_steps: 0,
            paused_state: None,
            report: None,
            error: None,
        }
    }

    /// Borrow the result for a step, if one has been appended.
    pub fn step_result(&self, step_id: &StepId) -> Option<&StepResult> {
        self.steps.iter().find(|result| &result.step_id == step_id)
    }

    /// Mutably borrow the result for a step.
    pub fn step_result_mut(&mut self, step_id: &StepId) -> Option<&mut StepResult> {
        self.steps
            .iter_mut()
            .find(|result| &result.step_id == step_id)
    }

    /// Stamp terminal bookkeeping for the given status.
    pub fn finish(&mut self, status: ExecutionStatus) {
        let now = Utc::now();
        self.status = status;
        self.completed_at = Some(now);
        self.duration_ms = self
            .started_at
            .map(|started| (now - started).num_milliseconds());
        self.paused_state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_statuses_are_closed() {
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(ExecutionStatus::Paused.is_active());
    }

    #[test]
    fn step_terminal_statuses_unblock_dependents() {
        for status in [
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Cancelled,
            StepStatus::Skipped,
        ] {
            assert!(status.is_terminal());
        }
        assert!(!StepStatus::Running.is_terminal());
    }

    #[test]
    fn context_value_absent_is_distinct_from_null() {
        let absent = ContextValue::Absent;
        let null = ContextValue::Value(JsonValue::Null);
        assert_ne!(absent, null);
        assert!(absent.is_absent());
        assert!(!null.is_absent());
        assert_eq!(null.as_value(), Some(&JsonValue::Null));
    }

    #[test]
    fn execution_snapshot_serializes_context() {
        let mut execution = Execution::pending("scn-1", ExecutionMode::Simulation, None);
        execution
            .context
            .insert("token".into(), ContextValue::Value(json!("jwt-abc")));
        execution.context.insert("missing".into(), ContextValue::Absent);

        let snapshot = serde_json::to_value(&execution).expect("serialize execution");
        assert_eq!(snapshot["context"]["token"], json!("jwt-abc"));
        assert_eq!(snapshot["context"]["missing"], JsonValue::Null);
        assert_eq!(snapshot["status"], json!("pending"));
    }

    #[test]
    fn finish_stamps_duration() {
        let mut result = StepResult::running(StepId::from("probe"));
        result.finish(StepStatus::Completed);
        assert_eq!(result.status, StepStatus::Completed);
        assert!(result.completed_at.is_some());
        assert!(result.duration_ms.is_some());
    }
}
