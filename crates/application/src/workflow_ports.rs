use async_trait::async_trait;
use keygate_core::{AppError, AppResult};
use keygate_domain::WorkflowInput;
use serde_json::Value;

/// Engine-reported status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The execution is in flight.
    Running,
    /// The execution finished its final state.
    Succeeded,
    /// The execution failed inside a state.
    Failed,
    /// The execution was stopped explicitly.
    Stopped,
}

impl ExecutionStatus {
    /// Returns a stable wire value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// Parses a wire value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "running" => Ok(Self::Running),
            "succeeded" => Ok(Self::Succeeded),
            "failed" => Ok(Self::Failed),
            "stopped" => Ok(Self::Stopped),
            _ => Err(AppError::Validation(format!(
                "unknown execution status '{value}'"
            ))),
        }
    }
}

/// Snapshot of one execution returned by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionDescription {
    /// Deterministic execution identifier.
    pub execution_id: String,
    /// Engine-reported status.
    pub status: ExecutionStatus,
    /// The durable input the execution was started with.
    pub input: Value,
}

/// One entry of an execution's event history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEvent {
    /// Engine event type, e.g. `WaitStateEntered`.
    pub event_type: String,
    /// State name for state-scoped events.
    pub state_name: Option<String>,
}

impl ExecutionEvent {
    /// Returns whether this event records entry into the named wait state.
    #[must_use]
    pub fn entered_wait_state(&self, name: &str) -> bool {
        self.event_type == "WaitStateEntered" && self.state_name.as_deref() == Some(name)
    }
}

/// Contract the core consumes from the durable external execution engine.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    /// Starts an execution under a deterministic identifier.
    ///
    /// An execution that already exists under the identifier is a conflict.
    async fn start_execution(&self, execution_id: &str, input: &Value) -> AppResult<()>;

    /// Describes an execution, returning its durable input.
    async fn describe_execution(&self, execution_id: &str) -> AppResult<ExecutionDescription>;

    /// Returns the execution's event history, oldest first.
    async fn execution_history(&self, execution_id: &str) -> AppResult<Vec<ExecutionEvent>>;

    /// Stops a running execution. Stopping an execution that already
    /// finished reports success.
    async fn stop_execution(&self, execution_id: &str) -> AppResult<()>;
}

/// Which window boundary a transition task crosses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionTaskKind {
    /// The access window opens; provision access.
    WindowStart,
    /// The access window closed; remove access.
    WindowEnd,
}

impl TransitionTaskKind {
    /// Returns a stable wire value for this kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WindowStart => "window_start",
            Self::WindowEnd => "window_end",
        }
    }

    /// Parses a wire value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "window_start" => Ok(Self::WindowStart),
            "window_end" => Ok(Self::WindowEnd),
            _ => Err(AppError::Validation(format!(
                "unknown transition task kind '{value}'"
            ))),
        }
    }
}

/// One due transition the engine's scheduler hands to the granter runtime.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionTask {
    /// Engine-issued task identifier used to report the outcome.
    pub task_id: String,
    /// Window boundary being crossed.
    pub kind: TransitionTaskKind,
    /// The execution's durable input.
    pub input: WorkflowInput,
}

/// Outcome reported back to the engine for one transition task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionTaskOutcome {
    /// The provider call succeeded.
    Succeeded,
    /// The provider call failed; the engine fails the execution.
    Failed {
        /// Failure description surfaced in the execution history.
        reason: String,
    },
}

/// Task-queue side of the engine contract consumed by the granter runtime.
#[async_trait]
pub trait TransitionTaskQueue: Send + Sync {
    /// Polls for the next due transition task, when one is available.
    async fn poll_task(&self, worker_id: &str) -> AppResult<Option<TransitionTask>>;

    /// Reports the outcome of one transition task.
    async fn complete_task(&self, task_id: &str, outcome: TransitionTaskOutcome) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::{ExecutionEvent, ExecutionStatus, TransitionTaskKind};

    #[test]
    fn execution_status_roundtrip_wire_value() {
        for status in [
            ExecutionStatus::Running,
            ExecutionStatus::Succeeded,
            ExecutionStatus::Failed,
            ExecutionStatus::Stopped,
        ] {
            let restored = ExecutionStatus::parse(status.as_str());
            assert!(restored.is_ok());
            assert_eq!(restored.unwrap_or(ExecutionStatus::Failed), status);
        }
    }

    #[test]
    fn wait_state_entry_requires_matching_name() {
        let event = ExecutionEvent {
            event_type: "WaitStateEntered".to_owned(),
            state_name: Some("Wait for Window End".to_owned()),
        };
        assert!(event.entered_wait_state("Wait for Window End"));
        assert!(!event.entered_wait_state("Wait for Window Start"));

        let other = ExecutionEvent {
            event_type: "TaskStateEntered".to_owned(),
            state_name: Some("Wait for Window End".to_owned()),
        };
        assert!(!other.entered_wait_state("Wait for Window End"));
    }

    #[test]
    fn task_kind_roundtrip_wire_value() {
        for kind in [TransitionTaskKind::WindowStart, TransitionTaskKind::WindowEnd] {
            let restored = TransitionTaskKind::parse(kind.as_str());
            assert!(restored.is_ok());
            assert_eq!(restored.unwrap_or(TransitionTaskKind::WindowEnd), kind);
        }
    }
}
