//! Agent execution trace records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// Status shared by executions and tool invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Completed and failed records never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Legal moves: pending -> running, and any non-terminal state -> a terminal one
    pub fn can_transition_to(&self, next: ExecutionStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending | Self::Running, Self::Completed | Self::Failed) => true,
            _ => false,
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::invalid(format!("Unknown execution status: {}", other))),
        }
    }
}

/// How a traced step ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Finished with an output payload
    Completed(Value),
    /// Failed with an error message
    Failed(String),
}

impl Outcome {
    pub fn status(&self) -> ExecutionStatus {
        match self {
            Outcome::Completed(_) => ExecutionStatus::Completed,
            Outcome::Failed(_) => ExecutionStatus::Failed,
        }
    }
}

/// One agent run within a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentExecution {
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// Kind of agent that ran, e.g. `"chat"`
    pub agent_type: String,
    pub input_data: Value,
    pub output_data: Option<Value>,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub execution_time_ms: Option<u64>,
    /// Tools invoked during the run, in start order
    #[serde(default)]
    pub tool_invocations: Vec<ToolInvocation>,
}

/// A single tool call made by an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub tool_name: String,
    pub input_params: Value,
    pub output_result: Option<Value>,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub execution_time_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        use ExecutionStatus::*;
        assert!(Pending.can_transition_to(Running));
        assert!(Pending.can_transition_to(Failed));
        assert!(Running.can_transition_to(Completed));
        assert!(!Running.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
        assert!(Completed.is_terminal());
        assert!(!Running.is_terminal());
    }

    #[test]
    fn test_outcome_status() {
        assert_eq!(
            Outcome::Completed(Value::Null).status(),
            ExecutionStatus::Completed
        );
        assert_eq!(Outcome::Failed("x".into()).status(), ExecutionStatus::Failed);
    }
}
