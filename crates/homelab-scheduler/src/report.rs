//! Run reports

use chrono::{DateTime, Utc};
use homelab_core::StepOutputs;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to a step during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum StepOutcome {
    /// Step completed and produced outputs
    Applied { outputs: StepOutputs },
    /// Teardown completed
    Removed,
    /// Step returned an error
    Failed { error: String },
    /// Step did not run because an earlier step failed
    Skipped { reason: String },
}

/// Record of a single step execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: StepOutcome,
}

impl StepRecord {
    pub fn skipped(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            started_at: None,
            finished_at: None,
            outcome: StepOutcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, StepOutcome::Failed { .. })
    }
}

/// Result of a pipeline run or teardown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique run identifier
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Records in execution order
    pub steps: Vec<StepRecord>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
        }
    }

    /// Whether every step applied (or was removed)
    pub fn is_success(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.outcome, StepOutcome::Applied { .. } | StepOutcome::Removed))
    }

    /// First failed step, if any
    pub fn first_failure(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.is_failed())
    }

    /// Outputs of an applied step
    pub fn outputs(&self, id: &str) -> Option<&StepOutputs> {
        self.steps.iter().find(|s| s.id == id).and_then(|s| match &s.outcome {
            StepOutcome::Applied { outputs } => Some(outputs),
            _ => None,
        })
    }

    /// Single output value of an applied step
    pub fn output(&self, id: &str, key: &str) -> Option<&str> {
        self.outputs(id).and_then(|outputs| outputs.get(key))
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}
