//! Run model and its state transitions.
//!
//! A [`Run`] is one attempt of the pipeline for a project. Only the coordinator
//! mutates runs; everything else reads snapshots from the run registry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::step::{StepId, StepSelection, StepState};
use crate::types::{DocumentId, ParseWithDefault, ProjectId, RunId, StepError, UserId};

// =============================================================================
// Overall Status
// =============================================================================

/// Serialized with the variant names (`NotStarted`, `Completed`, ...) that
/// status clients switch on; `as_str` is the storage and log spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    NotStarted,
    Pending,
    Running,
    Completed,
    Failed,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }

    /// Pending or running; at most one such run exists per project.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Error)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ParseWithDefault for RunStatus {
    fn type_name() -> &'static str {
        "RunStatus"
    }

    fn default_value() -> Self {
        Self::Error
    }

    fn try_parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

// =============================================================================
// Error Record
// =============================================================================

/// Entry of a run's append-only error list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepErrorRecord {
    pub step: StepId,
    pub kind: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl fmt::Display for StepErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.step, self.message)
    }
}

// =============================================================================
// Run
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: RunId,
    pub project_id: ProjectId,
    pub document_id: DocumentId,
    pub user_id: Option<UserId>,
    /// Assigned by the run registry on acquisition, starting at 1
    pub attempt: u32,
    pub selected_steps: StepSelection,
    pub overall_status: RunStatus,
    pub step_states: BTreeMap<StepId, StepState>,
    pub errors: Vec<StepErrorRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// New pending run; steps outside the selection start as `Skipped`.
    pub fn pending(
        project_id: ProjectId,
        document_id: DocumentId,
        user_id: Option<UserId>,
        selected_steps: StepSelection,
    ) -> Self {
        let step_states = StepId::ALL
            .into_iter()
            .map(|step| {
                let state = if selected_steps.contains(step) {
                    StepState::Pending
                } else {
                    StepState::Skipped
                };
                (step, state)
            })
            .collect();
        let now = Utc::now();

        Self {
            id: RunId::generate(),
            project_id,
            document_id,
            user_id,
            attempt: 0,
            selected_steps,
            overall_status: RunStatus::Pending,
            step_states,
            errors: Vec::new(),
            started_at: now,
            completed_at: None,
            updated_at: now,
        }
    }

    pub fn step_state(&self, step: StepId) -> StepState {
        self.step_states
            .get(&step)
            .copied()
            .unwrap_or(StepState::Skipped)
    }

    pub fn set_step_state(&mut self, step: StepId, state: StepState) {
        self.step_states.insert(step, state);
        self.updated_at = Utc::now();
    }

    pub fn mark_running(&mut self) {
        self.overall_status = RunStatus::Running;
        self.updated_at = Utc::now();
    }

    /// Mark `step` failed and append its error.
    pub fn record_failure(&mut self, step: StepId, error: &StepError) {
        self.errors.push(StepErrorRecord {
            step,
            kind: error.kind().to_string(),
            message: error.to_string(),
            at: Utc::now(),
        });
        self.set_step_state(step, StepState::Failed);
    }

    /// First prerequisite of `step` that failed or was itself starved.
    ///
    /// Prerequisites are always inside the selection, so a `Skipped`
    /// prerequisite can only mean upstream failure.
    pub fn blocking_prerequisite(&self, step: StepId) -> Option<StepId> {
        self.selected_steps
            .prerequisites(step)
            .into_iter()
            .find(|dep| matches!(self.step_state(*dep), StepState::Failed | StepState::Skipped))
    }

    /// Terminal status once every selected step has been processed.
    ///
    /// `Failed` when nothing was produced, `Completed` otherwise, including
    /// partial success.
    pub fn finish(&mut self) {
        let any_completed = self
            .selected_steps
            .iter()
            .any(|step| self.step_state(step) == StepState::Completed);
        self.overall_status = if any_completed {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        self.stamp_completed();
    }

    /// Abort after an infrastructure fault. The step in flight, if any, is
    /// failed with the fault message; untouched steps keep their state.
    pub fn abort(&mut self, step: Option<StepId>, message: &str) {
        if let Some(step) = step {
            self.record_failure(step, &StepError::Execution(message.to_string()));
        }
        self.overall_status = RunStatus::Error;
        self.stamp_completed();
    }

    fn stamp_completed(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        self.updated_at = now;
    }

    /// Completion flag for every selected step.
    pub fn progress(&self) -> BTreeMap<StepId, bool> {
        self.selected_steps
            .iter()
            .map(|step| (step, self.step_state(step) == StepState::Completed))
            .collect()
    }

    /// Error list formatted as `step: message`
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}
