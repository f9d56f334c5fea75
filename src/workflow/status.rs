//! Status Query Service
//!
//! Read-only projection of the run registry for polling clients. Never touches
//! the coordinator, so it cannot block on a step in flight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::run::{Run, RunStatus};
use super::step::{StepId, StepState};
use crate::storage::RunRegistry;
use crate::types::{DocumentId, ProjectId, Result, RunId};

/// Immutable view of a project's latest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub status: RunStatus,
    /// Completion flag per selected step
    pub progress: BTreeMap<StepId, bool>,
    /// `step: message` entries in the order they occurred
    pub errors: Vec<String>,
    /// Full per-step state, including skipped steps
    pub steps: BTreeMap<StepId, StepState>,
    pub run_id: Option<RunId>,
    pub document_id: Option<DocumentId>,
    pub attempt: Option<u32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunSnapshot {
    pub fn not_started() -> Self {
        Self {
            status: RunStatus::NotStarted,
            progress: BTreeMap::new(),
            errors: Vec::new(),
            steps: BTreeMap::new(),
            run_id: None,
            document_id: None,
            attempt: None,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

impl From<&Run> for RunSnapshot {
    fn from(run: &Run) -> Self {
        Self {
            status: run.overall_status,
            progress: run.progress(),
            errors: run.error_messages(),
            steps: run.step_states.clone(),
            run_id: Some(run.id.clone()),
            document_id: Some(run.document_id.clone()),
            attempt: Some(run.attempt),
            started_at: Some(run.started_at),
            completed_at: run.completed_at,
        }
    }
}

#[derive(Clone)]
pub struct StatusQueryService {
    registry: Arc<dyn RunRegistry>,
}

impl StatusQueryService {
    pub fn new(registry: Arc<dyn RunRegistry>) -> Self {
        Self { registry }
    }

    /// Snapshot of the latest attempt, `NotStarted` when the project has none.
    pub fn get_status(&self, project_id: &ProjectId) -> Result<RunSnapshot> {
        Ok(self
            .registry
            .get(project_id)?
            .as_ref()
            .map(RunSnapshot::from)
            .unwrap_or_else(RunSnapshot::not_started))
    }

    /// Every attempt, newest first
    pub fn history(&self, project_id: &ProjectId) -> Result<Vec<RunSnapshot>> {
        Ok(self
            .registry
            .history(project_id)?
            .iter()
            .map(RunSnapshot::from)
            .collect())
    }
}
