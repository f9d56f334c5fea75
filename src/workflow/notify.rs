//! Run notifications
//!
//! The coordinator tells the requesting user when a run starts and when it
//! reaches a terminal status. Delivery is someone else's problem: failures are
//! logged and never touch the run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::run::{Run, RunStatus};
use crate::types::{ProjectId, Result, RunId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    #[serde(rename_all = "camelCase")]
    RunStarted {
        run_id: RunId,
        project_id: ProjectId,
        attempt: u32,
    },
    #[serde(rename_all = "camelCase")]
    RunFinished {
        run_id: RunId,
        project_id: ProjectId,
        attempt: u32,
        status: RunStatus,
        errors: Vec<String>,
    },
}

impl WorkflowEvent {
    pub fn started(run: &Run) -> Self {
        Self::RunStarted {
            run_id: run.id.clone(),
            project_id: run.project_id.clone(),
            attempt: run.attempt,
        }
    }

    pub fn finished(run: &Run) -> Self {
        Self::RunFinished {
            run_id: run.id.clone(),
            project_id: run.project_id.clone(),
            attempt: run.attempt,
            status: run.overall_status,
            errors: run.error_messages(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: &UserId, event: &WorkflowEvent) -> Result<()>;
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Emits each event as a tracing record.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: &UserId, event: &WorkflowEvent) -> Result<()> {
        match event {
            WorkflowEvent::RunStarted {
                project_id,
                attempt,
                ..
            } => tracing::info!(
                user_id = %user_id,
                project_id = %project_id,
                attempt,
                "Notify: workflow started"
            ),
            WorkflowEvent::RunFinished {
                project_id,
                attempt,
                status,
                errors,
                ..
            } => tracing::info!(
                user_id = %user_id,
                project_id = %project_id,
                attempt,
                status = %status,
                errors = errors.len(),
                "Notify: workflow finished"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DocumentId;
    use crate::workflow::StepSelection;

    #[test]
    fn test_finished_event_serializes() {
        let mut run = Run::pending(
            ProjectId::new("P1"),
            DocumentId::new("rfp"),
            None,
            StepSelection::all(),
        );
        run.attempt = 3;
        run.finish();

        let json = serde_json::to_value(WorkflowEvent::finished(&run)).unwrap();
        assert_eq!(json["event"], "run_finished");
        assert_eq!(json["projectId"], "P1");
        assert_eq!(json["attempt"], 3);
        assert_eq!(json["status"], "Failed");
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let run = Run::pending(
            ProjectId::new("P1"),
            DocumentId::new("rfp"),
            None,
            StepSelection::all(),
        );
        LogNotifier
            .notify(&UserId::new("u-1"), &WorkflowEvent::started(&run))
            .await
            .unwrap();
    }
}
