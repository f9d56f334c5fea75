//! Workflow Coordinator
//!
//! Owns the run lifecycle. `start_run` acquires the project's single active
//! slot and hands execution to a background task; the task walks the selected
//! steps in dependency order and is the only writer of that run.
//!
//! Per step:
//! - a failed or starved prerequisite starves the step (`Skipped`, no error)
//! - executor success merges the output into the insights store *before* the
//!   step is marked `Completed`
//! - executor failure (error, timeout, panic, empty output) marks the step
//!   `Failed` and the loop continues
//!
//! A persistence fault is the only thing that stops the loop early; the run
//! then ends in `Error`. So does a panic outside an executor, caught around
//! the spawned task. Notifications are delivered on their own tasks and can
//! neither delay nor fail a run.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use super::executors::{ExecutionContext, StepRegistry};
use super::notify::{LogNotifier, SharedNotifier, WorkflowEvent};
use super::run::Run;
use super::status::{RunSnapshot, StatusQueryService};
use super::step::{StepId, StepSelection, StepState};
use super::StepOutput;
use crate::ai::with_timeout_map;
use crate::constants::workflow::{INTERRUPTED_MESSAGE, NOTIFY_TIMEOUT_SECS, STEP_TIMEOUT_SECS};
use crate::storage::database::panic_message;
use crate::storage::{InsightsStore, RunRegistry};
use crate::types::{DocumentId, ProjectId, Result, RfpError, RunId, StepError, UserId};

// =============================================================================
// Requests and Handles
// =============================================================================

#[derive(Debug, Clone)]
pub struct StartRunRequest {
    pub project_id: ProjectId,
    pub document_id: DocumentId,
    pub user_id: Option<UserId>,
    pub selection: StepSelection,
}

/// Returned by [`WorkflowCoordinator::start_run`] once the run is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHandle {
    pub run_id: RunId,
    pub project_id: ProjectId,
    pub attempt: u32,
}

impl RunHandle {
    /// Poll `status` until this run, or a later attempt, is terminal.
    pub async fn wait_for_terminal(
        &self,
        status: &StatusQueryService,
        poll_interval: Duration,
    ) -> Result<RunSnapshot> {
        self.watch(status, poll_interval, |_| {}).await
    }

    /// Like [`wait_for_terminal`](Self::wait_for_terminal), handing every
    /// non-terminal snapshot to `on_poll`.
    pub async fn watch<F>(
        &self,
        status: &StatusQueryService,
        poll_interval: Duration,
        mut on_poll: F,
    ) -> Result<RunSnapshot>
    where
        F: FnMut(&RunSnapshot),
    {
        loop {
            let snapshot = status.get_status(&self.project_id)?;
            let superseded = snapshot.attempt.is_some_and(|a| a > self.attempt);
            if snapshot.is_terminal() || superseded {
                return Ok(snapshot);
            }
            on_poll(&snapshot);
            tokio::time::sleep(poll_interval).await;
        }
    }
}

// =============================================================================
// Coordinator
// =============================================================================

#[derive(Clone)]
pub struct WorkflowCoordinator {
    runs: Arc<dyn RunRegistry>,
    insights: Arc<dyn InsightsStore>,
    executors: Arc<StepRegistry>,
    notifier: SharedNotifier,
    step_timeout: Duration,
    notify_timeout: Duration,
}

impl WorkflowCoordinator {
    pub fn new(
        runs: Arc<dyn RunRegistry>,
        insights: Arc<dyn InsightsStore>,
        executors: StepRegistry,
    ) -> Self {
        Self {
            runs,
            insights,
            executors: Arc::new(executors),
            notifier: Arc::new(LogNotifier),
            step_timeout: Duration::from_secs(STEP_TIMEOUT_SECS),
            notify_timeout: Duration::from_secs(NOTIFY_TIMEOUT_SECS),
        }
    }

    pub fn with_notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Upper bound on a single executor invocation
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    /// Read-only view over the same run registry
    pub fn status_service(&self) -> StatusQueryService {
        StatusQueryService::new(self.runs.clone())
    }

    /// Persist a pending run and execute it in the background.
    ///
    /// Returns as soon as the run row exists. Fails with
    /// [`RfpError::RunAlreadyActive`] when the project already has a pending
    /// or running attempt. Must be called from within a tokio runtime.
    #[instrument(skip(self, request), fields(project_id = %request.project_id))]
    pub fn start_run(&self, request: StartRunRequest) -> Result<RunHandle> {
        if let Some(step) = request
            .selection
            .iter()
            .find(|step| self.executors.get(*step).is_none())
        {
            return Err(RfpError::InvalidSelection(format!(
                "no executor registered for {}",
                step
            )));
        }

        let pending = Run::pending(
            request.project_id,
            request.document_id,
            request.user_id,
            request.selection,
        );
        let run = self.runs.try_acquire(&pending)?;

        info!(
            "Workflow: Run {} (attempt {}) accepted with {} steps",
            run.id,
            run.attempt,
            run.selected_steps.len()
        );

        let handle = RunHandle {
            run_id: run.id.clone(),
            project_id: run.project_id.clone(),
            attempt: run.attempt,
        };

        let coordinator = self.clone();
        tokio::spawn(async move {
            let project_id = run.project_id.clone();
            let run_id = run.id.clone();
            if let Err(payload) = AssertUnwindSafe(coordinator.execute(run))
                .catch_unwind()
                .await
            {
                coordinator.settle_panicked_run(
                    &project_id,
                    &run_id,
                    panic_message(payload.as_ref()),
                );
            }
        });

        Ok(handle)
    }

    /// Drive an acquired run to a terminal status and return its final state.
    #[instrument(skip_all, fields(project_id = %run.project_id, attempt = run.attempt))]
    pub async fn execute(&self, mut run: Run) -> Run {
        run.mark_running();
        if let Err(e) = self
            .runs
            .upsert(&run)
            .and_then(|_| self.insights.get_or_create(&run.project_id).map(drop))
        {
            return self.abort(run, None, e);
        }
        self.notify(&run, WorkflowEvent::started(&run));

        let mut outputs: BTreeMap<StepId, StepOutput> = BTreeMap::new();

        for step in run.selected_steps.execution_order() {
            if run.step_state(step) != StepState::Pending {
                continue;
            }

            if let Some(blocker) = run.blocking_prerequisite(step) {
                info!("Workflow: Skipping {} ({} did not complete)", step, blocker);
                run.set_step_state(step, StepState::Skipped);
                if let Err(e) = self.runs.upsert(&run) {
                    return self.abort(run, None, e);
                }
                continue;
            }

            run.set_step_state(step, StepState::Running);
            if let Err(e) = self.runs.upsert(&run) {
                return self.abort(run, Some(step), e);
            }

            let mut ctx = ExecutionContext::new(run.project_id.clone(), run.document_id.clone());
            for dep in run.selected_steps.prerequisites(step) {
                if let Some(output) = outputs.get(&dep) {
                    ctx.dependencies.insert(dep, output.clone());
                }
            }

            info!("Workflow: Running {}", step.display_name());
            match self.invoke(step, &ctx).await {
                Ok(output) => {
                    // Insights first: a poller that sees Completed must find the fragment.
                    if let Err(e) = self.insights.merge_field(&run.project_id, &output) {
                        return self.abort(run, Some(step), e);
                    }
                    run.set_step_state(step, StepState::Completed);
                    if let Err(e) = self.runs.upsert(&run) {
                        return self.abort(run, Some(step), e);
                    }
                    info!(
                        "Workflow: {} completed ({} items)",
                        step.display_name(),
                        output.item_count()
                    );
                    outputs.insert(step, output);
                }
                Err(StepError::UpstreamDependencyFailed(dep)) => {
                    info!("Workflow: Skipping {} (no output from {})", step, dep);
                    run.set_step_state(step, StepState::Skipped);
                    if let Err(e) = self.runs.upsert(&run) {
                        return self.abort(run, None, e);
                    }
                }
                Err(err) => {
                    warn!("Workflow: {} failed: {}", step.display_name(), err);
                    run.record_failure(step, &err);
                    if let Err(e) = self.runs.upsert(&run) {
                        return self.abort(run, None, e);
                    }
                }
            }
        }

        run.finish();
        if let Err(e) = self.runs.upsert(&run) {
            error!("Workflow: Failed to persist final state of run {}: {}", run.id, e);
        }
        info!(
            "Workflow: Run {} finished as {} ({} errors)",
            run.id,
            run.overall_status,
            run.errors.len()
        );
        self.notify(&run, WorkflowEvent::finished(&run));
        run
    }

    /// Invoke one executor under the step timeout, isolating panics.
    async fn invoke(
        &self,
        step: StepId,
        ctx: &ExecutionContext,
    ) -> std::result::Result<StepOutput, StepError> {
        let Some(executor) = self.executors.get(step) else {
            return Err(StepError::Execution(format!(
                "no executor registered for {}",
                step
            )));
        };

        let guarded = AssertUnwindSafe(executor.execute(ctx)).catch_unwind();
        let output = match with_timeout_map(self.step_timeout, guarded, step.as_str()).await? {
            Ok(result) => result?,
            Err(payload) => return Err(StepError::Panicked(panic_message(payload.as_ref()))),
        };

        if output.step_id() != step {
            return Err(StepError::Execution(format!(
                "executor for {} returned {} output",
                step,
                output.step_id()
            )));
        }
        if output.is_empty() {
            return Err(StepError::InvalidOutput(format!(
                "{} produced no results",
                step.display_name()
            )));
        }
        Ok(output)
    }

    /// End the run in `Error` after a persistence fault.
    fn abort(&self, mut run: Run, step: Option<StepId>, cause: RfpError) -> Run {
        error!(
            "Workflow: Aborting run {} after persistence fault: {}",
            run.id, cause
        );
        run.abort(step, &format!("persistence unavailable: {}", cause));
        if let Err(e) = self.runs.upsert(&run) {
            error!("Workflow: Could not record aborted run {}: {}", run.id, e);
        }
        self.notify(&run, WorkflowEvent::finished(&run));
        run
    }

    /// End a run whose task panicked outside an executor.
    ///
    /// Only touches the row if it is still this run and still active.
    fn settle_panicked_run(&self, project_id: &ProjectId, run_id: &RunId, message: String) {
        error!("Workflow: Run {} panicked: {}", run_id, message);
        let mut run = match self.runs.get(project_id) {
            Ok(Some(run)) if &run.id == run_id && run.overall_status.is_active() => run,
            Ok(_) => return,
            Err(e) => {
                error!("Workflow: Could not load panicked run {}: {}", run_id, e);
                return;
            }
        };
        let in_flight = run
            .selected_steps
            .iter()
            .find(|step| run.step_state(*step) == StepState::Running);
        run.abort(in_flight, &format!("coordinator panicked: {}", message));
        if let Err(e) = self.runs.upsert(&run) {
            error!("Workflow: Could not record panicked run {}: {}", run_id, e);
            return;
        }
        self.notify(&run, WorkflowEvent::finished(&run));
    }

    /// Deliver `event` to the run's requester on a detached task.
    fn notify(&self, run: &Run, event: WorkflowEvent) {
        let Some(user_id) = run.user_id.clone() else {
            return;
        };
        let notifier = self.notifier.clone();
        let timeout = self.notify_timeout;
        tokio::spawn(async move {
            let delivery = AssertUnwindSafe(notifier.notify(&user_id, &event)).catch_unwind();
            match with_timeout_map(timeout, delivery, "notification").await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => warn!("Workflow: Notification to {} failed: {}", user_id, e),
                Ok(Err(payload)) => warn!(
                    "Workflow: Notifier panicked for {}: {}",
                    user_id,
                    panic_message(payload.as_ref())
                ),
                Err(e) => warn!("Workflow: Notification to {} abandoned: {}", user_id, e),
            }
        });
    }

    /// Mark runs left pending or running by a previous process as `Error`.
    ///
    /// Call once at startup, before accepting requests; nothing else in this
    /// process can be driving those runs yet. Returns the number recovered.
    pub fn recover_interrupted_runs(&self) -> Result<usize> {
        let active = self.runs.list_active()?;
        for mut run in active.iter().cloned() {
            let in_flight = run
                .selected_steps
                .iter()
                .find(|step| run.step_state(*step) == StepState::Running);
            run.abort(in_flight, INTERRUPTED_MESSAGE);
            self.runs.upsert(&run)?;
            warn!(
                "Workflow: Recovered interrupted run {} for project {}",
                run.id, run.project_id
            );
        }
        Ok(active.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, SqliteInsightsStore, SqliteRunRegistry};
    use crate::workflow::executors::StepExecutor;
    use crate::workflow::{Challenge, RfpAnalysis, RunStatus, StepFlags};
    use async_trait::async_trait;

    struct Answer(StepId);

    #[async_trait]
    impl StepExecutor for Answer {
        fn step_id(&self) -> StepId {
            self.0
        }

        async fn execute(&self, _ctx: &ExecutionContext) -> std::result::Result<StepOutput, StepError> {
            match self.0 {
                StepId::RfpAnalyzer => Ok(StepOutput::RfpAnalysis(RfpAnalysis {
                    executive_summary: "Claims platform".to_string(),
                    ..Default::default()
                })),
                StepId::ChallengeExtractor => Ok(StepOutput::Challenges(vec![Challenge {
                    title: "Backlog".to_string(),
                    description: "Claims wait 12 days".to_string(),
                    impact: None,
                }])),
                // Wrong shape on purpose
                _ => Ok(StepOutput::Challenges(Vec::new())),
            }
        }
    }

    struct Sleeper;

    #[async_trait]
    impl StepExecutor for Sleeper {
        fn step_id(&self) -> StepId {
            StepId::ChallengeExtractor
        }

        async fn execute(&self, _ctx: &ExecutionContext) -> std::result::Result<StepOutput, StepError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(StepOutput::Challenges(Vec::new()))
        }
    }

    fn coordinator(registry: StepRegistry) -> WorkflowCoordinator {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();
        WorkflowCoordinator::new(
            Arc::new(SqliteRunRegistry::new(db.clone())),
            Arc::new(SqliteInsightsStore::new(db)),
            registry,
        )
    }

    fn request(flags: StepFlags) -> StartRunRequest {
        StartRunRequest {
            project_id: ProjectId::new("P1"),
            document_id: DocumentId::new("rfp"),
            user_id: None,
            selection: StepSelection::from_flags(&flags).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_missing_executor_rejected() {
        let coordinator =
            coordinator(StepRegistry::new().register(Arc::new(Answer(StepId::RfpAnalyzer))));
        let err = coordinator
            .start_run(request(StepFlags {
                questions: true,
                ..Default::default()
            }))
            .unwrap_err();
        assert!(matches!(err, RfpError::InvalidSelection(_)));
    }

    #[tokio::test]
    async fn test_timeout_and_wrong_output_fail_steps() {
        let coordinator = coordinator(
            StepRegistry::new()
                .register(Arc::new(Answer(StepId::RfpAnalyzer)))
                .register(Arc::new(Sleeper))
                .register(Arc::new(Answer(StepId::ValueProposition)))
                .register(Arc::new(Answer(StepId::DiscoveryQuestion))),
        )
        .with_step_timeout(Duration::from_millis(50));

        let handle = coordinator
            .start_run(request(StepFlags {
                challenges: true,
                questions: true,
                ..Default::default()
            }))
            .unwrap();
        let snapshot = tokio::time::timeout(
            Duration::from_secs(5),
            handle.wait_for_terminal(&coordinator.status_service(), Duration::from_millis(10)),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(snapshot.steps[&StepId::ChallengeExtractor], StepState::Failed);
        assert_eq!(snapshot.steps[&StepId::ValueProposition], StepState::Skipped);
        assert_eq!(snapshot.steps[&StepId::DiscoveryQuestion], StepState::Failed);
        assert_eq!(snapshot.errors.len(), 2);
        assert!(snapshot.errors[0].starts_with("challenge_extractor: timed out"));
        assert!(snapshot.errors[1].starts_with("discovery_question: executor for"));
    }

    #[tokio::test]
    async fn test_recover_interrupted_runs() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();
        let runs = Arc::new(SqliteRunRegistry::new(db.clone()));

        let mut run = runs
            .try_acquire(&Run::pending(
                ProjectId::new("P1"),
                DocumentId::new("rfp"),
                None,
                StepSelection::all(),
            ))
            .unwrap();
        run.mark_running();
        run.set_step_state(StepId::RfpAnalyzer, StepState::Running);
        runs.upsert(&run).unwrap();

        let coordinator = WorkflowCoordinator::new(
            runs.clone(),
            Arc::new(SqliteInsightsStore::new(db)),
            StepRegistry::new(),
        );
        assert_eq!(coordinator.recover_interrupted_runs().unwrap(), 1);
        assert_eq!(coordinator.recover_interrupted_runs().unwrap(), 0);

        let recovered = runs.get(&ProjectId::new("P1")).unwrap().unwrap();
        assert_eq!(recovered.overall_status, RunStatus::Error);
        assert_eq!(recovered.step_state(StepId::RfpAnalyzer), StepState::Failed);
        assert_eq!(recovered.errors.len(), 1);
    }
}
