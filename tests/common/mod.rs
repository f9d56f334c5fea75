//! Shared fixtures for workflow integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Semaphore;

use rfpflow::workflow::{
    CaseStudyMatch, Challenge, DiscoveryQuestions, ExecutionContext, Notifier, ProposalDraft,
    ProposalSection, RfpAnalysis, ValueProposition, WorkflowEvent,
};
use rfpflow::{
    Database, DocumentId, Insights, InsightsStore, ProjectId, Result, RfpError, Run,
    RunRegistry, RunSnapshot, SharedDatabase, SqliteInsightsStore, SqliteRunRegistry,
    StartRunRequest, StepError, StepExecutor, StepFlags, StepId, StepOutput, StepRegistry,
    StepSelection, UserId, WorkflowCoordinator,
};

pub const POLL: Duration = Duration::from_millis(10);

/// File-backed database so pooled connections share state.
pub fn temp_db() -> (TempDir, SharedDatabase) {
    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("rfpflow.db")).unwrap();
    db.initialize().unwrap();
    (dir, Arc::new(db))
}

pub fn request(project: &str, flags: StepFlags) -> StartRunRequest {
    StartRunRequest {
        project_id: ProjectId::new(project),
        document_id: DocumentId::new("rfp-1"),
        user_id: None,
        selection: StepSelection::from_flags(&flags).unwrap(),
    }
}

pub fn all_flags() -> StepFlags {
    StepFlags {
        challenges: true,
        questions: true,
        cases: true,
        proposal: true,
    }
}

/// A valid, non-empty output for every step.
pub fn sample_output(step: StepId) -> StepOutput {
    match step {
        StepId::RfpAnalyzer => StepOutput::RfpAnalysis(RfpAnalysis {
            executive_summary: "Acme Insurance wants to replace its claims platform".to_string(),
            client_name: Some("Acme Insurance".to_string()),
            ..Default::default()
        }),
        StepId::ChallengeExtractor => StepOutput::Challenges(vec![Challenge {
            title: "Claims backlog".to_string(),
            description: "Claims wait twelve days for triage".to_string(),
            impact: Some("high".to_string()),
        }]),
        StepId::ValueProposition => StepOutput::ValuePropositions(vec![ValueProposition {
            challenge: "Claims backlog".to_string(),
            proposition: "Automated triage cuts waiting time to one day".to_string(),
            benefits: vec!["Lower handling cost".to_string()],
        }]),
        StepId::DiscoveryQuestion => {
            let mut questions = DiscoveryQuestions::new();
            questions.insert(
                "Timeline".to_string(),
                vec!["When must the new platform go live?".to_string()],
            );
            StepOutput::DiscoveryQuestions(questions)
        }
        StepId::CaseStudyMatcher => StepOutput::CaseStudyMatches(vec![CaseStudyMatch {
            case_study_id: "cs-1".to_string(),
            title: "Claims automation".to_string(),
            relevance: 0.9,
            rationale: "Same domain".to_string(),
        }]),
        StepId::ProposalDrafter => StepOutput::ProposalDraft(ProposalDraft {
            title: "Claims modernisation proposal".to_string(),
            sections: vec![ProposalSection {
                heading: "Approach".to_string(),
                body: "Phased migration".to_string(),
            }],
        }),
    }
}

// =============================================================================
// Mock Executors
// =============================================================================

pub enum Behavior {
    Succeed,
    Fail(StepError),
    Panic,
}

/// Scripted executor that counts its invocations and can be held behind a gate.
pub struct MockExecutor {
    step: StepId,
    behavior: Behavior,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    pub calls: AtomicUsize,
}

impl MockExecutor {
    pub fn new(step: StepId) -> Self {
        Self {
            step,
            behavior: Behavior::Succeed,
            delay: Duration::ZERO,
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(step: StepId, error: StepError) -> Self {
        Self {
            behavior: Behavior::Fail(error),
            ..Self::new(step)
        }
    }

    pub fn panicking(step: StepId) -> Self {
        Self {
            behavior: Behavior::Panic,
            ..Self::new(step)
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Block until a permit is added to `gate`.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StepExecutor for MockExecutor {
    fn step_id(&self) -> StepId {
        self.step
    }

    async fn execute(&self, _ctx: &ExecutionContext) -> std::result::Result<StepOutput, StepError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behavior {
            Behavior::Succeed => Ok(sample_output(self.step)),
            Behavior::Fail(error) => Err(error.clone()),
            Behavior::Panic => panic!("{} blew up", self.step),
        }
    }
}

/// Executors for every step, with overrides replacing the defaults.
pub struct MockSet {
    pub executors: Vec<Arc<MockExecutor>>,
}

impl MockSet {
    pub fn new(overrides: Vec<MockExecutor>) -> Self {
        let mut executors: Vec<Arc<MockExecutor>> = overrides.into_iter().map(Arc::new).collect();
        for step in StepId::ALL {
            if !executors.iter().any(|e| e.step == step) {
                executors.push(Arc::new(MockExecutor::new(step)));
            }
        }
        Self { executors }
    }

    pub fn registry(&self) -> StepRegistry {
        self.executors
            .iter()
            .fold(StepRegistry::new(), |registry, executor| {
                registry.register(executor.clone())
            })
    }

    pub fn calls(&self, step: StepId) -> usize {
        self.executors
            .iter()
            .find(|e| e.step == step)
            .map(|e| e.call_count())
            .unwrap_or_default()
    }
}

// =============================================================================
// Fault Injection
// =============================================================================

/// Insights store whose merge fails for one step.
pub struct FailingInsights {
    pub inner: SqliteInsightsStore,
    pub fail_on: StepId,
}

impl InsightsStore for FailingInsights {
    fn get_or_create(&self, project_id: &ProjectId) -> Result<Insights> {
        self.inner.get_or_create(project_id)
    }

    fn merge_field(&self, project_id: &ProjectId, output: &StepOutput) -> Result<()> {
        if output.step_id() == self.fail_on {
            return Err(RfpError::PersistenceUnavailable(
                "insights store unreachable".to_string(),
            ));
        }
        self.inner.merge_field(project_id, output)
    }

    fn get(&self, project_id: &ProjectId) -> Result<Option<Insights>> {
        self.inner.get(project_id)
    }
}

/// Run registry that rejects every write after the first `budget` upserts.
pub struct FailingRuns {
    pub inner: SqliteRunRegistry,
    pub budget: AtomicUsize,
}

impl RunRegistry for FailingRuns {
    fn try_acquire(&self, run: &Run) -> Result<Run> {
        self.inner.try_acquire(run)
    }

    fn get(&self, project_id: &ProjectId) -> Result<Option<Run>> {
        self.inner.get(project_id)
    }

    fn upsert(&self, run: &Run) -> Result<()> {
        let remaining = self.budget.load(Ordering::SeqCst);
        if remaining == 0 {
            return Err(RfpError::PersistenceUnavailable("disk full".to_string()));
        }
        self.budget.store(remaining - 1, Ordering::SeqCst);
        self.inner.upsert(run)
    }

    fn history(&self, project_id: &ProjectId) -> Result<Vec<Run>> {
        self.inner.history(project_id)
    }

    fn list_active(&self) -> Result<Vec<Run>> {
        self.inner.list_active()
    }
}

/// Run registry that panics on one upsert (1-based) and behaves afterwards.
pub struct PanickingRuns {
    pub inner: SqliteRunRegistry,
    pub panic_on: usize,
    pub upserts: AtomicUsize,
}

impl RunRegistry for PanickingRuns {
    fn try_acquire(&self, run: &Run) -> Result<Run> {
        self.inner.try_acquire(run)
    }

    fn get(&self, project_id: &ProjectId) -> Result<Option<Run>> {
        self.inner.get(project_id)
    }

    fn upsert(&self, run: &Run) -> Result<()> {
        if self.upserts.fetch_add(1, Ordering::SeqCst) + 1 == self.panic_on {
            panic!("run registry poisoned");
        }
        self.inner.upsert(run)
    }

    fn history(&self, project_id: &ProjectId) -> Result<Vec<Run>> {
        self.inner.history(project_id)
    }

    fn list_active(&self) -> Result<Vec<Run>> {
        self.inner.list_active()
    }
}

// =============================================================================
// Notifiers
// =============================================================================

pub enum Delivery {
    Record,
    Fail,
    Panic,
    Hang,
}

/// Notifier that records what it was given before acting out `delivery`.
pub struct ScriptedNotifier {
    pub delivery: Delivery,
    pub events: Mutex<Vec<(UserId, WorkflowEvent)>>,
}

impl ScriptedNotifier {
    pub fn new(delivery: Delivery) -> Arc<Self> {
        Arc::new(Self {
            delivery,
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<(UserId, WorkflowEvent)> {
        self.events.lock().unwrap().clone()
    }

    /// Delivery is detached from the run; wait until `count` events landed.
    pub async fn wait_for(&self, count: usize) -> Vec<(UserId, WorkflowEvent)> {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let events = self.events();
                if events.len() >= count {
                    break events;
                }
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .expect("notifications were not delivered")
    }
}

#[async_trait]
impl Notifier for ScriptedNotifier {
    async fn notify(&self, user_id: &UserId, event: &WorkflowEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push((user_id.clone(), event.clone()));
        match self.delivery {
            Delivery::Record => Ok(()),
            Delivery::Fail => Err(RfpError::Server("mail relay refused".to_string())),
            Delivery::Panic => panic!("notifier exploded"),
            Delivery::Hang => std::future::pending().await,
        }
    }
}

// =============================================================================
// Coordinator Helpers
// =============================================================================

pub fn coordinator(db: &SharedDatabase, registry: StepRegistry) -> WorkflowCoordinator {
    WorkflowCoordinator::new(
        Arc::new(SqliteRunRegistry::new(db.clone())),
        Arc::new(SqliteInsightsStore::new(db.clone())),
        registry,
    )
}

pub fn request_for(project: &str, user: &str, flags: StepFlags) -> StartRunRequest {
    StartRunRequest {
        user_id: Some(UserId::new(user)),
        ..request(project, flags)
    }
}

/// Start a run and wait for it to settle, failing the test after five seconds.
pub async fn run_to_end(
    coordinator: &WorkflowCoordinator,
    request: StartRunRequest,
) -> RunSnapshot {
    let handle = coordinator.start_run(request).unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        handle.wait_for_terminal(&coordinator.status_service(), POLL),
    )
    .await
    .expect("run did not finish in time")
    .unwrap()
}
