//! Real executors against the SQLite retrieval index, the case study catalog
//! and a schema-routed mock model; plus the HTTP surface over the same stack.

mod common;

use async_trait::async_trait;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use common::{POLL, run_to_end, temp_db};
use rfpflow::ai::LlmError;
use rfpflow::server::{AppState, build_app};
use rfpflow::{
    CaseStudy, CaseStudyStore, DocumentId, ErrorCategory, InsightsStore, LlmProvider,
    LlmResponse, ProjectId, Result, RunStatus, SharedDatabase, SqliteCaseStudyStore,
    SqliteInsightsStore, SqliteRetrievalIndex, SqliteRunRegistry, StartRunRequest, StepFlags,
    StepId, StepRegistry, StepRuntime, StepSelection, WorkflowCoordinator,
};

const RFP_TEXT: &str = "Acme Insurance invites proposals to replace its claims management \
    platform. The current mainframe system processes 40,000 claims a month and adjusters \
    re-key data into three tools. Requirements: cloud hosting, integration with the policy \
    administration system, and a customer self-service portal. Proposals are evaluated on \
    cost, delivery approach and insurance references. Submissions are due 30 June.";

/// Answers according to the top-level required field of the output schema.
struct SchemaRouter {
    failing: Option<&'static str>,
    prompts: Mutex<Vec<String>>,
}

impl SchemaRouter {
    fn new(failing: Option<&'static str>) -> Arc<Self> {
        Arc::new(Self {
            failing,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn answer(key: &str) -> Value {
        match key {
            "executiveSummary" => json!({
                "executiveSummary": "Acme Insurance wants a cloud claims platform.",
                "clientName": "Acme Insurance",
                "industry": "Insurance",
                "keyRequirements": ["Cloud hosting", "Self-service portal"],
                "evaluationCriteria": ["Cost"],
                "deadlines": ["30 June"]
            }),
            "challenges" => json!({
                "challenges": [
                    {"title": "Manual re-keying", "description": "Adjusters copy data between three tools", "impact": "high"}
                ]
            }),
            "valuePropositions" => json!({
                "valuePropositions": [
                    {"challenge": "Manual re-keying", "proposition": "Single claims workspace", "benefits": ["Fewer errors"]}
                ]
            }),
            "categories" => json!({
                "categories": [
                    {"category": "Integration", "questions": ["Which policy system version is in use?"]}
                ]
            }),
            "matches" => json!({
                "matches": [{"caseStudyId": "cs-1", "relevance": 0.8, "rationale": "Claims in insurance"}]
            }),
            _ => json!({
                "title": "Claims platform proposal",
                "sections": [{"heading": "Approach", "body": "Phased migration off the mainframe"}]
            }),
        }
    }
}

#[async_trait]
impl LlmProvider for SchemaRouter {
    async fn generate(&self, prompt: &str, schema: &Value) -> Result<LlmResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let key = schema["required"][0].as_str().unwrap_or_default().to_string();
        if self.failing == Some(key.as_str()) {
            return Err(LlmError::new(ErrorCategory::Unavailable, "model overloaded").into());
        }
        Ok(LlmResponse::content_only(Self::answer(&key)))
    }

    fn name(&self) -> &str {
        "router"
    }

    fn model(&self) -> &str {
        "router-1"
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

fn seed(db: &SharedDatabase) {
    SqliteRetrievalIndex::new(db.clone())
        .index_document(
            &ProjectId::new("P1"),
            &DocumentId::new("rfp-1"),
            Some("Claims RFP"),
            RFP_TEXT,
        )
        .unwrap();
    SqliteCaseStudyStore::new(db.clone())
        .upsert(&CaseStudy {
            id: "cs-1".to_string(),
            title: "Claims automation for a regional insurer".to_string(),
            client: Some("Northwind Mutual".to_string()),
            industry: Some("Insurance".to_string()),
            summary: "Moved claims intake to the cloud".to_string(),
            tags: vec!["claims".to_string()],
        })
        .unwrap();
}

fn stack(db: &SharedDatabase, provider: Arc<SchemaRouter>) -> WorkflowCoordinator {
    let runtime = StepRuntime::new(provider, Arc::new(SqliteRetrievalIndex::new(db.clone())), 4);
    WorkflowCoordinator::new(
        Arc::new(SqliteRunRegistry::new(db.clone())),
        Arc::new(SqliteInsightsStore::new(db.clone())),
        StepRegistry::with_defaults(runtime, Arc::new(SqliteCaseStudyStore::new(db.clone()))),
    )
}

#[tokio::test]
async fn case_study_failure_leaves_partial_success() {
    let (_dir, db) = temp_db();
    seed(&db);
    let coordinator = stack(&db, SchemaRouter::new(Some("matches")));

    let snapshot = run_to_end(
        &coordinator,
        StartRunRequest {
            project_id: ProjectId::new("P1"),
            document_id: DocumentId::new("rfp-1"),
            user_id: None,
            selection: StepSelection::from_flags(&StepFlags {
                challenges: true,
                questions: true,
                cases: true,
                proposal: false,
            })
            .unwrap(),
        },
    )
    .await;

    assert_eq!(snapshot.status, RunStatus::Completed);
    let progress: Vec<(StepId, bool)> = snapshot.progress.clone().into_iter().collect();
    assert_eq!(
        progress,
        vec![
            (StepId::RfpAnalyzer, true),
            (StepId::ChallengeExtractor, true),
            (StepId::ValueProposition, true),
            (StepId::DiscoveryQuestion, true),
            (StepId::CaseStudyMatcher, false),
        ]
    );
    assert_eq!(snapshot.errors.len(), 1);
    assert!(snapshot.errors[0].starts_with("case_study_matcher: "));

    let insights = SqliteInsightsStore::new(db.clone())
        .get(&ProjectId::new("P1"))
        .unwrap()
        .unwrap();
    assert_eq!(
        insights.executive_summary.as_deref(),
        Some("Acme Insurance wants a cloud claims platform.")
    );
    assert_eq!(insights.challenges[0].title, "Manual re-keying");
    assert_eq!(insights.value_propositions.len(), 1);
    assert_eq!(
        insights.discovery_questions["Integration"],
        vec!["Which policy system version is in use?"]
    );
    assert!(insights.matching_case_studies.is_empty());
    assert!(insights.proposal_draft.is_none());
}

#[tokio::test]
async fn full_run_grounds_prompts_and_drafts_proposal() {
    let (_dir, db) = temp_db();
    seed(&db);
    let provider = SchemaRouter::new(None);
    let coordinator = stack(&db, provider.clone());

    let snapshot = run_to_end(
        &coordinator,
        StartRunRequest {
            project_id: ProjectId::new("P1"),
            document_id: DocumentId::new("rfp-1"),
            user_id: None,
            selection: StepSelection::all(),
        },
    )
    .await;

    assert_eq!(snapshot.status, RunStatus::Completed);
    assert!(snapshot.errors.is_empty());
    assert!(snapshot.progress.values().all(|done| *done));

    let prompts = provider.prompts.lock().unwrap().clone();
    assert_eq!(prompts.len(), 6);
    assert!(prompts[0].contains("mainframe"));
    // The drafter sees upstream output.
    assert!(prompts[5].contains("Manual re-keying"));

    let insights = SqliteInsightsStore::new(db.clone())
        .get(&ProjectId::new("P1"))
        .unwrap()
        .unwrap();
    assert_eq!(insights.matching_case_studies[0].case_study_id, "cs-1");
    assert_eq!(
        insights.proposal_draft.map(|d| d.title).as_deref(),
        Some("Claims platform proposal")
    );
}

#[tokio::test]
async fn unindexed_project_fails_without_calling_the_model() {
    let (_dir, db) = temp_db();
    let provider = SchemaRouter::new(None);
    let coordinator = stack(&db, provider.clone());

    let snapshot = run_to_end(
        &coordinator,
        StartRunRequest {
            project_id: ProjectId::new("P9"),
            document_id: DocumentId::new("missing"),
            user_id: None,
            selection: StepSelection::all(),
        },
    )
    .await;

    assert_eq!(snapshot.status, RunStatus::Failed);
    assert_eq!(snapshot.errors.len(), 1);
    assert!(snapshot.errors[0].contains("not ready"));
    assert!(provider.prompts.lock().unwrap().is_empty());
}

// =============================================================================
// HTTP
// =============================================================================

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

fn start_body() -> Body {
    Body::from(
        json!({"projectId": "P1", "documentId": "rfp-1", "steps": {"questions": true}}).to_string(),
    )
}

#[tokio::test]
async fn http_start_conflict_then_status_and_insights() {
    let (_dir, db) = temp_db();
    seed(&db);
    let coordinator = stack(&db, SchemaRouter::new(None));
    let app = build_app(AppState::new(
        coordinator.clone(),
        Arc::new(SqliteInsightsStore::new(db.clone())),
        db.clone(),
    ));

    let post = || {
        Request::post("/api/workflow/start")
            .header("content-type", "application/json")
            .body(start_body())
            .unwrap()
    };

    let (status, body) = send(&app, post()).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], true);
    assert_eq!(body["attempt"], 1);

    // The run is either still active (409) or already finished (202, attempt 2).
    let (status, body) = send(&app, post()).await;
    match status {
        StatusCode::CONFLICT => {
            assert_eq!(body["success"], false);
            assert_eq!(body["code"], "RUN_ALREADY_ACTIVE");
        }
        StatusCode::ACCEPTED => assert_eq!(body["attempt"], 2),
        other => panic!("unexpected status {other}"),
    }

    let terminal = loop {
        let (_, body) = send(
            &app,
            Request::get("/api/workflow/status/P1").body(Body::empty()).unwrap(),
        )
        .await;
        if matches!(body["status"].as_str(), Some("Completed" | "Failed" | "Error")) {
            break body;
        }
        tokio::time::sleep(POLL).await;
    };
    assert_eq!(terminal["status"], "Completed");
    assert_eq!(terminal["progress"]["discovery_question"], true);
    assert_eq!(terminal["steps"]["challenge_extractor"], "skipped");

    let (status, body) = send(
        &app,
        Request::get("/api/projects/P1/insights").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["discoveryQuestions"]["Integration"][0],
        "Which policy system version is in use?"
    );
}

#[tokio::test]
async fn http_empty_selection_is_unprocessable() {
    let (_dir, db) = temp_db();
    let coordinator = stack(&db, SchemaRouter::new(None));
    let app = build_app(AppState::new(
        coordinator,
        Arc::new(SqliteInsightsStore::new(db.clone())),
        db.clone(),
    ));

    let (status, body) = send(
        &app,
        Request::post("/api/workflow/start")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"projectId": "P1", "documentId": "rfp-1", "steps": {}}).to_string(),
            ))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let history = coordinator_history(&db);
    assert!(history.is_empty());
}

fn coordinator_history(db: &SharedDatabase) -> Vec<rfpflow::RunSnapshot> {
    rfpflow::StatusQueryService::new(Arc::new(SqliteRunRegistry::new(db.clone())))
        .history(&ProjectId::new("P1"))
        .unwrap()
}
