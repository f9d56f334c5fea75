//! HTTP handlers

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::error::{ApiError, ApiResult};
use crate::storage::{InsightsStore, SharedDatabase};
use crate::types::{DocumentId, ProjectId, RunId, UserId};
use crate::workflow::{
    Insights, RunSnapshot, StartRunRequest, StatusQueryService, StepFlags, StepSelection,
    WorkflowCoordinator,
};

/// State shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: WorkflowCoordinator,
    pub status: StatusQueryService,
    pub insights: Arc<dyn InsightsStore>,
    pub db: SharedDatabase,
}

impl AppState {
    pub fn new(
        coordinator: WorkflowCoordinator,
        insights: Arc<dyn InsightsStore>,
        db: SharedDatabase,
    ) -> Self {
        Self {
            status: coordinator.status_service(),
            coordinator,
            insights,
            db,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWorkflowBody {
    pub project_id: String,
    pub document_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub steps: StepFlags,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWorkflowResponse {
    pub success: bool,
    pub run_id: RunId,
    pub attempt: u32,
}

/// POST /api/workflow/start
pub async fn start_workflow(
    State(state): State<AppState>,
    Json(body): Json<StartWorkflowBody>,
) -> ApiResult<(StatusCode, Json<StartWorkflowResponse>)> {
    if body.project_id.trim().is_empty() || body.document_id.trim().is_empty() {
        return Err(ApiError::validation(
            "projectId and documentId are required",
        ));
    }

    let selection = StepSelection::from_flags(&body.steps)?;
    let handle = state.coordinator.start_run(StartRunRequest {
        project_id: ProjectId::new(body.project_id),
        document_id: DocumentId::new(body.document_id),
        user_id: body.user_id.map(UserId::new),
        selection,
    })?;

    info!(
        "Started workflow for {} (attempt {})",
        handle.project_id, handle.attempt
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(StartWorkflowResponse {
            success: true,
            run_id: handle.run_id,
            attempt: handle.attempt,
        }),
    ))
}

/// GET /api/workflow/status/:project_id
pub async fn workflow_status(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<RunSnapshot>> {
    Ok(Json(state.status.get_status(&ProjectId::new(project_id))?))
}

/// GET /api/workflow/history/:project_id
pub async fn workflow_history(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Vec<RunSnapshot>>> {
    Ok(Json(state.status.history(&ProjectId::new(project_id))?))
}

/// GET /api/projects/:project_id/insights
pub async fn project_insights(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
) -> ApiResult<Json<Insights>> {
    state
        .insights
        .get(&ProjectId::new(project_id.as_str()))?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("no insights for project {}", project_id)))
}

/// GET /api/health
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    state.db.ping()?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "service": "rfpflow",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/workflow/start", post(start_workflow))
        .route("/api/workflow/status/:project_id", get(workflow_status))
        .route("/api/workflow/history/:project_id", get(workflow_history))
        .route("/api/projects/:project_id/insights", get(project_insights))
}
