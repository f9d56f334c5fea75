//! HTTP surface
//!
//! Thin axum layer over the coordinator, the status service and the insights
//! store. Start-run returns as soon as the run is persisted; everything else is
//! a read.

mod error;
mod handlers;

pub use error::{ApiError, ApiResult};
pub use handlers::{AppState, StartWorkflowBody, StartWorkflowResponse, create_router};

use axum::Router;
use std::net::SocketAddr;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::types::{Result, RfpError};

/// Router with state, CORS and request tracing applied
pub fn build_app(state: AppState) -> Router {
    create_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub struct RfpServer {
    config: ServerConfig,
    state: AppState,
}

impl RfpServer {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.config.host, self.config.port)
            .parse::<SocketAddr>()
            .map_err(|e| RfpError::Server(format!("Invalid bind address: {}", e)))
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.config.host, self.config.port)
    }

    /// Serve until Ctrl+C or SIGTERM.
    pub async fn serve(self) -> Result<()> {
        let addr = self.socket_addr()?;
        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("Failed to bind to {}: {:?}", addr, e);
            RfpError::Server(format!("Failed to bind to {}: {}", addr, e))
        })?;

        info!("Server listening on: {}", self.server_url());

        axum::serve(listener, build_app(self.state))
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| RfpError::Server(format!("Server error: {}", e)))
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
                info!("Received TERM signal");
            }
            Err(e) => {
                error!("Failed to install TERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Database, SqliteInsightsStore, SqliteRunRegistry};
    use crate::workflow::{StepRegistry, WorkflowCoordinator};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.initialize().unwrap();
        let insights = Arc::new(SqliteInsightsStore::new(db.clone()));
        let coordinator = WorkflowCoordinator::new(
            Arc::new(SqliteRunRegistry::new(db.clone())),
            insights.clone(),
            StepRegistry::new(),
        );
        build_app(AppState::new(coordinator, insights, db))
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get_json(app(), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_not_started() {
        let (status, body) = get_json(app(), "/api/workflow/status/P1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "NotStarted");
        assert_eq!(body["errors"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_missing_insights_is_404() {
        let (status, body) = get_json(app(), "/api/projects/P1/insights").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_start_without_executors_is_422() {
        let response = app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/workflow/start")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"projectId":"P1","documentId":"rfp","steps":{"questions":true}}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
