//! rfpflow - RFP Analysis Workflow Engine
//!
//! Turns an ingested client request document into structured sales insights
//! (executive summary, challenges, value propositions, discovery questions,
//! matched case studies) and a proposal draft, by running a fixed graph of
//! model-backed analysis steps in the background.
//!
//! ## Core Features
//!
//! - **Single active run per project**: concurrent start requests are rejected
//! - **Dependency-aware execution**: a failed step starves its dependents while
//!   independent steps keep running
//! - **Atomic insights**: each step's output becomes visible in one write, after
//!   which the step is reported completed
//! - **Pollable status**: a read-only projection of the run registry
//!
//! ## Quick Start
//!
//! ```ignore
//! use rfpflow::{Database, StepRegistry, WorkflowCoordinator};
//!
//! let db = Arc::new(Database::open("rfpflow.db")?);
//! db.initialize()?;
//! let coordinator = WorkflowCoordinator::new(
//!     Arc::new(SqliteRunRegistry::new(db.clone())),
//!     Arc::new(SqliteInsightsStore::new(db.clone())),
//!     StepRegistry::with_defaults(runtime, case_studies),
//! );
//! let handle = coordinator.start_run(request)?;
//! let snapshot = handle.wait_for_terminal(&coordinator.status_service(), poll).await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: LLM provider abstraction, JSON repair, prompt building
//! - [`retrieval`]: per-project passage index
//! - [`storage`]: SQLite persistence with connection pooling
//! - [`workflow`]: step graph, executors, coordinator, status service
//! - [`server`]: HTTP surface

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod retrieval;
pub mod server;
pub mod storage;
pub mod types;
pub mod workflow;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader};

// Error Types
pub use types::error::{ErrorCategory, Result, ResultExt, RfpError, StepError};
pub use types::{DocumentId, ProjectId, RunId, UserId};

// Storage
pub use storage::{
    CaseStudy, CaseStudyStore, Database, InsightsStore, PoolConfig, RunRegistry, SharedDatabase,
    SqliteCaseStudyStore, SqliteInsightsStore, SqliteRunRegistry,
};

// Retrieval
pub use retrieval::{Passage, RetrievalIndex, SqliteRetrievalIndex};

// =============================================================================
// Workflow Re-exports
// =============================================================================

pub use workflow::{
    Insights, Run, RunHandle, RunSnapshot, RunStatus, StartRunRequest, StatusQueryService,
    StepExecutor, StepFlags, StepId, StepOutput, StepRegistry, StepRuntime, StepSelection,
    StepState, WorkflowCoordinator,
};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{LlmProvider, LlmResponse, ProviderConfig, SharedProvider, create_provider};
