//! CLI Common Utilities
//!
//! Shared initialization for command handlers: configuration, the database
//! and, for commands that execute steps, the coordinator.

use std::path::Path;
use std::sync::Arc;

use crate::ai::{SharedProvider, create_provider};
use crate::config::{Config, ConfigLoader};
use crate::retrieval::{Chunker, SqliteRetrievalIndex};
use crate::storage::{
    Database, InsightsStore, PoolConfig, SharedDatabase, SqliteCaseStudyStore,
    SqliteInsightsStore, SqliteRunRegistry,
};
use crate::types::Result;
use crate::workflow::{StatusQueryService, StepRegistry, StepRuntime, WorkflowCoordinator};

/// Command execution context
#[derive(Clone)]
pub struct CommandContext {
    /// Loaded configuration
    pub config: Config,
    /// Shared database handle, schema initialized
    pub db: SharedDatabase,
}

impl CommandContext {
    /// Load configuration and open the database.
    ///
    /// An explicit `config_path` replaces the global/project resolution chain.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => ConfigLoader::load_from_file(path)?,
            None => ConfigLoader::load()?,
        };
        Self::with_config(config)
    }

    pub fn with_config(config: Config) -> Result<Self> {
        let db = Database::open_with_config(
            &config.storage.database,
            PoolConfig::with_max_size(config.storage.pool_size),
        )?;
        db.initialize()?;

        Ok(Self {
            config,
            db: Arc::new(db),
        })
    }

    pub fn retrieval(&self) -> SqliteRetrievalIndex {
        SqliteRetrievalIndex::with_chunker(
            self.db.clone(),
            Chunker::new(
                self.config.retrieval.chunk_size,
                self.config.retrieval.chunk_overlap,
            ),
        )
    }

    pub fn case_studies(&self) -> SqliteCaseStudyStore {
        SqliteCaseStudyStore::new(self.db.clone())
    }

    pub fn insights(&self) -> Arc<dyn InsightsStore> {
        Arc::new(SqliteInsightsStore::new(self.db.clone()))
    }

    pub fn status(&self) -> StatusQueryService {
        StatusQueryService::new(Arc::new(SqliteRunRegistry::new(self.db.clone())))
    }

    pub fn provider(&self) -> Result<SharedProvider> {
        create_provider(&self.config.llm.to_provider_config())
    }

    /// Coordinator wired with the configured provider and the default executors.
    pub fn coordinator(&self) -> Result<WorkflowCoordinator> {
        Ok(self.coordinator_with(self.provider()?))
    }

    pub fn coordinator_with(&self, provider: SharedProvider) -> WorkflowCoordinator {
        let runtime = StepRuntime::new(
            provider,
            Arc::new(self.retrieval()),
            self.config.workflow.retrieval_top_k,
        );
        let executors = StepRegistry::with_defaults(runtime, Arc::new(self.case_studies()));

        WorkflowCoordinator::new(
            Arc::new(SqliteRunRegistry::new(self.db.clone())),
            self.insights(),
            executors,
        )
        .with_step_timeout(self.config.workflow.step_timeout())
    }
}
