pub mod case_studies;
pub mod database;
pub mod insights_store;
pub mod run_registry;

pub use case_studies::{CaseStudy, CaseStudyStore, SqliteCaseStudyStore};
pub use database::{Database, PoolConfig, SharedDatabase};
pub use insights_store::{InsightsStore, SqliteInsightsStore};
pub use run_registry::{RunRegistry, SqliteRunRegistry};
