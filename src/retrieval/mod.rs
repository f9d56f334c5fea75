//! Retrieval collaborator
//!
//! Steps ground their prompts in passages of the ingested RFP. The engine only
//! depends on [`RetrievalIndex`]; [`SqliteRetrievalIndex`] is the bundled
//! keyword implementation used by the CLI and tests.

mod chunker;
mod sqlite;

pub use chunker::Chunker;
pub use sqlite::SqliteRetrievalIndex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::{DocumentId, ProjectId, Result};

/// One ranked excerpt of an indexed document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    pub document_id: DocumentId,
    pub chunk_index: usize,
    pub text: String,
    pub score: f32,
}

#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Whether the project has anything indexed to retrieve from.
    async fn is_ready(&self, project_id: &ProjectId) -> Result<bool>;

    /// Best `top_k` passages for `text`, highest score first.
    async fn query(&self, project_id: &ProjectId, text: &str, top_k: usize)
    -> Result<Vec<Passage>>;
}

pub type SharedRetrieval = Arc<dyn RetrievalIndex>;
