//! SQLite keyword index
//!
//! Documents are split into overlapping word windows at ingestion. Queries rank
//! windows by how many distinct query terms they contain, weighted by term
//! frequency, which is enough to pull the relevant sections of an RFP into a
//! prompt without an embedding service.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use std::collections::HashSet;

use super::{Chunker, Passage, RetrievalIndex};
use crate::storage::SharedDatabase;
use crate::types::{DocumentId, ProjectId, Result, ResultExt, RfpError, log_filter_warn};

/// Terms too common in RFP prose to discriminate between sections
const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "shall", "that", "the", "this", "to", "will", "with",
];

pub struct SqliteRetrievalIndex {
    db: SharedDatabase,
    chunker: Chunker,
}

impl SqliteRetrievalIndex {
    pub fn new(db: SharedDatabase) -> Self {
        Self::with_chunker(db, Chunker::default())
    }

    pub fn with_chunker(db: SharedDatabase, chunker: Chunker) -> Self {
        Self { db, chunker }
    }

    /// Store a document's extracted text and (re)build its chunks.
    ///
    /// Re-ingesting a document replaces its previous chunks. Returns the
    /// number of chunks written.
    pub fn index_document(
        &self,
        project_id: &ProjectId,
        document_id: &DocumentId,
        title: Option<&str>,
        content: &str,
    ) -> Result<usize> {
        let chunks = self.chunker.chunk(content);
        if chunks.is_empty() {
            return Err(RfpError::Retrieval(format!(
                "document {} has no extractable text",
                document_id
            )));
        }
        let word_count = content.split_whitespace().count();

        self.db.transaction(|conn| {
            conn.execute(
                "DELETE FROM document_chunks WHERE project_id = ?1 AND document_id = ?2",
                params![project_id.as_str(), document_id.as_str()],
            )
            .with_context("Failed to clear previous chunks")?;

            conn.execute(
                "INSERT INTO documents (project_id, id, title, content, word_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(project_id, id) DO UPDATE SET
                     title = excluded.title,
                     content = excluded.content,
                     word_count = excluded.word_count",
                params![
                    project_id.as_str(),
                    document_id.as_str(),
                    title,
                    content,
                    word_count as i64,
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context("Failed to store document")?;

            let mut stmt = conn
                .prepare(
                    "INSERT INTO document_chunks (project_id, document_id, chunk_index, content)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .with_context("Failed to prepare chunk insert")?;
            for (index, chunk) in chunks.iter().enumerate() {
                stmt.execute(params![
                    project_id.as_str(),
                    document_id.as_str(),
                    index as i64,
                    chunk
                ])
                .with_context("Failed to store chunk")?;
            }
            Ok(())
        })?;

        tracing::info!(
            project_id = %project_id,
            document_id = %document_id,
            chunks = chunks.len(),
            words = word_count,
            "Document indexed"
        );
        Ok(chunks.len())
    }

    /// Whether the given document has been ingested for the project.
    pub fn has_document(&self, project_id: &ProjectId, document_id: &DocumentId) -> Result<bool> {
        let conn = self.db.connection()?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE project_id = ?1 AND id = ?2)",
            params![project_id.as_str(), document_id.as_str()],
            |row| row.get(0),
        )
        .with_context("Failed to look up document")
    }
}

fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .collect()
}

/// Distinct-term coverage first, raw frequency as the tie-breaker.
fn score(query_terms: &HashSet<String>, chunk: &str) -> f32 {
    let chunk_terms = terms(chunk);
    if chunk_terms.is_empty() {
        return 0.0;
    }
    let hits = chunk_terms
        .iter()
        .filter(|t| query_terms.contains(*t))
        .count();
    let distinct = chunk_terms
        .iter()
        .filter(|t| query_terms.contains(*t))
        .collect::<HashSet<_>>()
        .len();

    distinct as f32 + hits as f32 / chunk_terms.len() as f32
}

#[async_trait]
impl RetrievalIndex for SqliteRetrievalIndex {
    async fn is_ready(&self, project_id: &ProjectId) -> Result<bool> {
        let conn = self
            .db
            .connection()
            .map_err(|e| RfpError::Retrieval(e.to_string()))?;
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM document_chunks WHERE project_id = ?1)",
            params![project_id.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| RfpError::Retrieval(format!("readiness check failed: {}", e)))
    }

    async fn query(
        &self,
        project_id: &ProjectId,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<Passage>> {
        let query_terms: HashSet<String> = terms(text).into_iter().collect();

        let conn = self
            .db
            .connection()
            .map_err(|e| RfpError::Retrieval(e.to_string()))?;
        let mut stmt = conn
            .prepare(
                "SELECT document_id, chunk_index, content FROM document_chunks
                 WHERE project_id = ?1 ORDER BY document_id, chunk_index",
            )
            .map_err(|e| RfpError::Retrieval(e.to_string()))?;

        let rows = stmt
            .query_map(params![project_id.as_str()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| RfpError::Retrieval(e.to_string()))?;

        let mut passages: Vec<Passage> = rows
            .filter_map(|r| log_filter_warn(r, "Skipping unreadable chunk"))
            .map(|(document_id, index, content)| Passage {
                score: score(&query_terms, &content),
                document_id: DocumentId::new(document_id),
                chunk_index: index as usize,
                text: content,
            })
            .collect();

        // Stable sort keeps document order among equal scores, so an empty
        // query returns the opening chunks.
        passages.sort_by(|a, b| b.score.total_cmp(&a.score));
        passages.truncate(top_k);
        Ok(passages)
    }
}
