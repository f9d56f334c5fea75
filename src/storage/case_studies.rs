//! Case study catalog
//!
//! Precedent engagements the case study matcher ranks against an RFP. The
//! catalog is owned by the surrounding product; the engine only reads it,
//! apart from the bulk import used by the CLI.

use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::SharedDatabase;
use crate::types::{Result, ResultExt, RfpError, log_filter_warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseStudy {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub client: Option<String>,
    #[serde(default)]
    pub industry: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

pub trait CaseStudyStore: Send + Sync {
    /// Catalog entries ordered by title, capped at `limit`.
    fn list(&self, limit: usize) -> Result<Vec<CaseStudy>>;

    fn upsert(&self, case_study: &CaseStudy) -> Result<()>;

    fn count(&self) -> Result<usize>;
}

pub struct SqliteCaseStudyStore {
    db: SharedDatabase,
}

impl SqliteCaseStudyStore {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Load a JSON array of case studies from `path`, replacing entries with the
    /// same id. Returns the number imported.
    pub fn import_file(&self, path: &Path) -> Result<usize> {
        let raw = std::fs::read_to_string(path)?;
        let studies: Vec<CaseStudy> = serde_json::from_str(&raw)?;

        self.db.transaction(|conn| {
            for study in &studies {
                upsert_with(conn, study)?;
            }
            Ok(())
        })?;

        tracing::info!("Imported {} case studies from {}", studies.len(), path.display());
        Ok(studies.len())
    }
}

fn upsert_with(conn: &rusqlite::Connection, study: &CaseStudy) -> Result<()> {
    if study.id.trim().is_empty() {
        return Err(RfpError::Storage(format!(
            "case study '{}' has an empty id",
            study.title
        )));
    }

    conn.execute(
        "INSERT INTO case_studies (id, title, client, industry, summary, tags, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
             title = excluded.title,
             client = excluded.client,
             industry = excluded.industry,
             summary = excluded.summary,
             tags = excluded.tags",
        params![
            study.id,
            study.title,
            study.client,
            study.industry,
            study.summary,
            serde_json::to_string(&study.tags)?,
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context_fn(|| format!("Failed to store case study {}", study.id))?;
    Ok(())
}

impl CaseStudyStore for SqliteCaseStudyStore {
    fn list(&self, limit: usize) -> Result<Vec<CaseStudy>> {
        let conn = self.db.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, title, client, industry, summary, tags
                 FROM case_studies ORDER BY title LIMIT ?1",
            )
            .with_context("Failed to prepare case study query")?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                let tags: String = row.get(5)?;
                Ok(CaseStudy {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    client: row.get(2)?,
                    industry: row.get(3)?,
                    summary: row.get(4)?,
                    tags: serde_json::from_str(&tags).unwrap_or_default(),
                })
            })
            .with_context("Failed to query case studies")?;

        Ok(rows
            .filter_map(|r| log_filter_warn(r, "Skipping unreadable case study"))
            .collect())
    }

    fn upsert(&self, case_study: &CaseStudy) -> Result<()> {
        let conn = self.db.connection()?;
        upsert_with(&conn, case_study)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.db.connection()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM case_studies", [], |row| row.get(0))
            .with_context("Failed to count case studies")?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn store() -> SqliteCaseStudyStore {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        SqliteCaseStudyStore::new(Arc::new(db))
    }

    fn study(id: &str, title: &str) -> CaseStudy {
        CaseStudy {
            id: id.to_string(),
            title: title.to_string(),
            client: Some("Globex".to_string()),
            industry: Some("Retail".to_string()),
            summary: "Consolidated twelve regional warehouses onto one WMS".to_string(),
            tags: vec!["logistics".to_string()],
        }
    }

    #[test]
    fn test_upsert_and_list_sorted() {
        let store = store();
        store.upsert(&study("cs-2", "Warehouse consolidation")).unwrap();
        store.upsert(&study("cs-1", "Billing migration")).unwrap();
        store.upsert(&study("cs-2", "Warehouse consolidation v2")).unwrap();

        let listed = store.list(10).unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, "cs-1");
        assert_eq!(listed[1].title, "Warehouse consolidation v2");
        assert_eq!(listed[1].tags, vec!["logistics"]);
        assert_eq!(store.list(1).unwrap().len(), 1);
    }

    #[test]
    fn test_import_file() {
        let store = store();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cases.json");
        std::fs::write(
            &path,
            r#"[
                {"id": "cs-1", "title": "Claims automation", "summary": "Cut claim handling time by 40%"},
                {"id": "cs-2", "title": "Data platform", "summary": "Lakehouse for a regional bank", "tags": ["data"]}
            ]"#,
        )
        .unwrap();

        assert_eq!(store.import_file(&path).unwrap(), 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_import_rejects_empty_id_atomically() {
        let store = store();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cases.json");
        std::fs::write(
            &path,
            r#"[{"id": "cs-1", "title": "Ok", "summary": "s"}, {"id": " ", "title": "Bad", "summary": "s"}]"#,
        )
        .unwrap();

        assert!(store.import_file(&path).is_err());
        assert_eq!(store.count().unwrap(), 0);
    }
}
