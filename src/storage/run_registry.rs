//! Run Registry
//!
//! Persisted record of every run attempt per project. The single-active-run
//! guard lives in the database: a partial unique index over pending/running
//! rows turns a racing second acquisition into a constraint violation.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use std::collections::BTreeMap;

use super::SharedDatabase;
use crate::types::{
    DocumentId, ParseWithDefault, ProjectId, Result, ResultExt, RfpError, RunId, UserId,
    log_filter_error,
};
use crate::workflow::{Run, RunStatus, StepErrorRecord, StepId, StepSelection, StepState};

/// Persistence contract for runs. Implementations must make `try_acquire` a
/// single atomic check-and-insert.
pub trait RunRegistry: Send + Sync {
    /// Insert `run` as the project's new active attempt, or fail with
    /// [`RfpError::RunAlreadyActive`] when one is already pending or running.
    /// Returns the run with its attempt number assigned.
    fn try_acquire(&self, run: &Run) -> Result<Run>;

    /// Latest attempt for the project
    fn get(&self, project_id: &ProjectId) -> Result<Option<Run>>;

    /// Persist the current state of an acquired run
    fn upsert(&self, run: &Run) -> Result<()>;

    /// All attempts for the project, newest first
    fn history(&self, project_id: &ProjectId) -> Result<Vec<Run>>;

    /// Every pending or running run across projects
    fn list_active(&self) -> Result<Vec<Run>>;
}

const RUN_COLUMNS: &str = "id, project_id, attempt, document_id, user_id, selected_steps, \
     overall_status, step_states, errors, started_at, completed_at, updated_at";

/// SQLite-backed run registry
pub struct SqliteRunRegistry {
    db: SharedDatabase,
}

impl SqliteRunRegistry {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    fn query_runs(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Run>> {
        let conn = self.db.connection()?;
        let mut stmt = conn.prepare(sql).with_context("Failed to prepare run query")?;
        let rows = stmt
            .query_map(params, RunRow::from_row)
            .with_context("Failed to query runs")?;

        let mut runs = Vec::new();
        for row in rows.filter_map(|r| log_filter_error(r, "Failed to read run row")) {
            runs.push(row.into_run()?);
        }
        Ok(runs)
    }
}

impl RunRegistry for SqliteRunRegistry {
    fn try_acquire(&self, run: &Run) -> Result<Run> {
        if !run.overall_status.is_active() {
            return Err(RfpError::Storage(format!(
                "cannot acquire run {} in state {}",
                run.id, run.overall_status
            )));
        }

        let mut conn = self.db.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .with_context("Failed to start acquisition transaction")?;

        let encoded = EncodedRun::new(run)?;
        let attempt = tx.query_row(
            "INSERT INTO runs (id, project_id, attempt, document_id, user_id, selected_steps,
                               overall_status, step_states, errors, started_at, completed_at, updated_at)
             SELECT ?1, ?2, COALESCE(MAX(attempt), 0) + 1, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11
             FROM runs WHERE project_id = ?2
             RETURNING attempt",
            params![
                run.id.as_str(),
                run.project_id.as_str(),
                run.document_id.as_str(),
                run.user_id.as_ref().map(|u| u.as_str()),
                encoded.selected_steps,
                run.overall_status.as_str(),
                encoded.step_states,
                encoded.errors,
                run.started_at.to_rfc3339(),
                run.completed_at.map(|t| t.to_rfc3339()),
                run.updated_at.to_rfc3339(),
            ],
            |row| row.get::<_, u32>(0),
        );

        let attempt = match attempt {
            Ok(attempt) => attempt,
            Err(e) if is_constraint_violation(&e) => {
                return Err(RfpError::RunAlreadyActive {
                    project_id: run.project_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit().with_context("Failed to commit run acquisition")?;

        tracing::debug!(project_id = %run.project_id, attempt, "Run acquired");
        let mut acquired = run.clone();
        acquired.attempt = attempt;
        Ok(acquired)
    }

    fn get(&self, project_id: &ProjectId) -> Result<Option<Run>> {
        let conn = self.db.connection()?;
        let row = conn
            .query_row(
                &format!(
                    "SELECT {} FROM runs WHERE project_id = ?1 ORDER BY attempt DESC LIMIT 1",
                    RUN_COLUMNS
                ),
                params![project_id.as_str()],
                RunRow::from_row,
            )
            .optional()
            .with_context("Failed to load run")?;
        row.map(RunRow::into_run).transpose()
    }

    fn upsert(&self, run: &Run) -> Result<()> {
        let conn = self.db.connection()?;
        upsert_run(&conn, run)
    }

    fn history(&self, project_id: &ProjectId) -> Result<Vec<Run>> {
        self.query_runs(
            &format!(
                "SELECT {} FROM runs WHERE project_id = ?1 ORDER BY attempt DESC",
                RUN_COLUMNS
            ),
            &[&project_id.as_str()],
        )
    }

    fn list_active(&self) -> Result<Vec<Run>> {
        self.query_runs(
            &format!(
                "SELECT {} FROM runs WHERE overall_status IN ('pending', 'running') ORDER BY started_at",
                RUN_COLUMNS
            ),
            &[],
        )
    }
}

fn upsert_run(conn: &Connection, run: &Run) -> Result<()> {
    let encoded = EncodedRun::new(run)?;
    let result = conn.execute(
        "INSERT INTO runs (id, project_id, attempt, document_id, user_id, selected_steps,
                           overall_status, step_states, errors, started_at, completed_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT(id) DO UPDATE SET
             overall_status = excluded.overall_status,
             step_states = excluded.step_states,
             errors = excluded.errors,
             completed_at = excluded.completed_at,
             updated_at = excluded.updated_at",
        params![
            run.id.as_str(),
            run.project_id.as_str(),
            run.attempt,
            run.document_id.as_str(),
            run.user_id.as_ref().map(|u| u.as_str()),
            encoded.selected_steps,
            run.overall_status.as_str(),
            encoded.step_states,
            encoded.errors,
            run.started_at.to_rfc3339(),
            run.completed_at.map(|t| t.to_rfc3339()),
            run.updated_at.to_rfc3339(),
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => Err(RfpError::RunAlreadyActive {
            project_id: run.project_id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// =============================================================================
// Row Mapping
// =============================================================================

/// JSON-encoded collection columns
struct EncodedRun {
    selected_steps: String,
    step_states: String,
    errors: String,
}

impl EncodedRun {
    fn new(run: &Run) -> Result<Self> {
        Ok(Self {
            selected_steps: serde_json::to_string(&run.selected_steps)?,
            step_states: serde_json::to_string(&run.step_states)?,
            errors: serde_json::to_string(&run.errors)?,
        })
    }
}

/// Raw column values, decoded outside the rusqlite row callback
struct RunRow {
    id: String,
    project_id: String,
    attempt: u32,
    document_id: String,
    user_id: Option<String>,
    selected_steps: String,
    overall_status: String,
    step_states: String,
    errors: String,
    started_at: String,
    completed_at: Option<String>,
    updated_at: String,
}

impl RunRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            attempt: row.get(2)?,
            document_id: row.get(3)?,
            user_id: row.get(4)?,
            selected_steps: row.get(5)?,
            overall_status: row.get(6)?,
            step_states: row.get(7)?,
            errors: row.get(8)?,
            started_at: row.get(9)?,
            completed_at: row.get(10)?,
            updated_at: row.get(11)?,
        })
    }

    fn into_run(self) -> Result<Run> {
        let selected_steps: StepSelection = serde_json::from_str(&self.selected_steps)?;
        let step_states: BTreeMap<StepId, StepState> = serde_json::from_str(&self.step_states)?;
        let errors: Vec<StepErrorRecord> = serde_json::from_str(&self.errors)?;

        Ok(Run {
            id: RunId::new(self.id),
            project_id: ProjectId::new(self.project_id),
            document_id: DocumentId::new(self.document_id),
            user_id: self.user_id.map(UserId::new),
            attempt: self.attempt,
            selected_steps,
            overall_status: RunStatus::parse_or_default(&self.overall_status),
            step_states,
            errors,
            started_at: parse_timestamp(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_timestamp).transpose()?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .with_context_fn(|| format!("Invalid timestamp '{}'", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use crate::types::StepError;
    use crate::workflow::StepFlags;
    use std::sync::Arc;

    fn registry() -> SqliteRunRegistry {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        SqliteRunRegistry::new(Arc::new(db))
    }

    fn pending_run(project: &str) -> Run {
        Run::pending(
            ProjectId::new(project),
            DocumentId::new("doc-1"),
            Some(UserId::new("u-1")),
            StepSelection::from_flags(&StepFlags {
                questions: true,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_get_missing_project() {
        assert!(registry().get(&ProjectId::new("nope")).unwrap().is_none());
    }

    #[test]
    fn test_try_acquire_assigns_attempt_and_roundtrips() {
        let registry = registry();
        let acquired = registry.try_acquire(&pending_run("P1")).unwrap();
        assert_eq!(acquired.attempt, 1);

        let loaded = registry.get(&ProjectId::new("P1")).unwrap().unwrap();
        assert_eq!(loaded.id, acquired.id);
        assert_eq!(loaded.overall_status, RunStatus::Pending);
        assert_eq!(loaded.step_states, acquired.step_states);
        assert_eq!(loaded.user_id, Some(UserId::new("u-1")));
    }

    #[test]
    fn test_second_acquire_rejected_while_active() {
        let registry = registry();
        registry.try_acquire(&pending_run("P1")).unwrap();

        let second = registry.try_acquire(&pending_run("P1"));
        assert!(matches!(second, Err(RfpError::RunAlreadyActive { .. })));

        // Other projects are independent
        assert!(registry.try_acquire(&pending_run("P2")).is_ok());
    }

    #[test]
    fn test_acquire_after_terminal_increments_attempt() {
        let registry = registry();
        let mut first = registry.try_acquire(&pending_run("P1")).unwrap();
        first.mark_running();
        first.record_failure(
            StepId::RfpAnalyzer,
            &StepError::CollaboratorUnavailable("index not ready".into()),
        );
        first.finish();
        registry.upsert(&first).unwrap();

        let second = registry.try_acquire(&pending_run("P1")).unwrap();
        assert_eq!(second.attempt, 2);

        let latest = registry.get(&ProjectId::new("P1")).unwrap().unwrap();
        assert_eq!(latest.id, second.id);

        let history = registry.history(&ProjectId::new("P1")).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].overall_status, RunStatus::Failed);
        assert_eq!(history[1].errors.len(), 1);
        assert!(history[1].completed_at.is_some());
    }

    #[test]
    fn test_list_active() {
        let registry = registry();
        registry.try_acquire(&pending_run("P1")).unwrap();
        let mut done = registry.try_acquire(&pending_run("P2")).unwrap();
        done.set_step_state(StepId::RfpAnalyzer, StepState::Completed);
        done.finish();
        registry.upsert(&done).unwrap();

        let active = registry.list_active().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].project_id, ProjectId::new("P1"));
    }

    #[test]
    fn test_try_acquire_rejects_terminal_run() {
        let registry = registry();
        let mut run = pending_run("P1");
        run.finish();
        assert!(matches!(
            registry.try_acquire(&run),
            Err(RfpError::Storage(_))
        ));
    }
}
