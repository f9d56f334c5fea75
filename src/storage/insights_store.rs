//! Insights Store
//!
//! One row per project. Each step owns its own column(s); a merge rewrites only
//! those columns in a single statement, so readers see either the previous
//! fragment or the new one, never a mix.

use rusqlite::{OptionalExtension, params};
use serde::de::DeserializeOwned;

use super::SharedDatabase;
use super::run_registry::parse_timestamp;
use crate::types::{ProjectId, Result, ResultExt, RfpError};
use crate::workflow::{Insights, StepOutput};

pub trait InsightsStore: Send + Sync {
    /// Load the project's insights, creating an empty aggregate if none exists.
    fn get_or_create(&self, project_id: &ProjectId) -> Result<Insights>;

    /// Atomically overwrite the field owned by `output`'s step.
    fn merge_field(&self, project_id: &ProjectId, output: &StepOutput) -> Result<()>;

    fn get(&self, project_id: &ProjectId) -> Result<Option<Insights>>;
}

/// SQLite-backed insights store
pub struct SqliteInsightsStore {
    db: SharedDatabase,
}

impl SqliteInsightsStore {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }
}

/// Column assignments for one step output: `(column, json)` pairs.
fn field_columns(output: &StepOutput) -> Result<Vec<(&'static str, String)>> {
    let columns = match output {
        StepOutput::RfpAnalysis(analysis) => vec![
            (
                "executive_summary",
                serde_json::to_string(&analysis.executive_summary)?,
            ),
            ("rfp_analysis", serde_json::to_string(analysis)?),
        ],
        StepOutput::Challenges(c) => vec![("challenges", serde_json::to_string(c)?)],
        StepOutput::ValuePropositions(v) => {
            vec![("value_propositions", serde_json::to_string(v)?)]
        }
        StepOutput::DiscoveryQuestions(q) => {
            vec![("discovery_questions", serde_json::to_string(q)?)]
        }
        StepOutput::CaseStudyMatches(m) => {
            vec![("matching_case_studies", serde_json::to_string(m)?)]
        }
        StepOutput::ProposalDraft(d) => vec![("proposal_draft", serde_json::to_string(d)?)],
    };
    Ok(columns)
}

impl InsightsStore for SqliteInsightsStore {
    fn get_or_create(&self, project_id: &ProjectId) -> Result<Insights> {
        let now = chrono::Utc::now().to_rfc3339();
        self.db.execute(
            "INSERT INTO insights (project_id, created_at, updated_at) VALUES (?1, ?2, ?2)
             ON CONFLICT(project_id) DO NOTHING",
            &[&project_id.as_str(), &now],
        )?;

        match self.get(project_id)? {
            Some(insights) => Ok(insights),
            None => Err(RfpError::Storage(format!(
                "insights row for {} vanished after creation",
                project_id
            ))),
        }
    }

    fn merge_field(&self, project_id: &ProjectId, output: &StepOutput) -> Result<()> {
        let columns = field_columns(output)?;
        let now = chrono::Utc::now().to_rfc3339();

        // Column names come from the fixed match above, never from input.
        let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
        let placeholders: Vec<String> = (0..columns.len()).map(|i| format!("?{}", i + 3)).collect();
        let updates: Vec<String> = names
            .iter()
            .map(|name| format!("{name} = excluded.{name}"))
            .collect();

        let sql = format!(
            "INSERT INTO insights (project_id, created_at, updated_at, {})
             VALUES (?1, ?2, ?2, {})
             ON CONFLICT(project_id) DO UPDATE SET {}, updated_at = excluded.updated_at",
            names.join(", "),
            placeholders.join(", "),
            updates.join(", ")
        );

        let project = project_id.as_str();
        let mut values: Vec<&dyn rusqlite::ToSql> = vec![&project, &now];
        for (_, json) in &columns {
            values.push(json);
        }

        let conn = self.db.connection()?;
        conn.execute(&sql, values.as_slice())
            .with_context_fn(|| format!("Failed to merge {} insights", output.step_id()))?;

        tracing::debug!(
            project_id = %project_id,
            step = %output.step_id(),
            items = output.item_count(),
            "Insights fragment stored"
        );
        Ok(())
    }

    fn get(&self, project_id: &ProjectId) -> Result<Option<Insights>> {
        let conn = self.db.connection()?;
        let row = conn
            .query_row(
                "SELECT executive_summary, rfp_analysis, challenges, value_propositions,
                        discovery_questions, matching_case_studies, proposal_draft,
                        created_at, updated_at
                 FROM insights WHERE project_id = ?1",
                params![project_id.as_str()],
                |row| {
                    Ok(InsightsRow {
                        executive_summary: row.get(0)?,
                        rfp_analysis: row.get(1)?,
                        challenges: row.get(2)?,
                        value_propositions: row.get(3)?,
                        discovery_questions: row.get(4)?,
                        matching_case_studies: row.get(5)?,
                        proposal_draft: row.get(6)?,
                        created_at: row.get(7)?,
                        updated_at: row.get(8)?,
                    })
                },
            )
            .optional()
            .with_context("Failed to load insights")?;

        row.map(|r| r.into_insights(project_id.clone())).transpose()
    }
}

struct InsightsRow {
    executive_summary: Option<String>,
    rfp_analysis: Option<String>,
    challenges: Option<String>,
    value_propositions: Option<String>,
    discovery_questions: Option<String>,
    matching_case_studies: Option<String>,
    proposal_draft: Option<String>,
    created_at: String,
    updated_at: String,
}

fn decode<T: DeserializeOwned>(column: Option<String>) -> Result<Option<T>> {
    column
        .as_deref()
        .map(|s| serde_json::from_str::<T>(s))
        .transpose()
        .map_err(Into::into)
}

impl InsightsRow {
    fn into_insights(self, project_id: ProjectId) -> Result<Insights> {
        Ok(Insights {
            project_id,
            executive_summary: decode(self.executive_summary)?,
            rfp_analysis: decode(self.rfp_analysis)?,
            challenges: decode(self.challenges)?.unwrap_or_default(),
            value_propositions: decode(self.value_propositions)?.unwrap_or_default(),
            discovery_questions: decode(self.discovery_questions)?.unwrap_or_default(),
            matching_case_studies: decode(self.matching_case_studies)?.unwrap_or_default(),
            proposal_draft: decode(self.proposal_draft)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}
