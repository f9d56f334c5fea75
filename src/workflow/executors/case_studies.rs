//! Case Study Matcher
//!
//! Ranks catalog entries against the RFP. Matches must name a catalog id; the
//! model is not allowed to invent precedents.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use super::helpers::dependency_json;
use super::{ExecutionContext, StepExecutor, StepRuntime, StepSchemas};
use crate::ai::PromptBuilder;
use crate::constants::prompt::MAX_CASE_STUDIES;
use crate::storage::{CaseStudy, CaseStudyStore};
use crate::types::StepError;
use crate::workflow::{CaseStudyMatch, StepId, StepOutput};

const RETRIEVAL_QUERY: &str = "industry domain similar projects experience references \
     technology platform scale";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMatch {
    case_study_id: String,
    relevance: f32,
    #[serde(default)]
    rationale: String,
}

#[derive(Deserialize)]
struct MatchList {
    matches: Vec<RawMatch>,
}

pub struct CaseStudyMatcher {
    runtime: Arc<StepRuntime>,
    catalog: Arc<dyn CaseStudyStore>,
}

impl CaseStudyMatcher {
    pub fn new(runtime: Arc<StepRuntime>, catalog: Arc<dyn CaseStudyStore>) -> Self {
        Self { runtime, catalog }
    }
}

fn catalog_listing(studies: &[CaseStudy]) -> String {
    studies
        .iter()
        .map(|s| {
            format!(
                "- id: {} | {} | client: {} | industry: {} | tags: {}\n  {}",
                s.id,
                s.title,
                s.client.as_deref().unwrap_or("n/a"),
                s.industry.as_deref().unwrap_or("n/a"),
                s.tags.join(", "),
                s.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep matches naming a catalog entry, best first, one per entry.
fn resolve(raw: Vec<RawMatch>, studies: &[CaseStudy]) -> Vec<CaseStudyMatch> {
    let by_id: HashMap<&str, &CaseStudy> = studies.iter().map(|s| (s.id.as_str(), s)).collect();

    let mut matches: Vec<CaseStudyMatch> = Vec::new();
    for m in raw {
        let id = m.case_study_id.trim();
        let Some(study) = by_id.get(id) else {
            tracing::debug!("CaseStudyMatcher: dropping unknown case study id '{}'", id);
            continue;
        };
        if matches.iter().any(|existing| existing.case_study_id == study.id) {
            continue;
        }
        matches.push(CaseStudyMatch {
            case_study_id: study.id.clone(),
            title: study.title.clone(),
            relevance: m.relevance.clamp(0.0, 1.0),
            rationale: m.rationale.trim().to_string(),
        });
    }

    matches.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    matches
}

#[async_trait]
impl StepExecutor for CaseStudyMatcher {
    fn step_id(&self) -> StepId {
        StepId::CaseStudyMatcher
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<StepOutput, StepError> {
        let analysis = dependency_json(ctx.require_analysis()?);

        let studies = self.catalog.list(MAX_CASE_STUDIES)?;
        if studies.is_empty() {
            return Err(StepError::Execution(
                "case study catalog is empty".to_string(),
            ));
        }
        let listing = catalog_listing(&studies);

        let list: MatchList = self
            .runtime
            .generate(
                StepId::CaseStudyMatcher,
                ctx,
                RETRIEVAL_QUERY,
                &StepSchemas::case_study_matches(),
                |passages| {
                    PromptBuilder::new()
                        .role("bid manager", "selecting reference projects")
                        .objectives(vec![
                            "Pick the catalog entries most similar to this opportunity",
                            "Score relevance from 0 to 1 and explain each pick in one sentence",
                        ])
                        .section("RFP Analysis", &analysis)
                        .section("Case Study Catalog", &listing)
                        .passages(passages)
                        .focus(
                            "the catalog",
                            vec!["Only use ids that appear in the catalog", "Return at most five matches"],
                        )
                        .build()
                },
            )
            .await?;

        Ok(StepOutput::CaseStudyMatches(resolve(list.matches, &studies)))
    }
}
