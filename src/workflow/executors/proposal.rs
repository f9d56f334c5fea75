//! Proposal Drafter
//!
//! Runs last and folds every completed upstream output into a draft.

use async_trait::async_trait;
use std::sync::Arc;

use super::helpers::dependency_json;
use super::{ExecutionContext, StepExecutor, StepRuntime, StepSchemas};
use crate::ai::PromptBuilder;
use crate::types::StepError;
use crate::workflow::{ProposalDraft, StepId, StepOutput};

const RETRIEVAL_QUERY: &str = "response format required sections submission instructions \
     scope deliverables pricing";

pub struct ProposalDrafter {
    runtime: Arc<StepRuntime>,
}

impl ProposalDrafter {
    pub fn new(runtime: Arc<StepRuntime>) -> Self {
        Self { runtime }
    }
}

/// Upstream material as `(header, json)` sections, in pipeline order.
fn upstream_sections(ctx: &ExecutionContext) -> Vec<(&'static str, String)> {
    let mut sections = Vec::new();
    if let Some(challenges) = ctx.challenges() {
        sections.push(("Client Challenges", dependency_json(challenges)));
    }
    if let Some(props) = ctx.value_propositions() {
        sections.push(("Value Propositions", dependency_json(props)));
    }
    if let Some(questions) = ctx.discovery_questions() {
        sections.push(("Open Questions", dependency_json(questions)));
    }
    if let Some(matches) = ctx.case_study_matches() {
        sections.push(("Reference Case Studies", dependency_json(matches)));
    }
    sections
}

#[async_trait]
impl StepExecutor for ProposalDrafter {
    fn step_id(&self) -> StepId {
        StepId::ProposalDrafter
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<StepOutput, StepError> {
        let analysis = dependency_json(ctx.require_analysis()?);
        let upstream = upstream_sections(ctx);

        let mut draft: ProposalDraft = self
            .runtime
            .generate(
                StepId::ProposalDrafter,
                ctx,
                RETRIEVAL_QUERY,
                &StepSchemas::proposal_draft(),
                |passages| {
                    let mut builder = PromptBuilder::new()
                        .role("proposal writer", "winning responses to RFPs")
                        .objectives(vec![
                            "Draft a proposal that follows the structure the RFP requests",
                            "Lead with the client's challenges and our answer to each",
                            "Cite reference case studies where they support a claim",
                        ])
                        .section("RFP Analysis", &analysis);
                    for (header, json) in &upstream {
                        builder = builder.section(header, json);
                    }
                    builder
                        .passages(passages)
                        .focus(
                            "the material above",
                            vec!["Do not invent pricing, names or commitments"],
                        )
                        .build()
                },
            )
            .await?;

        draft
            .sections
            .retain(|s| !s.heading.trim().is_empty() && !s.body.trim().is_empty());
        Ok(StepOutput::ProposalDraft(draft))
    }
}

#[cfg(test)]
mod tests {
    use super::super::helpers::test_support::*;
    use super::*;
    use crate::types::{DocumentId, ProjectId};
    use crate::workflow::{Challenge, RfpAnalysis};
    use serde_json::json;

    #[tokio::test]
    async fn test_draft_includes_upstream_material() {
        let provider = ScriptedProvider::ok(json!({
            "title": "Claims Platform Proposal",
            "sections": [
                {"heading": "Executive Summary", "body": "We will..."},
                {"heading": "Pricing", "body": ""}
            ]
        }));
        let drafter = ProposalDrafter::new(Arc::new(scripted_runtime(provider.clone())));
        let ctx = ExecutionContext::new(ProjectId::new("P1"), DocumentId::new("rfp"))
            .with_dependency(StepOutput::RfpAnalysis(RfpAnalysis {
                executive_summary: "Claims modernisation".to_string(),
                ..Default::default()
            }))
            .with_dependency(StepOutput::Challenges(vec![Challenge {
                title: "Backlog of 9,000 claims".to_string(),
                description: "Manual triage".to_string(),
                impact: None,
            }]));

        let StepOutput::ProposalDraft(draft) = drafter.execute(&ctx).await.unwrap() else {
            panic!("unexpected output variant");
        };
        assert_eq!(draft.sections.len(), 1);

        let prompt = provider.last_prompt();
        assert!(prompt.contains("# Client Challenges"));
        assert!(prompt.contains("Backlog of 9,000 claims"));
        assert!(!prompt.contains("# Value Propositions"));
    }
}
