//! Value Proposition Generator
//!
//! One proposition per extracted challenge.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::helpers::dependency_json;
use super::{ExecutionContext, StepExecutor, StepRuntime, StepSchemas};
use crate::ai::PromptBuilder;
use crate::types::StepError;
use crate::workflow::{StepId, StepOutput, ValueProposition};

const RETRIEVAL_QUERY: &str = "desired outcomes goals success measures benefits expected \
     improvements priorities";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PropositionList {
    value_propositions: Vec<ValueProposition>,
}

pub struct ValuePropositionGenerator {
    runtime: Arc<StepRuntime>,
}

impl ValuePropositionGenerator {
    pub fn new(runtime: Arc<StepRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl StepExecutor for ValuePropositionGenerator {
    fn step_id(&self) -> StepId {
        StepId::ValueProposition
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<StepOutput, StepError> {
        let summary = ctx.require_analysis()?.executive_summary.clone();
        let challenges = ctx
            .challenges()
            .ok_or(StepError::UpstreamDependencyFailed(StepId::ChallengeExtractor))?;
        let challenge_json = dependency_json(challenges);

        let list: PropositionList = self
            .runtime
            .generate(
                StepId::ValueProposition,
                ctx,
                RETRIEVAL_QUERY,
                &StepSchemas::value_propositions(),
                |passages| {
                    PromptBuilder::new()
                        .role("solution architect", "writing value propositions for proposals")
                        .context_item("Engagement", &summary)
                        .objectives(vec![
                            "Write one value proposition for each challenge",
                            "Tie every benefit to an outcome the client asked for",
                        ])
                        .section("Challenges", &challenge_json)
                        .passages(passages)
                        .focus(
                            "the listed challenges",
                            vec!["Reference each challenge by its exact title"],
                        )
                        .build()
                },
            )
            .await?;

        let mut propositions = list.value_propositions;
        propositions.retain(|p| !p.proposition.trim().is_empty());

        let unanswered = challenges
            .iter()
            .filter(|c| !propositions.iter().any(|p| p.challenge == c.title))
            .count();
        if unanswered > 0 {
            tracing::debug!(
                "ValuePropositionGenerator: {} challenges without a proposition",
                unanswered
            );
        }

        Ok(StepOutput::ValuePropositions(propositions))
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
    async fn test_generates_propositions_from_challenges() {
        let provider = ScriptedProvider::ok(json!({
            "valuePropositions": [
                {"challenge": "Slow claims", "proposition": "Automated triage", "benefits": ["-40% handling time"]},
                {"challenge": "Slow claims", "proposition": "  "}
            ]
        }));
        let generator =
            ValuePropositionGenerator::new(Arc::new(scripted_runtime(provider.clone())));
        let ctx = ExecutionContext::new(ProjectId::new("P1"), DocumentId::new("rfp"))
            .with_dependency(StepOutput::RfpAnalysis(RfpAnalysis {
                executive_summary: "Claims modernisation".to_string(),
                ..Default::default()
            }))
            .with_dependency(StepOutput::Challenges(vec![Challenge {
                title: "Slow claims".to_string(),
                description: "Claims take 12 days".to_string(),
                impact: None,
            }]));

        let StepOutput::ValuePropositions(props) = generator.execute(&ctx).await.unwrap() else {
            panic!("unexpected output variant");
        };
        assert_eq!(props.len(), 1);
        assert_eq!(props[0].benefits, vec!["-40% handling time"]);
        assert!(provider.last_prompt().contains("Claims take 12 days"));
    }

    #[tokio::test]
    async fn test_requires_challenges() {
        let generator = ValuePropositionGenerator::new(Arc::new(scripted_runtime(
            ScriptedProvider::ok(json!({})),
        )));
        let ctx = ExecutionContext::new(ProjectId::new("P1"), DocumentId::new("rfp"))
            .with_dependency(StepOutput::RfpAnalysis(RfpAnalysis {
                executive_summary: "x".to_string(),
                ..Default::default()
            }));
        assert_eq!(
            generator.execute(&ctx).await.unwrap_err(),
            StepError::UpstreamDependencyFailed(StepId::ChallengeExtractor)
        );
    }
}
