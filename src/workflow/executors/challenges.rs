//! Challenge Extractor

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::helpers::dependency_json;
use super::{ExecutionContext, StepExecutor, StepRuntime, StepSchemas};
use crate::ai::PromptBuilder;
use crate::types::StepError;
use crate::workflow::{Challenge, StepId, StepOutput};

const RETRIEVAL_QUERY: &str = "current situation problems pain points limitations risks \
     legacy systems constraints manual process";

#[derive(Deserialize)]
struct ChallengeList {
    challenges: Vec<Challenge>,
}

pub struct ChallengeExtractor {
    runtime: Arc<StepRuntime>,
}

impl ChallengeExtractor {
    pub fn new(runtime: Arc<StepRuntime>) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl StepExecutor for ChallengeExtractor {
    fn step_id(&self) -> StepId {
        StepId::ChallengeExtractor
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<StepOutput, StepError> {
        let analysis = dependency_json(ctx.require_analysis()?);

        let list: ChallengeList = self
            .runtime
            .generate(
                StepId::ChallengeExtractor,
                ctx,
                RETRIEVAL_QUERY,
                &StepSchemas::challenges(),
                |passages| {
                    PromptBuilder::new()
                        .role("business analyst", "diagnosing client problems from RFPs")
                        .objectives(vec![
                            "Identify the business challenges behind this request",
                            "Describe each challenge in the client's terms",
                            "Rate the impact of each challenge as high, medium or low",
                        ])
                        .section("RFP Analysis", &analysis)
                        .passages(passages)
                        .focus(
                            "problems the client has today",
                            vec!["Do not propose solutions", "Merge duplicate challenges"],
                        )
                        .build()
                },
            )
            .await?;

        let mut challenges = list.challenges;
        challenges.retain(|c| !c.title.trim().is_empty());
        challenges.dedup_by(|a, b| a.title.eq_ignore_ascii_case(&b.title));

        Ok(StepOutput::Challenges(challenges))
    }
}
