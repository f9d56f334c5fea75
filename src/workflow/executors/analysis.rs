//! RFP Analyzer
//!
//! First step of every run. Reads the document and produces the executive
//! summary plus the structured facts later steps are grounded on.

use async_trait::async_trait;
use std::sync::Arc;

use super::{ExecutionContext, StepExecutor, StepRuntime, StepSchemas};
use crate::ai::PromptBuilder;
use crate::types::StepError;
use crate::workflow::{RfpAnalysis, StepId, StepOutput};

const RETRIEVAL_QUERY: &str = "scope of work objectives requirements evaluation criteria \
     submission deadline budget client background";

pub struct RfpAnalyzer {
    runtime: Arc<StepRuntime>,
}

impl RfpAnalyzer {
    pub fn new(runtime: Arc<StepRuntime>) -> Self {
        Self { runtime }
    }

    fn prompt(passages: Vec<String>) -> String {
        PromptBuilder::new()
            .role("presales consultant", "reading requests for proposal")
            .objectives(vec![
                "Summarize what the client wants to buy and the outcome they expect",
                "Identify the issuing organization and its industry",
                "List mandatory requirements, evaluation criteria and dated milestones",
            ])
            .passages(passages)
            .focus(
                "the excerpts above",
                vec![
                    "Use only facts stated in the excerpts",
                    "Leave a field empty rather than guessing",
                ],
            )
            .build()
    }
}

#[async_trait]
impl StepExecutor for RfpAnalyzer {
    fn step_id(&self) -> StepId {
        StepId::RfpAnalyzer
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<StepOutput, StepError> {
        let mut analysis: RfpAnalysis = self
            .runtime
            .generate(
                StepId::RfpAnalyzer,
                ctx,
                RETRIEVAL_QUERY,
                &StepSchemas::rfp_analysis(),
                Self::prompt,
            )
            .await?;

        analysis.executive_summary = analysis.executive_summary.trim().to_string();
        analysis.key_requirements.retain(|r| !r.trim().is_empty());

        tracing::debug!(
            "RfpAnalyzer: {} requirements, {} criteria",
            analysis.key_requirements.len(),
            analysis.evaluation_criteria.len()
        );
        Ok(StepOutput::RfpAnalysis(analysis))
    }
}

#[cfg(test)]
mod tests {
    use super::super::helpers::test_support::*;
    use super::*;
    use crate::types::{DocumentId, ProjectId};
    use serde_json::json;

    #[tokio::test]
    async fn test_analyzer_output() {
        let provider = ScriptedProvider::ok(json!({
            "executiveSummary": "  Acme wants a cloud claims platform.  ",
            "clientName": "Acme Insurance",
            "keyRequirements": ["SOC 2", " "],
            "deadlines": ["Proposals due 30 June"]
        }));
        let analyzer = RfpAnalyzer::new(Arc::new(scripted_runtime(provider.clone())));
        let ctx = ExecutionContext::new(ProjectId::new("P1"), DocumentId::new("rfp"));

        let output = analyzer.execute(&ctx).await.unwrap();
        let StepOutput::RfpAnalysis(analysis) = output else {
            panic!("unexpected output variant");
        };
        assert_eq!(analysis.executive_summary, "Acme wants a cloud claims platform.");
        assert_eq!(analysis.key_requirements, vec!["SOC 2"]);
        assert!(provider.last_prompt().contains("<DOCUMENT_EXCERPTS>"));
    }
}
