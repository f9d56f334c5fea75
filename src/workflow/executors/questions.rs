//! Discovery Question Generator
//!
//! Questions for the first client call, grouped by category. Depends only on
//! the RFP analysis so it survives a failed challenge branch.

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::helpers::dependency_json;
use super::{ExecutionContext, StepExecutor, StepRuntime, StepSchemas};
use crate::ai::PromptBuilder;
use crate::types::{StepError, capitalize_first};
use crate::workflow::{DiscoveryQuestions, StepId, StepOutput};

const RETRIEVAL_QUERY: &str = "unclear assumptions stakeholders budget timeline integration \
     data volumes decision process";

#[derive(Deserialize)]
struct QuestionCategory {
    category: String,
    questions: Vec<String>,
}

#[derive(Deserialize)]
struct QuestionList {
    categories: Vec<QuestionCategory>,
}

pub struct DiscoveryQuestionGenerator {
    runtime: Arc<StepRuntime>,
}

impl DiscoveryQuestionGenerator {
    pub fn new(runtime: Arc<StepRuntime>) -> Self {
        Self { runtime }
    }
}

/// Group questions by normalized category, dropping blanks and duplicates.
fn group(categories: Vec<QuestionCategory>) -> DiscoveryQuestions {
    let mut grouped = DiscoveryQuestions::new();
    for entry in categories {
        let category = capitalize_first(entry.category.trim());
        let category = if category.is_empty() {
            "General".to_string()
        } else {
            category
        };
        let bucket = grouped.entry(category).or_default();
        for question in entry.questions {
            let question = question.trim().to_string();
            if !question.is_empty() && !bucket.contains(&question) {
                bucket.push(question);
            }
        }
    }
    grouped.retain(|_, questions| !questions.is_empty());
    grouped
}

#[async_trait]
impl StepExecutor for DiscoveryQuestionGenerator {
    fn step_id(&self) -> StepId {
        StepId::DiscoveryQuestion
    }

    async fn execute(&self, ctx: &ExecutionContext) -> Result<StepOutput, StepError> {
        let analysis = dependency_json(ctx.require_analysis()?);

        let list: QuestionList = self
            .runtime
            .generate(
                StepId::DiscoveryQuestion,
                ctx,
                RETRIEVAL_QUERY,
                &StepSchemas::discovery_questions(),
                |passages| {
                    PromptBuilder::new()
                        .role("account executive", "running discovery calls")
                        .objectives(vec![
                            "Find what the RFP leaves ambiguous or unstated",
                            "Write open questions that uncover budget, timeline, stakeholders and success criteria",
                        ])
                        .section("RFP Analysis", &analysis)
                        .passages(passages)
                        .focus(
                            "gaps in the document",
                            vec!["Do not ask what the document already answers"],
                        )
                        .build()
                },
            )
            .await?;

        Ok(StepOutput::DiscoveryQuestions(group(list.categories)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_normalizes_categories() {
        let grouped = group(vec![
            QuestionCategory {
                category: "budget".to_string(),
                questions: vec!["Is funding approved?".to_string(), " ".to_string()],
            },
            QuestionCategory {
                category: "Budget".to_string(),
                questions: vec!["Is funding approved?".to_string(), "Who signs off?".to_string()],
            },
            QuestionCategory {
                category: "Timeline".to_string(),
                questions: Vec::new(),
            },
            QuestionCategory {
                category: "".to_string(),
                questions: vec!["Any incumbents?".to_string()],
            },
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["Budget"], vec!["Is funding approved?", "Who signs off?"]);
        assert_eq!(grouped["General"], vec!["Any incumbents?"]);
    }
}
