//! Shared step runner
//!
//! Every model-backed executor follows the same path:
//! 1. Check retrieval readiness → 2. Retrieve passages → 3. Build prompt →
//! 4. Call the provider with the step schema → 5. Parse the typed output
//!
//! Collaborator failures are mapped to [`StepError`] here so the executors only
//! deal with prompt wording and post-processing.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ExecutionContext;
use crate::ai::SharedProvider;
use crate::constants::{prompt::MAX_DEPENDENCY_CHARS, retrieval::MAX_PASSAGE_CHARS};
use crate::retrieval::SharedRetrieval;
use crate::types::{StepError, truncate_chars};
use crate::workflow::StepId;

/// Collaborators shared by the model-backed executors
#[derive(Clone)]
pub struct StepRuntime {
    provider: SharedProvider,
    retrieval: SharedRetrieval,
    top_k: usize,
}

impl StepRuntime {
    pub fn new(provider: SharedProvider, retrieval: SharedRetrieval, top_k: usize) -> Self {
        Self {
            provider,
            retrieval,
            top_k: top_k.max(1),
        }
    }

    /// Passages of the run's document that best match `query`.
    ///
    /// Falls back to the rest of the project when the document itself has no
    /// matching chunk.
    pub(crate) async fn passages(
        &self,
        ctx: &ExecutionContext,
        query: &str,
    ) -> Result<Vec<String>, StepError> {
        if !self.retrieval.is_ready(&ctx.project_id).await? {
            return Err(StepError::CollaboratorUnavailable(format!(
                "retrieval index is not ready for project {}",
                ctx.project_id
            )));
        }

        let candidates = self
            .retrieval
            .query(&ctx.project_id, query, self.top_k * 2)
            .await?;
        let (own, others): (Vec<_>, Vec<_>) = candidates
            .into_iter()
            .partition(|p| p.document_id == ctx.document_id);
        let chosen = if own.is_empty() { others } else { own };

        Ok(chosen
            .into_iter()
            .take(self.top_k)
            .map(|p| truncate_chars(&p.text, MAX_PASSAGE_CHARS))
            .collect())
    }

    /// Retrieve, prompt and parse for one step.
    pub(crate) async fn generate<T, F>(
        &self,
        step: StepId,
        ctx: &ExecutionContext,
        retrieval_query: &str,
        schema: &Value,
        build_prompt: F,
    ) -> Result<T, StepError>
    where
        T: DeserializeOwned,
        F: FnOnce(Vec<String>) -> String + Send,
    {
        let passages = self.passages(ctx, retrieval_query).await?;
        tracing::debug!(
            step = %step,
            project_id = %ctx.project_id,
            passages = passages.len(),
            "Building prompt"
        );

        let prompt = build_prompt(passages);
        let response = self.provider.generate(&prompt, schema).await?;

        tracing::debug!(
            step = %step,
            provider = self.provider.name(),
            model = self.provider.model(),
            elapsed_ms = response.elapsed_ms,
            tokens = response.usage.total(),
            "Model response received"
        );

        parse_output(response.content)
    }
}

/// Parse a model response into the step's output type.
pub(crate) fn parse_output<T: DeserializeOwned>(content: Value) -> Result<T, StepError> {
    let type_name = std::any::type_name::<T>()
        .rsplit("::")
        .next()
        .unwrap_or("output");
    serde_json::from_value::<T>(content)
        .map_err(|e| StepError::InvalidOutput(format!("failed to parse {}: {}", type_name, e)))
}

/// Upstream output rendered for a prompt, capped in size.
pub(crate) fn dependency_json<T: Serialize + ?Sized>(value: &T) -> String {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string());
    truncate_chars(&json, MAX_DEPENDENCY_CHARS)
}
