//! Step Executors
//!
//! One executor per [`StepId`]. Executors are stateless: they receive the
//! project, the document handle and the outputs of completed prerequisites,
//! and return a typed [`StepOutput`] or a [`StepError`]. They never touch the
//! run registry or the insights store.
//!
//! Dependency order:
//! - RfpAnalyzer
//! - ChallengeExtractor (analysis) -> ValuePropositionGenerator (challenges)
//! - DiscoveryQuestionGenerator (analysis)
//! - CaseStudyMatcher (analysis)
//! - ProposalDrafter (every completed upstream output)

mod analysis;
mod case_studies;
mod challenges;
mod helpers;
mod proposal;
mod questions;
mod schemas;
mod value;

pub use analysis::RfpAnalyzer;
pub use case_studies::CaseStudyMatcher;
pub use challenges::ChallengeExtractor;
pub use helpers::StepRuntime;
pub use proposal::ProposalDrafter;
pub use questions::DiscoveryQuestionGenerator;
pub use schemas::StepSchemas;
pub use value::ValuePropositionGenerator;

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::insights::{
    CaseStudyMatch, Challenge, DiscoveryQuestions, ProposalDraft, RfpAnalysis, StepOutput,
    ValueProposition,
};
use super::step::StepId;
use crate::storage::CaseStudyStore;
use crate::types::{DocumentId, ProjectId, StepError};

// =============================================================================
// Execution Context
// =============================================================================

/// Inputs handed to an executor for one invocation
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub project_id: ProjectId,
    pub document_id: DocumentId,
    /// Outputs of prerequisites that completed in this run
    pub dependencies: BTreeMap<StepId, StepOutput>,
}

impl ExecutionContext {
    pub fn new(project_id: ProjectId, document_id: DocumentId) -> Self {
        Self {
            project_id,
            document_id,
            dependencies: BTreeMap::new(),
        }
    }

    pub fn with_dependency(mut self, output: StepOutput) -> Self {
        self.dependencies.insert(output.step_id(), output);
        self
    }

    pub fn analysis(&self) -> Option<&RfpAnalysis> {
        match self.dependencies.get(&StepId::RfpAnalyzer) {
            Some(StepOutput::RfpAnalysis(a)) => Some(a),
            _ => None,
        }
    }

    pub fn challenges(&self) -> Option<&[Challenge]> {
        match self.dependencies.get(&StepId::ChallengeExtractor) {
            Some(StepOutput::Challenges(c)) => Some(c),
            _ => None,
        }
    }

    pub fn value_propositions(&self) -> Option<&[ValueProposition]> {
        match self.dependencies.get(&StepId::ValueProposition) {
            Some(StepOutput::ValuePropositions(v)) => Some(v),
            _ => None,
        }
    }

    pub fn discovery_questions(&self) -> Option<&DiscoveryQuestions> {
        match self.dependencies.get(&StepId::DiscoveryQuestion) {
            Some(StepOutput::DiscoveryQuestions(q)) => Some(q),
            _ => None,
        }
    }

    pub fn case_study_matches(&self) -> Option<&[CaseStudyMatch]> {
        match self.dependencies.get(&StepId::CaseStudyMatcher) {
            Some(StepOutput::CaseStudyMatches(m)) => Some(m),
            _ => None,
        }
    }

    pub fn proposal_draft(&self) -> Option<&ProposalDraft> {
        match self.dependencies.get(&StepId::ProposalDrafter) {
            Some(StepOutput::ProposalDraft(d)) => Some(d),
            _ => None,
        }
    }

    /// The RFP analysis every downstream step is grounded on.
    pub(crate) fn require_analysis(&self) -> Result<&RfpAnalysis, StepError> {
        self.analysis()
            .ok_or(StepError::UpstreamDependencyFailed(StepId::RfpAnalyzer))
    }
}

// =============================================================================
// Executor Trait
// =============================================================================

#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn step_id(&self) -> StepId;

    async fn execute(&self, ctx: &ExecutionContext) -> Result<StepOutput, StepError>;
}

pub type SharedExecutor = Arc<dyn StepExecutor>;

// =============================================================================
// Registry
// =============================================================================

/// Executor lookup by step id
#[derive(Clone, Default)]
pub struct StepRegistry {
    executors: HashMap<StepId, SharedExecutor>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the six model-backed executors sharing one runtime.
    pub fn with_defaults(runtime: StepRuntime, case_studies: Arc<dyn CaseStudyStore>) -> Self {
        let runtime = Arc::new(runtime);
        Self::new()
            .register(Arc::new(RfpAnalyzer::new(runtime.clone())))
            .register(Arc::new(ChallengeExtractor::new(runtime.clone())))
            .register(Arc::new(ValuePropositionGenerator::new(runtime.clone())))
            .register(Arc::new(DiscoveryQuestionGenerator::new(runtime.clone())))
            .register(Arc::new(CaseStudyMatcher::new(runtime.clone(), case_studies)))
            .register(Arc::new(ProposalDrafter::new(runtime)))
    }

    /// Add or replace the executor for its step.
    pub fn register(mut self, executor: SharedExecutor) -> Self {
        self.executors.insert(executor.step_id(), executor);
        self
    }

    pub fn get(&self, step: StepId) -> Option<SharedExecutor> {
        self.executors.get(&step).cloned()
    }
}
