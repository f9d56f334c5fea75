//! Workflow engine
//!
//! - [`step`]: fixed step graph and run selections
//! - [`run`]: run model and state transitions
//! - [`insights`]: typed step outputs and the per-project aggregate
//! - [`executors`]: the six step executors and their shared runner
//! - [`coordinator`]: single-writer execution of runs
//! - [`status`]: read-only snapshots for pollers
//! - [`notify`]: user notifications on run start and finish

pub mod coordinator;
pub mod executors;
pub mod insights;
pub mod notify;
pub mod run;
pub mod status;
pub mod step;

pub use coordinator::{RunHandle, StartRunRequest, WorkflowCoordinator};
pub use executors::{ExecutionContext, StepExecutor, StepRegistry, StepRuntime};
pub use insights::{
    CaseStudyMatch, Challenge, DiscoveryQuestions, Insights, ProposalDraft, ProposalSection,
    RfpAnalysis, StepOutput, ValueProposition,
};
pub use notify::{LogNotifier, Notifier, SharedNotifier, WorkflowEvent};
pub use run::{Run, RunStatus, StepErrorRecord};
pub use status::{RunSnapshot, StatusQueryService};
pub use step::{StepFlags, StepId, StepSelection, StepState};
