//! Run Command
//!
//! Starts a workflow run in-process and polls the status service until the
//! run is terminal, printing progress whenever it changes.

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::types::{DocumentId, ProjectId, Result, UserId};
use crate::workflow::{RunSnapshot, StartRunRequest, StepFlags, StepSelection};

pub struct RunOptions {
    pub project: String,
    pub document: String,
    pub user: Option<String>,
    pub flags: StepFlags,
    pub all: bool,
}

pub async fn run(ctx: &CommandContext, options: RunOptions) -> Result<RunSnapshot> {
    let output = Output::new();
    let project_id = ProjectId::new(options.project);
    let document_id = DocumentId::new(options.document);

    if !ctx.retrieval().has_document(&project_id, &document_id)? {
        output.warning(&format!(
            "Document {} has not been ingested for {}; retrieval may fall back to other documents",
            document_id, project_id
        ));
    }

    let selection = if options.all {
        StepSelection::all()
    } else {
        StepSelection::from_flags(&options.flags)?
    };

    let coordinator = ctx.coordinator()?;
    let handle = coordinator.start_run(StartRunRequest {
        project_id,
        document_id,
        user_id: options.user.map(UserId::new),
        selection,
    })?;

    output.info(&format!(
        "Started run {} (attempt {})",
        handle.run_id, handle.attempt
    ));

    let status = coordinator.status_service();
    let mut last_seen = None;
    let snapshot = handle
        .watch(&status, ctx.config.workflow.poll_interval(), |snapshot| {
            let seen = (snapshot.status, snapshot.progress.clone());
            if last_seen.as_ref() != Some(&seen) {
                output.progress(snapshot);
                last_seen = Some(seen);
            }
        })
        .await?;

    output.header("Run finished");
    output.snapshot(&snapshot);
    Ok(snapshot)
}
