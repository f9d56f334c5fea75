//! Status Command
//!
//! Display the latest run of a project, or every attempt with `--history`.

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::types::{ProjectId, Result};

pub fn run(ctx: &CommandContext, project: &str, format: &str, history: bool) -> Result<()> {
    let project_id = ProjectId::new(project);
    let status = ctx.status();
    let json_output = format == "json";

    if history {
        let runs = status.history(&project_id)?;
        if json_output {
            println!("{}", serde_json::to_string_pretty(&runs)?);
            return Ok(());
        }

        let output = Output::new();
        if runs.is_empty() {
            output.info(&format!("No runs for project {}", project_id));
        }
        for snapshot in &runs {
            output.section(&format!(
                "Attempt {}",
                snapshot.attempt.unwrap_or_default()
            ));
            output.snapshot(snapshot);
        }
        return Ok(());
    }

    let snapshot = status.get_status(&project_id)?;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        let output = Output::new();
        output.header(&format!("Workflow status: {}", project_id));
        output.snapshot(&snapshot);
    }

    Ok(())
}
