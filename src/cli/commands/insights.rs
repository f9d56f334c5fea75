//! Insights Command

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::types::{ProjectId, Result};

pub fn run(ctx: &CommandContext, project: &str, format: &str) -> Result<()> {
    let project_id = ProjectId::new(project);
    let output = Output::new();

    let Some(insights) = ctx.insights().get(&project_id)? else {
        if format == "json" {
            println!("null");
        } else {
            output.warning(&format!("No insights for project {}", project_id));
        }
        return Ok(());
    };

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&insights)?);
    } else {
        output.insights(&insights);
    }
    Ok(())
}
