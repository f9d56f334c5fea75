//! Ingest Command
//!
//! Indexes the extracted text of an RFP document for a project.

use std::path::Path;

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::types::{DocumentId, ProjectId, Result};

pub fn run(ctx: &CommandContext, project: &str, document: &str, file: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(file)?;
    let title = file.file_stem().and_then(|s| s.to_str());

    let chunks = ctx.retrieval().index_document(
        &ProjectId::new(project),
        &DocumentId::new(document),
        title,
        &content,
    )?;

    Output::new().success(&format!(
        "Indexed {} as {} for project {} ({} chunks)",
        file.display(),
        document,
        project,
        chunks
    ));
    Ok(chunks)
}
