//! Import Cases Command
//!
//! Loads a JSON array of case studies into the catalog.

use std::path::Path;

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::storage::CaseStudyStore;
use crate::types::Result;

pub fn run(ctx: &CommandContext, file: &Path) -> Result<()> {
    let store = ctx.case_studies();
    let imported = store.import_file(file)?;
    let total = store.count()?;

    let output = Output::new();
    output.success(&format!("Imported {} case studies", imported));
    output.info(&format!("Catalog now holds {} entries", total));
    Ok(())
}
