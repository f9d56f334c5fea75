use console::{StyledObject, style};

use crate::workflow::{Insights, RunSnapshot, RunStatus, StepId, StepState};

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    /// Run status, one line per step, then the error list.
    pub fn snapshot(&self, snapshot: &RunSnapshot) {
        let attempt = snapshot
            .attempt
            .map(|a| format!(" (attempt {})", a))
            .unwrap_or_default();
        println!("Status: {}{}", status_label(snapshot.status), attempt);

        if let Some(document) = &snapshot.document_id {
            println!("Document: {}", document);
        }
        if let Some(started) = snapshot.started_at {
            println!("Started: {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        if let Some(completed) = snapshot.completed_at {
            println!("Finished: {}", completed.format("%Y-%m-%d %H:%M:%S UTC"));
        }

        if !snapshot.steps.is_empty() {
            println!();
            for step in StepId::ALL {
                let Some(state) = snapshot.steps.get(&step) else {
                    continue;
                };
                println!("  {} {}", state_marker(*state), step.display_name());
            }
        }

        if !snapshot.errors.is_empty() {
            self.section("Errors");
            for error in &snapshot.errors {
                println!("  {}", style(error).red());
            }
        }
    }

    /// Progress line printed while polling: `[2/4] running`.
    pub fn progress(&self, snapshot: &RunSnapshot) {
        let done = snapshot.progress.values().filter(|done| **done).count();
        let total = snapshot.progress.len();
        println!(
            "{} [{}/{}] {}",
            style("…").dim(),
            done,
            total,
            snapshot.status
        );
    }

    pub fn insights(&self, insights: &Insights) {
        self.header(&format!("Insights for {}", insights.project_id));

        if let Some(summary) = &insights.executive_summary {
            self.section("Executive Summary");
            println!("{}", summary);
        }

        if let Some(analysis) = &insights.rfp_analysis {
            if let Some(client) = &analysis.client_name {
                println!("\nClient: {}", client);
            }
            if let Some(industry) = &analysis.industry {
                println!("Industry: {}", industry);
            }
            bullet_list("Key requirements", &analysis.key_requirements);
            bullet_list("Evaluation criteria", &analysis.evaluation_criteria);
            bullet_list("Deadlines", &analysis.deadlines);
        }

        if !insights.challenges.is_empty() {
            self.section("Challenges");
            for challenge in &insights.challenges {
                match &challenge.impact {
                    Some(impact) => println!("  • {} [{}]", style(&challenge.title).bold(), impact),
                    None => println!("  • {}", style(&challenge.title).bold()),
                }
                println!("    {}", challenge.description);
            }
        }

        if !insights.value_propositions.is_empty() {
            self.section("Value Propositions");
            for value in &insights.value_propositions {
                println!("  • {} → {}", value.challenge, value.proposition);
                for benefit in &value.benefits {
                    println!("      - {}", benefit);
                }
            }
        }

        if !insights.discovery_questions.is_empty() {
            self.section("Discovery Questions");
            for (category, questions) in &insights.discovery_questions {
                println!("  {}", style(category).bold());
                for question in questions {
                    println!("    ? {}", question);
                }
            }
        }

        if !insights.matching_case_studies.is_empty() {
            self.section("Matching Case Studies");
            for matched in &insights.matching_case_studies {
                println!(
                    "  • {} ({}) {:.0}%",
                    matched.title,
                    matched.case_study_id,
                    matched.relevance * 100.0
                );
                if !matched.rationale.is_empty() {
                    println!("    {}", style(&matched.rationale).dim());
                }
            }
        }

        if let Some(draft) = &insights.proposal_draft {
            self.section(&format!("Proposal Draft: {}", draft.title));
            for section in &draft.sections {
                println!("\n{}", style(&section.heading).bold());
                println!("{}", section.body);
            }
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}

fn bullet_list(title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{}:", title);
    for item in items {
        println!("  - {}", item);
    }
}

fn status_label(status: RunStatus) -> StyledObject<&'static str> {
    let label = style(status.as_str());
    match status {
        RunStatus::Completed => label.green().bold(),
        RunStatus::Failed | RunStatus::Error => label.red().bold(),
        RunStatus::Running | RunStatus::Pending => label.yellow(),
        RunStatus::NotStarted => label.dim(),
    }
}

fn state_marker(state: StepState) -> StyledObject<&'static str> {
    match state {
        StepState::Completed => style("✓").green(),
        StepState::Failed => style("✗").red(),
        StepState::Running => style("▶").yellow(),
        StepState::Pending => style("·").dim(),
        StepState::Skipped => style("-").dim(),
    }
}
