//! Insights model: typed step outputs and the per-project aggregate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::step::StepId;
use crate::types::ProjectId;

// =============================================================================
// Step Output Fragments
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RfpAnalysis {
    pub executive_summary: String,
    pub client_name: Option<String>,
    pub industry: Option<String>,
    pub key_requirements: Vec<String>,
    pub evaluation_criteria: Vec<String>,
    pub deadlines: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub impact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueProposition {
    /// Title of the challenge this proposition answers
    pub challenge: String,
    pub proposition: String,
    #[serde(default)]
    pub benefits: Vec<String>,
}

/// Discovery questions grouped by category
pub type DiscoveryQuestions = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseStudyMatch {
    pub case_study_id: String,
    pub title: String,
    /// 0.0 - 1.0
    pub relevance: f32,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSection {
    pub heading: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDraft {
    pub title: String,
    pub sections: Vec<ProposalSection>,
}

/// Result of one step, tagged by the step that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum StepOutput {
    RfpAnalysis(RfpAnalysis),
    Challenges(Vec<Challenge>),
    ValuePropositions(Vec<ValueProposition>),
    DiscoveryQuestions(DiscoveryQuestions),
    CaseStudyMatches(Vec<CaseStudyMatch>),
    ProposalDraft(ProposalDraft),
}

impl StepOutput {
    pub fn step_id(&self) -> StepId {
        match self {
            Self::RfpAnalysis(_) => StepId::RfpAnalyzer,
            Self::Challenges(_) => StepId::ChallengeExtractor,
            Self::ValuePropositions(_) => StepId::ValueProposition,
            Self::DiscoveryQuestions(_) => StepId::DiscoveryQuestion,
            Self::CaseStudyMatches(_) => StepId::CaseStudyMatcher,
            Self::ProposalDraft(_) => StepId::ProposalDrafter,
        }
    }

    /// True when the output carries nothing worth storing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::RfpAnalysis(a) => a.executive_summary.trim().is_empty(),
            Self::Challenges(c) => c.is_empty(),
            Self::ValuePropositions(v) => v.is_empty(),
            Self::DiscoveryQuestions(q) => q.values().all(Vec::is_empty),
            Self::CaseStudyMatches(m) => m.is_empty(),
            Self::ProposalDraft(d) => d.sections.is_empty(),
        }
    }

    /// Number of items, for log lines and CLI summaries.
    pub fn item_count(&self) -> usize {
        match self {
            Self::RfpAnalysis(_) | Self::ProposalDraft(_) => 1,
            Self::Challenges(c) => c.len(),
            Self::ValuePropositions(v) => v.len(),
            Self::DiscoveryQuestions(q) => q.values().map(Vec::len).sum(),
            Self::CaseStudyMatches(m) => m.len(),
        }
    }
}

// =============================================================================
// Insights Aggregate
// =============================================================================

/// Accumulated output of completed steps for one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub project_id: ProjectId,
    pub executive_summary: Option<String>,
    pub rfp_analysis: Option<RfpAnalysis>,
    pub challenges: Vec<Challenge>,
    pub value_propositions: Vec<ValueProposition>,
    pub discovery_questions: DiscoveryQuestions,
    pub matching_case_studies: Vec<CaseStudyMatch>,
    pub proposal_draft: Option<ProposalDraft>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Insights {
    pub fn empty(project_id: ProjectId) -> Self {
        let now = Utc::now();
        Self {
            project_id,
            executive_summary: None,
            rfp_analysis: None,
            challenges: Vec::new(),
            value_propositions: Vec::new(),
            discovery_questions: DiscoveryQuestions::new(),
            matching_case_studies: Vec::new(),
            proposal_draft: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overwrite the field owned by `output`'s step.
    pub fn apply(&mut self, output: &StepOutput) {
        match output {
            StepOutput::RfpAnalysis(a) => {
                self.executive_summary = Some(a.executive_summary.clone());
                self.rfp_analysis = Some(a.clone());
            }
            StepOutput::Challenges(c) => self.challenges = c.clone(),
            StepOutput::ValuePropositions(v) => self.value_propositions = v.clone(),
            StepOutput::DiscoveryQuestions(q) => self.discovery_questions = q.clone(),
            StepOutput::CaseStudyMatches(m) => self.matching_case_studies = m.clone(),
            StepOutput::ProposalDraft(d) => self.proposal_draft = Some(d.clone()),
        }
        self.updated_at = Utc::now();
    }

    /// Whether the fragment owned by `step` is present and non-empty.
    pub fn has_fragment(&self, step: StepId) -> bool {
        match step {
            StepId::RfpAnalyzer => self
                .executive_summary
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty()),
            StepId::ChallengeExtractor => !self.challenges.is_empty(),
            StepId::ValueProposition => !self.value_propositions.is_empty(),
            StepId::DiscoveryQuestion => self.discovery_questions.values().any(|q| !q.is_empty()),
            StepId::CaseStudyMatcher => !self.matching_case_studies.is_empty(),
            StepId::ProposalDrafter => self.proposal_draft.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn challenge(title: &str) -> Challenge {
        Challenge {
            title: title.to_string(),
            description: "Manual reconciliation".to_string(),
            impact: None,
        }
    }

    #[test]
    fn test_step_output_tags_match_steps() {
        let output = StepOutput::Challenges(vec![challenge("Legacy billing")]);
        assert_eq!(output.step_id(), StepId::ChallengeExtractor);
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["kind"], "challenges");
        assert_eq!(json["value"][0]["title"], "Legacy billing");
    }

    #[test]
    fn test_empty_outputs() {
        assert!(StepOutput::Challenges(Vec::new()).is_empty());
        assert!(StepOutput::RfpAnalysis(RfpAnalysis::default()).is_empty());

        let mut questions = DiscoveryQuestions::new();
        questions.insert("Budget".to_string(), Vec::new());
        assert!(StepOutput::DiscoveryQuestions(questions.clone()).is_empty());
        questions.insert("Timeline".to_string(), vec!["When is go-live?".to_string()]);
        assert!(!StepOutput::DiscoveryQuestions(questions).is_empty());
    }

    #[test]
    fn test_apply_overwrites_only_own_field() {
        let mut insights = Insights::empty(ProjectId::new("P1"));
        insights.apply(&StepOutput::Challenges(vec![challenge("A"), challenge("B")]));
        insights.apply(&StepOutput::RfpAnalysis(RfpAnalysis {
            executive_summary: "Replace the ERP".to_string(),
            ..Default::default()
        }));
        insights.apply(&StepOutput::Challenges(vec![challenge("C")]));

        assert_eq!(insights.challenges, vec![challenge("C")]);
        assert_eq!(insights.executive_summary.as_deref(), Some("Replace the ERP"));
        assert!(insights.has_fragment(StepId::RfpAnalyzer));
        assert!(!insights.has_fragment(StepId::CaseStudyMatcher));
    }

    #[test]
    fn test_insights_serialize_camel_case() {
        let insights = Insights::empty(ProjectId::new("P1"));
        let json = serde_json::to_value(&insights).unwrap();
        assert!(json.get("valuePropositions").is_some());
        assert!(json.get("matchingCaseStudies").is_some());
        assert_eq!(json["projectId"], "P1");
    }
}
