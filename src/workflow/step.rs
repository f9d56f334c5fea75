//! Step identifiers and the fixed dependency graph.
//!
//! The graph never changes per run:
//!
//! ```text
//! rfp_analyzer ─┬─> challenge_extractor ──> value_proposition
//!               ├─> discovery_question
//!               ├─> case_study_matcher
//!               └─> proposal_drafter   (also waits on every other selected step)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::types::{ParseWithDefault, Result, RfpError};

// =============================================================================
// Step Identifier
// =============================================================================

/// One of the six analysis steps. Variant order is a valid execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    RfpAnalyzer,
    ChallengeExtractor,
    ValueProposition,
    DiscoveryQuestion,
    CaseStudyMatcher,
    ProposalDrafter,
}

impl StepId {
    pub const ALL: [StepId; 6] = [
        StepId::RfpAnalyzer,
        StepId::ChallengeExtractor,
        StepId::ValueProposition,
        StepId::DiscoveryQuestion,
        StepId::CaseStudyMatcher,
        StepId::ProposalDrafter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RfpAnalyzer => "rfp_analyzer",
            Self::ChallengeExtractor => "challenge_extractor",
            Self::ValueProposition => "value_proposition",
            Self::DiscoveryQuestion => "discovery_question",
            Self::CaseStudyMatcher => "case_study_matcher",
            Self::ProposalDrafter => "proposal_drafter",
        }
    }

    /// Human readable name for CLI output
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::RfpAnalyzer => "RFP Analyzer",
            Self::ChallengeExtractor => "Challenge Extractor",
            Self::ValueProposition => "Value Proposition Generator",
            Self::DiscoveryQuestion => "Discovery Question Generator",
            Self::CaseStudyMatcher => "Case Study Matcher",
            Self::ProposalDrafter => "Proposal Drafter",
        }
    }

    /// Declared edges of the fixed graph.
    ///
    /// The proposal drafter's extra wait on every other selected step is not an
    /// edge here; see [`StepSelection::prerequisites`].
    pub fn dependencies(&self) -> &'static [StepId] {
        match self {
            Self::RfpAnalyzer => &[],
            Self::ChallengeExtractor => &[Self::RfpAnalyzer],
            Self::ValueProposition => &[Self::ChallengeExtractor],
            Self::DiscoveryQuestion => &[Self::RfpAnalyzer],
            Self::CaseStudyMatcher => &[Self::RfpAnalyzer],
            Self::ProposalDrafter => &[Self::RfpAnalyzer],
        }
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = RfpError;

    fn from_str(s: &str) -> Result<Self> {
        StepId::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| RfpError::InvalidSelection(format!("unknown step: {}", s)))
    }
}

// =============================================================================
// Step State
// =============================================================================

/// Per-step state within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Skipped,
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Skipped | Self::Completed | Self::Failed)
    }
}

impl ParseWithDefault for StepState {
    fn type_name() -> &'static str {
        "StepState"
    }

    fn default_value() -> Self {
        Self::Pending
    }

    fn try_parse(s: &str) -> Option<Self> {
        match s {
            "skipped" => Some(Self::Skipped),
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Caller-facing step toggles. The RFP analyzer is implied by any toggle;
/// `challenges` also brings in value propositions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepFlags {
    pub challenges: bool,
    pub questions: bool,
    pub cases: bool,
    pub proposal: bool,
}

/// Non-empty, dependency-closed set of steps to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<StepId>", into = "Vec<StepId>")]
pub struct StepSelection(BTreeSet<StepId>);

impl StepSelection {
    /// Build a selection, pulling in every declared dependency.
    pub fn new(steps: impl IntoIterator<Item = StepId>) -> Result<Self> {
        let mut selected = BTreeSet::new();
        let mut stack: Vec<StepId> = steps.into_iter().collect();
        while let Some(step) = stack.pop() {
            if selected.insert(step) {
                stack.extend_from_slice(step.dependencies());
            }
        }

        if selected.is_empty() {
            return Err(RfpError::InvalidSelection(
                "at least one step must be selected".to_string(),
            ));
        }
        Ok(Self(selected))
    }

    pub fn from_flags(flags: &StepFlags) -> Result<Self> {
        let mut steps = Vec::new();
        if flags.challenges {
            steps.extend([StepId::ChallengeExtractor, StepId::ValueProposition]);
        }
        if flags.questions {
            steps.push(StepId::DiscoveryQuestion);
        }
        if flags.cases {
            steps.push(StepId::CaseStudyMatcher);
        }
        if flags.proposal {
            steps.push(StepId::ProposalDrafter);
        }
        Self::new(steps)
    }

    pub fn all() -> Self {
        Self(StepId::ALL.into_iter().collect())
    }

    pub fn contains(&self, step: StepId) -> bool {
        self.0.contains(&step)
    }

    pub fn iter(&self) -> impl Iterator<Item = StepId> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Steps that must be `Completed` before `step` may run.
    pub fn prerequisites(&self, step: StepId) -> Vec<StepId> {
        match step {
            StepId::ProposalDrafter => self.iter().filter(|s| *s != step).collect(),
            _ => step
                .dependencies()
                .iter()
                .copied()
                .filter(|dep| self.contains(*dep))
                .collect(),
        }
    }

    /// Selected steps in an order where every prerequisite precedes its dependents.
    ///
    /// Kahn's algorithm over the selection; ties resolve in declaration order so
    /// the result is deterministic.
    pub fn execution_order(&self) -> Vec<StepId> {
        let mut indegree: BTreeMap<StepId, usize> = self
            .iter()
            .map(|step| (step, self.prerequisites(step).len()))
            .collect();
        let mut order = Vec::with_capacity(self.len());

        loop {
            let ready = indegree
                .iter()
                .find(|(_, degree)| **degree == 0)
                .map(|(step, _)| *step);
            let Some(next) = ready else { break };

            indegree.remove(&next);
            order.push(next);
            for (step, degree) in indegree.iter_mut() {
                if self.prerequisites(*step).contains(&next) {
                    *degree -= 1;
                }
            }
        }

        order
    }
}

impl TryFrom<Vec<StepId>> for StepSelection {
    type Error = RfpError;

    fn try_from(steps: Vec<StepId>) -> Result<Self> {
        Self::new(steps)
    }
}

impl From<StepSelection> for Vec<StepId> {
    fn from(selection: StepSelection) -> Self {
        selection.0.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_step_id_roundtrip_str() {
        for step in StepId::ALL {
            assert_eq!(step.as_str().parse::<StepId>().unwrap(), step);
            assert_eq!(
                serde_json::to_string(&step).unwrap(),
                format!("\"{}\"", step.as_str())
            );
        }
        assert!("summary".parse::<StepId>().is_err());
    }

    #[test]
    fn test_questions_only_selection() {
        let selection = StepSelection::from_flags(&StepFlags {
            questions: true,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            selection.execution_order(),
            vec![StepId::RfpAnalyzer, StepId::DiscoveryQuestion]
        );
    }

    #[test]
    fn test_empty_flags_rejected() {
        let result = StepSelection::from_flags(&StepFlags::default());
        assert!(matches!(result, Err(RfpError::InvalidSelection(_))));
    }

    #[test]
    fn test_challenges_flag_includes_value_proposition() {
        let selection = StepSelection::from_flags(&StepFlags {
            challenges: true,
            ..Default::default()
        })
        .unwrap();
        assert!(selection.contains(StepId::ValueProposition));
        assert!(!selection.contains(StepId::ProposalDrafter));
    }

    #[test]
    fn test_value_proposition_pulls_in_chain() {
        let selection = StepSelection::new([StepId::ValueProposition]).unwrap();
        assert_eq!(
            selection.execution_order(),
            vec![
                StepId::RfpAnalyzer,
                StepId::ChallengeExtractor,
                StepId::ValueProposition
            ]
        );
    }

    #[test]
    fn test_proposal_waits_for_every_selected_step() {
        let selection = StepSelection::all();
        let prereqs = selection.prerequisites(StepId::ProposalDrafter);
        assert_eq!(prereqs.len(), 5);
        assert_eq!(
            selection.execution_order().last(),
            Some(&StepId::ProposalDrafter)
        );
    }

    #[test]
    fn test_selection_deserialize_closes_dependencies() {
        let selection: StepSelection = serde_json::from_str(r#"["case_study_matcher"]"#).unwrap();
        assert!(selection.contains(StepId::RfpAnalyzer));
        assert!(serde_json::from_str::<StepSelection>("[]").is_err());
    }

    #[test]
    fn test_step_state_parse_with_default() {
        assert_eq!(StepState::parse_or_default("failed"), StepState::Failed);
        assert_eq!(StepState::parse_or_default("bogus"), StepState::Pending);
        assert!(StepState::Skipped.is_terminal());
        assert!(!StepState::Running.is_terminal());
    }

    proptest! {
        #[test]
        fn prop_execution_order_respects_prerequisites(mask in 1u8..64) {
            let steps = StepId::ALL
                .into_iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, step)| step);
            let selection = StepSelection::new(steps).unwrap();
            let order = selection.execution_order();

            prop_assert_eq!(order.len(), selection.len());
            for (position, step) in order.iter().enumerate() {
                for prereq in selection.prerequisites(*step) {
                    let prereq_pos = order.iter().position(|s| *s == prereq);
                    prop_assert!(prereq_pos.is_some_and(|p| p < position));
                }
            }
        }
    }
}
