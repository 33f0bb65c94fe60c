//! Outcome Mapping
//!
//! Determinations and review recommendations are semantic decisions. Each
//! workflow phase offers concrete action names, and a fixed table says which
//! outcome every determination action stands for. Mapping intersects that
//! table with the actions a phase actually offers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EngineError, MappingError};
use crate::graph::PhaseGraph;
use crate::state::Submission;

/// A determination decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Dismissed,
    NeedsMoreInfo,
    Approved,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dismissed => "dismissed",
            Self::NeedsMoreInfo => "needs_more_info",
            Self::Approved => "approved",
        }
    }

    /// Integer code used in persisted determination answers
    pub fn code(&self) -> u8 {
        match self {
            Self::Dismissed => 0,
            Self::NeedsMoreInfo => 1,
            Self::Approved => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::Dismissed),
            1 => Some(Self::NeedsMoreInfo),
            2 => Some(Self::Approved),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Dismissed => "Dismissed",
            Self::NeedsMoreInfo => "Needs more info",
            Self::Approved => "Approved",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A reviewer's recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    No,
    Maybe,
    Yes,
}

impl Recommendation {
    pub fn code(&self) -> u8 {
        match self {
            Self::No => 0,
            Self::Maybe => 1,
            Self::Yes => 2,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(Self::No),
            1 => Some(Self::Maybe),
            2 => Some(Self::Yes),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::No => "No",
            Self::Maybe => "Maybe",
            Self::Yes => "Yes",
        }
    }
}

impl From<Recommendation> for Outcome {
    fn from(rec: Recommendation) -> Self {
        match rec {
            Recommendation::No => Outcome::Dismissed,
            Recommendation::Maybe => Outcome::NeedsMoreInfo,
            Recommendation::Yes => Outcome::Approved,
        }
    }
}

/// Action name to outcome table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutcomeTable {
    actions: BTreeMap<String, Outcome>,
}

impl OutcomeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Determination actions used by the bundled workflows
    pub fn standard() -> Self {
        let mut table = Self::new();
        for action in [
            "rejected",
            "ext_rejected",
            "com_rejected",
            "concept_rejected",
            "proposal_rejected",
        ] {
            table.insert(action, Outcome::Dismissed);
        }
        for action in [
            "more_info",
            "ext_more_info",
            "com_more_info",
            "concept_more_info",
            "proposal_more_info",
        ] {
            table.insert(action, Outcome::NeedsMoreInfo);
        }
        for action in [
            "accepted",
            "ext_accepted",
            "com_accepted",
            "invited_to_proposal",
            "proposal_accepted",
        ] {
            table.insert(action, Outcome::Approved);
        }
        table
    }

    pub fn insert(&mut self, action: impl Into<String>, outcome: Outcome) {
        self.actions.insert(action.into(), outcome);
    }

    pub fn with(mut self, action: impl Into<String>, outcome: Outcome) -> Self {
        self.insert(action, outcome);
        self
    }

    pub fn outcome_of(&self, action: &str) -> Option<Outcome> {
        self.actions.get(action).copied()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Pick the single available action standing for `outcome`.
    pub fn action_for_outcome<'a, I>(&self, available: I, outcome: Outcome) -> Result<String, MappingError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut candidates: Vec<String> = available
            .into_iter()
            .filter(|action| self.outcome_of(action) == Some(outcome))
            .map(str::to_string)
            .collect();
        candidates.sort();
        candidates.dedup();

        match candidates.len() {
            0 => Err(MappingError::NoMatchingTransition { outcome }),
            1 => Ok(candidates.remove(0)),
            _ => Err(MappingError::AmbiguousTransition {
                outcome,
                candidates,
            }),
        }
    }

    /// The one outcome shared by every action in a batch.
    pub fn outcome_for_actions<S: AsRef<str>>(&self, actions: &[S]) -> Result<Outcome, MappingError> {
        let (first, rest) = actions.split_first().ok_or(MappingError::EmptyBatch)?;
        let first = first.as_ref();
        let outcome = self
            .outcome_of(first)
            .ok_or_else(|| MappingError::UnmappedAction(first.to_string()))?;

        for action in rest {
            let action = action.as_ref();
            let other = self
                .outcome_of(action)
                .ok_or_else(|| MappingError::UnmappedAction(action.to_string()))?;
            if other != outcome {
                return Err(MappingError::MixedOutcomes {
                    actions: actions.iter().map(|a| a.as_ref().to_string()).collect(),
                });
            }
        }

        Ok(outcome)
    }

    /// Resolve `outcome` against the actions offered by `phase` in `graph`.
    pub fn action_in_phase(
        &self,
        graph: &PhaseGraph,
        phase: &str,
        outcome: Outcome,
    ) -> Result<String, EngineError> {
        let phase_ref = graph.require_phase(phase)?;
        let available = graph.phase_def(phase_ref).actions.iter().map(|a| a.name.as_str());
        Ok(self.action_for_outcome(available, outcome)?)
    }

    /// Resolve `outcome` against the submission's current phase.
    pub fn action_for_submission(
        &self,
        graph: &PhaseGraph,
        submission: &Submission,
        outcome: Outcome,
    ) -> Result<String, EngineError> {
        self.action_in_phase(graph, &submission.status, outcome)
    }
}
