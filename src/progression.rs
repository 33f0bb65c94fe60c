//! Automatic Progression Rules
//!
//! Declarative rules that pick an action to apply after a state-affecting
//! event, e.g. "the first review moves a submission into internal review".
//! A rule only fires while the submission is in the rule's phase and the
//! phase still offers the chosen action, so evaluating again after the
//! action has been applied yields nothing.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::PhaseGraph;
use crate::state::Submission;

/// Event after which rules are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TriggerEvent {
    ReviewCreated {
        #[serde(default)]
        draft: bool,
    },
    ReviewSubmitted,
    PhaseEntered,
}

impl TriggerEvent {
    pub fn kind(&self) -> TriggerKind {
        match self {
            Self::ReviewCreated { .. } => TriggerKind::ReviewCreated,
            Self::ReviewSubmitted => TriggerKind::ReviewSubmitted,
            Self::PhaseEntered => TriggerKind::PhaseEntered,
        }
    }
}

/// Trigger a rule listens for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    ReviewCreated,
    ReviewSubmitted,
    PhaseEntered,
}

/// Predicate over the submission's review tally
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    #[default]
    Always,
    /// Exactly one review exists (draft or submitted)
    FirstReview,
    MinSubmittedReviews { count: u32 },
}

impl RuleCondition {
    pub fn holds(&self, submission: &Submission) -> bool {
        match self {
            Self::Always => true,
            Self::FirstReview => submission.reviews.total() == 1,
            Self::MinSubmittedReviews { count } => submission.reviews.submitted >= *count,
        }
    }
}

/// What a rule applies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    /// An action offered by the rule's phase
    Action(String),
    /// Whichever action of the rule's phase leads to this phase
    Phase(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressionRule {
    pub name: String,
    pub trigger: TriggerKind,
    /// Phase the submission must currently be in
    pub phase: String,
    #[serde(default)]
    pub condition: RuleCondition,
    /// Written as `{ action: name }` or `{ phase: name }`
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub target: RuleTarget,
}

/// The rules of one workflow, in evaluation order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressionRules {
    rules: Vec<ProgressionRule>,
}

impl ProgressionRules {
    pub fn new(rules: Vec<ProgressionRule>) -> Self {
        Self { rules }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProgressionRule> {
        self.rules.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// The action the first matching rule applies, if any
    pub fn evaluate(
        &self,
        graph: &PhaseGraph,
        submission: &Submission,
        event: TriggerEvent,
    ) -> Option<String> {
        let kind = event.kind();
        let current = graph.phase(&submission.status)?;
        let phase = graph.phase_def(current);

        for rule in &self.rules {
            if rule.trigger != kind || rule.phase != phase.name {
                continue;
            }
            if !rule.condition.holds(submission) {
                continue;
            }

            let action = match &rule.target {
                RuleTarget::Action(name) => phase.action(name).map(|a| a.name.clone()),
                RuleTarget::Phase(target) => phase
                    .actions
                    .iter()
                    .find(|a| {
                        a.target
                            .resolve_target(graph, current, &a.name)
                            .is_ok_and(|to| graph.phase_def(to).name == *target)
                    })
                    .map(|a| a.name.clone()),
            };

            match action {
                Some(action) => {
                    debug!(
                        rule = %rule.name,
                        submission_id = %submission.id,
                        action = %action,
                        "Progression rule matched"
                    );
                    return Some(action);
                }
                None => {
                    debug!(rule = %rule.name, phase = %phase.name, "Rule target not offered by phase");
                }
            }
        }
        None
    }
}
