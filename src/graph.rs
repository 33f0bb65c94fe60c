//! Phase Graph
//!
//! Indexed, immutable view of a [`WorkflowDefinition`]. Graphs are built once
//! at startup and shared read-only through a [`WorkflowRegistry`].

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::definition::{ActionDef, ActionTarget, PhaseDef, StageDef, WorkflowDefinition, WorkflowLoader};
use crate::error::{DefinitionError, TransitionError};
use crate::progression::{ProgressionRules, RuleTarget};

/// Position of a phase: stage index and index within the stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhaseRef {
    pub stage: usize,
    pub step: usize,
}

/// Problem found by [`PhaseGraph::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    DanglingTarget {
        phase: String,
        action: String,
        target: String,
    },
    DuplicateAction { phase: String, action: String },
    EmptyStage(String),
    /// `next_phase` on the very last phase of the workflow
    NextPhaseAtEnd { phase: String, action: String },
    UnknownRulePhase { rule: String, phase: String },
}

impl std::fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingTarget {
                phase,
                action,
                target,
            } => write!(f, "{}.{} targets missing phase '{}'", phase, action, target),
            Self::DuplicateAction { phase, action } => {
                write!(f, "{} offers action '{}' more than once", phase, action)
            }
            Self::EmptyStage(stage) => write!(f, "stage '{}' has no phases", stage),
            Self::NextPhaseAtEnd { phase, action } => {
                write!(f, "{}.{} uses next_phase but no phase follows", phase, action)
            }
            Self::UnknownRulePhase { rule, phase } => {
                write!(f, "rule '{}' refers to missing phase '{}'", rule, phase)
            }
        }
    }
}

/// Immutable workflow graph with a phase-name index
#[derive(Debug)]
pub struct PhaseGraph {
    definition: WorkflowDefinition,
    index: HashMap<String, PhaseRef>,
    order: Vec<PhaseRef>,
    rules: ProgressionRules,
}

impl PhaseGraph {
    pub fn new(definition: WorkflowDefinition) -> Result<Self, DefinitionError> {
        let mut index = HashMap::new();
        let mut order = Vec::new();

        for (stage, stage_def) in definition.stages.iter().enumerate() {
            for (step, phase) in stage_def.phases.iter().enumerate() {
                let phase_ref = PhaseRef { stage, step };
                if index.insert(phase.name.clone(), phase_ref).is_some() {
                    return Err(DefinitionError::DuplicatePhase {
                        workflow: definition.workflow.clone(),
                        phase: phase.name.clone(),
                    });
                }
                order.push(phase_ref);
            }
        }

        if order.is_empty() {
            return Err(DefinitionError::EmptyWorkflow(definition.workflow.clone()));
        }

        let rules = ProgressionRules::new(definition.rules.clone());
        Ok(Self {
            definition,
            index,
            order,
            rules,
        })
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        Self::new(WorkflowLoader::load_from_str(yaml)?)
    }

    pub fn name(&self) -> &str {
        &self.definition.workflow
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn rules(&self) -> &ProgressionRules {
        &self.rules
    }

    pub fn phase(&self, name: &str) -> Option<PhaseRef> {
        self.index.get(name).copied()
    }

    /// Look up a phase, treating a missing one as a configuration error
    pub fn require_phase(&self, name: &str) -> Result<PhaseRef, TransitionError> {
        self.phase(name).ok_or_else(|| TransitionError::UnknownPhase {
            workflow: self.name().to_string(),
            phase: name.to_string(),
        })
    }

    pub fn phase_def(&self, phase: PhaseRef) -> &PhaseDef {
        &self.definition.stages[phase.stage].phases[phase.step]
    }

    pub fn stage_def(&self, phase: PhaseRef) -> &StageDef {
        &self.definition.stages[phase.stage]
    }

    pub fn initial_phase(&self) -> PhaseRef {
        self.order[0]
    }

    /// The phase after `phase` in workflow order, crossing stage boundaries
    pub fn next_phase(&self, phase: PhaseRef) -> Option<PhaseRef> {
        let position = self.order.iter().position(|p| *p == phase)?;
        self.order.get(position + 1).copied()
    }

    /// Action `name` as offered by `phase`
    pub fn action(&self, phase: PhaseRef, name: &str) -> Option<&ActionDef> {
        self.phase_def(phase).action(name)
    }

    /// A phase none of whose actions lead anywhere: no actions at all, or
    /// only `next_phase` actions on the workflow's last phase
    pub fn is_terminal(&self, phase: PhaseRef) -> bool {
        self.phase_def(phase).actions.iter().all(|action| {
            matches!(
                action.target.resolve_target(self, phase, &action.name),
                Err(TransitionError::NoNextPhase { .. })
            )
        })
    }

    pub fn is_last_stage(&self, phase: PhaseRef) -> bool {
        phase.stage + 1 == self.definition.stages.len()
    }

    /// Phases reachable from `phase` by any sequence of actions, in workflow order
    pub fn future_phases(&self, phase: PhaseRef) -> Vec<PhaseRef> {
        let mut seen = vec![false; self.order.len()];
        let mut stack = vec![phase];
        while let Some(current) = stack.pop() {
            for action in &self.phase_def(current).actions {
                let Ok(target) = action.target.resolve_target(self, current, &action.name) else {
                    continue;
                };
                if let Some(position) = self.order.iter().position(|p| *p == target) {
                    if !seen[position] {
                        seen[position] = true;
                        stack.push(target);
                    }
                }
            }
        }
        self.order
            .iter()
            .zip(seen)
            .filter(|(p, reachable)| *reachable && **p != phase)
            .map(|(p, _)| *p)
            .collect()
    }

    /// All phases in workflow order
    pub fn phases(&self) -> impl Iterator<Item = (PhaseRef, &PhaseDef)> {
        self.order.iter().map(|p| (*p, self.phase_def(*p)))
    }

    /// Configuration lint: every problem in the graph at once.
    pub fn validate(&self) -> Vec<GraphIssue> {
        let mut issues = Vec::new();

        for stage in &self.definition.stages {
            if stage.phases.is_empty() {
                issues.push(GraphIssue::EmptyStage(stage.name.clone()));
            }
        }

        for (phase_ref, phase) in self.phases() {
            let mut names = std::collections::HashSet::new();
            for action in &phase.actions {
                if !names.insert(action.name.as_str()) {
                    issues.push(GraphIssue::DuplicateAction {
                        phase: phase.name.clone(),
                        action: action.name.clone(),
                    });
                }
                match action.target.resolve_target(self, phase_ref, &action.name) {
                    Err(TransitionError::DanglingTarget { target, .. }) => {
                        issues.push(GraphIssue::DanglingTarget {
                            phase: phase.name.clone(),
                            action: action.name.clone(),
                            target,
                        });
                    }
                    Err(TransitionError::NoNextPhase { .. }) => {
                        issues.push(GraphIssue::NextPhaseAtEnd {
                            phase: phase.name.clone(),
                            action: action.name.clone(),
                        });
                    }
                    _ => {}
                }
            }
        }

        for rule in self.rules.iter() {
            let mut phases = vec![rule.phase.as_str()];
            if let RuleTarget::Phase(target) = &rule.target {
                phases.push(target.as_str());
            }
            for phase in phases {
                if self.phase(phase).is_none() {
                    issues.push(GraphIssue::UnknownRulePhase {
                        rule: rule.name.clone(),
                        phase: phase.to_string(),
                    });
                }
            }
        }

        issues
    }
}

impl ActionTarget {
    /// The phase this target leads to from `current`.
    pub fn resolve_target(
        &self,
        graph: &PhaseGraph,
        current: PhaseRef,
        action: &str,
    ) -> Result<PhaseRef, TransitionError> {
        match self {
            ActionTarget::NextPhase => {
                graph
                    .next_phase(current)
                    .ok_or_else(|| TransitionError::NoNextPhase {
                        phase: graph.phase_def(current).name.clone(),
                        action: action.to_string(),
                    })
            }
            ActionTarget::ChangePhase { target } => {
                graph
                    .phase(target)
                    .ok_or_else(|| TransitionError::DanglingTarget {
                        workflow: graph.name().to_string(),
                        phase: graph.phase_def(current).name.clone(),
                        action: action.to_string(),
                        target: target.clone(),
                    })
            }
        }
    }
}

/// Loaded workflow graphs by name
#[derive(Debug, Default)]
pub struct WorkflowRegistry {
    graphs: HashMap<String, Arc<PhaseGraph>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_definitions(
        definitions: impl IntoIterator<Item = WorkflowDefinition>,
    ) -> Result<Self, DefinitionError> {
        let mut registry = Self::new();
        for definition in definitions {
            registry.insert(PhaseGraph::new(definition)?)?;
        }
        Ok(registry)
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self, DefinitionError> {
        let registry = Self::from_definitions(WorkflowLoader::load_from_dir(dir)?.into_values())?;
        tracing::info!(dir = %dir.display(), workflows = registry.len(), "Loaded workflow registry");
        Ok(registry)
    }

    pub fn insert(&mut self, graph: PhaseGraph) -> Result<(), DefinitionError> {
        let name = graph.name().to_string();
        if self.graphs.contains_key(&name) {
            return Err(DefinitionError::DuplicateWorkflow(name));
        }
        for issue in graph.validate() {
            tracing::warn!(workflow = %name, issue = %issue, "Workflow configuration issue");
        }
        self.graphs.insert(name, Arc::new(graph));
        Ok(())
    }

    pub fn get(&self, workflow: &str) -> Result<Arc<PhaseGraph>, TransitionError> {
        self.graphs
            .get(workflow)
            .cloned()
            .ok_or_else(|| TransitionError::UnknownWorkflow(workflow.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.graphs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_STAGES: &str = r#"
workflow: two_stages
stages:
  - name: Concept
    phases:
      - name: concept_draft
        actions:
          - { name: submit, type: next_phase }
      - name: concept_review
        actions:
          - { name: invited_to_proposal, type: change_phase, target: proposal_draft }
          - { name: concept_rejected, type: change_phase, target: concept_rejected }
      - name: concept_rejected
        outcome: dismissed
  - name: Proposal
    phases:
      - name: proposal_draft
        actions:
          - { name: submit, type: next_phase }
      - name: proposal_review
        actions:
          - { name: proposal_accepted, type: next_phase }
          - { name: lost, type: change_phase, target: nowhere }
      - name: proposal_accepted
        outcome: approved
"#;

    fn graph() -> PhaseGraph {
        PhaseGraph::from_yaml(TWO_STAGES).unwrap()
    }

    #[test]
    fn test_initial_and_terminal() {
        let graph = graph();
        assert_eq!(graph.phase_def(graph.initial_phase()).name, "concept_draft");
        let accepted = graph.phase("proposal_accepted").unwrap();
        assert!(graph.is_terminal(accepted));
        assert!(graph.is_last_stage(accepted));
        assert!(!graph.is_last_stage(graph.phase("concept_rejected").unwrap()));
    }

    #[test]
    fn test_next_phase_on_last_phase_is_terminal() {
        let graph = PhaseGraph::from_yaml(
            r#"
workflow: closing
stages:
  - name: Only
    phases:
      - name: open
        actions:
          - { name: close, type: next_phase }
      - name: done
        actions:
          - { name: finish, type: next_phase }
"#,
        )
        .unwrap();
        let open = graph.phase("open").unwrap();
        let done = graph.phase("done").unwrap();
        assert!(!graph.is_terminal(open));
        assert!(graph.is_terminal(done));
        assert!(graph.future_phases(done).is_empty());
    }

    #[test]
    fn test_next_phase_crosses_stages() {
        let graph = graph();
        let rejected = graph.phase("concept_rejected").unwrap();
        let next = graph.next_phase(rejected).unwrap();
        assert_eq!(graph.phase_def(next).name, "proposal_draft");
        assert_eq!(graph.next_phase(graph.phase("proposal_accepted").unwrap()), None);
    }

    #[test]
    fn test_require_unknown_phase() {
        let err = graph().require_phase("archived").unwrap_err();
        assert_eq!(
            err,
            TransitionError::UnknownPhase {
                workflow: "two_stages".into(),
                phase: "archived".into()
            }
        );
    }

    #[test]
    fn test_duplicate_phase_rejected() {
        let yaml = r#"
workflow: dup
stages:
  - name: A
    phases: [{ name: draft }, { name: draft }]
"#;
        assert!(matches!(
            PhaseGraph::from_yaml(yaml),
            Err(DefinitionError::DuplicatePhase { phase, .. }) if phase == "draft"
        ));
    }

    #[test]
    fn test_empty_workflow_rejected() {
        let yaml = "workflow: empty\nstages: []\n";
        assert!(matches!(
            PhaseGraph::from_yaml(yaml),
            Err(DefinitionError::EmptyWorkflow(_))
        ));
    }

    #[test]
    fn test_future_phases() {
        let graph = graph();
        let review = graph.phase("concept_review").unwrap();
        let names: Vec<&str> = graph
            .future_phases(review)
            .into_iter()
            .map(|p| graph.phase_def(p).name.as_str())
            .collect();
        assert_eq!(
            names,
            vec!["concept_rejected", "proposal_draft", "proposal_review", "proposal_accepted"]
        );
    }

    #[test]
    fn test_validate_lists_dangling_targets() {
        let issues = graph().validate();
        assert_eq!(
            issues,
            vec![GraphIssue::DanglingTarget {
                phase: "proposal_review".into(),
                action: "lost".into(),
                target: "nowhere".into(),
            }]
        );
    }

    #[test]
    fn test_registry_lookup() {
        let registry = WorkflowRegistry::from_definitions([graph().definition().clone()]).unwrap();
        assert!(registry.get("two_stages").is_ok());
        assert_eq!(
            registry.get("three_stages").unwrap_err(),
            TransitionError::UnknownWorkflow("three_stages".into())
        );
    }
}
