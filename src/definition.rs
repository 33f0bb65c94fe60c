//! Workflow Definition Types and YAML Loading
//!
//! Workflows are defined in YAML files and loaded at startup. A workflow is
//! an ordered list of stages; each stage is an ordered list of phases; each
//! phase offers an ordered list of actions.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::DefinitionError;
use crate::outcome::{Outcome, OutcomeTable};
use crate::progression::ProgressionRule;

/// A complete workflow definition loaded from YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Workflow identifier
    pub workflow: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub description: String,

    /// Stages in order; the first phase of the first stage is the initial phase
    pub stages: Vec<StageDef>,

    /// Automatic progression rules
    #[serde(default)]
    pub rules: Vec<ProgressionRule>,
}

fn default_version() -> u32 {
    1
}

impl WorkflowDefinition {
    /// All phase names in workflow order
    pub fn phase_names(&self) -> impl Iterator<Item = &str> {
        self.stages
            .iter()
            .flat_map(|s| s.phases.iter().map(|p| p.name.as_str()))
    }
}

/// A stage groups the phases that share one application form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDef {
    pub name: String,
    /// Tag of the form generation used in this stage
    #[serde(default)]
    pub form: Option<String>,
    pub phases: Vec<PhaseDef>,
}

/// Phase definition; `name` is what submissions persist as their status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseDef {
    pub name: String,
    #[serde(default)]
    pub display: String,
    /// Name shown to applicants, if different from `display`
    #[serde(default)]
    pub public_name: Option<String>,
    /// Marks phases reached by a determination outcome
    #[serde(default)]
    pub outcome: Option<Outcome>,
    #[serde(default)]
    pub actions: Vec<ActionDef>,
}

impl PhaseDef {
    pub fn display_name(&self) -> &str {
        if self.display.is_empty() {
            &self.name
        } else {
            &self.display
        }
    }

    pub fn public_name(&self) -> &str {
        self.public_name.as_deref().unwrap_or_else(|| self.display_name())
    }

    pub fn action(&self, name: &str) -> Option<&ActionDef> {
        self.actions.iter().find(|a| a.name == name)
    }
}

/// Action offered by a phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDef {
    /// Local to the offering phase
    pub name: String,
    #[serde(default)]
    pub label: String,
    /// Permission the actor must hold; `None` means anyone may act
    #[serde(default)]
    pub permission: Option<String>,
    #[serde(flatten)]
    pub target: ActionTarget,
}

/// Where an action leads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionTarget {
    /// The next phase in the stage, else the first phase of the next stage
    NextPhase,
    /// A named phase anywhere in the workflow
    ChangePhase { target: String },
}

/// Loader for workflow definitions
pub struct WorkflowLoader;

impl WorkflowLoader {
    /// Load all workflow definitions from a directory
    pub fn load_from_dir(dir: &Path) -> Result<HashMap<String, WorkflowDefinition>, DefinitionError> {
        let mut definitions = HashMap::new();

        if !dir.exists() {
            return Ok(definitions);
        }

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();

            if path
                .extension()
                .map(|e| e == "yaml" || e == "yml")
                .unwrap_or(false)
            {
                let def = Self::load_from_file(&path)?;
                if definitions.contains_key(&def.workflow) {
                    return Err(DefinitionError::DuplicateWorkflow(def.workflow));
                }
                tracing::debug!(workflow = %def.workflow, path = %path.display(), "Loaded workflow definition");
                definitions.insert(def.workflow.clone(), def);
            }
        }

        Ok(definitions)
    }

    /// Load a single workflow definition from a file
    pub fn load_from_file(path: &Path) -> Result<WorkflowDefinition, DefinitionError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_from_str(&content)
    }

    /// Load from a YAML string
    pub fn load_from_str(yaml: &str) -> Result<WorkflowDefinition, DefinitionError> {
        let def: WorkflowDefinition = serde_yaml::from_str(yaml)?;
        Ok(def)
    }

    /// Load an action name to outcome table
    pub fn load_outcomes_from_file(path: &Path) -> Result<OutcomeTable, DefinitionError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}
