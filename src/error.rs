//! Error taxonomy for the progression engine.
//!
//! Configuration errors (`UnknownPhase`, `DanglingTarget`, `UnknownWorkflow`)
//! are operator problems and are logged as alerts. The remaining transition
//! and mapping errors are expected conditions shown to the user.

use thiserror::Error;
use uuid::Uuid;

use crate::outcome::Outcome;
use crate::schema::{CodecError, SchemaError};
use crate::store::StoreError;

/// Failure to resolve an action against a phase graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("unknown workflow: {0}")]
    UnknownWorkflow(String),

    #[error("phase '{phase}' does not exist in workflow '{workflow}'")]
    UnknownPhase { workflow: String, phase: String },

    #[error("action '{action}' on phase '{phase}' targets missing phase '{target}' in workflow '{workflow}'")]
    DanglingTarget {
        workflow: String,
        phase: String,
        action: String,
        target: String,
    },

    #[error("action '{action}' is not offered by phase '{phase}'")]
    ActionNotOffered { phase: String, action: String },

    #[error("actor '{actor}' may not perform '{action}' on phase '{phase}'")]
    PermissionDenied {
        phase: String,
        action: String,
        actor: String,
    },

    #[error("no phase follows '{phase}' (action '{action}'): workflow is complete")]
    NoNextPhase { phase: String, action: String },
}

impl TransitionError {
    /// True for broken workflow configuration rather than user input.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownWorkflow(_) | Self::UnknownPhase { .. } | Self::DanglingTarget { .. }
        )
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownWorkflow(_) => "unknown_workflow",
            Self::UnknownPhase { .. } => "unknown_phase",
            Self::DanglingTarget { .. } => "dangling_target",
            Self::ActionNotOffered { .. } => "action_not_offered",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::NoNextPhase { .. } => "no_next_phase",
        }
    }
}

/// Failure to map between outcomes and action names
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("no available action applies outcome '{outcome}' from this phase")]
    NoMatchingTransition { outcome: Outcome },

    #[error("outcome '{outcome}' matches several actions: {}", .candidates.join(", "))]
    AmbiguousTransition {
        outcome: Outcome,
        candidates: Vec<String>,
    },

    #[error("selected actions do not share one outcome: {}", .actions.join(", "))]
    MixedOutcomes { actions: Vec<String> },

    #[error("action '{0}' has no outcome mapping")]
    UnmappedAction(String),

    #[error("no actions given")]
    EmptyBatch,
}

/// Failure to load or index a workflow definition
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("workflow '{0}' has no phases")]
    EmptyWorkflow(String),

    #[error("phase '{phase}' is defined more than once in workflow '{workflow}'")]
    DuplicatePhase { workflow: String, phase: String },

    #[error("workflow '{0}' is registered more than once")]
    DuplicateWorkflow(String),
}

/// Error returned by the transition executor
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("submission {submission_id} kept changing underneath {attempts} commit attempts")]
    ContentionExhausted { submission_id: Uuid, attempts: u32 },
}

impl EngineError {
    pub fn is_configuration_error(&self) -> bool {
        match self {
            Self::Transition(e) => e.is_configuration_error(),
            Self::Schema(_) => true,
            _ => false,
        }
    }
}
