//! Transition Resolution
//!
//! Decides whether an actor may perform an action from a submission's current
//! phase and where the action leads. Resolution reads only the graph, the
//! submission and the authorizer; it never mutates anything.

use std::collections::BTreeSet;
use tracing::{debug, error};

use crate::definition::ActionDef;
use crate::error::TransitionError;
use crate::graph::{PhaseGraph, PhaseRef};
use crate::state::Submission;

/// Id of the actor used for automatic transitions
pub const SYSTEM_ACTOR: &str = "system";

/// Someone (or something) performing an action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub permissions: BTreeSet<String>,
    /// Automatic progression; bypasses permission checks
    pub system: bool,
}

impl Actor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            permissions: BTreeSet::new(),
            system: false,
        }
    }

    pub fn system() -> Self {
        Self {
            id: SYSTEM_ACTOR.to_string(),
            permissions: BTreeSet::new(),
            system: true,
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    pub fn has(&self, permission: &str) -> bool {
        self.permissions.contains(permission)
    }
}

/// Permission check for an action on a submission
pub trait Authorizer: Send + Sync {
    fn can_perform(&self, actor: &Actor, action: &ActionDef, submission: &Submission) -> bool;
}

/// Grants an action when the actor holds its permission string
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissionAuthorizer;

impl Authorizer for PermissionAuthorizer {
    fn can_perform(&self, actor: &Actor, action: &ActionDef, _submission: &Submission) -> bool {
        if actor.system {
            return true;
        }
        match &action.permission {
            None => true,
            Some(permission) => actor.has(permission),
        }
    }
}

/// A legal transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub from: PhaseRef,
    pub to: PhaseRef,
    pub from_phase: String,
    pub to_phase: String,
    pub action: String,
}

pub struct TransitionResolver<'a> {
    graph: &'a PhaseGraph,
    authorizer: &'a dyn Authorizer,
}

impl<'a> TransitionResolver<'a> {
    pub fn new(graph: &'a PhaseGraph, authorizer: &'a dyn Authorizer) -> Self {
        Self { graph, authorizer }
    }

    /// Resolve `action` from the submission's current phase.
    pub fn resolve(
        &self,
        submission: &Submission,
        action: &str,
        actor: &Actor,
    ) -> Result<Resolution, TransitionError> {
        self.resolve_from(&submission.status, submission, action, actor)
            .inspect_err(|e| log_failure(e, submission, actor))
    }

    fn resolve_from(
        &self,
        phase: &str,
        submission: &Submission,
        action: &str,
        actor: &Actor,
    ) -> Result<Resolution, TransitionError> {
        let from = self.graph.require_phase(phase)?;
        let action_def = self
            .graph
            .action(from, action)
            .ok_or_else(|| TransitionError::ActionNotOffered {
                phase: phase.to_string(),
                action: action.to_string(),
            })?;

        if !self.authorizer.can_perform(actor, action_def, submission) {
            return Err(TransitionError::PermissionDenied {
                phase: phase.to_string(),
                action: action.to_string(),
                actor: actor.id.clone(),
            });
        }

        let to = action_def.target.resolve_target(self.graph, from, action)?;
        Ok(Resolution {
            from,
            to,
            from_phase: phase.to_string(),
            to_phase: self.graph.phase_def(to).name.clone(),
            action: action.to_string(),
        })
    }

    /// Actions the actor may take from the submission's current phase
    pub fn available_actions(
        &self,
        submission: &Submission,
        actor: &Actor,
    ) -> Result<Vec<&'a ActionDef>, TransitionError> {
        let current = self
            .graph
            .require_phase(&submission.status)
            .inspect_err(|e| log_failure(e, submission, actor))?;
        Ok(self
            .graph
            .phase_def(current)
            .actions
            .iter()
            .filter(|a| self.authorizer.can_perform(actor, a, submission))
            .collect())
    }
}

fn log_failure(err: &TransitionError, submission: &Submission, actor: &Actor) {
    if err.is_configuration_error() {
        error!(
            alert = true,
            code = err.code(),
            submission_id = %submission.id,
            workflow = %submission.workflow,
            status = %submission.status,
            "Workflow configuration error: {}",
            err
        );
    } else {
        debug!(
            code = err.code(),
            submission_id = %submission.id,
            actor = %actor.id,
            "Transition refused: {}",
            err
        );
    }
}
