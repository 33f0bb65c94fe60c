//! Post-commit Side Effects
//!
//! Notifications and downstream entity creation run after a transition has
//! been committed. They never roll the transition back: failures are logged
//! and reported to the caller.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::resolver::Actor;
use crate::schema::AnswerStore;
use crate::state::Submission;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Transition,
    AutomaticTransition,
    ProjectCreated,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transition => "transition",
            Self::AutomaticTransition => "automatic_transition",
            Self::ProjectCreated => "project_created",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SideEffectError {
    #[error("notification failed: {0}")]
    Notification(String),

    #[error("downstream creation failed: {0}")]
    Downstream(String),
}

/// Delivers notifications about submission events
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        kind: NotificationKind,
        submission: &Submission,
        actor: &Actor,
        related: Option<&str>,
    ) -> Result<(), SideEffectError>;
}

/// Creates the entity that follows an approved submission (e.g. a project)
#[async_trait]
pub trait DownstreamFactory: Send + Sync {
    /// Returns the new entity's id
    async fn create_from(
        &self,
        submission: &Submission,
        answers: &AnswerStore,
    ) -> Result<String, SideEffectError>;
}

/// Notifier that emits structured tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        kind: NotificationKind,
        submission: &Submission,
        actor: &Actor,
        related: Option<&str>,
    ) -> Result<(), SideEffectError> {
        info!(
            kind = kind.as_str(),
            submission_id = %submission.id,
            workflow = %submission.workflow,
            status = %submission.status,
            actor = %actor.id,
            related = related.unwrap_or_default(),
            "Submission notification"
        );
        Ok(())
    }
}

/// A side effect that failed after commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideEffectFailure {
    pub effect: &'static str,
    pub message: String,
}

impl SideEffectFailure {
    pub fn new(effect: &'static str, err: &SideEffectError) -> Self {
        Self {
            effect,
            message: err.to_string(),
        }
    }
}

/// Collaborators run after a transition is committed
#[derive(Clone)]
pub struct SideEffects {
    pub notifier: Arc<dyn Notifier>,
    pub downstream: Option<Arc<dyn DownstreamFactory>>,
}

impl SideEffects {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            downstream: None,
        }
    }

    pub fn with_downstream(mut self, factory: Arc<dyn DownstreamFactory>) -> Self {
        self.downstream = Some(factory);
        self
    }
}

impl Default for SideEffects {
    fn default() -> Self {
        Self::new(Arc::new(LogNotifier))
    }
}
