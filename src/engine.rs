//! Transition Executor
//!
//! Applies resolved transitions to persisted submissions. Every change is a
//! load, mutate, compare-and-swap commit cycle retried a bounded number of
//! times under contention. Side effects run only after a successful commit
//! and never roll it back. Progression rules are evaluated after each commit
//! and their actions are applied as the system actor, up to a configured
//! chain length.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::blob_store::FileStore;
use crate::config::EngineConfig;
use crate::error::{EngineError, TransitionError};
use crate::graph::{PhaseGraph, WorkflowRegistry};
use crate::outcome::{Outcome, OutcomeTable};
use crate::progression::TriggerEvent;
use crate::resolver::{Actor, Authorizer, PermissionAuthorizer, TransitionResolver};
use crate::schema::{encode_with_files, AnswerStore, FieldSchema, FormKind, PersistedAnswers};
use crate::side_effects::{NotificationKind, SideEffectFailure, SideEffects};
use crate::state::{Submission, TransitionRecord};
use crate::store::{StoreError, SubmissionStore};

/// Result of applying one action
#[derive(Debug, Clone)]
pub struct AppliedTransition {
    /// State after the action and any follow-on transitions
    pub submission: Submission,
    pub record: TransitionRecord,
    /// Automatic transitions chained after `record`
    pub follow_on: Vec<TransitionRecord>,
    pub side_effect_failures: Vec<SideEffectFailure>,
}

/// Result of recording a review event
#[derive(Debug, Clone)]
pub struct ReviewRecorded {
    pub submission: Submission,
    /// Automatic transitions triggered by the event
    pub transitions: Vec<TransitionRecord>,
    pub side_effect_failures: Vec<SideEffectFailure>,
}

/// Summary of a submission's position in its workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionStatus {
    pub submission_id: Uuid,
    pub workflow: String,
    pub stage: String,
    pub phase: String,
    pub display_name: String,
    pub public_name: String,
    pub is_terminal: bool,
    pub available_actions: Vec<AvailableAction>,
    pub future_phases: Vec<String>,
    pub transitions: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableAction {
    pub name: String,
    pub label: String,
}

/// A committed change together with the graph it was resolved against
struct Committed<T> {
    submission: Submission,
    graph: Arc<PhaseGraph>,
    value: T,
}

/// Apply `action` to an in-memory submission.
///
/// Fails without touching `submission` when the action does not resolve.
pub fn apply_to(
    graph: &PhaseGraph,
    authorizer: &dyn Authorizer,
    submission: &mut Submission,
    action: &str,
    actor: &Actor,
) -> Result<TransitionRecord, TransitionError> {
    let resolution = TransitionResolver::new(graph, authorizer).resolve(submission, action, actor)?;
    Ok(submission.record_transition(
        resolution.to_phase,
        resolution.action,
        actor.id.clone(),
        actor.system,
    ))
}

pub struct TransitionExecutor {
    registry: Arc<WorkflowRegistry>,
    store: Arc<dyn SubmissionStore>,
    authorizer: Arc<dyn Authorizer>,
    outcomes: OutcomeTable,
    side_effects: SideEffects,
    config: EngineConfig,
}

impl TransitionExecutor {
    pub fn new(registry: Arc<WorkflowRegistry>, store: Arc<dyn SubmissionStore>) -> Self {
        Self {
            registry,
            store,
            authorizer: Arc::new(PermissionAuthorizer),
            outcomes: OutcomeTable::standard(),
            side_effects: SideEffects::default(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_outcomes(mut self, outcomes: OutcomeTable) -> Self {
        self.outcomes = outcomes;
        self
    }

    pub fn with_side_effects(mut self, side_effects: SideEffects) -> Self {
        self.side_effects = side_effects;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn outcomes(&self) -> &OutcomeTable {
        &self.outcomes
    }

    /// Create a submission in the workflow's initial phase.
    pub async fn start(
        &self,
        workflow: &str,
        schema: FieldSchema,
        answers: PersistedAnswers,
        created_by: &Actor,
    ) -> Result<Submission, EngineError> {
        let graph = self.registry.get(workflow)?;
        schema.validate_schema(FormKind::Application)?;

        let initial = graph.phase_def(graph.initial_phase()).name.clone();
        let submission = Submission::new(graph.name(), initial, schema, answers, created_by.id.clone());
        self.store.insert(&submission).await?;
        info!(
            submission_id = %submission.id,
            workflow = %submission.workflow,
            status = %submission.status,
            created_by = %created_by.id,
            "Submission created"
        );

        let (submission, _, failures) = self.follow_on(submission, TriggerEvent::PhaseEntered).await;
        for failure in &failures {
            warn!(submission_id = %submission.id, effect = failure.effect, "Side effect failed after start: {}", failure.message);
        }
        Ok(submission)
    }

    /// Current phase, available actions and reachable phases
    pub async fn status(&self, id: Uuid, actor: &Actor) -> Result<SubmissionStatus, EngineError> {
        let submission = self.store.load(id).await?;
        let graph = self.registry.get(&submission.workflow)?;
        let resolver = TransitionResolver::new(&graph, self.authorizer.as_ref());
        let available_actions = resolver
            .available_actions(&submission, actor)?
            .into_iter()
            .map(|a| AvailableAction {
                name: a.name.clone(),
                label: a.label.clone(),
            })
            .collect();

        let current = graph.require_phase(&submission.status)?;
        let phase = graph.phase_def(current);
        Ok(SubmissionStatus {
            submission_id: submission.id,
            workflow: submission.workflow.clone(),
            stage: graph.stage_def(current).name.clone(),
            phase: phase.name.clone(),
            display_name: phase.display_name().to_string(),
            public_name: phase.public_name().to_string(),
            is_terminal: graph.is_terminal(current),
            available_actions,
            future_phases: graph
                .future_phases(current)
                .into_iter()
                .map(|p| graph.phase_def(p).name.clone())
                .collect(),
            transitions: submission.history.len(),
        })
    }

    /// Apply `action` on behalf of `actor`.
    pub async fn apply(&self, id: Uuid, action: &str, actor: &Actor) -> Result<AppliedTransition, EngineError> {
        let committed = self
            .mutate(id, |graph, submission| {
                apply_to(graph, self.authorizer.as_ref(), submission, action, actor)
                    .map_err(EngineError::from)
            })
            .await?;
        let record = committed.value;

        info!(
            submission_id = %id,
            from = %record.from_phase,
            to = %record.to_phase,
            action = %record.action,
            actor = %actor.id,
            "Transition applied"
        );

        let mut failures = self
            .run_side_effects(&committed.graph, &committed.submission, actor, &record)
            .await;
        let (submission, follow_on, follow_on_failures) = self
            .follow_on(committed.submission, TriggerEvent::PhaseEntered)
            .await;
        failures.extend(follow_on_failures);

        Ok(AppliedTransition {
            submission,
            record,
            follow_on,
            side_effect_failures: failures,
        })
    }

    /// Apply whichever action of the current phase stands for `outcome`.
    pub async fn apply_outcome(
        &self,
        id: Uuid,
        outcome: Outcome,
        actor: &Actor,
    ) -> Result<AppliedTransition, EngineError> {
        let submission = self.store.load(id).await?;
        let graph = self.registry.get(&submission.workflow)?;
        let action = self.outcomes.action_for_submission(&graph, &submission, outcome)?;
        debug!(submission_id = %id, outcome = %outcome, action = %action, "Mapped outcome to action");
        self.apply(id, &action, actor).await
    }

    /// Apply `outcome` to each submission independently. One failure does not
    /// stop the batch.
    pub async fn apply_outcome_batch(
        &self,
        ids: &[Uuid],
        outcome: Outcome,
        actor: &Actor,
    ) -> Vec<(Uuid, Result<AppliedTransition, EngineError>)> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let result = self.apply_outcome(*id, outcome, actor).await;
            if let Err(e) = &result {
                debug!(submission_id = %id, outcome = %outcome, "Batch item failed: {}", e);
            }
            results.push((*id, result));
        }
        let applied = results.iter().filter(|(_, r)| r.is_ok()).count();
        info!(outcome = %outcome, total = ids.len(), applied, "Batch determination finished");
        results
    }

    /// Batch determination from selected action names, which must all share
    /// one outcome.
    pub async fn apply_determination_batch<S: AsRef<str>>(
        &self,
        ids: &[Uuid],
        selected_actions: &[S],
        actor: &Actor,
    ) -> Result<Vec<(Uuid, Result<AppliedTransition, EngineError>)>, EngineError> {
        let outcome = self.outcomes.outcome_for_actions(selected_actions)?;
        Ok(self.apply_outcome_batch(ids, outcome, actor).await)
    }

    /// Record a review event and apply any progression it triggers.
    pub async fn record_review(&self, id: Uuid, event: TriggerEvent) -> Result<ReviewRecorded, EngineError> {
        let system = Actor::system();
        let committed = self
            .mutate(id, |graph, submission| {
                submission.reviews.apply(event);
                let record = match graph.rules().evaluate(graph, submission, event) {
                    Some(action) => Some(apply_to(
                        graph,
                        self.authorizer.as_ref(),
                        submission,
                        &action,
                        &system,
                    )?),
                    None => None,
                };
                Ok(record)
            })
            .await?;

        let mut transitions = Vec::new();
        let mut failures = Vec::new();
        let mut submission = committed.submission;
        if let Some(record) = committed.value {
            info!(
                submission_id = %id,
                from = %record.from_phase,
                to = %record.to_phase,
                action = %record.action,
                "Review event triggered automatic transition"
            );
            failures.extend(
                self.run_side_effects(&committed.graph, &submission, &system, &record)
                    .await,
            );
            transitions.push(record);

            let (next, follow_on, follow_on_failures) =
                self.follow_on(submission, TriggerEvent::PhaseEntered).await;
            submission = next;
            transitions.extend(follow_on);
            failures.extend(follow_on_failures);
        }

        Ok(ReviewRecorded {
            submission,
            transitions,
            side_effect_failures: failures,
        })
    }

    /// Replace a submission's persisted answers. Returns the new revision id,
    /// or `None` when nothing changed.
    pub async fn revise_answers(
        &self,
        id: Uuid,
        answers: PersistedAnswers,
        author: &Actor,
    ) -> Result<Option<Uuid>, EngineError> {
        let committed = self
            .mutate_if(
                id,
                |_, submission| Ok(submission.revise_answers(answers.clone(), author.id.clone())),
                Option::is_some,
            )
            .await?;
        if let Some(revision) = committed.value {
            info!(submission_id = %id, revision = %revision, author = %author.id, "Answers revised");
        }
        Ok(committed.value)
    }

    /// Encode decoded answers, storing new uploads, then revise.
    pub async fn revise_with_files(
        &self,
        id: Uuid,
        answers: &AnswerStore,
        files: &dyn FileStore,
        author: &Actor,
    ) -> Result<Option<Uuid>, EngineError> {
        let submission = self.store.load(id).await?;
        let persisted = encode_with_files(
            &submission.schema,
            answers,
            Some(&submission.answers),
            files,
            &submission.id.to_string(),
        )
        .await?;
        self.revise_answers(id, persisted, author).await
    }

    /// Load, change and commit with optimistic retries.
    async fn mutate<T>(
        &self,
        id: Uuid,
        change: impl FnMut(&PhaseGraph, &mut Submission) -> Result<T, EngineError>,
    ) -> Result<Committed<T>, EngineError> {
        self.mutate_if(id, change, |_| true).await
    }

    /// Like [`Self::mutate`], but skips the commit when `should_commit`
    /// rejects the change's result.
    async fn mutate_if<T>(
        &self,
        id: Uuid,
        mut change: impl FnMut(&PhaseGraph, &mut Submission) -> Result<T, EngineError>,
        should_commit: impl Fn(&T) -> bool,
    ) -> Result<Committed<T>, EngineError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut submission = self.store.load(id).await?;
            let graph = self.registry.get(&submission.workflow)?;
            let expected = submission.lock_version;

            let value = change(&graph, &mut submission)?;
            if !should_commit(&value) {
                return Ok(Committed {
                    submission,
                    graph,
                    value,
                });
            }

            match self.store.commit(&submission, expected).await {
                Ok(version) => {
                    submission.lock_version = version;
                    return Ok(Committed {
                        submission,
                        graph,
                        value,
                    });
                }
                Err(StoreError::Conflict { found, .. }) if attempts < self.config.commit_retries => {
                    debug!(submission_id = %id, expected, found, attempts, "Commit conflict, retrying");
                }
                Err(StoreError::Conflict { .. }) => {
                    warn!(submission_id = %id, attempts, "Commit contention exhausted");
                    return Err(EngineError::ContentionExhausted {
                        submission_id: id,
                        attempts,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Notify, and create the downstream entity on final approval.
    async fn run_side_effects(
        &self,
        graph: &PhaseGraph,
        submission: &Submission,
        actor: &Actor,
        record: &TransitionRecord,
    ) -> Vec<SideEffectFailure> {
        let mut failures = Vec::new();
        let kind = if record.automatic {
            NotificationKind::AutomaticTransition
        } else {
            NotificationKind::Transition
        };
        if let Err(e) = self
            .side_effects
            .notifier
            .notify(kind, submission, actor, None)
            .await
        {
            warn!(submission_id = %submission.id, "Notification failed: {}", e);
            failures.push(SideEffectFailure::new("notify", &e));
        }

        let Some(to) = graph.phase(&record.to_phase) else {
            return failures;
        };
        let approved = graph.phase_def(to).outcome == Some(Outcome::Approved)
            && graph.is_terminal(to)
            && graph.is_last_stage(to);
        let Some(factory) = self.side_effects.downstream.as_ref().filter(|_| approved) else {
            return failures;
        };

        match factory.create_from(submission, &submission.decoded_answers()).await {
            Ok(related) => {
                info!(submission_id = %submission.id, related = %related, "Downstream entity created");
                if let Err(e) = self
                    .side_effects
                    .notifier
                    .notify(NotificationKind::ProjectCreated, submission, actor, Some(&related))
                    .await
                {
                    warn!(submission_id = %submission.id, "Notification failed: {}", e);
                    failures.push(SideEffectFailure::new("notify", &e));
                }
            }
            Err(e) => {
                warn!(submission_id = %submission.id, "Downstream creation failed: {}", e);
                failures.push(SideEffectFailure::new("downstream", &e));
            }
        }
        failures
    }

    /// Apply progression rules as the system actor until none fires or the
    /// chain limit is reached.
    async fn follow_on(
        &self,
        submission: Submission,
        event: TriggerEvent,
    ) -> (Submission, Vec<TransitionRecord>, Vec<SideEffectFailure>) {
        let system = Actor::system();
        let mut current = submission;
        let mut chain = Vec::new();
        let mut failures = Vec::new();
        let limit = self.config.max_follow_on as usize;

        loop {
            if chain.len() >= limit {
                if limit > 0 {
                    warn!(submission_id = %current.id, limit, "Automatic transition chain limit reached");
                }
                break;
            }

            let result = self
                .mutate_if(
                    current.id,
                    |graph, submission| match graph.rules().evaluate(graph, submission, event) {
                        Some(action) => Ok(Some(apply_to(
                            graph,
                            self.authorizer.as_ref(),
                            submission,
                            &action,
                            &system,
                        )?)),
                        None => Ok(None),
                    },
                    Option::is_some,
                )
                .await;

            match result {
                Ok(Committed {
                    submission,
                    graph,
                    value: Some(record),
                }) => {
                    info!(
                        submission_id = %submission.id,
                        from = %record.from_phase,
                        to = %record.to_phase,
                        action = %record.action,
                        "Automatic transition applied"
                    );
                    failures.extend(self.run_side_effects(&graph, &submission, &system, &record).await);
                    chain.push(record);
                    current = submission;
                }
                Ok(Committed { submission, .. }) => {
                    current = submission;
                    break;
                }
                Err(e) => {
                    if e.is_configuration_error() {
                        error!(alert = true, submission_id = %current.id, "Automatic transition failed: {}", e);
                    } else {
                        warn!(submission_id = %current.id, "Automatic transition failed: {}", e);
                    }
                    failures.push(SideEffectFailure {
                        effect: "follow_on",
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        (current, chain, failures)
    }
}
