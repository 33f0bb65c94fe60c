//! Submission State Types
//!
//! A submission is one application moving through a workflow. It keeps the
//! form schema it was created with, its persisted answers and an append-only
//! record of every transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::progression::TriggerEvent;
use crate::schema::{decode, AnswerStore, FieldSchema, PersistedAnswers};

/// An application moving through a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    /// Workflow definition name (e.g. "single_stage")
    pub workflow: String,
    /// Current phase name
    pub status: String,

    /// Schema snapshot taken at creation
    pub schema: FieldSchema,
    pub schema_fingerprint: String,
    pub answers: PersistedAnswers,
    #[serde(default)]
    pub revisions: Vec<AnswerRevision>,

    #[serde(default)]
    pub reviews: ReviewTally,
    #[serde(default)]
    pub history: TransitionHistory,

    /// Optimistic concurrency token, bumped by every commit
    #[serde(default)]
    pub lock_version: u64,

    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Submission {
    pub fn new(
        workflow: impl Into<String>,
        initial_phase: impl Into<String>,
        schema: FieldSchema,
        answers: PersistedAnswers,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let created_by = created_by.into();
        let schema_fingerprint = schema.fingerprint();
        Self {
            id: Uuid::new_v4(),
            workflow: workflow.into(),
            status: initial_phase.into(),
            revisions: vec![AnswerRevision::new(answers.clone(), created_by.clone(), now)],
            schema,
            schema_fingerprint,
            answers,
            reviews: ReviewTally::default(),
            history: TransitionHistory::default(),
            lock_version: 0,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `to_phase`, appending the record to history
    pub fn record_transition(
        &mut self,
        to_phase: impl Into<String>,
        action: impl Into<String>,
        actor: impl Into<String>,
        automatic: bool,
    ) -> TransitionRecord {
        let to_phase = to_phase.into();
        let from_phase = std::mem::replace(&mut self.status, to_phase.clone());
        let now = Utc::now();

        let record = TransitionRecord {
            from_phase,
            to_phase,
            action: action.into(),
            actor: actor.into(),
            at: now,
            automatic,
        };
        self.history.push(record.clone());
        self.updated_at = now;
        record
    }

    /// Replace the answers, appending a revision. Content-equal answers are a
    /// no-op and return `None`.
    pub fn revise_answers(&mut self, answers: PersistedAnswers, author: impl Into<String>) -> Option<Uuid> {
        if answers == self.answers {
            return None;
        }
        let now = Utc::now();
        let revision = AnswerRevision::new(answers.clone(), author.into(), now);
        let id = revision.id;
        self.revisions.push(revision);
        self.answers = answers;
        self.updated_at = now;
        Some(id)
    }

    /// Answers decoded against the submission's own schema snapshot
    pub fn decoded_answers(&self) -> AnswerStore {
        decode(&self.schema, &self.answers)
    }
}

/// One saved generation of a submission's answers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRevision {
    pub id: Uuid,
    pub answers: PersistedAnswers,
    pub author: String,
    pub created_at: DateTime<Utc>,
}

impl AnswerRevision {
    fn new(answers: PersistedAnswers, author: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            answers,
            author,
            created_at,
        }
    }
}

/// Review counts feeding progression rules
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewTally {
    pub submitted: u32,
    pub drafts: u32,
}

impl ReviewTally {
    pub fn apply(&mut self, event: TriggerEvent) {
        match event {
            TriggerEvent::ReviewCreated { draft: true } => self.drafts += 1,
            TriggerEvent::ReviewCreated { draft: false } => self.submitted += 1,
            TriggerEvent::ReviewSubmitted => {
                self.drafts = self.drafts.saturating_sub(1);
                self.submitted += 1;
            }
            TriggerEvent::PhaseEntered => {}
        }
    }

    pub fn total(&self) -> u32 {
        self.submitted + self.drafts
    }
}

/// Record of a phase transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from_phase: String,
    pub to_phase: String,
    pub action: String,
    /// Actor id, or "system" for automatic transitions
    pub actor: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub automatic: bool,
}

/// Append-only transition log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionHistory(Vec<TransitionRecord>);

impl TransitionHistory {
    pub(crate) fn push(&mut self, record: TransitionRecord) {
        self.0.push(record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &TransitionRecord> {
        self.0.iter()
    }

    pub fn last(&self) -> Option<&TransitionRecord> {
        self.0.last()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
