//! Grant Workflow
//!
//! Application progression engine for grant submissions. A workflow is an
//! ordered list of stages, each stage an ordered list of phases, each phase a
//! set of named actions. Submissions carry a snapshot of the form schema they
//! were created with and move between phases through permission-gated
//! actions, outcome mapping and automatic progression rules.
//!
//! Collaborators (persistence, authorization, notification, file storage and
//! downstream record creation) are traits; the crate ships in-memory and
//! local implementations, plus a Postgres store behind the `database` feature.

pub mod blob_store;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod graph;
pub mod outcome;
pub mod progression;
pub mod resolver;
pub mod schema;
pub mod side_effects;
pub mod state;
pub mod store;

#[cfg(feature = "database")]
pub mod repository;

pub use blob_store::{FileHandle, FileStore, FileStoreError, InMemoryFileStore, LocalFileStore};
pub use config::EngineConfig;
pub use definition::{ActionDef, ActionTarget, PhaseDef, StageDef, WorkflowDefinition, WorkflowLoader};
pub use engine::{apply_to, AppliedTransition, AvailableAction, ReviewRecorded, SubmissionStatus, TransitionExecutor};
pub use error::{DefinitionError, EngineError, MappingError, TransitionError};
pub use graph::{GraphIssue, PhaseGraph, PhaseRef, WorkflowRegistry};
pub use outcome::{Outcome, OutcomeTable, Recommendation};
pub use progression::{
    ProgressionRule, ProgressionRules, RuleCondition, RuleTarget, TriggerEvent, TriggerKind,
};
pub use resolver::{Actor, Authorizer, PermissionAuthorizer, Resolution, TransitionResolver, SYSTEM_ACTOR};
pub use schema::{
    Answer, AnswerStore, CodecError, FieldDefinition, FieldError, FieldKind, FieldProblem, FieldSchema,
    FileAnswer, FormKind, PersistedAnswers, RenderedAnswer, SchemaError, Upload,
};
pub use side_effects::{
    DownstreamFactory, LogNotifier, NotificationKind, Notifier, SideEffectError, SideEffectFailure,
    SideEffects,
};
pub use state::{AnswerRevision, ReviewTally, Submission, TransitionHistory, TransitionRecord};
pub use store::{MemorySubmissionStore, StoreError, SubmissionStore};
