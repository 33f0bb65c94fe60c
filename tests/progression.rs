//! Automatic progression through the bundled single-stage workflow.

use std::path::PathBuf;
use std::sync::Arc;

use grant_workflow::{
    Actor, FieldDefinition, FieldKind, FieldSchema, MemorySubmissionStore, PersistedAnswers,
    SubmissionStore, TransitionExecutor, TriggerEvent, WorkflowRegistry, SYSTEM_ACTOR,
};
use uuid::Uuid;

fn executor(store: Arc<MemorySubmissionStore>) -> TransitionExecutor {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/workflows");
    let registry = Arc::new(WorkflowRegistry::load_from_dir(&dir).unwrap());
    TransitionExecutor::new(registry, store)
}

async fn submitted(executor: &TransitionExecutor) -> Uuid {
    let schema = FieldSchema::new(vec![
        FieldDefinition::new("title", "Title", FieldKind::Title),
        FieldDefinition::new("email", "Email", FieldKind::Email),
        FieldDefinition::new("name", "Name", FieldKind::FullName),
    ]);
    let applicant = Actor::new("applicant-1");
    let submission = executor
        .start("single_stage", schema, PersistedAnswers::new(), &applicant)
        .await
        .unwrap();
    executor.apply(submission.id, "submit", &applicant).await.unwrap();
    submission.id
}

#[tokio::test]
async fn first_review_opens_internal_review_once() {
    let store = Arc::new(MemorySubmissionStore::new());
    let executor = executor(store.clone());
    let staff = Actor::new("staff-1").with_permission("staff");
    let id = submitted(&executor).await;

    let first = executor
        .record_review(id, TriggerEvent::ReviewCreated { draft: true })
        .await
        .unwrap();
    assert_eq!(first.submission.status, "internal_review");
    assert_eq!(first.transitions.len(), 1);
    assert_eq!(first.transitions[0].actor, SYSTEM_ACTOR);
    assert!(first.transitions[0].automatic);

    // Back to screening through the resubmission loop
    executor.apply(id, "post_review_discussion", &staff).await.unwrap();
    let determiner = Actor::new("chair").with_permission("determine");
    executor.apply(id, "more_info", &determiner).await.unwrap();
    executor
        .apply(id, "submit", &Actor::new("applicant-1"))
        .await
        .unwrap();
    assert_eq!(store.load(id).await.unwrap().status, "in_discussion");

    let second = executor
        .record_review(id, TriggerEvent::ReviewCreated { draft: false })
        .await
        .unwrap();
    assert!(second.transitions.is_empty());
    assert_eq!(second.submission.status, "in_discussion");
    assert_eq!(second.submission.reviews.total(), 2);
}

#[tokio::test]
async fn second_submitted_review_closes_internal_review() {
    let store = Arc::new(MemorySubmissionStore::new());
    let executor = executor(store.clone());
    let id = submitted(&executor).await;

    executor
        .record_review(id, TriggerEvent::ReviewCreated { draft: true })
        .await
        .unwrap();
    executor
        .record_review(id, TriggerEvent::ReviewCreated { draft: true })
        .await
        .unwrap();

    let one = executor
        .record_review(id, TriggerEvent::ReviewSubmitted)
        .await
        .unwrap();
    assert!(one.transitions.is_empty());
    assert_eq!(one.submission.status, "internal_review");

    let two = executor
        .record_review(id, TriggerEvent::ReviewSubmitted)
        .await
        .unwrap();
    assert_eq!(two.transitions.len(), 1);
    assert_eq!(two.transitions[0].action, "post_review_discussion");
    assert_eq!(two.submission.status, "post_review_discussion");

    // Further reviews find no rule for the new phase
    let late = executor
        .record_review(id, TriggerEvent::ReviewCreated { draft: false })
        .await
        .unwrap();
    assert!(late.transitions.is_empty());

    let stored = store.load(id).await.unwrap();
    assert_eq!(stored.status, "post_review_discussion");
    assert_eq!(stored.reviews.submitted, 3);
    assert_eq!(stored.history.len(), 3);
}

#[tokio::test]
async fn review_outside_rule_phases_only_updates_tally() {
    let store = Arc::new(MemorySubmissionStore::new());
    let executor = executor(store.clone());
    let applicant = Actor::new("applicant-1");
    let schema = FieldSchema::new(vec![
        FieldDefinition::new("title", "Title", FieldKind::Title),
        FieldDefinition::new("email", "Email", FieldKind::Email),
        FieldDefinition::new("name", "Name", FieldKind::FullName),
    ]);
    let draft = executor
        .start("single_stage", schema, PersistedAnswers::new(), &applicant)
        .await
        .unwrap();

    let recorded = executor
        .record_review(draft.id, TriggerEvent::ReviewCreated { draft: false })
        .await
        .unwrap();
    assert!(recorded.transitions.is_empty());
    assert_eq!(recorded.submission.status, "draft");
    assert_eq!(recorded.submission.reviews.submitted, 1);
    assert_eq!(recorded.submission.lock_version, 1);
}
