//! The bundled application form: schema checks, conditional fields and
//! file answers on a live submission.

use std::path::PathBuf;
use std::sync::Arc;

use grant_workflow::schema::{render, validate};
use grant_workflow::{
    Actor, Answer, FieldProblem, FieldSchema, FileAnswer, FileStore, FormKind, InMemoryFileStore,
    MemorySubmissionStore, PersistedAnswers, SubmissionStore, TransitionExecutor, Upload,
    WorkflowRegistry,
};
use serde_json::json;

const TOGGLE: &str = "7c1a4d96-partner";
const PARTNER_NAME: &str = "2f5e9b83-partner-name";
const BUDGET: &str = "6e3c7a29-budget";

fn config(path: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config").join(path)
}

fn application_form() -> FieldSchema {
    FieldSchema::load_from_file(&config("forms/application.yaml")).unwrap()
}

fn complete_answers(partner: &str) -> PersistedAnswers {
    [
        ("6b3e2c1a-title", json!("Accessible voting kiosks")),
        ("0f9d7c44-email", json!("team@example.org")),
        ("8a1c5e20-name", json!("Alex Example")),
        ("4c2b9f71-value", json!("25000")),
        ("5d8e6b3c-summary", json!("<p>Build and <em>audit</em> kiosks.</p>")),
        ("9a4d2e17-focus", json!("accessibility")),
        (TOGGLE, json!(partner)),
        ("0a8b5d14-agree", json!(true)),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[test]
fn bundled_form_is_a_valid_application_schema() {
    let form = application_form();
    assert!(form.validate_schema(FormKind::Application).is_ok());
    assert!(form.validate_schema(FormKind::Review).is_err());
}

#[test]
fn hidden_group_members_are_not_required() {
    let form = application_form();
    assert!(validate(&form, &complete_answers("No")).is_empty());

    let errors = validate(&form, &complete_answers("Yes"));
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].field, PARTNER_NAME);
    assert_eq!(errors[0].problem, FieldProblem::Required);

    let mut with_partner = complete_answers("Yes");
    with_partner.insert(PARTNER_NAME.to_string(), json!("Open Hardware Coop"));
    assert!(validate(&form, &with_partner).is_empty());
}

#[test]
fn unanswered_toggle_is_required_and_hides_its_group() {
    let form = application_form();
    let mut answers = complete_answers("No");
    answers.remove(TOGGLE);

    let errors = validate(&form, &answers);
    let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(fields, vec![TOGGLE]);
}

#[test]
fn extra_link_inputs_are_rejected() {
    let form = application_form();
    let mut answers = complete_answers("No");
    for i in 0..4 {
        answers.insert(format!("3b6f8c52-links_{}", i), json!(format!("https://{}.example", i)));
    }

    let errors = validate(&form, &answers);
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].problem,
        FieldProblem::TooManyInputs { max: 3, given: 4 }
    );
}

#[tokio::test]
async fn uploads_are_stored_once_across_revisions() {
    let dir = config("workflows");
    let registry = Arc::new(WorkflowRegistry::load_from_dir(&dir).unwrap());
    let store = Arc::new(MemorySubmissionStore::new());
    let executor = TransitionExecutor::new(registry, store.clone());
    let files = InMemoryFileStore::new();
    let applicant = Actor::new("applicant-1");

    let submission = executor
        .start("single_stage", application_form(), complete_answers("No"), &applicant)
        .await
        .unwrap();

    let mut answers = submission.decoded_answers();
    answers.insert(
        BUDGET,
        Answer::Files(vec![FileAnswer::Upload(Upload::new("budget.csv", b"item,cost\n".to_vec()))]),
    );
    let revision = executor
        .revise_with_files(submission.id, &answers, &files, &applicant)
        .await
        .unwrap();
    assert!(revision.is_some());
    assert_eq!(files.len().await, 1);

    let stored = store.load(submission.id).await.unwrap();
    assert_eq!(stored.revisions.len(), 2);
    let budget = &stored.answers[BUDGET];
    let reference = budget["reference"].as_str().unwrap();
    assert!(reference.starts_with("memory://"));
    assert!(reference.contains("/6e3c7a29-budget/"));
    assert!(reference.ends_with("/budget.csv"));
    assert_eq!(budget["size"], json!(10));
    assert!(files.exists(reference).await.unwrap());

    // Re-saving what was just stored changes nothing
    let unchanged = executor
        .revise_with_files(submission.id, &stored.decoded_answers(), &files, &applicant)
        .await
        .unwrap();
    assert!(unchanged.is_none());
    assert_eq!(files.len().await, 1);

    let rendered = render(&stored.schema, &stored.decoded_answers());
    let budget_line = rendered.iter().find(|r| r.field == BUDGET).unwrap();
    assert_eq!(budget_line.text, "budget.csv");
}
