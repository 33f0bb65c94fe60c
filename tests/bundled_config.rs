use std::path::PathBuf;

use grant_workflow::{OutcomeTable, WorkflowRegistry};

#[test]
fn bundled_workflows_lint_clean() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/workflows");
    let registry = WorkflowRegistry::load_from_dir(&dir).unwrap();

    let mut names: Vec<&str> = registry.names().collect();
    names.sort();
    assert_eq!(names, vec!["double_stage", "single_stage"]);

    for name in names {
        let graph = registry.get(name).unwrap();
        assert!(graph.validate().is_empty(), "{}: {:?}", name, graph.validate());
    }
}

#[test]
fn every_determination_action_has_an_outcome() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/workflows");
    let registry = WorkflowRegistry::load_from_dir(&dir).unwrap();
    let table = OutcomeTable::standard();

    let graph = registry.get("double_stage").unwrap();
    for phase in ["concept_determination", "proposal_determination"] {
        let phase = graph.phase_def(graph.phase(phase).unwrap());
        for action in &phase.actions {
            assert!(table.outcome_of(&action.name).is_some(), "{}", action.name);
        }
    }
}
