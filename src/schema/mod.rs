//! Dynamic Form Schema
//!
//! A form is an ordered list of typed field definitions stored as data. The
//! same schema drives decoding of persisted answers, validation of submitted
//! answers and read-only rendering. Submissions keep a copy of the schema
//! they were created with, identified by a content fingerprint.

pub mod answer;
pub mod codec;
pub mod kind;
pub mod render;
pub mod validate;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

pub use answer::{Answer, AnswerStore, FileAnswer, PersistedAnswers, Upload};
pub use codec::{decode, encode_stored, encode_with_files, CodecError};
pub use kind::{FieldKind, Shape};
pub use render::{render, RenderedAnswer};
pub use validate::{validate, FieldError, FieldProblem};

/// One field of a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Opaque identifier, stable across schema edits
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub help_text: String,
    #[serde(default)]
    pub required: bool,
    /// Default in persisted form
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(flatten)]
    pub kind: FieldKind,
}

impl FieldDefinition {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            help_text: String::new(),
            required: false,
            default: None,
            kind,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, value: serde_json::Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help_text = help.into();
        self
    }
}

/// What a form is used for; decides which kinds must appear exactly once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    Application,
    Review,
    Determination,
    Project,
}

impl FormKind {
    /// Kind names that must appear exactly once
    pub fn singleton_kinds(&self) -> &'static [&'static str] {
        match self {
            FormKind::Application => &["title", "email", "full_name"],
            FormKind::Review => &["recommendation", "recommendation_comments", "visibility"],
            FormKind::Determination => &["determination", "determination_message"],
            FormKind::Project => &[],
        }
    }
}

impl std::str::FromStr for FormKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "application" => Ok(Self::Application),
            "review" => Ok(Self::Review),
            "determination" => Ok(Self::Determination),
            "project" => Ok(Self::Project),
            _ => Err(format!("Unknown form kind: {}", s)),
        }
    }
}

/// Problem found in a schema definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaProblem {
    DuplicateId(String),
    MissingSingleton(&'static str),
    DuplicateSingleton { kind: &'static str, count: usize },
    MalformedToggle { field: String, choices: usize },
    UnknownGroupMember { toggle: String, member: String },
    EmptyChoices(String),
    ZeroInputs(String),
}

impl std::fmt::Display for SchemaProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateId(id) => write!(f, "field id '{}' is used more than once", id),
            Self::MissingSingleton(kind) => write!(f, "missing required field: {}", kind),
            Self::DuplicateSingleton { kind, count } => {
                write!(f, "field {} appears {} times, expected once", kind, count)
            }
            Self::MalformedToggle { field, choices } => write!(
                f,
                "group toggle '{}' needs exactly two choices, has {}",
                field, choices
            ),
            Self::UnknownGroupMember { toggle, member } => write!(
                f,
                "group toggle '{}' reveals unknown field '{}'",
                toggle, member
            ),
            Self::EmptyChoices(id) => write!(f, "field '{}' has no choices", id),
            Self::ZeroInputs(id) => write!(f, "multi input '{}' has no inputs", id),
        }
    }
}

/// All problems found in one schema
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid form schema: {}", .problems.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct SchemaError {
    pub problems: Vec<SchemaProblem>,
}

/// A versioned, ordered list of field definitions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(default = "default_version")]
    pub version: u32,
    pub fields: Vec<FieldDefinition>,
}

fn default_version() -> u32 {
    1
}

impl FieldSchema {
    pub fn new(fields: Vec<FieldDefinition>) -> Self {
        Self { version: 1, fields }
    }

    pub fn field(&self, id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter()
    }

    /// SHA-256 over the canonical JSON of the schema
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Check the schema itself, reporting every problem at once.
    pub fn validate_schema(&self, form: FormKind) -> Result<(), SchemaError> {
        let mut problems = Vec::new();

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.id.as_str()) {
                problems.push(SchemaProblem::DuplicateId(field.id.clone()));
            }
        }

        let mut kind_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for field in &self.fields {
            *kind_counts.entry(field.kind.name()).or_default() += 1;
        }

        let singletons = form.singleton_kinds();
        for kind in singletons {
            if !kind_counts.contains_key(kind) {
                problems.push(SchemaProblem::MissingSingleton(kind));
            }
        }
        for field in &self.fields {
            let kind = field.kind.name();
            let count = kind_counts.get(kind).copied().unwrap_or_default();
            let limited = singletons.contains(&kind) || field.kind.is_must_include();
            let already = problems.iter().any(
                |p| matches!(p, SchemaProblem::DuplicateSingleton { kind: k, .. } if *k == kind),
            );
            if limited && count > 1 && !already {
                problems.push(SchemaProblem::DuplicateSingleton { kind, count });
            }
        }

        for field in &self.fields {
            match &field.kind {
                FieldKind::GroupToggle { choices, group } => {
                    if choices.len() != 2 {
                        problems.push(SchemaProblem::MalformedToggle {
                            field: field.id.clone(),
                            choices: choices.len(),
                        });
                    }
                    for member in group {
                        if !seen.contains(member.as_str()) {
                            problems.push(SchemaProblem::UnknownGroupMember {
                                toggle: field.id.clone(),
                                member: member.clone(),
                            });
                        }
                    }
                }
                FieldKind::SingleChoice { choices } | FieldKind::MultiChoice { choices }
                    if choices.is_empty() =>
                {
                    problems.push(SchemaProblem::EmptyChoices(field.id.clone()));
                }
                FieldKind::Category { options, .. } if options.is_empty() => {
                    problems.push(SchemaProblem::EmptyChoices(field.id.clone()));
                }
                FieldKind::MultiInput { count: 0 } => {
                    problems.push(SchemaProblem::ZeroInputs(field.id.clone()));
                }
                _ => {}
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SchemaError { problems })
        }
    }

    /// Answers a fresh record starts with: configured defaults, else sentinels
    pub fn initial_answers(&self) -> AnswerStore {
        let defaults: PersistedAnswers = self
            .fields
            .iter()
            .filter_map(|f| f.default.clone().map(|v| (f.id.clone(), v)))
            .collect();
        decode(self, &defaults)
    }

    pub fn load_from_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, crate::error::DefinitionError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn application_schema() -> FieldSchema {
        FieldSchema::new(vec![
            FieldDefinition::new("f-title", "Project title", FieldKind::Title).required(),
            FieldDefinition::new("f-email", "Email", FieldKind::Email).required(),
            FieldDefinition::new("f-name", "Full name", FieldKind::FullName).required(),
            FieldDefinition::new(
                "f-summary",
                "Summary",
                FieldKind::LongText {
                    word_limit: Some(200),
                },
            ),
        ])
    }

    #[test]
    fn application_schema_is_valid() {
        assert!(application_schema().validate_schema(FormKind::Application).is_ok());
    }

    #[test]
    fn schema_errors_are_combined() {
        let mut schema = application_schema();
        schema.fields.retain(|f| f.id != "f-email");
        schema
            .fields
            .push(FieldDefinition::new("f-title-2", "Title again", FieldKind::Title));
        schema.fields.push(FieldDefinition::new(
            "f-summary",
            "Duplicate id",
            FieldKind::ShortText { max_length: None },
        ));

        let err = schema.validate_schema(FormKind::Application).unwrap_err();
        assert!(err.problems.contains(&SchemaProblem::MissingSingleton("email")));
        assert!(err
            .problems
            .contains(&SchemaProblem::DuplicateSingleton { kind: "title", count: 2 }));
        assert!(err
            .problems
            .contains(&SchemaProblem::DuplicateId("f-summary".into())));
        assert_eq!(err.problems.len(), 3);
    }

    #[test]
    fn review_form_needs_review_singletons() {
        let schema = FieldSchema::new(vec![FieldDefinition::new(
            "rec",
            "Recommendation",
            FieldKind::Recommendation,
        )]);
        let err = schema.validate_schema(FormKind::Review).unwrap_err();
        assert_eq!(
            err.problems,
            vec![
                SchemaProblem::MissingSingleton("recommendation_comments"),
                SchemaProblem::MissingSingleton("visibility"),
            ]
        );
    }

    #[test]
    fn malformed_toggle_is_reported() {
        let schema = FieldSchema::new(vec![FieldDefinition::new(
            "toggle",
            "Partner?",
            FieldKind::GroupToggle {
                choices: vec!["Yes".into()],
                group: vec!["missing".into()],
            },
        )]);
        let err = schema.validate_schema(FormKind::Project).unwrap_err();
        assert_eq!(err.problems.len(), 2);
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let schema = application_schema();
        let mut edited = schema.clone();
        edited.fields[0].label = "Name of the project".into();
        assert_eq!(schema.fingerprint(), application_schema().fingerprint());
        assert_ne!(schema.fingerprint(), edited.fingerprint());
    }

    #[test]
    fn initial_answers_use_defaults() {
        let schema = FieldSchema::new(vec![
            FieldDefinition::new("agree", "Agree", FieldKind::Boolean)
                .with_default(serde_json::json!(true)),
            FieldDefinition::new("note", "Note", FieldKind::ShortText { max_length: None }),
        ]);
        let answers = schema.initial_answers();
        assert_eq!(answers.get("agree"), Some(&Answer::Bool(true)));
        assert_eq!(answers.get("note"), Some(&Answer::Text(String::new())));
    }

    #[test]
    fn schema_parses_from_yaml() {
        let yaml = r#"
version: 2
fields:
  - id: f-title
    label: Title
    type: title
    required: true
  - id: f-links
    label: Links
    type: multi_input
    count: 3
"#;
        let schema = FieldSchema::load_from_str(yaml).unwrap();
        assert_eq!(schema.version, 2);
        assert_eq!(schema.fields[1].kind, FieldKind::MultiInput { count: 3 });
        assert!(schema.fields[0].required);
    }
}
