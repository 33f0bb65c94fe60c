//! Answer validation
//!
//! Runs over persisted answers and reports every failing field, in schema
//! order. Fields inside a group toggle's group are skipped unless the toggle
//! shows its revealing choice.

use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use super::answer::{Answer, PersistedAnswers};
use super::codec::decode;
use super::kind::{FieldKind, Shape, MAX_SCORE};
use super::{FieldDefinition, FieldSchema};

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid regex"));

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Why a field failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldProblem {
    Required,
    InvalidChoice(String),
    Malformed,
    OutOfRange,
    InvalidEmail,
    WordLimit { limit: usize, words: usize },
    TooLong { max: usize, length: usize },
    TooManyInputs { max: usize, given: usize },
}

impl fmt::Display for FieldProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "This field is required."),
            Self::InvalidChoice(value) => write!(f, "'{}' is not one of the available choices.", value),
            Self::Malformed => write!(f, "Enter a valid value."),
            Self::OutOfRange => write!(f, "Value is out of range."),
            Self::InvalidEmail => write!(f, "Enter a valid email address."),
            Self::WordLimit { limit, words } => {
                write!(f, "Limit is {} words, you have {}.", limit, words)
            }
            Self::TooLong { max, length } => {
                write!(f, "At most {} characters, you have {}.", max, length)
            }
            Self::TooManyInputs { max, given } => {
                write!(f, "At most {} entries, you have {}.", max, given)
            }
        }
    }
}

/// A validation failure attached to one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub label: String,
    pub problem: FieldProblem,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label, self.problem)
    }
}

/// Validate `persisted` against `schema`, returning every field error.
pub fn validate(schema: &FieldSchema, persisted: &PersistedAnswers) -> Vec<FieldError> {
    let answers = decode(schema, persisted);
    let hidden = hidden_fields(schema, &answers);

    schema
        .iter()
        .filter(|field| !hidden.contains(field.id.as_str()))
        .filter_map(|field| {
            let answer = answers.get(&field.id)?;
            check_inputs(field, persisted)
                .or_else(|| check_field(field, answer))
                .map(|problem| FieldError {
                    field: field.id.clone(),
                    label: field.label.clone(),
                    problem,
                })
        })
        .collect()
}

/// Members of every group toggle whose value is not the revealing choice
fn hidden_fields<'a>(schema: &'a FieldSchema, answers: &super::AnswerStore) -> HashSet<&'a str> {
    let mut hidden = HashSet::new();
    for field in schema.iter() {
        if let FieldKind::GroupToggle { choices, group } = &field.kind {
            let revealed = match (choices.first(), answers.text(&field.id)) {
                (Some(first), Some(value)) => first == value,
                _ => false,
            };
            if !revealed {
                hidden.extend(group.iter().map(String::as_str));
            }
        }
    }
    hidden
}

/// Multi-input sub-answers stored past the field's input count
fn check_inputs(field: &FieldDefinition, persisted: &PersistedAnswers) -> Option<FieldProblem> {
    let FieldKind::MultiInput { count } = field.kind else {
        return None;
    };
    let prefix = format!("{}_", field.id);
    let given = persisted
        .keys()
        .filter_map(|key| key.strip_prefix(prefix.as_str())?.parse::<usize>().ok())
        .max()
        .map(|last| last + 1)?;
    (given > count).then_some(FieldProblem::TooManyInputs { max: count, given })
}

fn check_field(field: &FieldDefinition, answer: &Answer) -> Option<FieldProblem> {
    if let Answer::Raw(_) = answer {
        // Legacy kinds are never checked; a kind that failed to decode is malformed
        return (field.kind.shape() != Shape::Raw).then_some(FieldProblem::Malformed);
    }

    if answer.is_blank() {
        // An unanswered score is blank; a zero score is not
        return field.required.then_some(FieldProblem::Required);
    }

    match (&field.kind, answer) {
        (FieldKind::Email, Answer::Text(value)) if !EMAIL_RE.is_match(value.trim()) => {
            Some(FieldProblem::InvalidEmail)
        }
        (FieldKind::ShortText { max_length: Some(max) }, Answer::Text(value)) => {
            let length = value.chars().count();
            (length > *max).then_some(FieldProblem::TooLong { max: *max, length })
        }
        (FieldKind::Number { min, max }, Answer::Number(Some(value))) => {
            let below = min.is_some_and(|min| *value < min);
            let above = max.is_some_and(|max| *value > max);
            (below || above).then_some(FieldProblem::OutOfRange)
        }
        (FieldKind::Score, Answer::Score { score: Some(score), .. }) => {
            (*score > MAX_SCORE).then_some(FieldProblem::OutOfRange)
        }
        (kind, Answer::Text(value)) if kind.shape() == Shape::Choice => {
            let choices = kind.choices().unwrap_or_default();
            (!choices.contains(&value.as_str())).then(|| FieldProblem::InvalidChoice(value.clone()))
        }
        (kind, Answer::Choices(values)) => {
            let choices = kind.choices().unwrap_or_default();
            values
                .iter()
                .find(|v| !choices.contains(&v.as_str()))
                .map(|v| FieldProblem::InvalidChoice(v.clone()))
        }
        (kind, Answer::Text(value)) => {
            let limit = kind.word_limit()?;
            let words = word_count(value);
            (words > limit).then_some(FieldProblem::WordLimit { limit, words })
        }
        _ => None,
    }
}

/// Words in `text` after stripping markup
pub fn word_count(text: &str) -> usize {
    TAG_RE.replace_all(text, " ").split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use serde_json::json;

    fn persisted(pairs: &[(&str, serde_json::Value)]) -> PersistedAnswers {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn partner_schema() -> FieldSchema {
        FieldSchema::new(vec![
            FieldDefinition::new(
                "has-partner",
                "Do you have a partner organisation?",
                FieldKind::GroupToggle {
                    choices: vec!["Yes".into(), "No".into()],
                    group: vec!["partner-name".into()],
                },
            )
            .required(),
            FieldDefinition::new(
                "partner-name",
                "Partner name",
                FieldKind::OrganizationName,
            )
            .required(),
        ])
    }

    #[test]
    fn toggled_off_group_is_not_required() {
        let errors = validate(&partner_schema(), &persisted(&[("has-partner", json!("No"))]));
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn toggled_on_group_is_required() {
        let errors = validate(&partner_schema(), &persisted(&[("has-partner", json!("Yes"))]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "partner-name");
        assert_eq!(errors[0].problem, FieldProblem::Required);
    }

    #[test]
    fn all_failures_are_reported_in_schema_order() {
        let schema = FieldSchema::new(vec![
            FieldDefinition::new("title", "Title", FieldKind::Title).required(),
            FieldDefinition::new("email", "Email", FieldKind::Email).required(),
            FieldDefinition::new(
                "amount",
                "Amount",
                FieldKind::Number {
                    min: Some(Decimal::ZERO),
                    max: Some(Decimal::new(50_000, 0)),
                },
            ),
            FieldDefinition::new(
                "focus",
                "Focus",
                FieldKind::SingleChoice {
                    choices: vec!["privacy".into(), "security".into()],
                },
            ),
        ]);
        let errors = validate(
            &schema,
            &persisted(&[
                ("email", json!("not-an-address")),
                ("amount", json!("75000")),
                ("focus", json!("gardening")),
            ]),
        );
        let problems: Vec<(&str, &FieldProblem)> =
            errors.iter().map(|e| (e.field.as_str(), &e.problem)).collect();
        assert_eq!(
            problems,
            vec![
                ("title", &FieldProblem::Required),
                ("email", &FieldProblem::InvalidEmail),
                ("amount", &FieldProblem::OutOfRange),
                ("focus", &FieldProblem::InvalidChoice("gardening".into())),
            ]
        );
    }

    #[test]
    fn word_limit_ignores_markup() {
        let schema = FieldSchema::new(vec![FieldDefinition::new(
            "summary",
            "Summary",
            FieldKind::RichText {
                word_limit: Some(3),
            },
        )]);
        let ok = validate(&schema, &persisted(&[("summary", json!("<p>one <b>two</b> three</p>"))]));
        assert!(ok.is_empty());

        let errors = validate(&schema, &persisted(&[("summary", json!("<p>one two three four</p>"))]));
        assert_eq!(
            errors[0].problem,
            FieldProblem::WordLimit { limit: 3, words: 4 }
        );
    }

    #[test]
    fn zero_score_is_an_answer() {
        let schema = FieldSchema::new(vec![
            FieldDefinition::new("score", "Score", FieldKind::Score).required(),
        ]);
        assert!(validate(&schema, &persisted(&[("score", json!(["", 0]))])).is_empty());
        assert_eq!(
            validate(&schema, &persisted(&[("score", json!(["", 9]))]))[0].problem,
            FieldProblem::OutOfRange
        );
        assert_eq!(
            validate(&schema, &persisted(&[("score", json!(["", null]))]))[0].problem,
            FieldProblem::Required
        );
    }

    #[test]
    fn undecodable_value_is_malformed_but_legacy_is_ignored() {
        let schema = FieldSchema::new(vec![
            FieldDefinition::new("start", "Start", FieldKind::Date),
            FieldDefinition::new("old", "Old", FieldKind::Legacy).required(),
        ]);
        let errors = validate(&schema, &persisted(&[("start", json!("soon"))]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].problem, FieldProblem::Malformed);
    }

    #[test]
    fn extra_sub_inputs_are_rejected() {
        let schema = FieldSchema::new(vec![FieldDefinition::new(
            "links",
            "Links",
            FieldKind::MultiInput { count: 2 },
        )]);
        let errors = validate(
            &schema,
            &persisted(&[
                ("links_0", json!("a")),
                ("links_1", json!("b")),
                ("links_2", json!("c")),
            ]),
        );
        assert_eq!(
            errors[0].problem,
            FieldProblem::TooManyInputs { max: 2, given: 3 }
        );
    }

    proptest! {
        #[test]
        fn markup_never_adds_words(words in prop::collection::vec("[a-z]{1,8}", 0..20)) {
            let plain = words.join(" ");
            let marked = words
                .iter()
                .map(|w| format!("<em>{}</em>", w))
                .collect::<Vec<_>>()
                .join(" ");
            prop_assert_eq!(word_count(&plain), words.len());
            prop_assert_eq!(word_count(&marked), words.len());
        }
    }
}
