//! Field kinds and their value shapes.
//!
//! The set of kinds is closed. Each kind maps to a [`Shape`], and the codec,
//! validator and renderer match on the shape rather than on individual kinds.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::answer::Answer;

/// The kind of a form field together with its kind-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    // ─────────────────────────────────────────────────────────────────────────────
    // Generic inputs
    // ─────────────────────────────────────────────────────────────────────────────
    ShortText {
        #[serde(default)]
        max_length: Option<usize>,
    },
    LongText {
        #[serde(default)]
        word_limit: Option<usize>,
    },
    RichText {
        #[serde(default)]
        word_limit: Option<usize>,
    },
    Number {
        #[serde(default)]
        min: Option<Decimal>,
        #[serde(default)]
        max: Option<Decimal>,
    },
    Boolean,
    SingleChoice {
        choices: Vec<String>,
    },
    MultiChoice {
        choices: Vec<String>,
    },
    Date,
    Time,
    DateTime,
    File,
    MultiFile,
    /// Two-choice toggle; the first choice reveals `group`, the second hides it
    GroupToggle {
        choices: Vec<String>,
        #[serde(default)]
        group: Vec<String>,
    },
    /// Up to `count` short answers stored under `{id}_0 .. {id}_{count-1}`
    MultiInput {
        count: usize,
    },
    Category {
        options: Vec<String>,
        #[serde(default)]
        multi: bool,
    },

    // ─────────────────────────────────────────────────────────────────────────────
    // Must-include application fields
    // ─────────────────────────────────────────────────────────────────────────────
    Title,
    Email,
    FullName,
    Address,
    Value,
    Duration,
    OrganizationName,

    // ─────────────────────────────────────────────────────────────────────────────
    // Review fields
    // ─────────────────────────────────────────────────────────────────────────────
    Score,
    Recommendation,
    RecommendationComments,
    Visibility,

    // ─────────────────────────────────────────────────────────────────────────────
    // Determination fields
    // ─────────────────────────────────────────────────────────────────────────────
    Determination,
    DeterminationMessage,

    /// Retired or unrecognised block type; answers pass through untouched
    #[serde(other)]
    Legacy,
}

/// How a kind's answer is represented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Text,
    Number,
    Bool,
    Choice,
    Choices,
    Date,
    Time,
    DateTime,
    File,
    Files,
    Inputs(usize),
    Address,
    Score,
    Recommendation,
    Determination,
    Raw,
}

/// Visibility choices for review fields
pub const VISIBILITY_CHOICES: [&str; 2] = ["private", "reviewers"];

/// Highest score a reviewer can give
pub const MAX_SCORE: u8 = 5;

impl FieldKind {
    /// Stable name, matching the serialized `type` tag
    pub fn name(&self) -> &'static str {
        match self {
            Self::ShortText { .. } => "short_text",
            Self::LongText { .. } => "long_text",
            Self::RichText { .. } => "rich_text",
            Self::Number { .. } => "number",
            Self::Boolean => "boolean",
            Self::SingleChoice { .. } => "single_choice",
            Self::MultiChoice { .. } => "multi_choice",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "date_time",
            Self::File => "file",
            Self::MultiFile => "multi_file",
            Self::GroupToggle { .. } => "group_toggle",
            Self::MultiInput { .. } => "multi_input",
            Self::Category { .. } => "category",
            Self::Title => "title",
            Self::Email => "email",
            Self::FullName => "full_name",
            Self::Address => "address",
            Self::Value => "value",
            Self::Duration => "duration",
            Self::OrganizationName => "organization_name",
            Self::Score => "score",
            Self::Recommendation => "recommendation",
            Self::RecommendationComments => "recommendation_comments",
            Self::Visibility => "visibility",
            Self::Determination => "determination",
            Self::DeterminationMessage => "determination_message",
            Self::Legacy => "legacy",
        }
    }

    pub fn shape(&self) -> Shape {
        match self {
            Self::ShortText { .. }
            | Self::LongText { .. }
            | Self::RichText { .. }
            | Self::Title
            | Self::Email
            | Self::FullName
            | Self::OrganizationName
            | Self::RecommendationComments
            | Self::DeterminationMessage => Shape::Text,
            Self::Number { .. } | Self::Value | Self::Duration => Shape::Number,
            Self::Boolean => Shape::Bool,
            Self::SingleChoice { .. } | Self::GroupToggle { .. } | Self::Visibility => Shape::Choice,
            Self::MultiChoice { .. } => Shape::Choices,
            Self::Category { multi: true, .. } => Shape::Choices,
            Self::Category { multi: false, .. } => Shape::Choice,
            Self::Date => Shape::Date,
            Self::Time => Shape::Time,
            Self::DateTime => Shape::DateTime,
            Self::File => Shape::File,
            Self::MultiFile => Shape::Files,
            Self::MultiInput { count } => Shape::Inputs(*count),
            Self::Address => Shape::Address,
            Self::Score => Shape::Score,
            Self::Recommendation => Shape::Recommendation,
            Self::Determination => Shape::Determination,
            Self::Legacy => Shape::Raw,
        }
    }

    /// The allowed values for choice-shaped kinds
    pub fn choices(&self) -> Option<Vec<&str>> {
        match self {
            Self::SingleChoice { choices }
            | Self::MultiChoice { choices }
            | Self::GroupToggle { choices, .. } => Some(choices.iter().map(String::as_str).collect()),
            Self::Category { options, .. } => Some(options.iter().map(String::as_str).collect()),
            Self::Visibility => Some(VISIBILITY_CHOICES.to_vec()),
            _ => None,
        }
    }

    pub fn word_limit(&self) -> Option<usize> {
        match self {
            Self::LongText { word_limit } | Self::RichText { word_limit } => *word_limit,
            _ => None,
        }
    }

    /// True for kinds that may appear at most once in any form
    pub fn is_must_include(&self) -> bool {
        matches!(
            self,
            Self::Title
                | Self::Email
                | Self::FullName
                | Self::Address
                | Self::Value
                | Self::Duration
                | Self::OrganizationName
                | Self::Recommendation
                | Self::RecommendationComments
                | Self::Visibility
                | Self::Determination
                | Self::DeterminationMessage
        )
    }
}

impl Shape {
    /// The "no answer" value for this shape
    pub fn sentinel(&self) -> Answer {
        match self {
            Shape::Text | Shape::Choice => Answer::Text(String::new()),
            Shape::Number => Answer::Number(None),
            Shape::Bool => Answer::Bool(false),
            Shape::Choices => Answer::Choices(Vec::new()),
            Shape::Date => Answer::Date(None),
            Shape::Time => Answer::Time(None),
            Shape::DateTime => Answer::DateTime(None),
            Shape::File | Shape::Files => Answer::Files(Vec::new()),
            Shape::Inputs(_) => Answer::Inputs(Vec::new()),
            Shape::Address => Answer::Address(Default::default()),
            Shape::Score => Answer::Score {
                comment: String::new(),
                score: None,
            },
            Shape::Recommendation => Answer::Recommendation(None),
            Shape::Determination => Answer::Determination(None),
            Shape::Raw => Answer::Raw(serde_json::Value::Null),
        }
    }

    /// Whether `answer` has the variant this shape decodes to
    pub fn accepts(&self, answer: &Answer) -> bool {
        matches!(
            (self, answer),
            (Shape::Text | Shape::Choice, Answer::Text(_))
                | (Shape::Number, Answer::Number(_))
                | (Shape::Bool, Answer::Bool(_))
                | (Shape::Choices, Answer::Choices(_))
                | (Shape::Date, Answer::Date(_))
                | (Shape::Time, Answer::Time(_))
                | (Shape::DateTime, Answer::DateTime(_))
                | (Shape::File | Shape::Files, Answer::Files(_))
                | (Shape::Inputs(_), Answer::Inputs(_))
                | (Shape::Address, Answer::Address(_))
                | (Shape::Score, Answer::Score { .. })
                | (Shape::Recommendation, Answer::Recommendation(_))
                | (Shape::Determination, Answer::Determination(_))
                | (Shape::Raw, Answer::Raw(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_parse_from_tagged_yaml() {
        let kind: FieldKind = serde_yaml::from_str("type: multi_input\ncount: 3\n").unwrap();
        assert_eq!(kind, FieldKind::MultiInput { count: 3 });
        assert_eq!(kind.shape(), Shape::Inputs(3));

        let kind: FieldKind = serde_yaml::from_str("type: long_text\n").unwrap();
        assert_eq!(kind, FieldKind::LongText { word_limit: None });
    }

    #[test]
    fn unknown_kind_becomes_legacy() {
        let kind: FieldKind = serde_yaml::from_str("type: retired_widget\n").unwrap();
        assert_eq!(kind, FieldKind::Legacy);
        assert_eq!(kind.shape(), Shape::Raw);
    }

    #[test]
    fn category_shape_depends_on_multi_flag() {
        let single = FieldKind::Category {
            options: vec!["a".into()],
            multi: false,
        };
        let multi = FieldKind::Category {
            options: vec!["a".into()],
            multi: true,
        };
        assert_eq!(single.shape(), Shape::Choice);
        assert_eq!(multi.shape(), Shape::Choices);
    }

    #[test]
    fn sentinel_is_accepted_by_its_shape() {
        for shape in [
            Shape::Text,
            Shape::Number,
            Shape::Bool,
            Shape::Choices,
            Shape::Files,
            Shape::Inputs(2),
            Shape::Score,
            Shape::Determination,
            Shape::Raw,
        ] {
            assert!(shape.accepts(&shape.sentinel()), "{shape:?}");
        }
    }
}
