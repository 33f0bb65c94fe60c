//! Decoded answers for one submitted record.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::blob_store::FileHandle;
use crate::outcome::{Outcome, Recommendation};

/// Persisted answers: field key to encoded JSON value
pub type PersistedAnswers = BTreeMap<String, serde_json::Value>;

/// A decoded answer; the variant follows the field kind's shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Answer {
    Text(String),
    Number(Option<Decimal>),
    Bool(bool),
    Choices(Vec<String>),
    Date(Option<NaiveDate>),
    Time(Option<NaiveTime>),
    DateTime(Option<NaiveDateTime>),
    Files(Vec<FileAnswer>),
    Inputs(Vec<String>),
    Address(BTreeMap<String, String>),
    Score { comment: String, score: Option<u8> },
    Recommendation(Option<Recommendation>),
    Determination(Option<Outcome>),
    /// Legacy kinds and values that failed to decode
    Raw(serde_json::Value),
}

impl Answer {
    /// True when the answer carries nothing a required check would accept
    pub fn is_blank(&self) -> bool {
        match self {
            Answer::Text(s) => s.trim().is_empty(),
            Answer::Number(n) => n.is_none(),
            Answer::Bool(b) => !b,
            Answer::Choices(c) => c.is_empty(),
            Answer::Date(d) => d.is_none(),
            Answer::Time(t) => t.is_none(),
            Answer::DateTime(dt) => dt.is_none(),
            Answer::Files(f) => f.is_empty(),
            Answer::Inputs(values) => values.iter().all(|v| v.trim().is_empty()),
            Answer::Address(lines) => lines.values().all(|v| v.trim().is_empty()),
            Answer::Score { comment, score } => comment.trim().is_empty() && score.is_none(),
            Answer::Recommendation(r) => r.is_none(),
            Answer::Determination(o) => o.is_none(),
            Answer::Raw(v) => v.is_null(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Answer::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// A file answer: either already stored, or an upload awaiting storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FileAnswer {
    Stored(FileHandle),
    Upload(Upload),
}

impl FileAnswer {
    pub fn name(&self) -> &str {
        match self {
            FileAnswer::Stored(handle) => &handle.name,
            FileAnswer::Upload(upload) => &upload.name,
        }
    }
}

/// Raw bytes of a newly submitted file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub name: String,
    pub content: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// Field id to decoded answer for one record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerStore {
    answers: BTreeMap<String, Answer>,
}

impl AnswerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field_id: &str) -> Option<&Answer> {
        self.answers.get(field_id)
    }

    pub fn insert(&mut self, field_id: impl Into<String>, answer: Answer) -> Option<Answer> {
        self.answers.insert(field_id.into(), answer)
    }

    pub fn with(mut self, field_id: impl Into<String>, answer: Answer) -> Self {
        self.insert(field_id, answer);
        self
    }

    pub fn text(&self, field_id: &str) -> Option<&str> {
        self.get(field_id).and_then(Answer::as_text)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Answer)> {
        self.answers.iter()
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

impl FromIterator<(String, Answer)> for AnswerStore {
    fn from_iter<T: IntoIterator<Item = (String, Answer)>>(iter: T) -> Self {
        Self {
            answers: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blankness_follows_sentinels() {
        assert!(Answer::Text("   ".into()).is_blank());
        assert!(!Answer::Text("x".into()).is_blank());
        assert!(Answer::Bool(false).is_blank());
        assert!(Answer::Inputs(vec![String::new(), " ".into()]).is_blank());
        assert!(!Answer::Inputs(vec![String::new(), "b".into()]).is_blank());
        assert!(!Answer::Score {
            comment: String::new(),
            score: Some(0)
        }
        .is_blank());
    }

    #[test]
    fn store_accessors() {
        let store = AnswerStore::new()
            .with("title", Answer::Text("Mesh radios".into()))
            .with("agree", Answer::Bool(true));
        assert_eq!(store.text("title"), Some("Mesh radios"));
        assert_eq!(store.text("agree"), None);
        assert_eq!(store.len(), 2);
    }
}
