//! Read-only rendering of decoded answers.

use serde::Serialize;

use super::answer::{Answer, AnswerStore, FileAnswer};
use super::FieldSchema;

/// One field's answer as display text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedAnswer {
    pub field: String,
    pub label: String,
    pub text: String,
}

/// Render every field of `schema` in order. Fields without an answer render
/// as empty text.
pub fn render(schema: &FieldSchema, answers: &AnswerStore) -> Vec<RenderedAnswer> {
    schema
        .iter()
        .map(|field| RenderedAnswer {
            field: field.id.clone(),
            label: field.label.clone(),
            text: answers.get(&field.id).map(render_answer).unwrap_or_default(),
        })
        .collect()
}

fn render_answer(answer: &Answer) -> String {
    match answer {
        Answer::Text(s) => s.clone(),
        Answer::Number(n) => n.map(|d| d.normalize().to_string()).unwrap_or_default(),
        Answer::Bool(true) => "Yes".to_string(),
        Answer::Bool(false) => "No".to_string(),
        Answer::Choices(values) => values.join(", "),
        Answer::Date(d) => d.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default(),
        Answer::Time(t) => t.map(|t| t.format("%H:%M").to_string()).unwrap_or_default(),
        Answer::DateTime(dt) => dt
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default(),
        Answer::Files(files) => files
            .iter()
            .map(FileAnswer::name)
            .collect::<Vec<_>>()
            .join(", "),
        Answer::Inputs(values) => values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Answer::Address(lines) => lines
            .values()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Answer::Score { comment, score } => match score {
            Some(score) if comment.trim().is_empty() => score.to_string(),
            Some(score) => format!("{} ({})", comment, score),
            None => comment.clone(),
        },
        Answer::Recommendation(r) => r.map(|r| r.label().to_string()).unwrap_or_default(),
        Answer::Determination(o) => o.map(|o| o.label().to_string()).unwrap_or_default(),
        Answer::Raw(serde_json::Value::Null) => String::new(),
        Answer::Raw(serde_json::Value::String(s)) => s.clone(),
        Answer::Raw(other) => other.to_string(),
    }
}
