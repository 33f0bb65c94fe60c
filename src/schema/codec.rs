//! Answer Codec
//!
//! Converts between the persisted map (field key to JSON value) and decoded
//! [`AnswerStore`]s. Decoding is total: a missing key yields the kind's
//! sentinel, a value of the wrong shape is kept verbatim as [`Answer::Raw`].

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

use super::answer::{Answer, AnswerStore, FileAnswer, PersistedAnswers};
use super::kind::Shape;
use super::{FieldDefinition, FieldSchema};
use crate::blob_store::{FileHandle, FileStore, FileStoreError};
use crate::outcome::{Outcome, Recommendation};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Errors raised while encoding answers
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("field '{field}' expects a {expected} answer")]
    ShapeMismatch { field: String, expected: &'static str },

    #[error("field '{field}' holds an upload that has not been stored")]
    UnsavedUpload { field: String },

    #[error("field '{field}' references file '{reference}' that was not stored for this submission")]
    UnknownFileReference { field: String, reference: String },

    #[error("failed to store upload for field '{field}': {source}")]
    FileStore {
        field: String,
        #[source]
        source: FileStoreError,
    },
}

/// Key under which the `index`-th sub-answer of a multi-input field is stored
pub fn input_key(field_id: &str, index: usize) -> String {
    format!("{}_{}", field_id, index)
}

/// Decode every field of `schema` from `persisted`.
pub fn decode(schema: &FieldSchema, persisted: &PersistedAnswers) -> AnswerStore {
    schema
        .iter()
        .map(|field| (field.id.clone(), decode_field(field, persisted)))
        .collect()
}

fn decode_field(field: &FieldDefinition, persisted: &PersistedAnswers) -> Answer {
    let shape = field.kind.shape();

    if let Shape::Inputs(count) = shape {
        return decode_inputs(&field.id, count, persisted);
    }

    let Some(value) = persisted.get(&field.id) else {
        return shape.sentinel();
    };

    match decode_value(shape, value) {
        Some(answer) => answer,
        None => {
            warn!(
                field = %field.id,
                kind = field.kind.name(),
                "Persisted value does not match field kind, keeping raw value"
            );
            Answer::Raw(value.clone())
        }
    }
}

fn decode_inputs(field_id: &str, count: usize, persisted: &PersistedAnswers) -> Answer {
    let values: Vec<Option<&Value>> = (0..count)
        .map(|i| persisted.get(&input_key(field_id, i)))
        .collect();
    let Some(last_present) = values.iter().rposition(Option::is_some) else {
        return Answer::Inputs(Vec::new());
    };

    let inputs = values[..=last_present]
        .iter()
        .map(|value| match value {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        })
        .collect();
    Answer::Inputs(inputs)
}

fn decode_value(shape: Shape, value: &Value) -> Option<Answer> {
    let answer = match shape {
        Shape::Text | Shape::Choice => match value {
            Value::String(s) => Answer::Text(s.clone()),
            Value::Null => Answer::Text(String::new()),
            _ => return None,
        },
        Shape::Number => match value {
            Value::Null => Answer::Number(None),
            Value::String(s) if s.trim().is_empty() => Answer::Number(None),
            Value::String(s) => Answer::Number(Some(Decimal::from_str(s.trim()).ok()?)),
            Value::Number(n) => Answer::Number(Some(Decimal::from_str(&n.to_string()).ok()?)),
            _ => return None,
        },
        Shape::Bool => match value {
            Value::Bool(b) => Answer::Bool(*b),
            Value::Null => Answer::Bool(false),
            _ => return None,
        },
        Shape::Choices => match value {
            Value::Array(items) => Answer::Choices(string_list(items)?),
            Value::String(s) if s.is_empty() => Answer::Choices(Vec::new()),
            Value::String(s) => Answer::Choices(vec![s.clone()]),
            Value::Null => Answer::Choices(Vec::new()),
            _ => return None,
        },
        Shape::Date => Answer::Date(parse_optional(value, |s| {
            NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
        })?),
        Shape::Time => Answer::Time(parse_optional(value, |s| {
            NaiveTime::parse_from_str(s, TIME_FORMAT).ok()
        })?),
        Shape::DateTime => Answer::DateTime(parse_optional(value, |s| {
            NaiveDateTime::parse_from_str(s, DATE_TIME_FORMAT).ok()
        })?),
        Shape::File => match value {
            Value::Null => Answer::Files(Vec::new()),
            Value::Object(_) => Answer::Files(vec![FileAnswer::Stored(file_handle(value)?)]),
            _ => return None,
        },
        Shape::Files => match value {
            Value::Null => Answer::Files(Vec::new()),
            Value::Array(items) => Answer::Files(
                items
                    .iter()
                    .map(|item| file_handle(item).map(FileAnswer::Stored))
                    .collect::<Option<Vec<_>>>()?,
            ),
            _ => return None,
        },
        Shape::Address => match value {
            Value::Null => Answer::Address(BTreeMap::new()),
            Value::Object(lines) => Answer::Address(
                lines
                    .iter()
                    .map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect::<Option<BTreeMap<_, _>>>()?,
            ),
            _ => return None,
        },
        Shape::Score => match value {
            Value::Null => Shape::Score.sentinel(),
            Value::Array(pair) if pair.len() == 2 => {
                let comment = pair[0].as_str()?.to_string();
                let score = match &pair[1] {
                    Value::Null => None,
                    other => Some(u8::try_from(other.as_u64()?).ok()?),
                };
                Answer::Score { comment, score }
            }
            _ => return None,
        },
        Shape::Recommendation => match value {
            Value::Null => Answer::Recommendation(None),
            other => Answer::Recommendation(Some(Recommendation::from_code(other.as_u64()?)?)),
        },
        Shape::Determination => match value {
            Value::Null => Answer::Determination(None),
            other => Answer::Determination(Some(Outcome::from_code(other.as_u64()?)?)),
        },
        Shape::Inputs(_) | Shape::Raw => Answer::Raw(value.clone()),
    };
    Some(answer)
}

fn string_list(items: &[Value]) -> Option<Vec<String>> {
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

/// `Some(None)` for null/empty, `Some(Some(v))` when parsed, `None` when malformed
fn parse_optional<T>(value: &Value, parse: impl Fn(&str) -> Option<T>) -> Option<Option<T>> {
    match value {
        Value::Null => Some(None),
        Value::String(s) if s.is_empty() => Some(None),
        Value::String(s) => parse(s).map(Some),
        _ => None,
    }
}

fn file_handle(value: &Value) -> Option<FileHandle> {
    serde_json::from_value(value.clone()).ok()
}

/// Encode answers whose files are all already stored.
pub fn encode_stored(schema: &FieldSchema, answers: &AnswerStore) -> Result<PersistedAnswers, CodecError> {
    let mut persisted = PersistedAnswers::new();
    for field in schema.iter() {
        let shape = field.kind.shape();
        let sentinel;
        let answer = match answers.get(&field.id) {
            Some(answer) => answer,
            None => {
                sentinel = shape.sentinel();
                &sentinel
            }
        };
        encode_field(field, shape, answer, &mut persisted)?;
    }
    Ok(persisted)
}

fn encode_field(
    field: &FieldDefinition,
    shape: Shape,
    answer: &Answer,
    out: &mut PersistedAnswers,
) -> Result<(), CodecError> {
    if let Answer::Raw(value) = answer {
        if !matches!(shape, Shape::Inputs(_)) {
            out.insert(field.id.clone(), value.clone());
            return Ok(());
        }
    }
    if !shape.accepts(answer) {
        return Err(CodecError::ShapeMismatch {
            field: field.id.clone(),
            expected: shape_name(shape),
        });
    }

    let value = match (shape, answer) {
        (Shape::Inputs(count), Answer::Inputs(values)) => {
            for (i, value) in values.iter().take(count).enumerate() {
                out.insert(input_key(&field.id, i), Value::String(value.clone()));
            }
            return Ok(());
        }
        (_, Answer::Text(s)) => Value::String(s.clone()),
        (_, Answer::Number(n)) => n.map(|d| Value::String(d.to_string())).unwrap_or(Value::Null),
        (_, Answer::Bool(b)) => Value::Bool(*b),
        (_, Answer::Choices(c)) => json!(c),
        (_, Answer::Date(d)) => optional_string(d.map(|d| d.format(DATE_FORMAT).to_string())),
        (_, Answer::Time(t)) => optional_string(t.map(|t| t.format(TIME_FORMAT).to_string())),
        (_, Answer::DateTime(dt)) => {
            optional_string(dt.map(|dt| dt.format(DATE_TIME_FORMAT).to_string()))
        }
        (shape, Answer::Files(files)) => {
            let handles = files
                .iter()
                .map(|file| match file {
                    FileAnswer::Stored(handle) => Ok(json!(handle)),
                    FileAnswer::Upload(_) => Err(CodecError::UnsavedUpload {
                        field: field.id.clone(),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?;
            if shape == Shape::File {
                handles.into_iter().next().unwrap_or(Value::Null)
            } else {
                Value::Array(handles)
            }
        }
        (_, Answer::Address(lines)) => json!(lines),
        (_, Answer::Score { comment, score }) => json!([comment, score]),
        (_, Answer::Recommendation(r)) => r.map(|r| json!(r.code())).unwrap_or(Value::Null),
        (_, Answer::Determination(o)) => o.map(|o| json!(o.code())).unwrap_or(Value::Null),
        (_, Answer::Inputs(_)) | (_, Answer::Raw(_)) => Value::Null,
    };
    out.insert(field.id.clone(), value);
    Ok(())
}

fn optional_string(value: Option<String>) -> Value {
    value.map(Value::String).unwrap_or(Value::Null)
}

fn shape_name(shape: Shape) -> &'static str {
    match shape {
        Shape::Text | Shape::Choice => "text",
        Shape::Number => "number",
        Shape::Bool => "boolean",
        Shape::Choices => "choice list",
        Shape::Date => "date",
        Shape::Time => "time",
        Shape::DateTime => "date-time",
        Shape::File | Shape::Files => "file",
        Shape::Inputs(_) => "multi-input",
        Shape::Address => "address",
        Shape::Score => "score",
        Shape::Recommendation => "recommendation",
        Shape::Determination => "determination",
        Shape::Raw => "raw",
    }
}

/// Encode answers, storing new uploads through `files`.
///
/// Stored references must come from `previous` for the same field and keep
/// their previously stored metadata. Previous references missing from the
/// submission are dropped. Each upload is saved under its own key,
/// `{key_prefix}/{field_id}/{upload_id}/{file_name}`, so earlier blobs are
/// never overwritten.
pub async fn encode_with_files(
    schema: &FieldSchema,
    answers: &AnswerStore,
    previous: Option<&PersistedAnswers>,
    files: &dyn FileStore,
    key_prefix: &str,
) -> Result<PersistedAnswers, CodecError> {
    let previous_answers = previous.map(|p| decode(schema, p)).unwrap_or_default();
    let mut resolved = answers.clone();

    for field in schema.iter() {
        if !matches!(field.kind.shape(), Shape::File | Shape::Files) {
            continue;
        }
        let Some(Answer::Files(submitted)) = answers.get(&field.id) else {
            continue;
        };

        let known: HashMap<&str, &FileHandle> = match previous_answers.get(&field.id) {
            Some(Answer::Files(prev)) => prev
                .iter()
                .filter_map(|f| match f {
                    FileAnswer::Stored(handle) => Some((handle.reference.as_str(), handle)),
                    FileAnswer::Upload(_) => None,
                })
                .collect(),
            _ => HashMap::new(),
        };

        let mut kept = Vec::with_capacity(submitted.len());
        let mut retained = HashSet::new();
        for file in submitted {
            match file {
                FileAnswer::Stored(handle) => {
                    let Some(stored) = known.get(handle.reference.as_str()) else {
                        warn!(field = %field.id, reference = %handle.reference, "Rejecting file reference not stored for this submission");
                        return Err(CodecError::UnknownFileReference {
                            field: field.id.clone(),
                            reference: handle.reference.clone(),
                        });
                    };
                    retained.insert(handle.reference.as_str());
                    kept.push(FileAnswer::Stored((*stored).clone()));
                }
                FileAnswer::Upload(upload) => {
                    let key = format!("{}/{}/{}/{}", key_prefix, field.id, Uuid::new_v4(), upload.name);
                    let handle = files.save(&upload.content, &key).await.map_err(|source| {
                        CodecError::FileStore {
                            field: field.id.clone(),
                            source,
                        }
                    })?;
                    debug!(field = %field.id, reference = %handle.reference, size = handle.size, "Stored upload");
                    kept.push(FileAnswer::Stored(handle));
                }
            }
        }

        let dropped = known.keys().filter(|r| !retained.contains(*r)).count();
        if dropped > 0 {
            debug!(field = %field.id, dropped, "Dropped files removed from submission");
        }
        resolved.insert(field.id.clone(), Answer::Files(kept));
    }

    encode_stored(schema, &resolved)
}
