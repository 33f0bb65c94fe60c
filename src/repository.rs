//! Postgres Submission Store
//!
//! Submissions live in one table; schema snapshot, answers, revisions, review
//! tally and history are JSONB columns. Commits are conditional updates on
//! `lock_version`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::state::Submission;
use crate::store::{StoreError, SubmissionStore};

/// DDL for the submissions table
pub const MIGRATION: &str = r#"
CREATE TABLE IF NOT EXISTS grant_submissions (
    id UUID PRIMARY KEY,
    workflow TEXT NOT NULL,
    status TEXT NOT NULL,
    schema_snapshot JSONB NOT NULL,
    schema_fingerprint TEXT NOT NULL,
    answers JSONB NOT NULL,
    revisions JSONB NOT NULL DEFAULT '[]',
    reviews JSONB NOT NULL DEFAULT '{}',
    history JSONB NOT NULL DEFAULT '[]',
    lock_version BIGINT NOT NULL DEFAULT 0,
    created_by TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS grant_submissions_status_idx
    ON grant_submissions (workflow, status);
"#;

pub struct PgSubmissionStore {
    pool: PgPool,
}

impl PgSubmissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(MIGRATION).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SubmissionStore for PgSubmissionStore {
    async fn insert(&self, submission: &Submission) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO grant_submissions
            (id, workflow, status, schema_snapshot, schema_fingerprint, answers,
             revisions, reviews, history, lock_version, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(submission.id)
        .bind(&submission.workflow)
        .bind(&submission.status)
        .bind(serde_json::to_value(&submission.schema)?)
        .bind(&submission.schema_fingerprint)
        .bind(serde_json::to_value(&submission.answers)?)
        .bind(serde_json::to_value(&submission.revisions)?)
        .bind(serde_json::to_value(submission.reviews)?)
        .bind(serde_json::to_value(&submission.history)?)
        .bind(submission.lock_version as i64)
        .bind(&submission.created_by)
        .bind(submission.created_at)
        .bind(submission.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AlreadyExists(submission.id));
        }
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Submission, StoreError> {
        let row = sqlx::query_as::<_, SubmissionRow>(
            r#"
            SELECT id, workflow, status, schema_snapshot, schema_fingerprint, answers,
                   revisions, reviews, history, lock_version, created_by, created_at, updated_at
            FROM grant_submissions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))?;

        row.try_into()
    }

    async fn commit(&self, submission: &Submission, expected: u64) -> Result<u64, StoreError> {
        let updated: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE grant_submissions SET
                status = $3,
                answers = $4,
                revisions = $5,
                reviews = $6,
                history = $7,
                updated_at = $8,
                lock_version = lock_version + 1
            WHERE id = $1 AND lock_version = $2
            RETURNING lock_version
            "#,
        )
        .bind(submission.id)
        .bind(expected as i64)
        .bind(&submission.status)
        .bind(serde_json::to_value(&submission.answers)?)
        .bind(serde_json::to_value(&submission.revisions)?)
        .bind(serde_json::to_value(submission.reviews)?)
        .bind(serde_json::to_value(&submission.history)?)
        .bind(submission.updated_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = updated {
            return Ok(version as u64);
        }

        let found: Option<i64> =
            sqlx::query_scalar("SELECT lock_version FROM grant_submissions WHERE id = $1")
                .bind(submission.id)
                .fetch_optional(&self.pool)
                .await?;
        match found {
            Some(found) => Err(StoreError::Conflict {
                id: submission.id,
                expected,
                found: found as u64,
            }),
            None => Err(StoreError::NotFound(submission.id)),
        }
    }

    async fn list_by_status(&self, workflow: &str, status: &str) -> Result<Vec<Submission>, StoreError> {
        let rows = sqlx::query_as::<_, SubmissionRow>(
            r#"
            SELECT id, workflow, status, schema_snapshot, schema_fingerprint, answers,
                   revisions, reviews, history, lock_version, created_by, created_at, updated_at
            FROM grant_submissions
            WHERE workflow = $1 AND status = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(workflow)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

/// Database row for a submission
#[derive(Debug, sqlx::FromRow)]
struct SubmissionRow {
    id: Uuid,
    workflow: String,
    status: String,
    schema_snapshot: serde_json::Value,
    schema_fingerprint: String,
    answers: serde_json::Value,
    revisions: serde_json::Value,
    reviews: serde_json::Value,
    history: serde_json::Value,
    lock_version: i64,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = StoreError;

    fn try_from(row: SubmissionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            workflow: row.workflow,
            status: row.status,
            schema: serde_json::from_value(row.schema_snapshot)?,
            schema_fingerprint: row.schema_fingerprint,
            answers: serde_json::from_value(row.answers)?,
            revisions: serde_json::from_value(row.revisions)?,
            reviews: serde_json::from_value(row.reviews)?,
            history: serde_json::from_value(row.history)?,
            lock_version: row.lock_version as u64,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
