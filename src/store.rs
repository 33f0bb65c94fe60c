//! Submission Persistence
//!
//! Writes are compare-and-swap on `lock_version`: a commit names the version
//! it read and fails with [`StoreError::Conflict`] if anyone else committed
//! in between.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::state::Submission;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("submission not found: {0}")]
    NotFound(Uuid),

    #[error("submission {id} was modified concurrently (expected version {expected}, found {found})")]
    Conflict { id: Uuid, expected: u64, found: u64 },

    #[error("submission already exists: {0}")]
    AlreadyExists(Uuid),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Persistence for submissions
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn insert(&self, submission: &Submission) -> Result<(), StoreError>;

    async fn load(&self, id: Uuid) -> Result<Submission, StoreError>;

    /// Write `submission` if the stored version is still `expected`.
    /// Returns the new version.
    async fn commit(&self, submission: &Submission, expected: u64) -> Result<u64, StoreError>;

    async fn list_by_status(&self, workflow: &str, status: &str) -> Result<Vec<Submission>, StoreError>;
}

/// In-memory store for tests and single-process use
#[derive(Default, Clone)]
pub struct MemorySubmissionStore {
    submissions: Arc<RwLock<HashMap<Uuid, Submission>>>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn insert(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut submissions = self.submissions.write().await;
        if submissions.contains_key(&submission.id) {
            return Err(StoreError::AlreadyExists(submission.id));
        }
        submissions.insert(submission.id, submission.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Submission, StoreError> {
        let submissions = self.submissions.read().await;
        submissions.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn commit(&self, submission: &Submission, expected: u64) -> Result<u64, StoreError> {
        let mut submissions = self.submissions.write().await;
        let stored = submissions
            .get_mut(&submission.id)
            .ok_or(StoreError::NotFound(submission.id))?;

        if stored.lock_version != expected {
            return Err(StoreError::Conflict {
                id: submission.id,
                expected,
                found: stored.lock_version,
            });
        }

        let mut next = submission.clone();
        next.lock_version = expected + 1;
        *stored = next;
        Ok(expected + 1)
    }

    async fn list_by_status(&self, workflow: &str, status: &str) -> Result<Vec<Submission>, StoreError> {
        let submissions = self.submissions.read().await;
        let mut matching: Vec<Submission> = submissions
            .values()
            .filter(|s| s.workflow == workflow && s.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.created_at);
        Ok(matching)
    }
}
