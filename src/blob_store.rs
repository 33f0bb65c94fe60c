//! File Storage
//!
//! Uploaded answer files are written through a [`FileStore`]; answers only
//! keep the returned [`FileHandle`]. A stored handle is never re-uploaded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum FileStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file reference: {0}")]
    InvalidRef(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Reference to a stored file, as persisted inside answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHandle {
    pub name: String,
    pub size: u64,
    /// Store-specific URI (`file://`, `memory://`)
    pub reference: String,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, size: u64, reference: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            reference: reference.into(),
        }
    }
}

/// Storage for answer files
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Store `content` under `key`; the handle's name is the key's last segment
    async fn save(&self, content: &[u8], key: &str) -> Result<FileHandle, FileStoreError>;

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, FileStoreError>;

    async fn delete(&self, reference: &str) -> Result<(), FileStoreError>;

    async fn exists(&self, reference: &str) -> Result<bool, FileStoreError>;
}

fn file_name(key: &str) -> Result<&str, FileStoreError> {
    key.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| FileStoreError::InvalidRef(format!("Key has no file name: {}", key)))
}

/// Local filesystem store rooted at a base directory
pub struct LocalFileStore {
    base_path: PathBuf,
}

impl LocalFileStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn path_for_key(&self, key: &str) -> Result<PathBuf, FileStoreError> {
        let path = self.base_path.join(key);
        if !self.is_within_root(&path) {
            return Err(FileStoreError::InvalidRef(format!(
                "Key escapes the store root: {}",
                key
            )));
        }
        Ok(path)
    }

    /// Extract path from a file:// reference; only paths under the root resolve
    fn path_from_ref(&self, reference: &str) -> Result<PathBuf, FileStoreError> {
        let path = reference
            .strip_prefix("file://")
            .map(PathBuf::from)
            .ok_or_else(|| {
                FileStoreError::InvalidRef(format!("Expected file:// prefix: {}", reference))
            })?;
        if !self.is_within_root(&path) {
            return Err(FileStoreError::InvalidRef(format!(
                "Reference outside the store root: {}",
                reference
            )));
        }
        Ok(path)
    }

    fn is_within_root(&self, path: &Path) -> bool {
        match path.strip_prefix(&self.base_path) {
            Ok(relative) => relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir)),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, content: &[u8], key: &str) -> Result<FileHandle, FileStoreError> {
        let name = file_name(key)?;
        let path = self.path_for_key(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, content).await?;
        Ok(FileHandle::new(
            name,
            content.len() as u64,
            format!("file://{}", path.display()),
        ))
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, FileStoreError> {
        let path = self.path_from_ref(reference)?;

        if !tokio::fs::try_exists(&path).await? {
            return Err(FileStoreError::NotFound(reference.to_string()));
        }

        Ok(tokio::fs::read(path).await?)
    }

    async fn delete(&self, reference: &str) -> Result<(), FileStoreError> {
        let path = self.path_from_ref(reference)?;

        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(path).await?;
        }

        Ok(())
    }

    async fn exists(&self, reference: &str) -> Result<bool, FileStoreError> {
        let path = self.path_from_ref(reference)?;
        Ok(tokio::fs::try_exists(path).await?)
    }
}

/// In-memory store, used by tests and dry runs
#[derive(Default, Clone)]
pub struct InMemoryFileStore {
    files: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.files.read().await.is_empty()
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn save(&self, content: &[u8], key: &str) -> Result<FileHandle, FileStoreError> {
        let name = file_name(key)?;
        let reference = format!("memory://{}", key);
        let mut files = self.files.write().await;
        files.insert(reference.clone(), content.to_vec());
        Ok(FileHandle::new(name, content.len() as u64, reference))
    }

    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, FileStoreError> {
        let files = self.files.read().await;
        files
            .get(reference)
            .cloned()
            .ok_or_else(|| FileStoreError::NotFound(reference.to_string()))
    }

    async fn delete(&self, reference: &str) -> Result<(), FileStoreError> {
        let mut files = self.files.write().await;
        files.remove(reference);
        Ok(())
    }

    async fn exists(&self, reference: &str) -> Result<bool, FileStoreError> {
        let files = self.files.read().await;
        Ok(files.contains_key(reference))
    }
}
