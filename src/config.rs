//! Engine configuration.
//!
//! Reads tunables from env vars:
//!   GRANT_WORKFLOW_DIR           : workflow YAML directory (default: config/workflows)
//!   GRANT_WORKFLOW_COMMIT_RETRIES: commit attempts under contention (default: 3)
//!   GRANT_WORKFLOW_MAX_FOLLOW_ON : automatic transitions chained per action (default: 8)
//!   GRANT_WORKFLOW_FILE_ROOT     : local file store root (default: data/files)

use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub workflow_dir: PathBuf,
    pub commit_retries: u32,
    pub max_follow_on: u32,
    pub file_root: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workflow_dir: PathBuf::from("config/workflows"),
            commit_retries: 3,
            max_follow_on: 8,
            file_root: PathBuf::from("data/files"),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unparseable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            workflow_dir: lookup("GRANT_WORKFLOW_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.workflow_dir),
            commit_retries: parse_or("GRANT_WORKFLOW_COMMIT_RETRIES", &lookup, defaults.commit_retries)
                .max(1),
            max_follow_on: parse_or("GRANT_WORKFLOW_MAX_FOLLOW_ON", &lookup, defaults.max_follow_on),
            file_root: lookup("GRANT_WORKFLOW_FILE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.file_root),
        }
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(
    key: &str,
    lookup: &impl Fn(&str) -> Option<String>,
    default: T,
) -> T {
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, default = %default, "Ignoring invalid config value");
            default
        }),
    }
}
