//! Scuttle - a ticket tracker that lives on a git branch.
//!
//! This library provides the core functionality for the `scuttle` CLI tool:
//! tickets, their comments, and named list filters are persisted as an
//! append-only chain of snapshot commits on a dedicated branch, using git
//! plumbing only. The working tree is never touched.

pub mod cli;
pub mod commands;
pub mod models;
pub mod query;
pub mod storage;

/// Test utilities for isolated git repositories.
#[cfg(test)]
pub(crate) mod test_utils {
    use std::path::Path;
    use std::process::Command;
    use tempfile::TempDir;

    /// Create a temporary git repository with a configured identity.
    ///
    /// Commits need `user.name`/`user.email`, so both are set locally.
    pub fn temp_repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "--quiet"]);
        git(dir.path(), &["config", "user.name", "Test User"]);
        git(dir.path(), &["config", "user.email", "test@example.com"]);
        dir
    }

    pub fn git(repo: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo)
            .output()
            .expect("failed to run git");
        assert!(output.status.success(), "git {:?} failed", args);
    }
}

/// Library-level error type for scuttle operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Not initialized: run `scuttle init` first")]
    NotInitialized,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Branch moved: expected tip {expected}, found {actual}")]
    Conflict { expected: String, actual: String },

    #[error("Malformed record {name}: {detail}")]
    MalformedRecord { name: String, detail: String },

    #[error("Invalid filter expression: {0}")]
    InvalidFilter(String),

    #[error("Ticket counter is corrupt: {0}")]
    CorruptCounter(String),

    #[error("Missing git config value: {0}")]
    MissingConfig(String),

    #[error("git error: {0}")]
    Git(String),
}

/// Result type alias for scuttle operations.
pub type Result<T> = std::result::Result<T, Error>;
