//! Common test utilities for scuttle integration tests.
//!
//! Provides `TestEnv`, a throwaway git repository with a configured
//! identity, plus a `scuttle()` command pre-pointed at it.

#![allow(dead_code)]

use assert_cmd::Command;
use std::process::Command as StdCommand;
pub use tempfile::TempDir;

/// A test environment wrapping one temporary git repository.
pub struct TestEnv {
    pub repo_dir: TempDir,
}

impl TestEnv {
    /// Create a fresh git repository with user.name/user.email configured.
    pub fn new() -> Self {
        let repo_dir = TempDir::new().unwrap();
        git(&repo_dir, &["init", "--quiet"]);
        git(&repo_dir, &["config", "user.name", "Test User"]);
        git(&repo_dir, &["config", "user.email", "test@example.com"]);
        Self { repo_dir }
    }

    /// Create a repository and initialize the ticket store.
    pub fn init() -> Self {
        let env = Self::new();
        env.scuttle().arg("init").assert().success();
        env
    }

    /// Get a Command for the scuttle binary running in this repository.
    pub fn scuttle(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_scuttle"));
        cmd.current_dir(self.repo_dir.path());
        cmd
    }

    /// Get the path to the repository.
    pub fn path(&self) -> &std::path::Path {
        self.repo_dir.path()
    }

    /// Run a git command in the repository, returning stdout.
    pub fn git(&self, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(self.repo_dir.path())
            .output()
            .expect("failed to run git");
        assert!(output.status.success(), "git {:?} failed", args);
        String::from_utf8_lossy(&output.stdout).into_owned()
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

fn git(dir: &TempDir, args: &[&str]) {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(dir.path())
        .output()
        .expect("failed to run git");
    assert!(output.status.success(), "git {:?} failed", args);
}
