//! Git object-store collaborator.
//!
//! Everything scuttle persists goes through the plumbing commands wrapped
//! here: blobs via `hash-object`, trees via `ls-tree`/`mktree`, commits via
//! `commit-tree`, refs via `rev-parse`/`update-ref`. The working tree and
//! index are never touched.
//!
//! Branch advancement uses `update-ref <ref> <new> <old>`, which is a
//! compare-and-swap: it fails unless the ref still points at `<old>`. That
//! failure is surfaced as [`Error::Conflict`] so callers can re-read the tip
//! and retry if they choose to.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// The all-zero object id, used as the "ref must not exist" CAS sentinel.
const ZERO_OID: &str = "0000000000000000000000000000000000000000";

/// Kind of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Blob,
    Tree,
}

impl EntryKind {
    /// Mode string as `mktree` expects it.
    pub fn mode(self) -> &'static str {
        match self {
            Self::Blob => "100644",
            Self::Tree => "040000",
        }
    }

    fn type_name(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
        }
    }
}

/// One entry of a tree object.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub kind: EntryKind,
    pub oid: String,
    pub name: String,
}

/// Commit author/committer identity, read from repository config.
#[derive(Debug, Clone)]
pub struct Author {
    pub name: String,
    pub email: String,
}

impl Author {
    /// Formatted as it appears on comments: `Name <email>`.
    pub fn display(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }
}

/// Handle on a git repository, addressed by its working directory.
pub struct Git {
    repo_path: PathBuf,
}

impl Git {
    pub fn new(repo_path: &Path) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Check whether the path is inside a git repository.
    pub fn is_git_repo(&self) -> Result<bool> {
        let output = Command::new("git")
            .args(["rev-parse", "--git-dir"])
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| Error::Git(format!("failed to run git: {}", e)))?;
        Ok(output.status.success())
    }

    /// Run a git command, requiring success, returning stdout.
    fn run(&self, args: &[&str]) -> Result<String> {
        debug!(?args, "git");
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| Error::Git(format!("failed to run git {:?}: {}", args, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Git(format!(
                "git {:?} failed: {}",
                args,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a git command feeding `input` on stdin, returning stdout.
    fn run_with_stdin(&self, args: &[&str], input: &[u8]) -> Result<String> {
        debug!(?args, "git (stdin)");
        let mut child = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Git(format!("failed to run git {:?}: {}", args, e)))?;

        {
            use std::io::Write;
            // stdin is piped above, so it is always present
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| Error::Git("no stdin handle for git".to_string()))?;
            stdin
                .write_all(input)
                .map_err(|e| Error::Git(format!("failed to write to git: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Git(format!("failed to wait for git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Git(format!(
                "git {:?} failed: {}",
                args,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Resolve a branch name to its tip commit id, `None` if the branch
    /// does not exist.
    pub fn resolve_branch(&self, branch: &str) -> Result<Option<String>> {
        let output = Command::new("git")
            .args([
                "rev-parse",
                "--verify",
                "--quiet",
                &format!("refs/heads/{}", branch),
            ])
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| Error::Git(format!("failed to run git rev-parse: {}", e)))?;

        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Ok(None)
        }
    }

    /// Write a blob object, returning its id.
    pub fn write_blob(&self, content: &[u8]) -> Result<String> {
        let out = self.run_with_stdin(&["hash-object", "-w", "--stdin"], content)?;
        Ok(out.trim().to_string())
    }

    /// Read a blob object's content.
    pub fn read_blob(&self, oid: &str) -> Result<Vec<u8>> {
        let output = Command::new("git")
            .args(["cat-file", "blob", oid])
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| Error::Git(format!("failed to run git cat-file: {}", e)))?;

        if !output.status.success() {
            return Err(Error::NotFound(format!("blob {}", oid)));
        }

        Ok(output.stdout)
    }

    /// List the entries of a tree object.
    ///
    /// NUL-delimited output: with newline records git C-quotes names that
    /// contain non-ASCII bytes (`core.quotepath`), and a quoted name never
    /// matches the one it was written under.
    pub fn ls_tree(&self, oid: &str) -> Result<Vec<TreeEntry>> {
        let out = self.run(&["ls-tree", "-z", oid])?;
        let mut entries = Vec::new();
        for line in out.split('\0') {
            if line.is_empty() {
                continue;
            }
            // Format: <mode> SP <type> SP <oid> TAB <name>
            let (meta, name) = line
                .split_once('\t')
                .ok_or_else(|| Error::Git(format!("unparseable ls-tree line: {}", line)))?;
            let fields: Vec<&str> = meta.split_whitespace().collect();
            if fields.len() != 3 {
                return Err(Error::Git(format!("unparseable ls-tree line: {}", line)));
            }
            let kind = match fields[1] {
                "blob" => EntryKind::Blob,
                "tree" => EntryKind::Tree,
                other => {
                    return Err(Error::Git(format!("unsupported tree entry type: {}", other)));
                }
            };
            entries.push(TreeEntry {
                kind,
                oid: fields[2].to_string(),
                name: name.to_string(),
            });
        }
        Ok(entries)
    }

    /// Write a tree object from entries, returning its id.
    ///
    /// `mktree` accepts entries in any order and sorts them itself, so
    /// callers never need to maintain git's tree ordering by hand. Input is
    /// NUL-terminated to mirror [`Git::ls_tree`]'s unquoted name handling.
    pub fn mktree(&self, entries: &[TreeEntry]) -> Result<String> {
        let input = entries
            .iter()
            .map(|e| {
                format!(
                    "{} {} {}\t{}\0",
                    e.kind.mode(),
                    e.kind.type_name(),
                    e.oid,
                    e.name
                )
            })
            .collect::<String>();
        let out = self.run_with_stdin(&["mktree", "-z"], input.as_bytes())?;
        Ok(out.trim().to_string())
    }

    /// Resolve a commit id to its root tree id.
    pub fn commit_tree_id(&self, commit: &str) -> Result<String> {
        let out = self.run(&["rev-parse", &format!("{}^{{tree}}", commit)])?;
        Ok(out.trim().to_string())
    }

    /// Create a commit object for `tree` with an optional sole parent.
    ///
    /// Does not move any ref; pair with [`Git::update_ref_cas`].
    pub fn commit_tree(
        &self,
        tree: &str,
        parent: Option<&str>,
        message: &str,
        author: &Author,
    ) -> Result<String> {
        let mut args = vec!["commit-tree".to_string(), tree.to_string()];
        if let Some(parent) = parent {
            args.push("-p".to_string());
            args.push(parent.to_string());
        }
        args.push("-m".to_string());
        args.push(message.to_string());

        debug!(tree, ?parent, message, "git commit-tree");
        let output = Command::new("git")
            .args(&args)
            .current_dir(&self.repo_path)
            .env("GIT_AUTHOR_NAME", &author.name)
            .env("GIT_AUTHOR_EMAIL", &author.email)
            .env("GIT_COMMITTER_NAME", &author.name)
            .env("GIT_COMMITTER_EMAIL", &author.email)
            .output()
            .map_err(|e| Error::Git(format!("failed to run git commit-tree: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Git(format!("commit-tree failed: {}", stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Advance a branch ref to `new`, but only if it still points at
    /// `expected` (`None` = the ref must not exist yet).
    ///
    /// A lost race comes back as [`Error::Conflict`] carrying the tip the
    /// ref actually holds; the caller decides whether to re-read and retry.
    pub fn update_ref_cas(&self, branch: &str, new: &str, expected: Option<&str>) -> Result<()> {
        let refname = format!("refs/heads/{}", branch);
        let old = expected.unwrap_or(ZERO_OID);

        debug!(branch, new, old, "git update-ref");
        let output = Command::new("git")
            .args(["update-ref", &refname, new, old])
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| Error::Git(format!("failed to run git update-ref: {}", e)))?;

        if output.status.success() {
            return Ok(());
        }

        // Decide structurally whether this was a lost race: if the ref now
        // points somewhere other than what we expected, another writer won.
        let actual = self.resolve_branch(branch)?;
        let expected_str = expected.unwrap_or("(absent)").to_string();
        let actual_str = actual.unwrap_or_else(|| "(absent)".to_string());
        if actual_str != expected_str {
            return Err(Error::Conflict {
                expected: expected_str,
                actual: actual_str,
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::Git(format!("update-ref failed: {}", stderr.trim())))
    }

    /// Read a single config value, `None` if unset.
    pub fn config(&self, key: &str) -> Result<Option<String>> {
        let output = Command::new("git")
            .args(["config", "--get", key])
            .current_dir(&self.repo_path)
            .output()
            .map_err(|e| Error::Git(format!("failed to run git config: {}", e)))?;

        if output.status.success() {
            Ok(Some(
                String::from_utf8_lossy(&output.stdout).trim().to_string(),
            ))
        } else {
            Ok(None)
        }
    }

    /// Commit authorship from `user.name` / `user.email`.
    pub fn author(&self) -> Result<Author> {
        let name = self
            .config("user.name")?
            .ok_or_else(|| Error::MissingConfig("user.name".to_string()))?;
        let email = self
            .config("user.email")?
            .ok_or_else(|| Error::MissingConfig("user.email".to_string()))?;
        Ok(Author { name, email })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::temp_repo;

    #[test]
    fn blob_round_trip() {
        let repo = temp_repo();
        let git = Git::new(repo.path());

        let oid = git.write_blob(b"hello").unwrap();
        assert_eq!(git.read_blob(&oid).unwrap(), b"hello");
    }

    #[test]
    fn read_missing_blob_is_not_found() {
        let repo = temp_repo();
        let git = Git::new(repo.path());

        let err = git.read_blob(ZERO_OID).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn mktree_and_ls_tree() {
        let repo = temp_repo();
        let git = Git::new(repo.path());

        let blob = git.write_blob(b"1").unwrap();
        let tree = git
            .mktree(&[TreeEntry {
                kind: EntryKind::Blob,
                oid: blob.clone(),
                name: "next_ticket_id".to_string(),
            }])
            .unwrap();

        let entries = git.ls_tree(&tree).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "next_ticket_id");
        assert_eq!(entries[0].oid, blob);
        assert_eq!(entries[0].kind, EntryKind::Blob);
    }

    #[test]
    fn non_ascii_tree_names_round_trip_unquoted() {
        let repo = temp_repo();
        let git = Git::new(repo.path());

        let blob = git.write_blob(b"x").unwrap();
        let tree = git
            .mktree(&[TreeEntry {
                kind: EntryKind::Blob,
                oid: blob,
                name: "1__Bäg_report".to_string(),
            }])
            .unwrap();

        // core.quotepath would render this as "1__B\303\244g_report" on a
        // newline-record listing; the name must come back byte-for-byte.
        let entries = git.ls_tree(&tree).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "1__Bäg_report");
    }

    #[test]
    fn empty_tree_round_trips() {
        let repo = temp_repo();
        let git = Git::new(repo.path());

        let tree = git.mktree(&[]).unwrap();
        assert!(git.ls_tree(&tree).unwrap().is_empty());
    }

    #[test]
    fn commit_and_resolve_branch() {
        let repo = temp_repo();
        let git = Git::new(repo.path());

        assert!(git.resolve_branch("data").unwrap().is_none());

        let tree = git.mktree(&[]).unwrap();
        let author = git.author().unwrap();
        let commit = git.commit_tree(&tree, None, "initial", &author).unwrap();
        git.update_ref_cas("data", &commit, None).unwrap();

        assert_eq!(git.resolve_branch("data").unwrap(), Some(commit.clone()));
        assert_eq!(git.commit_tree_id(&commit).unwrap(), tree);
    }

    #[test]
    fn update_ref_cas_detects_lost_race() {
        let repo = temp_repo();
        let git = Git::new(repo.path());
        let author = git.author().unwrap();

        let tree = git.mktree(&[]).unwrap();
        let c0 = git.commit_tree(&tree, None, "initial", &author).unwrap();
        git.update_ref_cas("data", &c0, None).unwrap();

        // Another writer advances the branch.
        let c1 = git.commit_tree(&tree, Some(&c0), "racer", &author).unwrap();
        git.update_ref_cas("data", &c1, Some(&c0)).unwrap();

        // Our publish against the stale tip must fail with a conflict.
        let c2 = git.commit_tree(&tree, Some(&c0), "loser", &author).unwrap();
        let err = git.update_ref_cas("data", &c2, Some(&c0)).unwrap_err();
        match err {
            Error::Conflict { expected, actual } => {
                assert_eq!(expected, c0);
                assert_eq!(actual, c1);
            }
            other => panic!("expected conflict, got {:?}", other),
        }
        // The branch still points at the winner.
        assert_eq!(git.resolve_branch("data").unwrap(), Some(c1));
    }

    #[test]
    fn create_only_cas_fails_when_branch_exists() {
        let repo = temp_repo();
        let git = Git::new(repo.path());
        let author = git.author().unwrap();

        let tree = git.mktree(&[]).unwrap();
        let c0 = git.commit_tree(&tree, None, "initial", &author).unwrap();
        git.update_ref_cas("data", &c0, None).unwrap();

        let err = git.update_ref_cas("data", &c0, None).unwrap_err();
        assert!(matches!(err, Error::Conflict { .. }));
    }

    #[test]
    fn author_from_config() {
        let repo = temp_repo();
        let git = Git::new(repo.path());

        let author = git.author().unwrap();
        assert_eq!(author.name, "Test User");
        assert_eq!(author.display(), "Test User <test@example.com>");
    }
}
