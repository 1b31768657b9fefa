//! Tree-cascade engine.
//!
//! A snapshot mutation changes exactly one leaf of the record hierarchy, but
//! git trees are immutable, so every ancestor of the touched leaf must be
//! rewritten bottom-up into a new root tree. Siblings of the touched path
//! are carried over by id, so everything outside the path is byte-identical
//! to the previous snapshot and the cost of a mutation is O(depth).

use super::git::{EntryKind, Git, TreeEntry};
use crate::{Error, Result};

/// What to do at the leaf of a cascade.
#[derive(Debug, Clone)]
pub enum LeafOp {
    /// Insert or overwrite the named entry with this blob.
    PutBlob(String),
    /// Remove the named entry. Missing entries are an error, and a
    /// container emptied by the removal is still written and linked.
    Delete,
}

/// Rewrite the ancestor chain of one leaf, returning the new root tree id.
///
/// `root` is the current root tree, or `None` when there is no snapshot yet
/// (the very first write). On a put, missing intermediate containers are
/// created empty; this is what makes the first ticket and the first filter
/// file work. On a delete, a missing segment anywhere in the path is a
/// [`Error::NotFound`] naming the missing path.
pub fn rewrite_leaf(git: &Git, root: Option<&str>, path: &[&str], op: &LeafOp) -> Result<String> {
    if path.is_empty() {
        return Err(Error::Git("cascade path is empty".to_string()));
    }
    rewrite(git, root, path, 0, op)
}

fn rewrite(git: &Git, tree: Option<&str>, path: &[&str], depth: usize, op: &LeafOp) -> Result<String> {
    let mut entries = match tree {
        Some(oid) => git.ls_tree(oid)?,
        None => Vec::new(),
    };
    let segment = path[depth];

    if depth == path.len() - 1 {
        match op {
            LeafOp::PutBlob(oid) => {
                upsert(&mut entries, EntryKind::Blob, oid.clone(), segment);
            }
            LeafOp::Delete => {
                let before = entries.len();
                entries.retain(|e| e.name != segment);
                if entries.len() == before {
                    return Err(Error::NotFound(path[..=depth].join("/")));
                }
            }
        }
    } else {
        let child = entries.iter().find(|e| e.name == segment);
        let child_tree = match child {
            Some(entry) if entry.kind == EntryKind::Tree => Some(entry.oid.clone()),
            Some(_) => {
                return Err(Error::Git(format!(
                    "path segment {} is a blob, expected a tree",
                    path[..=depth].join("/")
                )));
            }
            None => match op {
                LeafOp::PutBlob(_) => None,
                LeafOp::Delete => {
                    return Err(Error::NotFound(path[..=depth].join("/")));
                }
            },
        };

        let new_child = rewrite(git, child_tree.as_deref(), path, depth + 1, op)?;
        upsert(&mut entries, EntryKind::Tree, new_child, segment);
    }

    git.mktree(&entries)
}

fn upsert(entries: &mut Vec<TreeEntry>, kind: EntryKind, oid: String, name: &str) {
    if let Some(entry) = entries.iter_mut().find(|e| e.name == name) {
        entry.kind = kind;
        entry.oid = oid;
    } else {
        entries.push(TreeEntry {
            kind,
            oid,
            name: name.to_string(),
        });
    }
}
