//! Snapshot store on the data branch.
//!
//! Every public operation here runs read-tip → cascade → publish to
//! completion: the tip commit is re-read at the start of each operation, the
//! tree-cascade engine produces a new root tree, and the commit/publish
//! protocol advances the branch with a compare-and-swap against the tip that
//! was read. Either the branch moves to a commit containing all of the
//! operation's changes, or it does not move at all; a lost race surfaces as
//! [`Error::Conflict`] and is never retried here.
//!
//! Branch tip tree layout:
//!
//! ```text
//! .scuttle/
//!   next_ticket_id    decimal counter blob
//!   tickets/          one YAML blob per ticket, "{id}__{title}"
//!   filters.json      named-filter collection (absent until first filter)
//! ```

pub mod cascade;
pub mod git;

use std::path::Path;

use chrono::Utc;
use tracing::{debug, warn};

use crate::models::{Comment, Filter, FilterList, Ticket};
use crate::query;
use crate::{Error, Result};
use cascade::{LeafOp, rewrite_leaf};
use git::Git;

/// Default data branch name.
pub const DEFAULT_BRANCH: &str = "scuttle";

/// Reserved store root inside the branch tip tree.
const STORE_DIR: &str = ".scuttle";
const NEXT_TICKET_ID: &str = "next_ticket_id";
const TICKETS_DIR: &str = "tickets";
const FILTERS_FILE: &str = "filters.json";

/// Typed result of `init`, decided structurally by whether the branch
/// ref exists. Both variants are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    AlreadyInitialized,
}

/// Fields for a new ticket. Id, creation time, and the comment counter are
/// assigned by the store.
#[derive(Debug, Clone, Default)]
pub struct TicketDraft {
    pub title: String,
    pub description: String,
    pub labels: Vec<String>,
    pub priority: i64,
    pub severity: i64,
    pub status: String,
}

/// Handle on the ticket store of one repository + branch.
pub struct Store {
    git: Git,
    branch: String,
}

impl Store {
    /// Open the store for a repository. Fails if the path is not inside a
    /// git repository; whether the data branch exists is checked per
    /// operation.
    pub fn open(repo_path: &Path, branch: &str) -> Result<Self> {
        let git = Git::new(repo_path);
        if !git.is_git_repo()? {
            return Err(Error::Git(format!(
                "not a git repository: {}",
                repo_path.display()
            )));
        }
        Ok(Self {
            git,
            branch: branch.to_string(),
        })
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    #[cfg(test)]
    pub(crate) fn git(&self) -> &Git {
        &self.git
    }

    /// Create the data branch with an empty store (`next_ticket_id = 1`,
    /// empty `tickets/`). Reports `AlreadyInitialized` when the branch
    /// exists, including when another writer creates it concurrently.
    pub fn init(&self) -> Result<InitOutcome> {
        if self.git.resolve_branch(&self.branch)?.is_some() {
            return Ok(InitOutcome::AlreadyInitialized);
        }

        let counter = self.git.write_blob(b"1")?;
        let tickets = self.git.mktree(&[])?;
        let store = self.git.mktree(&[
            git::TreeEntry {
                kind: git::EntryKind::Blob,
                oid: counter,
                name: NEXT_TICKET_ID.to_string(),
            },
            git::TreeEntry {
                kind: git::EntryKind::Tree,
                oid: tickets,
                name: TICKETS_DIR.to_string(),
            },
        ])?;
        let root = self.git.mktree(&[git::TreeEntry {
            kind: git::EntryKind::Tree,
            oid: store,
            name: STORE_DIR.to_string(),
        }])?;

        let author = self.git.author()?;
        let commit = self
            .git
            .commit_tree(&root, None, "Initializing ticket store", &author)?;

        match self.git.update_ref_cas(&self.branch, &commit, None) {
            Ok(()) => {
                debug!(branch = %self.branch, %commit, "store initialized");
                Ok(InitOutcome::Created)
            }
            // Lost the creation race: the branch exists now, which is the
            // same outcome as finding it already there.
            Err(Error::Conflict { .. }) => Ok(InitOutcome::AlreadyInitialized),
            Err(e) => Err(e),
        }
    }

    /// Current tip commit of the data branch.
    pub fn tip(&self) -> Result<String> {
        self.git
            .resolve_branch(&self.branch)?
            .ok_or(Error::NotInitialized)
    }

    // === Hierarchy walking ===

    /// Entries of the store root (`.scuttle`) at a tip commit.
    fn store_entries(&self, tip: &str) -> Result<Vec<git::TreeEntry>> {
        let root = self.git.commit_tree_id(tip)?;
        let store = self
            .git
            .ls_tree(&root)?
            .into_iter()
            .find(|e| e.name == STORE_DIR)
            .ok_or_else(|| Error::NotFound(STORE_DIR.to_string()))?;
        self.git.ls_tree(&store.oid)
    }

    fn tickets_tree(&self, tip: &str) -> Result<Vec<git::TreeEntry>> {
        let entry = self
            .store_entries(tip)?
            .into_iter()
            .find(|e| e.name == TICKETS_DIR)
            .ok_or_else(|| Error::NotFound(format!("{}/{}", STORE_DIR, TICKETS_DIR)))?;
        self.git.ls_tree(&entry.oid)
    }

    /// Parse the ticket-id counter blob at a tip.
    pub fn read_next_ticket_id(&self, tip: &str) -> Result<u64> {
        let entry = self
            .store_entries(tip)?
            .into_iter()
            .find(|e| e.name == NEXT_TICKET_ID)
            .ok_or_else(|| {
                Error::CorruptCounter(format!("{}/{} is missing", STORE_DIR, NEXT_TICKET_ID))
            })?;
        let bytes = self.git.read_blob(&entry.oid)?;
        let text = String::from_utf8_lossy(&bytes);
        text.trim()
            .parse()
            .map_err(|_| Error::CorruptCounter(format!("not a decimal integer: {:?}", text.trim())))
    }

    /// All tickets at a tip, in tree order. A blob that fails to decode is
    /// skipped with a warning; one bad record must not take down listing.
    pub fn tickets(&self, tip: &str) -> Result<Vec<Ticket>> {
        let mut tickets = Vec::new();
        for entry in self.tickets_tree(tip)? {
            let bytes = self.git.read_blob(&entry.oid)?;
            match Ticket::from_yaml(&entry.name, &bytes) {
                Ok(ticket) => tickets.push(ticket),
                Err(e) => warn!(record = %entry.name, error = %e, "skipping malformed ticket"),
            }
        }
        Ok(tickets)
    }

    /// Load one ticket by id.
    pub fn ticket(&self, tip: &str, id: u64) -> Result<Ticket> {
        let prefix = format!("{}__", id);
        let entry = self
            .tickets_tree(tip)?
            .into_iter()
            .find(|e| e.name.starts_with(&prefix))
            .ok_or_else(|| Error::NotFound(format!("ticket {}", id)))?;
        let bytes = self.git.read_blob(&entry.oid)?;
        Ticket::from_yaml(&entry.name, &bytes)
    }

    // === Publish protocol ===

    /// Commit `new_root` with `tip` as sole parent and advance the branch,
    /// compare-and-swapping against `tip`.
    fn publish(&self, tip: &str, new_root: &str, message: &str) -> Result<String> {
        let author = self.git.author()?;
        let commit = self.git.commit_tree(new_root, Some(tip), message, &author)?;
        self.git.update_ref_cas(&self.branch, &commit, Some(tip))?;
        debug!(branch = %self.branch, %commit, message, "published snapshot");
        Ok(commit)
    }

    // === Ticket operations ===

    /// Allocate a ticket id and create the ticket. The counter increment
    /// and the new record land in the same cascade and the same commit, so
    /// no snapshot can show one without the other.
    pub fn create_ticket(&self, draft: TicketDraft) -> Result<(u64, String)> {
        let tip = self.tip()?;
        let root = self.git.commit_tree_id(&tip)?;

        let id = self.read_next_ticket_id(&tip)?;
        let counter = self.git.write_blob((id + 1).to_string().as_bytes())?;
        let root = rewrite_leaf(
            &self.git,
            Some(&root),
            &[STORE_DIR, NEXT_TICKET_ID],
            &LeafOp::PutBlob(counter),
        )?;

        let ticket = Ticket {
            id,
            title: draft.title,
            description: draft.description,
            labels: draft.labels,
            priority: draft.priority,
            severity: draft.severity,
            status: draft.status,
            created: Utc::now().timestamp(),
            comments: Vec::new(),
            next_comment_id: 0,
        };
        let filename = ticket.filename();
        let blob = self.git.write_blob(ticket.to_yaml()?.as_bytes())?;
        let root = rewrite_leaf(
            &self.git,
            Some(&root),
            &[STORE_DIR, TICKETS_DIR, &filename],
            &LeafOp::PutBlob(blob),
        )?;

        self.publish(&tip, &root, &format!("Creating ticket {}", filename))?;
        Ok((id, filename))
    }

    /// Load, mutate, and store one ticket as a single snapshot.
    fn update_ticket<F>(&self, id: u64, mutate: F, message: impl Fn(&Ticket) -> String) -> Result<Ticket>
    where
        F: FnOnce(&mut Ticket) -> Result<()>,
    {
        let tip = self.tip()?;
        let root = self.git.commit_tree_id(&tip)?;

        let mut ticket = self.ticket(&tip, id)?;
        mutate(&mut ticket)?;

        let filename = ticket.filename();
        let blob = self.git.write_blob(ticket.to_yaml()?.as_bytes())?;
        let root = rewrite_leaf(
            &self.git,
            Some(&root),
            &[STORE_DIR, TICKETS_DIR, &filename],
            &LeafOp::PutBlob(blob),
        )?;

        self.publish(&tip, &root, &message(&ticket))?;
        Ok(ticket)
    }

    pub fn set_status(&self, id: u64, status: &str) -> Result<()> {
        self.update_ticket(
            id,
            |t| {
                t.status = status.to_string();
                Ok(())
            },
            |t| format!("Setting status of ticket {} to {}", t.id, status),
        )?;
        Ok(())
    }

    pub fn set_priority(&self, id: u64, priority: i64) -> Result<()> {
        self.update_ticket(
            id,
            |t| {
                t.priority = priority;
                Ok(())
            },
            |t| format!("Setting priority of ticket {} to {}", t.id, priority),
        )?;
        Ok(())
    }

    pub fn set_severity(&self, id: u64, severity: i64) -> Result<()> {
        self.update_ticket(
            id,
            |t| {
                t.severity = severity;
                Ok(())
            },
            |t| format!("Setting severity of ticket {} to {}", t.id, severity),
        )?;
        Ok(())
    }

    pub fn add_label(&self, id: u64, label: &str) -> Result<()> {
        self.update_ticket(
            id,
            |t| {
                t.labels.push(label.to_string());
                Ok(())
            },
            |t| format!("Adding label {} to ticket {}", label, t.id),
        )?;
        Ok(())
    }

    /// Remove every occurrence of `label` (duplicates are allowed on
    /// tickets). A label that is not present is a not-found error.
    pub fn delete_label(&self, id: u64, label: &str) -> Result<()> {
        self.update_ticket(
            id,
            |t| {
                let before = t.labels.len();
                t.labels.retain(|l| l != label);
                if t.labels.len() == before {
                    return Err(Error::NotFound(format!(
                        "label {} on ticket {}",
                        label, t.id
                    )));
                }
                Ok(())
            },
            |t| format!("Deleting label {} from ticket {}", label, t.id),
        )?;
        Ok(())
    }

    /// Add a comment, allocating its id from the ticket's own counter. The
    /// new comment and the incremented counter are one ticket blob in one
    /// commit. Returns the comment's external identity, `"{id}-{cid}"`.
    pub fn add_comment(&self, id: u64, body: &str) -> Result<String> {
        let author = self.git.author()?;
        let mut comment_id = 0;
        let ticket = self.update_ticket(
            id,
            |t| {
                comment_id = t.next_comment_id;
                t.comments.push(Comment {
                    id: comment_id,
                    created: Utc::now().timestamp(),
                    body: body.to_string(),
                    author: author.display(),
                });
                t.next_comment_id += 1;
                Ok(())
            },
            |t| format!("Adding comment {} to ticket {}", t.next_comment_id - 1, t.id),
        )?;
        Ok(ticket.comment_ref(comment_id))
    }

    /// Delete a comment by id. The ticket's comment counter is not
    /// decremented; comment ids are never reused.
    pub fn delete_comment(&self, id: u64, comment_id: u64) -> Result<String> {
        let ticket = self.update_ticket(
            id,
            |t| {
                let before = t.comments.len();
                t.comments.retain(|c| c.id != comment_id);
                if t.comments.len() == before {
                    return Err(Error::NotFound(format!("comment {}-{}", t.id, comment_id)));
                }
                Ok(())
            },
            |t| format!("Deleting comment {} from ticket {}", comment_id, t.id),
        )?;
        Ok(ticket.comment_ref(comment_id))
    }

    /// Remove a ticket's record from the snapshot. Returns `false` without
    /// committing when the ticket does not exist.
    pub fn delete_ticket(&self, id: u64) -> Result<bool> {
        let tip = self.tip()?;
        let root = self.git.commit_tree_id(&tip)?;

        let prefix = format!("{}__", id);
        let Some(entry) = self
            .tickets_tree(&tip)?
            .into_iter()
            .find(|e| e.name.starts_with(&prefix))
        else {
            return Ok(false);
        };

        let root = rewrite_leaf(
            &self.git,
            Some(&root),
            &[STORE_DIR, TICKETS_DIR, &entry.name],
            &LeafOp::Delete,
        )?;
        self.publish(&tip, &root, &format!("Deleting ticket {}", entry.name))?;
        Ok(true)
    }

    // === Listing ===

    /// Tickets at the current tip, optionally filtered. An explicit filter
    /// name wins; otherwise the persisted `current` filter applies if set;
    /// otherwise all tickets are returned.
    pub fn list_tickets(&self, filter_name: Option<&str>) -> Result<Vec<Ticket>> {
        let tip = self.tip()?;
        let tickets = self.tickets(&tip)?;
        let filters = self.filters(&tip)?;

        let name = match filter_name {
            Some(name) => Some(name.to_string()),
            None => filters.current.clone(),
        };
        match name {
            Some(name) => {
                let filter = filters
                    .filters
                    .get(&name)
                    .ok_or_else(|| Error::NotFound(format!("filter {}", name)))?;
                query::apply(&filter.expression, &tickets)
            }
            None => Ok(tickets),
        }
    }

    // === Named filters ===

    /// The filter collection at a tip; an absent `filters.json` is an
    /// empty collection.
    pub fn filters(&self, tip: &str) -> Result<FilterList> {
        let entry = self
            .store_entries(tip)?
            .into_iter()
            .find(|e| e.name == FILTERS_FILE);
        match entry {
            Some(entry) => FilterList::from_json(&self.git.read_blob(&entry.oid)?),
            None => Ok(FilterList::default()),
        }
    }

    fn save_filters(&self, tip: &str, list: &FilterList, message: &str) -> Result<()> {
        let root = self.git.commit_tree_id(tip)?;
        let blob = self.git.write_blob(list.to_json()?.as_bytes())?;
        let root = rewrite_leaf(
            &self.git,
            Some(&root),
            &[STORE_DIR, FILTERS_FILE],
            &LeafOp::PutBlob(blob),
        )?;
        self.publish(tip, &root, message)?;
        Ok(())
    }

    /// Validate and persist a named filter, overwriting any previous filter
    /// of the same name. Invalid expressions are rejected before anything
    /// is written.
    pub fn create_filter(&self, name: &str, expression: &str) -> Result<()> {
        query::validate(expression)?;

        let tip = self.tip()?;
        let mut list = self.filters(&tip)?;
        list.filters
            .insert(name.to_string(), Filter::new(name, expression));
        self.save_filters(&tip, &list, &format!("Creating filter {}", name))
    }

    /// Remove a named filter. Deleting a filter that does not exist is a
    /// no-op and does not commit. If the deleted filter was the current
    /// default, the default is cleared.
    pub fn delete_filter(&self, name: &str) -> Result<bool> {
        let tip = self.tip()?;
        let mut list = self.filters(&tip)?;
        if list.filters.remove(name).is_none() {
            return Ok(false);
        }
        if list.current.as_deref() == Some(name) {
            list.current = None;
        }
        self.save_filters(&tip, &list, &format!("Deleting filter {}", name))?;
        Ok(true)
    }

    /// Persist `name` as the default listing filter.
    pub fn set_current_filter(&self, name: &str) -> Result<()> {
        let tip = self.tip()?;
        let mut list = self.filters(&tip)?;
        if !list.filters.contains_key(name) {
            return Err(Error::NotFound(format!("filter {}", name)));
        }
        list.current = Some(name.to_string());
        self.save_filters(&tip, &list, &format!("Setting current filter to {}", name))
    }

    /// The filter collection at the current tip (read-only helper for
    /// listing).
    pub fn filter_list(&self) -> Result<FilterList> {
        let tip = self.tip()?;
        self.filters(&tip)
    }
}
