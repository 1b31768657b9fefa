//! Data models for scuttle records.
//!
//! This module defines the structures persisted on the data branch:
//! - `Ticket` - a bug ticket with labels, comments, and per-ticket counters
//! - `Comment` - a note on a ticket, identified as `"{ticket}-{comment}"`
//! - `Filter` / `FilterList` - named, reusable list-filter expressions
//!
//! Tickets are stored one YAML blob each under the `tickets/` subtree; the
//! filter collection is one JSON blob (`filters.json`). Field names here are
//! the on-branch field names, so a written-then-read record is
//! field-for-field identical. The ticket filename is derived from id and
//! title and is never stored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Error, Result};

/// A bug ticket.
///
/// `id` and `created` are set once at creation and never change. Comment ids
/// are allocated from `next_comment_id`, which only ever increases; deleting
/// a comment does not free its id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique, immutable ticket id.
    pub id: u64,

    /// Ticket title. Part of the derived filename.
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Ordered labels; duplicates are allowed.
    #[serde(default)]
    pub labels: Vec<String>,

    #[serde(default)]
    pub priority: i64,

    #[serde(default)]
    pub severity: i64,

    /// Free-form status string.
    #[serde(default)]
    pub status: String,

    /// Creation time, unix seconds. Set once.
    pub created: i64,

    #[serde(default)]
    pub comments: Vec<Comment>,

    /// Next comment id to allocate for this ticket. Monotonic.
    #[serde(default)]
    pub next_comment_id: u64,
}

/// A comment on a ticket. Ids are scoped to the owning ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    /// Creation time, unix seconds.
    pub created: i64,
    pub body: String,
    /// Formatted as `Name <email>`.
    pub author: String,
}

impl Ticket {
    /// Derived record filename: `"{id}__{title with spaces as underscores}"`.
    ///
    /// Ids are unique and immutable, so filenames stay unique even when
    /// titles collide. Titles are free-form, but a tree entry name cannot
    /// hold `/` or control characters, so those become underscores too.
    pub fn filename(&self) -> String {
        let title: String = self
            .title
            .chars()
            .map(|c| {
                if c == ' ' || c == '/' || c.is_control() {
                    '_'
                } else {
                    c
                }
            })
            .collect();
        format!("{}__{}", self.id, title)
    }

    /// External identity of one of this ticket's comments.
    pub fn comment_ref(&self, comment_id: u64) -> String {
        format!("{}-{}", self.id, comment_id)
    }

    /// Encode for storage.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Decode a stored ticket blob. `name` is the record filename, carried
    /// into the error so a bad blob can be pinpointed.
    pub fn from_yaml(name: &str, bytes: &[u8]) -> Result<Self> {
        serde_yaml::from_slice(bytes).map_err(|e| Error::MalformedRecord {
            name: name.to_string(),
            detail: e.to_string(),
        })
    }

    /// Plain-text rendering for `show`: one field per line, comments
    /// indented underneath.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("ID: {}\n", self.id));
        out.push_str(&format!("Title: {}\n", self.title));
        out.push_str(&format!("Description: {}\n", self.description));
        out.push_str(&format!("Status: {}\n", self.status));
        out.push_str(&format!("Priority: {}\n", self.priority));
        out.push_str(&format!("Severity: {}\n", self.severity));
        out.push_str(&format!("Labels: {}\n", self.labels.join(", ")));
        out.push_str(&format!("Created: {}\n", format_timestamp(self.created)));
        out.push_str("Comments:\n");
        for comment in &self.comments {
            out.push_str(&format!("    Comment ID: {}\n", self.comment_ref(comment.id)));
            out.push_str(&format!("    Created: {}\n", format_timestamp(comment.created)));
            out.push_str(&format!("    Author: {}\n", comment.author));
            out.push_str(&format!("    Body: {}\n", comment.body));
        }
        out
    }

    /// The externally visible record shape the query language runs against.
    pub fn to_value(&self) -> serde_json::Value {
        // Ticket is Serialize with only string keys, so this cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A persisted, reusable list-filter expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    /// Query-language source text.
    #[serde(rename = "filter")]
    pub expression: String,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

impl Filter {
    pub fn new(name: &str, expression: &str) -> Self {
        Self {
            name: name.to_string(),
            expression: expression.to_string(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

}

/// The named-filter collection stored in `filters.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterList {
    /// Default filter applied by listing when none is named.
    #[serde(default)]
    pub current: Option<String>,

    #[serde(default)]
    pub filters: BTreeMap<String, Filter>,
}

impl FilterList {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::MalformedRecord {
            name: "filters.json".to_string(),
            detail: e.to_string(),
        })
    }
}

// === Listing ===

/// One listing column: header, minimum width, and field accessor.
///
/// The accessor table makes the rendered fields explicit; there is no
/// reflection and no way to ask for a field that does not exist.
struct Column {
    header: &'static str,
    min_width: usize,
    get: fn(&Ticket) -> String,
}

const COLUMNS: &[Column] = &[
    Column {
        header: "ID",
        min_width: 3,
        get: |t| t.id.to_string(),
    },
    Column {
        header: "Title",
        min_width: 20,
        get: |t| t.title.clone(),
    },
    Column {
        header: "Severity",
        min_width: 9,
        get: |t| t.severity.to_string(),
    },
    Column {
        header: "Status",
        min_width: 10,
        get: |t| t.status.clone(),
    },
];

/// Render tickets as the listing table (`ID | Title | Severity | Status`).
///
/// Each column is as wide as its widest value, but never narrower than its
/// minimum; over-wide values are truncated to the column width.
pub fn render_table(tickets: &[Ticket]) -> String {
    let widths: Vec<usize> = COLUMNS
        .iter()
        .map(|col| {
            tickets
                .iter()
                .map(|t| (col.get)(t).chars().count())
                .max()
                .unwrap_or(0)
                .max(col.min_width)
        })
        .collect();

    let mut out = String::new();
    let header: Vec<String> = COLUMNS
        .iter()
        .zip(&widths)
        .map(|(col, w)| pad(col.header, *w))
        .collect();
    out.push_str(&header.join(" | "));
    out.push('\n');

    let rule_len = widths.iter().sum::<usize>() + 3 * (COLUMNS.len() - 1);
    out.push_str(&"-".repeat(rule_len));
    out.push('\n');

    for ticket in tickets {
        let row: Vec<String> = COLUMNS
            .iter()
            .zip(&widths)
            .map(|(col, w)| pad(&(col.get)(ticket), *w))
            .collect();
        out.push_str(&row.join(" | "));
        out.push('\n');
    }

    out
}

/// RFC 3339 rendering of a stored unix timestamp. An out-of-range value
/// falls back to the raw number rather than failing the whole rendering.
fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| secs.to_string())
}

/// Pad with spaces to exactly `width` characters, truncating over-wide
/// values. Width is counted in chars so multi-byte titles line up.
fn pad(s: &str, width: usize) -> String {
    let len = s.chars().count();
    if len >= width {
        s.chars().take(width).collect()
    } else {
        let mut padded = s.to_string();
        padded.push_str(&" ".repeat(width - len));
        padded
    }
}
