//! Command implementations for the scuttle CLI.
//!
//! Thin layer between the parsed CLI and the store: each function runs one
//! store operation and renders its outcome as the text the binary prints.
//! All persistence and invariant enforcement lives in [`crate::storage`].

use crate::cli::{OutputFormat, ShowFormat};
use crate::models;
use crate::storage::{InitOutcome, Store, TicketDraft};
use crate::Result;

pub fn init(store: &Store) -> Result<String> {
    match store.init()? {
        InitOutcome::Created => Ok(format!(
            "Initialized ticket store on branch '{}'",
            store.branch()
        )),
        InitOutcome::AlreadyInitialized => Ok(format!(
            "Ticket store already initialized on branch '{}'",
            store.branch()
        )),
    }
}

pub fn create(store: &Store, draft: TicketDraft) -> Result<String> {
    let (id, filename) = store.create_ticket(draft)?;
    Ok(format!("Created ticket {} ({})", id, filename))
}

pub fn list(store: &Store, filter_name: Option<&str>, set: bool) -> Result<String> {
    if set {
        // clap guarantees a name is present when --set is given
        if let Some(name) = filter_name {
            store.set_current_filter(name)?;
        }
    }
    let tickets = store.list_tickets(filter_name)?;
    Ok(models::render_table(&tickets))
}

pub fn show(store: &Store, id: u64, output: ShowFormat) -> Result<String> {
    let tip = store.tip()?;
    let ticket = store.ticket(&tip, id)?;
    match output {
        ShowFormat::Text => Ok(ticket.render_text()),
        ShowFormat::Json => Ok(serde_json::to_string_pretty(&ticket)?),
        ShowFormat::Yaml => ticket.to_yaml(),
    }
}

pub fn set_status(store: &Store, id: u64, status: &str) -> Result<String> {
    store.set_status(id, status)?;
    Ok(format!("Set status of ticket {} to {}", id, status))
}

pub fn set_priority(store: &Store, id: u64, priority: i64) -> Result<String> {
    store.set_priority(id, priority)?;
    Ok(format!("Set priority of ticket {} to {}", id, priority))
}

pub fn set_severity(store: &Store, id: u64, severity: i64) -> Result<String> {
    store.set_severity(id, severity)?;
    Ok(format!("Set severity of ticket {} to {}", id, severity))
}

pub fn label_add(store: &Store, id: u64, label: &str) -> Result<String> {
    store.add_label(id, label)?;
    Ok(format!("Added label {} to ticket {}", label, id))
}

pub fn label_rm(store: &Store, id: u64, label: &str) -> Result<String> {
    store.delete_label(id, label)?;
    Ok(format!("Removed label {} from ticket {}", label, id))
}

pub fn comment_add(store: &Store, id: u64, body: &str) -> Result<String> {
    let comment_ref = store.add_comment(id, body)?;
    Ok(comment_ref)
}

pub fn comment_rm(store: &Store, id: u64, comment_id: u64) -> Result<String> {
    let comment_ref = store.delete_comment(id, comment_id)?;
    Ok(comment_ref)
}

pub fn delete(store: &Store, id: u64) -> Result<String> {
    if store.delete_ticket(id)? {
        Ok(format!("Deleted ticket {}", id))
    } else {
        Ok(format!("Ticket {} does not exist", id))
    }
}

pub fn filter_create(store: &Store, name: &str, expression: &str) -> Result<String> {
    store.create_filter(name, expression)?;
    Ok(format!("Created filter {}", name))
}

pub fn filter_rm(store: &Store, name: &str) -> Result<String> {
    if store.delete_filter(name)? {
        Ok(format!("Deleted filter {}", name))
    } else {
        Ok(format!("Filter {} does not exist", name))
    }
}

pub fn filter_list(store: &Store, output: OutputFormat) -> Result<String> {
    let list = store.filter_list()?;
    match output {
        OutputFormat::Json => list.to_json(),
        OutputFormat::Yaml => list.to_yaml(),
    }
}
