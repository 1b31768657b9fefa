//! CLI argument definitions for scuttle.

use clap::{Parser, Subcommand, ValueEnum};

/// Scuttle - a ticket tracker that lives on a git branch.
#[derive(Parser, Debug)]
#[command(name = "scuttle")]
#[command(author, version, about = "Track bug tickets on a git branch", long_about = None)]
pub struct Cli {
    /// Run as if scuttle was started in <path> instead of the current
    /// directory. Can also be set via SCUTTLE_REPO.
    #[arg(short = 'C', long = "repo", global = true, env = "SCUTTLE_REPO")]
    pub repo_path: Option<std::path::PathBuf>,

    /// Data branch holding the ticket store.
    #[arg(
        long = "branch",
        global = true,
        env = "SCUTTLE_BRANCH",
        default_value = crate::storage::DEFAULT_BRANCH
    )]
    pub branch: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data branch with an empty ticket store
    Init,

    /// Create a new ticket
    Create {
        /// Ticket title (also part of the record filename)
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        /// Label to attach; repeat for multiple labels
        #[arg(long = "label")]
        labels: Vec<String>,

        #[arg(long, default_value_t = 1)]
        priority: i64,

        #[arg(long, default_value_t = 1)]
        severity: i64,

        #[arg(long, default_value = "new")]
        status: String,
    },

    /// List tickets as a table, optionally through a named filter
    List {
        /// Named filter to apply (defaults to the current filter, if set)
        #[arg(long = "filter-name")]
        filter_name: Option<String>,

        /// Persist the named filter as the default for future listings
        #[arg(long, requires = "filter_name")]
        set: bool,
    },

    /// Show one ticket
    Show {
        /// Ticket id
        id: u64,

        #[arg(long = "output", value_enum, default_value_t = ShowFormat::Yaml)]
        output: ShowFormat,
    },

    /// Set a ticket's status
    Status {
        id: u64,
        status: String,
    },

    /// Set a ticket's priority
    Priority {
        id: u64,
        priority: i64,
    },

    /// Set a ticket's severity
    Severity {
        id: u64,
        severity: i64,
    },

    /// Label management commands
    Label {
        #[command(subcommand)]
        command: LabelCommands,
    },

    /// Comment management commands
    Comment {
        #[command(subcommand)]
        command: CommentCommands,
    },

    /// Delete a ticket
    Delete {
        id: u64,
    },

    /// Named-filter management commands
    Filter {
        #[command(subcommand)]
        command: FilterCommands,
    },
}

/// Label subcommands
#[derive(Subcommand, Debug)]
pub enum LabelCommands {
    /// Add a label to a ticket
    Add { id: u64, label: String },

    /// Remove all occurrences of a label from a ticket
    Rm { id: u64, label: String },
}

/// Comment subcommands
#[derive(Subcommand, Debug)]
pub enum CommentCommands {
    /// Add a comment to a ticket; prints its "{ticket}-{comment}" id
    Add { id: u64, body: String },

    /// Remove a comment by its per-ticket id
    Rm { id: u64, comment_id: u64 },
}

/// Filter subcommands
#[derive(Subcommand, Debug)]
pub enum FilterCommands {
    /// Validate and store a named filter expression
    Create { name: String, expression: String },

    /// Remove a named filter (no-op if it does not exist)
    Rm { name: String },

    /// List stored filters
    List {
        #[arg(long = "output", value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,
    },
}

/// Serialization format for record-shaped output.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// Rendering for `show`: the serialization formats plus a plain-text view.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowFormat {
    Text,
    Json,
    Yaml,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn list_set_requires_filter_name() {
        assert!(Cli::try_parse_from(["scuttle", "list", "--set"]).is_err());
        assert!(
            Cli::try_parse_from(["scuttle", "list", "--set", "--filter-name", "open"]).is_ok()
        );
    }

    #[test]
    fn create_collects_repeated_labels() {
        let cli = Cli::try_parse_from([
            "scuttle", "create", "--title", "Bug A", "--label", "ui", "--label", "bug",
        ])
        .unwrap();
        match cli.command {
            Commands::Create { labels, status, .. } => {
                assert_eq!(labels, vec!["ui", "bug"]);
                assert_eq!(status, "new");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
