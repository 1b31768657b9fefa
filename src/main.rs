//! Scuttle CLI - a ticket tracker that lives on a git branch.

use clap::Parser;
use scuttle::cli::{Cli, CommentCommands, Commands, FilterCommands, LabelCommands};
use scuttle::commands;
use scuttle::storage::{Store, TicketDraft};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_env("SCUTTLE_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let repo_path = cli.repo_path.clone().unwrap_or_else(|| PathBuf::from("."));

    let result = Store::open(&repo_path, &cli.branch)
        .and_then(|store| run_command(&store, cli.command));

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output.trim_end_matches('\n'));
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    }
}

fn run_command(store: &Store, command: Commands) -> scuttle::Result<String> {
    match command {
        Commands::Init => commands::init(store),

        Commands::Create {
            title,
            description,
            labels,
            priority,
            severity,
            status,
        } => commands::create(
            store,
            TicketDraft {
                title,
                description,
                labels,
                priority,
                severity,
                status,
            },
        ),

        Commands::List { filter_name, set } => {
            commands::list(store, filter_name.as_deref(), set)
        }

        Commands::Show { id, output } => commands::show(store, id, output),

        Commands::Status { id, status } => commands::set_status(store, id, &status),

        Commands::Priority { id, priority } => commands::set_priority(store, id, priority),

        Commands::Severity { id, severity } => commands::set_severity(store, id, severity),

        Commands::Label { command } => match command {
            LabelCommands::Add { id, label } => commands::label_add(store, id, &label),
            LabelCommands::Rm { id, label } => commands::label_rm(store, id, &label),
        },

        Commands::Comment { command } => match command {
            CommentCommands::Add { id, body } => commands::comment_add(store, id, &body),
            CommentCommands::Rm { id, comment_id } => commands::comment_rm(store, id, comment_id),
        },

        Commands::Delete { id } => commands::delete(store, id),

        Commands::Filter { command } => match command {
            FilterCommands::Create { name, expression } => {
                commands::filter_create(store, &name, &expression)
            }
            FilterCommands::Rm { name } => commands::filter_rm(store, &name),
            FilterCommands::List { output } => commands::filter_list(store, output),
        },
    }
}
