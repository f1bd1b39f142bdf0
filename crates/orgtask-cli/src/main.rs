//! orgtask CLI - Org-mode task lists from the command line.

mod backend;
mod commands;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use orgtask_core::{CheckboxStatus, PriorityOp, TodoStatus};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "orgtask")]
#[command(author, version, about = "Org-mode task list CLI")]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(long, global = true, default_value = "human")]
    format: output::OutputFormat,

    /// Store path (defaults to current directory)
    #[arg(long, short = 'C', global = true)]
    path: Option<PathBuf>,

    /// Sync server URL; task commands go through it instead of the local store
    #[arg(long, global = true, env = "ORGTASK_REMOTE")]
    remote: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new task store
    Init,

    /// Replace all tasks with the tasks of an org document
    Import {
        /// Org file to read ("-" for stdin)
        file: PathBuf,
    },

    /// Write all tasks as one org document, in priority order
    Export {
        /// Output file (defaults to stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// List tasks in priority order
    #[command(alias = "ls")]
    List {
        /// Only tasks with this status (NONE, TODO, DONE)
        #[arg(long, short = 's')]
        status: Option<TodoStatus>,
    },

    /// Show one task
    Show {
        /// Task id
        id: String,

        /// Print the raw org text instead
        #[arg(long)]
        raw: bool,
    },

    /// Add a task at the front of the queue
    Add {
        /// Headline text
        #[arg(required = true)]
        headline: Vec<String>,

        /// Initial status (NONE, TODO, DONE)
        #[arg(long, short = 's', default_value = "TODO")]
        status: TodoStatus,

        /// Body text
        #[arg(long, short = 'b')]
        body: Option<String>,

        /// Deadline (YYYY-MM-DD)
        #[arg(long, short = 'd')]
        deadline: Option<String>,
    },

    /// Set the status keyword of a task
    Status {
        /// Task id
        id: String,

        /// New status (NONE, TODO, DONE)
        status: TodoStatus,
    },

    /// Move a task within the priority order
    Move {
        /// Task id
        id: String,

        /// topqueue, up1, down1 or bury
        operation: PriorityOp,
    },

    /// Replace the body of a task
    Body {
        /// Task id
        id: String,

        /// New body text
        #[arg(long, short = 't', conflicts_with = "file")]
        text: Option<String>,

        /// Read the new body from a file ("-" for stdin)
        #[arg(long, short = 'f')]
        file: Option<PathBuf>,
    },

    /// Set or clear the deadline of a task
    Deadline {
        /// Task id
        id: String,

        /// Deadline (YYYY-MM-DD, optionally with weekday and HH:MM)
        #[arg(required_unless_present = "clear")]
        date: Option<String>,

        /// Remove the deadline
        #[arg(long, conflicts_with = "date")]
        clear: bool,
    },

    /// Set the checkbox of one body line
    Check {
        /// Task id
        id: String,

        /// Body line, counting from 0
        line: usize,

        /// Checkbox state
        #[arg(long, short = 's', default_value = "checked")]
        state: CheckState,
    },

    /// Start the sync server
    Serve {
        /// Port to listen on (defaults to config)
        #[arg(long, short = 'p')]
        port: Option<u16>,

        /// Host to bind to (defaults to config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Sync with a remote server
    #[command(subcommand)]
    Remote(RemoteCommands),
}

#[derive(Subcommand)]
enum RemoteCommands {
    /// Pull server changes into the local cache
    Pull,

    /// Replace every task on the server with an org document
    Push {
        /// Org file to read ("-" for stdin)
        file: PathBuf,
    },

    /// List unresolved conflicts
    Conflicts,

    /// Resolve a conflict by keeping one side
    Resolve {
        /// Task id
        id: String,

        /// Side to keep
        #[arg(long, short = 'k')]
        keep: Side,
    },
}

/// Checkbox state as given on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CheckState {
    Checked,
    Unchecked,
    None,
}

impl From<CheckState> for CheckboxStatus {
    fn from(state: CheckState) -> Self {
        match state {
            CheckState::Checked => Self::Checked,
            CheckState::Unchecked => Self::Unchecked,
            CheckState::None => Self::None,
        }
    }
}

/// Side of a conflict to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Side {
    Server,
    Local,
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Determine store path
    let path = match cli.path {
        Some(path) => path,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let remote = cli.remote.as_deref();
    let format = cli.format;

    match cli.command {
        Commands::Init => commands::init(&path, format),
        Commands::Import { file } => commands::import(&path, &file, format),
        Commands::Export { output } => commands::export(&path, output.as_deref()),
        Commands::List { status } => commands::list(&path, remote, status, format),
        Commands::Show { id, raw } => commands::show(&path, remote, &id, raw, format),
        Commands::Add {
            headline,
            status,
            body,
            deadline,
        } => commands::add(
            &path,
            remote,
            &headline.join(" "),
            status,
            body.as_deref(),
            deadline.as_deref(),
            format,
        ),
        Commands::Status { id, status } => commands::status(&path, remote, &id, status, format),
        Commands::Move { id, operation } => {
            commands::move_task(&path, remote, &id, operation, format)
        }
        Commands::Body { id, text, file } => {
            commands::body(&path, remote, &id, text, file.as_deref(), format)
        }
        Commands::Deadline { id, date, clear } => {
            let date = if clear { None } else { date };
            commands::deadline(&path, remote, &id, date.as_deref(), format)
        }
        Commands::Check { id, line, state } => {
            commands::check(&path, remote, &id, line, state.into(), format)
        }
        Commands::Serve { port, host } => commands::serve(&path, host, port),
        Commands::Remote(command) => match command {
            RemoteCommands::Pull => commands::remote_pull(&path, remote, format),
            RemoteCommands::Push { file } => commands::remote_push(&path, remote, &file, format),
            RemoteCommands::Conflicts => commands::remote_conflicts(&path, remote, format),
            RemoteCommands::Resolve { id, keep } => {
                commands::remote_resolve(&path, remote, &id, keep == Side::Server, format)
            }
        },
    }
}
