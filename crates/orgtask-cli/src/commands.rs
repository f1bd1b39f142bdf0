//! CLI command implementations.

use crate::backend::{Backend, RemoteSession};
use crate::output::{self, OutputFormat, TaskRow};
use anyhow::{Context, Result};
use console::style;
use orgtask_core::{
    entry::deadline_line, parse_date_input, CheckboxStatus, Entry, PriorityOp, TaskUpdate,
    TodoStatus,
};
use orgtask_fs::TaskStore;
use std::io::Read;
use std::path::Path;

/// Initialize a new task store.
pub fn init(path: &Path, format: OutputFormat) -> Result<()> {
    TaskStore::init(path).context("Failed to initialize task store")?;
    output::print_success(
        &format!("Initialized task store at {}", path.display()),
        format,
    )
}

/// Replace the local store with the tasks of an org document.
pub fn import(path: &Path, file: &Path, format: OutputFormat) -> Result<()> {
    let store = TaskStore::open(path).context("Failed to open task store")?;
    let text = read_input(file)?;

    let entries = store
        .import_document(&text)
        .context("Failed to import document")?;

    output::print_success(&format!("Imported {} tasks", entries.len()), format)
}

/// Write the local store as one org document.
pub fn export(path: &Path, target: Option<&Path>) -> Result<()> {
    let store = TaskStore::open(path).context("Failed to open task store")?;
    let document = store.export().context("Failed to export tasks")?;

    match target {
        Some(target) => std::fs::write(target, document)
            .with_context(|| format!("Failed to write {}", target.display()))?,
        None => print!("{document}"),
    }
    Ok(())
}

/// List tasks in priority order.
pub fn list(
    path: &Path,
    remote: Option<&str>,
    status: Option<TodoStatus>,
    format: OutputFormat,
) -> Result<()> {
    let backend = Backend::open(path, remote)?;

    let rows: Vec<TaskRow> = backend
        .entries()
        .context("Failed to list tasks")?
        .iter()
        .filter(|entry| status.is_none_or(|s| entry.status == s))
        .map(TaskRow::from)
        .collect();

    output::print_task_list(&rows, format)
}

/// Show one task.
pub fn show(
    path: &Path,
    remote: Option<&str>,
    id: &str,
    raw: bool,
    format: OutputFormat,
) -> Result<()> {
    let backend = Backend::open(path, remote)?;

    if raw {
        print!("{}", backend.fulltext(id)?);
        return Ok(());
    }

    output::print(&backend.get(id)?, format)
}

/// Add a task at the front of the queue.
pub fn add(
    path: &Path,
    remote: Option<&str>,
    headline: &str,
    status: TodoStatus,
    body: Option<&str>,
    deadline: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let mut text = match status.keyword() {
        Some(keyword) => format!("* {keyword} {headline}\n"),
        None => format!("* {headline}\n"),
    };
    if let Some(deadline) = deadline {
        text.push_str(&deadline_line(parse_date_input(deadline)?));
        text.push('\n');
    }
    if let Some(body) = body {
        text.push_str(body);
        if !body.ends_with('\n') {
            text.push('\n');
        }
    }

    let mut backend = Backend::open(path, remote)?;
    let entry = backend.add(&text).context("Failed to add task")?;

    output::print(&entry, format)
}

/// Set the status keyword of a task.
pub fn status(
    path: &Path,
    remote: Option<&str>,
    id: &str,
    status: TodoStatus,
    format: OutputFormat,
) -> Result<()> {
    apply(path, remote, &TaskUpdate::status(id, status), format)
}

/// Move a task within the priority order.
pub fn move_task(
    path: &Path,
    remote: Option<&str>,
    id: &str,
    operation: PriorityOp,
    format: OutputFormat,
) -> Result<()> {
    apply(path, remote, &TaskUpdate::priority(id, operation), format)
}

/// Replace the body of a task from text, a file or stdin.
pub fn body(
    path: &Path,
    remote: Option<&str>,
    id: &str,
    text: Option<String>,
    file: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let body = match (text, file) {
        (Some(text), _) => text,
        (None, Some(file)) => read_input(file)?,
        (None, None) => read_input(Path::new("-"))?,
    };

    apply(path, remote, &TaskUpdate::body(id, body), format)
}

/// Set or clear the deadline of a task.
pub fn deadline(
    path: &Path,
    remote: Option<&str>,
    id: &str,
    date: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let deadline = date.map(parse_date_input).transpose()?;
    apply(path, remote, &TaskUpdate::deadline(id, deadline), format)
}

/// Set the checkbox of one body line.
pub fn check(
    path: &Path,
    remote: Option<&str>,
    id: &str,
    line: usize,
    status: CheckboxStatus,
    format: OutputFormat,
) -> Result<()> {
    apply(path, remote, &TaskUpdate::checkbox(id, line, status), format)
}

/// Start the sync server.
pub fn serve(path: &Path, host: Option<String>, port: Option<u16>) -> Result<()> {
    let store = TaskStore::open(path).context("Failed to open task store")?;
    let host = host.unwrap_or_else(|| store.config().server.host.clone());
    let port = port.unwrap_or(store.config().server.port);
    drop(store);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { orgtask_server::serve(path, &host, port).await })
}

/// Pull server changes into the local cache.
pub fn remote_pull(path: &Path, remote: Option<&str>, format: OutputFormat) -> Result<()> {
    let mut session = open_remote(path, remote)?;
    let report = session.sync().context("Failed to pull tasks")?;

    for id in &report.skipped {
        eprintln!(
            "{}",
            style(format!("  ! {id} not pulled, it has unsent or conflicting edits")).yellow()
        );
    }
    let unsent = session.pending_count();
    if unsent > 0 {
        eprintln!(
            "{}",
            style(format!("  ! {unsent} local edits still waiting for the server")).yellow()
        );
    }

    output::print_success(
        &format!(
            "Pulled {} changed tasks ({} removed, {} skipped)",
            report.updated.len(),
            report.removed.len(),
            report.skipped.len()
        ),
        format,
    )
}

/// Replace every task on the server with an org document.
pub fn remote_push(
    path: &Path,
    remote: Option<&str>,
    file: &Path,
    format: OutputFormat,
) -> Result<()> {
    let mut session = open_remote(path, remote)?;
    let text = read_input(file)?;

    let entries = session.replace(&text).context("Failed to push tasks")?;

    output::print_success(&format!("Pushed {} tasks", entries.len()), format)
}

/// List unresolved conflicts.
pub fn remote_conflicts(path: &Path, remote: Option<&str>, format: OutputFormat) -> Result<()> {
    let session = open_remote(path, remote)?;
    let conflicts: Vec<_> = session.conflicts().into_iter().cloned().collect();

    if conflicts.is_empty() && matches!(format, OutputFormat::Human) {
        println!("No conflicts.");
        return Ok(());
    }

    output::print_list(&conflicts, format)
}

/// Resolve a conflict by keeping the server copy or the local one.
pub fn remote_resolve(
    path: &Path,
    remote: Option<&str>,
    id: &str,
    keep_server: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut session = open_remote(path, remote)?;

    if keep_server {
        let entry = session
            .accept_server(id)
            .context("Failed to accept server copy")?;
        return output::print(&entry, format);
    }

    let exchange = session.force_local(id).context("Failed to send local copy")?;
    output::report_exchanges(std::slice::from_ref(&exchange));
    output::print(&exchange, format)
}

fn apply(
    path: &Path,
    remote: Option<&str>,
    update: &TaskUpdate,
    format: OutputFormat,
) -> Result<()> {
    let mut backend = Backend::open(path, remote)?;
    let changed: Vec<Entry> = backend
        .update(update)
        .with_context(|| format!("Failed to update task {}", update.id()))?;

    if changed.is_empty() && matches!(format, OutputFormat::Human) {
        println!("{}", style("  Nothing changed.").dim());
        return Ok(());
    }

    output::print_list(&changed, format)
}

/// Session against `--remote`, else the remote named in the store config.
fn open_remote(path: &Path, remote: Option<&str>) -> Result<RemoteSession> {
    let url = match remote {
        Some(url) => url.to_string(),
        None => TaskStore::open(path)
            .context("Failed to open task store")?
            .config()
            .sync
            .remote
            .clone()
            .context("No remote configured; pass --remote or set sync.remote")?,
    };

    RemoteSession::open(path, &url)
}

fn read_input(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }

    std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}
