//! Output formatting for the CLI.

use anyhow::Result;
use console::style;
use orgtask_client::{Conflict, Exchange, ExchangeState};
use orgtask_core::{format_datetime, Entry, TodoStatus};
use serde::Serialize;
use std::fmt::Write;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    #[default]
    Human,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

/// Print output in the specified format.
pub fn print<T: Serialize + HumanDisplay>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => println!("{}", value.human_display()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

/// Print a list in the specified format.
pub fn print_list<T: Serialize + HumanDisplay>(values: &[T], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Human => {
            for value in values {
                println!("{}", value.human_display());
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(values)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(values)?),
    }
    Ok(())
}

/// Print task rows with dynamic column widths.
pub fn print_task_list(rows: &[TaskRow], format: OutputFormat) -> Result<()> {
    if !matches!(format, OutputFormat::Human) {
        return print_list(rows, format);
    }

    if rows.is_empty() {
        println!("No tasks found.");
        return Ok(());
    }

    let id_width = rows.iter().map(|r| r.id.len()).max().unwrap_or(2).max(2);
    let deadline_width = rows
        .iter()
        .map(|r| r.deadline.as_ref().map_or(1, String::len))
        .max()
        .unwrap_or(1)
        .max(8);

    println!(
        "{:>5}  {:<id_width$}  {:<6}  {:<deadline_width$}  HEADLINE",
        "PRIO", "ID", "STATUS", "DEADLINE"
    );
    println!("{}", "-".repeat(id_width + deadline_width + 40));

    for row in rows {
        let priority = row.priority.map_or_else(|| "-".to_string(), |p| p.to_string());
        let deadline = row.deadline.as_deref().unwrap_or("-");
        println!(
            "{priority:>5}  {:<id_width$}  {}  {deadline:<deadline_width$}  {}",
            row.id,
            styled_status(row.status),
            row.headline,
        );
    }

    Ok(())
}

/// Print a success message.
pub fn print_success(message: &str, format: OutputFormat) -> Result<()> {
    let status = serde_json::json!({ "status": "ok", "message": message });
    match format {
        OutputFormat::Human => println!("{message}"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&status)?),
    }
    Ok(())
}

/// Warn on stderr about sends that did not commit.
pub fn report_exchanges(exchanges: &[Exchange]) {
    for exchange in exchanges {
        match exchange.state {
            ExchangeState::Committed | ExchangeState::Pending => {}
            ExchangeState::Conflicted => eprintln!(
                "{}",
                style(format!(
                    "  ! {} changed on the server; see `orgtask remote conflicts`",
                    exchange.id
                ))
                .red()
                .bold()
            ),
            ExchangeState::Failed => eprintln!(
                "{}",
                style(format!(
                    "  ! {} was saved locally but not sent to the server",
                    exchange.id
                ))
                .yellow()
            ),
        }
    }
}

fn styled_status(status: TodoStatus) -> String {
    let text = format!("{:<6}", status.to_string());
    match status {
        TodoStatus::Todo => style(text).yellow().to_string(),
        TodoStatus::Done => style(text).green().to_string(),
        TodoStatus::None => style(text).dim().to_string(),
    }
}

/// Trait for human-readable display.
pub trait HumanDisplay {
    fn human_display(&self) -> String;
}

impl HumanDisplay for Entry {
    fn human_display(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "ID:        {}", self.id);
        let _ = writeln!(out, "Headline:  {}", self.headline);
        let _ = writeln!(out, "Status:    {}", styled_status(self.status).trim_end());

        if let Some(priority) = self.priority {
            let _ = writeln!(out, "Priority:  {priority}");
        }

        if let Some(deadline) = self.deadline {
            let _ = writeln!(out, "Deadline:  {}", format_datetime(deadline));
        }

        if !self.body.trim().is_empty() {
            let _ = writeln!(out, "Body:");
            for line in self.body.lines() {
                let _ = writeln!(out, "  {line}");
            }
        }

        out
    }
}

impl HumanDisplay for Conflict {
    fn human_display(&self) -> String {
        let mut out = String::new();

        let _ = writeln!(out, "{}", style(format!("Conflict on {}", self.id)).red().bold());
        let _ = writeln!(
            out,
            "  sent against: {}",
            self.base_hash.as_deref().unwrap_or("(none)")
        );
        let _ = writeln!(out, "  server hash:  {}", self.server.hash);
        let _ = writeln!(out, "  --- local");
        for line in self.local.fulltext.lines() {
            let _ = writeln!(out, "  {line}");
        }
        let _ = writeln!(out, "  --- server");
        for line in self.server.fulltext.lines() {
            let _ = writeln!(out, "  {line}");
        }

        out
    }
}

impl HumanDisplay for Exchange {
    fn human_display(&self) -> String {
        let state = match self.state {
            ExchangeState::Pending => style("pending").dim(),
            ExchangeState::Committed => style("committed").green(),
            ExchangeState::Conflicted => style("conflicted").red(),
            ExchangeState::Failed => style("failed").yellow(),
        };
        format!("{} {state}", self.id)
    }
}

/// One line of `orgtask list`.
#[derive(Debug, Serialize)]
pub struct TaskRow {
    pub id: String,
    pub status: TodoStatus,
    pub priority: Option<i64>,
    pub deadline: Option<String>,
    pub headline: String,
}

impl From<&Entry> for TaskRow {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id.clone(),
            status: entry.status,
            priority: entry.priority,
            deadline: entry.deadline.map(format_datetime),
            headline: entry.headline.clone(),
        }
    }
}

impl HumanDisplay for TaskRow {
    fn human_display(&self) -> String {
        format!("{} {} {}", self.id, self.status, self.headline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_task_row_from_entry() {
        let entry = Entry::parse("* TODO Pay rent\nDEADLINE: <2025-03-07 Fri>\n").unwrap();
        let row = TaskRow::from(&entry);
        assert_eq!(row.status, TodoStatus::Todo);
        assert_eq!(row.deadline.as_deref(), Some("2025-03-07 Fri"));
        assert_eq!(row.headline, "Pay rent");
        assert_eq!(row.human_display(), format!("{} TODO Pay rent", entry.id));
    }

    #[test]
    fn test_entry_display_lists_body() {
        let entry = Entry::parse("* Buy milk\nGet 2%\n").unwrap();
        let text = entry.human_display();
        assert!(text.contains("Headline:  Buy milk"));
        assert!(text.contains("  Get 2%\n"));
        assert!(!text.contains("Deadline"));
    }
}
