//! Single task fragments: parsing into an [`Entry`] and line-level edits.
//!
//! A fragment looks like:
//!
//! ```text
//! * TODO Buy milk
//! DEADLINE: <2025-03-07 Fri>
//! :PROPERTIES:
//! :ID:       0b6f...
//! :TimeTrackerPriority:       3
//! :END:
//! Get 2%
//! ```
//!
//! The text is the source of truth. Every edit below splices the existing
//! lines and leaves anything it does not manage untouched.

use crate::checkbox::{set_checkbox_status, CheckboxStatus};
use crate::date::{format_datetime, parse_datetime, DATETIME_PATTERN};
use crate::drawer::{self, is_drawer_end, is_drawer_start};
use crate::error::{CoreError, Result};
use crate::lines::Lines;
use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::debug;
use uuid::Uuid;

/// Property holding the task identity.
pub const ID_PROPERTY: &str = "ID";
/// Property holding the task order key.
pub const PRIORITY_PROPERTY: &str = "TimeTrackerPriority";

static HEADLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\*+) (?:(TODO|DONE) )?(.*)$").expect("valid headline regex")
});

static STATUS_EDIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\*+) +(?:(?:TODO|DONE) )? *(.*)$").expect("valid status regex")
});

static DEADLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^DEADLINE: <(?P<token>{DATETIME_PATTERN})>"))
        .expect("valid deadline regex")
});

/// TODO keyword state of a headline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TodoStatus {
    /// No keyword.
    #[default]
    None,
    Todo,
    Done,
}

impl TodoStatus {
    /// Keyword as written in the headline.
    #[must_use]
    pub const fn keyword(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Todo => Some("TODO"),
            Self::Done => Some("DONE"),
        }
    }

    fn from_keyword(keyword: Option<&str>) -> Self {
        match keyword {
            Some("TODO") => Self::Todo,
            Some("DONE") => Self::Done,
            _ => Self::None,
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword().unwrap_or("NONE"))
    }
}

impl FromStr for TodoStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" | "" => Ok(Self::None),
            "TODO" => Ok(Self::Todo),
            "DONE" => Ok(Self::Done),
            _ => Err(CoreError::InvalidStatus(s.to_string())),
        }
    }
}

/// Parsed view of one task fragment.
///
/// `fulltext` is authoritative; the other fields are derived from it and
/// can always be re-derived with [`Entry::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Stable identity, stored in the `:ID:` property.
    pub id: String,

    /// Headline text without stars or keyword.
    pub headline: String,

    /// TODO keyword state.
    pub status: TodoStatus,

    /// Deadline from the line right after the headline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<NaiveDateTime>,

    /// Order key from the priority property. `None` when unset; an unset
    /// priority is never a valid order key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    /// Lines after the metadata, with drawers stripped.
    pub body: String,

    /// The complete fragment text.
    pub fulltext: String,
}

impl Entry {
    /// Parse fragment text into an entry.
    ///
    /// Synthesizes an `:ID:` property when the fragment has none, so the
    /// returned `fulltext` can differ from the input.
    ///
    /// # Errors
    /// Returns `CoreError::MalformedHeadline` if the first line is not a
    /// headline.
    pub fn parse(fulltext: &str) -> Result<Self> {
        parse_entry(Lines::parse(fulltext))
    }

    /// Write the structured fields back into `fulltext`.
    ///
    /// Each field that differs from what the text currently says is spliced
    /// in with the matching line edit; unmanaged lines pass through.
    ///
    /// # Errors
    /// Returns `CoreError::MalformedHeadline` if `fulltext` no longer parses.
    pub fn serialize(&self) -> Result<String> {
        let current = Self::parse(&self.fulltext)?;
        let mut text = current.fulltext;

        if current.headline != self.headline || current.status != self.status {
            text = set_headline(&text, self.status, &self.headline);
        }
        if current.deadline != self.deadline {
            text = set_deadline(&text, self.deadline);
        }
        if current.id != self.id {
            text = edit_drawer(&text, |lines, slot| {
                drawer::set_property(lines, slot, ID_PROPERTY, &self.id);
            });
        }
        if current.priority != self.priority {
            text = match self.priority {
                Some(value) => set_priority(&text, value),
                None => edit_drawer(&text, |lines, slot| {
                    drawer::remove_property(lines, slot, PRIORITY_PROPERTY);
                }),
            };
        }
        if current.body != self.body {
            text = replace_body(&text, &self.body);
        }

        Ok(text)
    }
}

/// Generate a fresh task identity.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Returns true if the line is a headline.
#[must_use]
pub fn is_headline(line: &str) -> bool {
    HEADLINE_RE.is_match(line.strip_suffix('\n').unwrap_or(line))
}

/// Deadline from the second line, if that line is a deadline annotation.
#[must_use]
pub fn deadline_of(lines: &Lines) -> Option<NaiveDateTime> {
    let caps = DEADLINE_RE.captures(lines.content(1)?)?;
    parse_datetime(caps.name("token")?.as_str())
}

/// Index where the property drawer belongs: right after the headline, or
/// after the deadline line when there is one.
#[must_use]
pub fn metadata_slot(lines: &Lines) -> usize {
    if deadline_of(lines).is_some() { 2 } else { 1 }
}

/// Index of the first body line, past the headline, deadline and drawer.
#[must_use]
pub fn first_body_line(lines: &Lines) -> usize {
    let slot = metadata_slot(lines);
    drawer::find_drawer(lines, slot)
        .map_or(slot, |d| d.after(lines))
        .min(lines.len())
}

/// Indices of body lines, skipping any drawer blocks.
#[must_use]
pub fn body_line_indices(lines: &Lines) -> Vec<usize> {
    let mut in_drawer = false;
    let mut indices = Vec::new();

    for i in metadata_slot(lines).min(lines.len())..lines.len() {
        let line = lines.content(i).unwrap_or_default();
        if in_drawer {
            if is_drawer_end(line) {
                in_drawer = false;
            }
        } else if is_drawer_start(line) {
            in_drawer = true;
        } else {
            indices.push(i);
        }
    }

    indices
}

/// Build an entry from the lines of one fragment.
///
/// # Errors
/// Returns `CoreError::MalformedHeadline` if there are no lines or the
/// first line is not a headline.
pub fn parse_entry(mut lines: Lines) -> Result<Entry> {
    let first = lines.content(0).unwrap_or_default().to_string();
    let caps = HEADLINE_RE
        .captures(&first)
        .ok_or_else(|| CoreError::MalformedHeadline(first.clone()))?;
    let status = TodoStatus::from_keyword(caps.get(2).map(|m| m.as_str()));
    let headline = caps.get(3).map_or("", |m| m.as_str()).to_string();

    let len = lines.len();
    if len > 2 && lines.raw(len - 1) == Some("\n") && lines.raw(len - 2) == Some("\n") {
        lines.pop();
    }

    let deadline = deadline_of(&lines);
    let slot = metadata_slot(&lines);

    let id = if let Some(id) = drawer::get_property(&lines, slot, ID_PROPERTY) {
        id
    } else {
        let id = new_id();
        debug!(id = %id, headline = %headline, "No entry ID found; adding one");
        drawer::set_property(&mut lines, slot, ID_PROPERTY, &id);
        id
    };

    let priority = drawer::get_property(&lines, slot, PRIORITY_PROPERTY)
        .and_then(|value| value.trim().parse::<i64>().ok());

    let body = body_line_indices(&lines)
        .into_iter()
        .filter_map(|i| lines.raw(i))
        .collect::<String>();

    Ok(Entry {
        id,
        headline,
        status,
        deadline,
        priority,
        body,
        fulltext: lines.to_text(),
    })
}

/// Set the priority property on fragment text.
#[must_use]
pub fn set_priority(fulltext: &str, value: i64) -> String {
    edit_drawer(fulltext, |lines, slot| {
        drawer::set_property(lines, slot, PRIORITY_PROPERTY, &value.to_string());
    })
}

/// Rewrite only the keyword token of the headline.
#[must_use]
pub fn set_todo_status(fulltext: &str, status: TodoStatus) -> String {
    edit_headline(fulltext, |stars, rest| match status.keyword() {
        Some(keyword) => format!("{stars} {keyword} {rest}"),
        None => format!("{stars} {rest}"),
    })
}

/// Rewrite the headline keyword and text, keeping the stars.
#[must_use]
pub fn set_headline(fulltext: &str, status: TodoStatus, headline: &str) -> String {
    edit_headline(fulltext, |stars, _| match status.keyword() {
        Some(keyword) => format!("{stars} {keyword} {headline}"),
        None => format!("{stars} {headline}"),
    })
}

/// Insert, overwrite or (with `None`) remove the deadline line.
#[must_use]
pub fn set_deadline(fulltext: &str, deadline: Option<NaiveDateTime>) -> String {
    let mut lines = Lines::parse(fulltext);
    let present = lines.content(1).is_some_and(|l| DEADLINE_RE.is_match(l));

    match (deadline, present) {
        (None, true) => {
            lines.remove(1);
        }
        (None, false) => {}
        (Some(value), true) => lines.replace(1, &deadline_line(value)),
        (Some(value), false) => lines.insert(1.min(lines.len()), &deadline_line(value)),
    }

    lines.to_text()
}

/// Render the deadline annotation line.
#[must_use]
pub fn deadline_line(value: NaiveDateTime) -> String {
    format!("DEADLINE: <{}>", format_datetime(value))
}

/// Replace everything after the metadata with `new_body`.
#[must_use]
pub fn replace_body(fulltext: &str, new_body: &str) -> String {
    let mut lines = Lines::parse(fulltext);
    lines.truncate(first_body_line(&lines));
    lines.append_text(new_body);
    lines.to_text()
}

/// Set the checkbox state of one body line.
///
/// `body_line` counts lines of [`Entry::body`], i.e. with drawers skipped.
///
/// # Errors
/// Returns `CoreError::LineOutOfRange` if the body has no such line.
pub fn set_body_checkbox(
    id: &str,
    fulltext: &str,
    body_line: usize,
    status: CheckboxStatus,
) -> Result<String> {
    let mut lines = Lines::parse(fulltext);
    let index = body_line_indices(&lines)
        .get(body_line)
        .copied()
        .ok_or_else(|| CoreError::LineOutOfRange {
            id: id.to_string(),
            line: body_line,
        })?;

    let updated = set_checkbox_status(lines.content(index).unwrap_or_default(), status);
    lines.replace(index, &updated);
    Ok(lines.to_text())
}

fn edit_drawer(fulltext: &str, edit: impl FnOnce(&mut Lines, usize)) -> String {
    let mut lines = Lines::parse(fulltext);
    let slot = metadata_slot(&lines).min(lines.len());
    edit(&mut lines, slot);
    lines.to_text()
}

fn edit_headline(fulltext: &str, render: impl FnOnce(&str, &str) -> String) -> String {
    let mut lines = Lines::parse(fulltext);
    let Some(first) = lines.content(0) else {
        return fulltext.to_string();
    };
    let Some(caps) = STATUS_EDIT_RE.captures(first) else {
        return fulltext.to_string();
    };

    let updated = render(&caps[1], &caps[2]);
    lines.replace(0, &updated);
    lines.to_text()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    const TASK: &str = "* TODO Write report\n\
DEADLINE: <2025-03-07 Fri>\n\
:PROPERTIES:\n\
:ID:       task-1\n\
:TimeTrackerPriority:       4\n\
:END:\n\
First line\n\
- [ ] sub item\n";

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_full_entry() {
        let entry = Entry::parse(TASK).unwrap();

        assert_eq!(entry.id, "task-1");
        assert_eq!(entry.headline, "Write report");
        assert_eq!(entry.status, TodoStatus::Todo);
        assert_eq!(entry.deadline, Some(date(2025, 3, 7)));
        assert_eq!(entry.priority, Some(4));
        assert_eq!(entry.body, "First line\n- [ ] sub item\n");
        assert_eq!(entry.fulltext, TASK);
    }

    #[test]
    fn test_new_task_gets_id() {
        let entry = Entry::parse("* Buy milk\nGet 2%\n").unwrap();

        assert_eq!(entry.status, TodoStatus::None);
        assert_eq!(entry.headline, "Buy milk");
        assert!(!entry.id.is_empty());
        assert_eq!(entry.priority, None);
        assert_eq!(entry.body, "Get 2%\n");
        assert_eq!(
            entry.fulltext,
            format!("* Buy milk\n:PROPERTIES:\n:ID:       {}\n:END:\nGet 2%\n", entry.id)
        );
    }

    #[test]
    fn test_id_is_stable_once_written() {
        let first = Entry::parse("* Buy milk\n").unwrap();
        let second = Entry::parse(&first.fulltext).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.fulltext, second.fulltext);
    }

    #[test]
    fn test_id_goes_after_deadline() {
        let entry = Entry::parse("* Pay rent\nDEADLINE: <2025-03-07 Fri>\n").unwrap();
        assert_eq!(entry.deadline, Some(date(2025, 3, 7)));
        assert!(entry
            .fulltext
            .starts_with("* Pay rent\nDEADLINE: <2025-03-07 Fri>\n:PROPERTIES:\n"));
        assert_eq!(Entry::parse(&entry.fulltext).unwrap().id, entry.id);
    }

    #[test]
    fn test_malformed_headline() {
        let err = Entry::parse("not a headline\n").unwrap_err();
        assert!(matches!(err, CoreError::MalformedHeadline(line) if line == "not a headline"));

        assert!(matches!(
            Entry::parse(""),
            Err(CoreError::MalformedHeadline(_))
        ));
        assert!(matches!(
            Entry::parse("*no space\n"),
            Err(CoreError::MalformedHeadline(_))
        ));
    }

    #[test]
    fn test_deadline_only_read_from_second_line() {
        let entry = Entry::parse(
            "* Task\n:PROPERTIES:\n:ID:       x\n:END:\nDEADLINE: <2025-03-07 Fri>\n",
        )
        .unwrap();
        assert_eq!(entry.deadline, None);
        assert_eq!(entry.body, "DEADLINE: <2025-03-07 Fri>\n");
    }

    #[test]
    fn test_body_strips_drawers() {
        let entry = Entry::parse(
            "* Task\n:PROPERTIES:\n:ID:       x\n:END:\nbefore\n:LOGBOOK:\nCLOCK: stuff\n:END:\nafter\n",
        )
        .unwrap();
        assert_eq!(entry.body, "before\nafter\n");
    }

    #[test]
    fn test_unset_priority_is_none() {
        let entry = Entry::parse("* Task\n:PROPERTIES:\n:ID:       x\n:TimeTrackerPriority:       soon\n:END:\n").unwrap();
        assert_eq!(entry.priority, None);
    }

    #[test]
    fn test_trims_trailing_double_blank_line() {
        let entry = Entry::parse("* Task\n:PROPERTIES:\n:ID:       x\n:END:\nbody\n\n\n").unwrap();
        assert_eq!(entry.fulltext, "* Task\n:PROPERTIES:\n:ID:       x\n:END:\nbody\n\n");

        let single = Entry::parse("* Task\n:PROPERTIES:\n:ID:       x\n:END:\nbody\n\n").unwrap();
        assert_eq!(single.fulltext, "* Task\n:PROPERTIES:\n:ID:       x\n:END:\nbody\n\n");
    }

    #[test]
    fn test_set_todo_status() {
        let done = set_todo_status(TASK, TodoStatus::Done);
        assert!(done.starts_with("* DONE Write report\nDEADLINE"));
        assert_eq!(done.lines().skip(1).collect::<Vec<_>>(), TASK.lines().skip(1).collect::<Vec<_>>());

        let none = set_todo_status(&done, TodoStatus::None);
        assert!(none.starts_with("* Write report\n"));

        let todo = set_todo_status("** Nested\n", TodoStatus::Todo);
        assert_eq!(todo, "** TODO Nested\n");
    }

    #[test]
    fn test_set_priority_keeps_other_lines() {
        let updated = set_priority(TASK, -2);
        assert_eq!(updated, TASK.replace(":TimeTrackerPriority:       4", ":TimeTrackerPriority:       -2"));
    }

    #[test]
    fn test_set_deadline() {
        let cleared = set_deadline(TASK, None);
        assert!(cleared.starts_with("* TODO Write report\n:PROPERTIES:\n"));
        assert_eq!(Entry::parse(&cleared).unwrap().deadline, None);

        let added = set_deadline(&cleared, Some(date(2026, 1, 2)));
        assert!(added.starts_with("* TODO Write report\nDEADLINE: <2026-01-02 Fri>\n:PROPERTIES:"));

        let moved = set_deadline(&added, Some(date(2026, 1, 5)));
        assert_eq!(moved, added.replace("2026-01-02 Fri", "2026-01-05 Mon"));

        assert_eq!(set_deadline("* Bare", None), "* Bare");
        assert_eq!(
            set_deadline("* Bare", Some(date(2025, 3, 7))),
            "* Bare\nDEADLINE: <2025-03-07 Fri>\n"
        );
    }

    #[test]
    fn test_replace_body() {
        let updated = replace_body(TASK, "Only line\n");
        let entry = Entry::parse(&updated).unwrap();
        assert_eq!(entry.body, "Only line\n");
        assert_eq!(entry.id, "task-1");
        assert_eq!(entry.priority, Some(4));
        assert_eq!(entry.deadline, Some(date(2025, 3, 7)));

        let headline_only = replace_body("* Bare", "text");
        assert_eq!(headline_only, "* Bare\ntext");
    }

    #[test]
    fn test_set_body_checkbox() {
        let checked = set_body_checkbox("task-1", TASK, 1, CheckboxStatus::Checked).unwrap();
        assert_eq!(Entry::parse(&checked).unwrap().body, "First line\n- [X] sub item\n");

        let listed = set_body_checkbox("task-1", TASK, 0, CheckboxStatus::Unchecked).unwrap();
        assert_eq!(Entry::parse(&listed).unwrap().body, "- [ ] First line\n- [ ] sub item\n");

        let err = set_body_checkbox("task-1", TASK, 5, CheckboxStatus::Checked).unwrap_err();
        assert!(matches!(err, CoreError::LineOutOfRange { line: 5, .. }));
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut entry = Entry::parse(TASK).unwrap();
        entry.headline = "Write the report".to_string();
        entry.status = TodoStatus::Done;
        entry.deadline = None;
        entry.priority = Some(9);
        entry.body = "Rewritten\n".to_string();

        let text = entry.serialize().unwrap();
        let reparsed = Entry::parse(&text).unwrap();

        assert_eq!(reparsed.id, entry.id);
        assert_eq!(reparsed.headline, entry.headline);
        assert_eq!(reparsed.status, entry.status);
        assert_eq!(reparsed.deadline, entry.deadline);
        assert_eq!(reparsed.priority, entry.priority);
        assert_eq!(reparsed.body, entry.body);
    }

    #[test]
    fn test_serialize_unchanged_is_identity() {
        let entry = Entry::parse(TASK).unwrap();
        assert_eq!(entry.serialize().unwrap(), TASK);
    }

    #[test]
    fn test_serialize_keeps_unmanaged_lines() {
        let text = "* Task\n:PROPERTIES:\n:ID:       x\n:Effort:       2h\n:END:\nbody\n";
        let mut entry = Entry::parse(text).unwrap();
        entry.priority = Some(1);
        let out = entry.serialize().unwrap();
        assert_eq!(
            out,
            "* Task\n:PROPERTIES:\n:ID:       x\n:Effort:       2h\n:TimeTrackerPriority:       1\n:END:\nbody\n"
        );

        entry.fulltext = out;
        entry.priority = None;
        assert_eq!(entry.serialize().unwrap(), text);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("todo".parse::<TodoStatus>().unwrap(), TodoStatus::Todo);
        assert_eq!("DONE".parse::<TodoStatus>().unwrap(), TodoStatus::Done);
        assert_eq!("none".parse::<TodoStatus>().unwrap(), TodoStatus::None);
        assert!("later".parse::<TodoStatus>().is_err());
    }
}
