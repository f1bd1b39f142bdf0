//! Multi-task documents.
//!
//! A small two-state machine cuts a document into fragments at each
//! headline, then every fragment goes through [`parse_entry`]. Text before
//! the first headline is preamble and is dropped.

use crate::entry::{is_headline, parse_entry, set_priority, Entry};
use crate::error::Result;
use crate::lines::Lines;
use std::mem;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseState {
    SeekingHeadline,
    ScanningEntry,
}

/// Cut a document into per-task fragments.
///
/// The last fragment is always flushed, so a document without any headline
/// yields one empty fragment, which [`parse_entry`] rejects.
#[must_use]
pub fn split_fragments(text: &str) -> Vec<String> {
    let mut state = ParseState::SeekingHeadline;
    let mut fragments = Vec::new();
    let mut current = String::new();
    let mut preamble_lines = 0usize;

    for line in text.split_inclusive('\n') {
        match state {
            ParseState::SeekingHeadline => {
                if is_headline(line) {
                    current.push_str(line);
                    state = ParseState::ScanningEntry;
                } else {
                    preamble_lines += 1;
                }
            }
            ParseState::ScanningEntry => {
                if is_headline(line) {
                    fragments.push(mem::take(&mut current));
                }
                current.push_str(line);
            }
        }
    }
    fragments.push(current);

    if preamble_lines > 0 {
        debug!(lines = preamble_lines, "Discarded preamble before first headline");
    }

    fragments
}

/// Parse a whole document into entries with dense priorities.
///
/// # Errors
/// Returns the first fragment's parse error; no fragment is skipped.
pub fn parse_document(text: &str) -> Result<Vec<Entry>> {
    let mut entries = split_fragments(text)
        .into_iter()
        .map(|fragment| parse_entry(Lines::parse(&fragment)))
        .collect::<Result<Vec<_>>>()?;

    renumber_priorities(&mut entries);

    Ok(entries)
}

/// Sort entries by priority and rewrite them as `1..=N`.
///
/// Entries without a priority sort first, in document order.
pub fn renumber_priorities(entries: &mut [Entry]) {
    entries.sort_by_key(|entry| entry.priority);

    for (priority, entry) in (1_i64..).zip(entries.iter_mut()) {
        entry.priority = Some(priority);
        entry.fulltext = set_priority(&entry.fulltext, priority);
    }
}

/// Join fragments back into one document, in the given order.
#[must_use]
pub fn join_fragments<'a>(fragments: impl IntoIterator<Item = &'a str>) -> String {
    let mut document = String::new();
    for fragment in fragments {
        if !document.is_empty() && !document.ends_with('\n') {
            document.push('\n');
        }
        document.push_str(fragment);
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::TodoStatus;
    use crate::error::CoreError;
    use pretty_assertions::assert_eq;

    const DOCUMENT: &str = "#+TITLE: Tasks\n\
\n\
* TODO Second\n\
:PROPERTIES:\n\
:ID:       b\n\
:TimeTrackerPriority:       20\n\
:END:\n\
body b\n\
* DONE First\n\
:PROPERTIES:\n\
:ID:       a\n\
:TimeTrackerPriority:       -5\n\
:END:\n\
* Third\n\
:PROPERTIES:\n\
:ID:       c\n\
:TimeTrackerPriority:       30\n\
:END:\n\
body c\n";

    #[test]
    fn test_split_fragments() {
        let fragments = split_fragments(DOCUMENT);
        assert_eq!(fragments.len(), 3);
        assert!(fragments[0].starts_with("* TODO Second\n"));
        assert!(fragments[0].ends_with("body b\n"));
        assert!(fragments[1].starts_with("* DONE First\n"));
        assert!(fragments[2].ends_with("body c\n"));
    }

    #[test]
    fn test_parse_sorts_and_renumbers() {
        let entries = parse_document(DOCUMENT).unwrap();

        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let priorities: Vec<_> = entries.iter().map(|e| e.priority).collect();
        assert_eq!(priorities, vec![Some(1), Some(2), Some(3)]);

        assert_eq!(entries[0].status, TodoStatus::Done);
        assert!(entries[1].fulltext.contains(":TimeTrackerPriority:       2\n"));
        assert_eq!(entries[1].body, "body b\n");
    }

    #[test]
    fn test_unprioritized_entries_sort_first() {
        let entries = parse_document("* One\n* Two\n").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].headline, "One");
        assert_eq!(entries[0].priority, Some(1));
        assert_eq!(entries[1].headline, "Two");
        assert_eq!(entries[1].priority, Some(2));
        assert_ne!(entries[0].id, entries[1].id);
    }

    #[test]
    fn test_document_without_headline_is_rejected() {
        assert!(matches!(
            parse_document(""),
            Err(CoreError::MalformedHeadline(_))
        ));
        assert!(matches!(
            parse_document("just some notes\nno tasks\n"),
            Err(CoreError::MalformedHeadline(_))
        ));
        assert_eq!(split_fragments("notes\n"), vec![String::new()]);
    }

    #[test]
    fn test_reparse_is_stable() {
        let first = parse_document(DOCUMENT).unwrap();
        let joined = join_fragments(first.iter().map(|e| e.fulltext.as_str()));
        let second = parse_document(&joined).unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.id, b.id);
            assert_eq!(a.headline, b.headline);
            assert_eq!(a.body, b.body);
            assert_eq!(a.priority, b.priority);
        }
        assert_eq!(join_fragments(second.iter().map(|e| e.fulltext.as_str())), joined);
    }

    #[test]
    fn test_join_fragments_terminates_lines() {
        assert_eq!(join_fragments(["* A", "* B\n"]), "* A\n* B\n");
        assert_eq!(join_fragments(Vec::<&str>::new()), "");
    }
}
