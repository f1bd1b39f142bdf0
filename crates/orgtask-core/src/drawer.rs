//! Property drawer editing.
//!
//! The drawer is the `:PROPERTIES:` ... `:END:` block that sits in the
//! metadata slot of a fragment: the line right after the headline, or the
//! line after the deadline when one is present. Callers pass that slot in.

use crate::lines::Lines;
use regex::Regex;
use std::sync::LazyLock;

/// Opening line of the property drawer.
pub const PROPERTIES_START: &str = ":PROPERTIES:";
/// Closing line of any drawer.
pub const DRAWER_END: &str = ":END:";

static PROPERTY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*:([-_A-Za-z0-9]+): +(.*)$").expect("valid property regex"));

static DRAWER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*:([-_A-Za-z0-9]+):\s*$").expect("valid drawer regex"));

/// Line span of a property drawer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Drawer {
    /// Index of the `:PROPERTIES:` line.
    pub start: usize,
    /// Index of the `:END:` line, if the drawer is closed.
    pub end: Option<usize>,
}

impl Drawer {
    /// Index of the first line after the drawer.
    #[must_use]
    pub fn after(&self, lines: &Lines) -> usize {
        self.end.map_or(lines.len(), |end| end + 1)
    }
}

/// Returns true if the line opens a drawer of any name (but not `:END:`).
#[must_use]
pub fn is_drawer_start(line: &str) -> bool {
    !is_drawer_end(line) && DRAWER_RE.is_match(line)
}

/// Returns true if the line closes a drawer.
#[must_use]
pub fn is_drawer_end(line: &str) -> bool {
    line.trim() == DRAWER_END
}

/// Split a `:NAME: value` line into its name and value.
#[must_use]
pub fn parse_property(line: &str) -> Option<(&str, &str)> {
    let caps = PROPERTY_RE.captures(line)?;
    let name = caps.get(1)?.as_str();
    let value = caps.get(2)?.as_str().trim_end();
    Some((name, value))
}

/// Render a property line in the drawer's column layout.
#[must_use]
pub fn property_line(name: &str, value: &str) -> String {
    format!(":{name}:       {value}")
}

/// Locate the property drawer at `slot`.
#[must_use]
pub fn find_drawer(lines: &Lines, slot: usize) -> Option<Drawer> {
    if lines.content(slot)?.trim() != PROPERTIES_START {
        return None;
    }

    let end = (slot + 1..lines.len()).find(|&i| lines.content(i).is_some_and(is_drawer_end));

    Some(Drawer { start: slot, end })
}

/// All properties in the drawer at `slot`, in document order.
#[must_use]
pub fn properties(lines: &Lines, slot: usize) -> Vec<(String, String)> {
    let Some(drawer) = find_drawer(lines, slot) else {
        return Vec::new();
    };

    (drawer.start + 1..drawer.end.unwrap_or(lines.len()))
        .filter_map(|i| lines.content(i).and_then(parse_property))
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

/// Read one property from the drawer at `slot`.
#[must_use]
pub fn get_property(lines: &Lines, slot: usize, name: &str) -> Option<String> {
    properties(lines, slot)
        .into_iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value)
}

/// Write one property into the drawer at `slot`.
///
/// An existing property line is rewritten in place. A missing property is
/// added just before `:END:`. A missing drawer is inserted at `slot`. A
/// drawer that never closes gets the property and an `:END:` appended.
pub fn set_property(lines: &mut Lines, slot: usize, name: &str, value: &str) {
    let new_line = property_line(name, value);

    let Some(drawer) = find_drawer(lines, slot) else {
        lines.insert(slot, PROPERTIES_START);
        lines.insert(slot + 1, &new_line);
        lines.insert(slot + 2, DRAWER_END);
        return;
    };

    let scan_end = drawer.end.unwrap_or(lines.len());
    for i in drawer.start + 1..scan_end {
        let matches = lines
            .content(i)
            .and_then(parse_property)
            .is_some_and(|(key, _)| key == name);
        if matches {
            lines.replace(i, &new_line);
            return;
        }
    }

    match drawer.end {
        Some(end) => lines.insert(end, &new_line),
        None => {
            let len = lines.len();
            lines.insert(len, &new_line);
            lines.insert(len + 1, DRAWER_END);
        }
    }
}

/// Remove one property from the drawer at `slot`.
///
/// Returns true if a line was removed. The drawer itself is left in place
/// even when it becomes empty.
pub fn remove_property(lines: &mut Lines, slot: usize, name: &str) -> bool {
    let Some(drawer) = find_drawer(lines, slot) else {
        return false;
    };

    let found = (drawer.start + 1..drawer.end.unwrap_or(lines.len())).find(|&i| {
        lines
            .content(i)
            .and_then(parse_property)
            .is_some_and(|(key, _)| key == name)
    });

    match found {
        Some(i) => {
            lines.remove(i);
            true
        }
        None => false,
    }
}
