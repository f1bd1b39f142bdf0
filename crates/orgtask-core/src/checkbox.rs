//! Checkbox list items (`- [ ] text`, `1. [X] text`).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

static CHECKBOX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\s*(?:[-+*]|\d+[.)])) (\[.*?\]) (.*)$").expect("valid checkbox regex")
});

static LIST_ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\s*(?:[-+*]|\d+[.)])) (.*)$").expect("valid list item regex"));

/// Checkbox state of a single line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckboxStatus {
    /// No checkbox token on the line.
    #[default]
    None,
    /// `[ ]`, or any bracket token other than `[X]`.
    Unchecked,
    /// `[X]`.
    Checked,
}

impl CheckboxStatus {
    const fn token(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Unchecked => "[ ]",
            Self::Checked => "[X]",
        }
    }
}

impl fmt::Display for CheckboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Unchecked => write!(f, "unchecked"),
            Self::Checked => write!(f, "checked"),
        }
    }
}

/// Checkbox state of a line.
#[must_use]
pub fn checkbox_status(line: &str) -> CheckboxStatus {
    match CHECKBOX_RE.captures(line) {
        None => CheckboxStatus::None,
        Some(caps) if &caps[2] == "[X]" => CheckboxStatus::Checked,
        Some(_) => CheckboxStatus::Unchecked,
    }
}

/// Text after the checkbox token, or the whole line when there is none.
#[must_use]
pub fn checkbox_text(line: &str) -> &str {
    CHECKBOX_RE
        .captures(line)
        .and_then(|caps| caps.get(3))
        .map_or(line, |m| m.as_str())
}

/// Turn a plain line into a `- ` list item, keeping its indent.
#[must_use]
pub fn make_list_item(line: &str) -> String {
    let text = line.trim_start();
    let indent = &line[..line.len() - text.len()];
    format!("{indent}- {text}")
}

/// Rewrite a line so it carries the given checkbox state.
///
/// Setting `None` strips the token and leaves the bullet. Setting a checked
/// or unchecked state on a plain line turns it into a list item first.
#[must_use]
pub fn set_checkbox_status(line: &str, status: CheckboxStatus) -> String {
    let (prefix, text) = if let Some(caps) = CHECKBOX_RE.captures(line) {
        (caps[1].to_string(), caps[3].to_string())
    } else if status == CheckboxStatus::None {
        return line.to_string();
    } else if let Some(caps) = LIST_ITEM_RE.captures(line) {
        (caps[1].to_string(), caps[2].to_string())
    } else {
        return set_checkbox_status(&make_list_item(line), status);
    };

    match status {
        CheckboxStatus::None => format!("{prefix} {text}"),
        _ => format!("{prefix} {} {text}", status.token()),
    }
}
