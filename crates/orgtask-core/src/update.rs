//! Update intents and their text mutations.
//!
//! Every change a client can make to the task set is one [`TaskUpdate`].
//! [`apply_update`] turns it into the new text of each affected task,
//! without touching the collection itself.

use crate::checkbox::CheckboxStatus;
use crate::entry::{
    replace_body, set_body_checkbox, set_deadline, set_todo_status, Entry, TodoStatus,
};
use crate::error::{CoreError, Result};
use crate::reorder::{reorder_task, PriorityOp};
use crate::wire::{Collection, Mutation, WireEntry};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

/// Wire tags of the known intents.
const UPDATE_TYPES: &[&str] = &[
    "newTodo",
    "todoValue",
    "priority",
    "replaceBody",
    "setDeadline",
    "setCheckbox",
];

/// A single change to the task set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TaskUpdate {
    /// Add a task with the given text.
    #[serde(rename = "newTodo")]
    NewTask { id: String, fulltext: String },

    /// Rewrite the headline keyword.
    #[serde(rename = "todoValue")]
    SetStatus { id: String, status: TodoStatus },

    /// Move the task within the order.
    #[serde(rename = "priority")]
    SetPriority { id: String, operation: PriorityOp },

    /// Replace everything after the metadata.
    #[serde(rename = "replaceBody")]
    ReplaceBody {
        id: String,
        #[serde(alias = "newBody")]
        body: String,
    },

    /// Set or clear the deadline line.
    #[serde(rename = "setDeadline")]
    SetDeadline {
        id: String,
        deadline: Option<NaiveDateTime>,
    },

    /// Set the checkbox of one body line.
    #[serde(rename = "setCheckbox")]
    SetCheckbox {
        id: String,
        line: usize,
        status: CheckboxStatus,
    },
}

impl TaskUpdate {
    #[must_use]
    pub fn new_task(entry: &Entry) -> Self {
        Self::NewTask {
            id: entry.id.clone(),
            fulltext: entry.fulltext.clone(),
        }
    }

    #[must_use]
    pub fn status(id: impl Into<String>, status: TodoStatus) -> Self {
        Self::SetStatus {
            id: id.into(),
            status,
        }
    }

    #[must_use]
    pub fn priority(id: impl Into<String>, operation: PriorityOp) -> Self {
        Self::SetPriority {
            id: id.into(),
            operation,
        }
    }

    #[must_use]
    pub fn body(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self::ReplaceBody {
            id: id.into(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn deadline(id: impl Into<String>, deadline: Option<NaiveDateTime>) -> Self {
        Self::SetDeadline {
            id: id.into(),
            deadline,
        }
    }

    #[must_use]
    pub fn checkbox(id: impl Into<String>, line: usize, status: CheckboxStatus) -> Self {
        Self::SetCheckbox {
            id: id.into(),
            line,
            status,
        }
    }

    /// Id of the task the intent targets.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::NewTask { id, .. }
            | Self::SetStatus { id, .. }
            | Self::SetPriority { id, .. }
            | Self::ReplaceBody { id, .. }
            | Self::SetDeadline { id, .. }
            | Self::SetCheckbox { id, .. } => id,
        }
    }

    /// Decode an intent from JSON.
    ///
    /// # Errors
    /// Returns `CoreError::UnknownUpdateType` for an unknown `type` tag,
    /// `CoreError::UnknownOperation` for an unknown priority operation, and
    /// `CoreError::Json` for any other malformed payload.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;

        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        if !UPDATE_TYPES.contains(&kind) {
            return Err(CoreError::UnknownUpdateType(kind.to_string()));
        }

        if kind == "priority" {
            if let Some(op) = value.get("operation").and_then(Value::as_str) {
                PriorityOp::from_str(op)?;
            }
        }

        Ok(serde_json::from_value(value)?)
    }
}

/// Compute the new text of every task `update` touches.
///
/// # Errors
/// Returns `CoreError::NotFound` if the target task is missing, and
/// propagates reordering and checkbox errors.
pub fn apply_update(update: &TaskUpdate, collection: &Collection) -> Result<Vec<Mutation>> {
    let mutations = match update {
        TaskUpdate::NewTask { id, fulltext } => vec![Mutation::new(id, fulltext)],
        TaskUpdate::SetStatus { id, status } => {
            let entry = lookup(collection, id)?;
            vec![Mutation::new(id, set_todo_status(&entry.fulltext, *status))]
        }
        TaskUpdate::SetPriority { id, operation } => reorder_task(collection, id, *operation)?,
        TaskUpdate::ReplaceBody { id, body } => {
            let entry = lookup(collection, id)?;
            vec![Mutation::new(id, replace_body(&entry.fulltext, body))]
        }
        TaskUpdate::SetDeadline { id, deadline } => {
            let entry = lookup(collection, id)?;
            vec![Mutation::new(id, set_deadline(&entry.fulltext, *deadline))]
        }
        TaskUpdate::SetCheckbox { id, line, status } => {
            let entry = lookup(collection, id)?;
            vec![Mutation::new(
                id,
                set_body_checkbox(id, &entry.fulltext, *line, *status)?,
            )]
        }
    };

    Ok(mutations)
}

fn lookup<'a>(collection: &'a Collection, id: &str) -> Result<&'a WireEntry> {
    collection
        .get(id)
        .ok_or_else(|| CoreError::NotFound(id.to_string()))
}
