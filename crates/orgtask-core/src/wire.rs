//! Sync wire formats and the task collection held by server and client.

use crate::entry::Entry;
use crate::error::{CoreError, Result};
use crate::hash::ContentHasher;
use crate::parser::join_fragments;
use crate::reorder;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Current time in epoch milliseconds, the unit of every wire timestamp.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Hash and timestamp of one stored task, enough to tell if it is in sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEntrySummary {
    pub id: String,
    pub hash: String,
    /// Epoch milliseconds of the last accepted write.
    pub last_update_timestamp: i64,
}

/// One stored task: the sync unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEntry {
    pub id: String,
    pub hash: String,
    /// Epoch milliseconds of the last accepted write.
    pub last_update_timestamp: i64,
    pub fulltext: String,
}

impl WireEntry {
    /// Build a wire entry, hashing its text.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        fulltext: impl Into<String>,
        hasher: &impl ContentHasher,
        now: i64,
    ) -> Self {
        let fulltext = fulltext.into();
        Self {
            id: id.into(),
            hash: hasher.hash(&fulltext),
            last_update_timestamp: now,
            fulltext,
        }
    }

    #[must_use]
    pub fn summary(&self) -> WireEntrySummary {
        WireEntrySummary {
            id: self.id.clone(),
            hash: self.hash.clone(),
            last_update_timestamp: self.last_update_timestamp,
        }
    }

    /// Parse the stored text.
    ///
    /// # Errors
    /// Returns `CoreError::MalformedHeadline` if the text is not a fragment.
    pub fn parse(&self) -> Result<Entry> {
        Entry::parse(&self.fulltext)
    }

    /// Parse the stored text and check that its `:ID:` names this record.
    ///
    /// Text without an `:ID:` fails too, since parsing gives it a fresh one.
    ///
    /// # Errors
    /// Returns `CoreError::MalformedHeadline` if the text is not a fragment,
    /// or `CoreError::IdMismatch` if the ids differ.
    pub fn check_identity(&self) -> Result<Entry> {
        let entry = self.parse()?;
        if entry.id != self.id {
            return Err(CoreError::IdMismatch {
                expected: self.id.clone(),
                found: entry.id,
            });
        }
        Ok(entry)
    }
}

/// New text for one task, before hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub id: String,
    pub fulltext: String,
}

impl Mutation {
    #[must_use]
    pub fn new(id: impl Into<String>, fulltext: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fulltext: fulltext.into(),
        }
    }
}

/// The full task set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Epoch milliseconds of the last write to any task.
    pub last_update_timestamp: i64,
    pub entries: BTreeMap<String, WireEntry>,
}

/// Result of a conditional single-task write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Write applied; carries the stored record.
    Accepted(WireEntry),
    /// Stored hash differs from the caller's; carries the stored record.
    Conflict(WireEntry),
}

impl Collection {
    /// Empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a collection from parsed entries, all stamped with `now`.
    #[must_use]
    pub fn from_entries(entries: &[Entry], hasher: &impl ContentHasher, now: i64) -> Self {
        let entries = entries
            .iter()
            .map(|e| (e.id.clone(), WireEntry::new(&e.id, &e.fulltext, hasher, now)))
            .collect();

        Self {
            last_update_timestamp: now,
            entries,
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&WireEntry> {
        self.entries.get(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write new text for a task without any hash check.
    ///
    /// Returns the hash the task had before, if it existed.
    pub fn stage(
        &mut self,
        mutation: Mutation,
        hasher: &impl ContentHasher,
        now: i64,
    ) -> Option<String> {
        let previous = self.entries.get(&mutation.id).map(|e| e.hash.clone());
        let entry = WireEntry::new(mutation.id, mutation.fulltext, hasher, now);
        self.entries.insert(entry.id.clone(), entry);
        self.last_update_timestamp = now;
        previous
    }

    /// Check and reseal a collection received from elsewhere.
    ///
    /// Every record must sit under its own id and carry that id in its text.
    /// Hashes are recomputed and every timestamp becomes `now`, so nothing
    /// the sender claimed about versions survives.
    ///
    /// # Errors
    /// Returns `CoreError::IdMismatch` or a parse error for the first bad
    /// record.
    pub fn into_verified(self, hasher: &impl ContentHasher, now: i64) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (key, entry) in self.entries {
            if key != entry.id {
                return Err(CoreError::IdMismatch {
                    expected: key,
                    found: entry.id,
                });
            }
            entry.check_identity()?;
            entries.insert(key, WireEntry::new(entry.id, entry.fulltext, hasher, now));
        }

        Ok(Self {
            last_update_timestamp: now,
            entries,
        })
    }

    /// Write one task if the caller saw the current version.
    ///
    /// The write goes through when `old_hash` is `None`, when the task is
    /// not stored yet, or when `old_hash` equals the stored hash. Otherwise
    /// the stored record is returned as a conflict and nothing changes.
    pub fn upsert_checked(
        &mut self,
        mut entry: WireEntry,
        old_hash: Option<&str>,
        now: i64,
    ) -> UpsertOutcome {
        if let (Some(old_hash), Some(current)) = (old_hash, self.entries.get(&entry.id)) {
            if current.hash != old_hash {
                return UpsertOutcome::Conflict(current.clone());
            }
        }

        entry.last_update_timestamp = now;
        self.entries.insert(entry.id.clone(), entry.clone());
        self.last_update_timestamp = now;
        UpsertOutcome::Accepted(entry)
    }

    /// Priority that puts a new task at the front of the queue.
    ///
    /// # Errors
    /// Returns a parse error if stored text is not a fragment.
    pub fn front_priority(&self) -> Result<i64> {
        reorder::front_priority(self)
    }

    /// Per-task hashes and timestamps.
    #[must_use]
    pub fn summaries(&self) -> Vec<WireEntrySummary> {
        self.entries.values().map(WireEntry::summary).collect()
    }

    /// Parse every stored task.
    ///
    /// # Errors
    /// Returns the first parse error.
    pub fn parse_entries(&self) -> Result<Vec<Entry>> {
        self.entries.values().map(WireEntry::parse).collect()
    }

    /// Response body for `GET /tasks` at the given resolution.
    #[must_use]
    pub fn view(&self, resolution: Resolution) -> TasksResponse {
        let mut response = TasksResponse {
            last_update_timestamp: self.last_update_timestamp,
            summaries: None,
            entries: None,
        };

        match resolution {
            Resolution::Update => {}
            Resolution::Summary => response.summaries = Some(self.summaries()),
            Resolution::Full => response.entries = Some(self.entries.clone()),
        }

        response
    }

    /// All tasks as one document, in priority order.
    ///
    /// # Errors
    /// Returns the first parse error.
    pub fn to_document(&self) -> Result<String> {
        // Emit the stored text, not the reparsed one.
        let mut ordered = Vec::with_capacity(self.entries.len());
        for stored in self.entries.values() {
            ordered.push((stored.parse()?.priority, stored.fulltext.as_str()));
        }
        ordered.sort_by_key(|(priority, _)| *priority);

        Ok(join_fragments(ordered.into_iter().map(|(_, text)| text)))
    }
}

/// Detail level of `GET /tasks`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// Collection timestamp only.
    Update,
    /// Timestamp plus per-task hashes.
    Summary,
    /// Timestamp plus every task.
    #[default]
    Full,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Update => write!(f, "update"),
            Self::Summary => write!(f, "summary"),
            Self::Full => write!(f, "full"),
        }
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "update" => Ok(Self::Update),
            "summary" => Ok(Self::Summary),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown resolution '{other}'")),
        }
    }
}

/// Body of `GET /tasks`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TasksResponse {
    pub last_update_timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summaries: Option<Vec<WireEntrySummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<BTreeMap<String, WireEntry>>,
}

impl TasksResponse {
    /// Turn a `full` response into a collection.
    ///
    /// Returns `None` if the response carries no entries.
    #[must_use]
    pub fn into_collection(self) -> Option<Collection> {
        Some(Collection {
            last_update_timestamp: self.last_update_timestamp,
            entries: self.entries?,
        })
    }
}
