//! Task store management and collection writes.

use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use orgtask_core::entry::set_priority;
use orgtask_core::{
    apply_update, now_millis, parse_document, Collection, Entry, Mutation, Resolution,
    Sha256Hasher, TaskUpdate, TasksResponse, UpsertOutcome, WireEntry,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory name for orgtask state.
const STORE_DIR: &str = ".orgtask";
/// Configuration file name.
const CONFIG_FILE: &str = "config.yml";
/// Collection file name.
const TASKS_FILE: &str = "tasks.json";

/// A task store keeps one collection on the filesystem.
///
/// Every write loads the collection, changes it in memory and replaces the
/// file as a whole. Callers sharing a store across tasks must serialize
/// writes themselves.
#[derive(Debug)]
pub struct TaskStore {
    /// Root path of the store.
    root: PathBuf,
    /// Store configuration.
    config: StoreConfig,
}

impl TaskStore {
    /// Initialize a new store at the given path.
    ///
    /// # Errors
    /// Returns error if a store already exists or IO fails.
    pub fn init(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let store_dir = root.join(STORE_DIR);

        if store_dir.exists() {
            return Err(StoreError::StoreExists(root));
        }

        fs::create_dir_all(&store_dir)?;

        let config = StoreConfig::default();
        fs::write(store_dir.join(CONFIG_FILE), serde_yaml::to_string(&config)?)?;

        let store = Self { root, config };
        store.save(&Collection::new())?;

        info!(path = %store.root.display(), "Initialized task store");

        Ok(store)
    }

    /// Open an existing store at the given path.
    ///
    /// # Errors
    /// Returns error if the store doesn't exist or config is invalid.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        let config_path = root.join(STORE_DIR).join(CONFIG_FILE);

        if !config_path.exists() {
            return Err(StoreError::StoreNotFound(root));
        }

        let config: StoreConfig = serde_yaml::from_str(&fs::read_to_string(&config_path)?)?;

        debug!(path = %root.display(), "Opened task store");

        Ok(Self { root, config })
    }

    /// Get the store root path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the store configuration.
    #[must_use]
    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn tasks_path(&self) -> PathBuf {
        self.root.join(STORE_DIR).join(TASKS_FILE)
    }

    /// Read the whole collection. A missing file reads as empty.
    ///
    /// # Errors
    /// Returns error if the file can't be read or decoded.
    pub fn load(&self) -> Result<Collection> {
        let path = self.tasks_path();
        if !path.exists() {
            return Ok(Collection::new());
        }

        let collection: Collection = serde_json::from_str(&fs::read_to_string(&path)?)?;
        Ok(collection)
    }

    /// The collection at the given detail level.
    ///
    /// # Errors
    /// Returns error if the collection can't be loaded.
    pub fn view(&self, resolution: Resolution) -> Result<TasksResponse> {
        Ok(self.load()?.view(resolution))
    }

    /// Get one stored task.
    ///
    /// # Errors
    /// Returns `StoreError::TaskNotFound` if no task has this id.
    pub fn get(&self, id: &str) -> Result<WireEntry> {
        self.load()?
            .entries
            .remove(id)
            .ok_or_else(|| StoreError::TaskNotFound(id.to_string()))
    }

    /// All tasks parsed, in priority order.
    ///
    /// # Errors
    /// Returns error if the collection can't be loaded or a task fails to parse.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let mut entries = self.load()?.parse_entries()?;
        entries.sort_by_key(|e| e.priority);
        Ok(entries)
    }

    /// Write one task if `old_hash` still matches the stored version.
    ///
    /// The text must parse and carry the record's id in its `:ID:`. The hash
    /// is recomputed from the submitted text, so a stored hash always
    /// describes the stored text. On conflict nothing is written and the
    /// stored record is returned.
    ///
    /// # Errors
    /// Returns `CoreError::MalformedHeadline` or `CoreError::IdMismatch` for
    /// bad text, or error if the collection can't be loaded or saved.
    pub fn upsert(&self, entry: WireEntry, old_hash: Option<&str>) -> Result<UpsertOutcome> {
        entry.check_identity()?;

        let mut collection = self.load()?;
        let now = next_timestamp(&collection);
        let entry = WireEntry::new(entry.id, entry.fulltext, &Sha256Hasher, now);

        let outcome = collection.upsert_checked(entry, old_hash, now);
        match &outcome {
            UpsertOutcome::Accepted(stored) => {
                self.save(&collection)?;
                info!(id = %stored.id, hash = %stored.hash, "Upserted task");
            }
            UpsertOutcome::Conflict(current) => {
                warn!(
                    id = %current.id,
                    stored = %current.hash,
                    old_hash = old_hash.unwrap_or_default(),
                    "Stored hash does not match, rejecting upsert"
                );
            }
        }

        Ok(outcome)
    }

    /// Replace the whole collection without any hash check.
    ///
    /// The sender's hashes and timestamps are discarded: every record is
    /// rehashed and stamped with a server time later than anything stored
    /// before. Returns the collection as stored.
    ///
    /// # Errors
    /// Returns `CoreError::IdMismatch` or a parse error for a bad record, or
    /// error if the file can't be written. Nothing is written on error.
    pub fn replace_all(&self, collection: Collection) -> Result<Collection> {
        let now = next_timestamp(&self.load()?);
        let collection = collection.into_verified(&Sha256Hasher, now)?;
        self.save(&collection)?;
        info!(tasks = collection.len(), "Replaced task collection");
        Ok(collection)
    }

    /// Add one task from its text at the front of the queue.
    ///
    /// # Errors
    /// Returns error if the text is not a task fragment or IO fails.
    pub fn add_task(&self, text: &str) -> Result<WireEntry> {
        let entry = Entry::parse(text)?;
        let mut collection = self.load()?;

        let priority = collection.front_priority()?;
        let fulltext = set_priority(&entry.fulltext, priority);
        let now = next_timestamp(&collection);
        collection.stage(Mutation::new(&entry.id, fulltext), &Sha256Hasher, now);
        self.save(&collection)?;

        info!(id = %entry.id, priority, "Added task");

        collection
            .entries
            .remove(&entry.id)
            .ok_or(StoreError::TaskNotFound(entry.id))
    }

    /// Replace the collection with the tasks of a whole document.
    ///
    /// Priorities are renumbered densely in document priority order.
    ///
    /// # Errors
    /// Returns the first fragment's parse error; nothing is written then.
    pub fn import_document(&self, text: &str) -> Result<Vec<Entry>> {
        let entries = parse_document(text)?;
        let collection = Collection::from_entries(&entries, &Sha256Hasher, now_millis());
        self.replace_all(collection)?;
        Ok(entries)
    }

    /// Apply an update intent directly to the stored collection.
    ///
    /// Returns the stored records that changed.
    ///
    /// # Errors
    /// Returns `StoreError::TaskNotFound` if the target task is missing.
    pub fn apply_update(&self, update: &TaskUpdate) -> Result<Vec<WireEntry>> {
        let mut collection = self.load()?;
        let mutations = apply_update(update, &collection)?;
        if mutations.is_empty() {
            debug!(id = update.id(), "Update changed nothing");
            return Ok(Vec::new());
        }

        let now = next_timestamp(&collection);
        let ids: Vec<String> = mutations.iter().map(|m| m.id.clone()).collect();
        for mutation in mutations {
            collection.stage(mutation, &Sha256Hasher, now);
        }
        self.save(&collection)?;

        info!(id = update.id(), changed = ids.len(), "Applied update");

        Ok(ids
            .iter()
            .filter_map(|id| collection.get(id).cloned())
            .collect())
    }

    /// All tasks as one document, in priority order.
    ///
    /// # Errors
    /// Returns error if the collection can't be loaded or a task fails to parse.
    pub fn export(&self) -> Result<String> {
        Ok(self.load()?.to_document()?)
    }

    // The file is replaced whole via a rename, never edited in place.
    fn save(&self, collection: &Collection) -> Result<()> {
        let path = self.tasks_path();
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_string_pretty(collection)?)?;
        fs::rename(&staging, &path)?;

        debug!(tasks = collection.len(), "Saved collection");

        Ok(())
    }
}

/// Server time for the next write, strictly after the last one stored.
///
/// Clients only pull when the collection timestamp moves forward.
fn next_timestamp(collection: &Collection) -> i64 {
    now_millis().max(collection.last_update_timestamp.saturating_add(1))
}
