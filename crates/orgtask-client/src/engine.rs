//! Client-side replica of the task collection and its sync protocol.
//!
//! The engine applies every update to its local collection and cache first,
//! then sends each changed task with the server hash the edit was based on.
//! That base is kept per task until the server accepts the edit, so sends
//! that failed can be retried with [`SyncEngine::resend_pending`] and later
//! edits to the same task still name the server copy they started from.
//!
//! A server that has moved on answers with its own copy; that copy is parked
//! as a [`Conflict`] and the local text is left alone until the user picks
//! a side with [`SyncEngine::accept_server`] or [`SyncEngine::force_local`].

use crate::cache::BlobStore;
use crate::counter::OutstandingCounter;
use crate::error::{Result, SyncError};
use crate::remote::{Remote, SendOutcome};
use orgtask_core::{
    apply_update, now_millis, parse_document, Collection, ContentHasher, Entry, Resolution,
    Sha256Hasher, TaskUpdate, TasksResponse, WireEntry,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Cache key of the local collection.
const TASKS_KEY: &str = "tasks";
/// Cache key of unresolved conflicts.
const CONFLICTS_KEY: &str = "conflicts";
/// Cache key of edits the server hasn't accepted yet.
const PENDING_KEY: &str = "pending";

/// Lifecycle of one exchange with the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeState {
    Pending,
    Committed,
    Conflicted,
    Failed,
}

/// Outcome of sending one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub id: String,
    pub state: ExchangeState,
}

/// A task whose server copy diverged from the copy this client edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub id: String,
    /// Hash this client believed the server held.
    pub base_hash: Option<String>,
    /// The local edit the server rejected.
    pub local: WireEntry,
    /// The server's copy at the time of rejection.
    pub server: WireEntry,
}

/// What a [`SyncEngine::refresh`] changed locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Server collection timestamp seen at the start of the refresh.
    pub server_timestamp: i64,
    /// Tasks replaced by their server copy.
    pub updated: Vec<String>,
    /// Tasks that differ but were left alone because they are in conflict
    /// or carry local edits the server hasn't accepted.
    pub skipped: Vec<String>,
    /// Tasks dropped locally because the server no longer has them.
    pub removed: Vec<String>,
}

/// Client replica of the collection, synced against a [`Remote`].
pub struct SyncEngine<R, B, H = Sha256Hasher> {
    remote: R,
    cache: B,
    hasher: H,
    collection: Collection,
    conflicts: BTreeMap<String, Conflict>,
    /// Unaccepted edits: task id to the server hash the edit was made
    /// against, `None` for a task the server has never had.
    pending: BTreeMap<String, Option<String>>,
    outstanding: OutstandingCounter,
}

impl<R, B> SyncEngine<R, B>
where
    R: Remote,
    B: BlobStore,
{
    /// Engine hashing with SHA-256, the digest the server uses.
    #[must_use]
    pub fn new(remote: R, cache: B) -> Self {
        Self::with_hasher(remote, cache, Sha256Hasher)
    }
}

impl<R, B, H> SyncEngine<R, B, H>
where
    R: Remote,
    B: BlobStore,
    H: ContentHasher,
{
    /// Engine with a custom content hasher.
    ///
    /// The server always hashes with SHA-256 and compares `oldHash` against
    /// that. Any other hasher makes every send look stale to a real server,
    /// so this is only for test doubles that apply the same hasher.
    #[must_use]
    pub fn with_hasher(remote: R, cache: B, hasher: H) -> Self {
        Self {
            remote,
            cache,
            hasher,
            collection: Collection::new(),
            conflicts: BTreeMap::new(),
            pending: BTreeMap::new(),
            outstanding: OutstandingCounter::new(),
        }
    }

    /// The local collection.
    #[must_use]
    pub const fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Local tasks parsed, in priority order.
    ///
    /// # Errors
    /// Returns the first parse error.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        let mut entries = self.collection.parse_entries()?;
        entries.sort_by_key(|e| e.priority);
        Ok(entries)
    }

    /// Handle to the in-flight exchange count.
    #[must_use]
    pub fn outstanding(&self) -> OutstandingCounter {
        self.outstanding.clone()
    }

    /// Unresolved conflicts, by task id.
    #[must_use]
    pub fn conflicts(&self) -> Vec<&Conflict> {
        self.conflicts.values().collect()
    }

    #[must_use]
    pub fn conflict(&self, id: &str) -> Option<&Conflict> {
        self.conflicts.get(id)
    }

    /// Ids of tasks with local edits the server hasn't accepted yet.
    #[must_use]
    pub fn pending(&self) -> Vec<&str> {
        self.pending.keys().map(String::as_str).collect()
    }

    /// Load the cached collection, or fetch the full one if there is none.
    ///
    /// # Errors
    /// Returns error if the cache can't be read or the fetch fails.
    pub async fn load(&mut self) -> Result<()> {
        if let Some(conflicts) = self.cache.get(CONFLICTS_KEY).await? {
            self.conflicts = serde_json::from_str(&conflicts)?;
        }
        if let Some(pending) = self.cache.get(PENDING_KEY).await? {
            self.pending = serde_json::from_str(&pending)?;
        }

        if let Some(cached) = self.cache.get(TASKS_KEY).await? {
            let collection: Collection = serde_json::from_str(&cached)?;
            if collection.last_update_timestamp != 0 || !collection.is_empty() {
                debug!(tasks = collection.len(), "Loaded collection from cache");
                self.collection = collection;
                return Ok(());
            }
        }

        info!("No cached collection, fetching full collection");
        self.collection = self.fetch_full().await?;
        self.save_collection().await
    }

    /// Pull server changes into the local collection.
    ///
    /// Checks the server timestamp first and only diffs when the server is
    /// newer. Tasks with an unresolved conflict or an unaccepted edit are
    /// never overwritten or removed. An unaccepted edit whose text the
    /// server already holds counts as accepted.
    ///
    /// # Errors
    /// Returns error if a fetch fails or the cache can't be written.
    pub async fn refresh(&mut self) -> Result<RefreshReport> {
        let latest = self.fetch(Resolution::Update).await?;
        let mut report = RefreshReport {
            server_timestamp: latest.last_update_timestamp,
            ..RefreshReport::default()
        };

        if latest.last_update_timestamp <= self.collection.last_update_timestamp {
            debug!(
                server = latest.last_update_timestamp,
                local = self.collection.last_update_timestamp,
                "Local collection is current"
            );
            return Ok(report);
        }

        let server_hashes: BTreeMap<String, String> = self
            .fetch(Resolution::Summary)
            .await?
            .summaries
            .unwrap_or_default()
            .into_iter()
            .map(|s| (s.id, s.hash))
            .collect();

        let in_sync = |collection: &Collection, id: &str| {
            server_hashes
                .get(id)
                .is_some_and(|hash| collection.get(id).is_some_and(|local| &local.hash == hash))
        };

        // Sends whose reply was lost but which the server did take.
        let collection = &self.collection;
        self.pending.retain(|id, _| !in_sync(collection, id));

        let held = |id: &String| self.conflicts.contains_key(id) || self.pending.contains_key(id);

        let stale: BTreeSet<String> = server_hashes
            .keys()
            .filter(|id| !in_sync(&self.collection, id.as_str()))
            .cloned()
            .collect();
        let (skipped, wanted): (Vec<String>, Vec<String>) = stale.into_iter().partition(held);
        report.skipped = skipped;

        report.removed = self
            .collection
            .entries
            .keys()
            .filter(|id| !server_hashes.contains_key(*id) && !held(*id))
            .cloned()
            .collect();
        for id in &report.removed {
            self.collection.entries.remove(id);
        }

        if !wanted.is_empty() {
            let mut server = self.fetch_full().await?;
            for id in wanted {
                if let Some(entry) = server.entries.remove(&id) {
                    self.collection.entries.insert(id.clone(), entry);
                    report.updated.push(id);
                }
            }
        }

        self.collection.last_update_timestamp = latest.last_update_timestamp;
        self.save_collection().await?;
        self.save_sync_state().await?;

        info!(
            updated = report.updated.len(),
            skipped = report.skipped.len(),
            removed = report.removed.len(),
            "Refreshed from remote"
        );

        Ok(report)
    }

    /// Apply an update locally, then send every changed task.
    ///
    /// The local collection and cache change before any network traffic, so
    /// a second update to the same task always sees the first. Each task is
    /// sent against the server hash its edits started from, which is the
    /// previous local hash unless an earlier edit is still unaccepted.
    ///
    /// # Errors
    /// Returns error if the update doesn't apply or the cache can't be
    /// written. Transport failures are reported per task as
    /// [`ExchangeState::Failed`].
    pub async fn update_task(&mut self, update: &TaskUpdate) -> Result<Vec<Exchange>> {
        let mutations = apply_update(update, &self.collection)?;
        if mutations.is_empty() {
            debug!(id = update.id(), "Update changed nothing");
            return Ok(Vec::new());
        }

        // The collection timestamp tracks the last server state seen, so
        // local edits don't hide newer server changes from `refresh`.
        let synced_at = self.collection.last_update_timestamp;
        let now = now_millis();
        let mut staged = Vec::with_capacity(mutations.len());
        for mutation in mutations {
            let id = mutation.id.clone();
            let previous = self.collection.stage(mutation, &self.hasher, now);
            // A task with an unaccepted edit keeps the base of that edit.
            let base = self.pending.entry(id.clone()).or_insert(previous).clone();
            staged.push((id, base));
        }
        self.collection.last_update_timestamp = synced_at;
        self.save_collection().await?;
        self.save_sync_state().await?;

        let mut exchanges = Vec::with_capacity(staged.len());
        for (id, base) in staged {
            let Some(entry) = self.collection.get(&id).cloned() else {
                continue;
            };
            exchanges.push(self.send(entry, base).await);
        }
        self.save_sync_state().await?;

        Ok(exchanges)
    }

    /// Send again every unaccepted edit that isn't in conflict.
    ///
    /// # Errors
    /// Returns error if the cache can't be written. Transport failures are
    /// reported per task as [`ExchangeState::Failed`].
    pub async fn resend_pending(&mut self) -> Result<Vec<Exchange>> {
        let queued: Vec<(String, Option<String>)> = self
            .pending
            .iter()
            .filter(|(id, _)| !self.conflicts.contains_key(*id))
            .map(|(id, base)| (id.clone(), base.clone()))
            .collect();

        let mut exchanges = Vec::with_capacity(queued.len());
        for (id, base) in queued {
            let Some(entry) = self.collection.get(&id).cloned() else {
                self.pending.remove(&id);
                continue;
            };
            exchanges.push(self.send(entry, base).await);
        }
        self.save_sync_state().await?;

        if !exchanges.is_empty() {
            info!(sent = exchanges.len(), left = self.pending.len(), "Resent local edits");
        }

        Ok(exchanges)
    }

    /// Replace every task, locally and on the server, with a document.
    ///
    /// The server copy is overwritten without any hash check. Conflicts and
    /// unaccepted edits are dropped since the tasks they refer to are gone.
    /// The server restamps what it stores, so the local copy is then taken
    /// from the server.
    ///
    /// # Errors
    /// Returns error if the document doesn't parse, the cache can't be
    /// written or the upload fails.
    pub async fn replace_tasks(&mut self, document: &str) -> Result<Vec<Entry>> {
        let entries = parse_document(document)?;
        self.collection = Collection::from_entries(&entries, &self.hasher, now_millis());
        // Not a server state yet; the next refresh diffs everything.
        self.collection.last_update_timestamp = 0;
        self.conflicts.clear();
        self.pending.clear();
        self.save_collection().await?;
        self.save_sync_state().await?;

        {
            let _guard = self.outstanding.begin();
            self.remote.replace_all(&self.collection).await?;
        }
        info!(tasks = entries.len(), "Replaced remote collection");

        match self.fetch_full().await {
            Ok(server) => {
                self.collection = server;
                self.save_collection().await?;
            }
            Err(e) => warn!(error = %e, "Could not fetch replaced collection"),
        }

        Ok(entries)
    }

    /// Resolve a conflict by taking the server's copy.
    ///
    /// # Errors
    /// Returns `SyncError::NoConflict` if `id` has no conflict.
    pub async fn accept_server(&mut self, id: &str) -> Result<WireEntry> {
        let conflict = self
            .conflicts
            .remove(id)
            .ok_or_else(|| SyncError::NoConflict(id.to_string()))?;

        self.collection
            .entries
            .insert(conflict.id.clone(), conflict.server.clone());
        self.pending.remove(id);
        self.save_collection().await?;
        self.save_sync_state().await?;

        info!(id, hash = %conflict.server.hash, "Accepted server copy");

        Ok(conflict.server)
    }

    /// Resolve a conflict by resending the local copy over the server's.
    ///
    /// The send is conditional on the server copy recorded in the conflict,
    /// so a server that moved again yields a fresh conflict.
    ///
    /// # Errors
    /// Returns `SyncError::NoConflict` if `id` has no conflict.
    pub async fn force_local(&mut self, id: &str) -> Result<Exchange> {
        let conflict = self
            .conflicts
            .remove(id)
            .ok_or_else(|| SyncError::NoConflict(id.to_string()))?;

        let local = self
            .collection
            .get(id)
            .cloned()
            .unwrap_or_else(|| conflict.local.clone());
        let base = Some(conflict.server.hash.clone());
        self.pending.insert(id.to_string(), base.clone());
        let exchange = self.send(local, base).await;

        // A failed send leaves the conflict for a retry; a second rejection
        // has already been recorded by `send`.
        if exchange.state == ExchangeState::Failed {
            self.conflicts.insert(conflict.id.clone(), conflict);
        }
        self.save_sync_state().await?;

        Ok(exchange)
    }

    /// Send one task against `old_hash`. Only a commit clears its pending
    /// edit.
    async fn send(&mut self, entry: WireEntry, old_hash: Option<String>) -> Exchange {
        let mut exchange = Exchange {
            id: entry.id.clone(),
            state: ExchangeState::Pending,
        };

        let outcome = {
            let _guard = self.outstanding.begin();
            self.remote.send_entry(&entry, old_hash.as_deref()).await
        };

        exchange.state = match outcome {
            Ok(SendOutcome::Committed) => {
                debug!(id = %entry.id, hash = %entry.hash, "Committed");
                self.pending.remove(&entry.id);
                ExchangeState::Committed
            }
            Ok(SendOutcome::Conflicted(server)) => {
                warn!(
                    id = %entry.id,
                    sent = old_hash.as_deref().unwrap_or_default(),
                    server = %server.hash,
                    "Server copy diverged, recording conflict"
                );
                self.conflicts.insert(
                    entry.id.clone(),
                    Conflict {
                        id: entry.id.clone(),
                        base_hash: old_hash,
                        local: entry,
                        server,
                    },
                );
                ExchangeState::Conflicted
            }
            Err(e) => {
                warn!(id = %entry.id, error = %e, "Exchange failed");
                ExchangeState::Failed
            }
        };

        exchange
    }

    async fn fetch(&self, resolution: Resolution) -> Result<TasksResponse> {
        let _guard = self.outstanding.begin();
        self.remote.fetch(resolution).await
    }

    async fn fetch_full(&self) -> Result<Collection> {
        self.fetch(Resolution::Full)
            .await?
            .into_collection()
            .ok_or(SyncError::MissingEntries)
    }

    async fn save_collection(&self) -> Result<()> {
        let json = serde_json::to_string(&self.collection)?;
        self.cache.set(TASKS_KEY, &json).await
    }

    /// Write unaccepted edits and conflicts.
    async fn save_sync_state(&self) -> Result<()> {
        let json = serde_json::to_string(&self.pending)?;
        self.cache.set(PENDING_KEY, &json).await?;

        let json = serde_json::to_string(&self.conflicts)?;
        self.cache.set(CONFLICTS_KEY, &json).await
    }
}
