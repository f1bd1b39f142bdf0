//! Where task commands read and write: the local store, or a sync server
//! through a cached replica.

use crate::output;
use anyhow::{bail, Context, Result};
use orgtask_client::{Conflict, Exchange, FileBlobStore, HttpRemote, RefreshReport, SyncEngine};
use orgtask_core::{entry::set_priority, Entry, TaskUpdate};
use orgtask_fs::TaskStore;
use std::path::Path;
use tokio::runtime::Runtime;
use tracing::warn;

/// Cache directory of the remote replica, relative to the store path.
const CACHE_DIR: &str = ".orgtask/cache";

type RemoteEngine = SyncEngine<HttpRemote, FileBlobStore>;

/// A sync engine together with the runtime that drives it.
pub struct RemoteSession {
    runtime: Runtime,
    engine: RemoteEngine,
}

impl RemoteSession {
    /// Load the cached replica for `url`, fetching it when there is none.
    pub fn open(path: &Path, url: &str) -> Result<Self> {
        let runtime = Runtime::new().context("Failed to start async runtime")?;
        let mut engine = SyncEngine::new(
            HttpRemote::new(url),
            FileBlobStore::new(path.join(CACHE_DIR)),
        );
        runtime
            .block_on(engine.load())
            .with_context(|| format!("Failed to load tasks from {url}"))?;

        Ok(Self { runtime, engine })
    }

    pub fn refresh(&mut self) -> Result<RefreshReport> {
        Ok(self.runtime.block_on(self.engine.refresh())?)
    }

    /// Retry local edits the server hasn't accepted yet.
    pub fn resend_pending(&mut self) -> Result<Vec<Exchange>> {
        Ok(self.runtime.block_on(self.engine.resend_pending())?)
    }

    /// Number of local edits still waiting for the server.
    pub fn pending_count(&self) -> usize {
        self.engine.pending().len()
    }

    /// Refresh, then retry unsent edits.
    pub fn sync(&mut self) -> Result<RefreshReport> {
        let report = self.refresh()?;
        let exchanges = self.resend_pending()?;
        output::report_exchanges(&exchanges);
        Ok(report)
    }

    pub fn entries(&self) -> Result<Vec<Entry>> {
        Ok(self.engine.entries()?)
    }

    pub fn conflicts(&self) -> Vec<&Conflict> {
        self.engine.conflicts()
    }

    pub fn update(&mut self, update: &TaskUpdate) -> Result<Vec<Exchange>> {
        Ok(self.runtime.block_on(self.engine.update_task(update))?)
    }

    pub fn replace(&mut self, document: &str) -> Result<Vec<Entry>> {
        Ok(self.runtime.block_on(self.engine.replace_tasks(document))?)
    }

    pub fn accept_server(&mut self, id: &str) -> Result<Entry> {
        let stored = self.runtime.block_on(self.engine.accept_server(id))?;
        Ok(stored.parse()?)
    }

    pub fn force_local(&mut self, id: &str) -> Result<Exchange> {
        Ok(self.runtime.block_on(self.engine.force_local(id))?)
    }

    fn parsed(&self, ids: impl IntoIterator<Item = String>) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for id in ids {
            if let Some(stored) = self.engine.collection().get(&id) {
                entries.push(stored.parse()?);
            }
        }
        Ok(entries)
    }
}

/// Task source for the everyday commands.
pub enum Backend {
    Local(TaskStore),
    Remote(RemoteSession),
}

impl Backend {
    /// The sync server at `remote` when given, otherwise the store at `path`.
    ///
    /// A remote that can't be refreshed is used from its cache. Local edits
    /// that never reached the server are sent again once it answers.
    pub fn open(path: &Path, remote: Option<&str>) -> Result<Self> {
        let Some(url) = remote else {
            let store = TaskStore::open(path).context("Failed to open task store")?;
            return Ok(Self::Local(store));
        };

        let mut session = RemoteSession::open(path, url)?;
        if let Err(e) = session.sync() {
            warn!(error = %e, "Refresh failed, using cached tasks");
        }
        Ok(Self::Remote(session))
    }

    /// All tasks in priority order.
    pub fn entries(&self) -> Result<Vec<Entry>> {
        match self {
            Self::Local(store) => Ok(store.entries()?),
            Self::Remote(session) => session.entries(),
        }
    }

    pub fn get(&self, id: &str) -> Result<Entry> {
        match self {
            Self::Local(store) => Ok(store.get(id)?.parse()?),
            Self::Remote(session) => match session.engine.collection().get(id) {
                Some(stored) => Ok(stored.parse()?),
                None => bail!("Task not found: {id}"),
            },
        }
    }

    /// Raw org text of one task.
    pub fn fulltext(&self, id: &str) -> Result<String> {
        match self {
            Self::Local(store) => Ok(store.get(id)?.fulltext),
            Self::Remote(session) => match session.engine.collection().get(id) {
                Some(stored) => Ok(stored.fulltext.clone()),
                None => bail!("Task not found: {id}"),
            },
        }
    }

    /// Add one task from its text at the front of the queue.
    pub fn add(&mut self, text: &str) -> Result<Entry> {
        match self {
            Self::Local(store) => Ok(store.add_task(text)?.parse()?),
            Self::Remote(session) => {
                let entry = Entry::parse(text)?;
                let priority = session.engine.collection().front_priority()?;
                let entry = Entry::parse(&set_priority(&entry.fulltext, priority))?;

                let exchanges = session.update(&TaskUpdate::new_task(&entry))?;
                output::report_exchanges(&exchanges);
                Ok(entry)
            }
        }
    }

    /// Apply one update; returns the tasks it changed.
    pub fn update(&mut self, update: &TaskUpdate) -> Result<Vec<Entry>> {
        match self {
            Self::Local(store) => {
                let mut entries = Vec::new();
                for stored in store.apply_update(update)? {
                    entries.push(stored.parse()?);
                }
                Ok(entries)
            }
            Self::Remote(session) => {
                let exchanges = session.update(update)?;
                output::report_exchanges(&exchanges);
                session.parsed(exchanges.into_iter().map(|e| e.id))
            }
        }
    }
}
