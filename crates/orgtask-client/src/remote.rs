//! Transport to the authoritative task server.

use crate::error::{Result, SyncError};
use orgtask_core::{Collection, Resolution, TasksResponse, WireEntry};
use reqwest::{Client, Response, StatusCode};
use std::future::Future;
use tracing::debug;

/// Server answer to a single-task write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The server stored the task.
    Committed,
    /// The server's copy moved on; carries that copy.
    Conflicted(WireEntry),
}

/// The remote authority a [`crate::SyncEngine`] syncs against.
pub trait Remote {
    /// Fetch the collection at the given detail level.
    fn fetch(&self, resolution: Resolution) -> impl Future<Output = Result<TasksResponse>> + Send;

    /// Write one task, conditional on `old_hash` when given.
    fn send_entry(
        &self,
        entry: &WireEntry,
        old_hash: Option<&str>,
    ) -> impl Future<Output = Result<SendOutcome>> + Send;

    /// Replace the whole server collection.
    fn replace_all(&self, collection: &Collection) -> impl Future<Output = Result<()>> + Send;
}

/// [`Remote`] over HTTP against `orgtask serve`.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: String,
}

impl HttpRemote {
    /// Remote at `base_url`, e.g. `http://127.0.0.1:8000`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn tasks_url(&self) -> String {
        format!("{}/tasks", self.base_url)
    }
}

impl Remote for HttpRemote {
    async fn fetch(&self, resolution: Resolution) -> Result<TasksResponse> {
        debug!(%resolution, "Fetching tasks");
        let response = self
            .client
            .get(self.tasks_url())
            .query(&[("resolution", resolution.to_string())])
            .send()
            .await?;

        Ok(expect_success(response).await?.json().await?)
    }

    async fn send_entry(&self, entry: &WireEntry, old_hash: Option<&str>) -> Result<SendOutcome> {
        let mut request = self
            .client
            .post(format!("{}/{}", self.tasks_url(), entry.id))
            .json(entry);
        if let Some(old_hash) = old_hash {
            request = request.query(&[("oldHash", old_hash)]);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::CONFLICT {
            return Ok(SendOutcome::Conflicted(response.json().await?));
        }

        expect_success(response).await?;
        Ok(SendOutcome::Committed)
    }

    async fn replace_all(&self, collection: &Collection) -> Result<()> {
        let response = self
            .client
            .put(self.tasks_url())
            .json(collection)
            .send()
            .await?;

        expect_success(response).await?;
        Ok(())
    }
}

async fn expect_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let remote = HttpRemote::new("http://127.0.0.1:8000/");
        assert_eq!(remote.base_url(), "http://127.0.0.1:8000");
        assert_eq!(remote.tasks_url(), "http://127.0.0.1:8000/tasks");
    }
}
