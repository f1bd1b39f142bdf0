//! HTTP sync server for an orgtask store.
//!
//! Serves one collection to any number of clients. Single-task writes carry
//! the hash the client last saw and are rejected with 409 and the stored copy
//! when the task has moved on since.

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use orgtask_core::{Collection, CoreError, Resolution, TasksResponse, UpsertOutcome, WireEntry};
use orgtask_fs::{StoreError, TaskStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Server state shared across handlers.
///
/// The store file is replaced whole on every write, so writes go through the
/// mutex one at a time.
struct AppState {
    store: Mutex<TaskStore>,
}

/// Start the sync server.
///
/// # Errors
/// Returns error if the store can't be opened, binding fails or the server
/// encounters an error.
pub async fn serve(store_path: &std::path::Path, host: &str, port: u16) -> Result<()> {
    let store = TaskStore::open(store_path)?;
    let app = router(store);

    let addr = format!("{host}:{port}");
    info!(address = %addr, store = %store_path.display(), "Starting sync server");

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Routes over an opened store.
pub fn router(store: TaskStore) -> Router {
    let state = Arc::new(AppState {
        store: Mutex::new(store),
    });

    Router::new()
        .route("/health", get(health))
        .route("/tasks", get(get_tasks).put(replace_tasks).post(new_task))
        .route("/tasks/{id}", post(upsert_task))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

// --- Request/Response types ---

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Debug, Deserialize)]
struct TasksQuery {
    #[serde(default)]
    resolution: Resolution,
}

#[derive(Debug, Deserialize)]
struct UpsertQuery {
    #[serde(default, rename = "oldHash", alias = "oldhash")]
    old_hash: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Problems with the request itself.
#[derive(Debug, Error)]
enum RequestError {
    #[error("task id '{body}' in body does not match '{path}' in path")]
    IdMismatch { path: String, body: String },

    #[error("request body is empty")]
    EmptyBody,
}

// --- Handlers ---

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TasksQuery>,
) -> Result<Json<TasksResponse>, AppError> {
    let store = state.store.lock().await;
    Ok(Json(store.view(query.resolution)?))
}

async fn upsert_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<UpsertQuery>,
    body: String,
) -> Result<Response, AppError> {
    let entry: WireEntry = serde_json::from_str(&body)?;
    if entry.id != id {
        return Err(RequestError::IdMismatch {
            path: id,
            body: entry.id,
        }
        .into());
    }

    let store = state.store.lock().await;
    let response = match store.upsert(entry, query.old_hash.as_deref())? {
        UpsertOutcome::Accepted(stored) => Json(stored).into_response(),
        UpsertOutcome::Conflict(current) => {
            warn!(id = %current.id, "Sending 409 with stored copy");
            (StatusCode::CONFLICT, Json(current)).into_response()
        }
    };

    Ok(response)
}

/// Hashes and timestamps in the body are ignored; the store reseals every
/// record so clients holding an older collection see it as changed.
async fn replace_tasks(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<StatusCode, AppError> {
    let collection: Collection = serde_json::from_str(&body)?;

    let store = state.store.lock().await;
    store.replace_all(collection)?;

    Ok(StatusCode::OK)
}

async fn new_task(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<WireEntry>, AppError> {
    if body.trim().is_empty() {
        return Err(RequestError::EmptyBody.into());
    }

    let store = state.store.lock().await;
    Ok(Json(store.add_task(&body)?))
}

// --- Error handling ---

struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        if self.0.is::<RequestError>() || self.0.is::<serde_json::Error>() {
            return StatusCode::BAD_REQUEST;
        }

        match self.0.downcast_ref::<StoreError>() {
            Some(StoreError::TaskNotFound(_)) => StatusCode::NOT_FOUND,
            Some(StoreError::Core(core)) => core_status(core),
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

const fn core_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::MalformedHeadline(_)
        | CoreError::InvalidDate(_)
        | CoreError::InvalidStatus(_)
        | CoreError::UnknownUpdateType(_)
        | CoreError::UnknownOperation(_)
        | CoreError::IdMismatch { .. }
        | CoreError::PriorityOverflow(_)
        | CoreError::LineOutOfRange { .. }
        | CoreError::Json(_) => StatusCode::BAD_REQUEST,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response<Body> {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, "Request failed");
        }

        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use orgtask_core::{hash_text, Sha256Hasher};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const DOCUMENT: &str = "* TODO One\nbody\n* Two\n";

    fn setup() -> (TempDir, Router, TaskStore) {
        let tmp = TempDir::new().unwrap();
        let store = TaskStore::init(tmp.path()).unwrap();
        store.import_document(DOCUMENT).unwrap();
        let app = router(TaskStore::open(tmp.path()).unwrap());
        (tmp, app, store)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn task_text(id: &str, headline: &str) -> String {
        format!("* {headline}\n:PROPERTIES:\n:ID:       {id}\n:END:\n")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn with_body(method: &str, uri: &str, body: String) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_tmp, app, _) = setup();
        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_get_tasks_resolutions() {
        let (_tmp, app, _) = setup();

        let (status, update) = send(&app, get("/tasks?resolution=update")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(update["lastUpdateTimestamp"].as_i64().unwrap() > 0);
        assert!(update.get("summaries").is_none());
        assert!(update.get("entries").is_none());

        let (_, summary) = send(&app, get("/tasks?resolution=summary")).await;
        assert_eq!(summary["summaries"].as_array().unwrap().len(), 2);

        let (_, full) = send(&app, get("/tasks")).await;
        assert_eq!(full["entries"].as_object().unwrap().len(), 2);

        let (status, _) = send(&app, get("/tasks?resolution=everything")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upsert_conflict_returns_stored_copy() {
        let (_tmp, app, store) = setup();
        let original = store.load().unwrap().entries.into_values().next().unwrap();
        let h0 = original.hash.clone();

        // Another client moves the task to H1.
        let elsewhere = task_text(&original.id, "Changed elsewhere");
        let out_of_band = WireEntry::new(&original.id, &elsewhere, &Sha256Hasher, 0);
        let uri = format!("/tasks/{}?oldHash={h0}", original.id);
        let request = with_body("POST", &uri, serde_json::to_string(&out_of_band).unwrap());
        let (status, accepted) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let h1 = hash_text(&elsewhere);
        assert_eq!(accepted["hash"], h1);

        // This client still believes H0.
        let local = task_text(&original.id, "Local edit");
        let local = WireEntry::new(&original.id, local, &Sha256Hasher, 0);
        let request = with_body("POST", &uri, serde_json::to_string(&local).unwrap());
        let (status, conflict) = send(&app, request).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(conflict["hash"], h1);
        assert_eq!(conflict["fulltext"], elsewhere);

        assert_eq!(store.get(&original.id).unwrap().hash, h1);
    }

    #[tokio::test]
    async fn test_upsert_accepts_lowercase_old_hash() {
        let (_tmp, app, store) = setup();
        let original = store.load().unwrap().entries.into_values().next().unwrap();

        let edit = task_text(&original.id, "Edited");
        let edit = WireEntry::new(&original.id, edit, &Sha256Hasher, 0);
        let uri = format!("/tasks/{}?oldhash=stale", original.id);
        let request = with_body("POST", &uri, serde_json::to_string(&edit).unwrap());
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_upsert_rejects_bad_requests() {
        let (_tmp, app, _) = setup();

        let (status, _) = send(&app, with_body("POST", "/tasks/abc", "not json".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let entry = WireEntry::new("other", task_text("other", "Task"), &Sha256Hasher, 0);
        let request = with_body("POST", "/tasks/abc", serde_json::to_string(&entry).unwrap());
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("does not match"));
    }

    #[tokio::test]
    async fn test_upsert_rejects_text_that_does_not_carry_its_id() {
        let (_tmp, app, store) = setup();
        let before = store.load().unwrap();

        let orphan = WireEntry::new("abc", "* Orphan\n", &Sha256Hasher, 0);
        let request = with_body("POST", "/tasks/abc", serde_json::to_string(&orphan).unwrap());
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("expected 'abc'"));

        let moved = WireEntry::new("abc", task_text("xyz", "Moved"), &Sha256Hasher, 0);
        let request = with_body("POST", "/tasks/abc", serde_json::to_string(&moved).unwrap());
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let junk = WireEntry::new("abc", "no headline here\n", &Sha256Hasher, 0);
        let request = with_body("POST", "/tasks/abc", serde_json::to_string(&junk).unwrap());
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(store.load().unwrap(), before);
        assert_eq!(store.export().unwrap(), before.to_document().unwrap());
    }

    #[tokio::test]
    async fn test_new_task() {
        let (_tmp, app, store) = setup();

        let (status, created) =
            send(&app, with_body("POST", "/tasks", "* Buy milk\nGet 2%\n".to_string())).await;
        assert_eq!(status, StatusCode::OK);

        let id = created["id"].as_str().unwrap();
        let entry = store.get(id).unwrap().parse().unwrap();
        assert_eq!(entry.headline, "Buy milk");
        assert_eq!(entry.priority, Some(0));
        assert_eq!(store.entries().unwrap()[0].id, id);

        let request = with_body("POST", "/tasks", "no headline\n".to_string());
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, with_body("POST", "/tasks", String::new())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_replace_tasks_is_unconditional() {
        let (_tmp, app, store) = setup();

        let mut replacement = Collection::new();
        replacement.last_update_timestamp = 7;
        let entry = WireEntry::new("solo", task_text("solo", "Solo"), &Sha256Hasher, 7);
        replacement.entries.insert(entry.id.clone(), entry);

        let request = with_body("PUT", "/tasks", serde_json::to_string(&replacement).unwrap());
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let stored = store.load().unwrap();
        assert_eq!(stored.entries.keys().collect::<Vec<_>>(), vec!["solo"]);
        assert_eq!(stored.get("solo").unwrap().fulltext, task_text("solo", "Solo"));
    }

    #[tokio::test]
    async fn test_replace_tasks_reseals_records() {
        let (_tmp, app, store) = setup();
        let before = store.load().unwrap().last_update_timestamp;

        // A client clock far behind the server, and a hash that isn't one.
        let mut replacement = Collection::new();
        replacement.last_update_timestamp = 7;
        let mut entry = WireEntry::new("solo", task_text("solo", "Solo"), &Sha256Hasher, 7);
        entry.hash = "bogus".to_string();
        replacement.entries.insert(entry.id.clone(), entry);

        let request = with_body("PUT", "/tasks", serde_json::to_string(&replacement).unwrap());
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);

        let (_, update) = send(&app, get("/tasks?resolution=update")).await;
        assert!(update["lastUpdateTimestamp"].as_i64().unwrap() > before);

        let (_, summary) = send(&app, get("/tasks?resolution=summary")).await;
        assert_eq!(summary["summaries"][0]["hash"], hash_text(&task_text("solo", "Solo")));
    }

    #[tokio::test]
    async fn test_replace_tasks_rejects_orphan_text() {
        let (_tmp, app, store) = setup();
        let before = store.load().unwrap();

        let mut replacement = Collection::new();
        let entry = WireEntry::new("solo", "* Solo\n", &Sha256Hasher, 0);
        replacement.entries.insert(entry.id.clone(), entry);

        let request = with_body("PUT", "/tasks", serde_json::to_string(&replacement).unwrap());
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.load().unwrap(), before);
    }
}
