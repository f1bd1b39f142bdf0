//! orgtask-client: Client-side replica and sync engine for orgtask.
//!
//! The engine is constructed explicitly over two collaborators:
//! - a [`Remote`] transport (HTTP via [`HttpRemote`], or any test double)
//! - a [`BlobStore`] cache (on disk via [`FileBlobStore`], or in memory)
//!
//! Hash conflicts are detected and surfaced, never merged automatically.

pub mod cache;
pub mod counter;
pub mod engine;
pub mod error;
pub mod remote;

pub use cache::{BlobStore, FileBlobStore, MemoryBlobStore};
pub use counter::{ExchangeGuard, OutstandingCounter};
pub use engine::{Conflict, Exchange, ExchangeState, RefreshReport, SyncEngine};
pub use error::{Result, SyncError};
pub use remote::{HttpRemote, Remote, SendOutcome};
