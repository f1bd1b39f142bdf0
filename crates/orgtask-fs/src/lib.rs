//! Filesystem backend for the orgtask collection.
//!
//! A store is a directory holding:
//! - `.orgtask/config.yml`: Store, server and sync settings
//! - `.orgtask/tasks.json`: The whole collection, replaced on every write

pub mod config;
pub mod error;
pub mod store;

pub use config::{ServerSettings, StoreConfig, StoreSettings, SyncSettings};
pub use error::{Result, StoreError};
pub use store::TaskStore;
