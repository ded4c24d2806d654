//! SQLite-backed store for generation-scoped response snapshots.
//!
//! Each deploy names one generation; a generation owns a store, and a store
//! maps request keys to fully buffered responses. Access is async via
//! tokio-rusqlite. It supports:
//!
//! - Named stores that can be listed and dropped as a unit
//! - Request keys hashed with SHA-256
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod key;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use key::RequestKey;
pub use store::{CacheStore, CachedResponse, StoredEntry};
