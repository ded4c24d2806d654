//! Core types and shared functionality for shellcache.
//!
//! This crate provides:
//! - Generation-scoped response store with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheStore, CachedResponse, RequestKey, StoredEntry};
pub use config::{AppConfig, ConfigError, ManifestConfig, RouteConfig};
pub use error::Error;
