//! cache_status tool implementation.
//!
//! Reports the current generation, its lifecycle state, every store that
//! exists and what the current generation's store holds.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::Worker;
use shellcache_core::StoredEntry;

use super::json_result;

/// Input parameters for cache_status tool (none).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatusParams {}

/// Output structure for cache_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheStatusOutput {
    pub generation: String,
    pub state: String,
    /// All store names, in creation order.
    pub stores: Vec<String>,
    /// Keys of the current generation's store as `METHOD url`.
    pub keys: Vec<String>,
    pub entries: Vec<StoredEntry>,
}

pub async fn status_impl(worker: &Worker, _params: CacheStatusParams) -> Result<CallToolResult, McpError> {
    let manager = worker.manager();
    let db = manager.db();
    let generation = manager.current_generation_name();

    let (keys, entries) = if db.has_store(generation).await? {
        let store = db.open_store(generation).await?;
        let keys = store.keys().await?.iter().map(ToString::to_string).collect();
        (keys, store.entries().await?)
    } else {
        (Vec::new(), Vec::new())
    };

    let output = CacheStatusOutput {
        generation: generation.to_string(),
        state: manager.state().await.to_string(),
        stores: db.store_names().await?,
        keys,
        entries,
    };

    Ok(json_result(&output)?)
}
