//! MCP tool implementations.
//!
//! Each tool maps one worker trigger onto a JSON result.

pub mod fetch;
pub mod message;
pub mod status;

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;

use crate::error::ToolError;

pub use fetch::SwFetchParams;
pub use message::SwMessageParams;
pub use status::CacheStatusParams;

/// Wrap a serializable output as a pretty-printed text result.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, ToolError> {
    let json = serde_json::to_string_pretty(output)?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

#[cfg(test)]
pub(crate) mod testing {
    use rmcp::model::CallToolResult;
    use shellcache_client::Worker;
    use shellcache_core::{AppConfig, CacheDb, ManifestConfig};
    use std::sync::Arc;
    use wiremock::MockServer;

    /// Worker whose origin is the mock server, with `index.html` in the shell manifest.
    pub(crate) async fn worker_for(server: &MockServer, generation: &str, db: CacheDb) -> Arc<Worker> {
        let config = AppConfig {
            generation: generation.into(),
            origin: format!("{}/", server.uri()),
            manifest: ManifestConfig { shell: vec!["./index.html".into()], data: Vec::new() },
            ..Default::default()
        };
        Arc::new(Worker::from_config(&config, db).unwrap())
    }

    pub(crate) fn parse<T: serde::de::DeserializeOwned>(result: &CallToolResult) -> T {
        let text = result.content.first().and_then(|c| c.as_text()).map(|t| t.text.clone()).unwrap();
        serde_json::from_str(&text).unwrap()
    }
}
