//! sw_message tool implementation.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::{Command, Worker};

use super::json_result;
use crate::error::ToolError;

/// Input parameters for sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwMessageParams {
    /// Command name (`SKIP_WAITING`) or its JSON message form
    /// (`{"type":"SKIP_WAITING"}`).
    pub command: String,
}

/// Output structure for sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwMessageOutput {
    pub generation: String,
    /// Lifecycle state after the command ran.
    pub state: String,
    /// Whether this command triggered an activation.
    pub activated: bool,
    /// Generations deleted by that activation.
    pub deleted: Vec<String>,
}

pub async fn message_impl(worker: &Worker, params: SwMessageParams) -> Result<CallToolResult, McpError> {
    let command: Command = params
        .command
        .parse()
        .map_err(|e: shellcache_core::Error| ToolError::InvalidInput(e.to_string()))?;

    let report = worker.on_message(command).await?;
    let manager = worker.manager();

    let output = SwMessageOutput {
        generation: manager.current_generation_name().to_string(),
        state: manager.state().await.to_string(),
        activated: report.is_some(),
        deleted: report.map(|r| r.deleted).unwrap_or_default(),
    };

    Ok(json_result(&output)?)
}
