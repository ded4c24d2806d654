//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the worker's lifecycle triggers.
use crate::tools::{
    CacheStatusParams, SwFetchParams, SwMessageParams, fetch::fetch_impl, message::message_impl, status::status_impl,
};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use shellcache_client::Worker;
use std::sync::Arc;

/// The main MCP server handler for shellcache.
#[derive(Clone)]
pub struct ShellcacheServer {
    tool_router: ToolRouter<Self>,
    worker: Arc<Worker>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ShellcacheServer {
    /// Create a new server handler around a started worker.
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { tool_router: Self::tool_router(), worker }
    }

    /// Resolve a request the way an intercepted page request would be.
    #[tool(
        description = "Resolve a request through the worker. Returns the response and whether it came from cache, network, fallback or passthrough."
    )]
    async fn sw_fetch(&self, params: Parameters<SwFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    #[tool(description = "Send a client command to the worker. SKIP_WAITING activates an installed generation.")]
    async fn sw_message(&self, params: Parameters<SwMessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.worker, params.0).await
    }

    #[tool(description = "Report the current generation, its lifecycle state, all stores and the current store's keys.")]
    async fn cache_status(&self, params: Parameters<CacheStatusParams>) -> Result<CallToolResult, McpError> {
        status_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for ShellcacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "shellcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
