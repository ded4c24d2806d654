//! sw_fetch tool implementation.
//!
//! Resolves one request through the worker exactly as an intercepted page
//! request would be: classified, answered by its strategy, or passed through.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shellcache_client::{CacheMode, Request, RequestMode, Worker};

use super::json_result;

/// Input parameters for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchParams {
    /// Absolute URL to request.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Cache mode: "default", "no-store", "reload", "no-cache",
    /// "force-cache" or "only-if-cached".
    #[serde(default)]
    pub cache: Option<String>,

    /// Request mode: "cors" (default), "same-origin", "no-cors" or "navigate".
    #[serde(default)]
    pub mode: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SwFetchOutput {
    /// "cache", "network", "fallback" or "passthrough".
    pub source: String,
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// Cross-origin no-cors response; body is withheld.
    pub opaque: bool,
    pub content_type: Option<String>,
    pub body: Option<String>,
}

pub async fn fetch_impl(worker: &Worker, params: SwFetchParams) -> Result<CallToolResult, McpError> {
    let mut request = Request::parse(&params.method, &params.url)?;
    if let Some(cache) = params.cache.as_deref() {
        request = request.with_cache(cache.parse::<CacheMode>()?);
    }
    if let Some(mode) = params.mode.as_deref() {
        request = request.with_mode(mode.parse::<RequestMode>()?);
    }

    let resolved = worker.fetch(&request).await?;
    let response = resolved.response;
    let opaque = response.is_opaque();

    let output = SwFetchOutput {
        source: resolved.source.to_string(),
        status: response.status.as_u16(),
        content_type: response.content_type().map(str::to_string),
        body: (!opaque).then(|| String::from_utf8_lossy(&response.body).into_owned()),
        url: response.url,
        opaque,
    };

    Ok(json_result(&output)?)
}
