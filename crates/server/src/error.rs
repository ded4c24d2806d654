//! Tool-level errors for the shellcache server.
//!
//! Library failures arrive as `shellcache_core::Error` and convert on their
//! own; these cover what only the tool surface can get wrong.

use rmcp::model::{ErrorCode, ErrorData as McpError};

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// A tool argument could not be understood.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Tool output could not be encoded.
    #[error("OUTPUT_FAILED: {0}")]
    Output(String),
}

impl From<ToolError> for McpError {
    fn from(err: ToolError) -> Self {
        let (code, message) = match &err {
            ToolError::InvalidInput(msg) => (-32602, msg.clone()),
            ToolError::Output(msg) => (-32603, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

impl From<serde_json::Error> for ToolError {
    fn from(err: serde_json::Error) -> Self {
        ToolError::Output(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_codes() {
        let mcp: McpError = ToolError::InvalidInput("command".into()).into();
        assert_eq!(mcp.code.0, -32602);
        assert_eq!(mcp.message, "command");

        let mcp: McpError = ToolError::Output("eof".into()).into();
        assert_eq!(mcp.code.0, -32603);
    }

    #[test]
    fn test_display_has_code() {
        assert_eq!(ToolError::InvalidInput("x".into()).to_string(), "INVALID_INPUT: x");
    }
}
