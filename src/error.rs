//! Error types for the homologacion MCP server.
//!
//! Tool execution errors are returned with `is_error: true` in CallToolResult,
//! while protocol errors (invalid tool name, malformed args) are handled by rmcp.
//! Session absence or expiry is never an error; the tool adapters report it
//! as a structured payload instead.

use rmcp::model::{CallToolResult, Content};
use thiserror::Error;

/// Tool execution errors - returned with is_error: true in CallToolResult
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Table '{0}' does not exist")]
    TableNotFound(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Only SELECT queries are allowed, got: {0}")]
    NonSelectQuery(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Upstream returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

impl ToolError {
    /// Convert to MCP CallToolResult with is_error: true
    pub fn to_tool_result(&self) -> CallToolResult {
        CallToolResult {
            content: vec![Content::text(self.to_string())],
            is_error: Some(true),
            meta: None,
            structured_content: None,
        }
    }
}

impl From<tokio_postgres::Error> for ToolError {
    fn from(e: tokio_postgres::Error) -> Self {
        ToolError::Database(e.to_string())
    }
}

impl From<reqwest::Error> for ToolError {
    fn from(e: reqwest::Error) -> Self {
        ToolError::Http(e.to_string())
    }
}
