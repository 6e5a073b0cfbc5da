//! MCP error types.

use crate::protocol::JsonRpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Transport could not be established or the handshake failed.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("not connected to MCP server")]
    NotConnected,

    /// The transport closed while a request was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid message: {0}")]
    InvalidResponse(String),

    #[error("JSON-RPC error: {0}")]
    JsonRpc(#[from] JsonRpcError),

    /// The server executed the tool but flagged the result as an error.
    #[error("tool call failed: {0}")]
    ToolCallFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
