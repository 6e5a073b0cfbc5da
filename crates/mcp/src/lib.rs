//! MCP (Model Context Protocol) client library.
//!
//! This crate provides a client for MCP tool servers reached either as a
//! local child process (stdio) or as a remote server-sent-events endpoint.
//! Inbound notifications are pumped continuously in the background and
//! forwarded to per-method handlers and the process-wide [`notify::Hub`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcp::{Client, ServerParameters};
//! use notify::Hub;
//!
//! # async fn example() -> mcp::Result<()> {
//! let params = ServerParameters::stdio("mcp-filesystem", ["--root", "./workspace"]);
//! let mut client = Client::new(params, Arc::new(Hub::new()));
//! client.connect().await?;
//!
//! for tool in client.list_tools().await? {
//!     println!("Tool: {}", tool.name);
//! }
//!
//! let output = client
//!     .call_tool("read_file", serde_json::json!({ "path": "./README.md" }))
//!     .await?;
//! println!("{output:?}");
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod protocol;
pub mod sse;
pub mod transport;

pub use client::Client;
pub use error::{Error, Result};
pub use protocol::{
    CallToolParams, Inbound, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION,
    RequestId, ServerInfo, Tool, ToolContent, ToolOutput,
};
pub use transport::{
    Connection, ServerParameters, SseParameters, SseTransport, StdioParameters, StdioTransport,
    Transport,
};
