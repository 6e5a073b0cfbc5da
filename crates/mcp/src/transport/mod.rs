//! Duplex message channels to an MCP server.
//!
//! A transport carries one JSON-RPC message per `send`, and hands every
//! inbound message to the session through an mpsc receiver. Two kinds are
//! supported, selected by [`ServerParameters`]:
//!
//! - [`StdioTransport`]: a local child process speaking newline-delimited
//!   JSON over stdin/stdout.
//! - [`SseTransport`]: a remote server streaming messages as server-sent
//!   events, accepting ours as HTTP POSTs to the endpoint it announces.

mod sse;
mod stdio;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::Result;

pub use sse::SseTransport;
pub use stdio::StdioTransport;

/// Capacity of the inbound message queue.
pub(crate) const INBOUND_CAPACITY: usize = 256;

/// Maximum size of a single inbound message (1MB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Sending half of a connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver one serialized JSON-RPC message.
    async fn send(&self, message: String) -> Result<()>;

    /// Release the underlying channel. Idempotent.
    async fn close(&self) -> Result<()>;
}

/// An established transport plus its inbound message stream.
pub struct Connection {
    pub transport: Arc<dyn Transport>,
    pub inbound: mpsc::Receiver<String>,
}

/// How to reach the MCP server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum ServerParameters {
    Stdio(StdioParameters),
    Sse(SseParameters),
}

/// Spawn a local server process.
#[derive(Debug, Clone, Deserialize)]
pub struct StdioParameters {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Connect to a remote server over server-sent events.
#[derive(Debug, Clone, Deserialize)]
pub struct SseParameters {
    pub url: String,
    /// Extra HTTP headers sent with the stream request and every POST.
    #[serde(default, alias = "env")]
    pub headers: HashMap<String, String>,
}

impl ServerParameters {
    pub fn stdio(
        command: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::Stdio(StdioParameters {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: HashMap::new(),
        })
    }

    pub fn sse(url: impl Into<String>) -> Self {
        Self::Sse(SseParameters {
            url: url.into(),
            headers: HashMap::new(),
        })
    }
}

impl std::fmt::Display for ServerParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio(p) => write!(f, "stdio({})", p.command),
            Self::Sse(p) => write!(f, "sse({})", p.url),
        }
    }
}

/// Establish the transport described by `params`.
pub async fn connect(params: &ServerParameters) -> Result<Connection> {
    match params {
        ServerParameters::Stdio(p) => {
            let (transport, inbound) = StdioTransport::spawn(p).await?;
            Ok(Connection {
                transport: Arc::new(transport),
                inbound,
            })
        }
        ServerParameters::Sse(p) => {
            let (transport, inbound) = SseTransport::connect(p).await?;
            Ok(Connection {
                transport: Arc::new(transport),
                inbound,
            })
        }
    }
}
