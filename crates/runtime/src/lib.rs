//! Bridge runtime: an LLM conversation driving MCP tools.
//!
//! # Overview
//!
//! - **LlmClient**: owns the conversation history and talks to a completion
//!   [`Backend`] (buffered or streamed).
//! - **ToolHost**: the MCP side; [`mcp::Client`] in production.
//! - **Bridge**: converts discovered tools into function specs and runs the
//!   request / tool-call / follow-up loop.
//! - **BridgeManager**: initializes a bridge for a scoped piece of work and
//!   always closes it afterwards.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use futures::FutureExt;
//! use mcp::{Client, ServerParameters};
//! use notify::Hub;
//! use runtime::{Bridge, BridgeManager, LlmClient, LlmConfig, OpenAiBackend};
//!
//! # async fn example() {
//! let hub = Arc::new(Hub::new());
//! let host = Client::new(ServerParameters::sse("http://localhost:8000/sse"), Arc::clone(&hub));
//! let config = LlmConfig::new("sk-...", "gpt-4o");
//! let backend = OpenAiBackend::builder(&config.api_key).build();
//! let llm = LlmClient::new(backend, config);
//!
//! let manager = BridgeManager::new(Bridge::new(host, llm, hub));
//! let answer = manager
//!     .run(|bridge| bridge.process_message("What's the weather in Oslo?", false).boxed())
//!     .await;
//! println!("{answer}");
//! # }
//! ```

mod bridge;
pub mod config;
mod error;
pub mod llm;
mod manager;
mod tools;

pub use bridge::{
    Bridge, CREATE_TEMPLATE_TOOL, EDIT_TEMPLATE_TOOL, convert_tools, format_result,
    normalize_arguments, sanitize_tool_name,
};
pub use config::{BridgeConfig, LlmConfig};
pub use error::{Error, Result};
pub use llm::{Backend, LlmClient, LlmError, LlmResponse, OpenAiBackend, TokenSink};
pub use manager::BridgeManager;
pub use tools::ToolHost;
