use thiserror::Error;

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to connect to tool server: {0}")]
    Connection(String),

    #[error("bridge is not initialized")]
    NotConnected,

    #[error("cannot dispatch tool call: {0}")]
    ToolDispatch(String),

    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    #[error(transparent)]
    Completion(#[from] LlmError),

    #[error(transparent)]
    Mcp(#[from] mcp::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
