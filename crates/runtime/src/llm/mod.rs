pub mod backend;
pub mod client;
pub mod errors;
pub mod openai;
pub mod stream;
pub mod types;

pub use backend::{Backend, DeltaStream};
pub use client::{LlmClient, TokenSink};
pub use errors::LlmError;
pub use openai::{OpenAiBackend, OpenAiBackendBuilder};
pub use stream::StreamAccumulator;
pub use types::{
    CallShape, Completion, CompletionDelta, CompletionRequest, FinishReason, FunctionCall,
    FunctionSpec, LlmResponse, Message, PendingToolCall, RawArguments, Role, ShapeError, ToolCall,
    ToolCallDelta, ToolResult, ToolSpec, empty_parameters,
};
