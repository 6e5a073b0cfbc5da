//! Completion backend abstraction.
//!
//! A backend turns a [`CompletionRequest`] into either a whole
//! [`Completion`] or a stream of [`CompletionDelta`]s. Everything above it
//! (history, tool-call classification, token forwarding) is provider-neutral.

use std::future::Future;

use futures::stream::BoxStream;

use super::errors::LlmError;
use super::types::{Completion, CompletionDelta, CompletionRequest};

/// Stream of completion fragments, ending when the provider signals done.
pub type DeltaStream = BoxStream<'static, Result<CompletionDelta, LlmError>>;

/// Trait for chat-completion providers.
pub trait Backend: Send + Sync {
    /// Request a full completion.
    fn complete(
        &self,
        request: CompletionRequest<'_>,
    ) -> impl Future<Output = Result<Completion, LlmError>> + Send;

    /// Request a completion as incremental deltas.
    fn stream(
        &self,
        request: CompletionRequest<'_>,
    ) -> impl Future<Output = Result<DeltaStream, LlmError>> + Send;
}
