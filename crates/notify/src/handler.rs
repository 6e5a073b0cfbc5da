//! Observer capability.

use async_trait::async_trait;

use crate::Event;

/// Error returned by a failing handler. Logged by the hub, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// An observer of hub events.
///
/// Synchronous and suspending observers share this one call path; a
/// synchronous observer simply never awaits.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

/// Adapter turning a synchronous closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync,
{
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        (self.0)(event)
    }
}

/// Wrap a closure as a handler.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&Event) -> Result<(), HandlerError> + Send + Sync,
{
    FnHandler(f)
}
