//! Handler registry and dispatch.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock};

use futures::FutureExt;
use tracing::{debug, warn};

use crate::{Event, EventClass, EventHandler};

type Handlers = Vec<Arc<dyn EventHandler>>;

/// Registry of observers, one ordered list per event class.
///
/// Shared by reference (`Arc<Hub>`) between the bridge, the tool client's
/// inbound pump and whoever installs observers. Emission only reads the
/// registry, so the pump can emit concurrently with the main flow.
#[derive(Default)]
pub struct Hub {
    handlers: RwLock<HashMap<EventClass, Handlers>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the list for `class`.
    pub fn register(&self, class: EventClass, handler: impl EventHandler + 'static) {
        self.register_arc(class, Arc::new(handler));
    }

    /// Append an already shared handler to the list for `class`.
    pub fn register_arc(&self, class: EventClass, handler: Arc<dyn EventHandler>) {
        debug!(?class, "register: called");
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        handlers.entry(class).or_default().push(handler);
    }

    /// Number of handlers registered for `class`.
    pub fn handler_count(&self, class: &EventClass) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        handlers.get(class).map_or(0, Vec::len)
    }

    /// Drop every registered handler.
    pub fn clear(&self) {
        debug!("clear: called");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Deliver `event` to every handler of its class, in registration order.
    ///
    /// Each handler is awaited before the next one runs, so side effects
    /// (terminal output) stay ordered relative to later emits. Errors and
    /// panics inside a handler are logged and swallowed.
    pub async fn emit(&self, event: &Event) {
        let class = event.class();
        // Snapshot so no lock is held across an await point.
        let handlers: Handlers = {
            let registry = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
            match registry.get(&class) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        for handler in handlers {
            match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(?class, error = %e, "emit: handler failed"),
                Err(_) => warn!(?class, "emit: handler panicked"),
            }
        }
    }

    /// Announce that a tool is about to be invoked.
    pub async fn notify_tool_call(&self, name: &str) {
        self.emit(&Event::tool_call(name)).await;
    }

    /// Forward one streamed content fragment.
    pub async fn notify_token(&self, text: &str) {
        self.emit(&Event::token(text)).await;
    }

    /// Forward an out-of-band tool server message.
    pub async fn notify(&self, method: &str, params: serde_json::Value) {
        self.emit(&Event::notification(method, params)).await;
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&EventClass, usize> =
            handlers.iter().map(|(class, list)| (class, list.len())).collect();
        f.debug_struct("Hub").field("handlers", &counts).finish()
    }
}
