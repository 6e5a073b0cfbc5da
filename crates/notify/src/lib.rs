//! Process-wide notification hub.
//!
//! Observers register interest in one of three event classes and are called
//! back, in registration order, whenever an event of that class is emitted:
//!
//! - **Tool calls**: the bridge is about to invoke a tool (payload: tool name).
//! - **Tokens**: a streamed completion produced a content fragment.
//! - **Notifications**: the tool server sent an out-of-band message, keyed by
//!   its JSON-RPC method name (e.g. `notifications/progress`).
//!
//! Delivery is best-effort. A failing or panicking handler is logged and
//! skipped; it never aborts the emitter or the handlers after it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use notify::{Event, EventClass, Hub, handler_fn};
//!
//! # async fn example() {
//! let hub = Arc::new(Hub::new());
//! hub.register(
//!     EventClass::ToolCall,
//!     handler_fn(|event: &Event| {
//!         if let Event::ToolCall { name } = event {
//!             println!("calling {name}");
//!         }
//!         Ok(())
//!     }),
//! );
//!
//! hub.emit(&Event::tool_call("hello_world")).await;
//! # }
//! ```

mod event;
mod handler;
mod hub;

pub use event::{Event, EventClass, PROGRESS_METHOD};
pub use handler::{EventHandler, FnHandler, HandlerError, handler_fn};
pub use hub::Hub;
