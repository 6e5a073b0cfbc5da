//! Minimal terminal progress display.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use notify::{Event, EventClass, EventHandler, HandlerError, Hub};

/// Prints tool invocations, streamed tokens and "thinking" progress.
///
/// Tokens and thinking text are written without newlines; a tool line
/// first terminates whatever partial line is open.
pub struct ProgressPrinter<W> {
    out: Mutex<W>,
    mid_line: AtomicBool,
}

impl ProgressPrinter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send + 'static> ProgressPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            mid_line: AtomicBool::new(false),
        }
    }

    /// Subscribe to every event class the printer displays.
    pub fn register(self: &Arc<Self>, hub: &Hub) {
        hub.register_arc(EventClass::ToolCall, Arc::clone(self) as Arc<dyn EventHandler>);
        hub.register_arc(EventClass::Token, Arc::clone(self) as Arc<dyn EventHandler>);
        hub.register_arc(EventClass::progress(), Arc::clone(self) as Arc<dyn EventHandler>);
    }

    /// Whether a token or thinking line is still open.
    pub fn is_mid_line(&self) -> bool {
        self.mid_line.load(Ordering::SeqCst)
    }

    fn write(&self, text: &str) -> std::io::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(text.as_bytes())?;
        out.flush()
    }

    fn print(&self, event: &Event) -> std::io::Result<()> {
        match event {
            Event::ToolCall { name } => {
                if self.mid_line.swap(false, Ordering::SeqCst) {
                    self.write("\n")?;
                }
                self.write(&format!("▶ {name}\n"))
            }
            Event::Token { text } => {
                self.mid_line.store(true, Ordering::SeqCst);
                self.write(text)
            }
            Event::Notification { params, .. } => {
                if params.get("contentType").and_then(|v| v.as_str()) != Some("thinking") {
                    return Ok(());
                }
                let content = params.get("content").and_then(|v| v.as_str()).unwrap_or_default();
                self.mid_line.store(true, Ordering::SeqCst);
                self.write(content)
            }
        }
    }
}

#[async_trait]
impl<W: Write + Send + 'static> EventHandler for ProgressPrinter<W> {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.print(event)?;
        Ok(())
    }
}
