//! Tool host seam between the bridge and an MCP session.

use std::future::Future;
use std::sync::Arc;

use mcp::{Client, Tool, ToolOutput};
use notify::EventHandler;
use serde_json::Value;

/// Source of tools for the bridge.
///
/// [`mcp::Client`] is the production implementation; tests substitute
/// scripted hosts.
pub trait ToolHost: Send + Sync {
    /// Open the session and complete the protocol handshake.
    fn connect(&mut self) -> impl Future<Output = mcp::Result<()>> + Send;

    /// Route server notifications for `method` to `handler`.
    fn register_notification_handler(&self, method: &str, handler: Arc<dyn EventHandler>);

    /// Every tool the server advertises.
    fn list_tools(&self) -> impl Future<Output = mcp::Result<Vec<Tool>>> + Send;

    /// Invoke `name` with already normalized arguments.
    fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> impl Future<Output = mcp::Result<ToolOutput>> + Send;

    /// Shut the session down.
    fn close(&mut self) -> impl Future<Output = mcp::Result<()>> + Send;
}

impl ToolHost for Client {
    async fn connect(&mut self) -> mcp::Result<()> {
        Client::connect(self).await
    }

    fn register_notification_handler(&self, method: &str, handler: Arc<dyn EventHandler>) {
        Client::register_notification_handler(self, method, handler);
    }

    async fn list_tools(&self) -> mcp::Result<Vec<Tool>> {
        Client::list_tools(self).await
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> mcp::Result<ToolOutput> {
        Client::call_tool(self, name, arguments).await
    }

    async fn close(&mut self) -> mcp::Result<()> {
        Client::close(self).await
    }
}
