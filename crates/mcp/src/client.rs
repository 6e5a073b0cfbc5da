//! MCP session: handshake, request/response correlation, inbound pump.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::FutureExt;
use notify::{Event, EventHandler, Hub, PROGRESS_METHOD};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, Inbound, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult, RequestId, Tool,
    ToolOutput, flagged_error,
};
use crate::transport::{self, Connection, ServerParameters, Transport};

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>>;
type MethodHandlers = Arc<RwLock<HashMap<String, Arc<dyn EventHandler>>>>;

/// Client for one MCP server.
///
/// Owns the transport and the session running on it. Inbound notifications
/// are forwarded to the handler registered for their method and, for
/// progress notifications, to the [`Hub`].
pub struct Client {
    params: ServerParameters,
    hub: Arc<Hub>,
    handlers: MethodHandlers,
    session: Option<Session>,
}

struct Session {
    transport: Arc<dyn Transport>,
    pending: PendingMap,
    next_id: AtomicI64,
    pump: JoinHandle<()>,
    server_info: Option<InitializeResult>,
}

impl Client {
    pub fn new(params: ServerParameters, hub: Arc<Hub>) -> Self {
        Self {
            params,
            hub,
            handlers: Arc::default(),
            session: None,
        }
    }

    pub fn params(&self) -> &ServerParameters {
        &self.params
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// Handshake result of the current session.
    pub fn server_info(&self) -> Option<&InitializeResult> {
        self.session.as_ref().and_then(|s| s.server_info.as_ref())
    }

    /// Establish the transport and perform the protocol handshake.
    pub async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        info!(server = %self.params, "connect: called");
        let connection = transport::connect(&self.params).await?;
        self.connect_with(connection).await
    }

    /// Run the handshake over an already established connection.
    pub async fn connect_with(&mut self, connection: Connection) -> Result<()> {
        let mut session = Session::start(
            connection,
            Arc::clone(&self.hub),
            Arc::clone(&self.handlers),
        );

        let handshake = async {
            let result: InitializeResult = session
                .request("initialize", Some(InitializeParams::default()))
                .await?;
            session.notify("notifications/initialized").await?;
            Ok::<_, Error>(result)
        };

        let outcome = handshake.await;
        match outcome {
            Ok(result) => {
                info!(
                    server = %result.server_info.name,
                    version = ?result.server_info.version,
                    protocol = %result.protocol_version,
                    "connect: handshake complete"
                );
                session.server_info = Some(result);
                self.session = Some(session);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "connect: handshake failed");
                session.shutdown().await;
                Err(Error::Connection(format!("handshake failed: {e}")))
            }
        }
    }

    /// Route notifications for `method` to `handler`, replacing any earlier one.
    pub fn register_notification_handler(
        &self,
        method: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) {
        let method = method.into();
        debug!(%method, "register_notification_handler: called");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method, handler);
    }

    /// List every tool the server exposes, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<Tool>> {
        let session = self.session.as_ref().ok_or(Error::NotConnected)?;

        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult = session.request("tools/list", params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        debug!(count = tools.len(), "list_tools: done");
        Ok(tools)
    }

    /// Call a tool by its server-side name.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolOutput> {
        let session = self.session.as_ref().ok_or(Error::NotConnected)?;
        debug!(%name, "call_tool: called");

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        let result: Value = session.request("tools/call", Some(params)).await?;

        if let Some(text) = flagged_error(&result) {
            return Err(Error::ToolCallFailed(text));
        }
        Ok(ToolOutput::from(result))
    }

    /// Tear down the session, then the transport.
    pub async fn close(&mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => {
                info!(server = %self.params, "close: called");
                session.shutdown().await;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl Session {
    fn start(connection: Connection, hub: Arc<Hub>, handlers: MethodHandlers) -> Self {
        let Connection { transport, inbound } = connection;
        let pending: PendingMap = Arc::default();
        let pump = Pump {
            transport: Arc::clone(&transport),
            pending: Arc::clone(&pending),
            handlers,
            hub,
        };
        Self {
            transport,
            pending,
            next_id: AtomicI64::new(1),
            pump: tokio::spawn(pump.run(inbound)),
            server_info: None,
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p)?;
        }
        let message = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), tx);

        debug!(%method, ?id, "request: sending");
        if let Err(e) = self.transport.send(message).await {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            return Err(e);
        }

        let response = rx.await.map_err(|_| Error::ConnectionClosed)?;
        let value = response.into_result()?;
        Ok(serde_json::from_value(value)?)
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let message = serde_json::to_string(&JsonRpcNotification::new(method))?;
        self.transport.send(message).await
    }

    async fn shutdown(self) {
        self.pump.abort();
        // Waiting requests observe ConnectionClosed.
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        if let Err(e) = self.transport.close().await {
            warn!(error = %e, "shutdown: transport close failed");
        }
    }
}

// The pump owns the inbound receiver and a transport handle; it must not
// outlive its session, even one dropped mid-handshake.
impl Drop for Session {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Drains the inbound stream for the lifetime of a session.
struct Pump {
    transport: Arc<dyn Transport>,
    pending: PendingMap,
    handlers: MethodHandlers,
    hub: Arc<Hub>,
}

impl Pump {
    async fn run(self, mut inbound: mpsc::Receiver<String>) {
        while let Some(message) = inbound.recv().await {
            match Inbound::parse(&message) {
                Ok(Inbound::Response(response)) => self.resolve(response),
                Ok(Inbound::Notification { method, params }) => {
                    self.dispatch(&method, params).await
                }
                Ok(Inbound::Request { id, method, .. }) => self.answer(id, &method).await,
                Err(e) => warn!(error = %e, "pump: dropping unparseable message"),
            }
        }
        debug!("pump: inbound stream closed");
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn resolve(&self, response: JsonRpcResponse) {
        let waiter = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&response.id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => warn!(id = ?response.id, "pump: response for unknown request"),
        }
    }

    async fn dispatch(&self, method: &str, params: Value) {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(method)
            .cloned();

        if let Some(handler) = handler {
            let event = Event::notification(method, params.clone());
            match AssertUnwindSafe(handler.handle(&event)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(%method, error = %e, "dispatch: handler failed"),
                Err(_) => warn!(%method, "dispatch: handler panicked"),
            }
        }

        if method == PROGRESS_METHOD {
            self.hub.notify(method, params).await;
        }
    }

    async fn answer(&self, id: RequestId, method: &str) {
        let response = match method {
            "ping" => JsonRpcResponse::success(id, json!({})),
            _ => {
                debug!(%method, "answer: unsupported server request");
                JsonRpcResponse::failure(id, JsonRpcError::method_not_found(method))
            }
        };
        match serde_json::to_string(&response) {
            Ok(message) => {
                if let Err(e) = self.transport.send(message).await {
                    warn!(%method, error = %e, "answer: send failed");
                }
            }
            Err(e) => warn!(%method, error = %e, "answer: serialize failed"),
        }
    }
}
