//! Remote server transport over server-sent events.
//!
//! The client opens a long-lived `GET` on the server URL. The first
//! `endpoint` event names the URL (relative or absolute) that accepts our
//! messages as `POST` bodies; every `message` event carries one inbound
//! JSON-RPC message.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Url;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{INBOUND_CAPACITY, MAX_MESSAGE_SIZE, SseParameters, Transport};
use crate::error::{Error, Result};
use crate::sse::SseDecoder;

/// Connection to a remote MCP server.
pub struct SseTransport {
    http: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream and wait for the server to announce its endpoint.
    pub async fn connect(params: &SseParameters) -> Result<(Self, mpsc::Receiver<String>)> {
        debug!(url = %params.url, "connect: called");
        let base = Url::parse(&params.url)
            .map_err(|e| Error::Connection(format!("invalid server url {}: {e}", params.url)))?;
        let headers = header_map(params)?;
        let http = reqwest::Client::new();

        let response = http
            .get(base.clone())
            .headers(headers.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| Error::Connection(format!("failed to open event stream: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Connection(format!("event stream rejected: {status}")));
        }

        let (tx, rx) = mpsc::channel(INBOUND_CAPACITY);
        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let reader = tokio::spawn(read_events(response, base, tx, endpoint_tx));

        let endpoint = match endpoint_rx.await {
            Ok(Ok(endpoint)) => endpoint,
            Ok(Err(e)) => {
                reader.abort();
                return Err(e);
            }
            Err(_) => {
                reader.abort();
                return Err(Error::Connection(
                    "event stream closed before the endpoint was announced".to_string(),
                ));
            }
        };
        debug!(%endpoint, "connect: endpoint announced");

        Ok((
            Self {
                http,
                endpoint,
                headers,
                reader,
            },
            rx,
        ))
    }

    /// URL our messages are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

fn header_map(params: &SseParameters) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    for (key, value) in &params.headers {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|e| Error::Connection(format!("invalid header name {key}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| Error::Connection(format!("invalid header value for {key}: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

async fn read_events(
    response: reqwest::Response,
    base: Url,
    tx: mpsc::Sender<String>,
    endpoint_tx: oneshot::Sender<Result<Url>>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "read_events: stream failed");
                return;
            }
        };

        for event in decoder.push(&chunk) {
            match event.event.as_str() {
                "endpoint" => {
                    let resolved = base.join(event.data.trim()).map_err(|e| {
                        Error::Connection(format!("invalid endpoint {}: {e}", event.data))
                    });
                    match endpoint_tx.take() {
                        Some(sender) => {
                            let _ = sender.send(resolved);
                        }
                        None => debug!("read_events: ignoring repeated endpoint event"),
                    }
                }
                "message" => {
                    if event.data.len() > MAX_MESSAGE_SIZE {
                        warn!(size = event.data.len(), "read_events: dropping oversized message");
                        continue;
                    }
                    if tx.send(event.data).await.is_err() {
                        return;
                    }
                }
                other => debug!(event = other, "read_events: ignoring event"),
            }
        }
    }
    debug!("read_events: stream ended");
}

#[async_trait]
impl Transport for SseTransport {
    async fn send(&self, message: String) -> Result<()> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(message)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::InvalidResponse(format!("{status}: {body}")));
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!(endpoint = %self.endpoint, "close: called");
        self.reader.abort();
        Ok(())
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
