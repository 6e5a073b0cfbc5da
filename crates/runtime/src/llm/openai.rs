//! OpenAI-compatible chat-completions backend.
//!
//! Works against any server speaking the `/chat/completions` dialect with
//! function calling; `base_url` selects the deployment.

use std::collections::VecDeque;

use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use mcp::sse::SseDecoder;

use super::backend::{Backend, DeltaStream};
use super::errors::LlmError;
use super::types::{Completion, CompletionDelta, CompletionRequest, ToolCallDelta};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Builder for creating an OpenAI backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    api_key: String,
    base_url: Option<String>,
}

impl OpenAiBackendBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
        }
    }

    /// Point the backend at another OpenAI-compatible deployment.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn build(self) -> OpenAiBackend {
        let base_url = self
            .base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        OpenAiBackend {
            http: reqwest::Client::new(),
            api_key: self.api_key,
            base_url,
        }
    }
}

/// OpenAI chat-completions backend.
pub struct OpenAiBackend {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiBackend {
    pub fn builder(api_key: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(api_key)
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_body(request: &CompletionRequest<'_>, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
            body["tool_choice"] = json!("auto");
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let response = self
            .http
            .post(self.url())
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            debug!(status, "post: API error");
            return Err(LlmError::Api { status, message });
        }
        Ok(response)
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({})", self.base_url)
    }
}

impl Backend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError> {
        debug!(model = request.model, messages = request.messages.len(), "complete: called");
        let body = Self::build_body(&request, false);
        let response = self.post(&body).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        Ok(Completion {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
            finish_reason: choice.finish_reason,
        })
    }

    async fn stream(&self, request: CompletionRequest<'_>) -> Result<DeltaStream, LlmError> {
        debug!(model = request.model, messages = request.messages.len(), "stream: called");
        let body = Self::build_body(&request, true);
        let response = self.post(&body).await?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(LlmError::from))
            .boxed();

        let state = DeltaState {
            bytes,
            decoder: SseDecoder::new(),
            queue: VecDeque::new(),
            done: false,
        };
        Ok(stream::unfold(state, next_delta).boxed())
    }
}

struct DeltaState {
    bytes: BoxStream<'static, Result<Vec<u8>, LlmError>>,
    decoder: SseDecoder,
    queue: VecDeque<Result<CompletionDelta, LlmError>>,
    done: bool,
}

async fn next_delta(
    mut state: DeltaState,
) -> Option<(Result<CompletionDelta, LlmError>, DeltaState)> {
    loop {
        if let Some(item) = state.queue.pop_front() {
            return Some((item, state));
        }
        if state.done {
            return None;
        }

        match state.bytes.next().await {
            Some(Ok(chunk)) => {
                for event in state.decoder.push(&chunk) {
                    let data = event.data.trim();
                    if data == "[DONE]" {
                        state.done = true;
                        break;
                    }
                    match parse_chunk(data) {
                        Ok(Some(delta)) => state.queue.push_back(Ok(delta)),
                        Ok(None) => {}
                        Err(e) => state.queue.push_back(Err(e)),
                    }
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "next_delta: stream failed");
                state.done = true;
                state.queue.push_back(Err(e));
            }
            None => state.done = true,
        }
    }
}

/// Decode one `data:` payload. Chunks without choices (usage trailers) yield `None`.
fn parse_chunk(data: &str) -> Result<Option<CompletionDelta>, LlmError> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::Stream(format!("malformed chunk: {e}")))?;
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(None);
    };

    let tool_calls = choice
        .delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let (name, arguments) = match call.function {
                Some(function) => (function.name, function.arguments),
                None => (None, None),
            };
            ToolCallDelta {
                index: call.index,
                id: call.id,
                name,
                arguments,
            }
        })
        .collect();

    Ok(Some(CompletionDelta {
        content: choice.delta.content,
        tool_calls,
        finish_reason: choice.finish_reason,
    }))
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<Value>>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: usize,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::{Message, ToolSpec, empty_parameters};

    #[test]
    fn body_includes_tools_only_when_present() {
        let messages = vec![Message::system("sys"), Message::user("hi")];
        let tools = vec![ToolSpec::function("echo", "Echo", empty_parameters())];
        let request = CompletionRequest {
            model: "gpt-4o",
            messages: &messages,
            tools: &tools,
            temperature: 0.5,
            max_tokens: 100,
        };

        let body = OpenAiBackend::build_body(&request, true);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["stream"], true);
        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["tools"][0]["function"]["name"], "echo");
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "hi"}));

        let request = CompletionRequest { tools: &[], ..request };
        let body = OpenAiBackend::build_body(&request, false);
        assert!(body.get("tools").is_none());
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn base_url_is_normalized() {
        let backend = OpenAiBackend::builder("k").base_url("http://localhost:8080/v1/").build();
        assert_eq!(backend.url(), "http://localhost:8080/v1/chat/completions");
        let backend = OpenAiBackend::builder("k").build();
        assert_eq!(backend.url(), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn parses_stream_chunks() {
        let delta = parse_chunk(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"echo","arguments":""}}]},"finish_reason":null}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            delta.tool_calls,
            vec![ToolCallDelta {
                index: 0,
                id: Some("c1".into()),
                name: Some("echo".into()),
                arguments: Some(String::new()),
            }]
        );

        let delta = parse_chunk(r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":"stop"}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(delta.content.as_deref(), Some("Hi"));
        assert_eq!(delta.finish_reason.as_deref(), Some("stop"));

        assert_eq!(parse_chunk(r#"{"choices":[],"usage":{}}"#).unwrap(), None);
        assert!(matches!(parse_chunk("{oops"), Err(LlmError::Stream(_))));
    }

    #[tokio::test]
    async fn deltas_stop_at_done_marker() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"},\"finish_reason\":null}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"B\"},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"},\"finish_reason\":null}]}\n\n",
        );
        let chunks: Vec<Result<Vec<u8>, LlmError>> = body
            .as_bytes()
            .chunks(7)
            .map(|c| Ok(c.to_vec()))
            .collect();
        let state = DeltaState {
            bytes: stream::iter(chunks).boxed(),
            decoder: SseDecoder::new(),
            queue: VecDeque::new(),
            done: false,
        };

        let deltas: Vec<_> = stream::unfold(state, next_delta).collect().await;
        let text: String = deltas
            .into_iter()
            .filter_map(|d| d.unwrap().content)
            .collect();
        assert_eq!(text, "AB");
    }
}
