//! Conversation state on top of a [`Backend`].

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, trace};

use notify::Hub;

use super::backend::Backend;
use super::errors::LlmError;
use super::stream::StreamAccumulator;
use super::types::{CompletionRequest, LlmResponse, Message, ToolResult, ToolSpec};
use crate::config::LlmConfig;

/// Receives content fragments as a streamed completion arrives.
#[async_trait]
pub trait TokenSink: Send + Sync {
    async fn token(&self, text: &str);
}

#[async_trait]
impl TokenSink for Hub {
    async fn token(&self, text: &str) {
        self.notify_token(text).await;
    }
}

/// Owns the message history and the tool list offered to the model.
///
/// The system prompt is never stored in history; it is prepended to every
/// request instead.
pub struct LlmClient<B> {
    backend: B,
    config: LlmConfig,
    system_prompt: Option<String>,
    tools: Vec<ToolSpec>,
    messages: Vec<Message>,
}

impl<B: Backend> LlmClient<B> {
    pub fn new(backend: B, config: LlmConfig) -> Self {
        Self {
            backend,
            config,
            system_prompt: None,
            tools: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn set_tools(&mut self, tools: Vec<ToolSpec>) {
        self.tools = tools;
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Append a user message and request the next turn.
    pub async fn invoke_with_prompt(
        &mut self,
        prompt: &str,
        stream: bool,
        sink: Option<&dyn TokenSink>,
    ) -> Result<LlmResponse, LlmError> {
        self.messages.push(Message::user(prompt));
        self.request(stream, sink).await
    }

    /// Append one tool message per result and request the next turn.
    pub async fn invoke(
        &mut self,
        results: &[ToolResult],
        stream: bool,
        sink: Option<&dyn TokenSink>,
    ) -> Result<LlmResponse, LlmError> {
        self.messages.extend(
            results
                .iter()
                .map(|result| Message::tool(&result.call_id, &result.output)),
        );
        self.request(stream, sink).await
    }

    async fn request(
        &mut self,
        stream: bool,
        sink: Option<&dyn TokenSink>,
    ) -> Result<LlmResponse, LlmError> {
        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt));
        }
        messages.extend(self.messages.iter().cloned());

        let request = CompletionRequest {
            model: &self.config.model,
            messages: &messages,
            tools: &self.tools,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        debug!(messages = messages.len(), tools = self.tools.len(), stream, "request: called");

        let completion = if stream {
            let mut deltas = self.backend.stream(request).await?;
            let mut acc = StreamAccumulator::new();
            while let Some(delta) = deltas.next().await {
                let delta = delta?;
                if let (Some(sink), Some(text)) = (sink, delta.content.as_deref()) {
                    if !text.is_empty() {
                        sink.token(text).await;
                    }
                }
                acc.push(delta);
            }
            acc.finish()
        } else {
            self.backend.complete(request).await?
        };

        let response = LlmResponse::from_completion(completion);
        trace!(
            finish_reason = ?response.finish_reason,
            tool_calls = response.tool_calls.len(),
            "request: completed"
        );
        self.messages.push(response.to_message());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::backend::DeltaStream;
    use crate::llm::types::{Completion, CompletionDelta, Role};
    use futures::stream;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedBackend {
        completions: Mutex<Vec<Completion>>,
        deltas: Mutex<Vec<Vec<CompletionDelta>>>,
        seen: Mutex<Vec<Vec<Message>>>,
    }

    impl Backend for ScriptedBackend {
        async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError> {
            self.seen.lock().unwrap().push(request.messages.to_vec());
            let mut completions = self.completions.lock().unwrap();
            if completions.is_empty() {
                return Err(LlmError::Network("no script".into()));
            }
            Ok(completions.remove(0))
        }

        async fn stream(&self, request: CompletionRequest<'_>) -> Result<DeltaStream, LlmError> {
            self.seen.lock().unwrap().push(request.messages.to_vec());
            let deltas = self.deltas.lock().unwrap().remove(0);
            Ok(stream::iter(deltas.into_iter().map(Ok)).boxed())
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    #[async_trait]
    impl TokenSink for Collect {
        async fn token(&self, text: &str) {
            self.0.lock().unwrap().push(text.to_string());
        }
    }

    fn config() -> LlmConfig {
        LlmConfig::new("k", "test-model")
    }

    #[tokio::test]
    async fn system_prompt_is_prepended_not_stored() {
        let backend = ScriptedBackend::default();
        backend.completions.lock().unwrap().push(Completion {
            content: Some("hello".into()),
            tool_calls: vec![],
            finish_reason: Some("stop".into()),
        });
        let mut client = LlmClient::new(backend, config()).with_system_prompt("sys");

        let response = client.invoke_with_prompt("hi", false, None).await.unwrap();
        assert_eq!(response.content, "hello");

        let seen = client.backend.seen.lock().unwrap().clone();
        assert_eq!(seen[0][0], Message::system("sys"));
        assert_eq!(seen[0][1], Message::user("hi"));
        assert_eq!(
            client.history(),
            &[Message::user("hi"), Message::assistant("hello", vec![])]
        );
    }

    #[tokio::test]
    async fn tool_results_become_tool_messages() {
        let backend = ScriptedBackend::default();
        backend.completions.lock().unwrap().push(Completion {
            content: Some("done".into()),
            tool_calls: vec![],
            finish_reason: Some("stop".into()),
        });
        let mut client = LlmClient::new(backend, config());

        let results = vec![ToolResult::new("c1", "one"), ToolResult::new("c2", "two")];
        client.invoke(&results, false, None).await.unwrap();

        let history = client.history();
        assert_eq!(history[0].role, Role::Tool);
        assert_eq!(history[0].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(history[1].content, "two");
        assert_eq!(history[2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn streaming_forwards_tokens_and_records_turn() {
        let backend = ScriptedBackend::default();
        backend.deltas.lock().unwrap().push(vec![
            CompletionDelta {
                content: Some("Hel".into()),
                ..Default::default()
            },
            CompletionDelta {
                content: Some("lo".into()),
                finish_reason: Some("stop".into()),
                ..Default::default()
            },
        ]);
        let mut client = LlmClient::new(backend, config());
        let sink = Collect::default();

        let response = client.invoke_with_prompt("hi", true, Some(&sink)).await.unwrap();
        assert_eq!(response.content, "Hello");
        assert_eq!(*sink.0.lock().unwrap(), vec!["Hel", "lo"]);
        assert_eq!(client.history().last().unwrap().content, "Hello");
    }

    #[tokio::test]
    async fn failed_request_keeps_appended_input() {
        let mut client = LlmClient::new(ScriptedBackend::default(), config());
        let err = client.invoke_with_prompt("hi", false, None).await.unwrap_err();
        assert!(matches!(err, LlmError::Network(_)));
        assert_eq!(client.history(), &[Message::user("hi")]);
    }

    #[tokio::test]
    async fn tool_call_turn_is_recorded_canonically() {
        let backend = ScriptedBackend::default();
        backend.completions.lock().unwrap().push(Completion {
            content: None,
            tool_calls: vec![json!({"id": "c1", "function": {"name": "echo", "arguments": {"a": 1}}})],
            finish_reason: Some("tool_calls".into()),
        });
        let mut client = LlmClient::new(backend, config());

        let response = client.invoke_with_prompt("go", false, None).await.unwrap();
        assert!(response.is_tool_call());
        let recorded = &client.history()[1];
        assert_eq!(recorded.tool_calls[0].function.arguments, "{\"a\":1}");
        assert_eq!(recorded.tool_calls[0].kind, "function");
    }
}
