//! Scripted tool host and completion backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use futures::stream;
use mcp::{Tool, ToolOutput};
use notify::{EventHandler, Hub};
use runtime::llm::{Completion, CompletionDelta, CompletionRequest, DeltaStream};
use runtime::{Backend, Bridge, LlmClient, LlmConfig, LlmError, ToolHost};
use serde_json::{Value, json};

#[derive(Default)]
pub struct HostLog {
    pub calls: Mutex<Vec<(String, Value)>>,
    pub handlers: Mutex<Vec<String>>,
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
}

impl HostLog {
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls().into_iter().map(|(name, _)| name).collect()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

pub struct MockHost {
    tools: Vec<Tool>,
    outputs: HashMap<String, Result<ToolOutput, String>>,
    fail_connect: bool,
    connected: AtomicBool,
    pub log: Arc<HostLog>,
}

impl MockHost {
    pub fn new(names: &[&str]) -> Self {
        let tools = names
            .iter()
            .map(|name| Tool {
                name: name.to_string(),
                description: Some(format!("The {name} tool")),
                input_schema: None,
            })
            .collect();
        Self {
            tools,
            outputs: HashMap::new(),
            fail_connect: false,
            connected: AtomicBool::new(false),
            log: Arc::default(),
        }
    }

    pub fn with_output(mut self, name: &str, output: ToolOutput) -> Self {
        self.outputs.insert(name.to_string(), Ok(output));
        self
    }

    pub fn with_failure(mut self, name: &str, message: &str) -> Self {
        self.outputs.insert(name.to_string(), Err(message.to_string()));
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }
}

impl ToolHost for MockHost {
    async fn connect(&mut self) -> mcp::Result<()> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect {
            return Err(mcp::Error::Connection("refused".into()));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn register_notification_handler(&self, method: &str, _handler: Arc<dyn EventHandler>) {
        self.log.handlers.lock().unwrap().push(method.to_string());
    }

    async fn list_tools(&self) -> mcp::Result<Vec<Tool>> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(mcp::Error::NotConnected);
        }
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> mcp::Result<ToolOutput> {
        self.log
            .calls
            .lock()
            .unwrap()
            .push((name.to_string(), arguments));
        match self.outputs.get(name) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(message)) => Err(mcp::Error::ToolCallFailed(message.clone())),
            None => Ok(ToolOutput::Text(format!("{name} ok"))),
        }
    }

    async fn close(&mut self) -> mcp::Result<()> {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

pub enum Step {
    Complete(Result<Completion, String>),
    Stream(Vec<CompletionDelta>),
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub messages: Vec<runtime::llm::Message>,
    pub tools: Vec<String>,
    pub streamed: bool,
}

#[derive(Default)]
pub struct BackendLog {
    steps: Mutex<VecDeque<Step>>,
    pub requests: Mutex<Vec<Recorded>>,
}

impl BackendLog {
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

#[derive(Clone)]
pub struct ScriptedBackend {
    pub log: Arc<BackendLog>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<Step>) -> Self {
        let log = BackendLog {
            steps: Mutex::new(steps.into()),
            requests: Mutex::default(),
        };
        Self { log: Arc::new(log) }
    }

    fn record(&self, request: &CompletionRequest<'_>, streamed: bool) -> Option<Step> {
        self.log.requests.lock().unwrap().push(Recorded {
            messages: request.messages.to_vec(),
            tools: request.tools.iter().map(|t| t.name().to_string()).collect(),
            streamed,
        });
        self.log.steps.lock().unwrap().pop_front()
    }
}

impl Backend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion, LlmError> {
        match self.record(&request, false) {
            Some(Step::Complete(Ok(completion))) => Ok(completion),
            Some(Step::Complete(Err(message))) => Err(LlmError::Network(message)),
            Some(Step::Stream(_)) => Err(LlmError::InvalidResponse("expected complete".into())),
            None => Err(LlmError::InvalidResponse("script exhausted".into())),
        }
    }

    async fn stream(&self, request: CompletionRequest<'_>) -> Result<DeltaStream, LlmError> {
        match self.record(&request, true) {
            Some(Step::Stream(deltas)) => Ok(stream::iter(deltas.into_iter().map(Ok)).boxed()),
            Some(Step::Complete(Err(message))) => Err(LlmError::Network(message)),
            Some(Step::Complete(Ok(_))) => Err(LlmError::InvalidResponse("expected stream".into())),
            None => Err(LlmError::InvalidResponse("script exhausted".into())),
        }
    }
}

pub fn text(content: &str) -> Step {
    Step::Complete(Ok(Completion {
        content: Some(content.to_string()),
        tool_calls: vec![],
        finish_reason: Some("stop".into()),
    }))
}

pub fn failure(message: &str) -> Step {
    Step::Complete(Err(message.to_string()))
}

/// A tool-call turn; each call is `(id, name, arguments-json-string)`.
pub fn calls(calls: &[(&str, &str, &str)]) -> Step {
    raw_calls(
        calls
            .iter()
            .map(|(id, name, args)| {
                json!({"id": id, "type": "function", "function": {"name": name, "arguments": args}})
            })
            .collect(),
    )
}

pub fn raw_calls(tool_calls: Vec<Value>) -> Step {
    Step::Complete(Ok(Completion {
        content: None,
        tool_calls,
        finish_reason: Some("tool_calls".into()),
    }))
}

pub fn bridge(
    host: MockHost,
    steps: Vec<Step>,
) -> (
    Bridge<ScriptedBackend, MockHost>,
    Arc<HostLog>,
    Arc<BackendLog>,
    Arc<Hub>,
) {
    let host_log = Arc::clone(&host.log);
    let backend = ScriptedBackend::new(steps);
    let backend_log = Arc::clone(&backend.log);
    let hub = Arc::new(Hub::new());
    let llm = LlmClient::new(backend, LlmConfig::new("test-key", "test-model"))
        .with_system_prompt("You are a test.");
    (Bridge::new(host, llm, Arc::clone(&hub)), host_log, backend_log, hub)
}
