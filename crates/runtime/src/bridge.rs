//! The bridge: MCP tools exposed to a function-calling model.
//!
//! [`Bridge::process_message`] drives one user turn: request a completion,
//! execute every tool call the model asks for, feed the results back, and
//! repeat until the model answers in plain text.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{debug, info, trace, warn};

use mcp::{Client, Tool, ToolOutput};
use notify::{Event, EventHandler, HandlerError, Hub, PROGRESS_METHOD};

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::llm::{
    Backend, CallShape, LlmClient, OpenAiBackend, PendingToolCall, RawArguments, TokenSink,
    ToolResult, ToolSpec, empty_parameters,
};
use crate::tools::ToolHost;

/// Tool tried first by [`Bridge::update_template`].
pub const EDIT_TEMPLATE_TOOL: &str = "edit_template";
/// Fallback when the template does not exist yet.
pub const CREATE_TEMPLATE_TOOL: &str = "create_template";

/// Lowercase, with hyphens and spaces turned into underscores.
pub fn sanitize_tool_name(name: &str) -> String {
    name.replace(['-', ' '], "_").to_lowercase()
}

/// Convert discovered tools into function specs plus the sanitized-name mapping.
///
/// Specs keep the discovery order. When two tools sanitize to the same name
/// the later one wins the mapping.
pub fn convert_tools(tools: &[Tool]) -> (Vec<ToolSpec>, HashMap<String, String>) {
    let mut specs = Vec::with_capacity(tools.len());
    let mut mapping = HashMap::with_capacity(tools.len());

    for tool in tools {
        let sanitized = sanitize_tool_name(&tool.name);
        if let Some(previous) = mapping.insert(sanitized.clone(), tool.name.clone()) {
            warn!(
                sanitized = %sanitized,
                previous = %previous,
                current = %tool.name,
                "convert_tools: sanitized name collision, keeping the later tool"
            );
        }
        specs.push(ToolSpec::function(
            sanitized,
            tool.description.clone().unwrap_or_default(),
            tool.input_schema.clone().unwrap_or_else(empty_parameters),
        ));
    }

    (specs, mapping)
}

/// Turn raw model arguments into the object sent to the tool.
pub fn normalize_arguments(raw: RawArguments) -> Value {
    match raw {
        RawArguments::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Value::Object(Map::new());
            }
            match serde_json::from_str(trimmed) {
                Ok(value) => value,
                Err(e) => {
                    debug!(error = %e, "normalize_arguments: not JSON, wrapping as text");
                    json!({ "text": text })
                }
            }
        }
        RawArguments::Structured(value) if is_falsy(&value) => Value::Object(Map::new()),
        RawArguments::Structured(value) => value,
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

/// Render a tool's output as the text handed back to the model.
pub fn format_result(output: &ToolOutput) -> String {
    match output {
        ToolOutput::Text(text) => text.clone(),
        ToolOutput::Content(parts) => parts
            .iter()
            .filter_map(|part| part.as_text())
            .collect::<Vec<_>>()
            .join(" "),
        ToolOutput::Other(value) => value.to_string(),
    }
}

/// Logs progress notifications routed to the bridge by the tool server.
///
/// Display goes through the [`Hub`]; this only leaves a trace.
struct ProgressTrace;

#[async_trait]
impl EventHandler for ProgressTrace {
    async fn handle(&self, event: &Event) -> std::result::Result<(), HandlerError> {
        if let Event::Notification { params, .. } = event {
            trace!(%params, "progress");
        }
        Ok(())
    }
}

/// Couples one tool host with one LLM conversation.
pub struct Bridge<B, H> {
    llm: LlmClient<B>,
    host: H,
    hub: Arc<Hub>,
    tools: Vec<Tool>,
    name_mapping: HashMap<String, String>,
    initialized: bool,
}

impl Bridge<OpenAiBackend, Client> {
    /// Production wiring: an MCP client and an OpenAI-compatible backend.
    pub fn from_config(config: BridgeConfig, hub: Arc<Hub>) -> Self {
        let system_prompt = config.system_prompt().to_string();
        let mut backend = OpenAiBackend::builder(&config.llm.api_key);
        if let Some(base_url) = &config.llm.base_url {
            backend = backend.base_url(base_url);
        }
        let llm = LlmClient::new(backend.build(), config.llm).with_system_prompt(system_prompt);
        let host = Client::new(config.server, Arc::clone(&hub));
        Self::new(host, llm, hub)
    }
}

impl<B: Backend, H: ToolHost> Bridge<B, H> {
    pub fn new(host: H, llm: LlmClient<B>, hub: Arc<Hub>) -> Self {
        Self {
            llm,
            host,
            hub,
            tools: Vec::new(),
            name_mapping: HashMap::new(),
            initialized: false,
        }
    }

    /// Tools discovered at initialization.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Sanitized name to server-side name.
    pub fn name_mapping(&self) -> &HashMap<String, String> {
        &self.name_mapping
    }

    pub fn llm(&self) -> &LlmClient<B> {
        &self.llm
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Connect, discover tools and offer them to the model.
    ///
    /// Returns `false` (after logging why) if any step fails.
    pub async fn initialize(&mut self) -> bool {
        match self.try_initialize().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "initialize: failed");
                false
            }
        }
    }

    async fn try_initialize(&mut self) -> Result<()> {
        self.host
            .connect()
            .await
            .map_err(|e| Error::Connection(e.to_string()))?;
        self.host
            .register_notification_handler(PROGRESS_METHOD, Arc::new(ProgressTrace));

        let tools = self.host.list_tools().await?;
        let (specs, mapping) = convert_tools(&tools);
        info!(count = tools.len(), "initialize: tools discovered");

        self.llm.set_tools(specs);
        self.tools = tools;
        self.name_mapping = mapping;
        self.initialized = true;
        Ok(())
    }

    /// Run one user turn to completion.
    ///
    /// Never fails: any error is returned as `"Error: <message>"`.
    pub async fn process_message(&mut self, text: &str, stream: bool) -> String {
        match self.run_turn(text, stream).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(error = %e, "process_message: failed");
                format!("Error: {e}")
            }
        }
    }

    async fn run_turn(&mut self, text: &str, stream: bool) -> Result<String> {
        let hub = Arc::clone(&self.hub);
        let sink = stream.then_some(&*hub as &dyn TokenSink);

        let mut response = self.llm.invoke_with_prompt(text, stream, sink).await?;
        let mut round = 0usize;
        while response.is_tool_call() {
            round += 1;
            debug!(round, calls = response.tool_calls.len(), "run_turn: executing tool calls");
            let results = self.handle_tool_calls(&response.tool_calls).await;

            response = match self.llm.invoke(&results, stream, sink).await {
                Ok(next) => next,
                Err(e) if !results.is_empty() => {
                    warn!(
                        error = %e,
                        results = results.len(),
                        "run_turn: follow-up failed, returning tool output"
                    );
                    return Ok(results
                        .iter()
                        .map(|result| result.output.as_str())
                        .collect::<Vec<_>>()
                        .join("\n"));
                }
                Err(e) => return Err(e.into()),
            };
        }

        Ok(response.content)
    }

    /// Execute a batch of tool calls, one result per dispatchable call.
    ///
    /// Calls that cannot be dispatched (unrecognized shape, missing id,
    /// unknown tool) are skipped. A failing tool yields an error result and
    /// does not affect its siblings.
    pub async fn handle_tool_calls(&self, calls: &[CallShape]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            match self.execute_call(call).await {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "handle_tool_calls: skipping call"),
            }
        }
        results
    }

    async fn execute_call(&self, call: &CallShape) -> Result<ToolResult> {
        let PendingToolCall {
            id,
            name,
            arguments,
        } = call
            .pending()
            .map_err(|e| Error::ToolDispatch(e.to_string()))?;

        let exec_name = self
            .name_mapping
            .get(&name)
            .ok_or_else(|| Error::ToolDispatch(format!("unknown tool: {name}")))?;

        self.hub.notify_tool_call(exec_name).await;
        let arguments = normalize_arguments(arguments);
        debug!(tool = %exec_name, call_id = %id, "execute_call: calling tool");

        let output = match self.host.call_tool(exec_name, arguments).await {
            Ok(output) => format_result(&output),
            Err(e) => {
                warn!(tool = %exec_name, error = %e, "execute_call: tool failed");
                format!("Error: {e}")
            }
        };
        Ok(ToolResult::new(id, output))
    }

    /// Write `content` to a template without involving the model.
    ///
    /// Tries [`EDIT_TEMPLATE_TOOL`] and falls back to
    /// [`CREATE_TEMPLATE_TOOL`] when the edit fails.
    pub async fn update_template(&self, template: &str, content: &str) -> Result<String> {
        if !self.initialized {
            return Err(Error::NotConnected);
        }
        let arguments = json!({ "template_name": template, "content": content });

        self.hub.notify_tool_call(EDIT_TEMPLATE_TOOL).await;
        match self.host.call_tool(EDIT_TEMPLATE_TOOL, arguments.clone()).await {
            Ok(output) => Ok(format_result(&output)),
            Err(e) => {
                info!(template, error = %e, "update_template: edit failed, creating instead");
                self.hub.notify_tool_call(CREATE_TEMPLATE_TOOL).await;
                let output = self
                    .host
                    .call_tool(CREATE_TEMPLATE_TOOL, arguments)
                    .await
                    .map_err(|e| Error::ToolExecution(e.to_string()))?;
                Ok(format_result(&output))
            }
        }
    }

    /// Close the tool host and drop every Hub registration.
    pub async fn close(&mut self) -> Result<()> {
        debug!("close: called");
        self.initialized = false;
        let closed = self.host.close().await;
        self.hub.clear();
        closed.map_err(Error::from)
    }
}
