//! Configuration loading from bridge.toml and the environment.
//!
//! ```toml
//! system_prompt = "You are a helpful assistant."
//!
//! [llm]
//! model = "gpt-4o"
//! base_url = "http://localhost:11434/v1"
//! temperature = 0.2
//!
//! [server]
//! transport = "stdio"
//! command = "uvx"
//! args = ["mcp-server-time"]
//! ```
//!
//! Environment variables override the file; see [`Config::apply_env`].

use std::path::Path;

use mcp::ServerParameters;
use runtime::config::{DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};
use runtime::{BridgeConfig, LlmConfig};
use serde::Deserialize;

/// Config file looked up in the working directory when `--config` is absent.
pub const CONFIG_FILE: &str = "bridge.toml";

/// Server used when neither the file nor the environment names one.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8000/sse";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Completion endpoint settings.
    pub llm: LlmSection,

    /// MCP server to connect to.
    pub server: Option<ServerParameters>,

    /// System prompt prepended to every request.
    pub system_prompt: Option<String>,
}

/// `[llm]` table. Every field is optional until [`Config::resolve`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `path` if given (it must exist), else [`CONFIG_FILE`] if present,
    /// else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Override file values from the environment.
    ///
    /// `LLM_API_KEY` (falling back to `OPENAI_API_KEY`), `LLM_MODEL`,
    /// `LLM_BASE_URL`, `LLM_TEMPERATURE`, `LLM_MAX_TOKENS`,
    /// `LLM_SYSTEM_PROMPT` and `MCP_SERVER_URL`.
    pub fn apply_env<F>(mut self, var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var("LLM_API_KEY").or_else(|| var("OPENAI_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = var("LLM_MODEL") {
            self.llm.model = Some(model);
        }
        if let Some(base_url) = var("LLM_BASE_URL") {
            self.llm.base_url = Some(base_url);
        }
        if let Some(raw) = var("LLM_TEMPERATURE") {
            let temperature = raw
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name: "LLM_TEMPERATURE", value: raw })?;
            self.llm.temperature = Some(temperature);
        }
        if let Some(raw) = var("LLM_MAX_TOKENS") {
            let max_tokens = raw
                .parse()
                .map_err(|_| ConfigError::InvalidEnv { name: "LLM_MAX_TOKENS", value: raw })?;
            self.llm.max_tokens = Some(max_tokens);
        }
        if let Some(prompt) = var("LLM_SYSTEM_PROMPT") {
            self.system_prompt = Some(prompt);
        }
        if let Some(url) = var("MCP_SERVER_URL") {
            self.server = Some(ServerParameters::sse(url));
        }
        Ok(self)
    }

    /// Fill defaults and validate.
    pub fn resolve(self) -> Result<BridgeConfig, ConfigError> {
        let api_key = self
            .llm
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let server = self
            .server
            .unwrap_or_else(|| ServerParameters::sse(DEFAULT_SERVER_URL));
        match &server {
            ServerParameters::Stdio(p) if p.command.trim().is_empty() => {
                return Err(ConfigError::Invalid("server.command must not be empty".into()));
            }
            ServerParameters::Sse(p) if p.url.trim().is_empty() => {
                return Err(ConfigError::Invalid("server.url must not be empty".into()));
            }
            _ => {}
        }

        let model = self
            .llm
            .model
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let mut llm = LlmConfig::new(api_key, model);
        if let Some(base_url) = self.llm.base_url {
            llm = llm.with_base_url(base_url);
        }
        if let Some(temperature) = self.llm.temperature {
            llm = llm.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.llm.max_tokens {
            llm = llm.with_max_tokens(max_tokens);
        }

        let prompt = self
            .system_prompt
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        Ok(BridgeConfig::new(server, llm).with_system_prompt(prompt))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("API key not configured: set llm.api_key or LLM_API_KEY")]
    MissingApiKey,

    #[error("invalid value for {name}: {value}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}
