//! Configuration system for Supreme Chat
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (SUPREME_CHAT_* prefix), including entries
//!    exported from the `[model].env_file` dotenv file
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::credentials;
use crate::error::{Error, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// WebSocket chat surface settings
    pub server: ServerSettings,

    /// Remote model endpoint settings
    pub model: ModelSettings,

    /// Agent runtime settings
    pub agent: AgentSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// WebSocket chat surface settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address for the chat WebSocket
    pub bind: String,

    /// Message sent when a chat session starts
    pub welcome: String,

    /// Maximum simultaneous chat sessions (0 = unlimited)
    pub max_connections: usize,
}

/// OpenAI-compatible model endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// API base URL; `chat/completions` is appended to it
    pub base_url: String,

    /// Model identifier sent with every request
    pub model: String,

    /// Name of the environment variable holding the API key
    pub api_key_env: String,

    /// Dotenv-style file consulted when the variable is not exported
    pub env_file: String,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds (0 = none)
    pub request_timeout_secs: u64,
}

/// Agent runtime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Maximum handoffs followed within one turn
    pub max_handoffs: u32,

    /// Text shown in the reply message before the first token arrives
    pub placeholder: String,

    /// Request incremental completions; false waits for the whole reply
    pub stream: bool,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// File rotation: hourly, daily, never
    pub rotation: String,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            welcome: "Welcome! I am the Supreme AI. Ask me anything!".to_string(),
            max_connections: 0,
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai/".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            env_file: ".env".to_string(),
            connect_timeout_secs: 30,
            request_timeout_secs: 0,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_handoffs: 1,
            placeholder: "Thinking...".to_string(),
            stream: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            rotation: "daily".to_string(),
            max_files: 5,
            json_format: false,
        }
    }
}

impl ChatConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        let config_file = Self::find_config_file(config_path)?;
        if let Some(path) = config_file {
            debug!(path = %path.display(), "Loading configuration file");
            let content = fs::read_to_string(&path).map_err(|e| Error::IoRead {
                path: path.clone(),
                source: e,
            })?;
            config = toml::from_str(&content).map_err(|e| Error::ConfigParse {
                message: format!("{}: {}", path.display(), e.message()),
                source: Some(e),
            })?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        config.export_env_file()?;
        config.apply_env_overrides();
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            PathBuf::from("supreme-chat.toml"),
            dirs::config_dir()
                .map(|p| p.join("supreme-chat").join("config.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".supreme-chat").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &search_paths {
            if path.is_file() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Export the dotenv file so its entries take part in the overrides.
    /// `SUPREME_CHAT_ENV_FILE` picks the file before anything else is read.
    fn export_env_file(&self) -> Result<()> {
        let path = std::env::var("SUPREME_CHAT_ENV_FILE").unwrap_or_else(|_| self.model.env_file.clone());
        credentials::load_env_file(Path::new(&expand_path(&path)))?;
        Ok(())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SUPREME_CHAT_BIND") {
            self.server.bind = val;
        }
        if let Ok(val) = std::env::var("SUPREME_CHAT_MAX_CONNECTIONS") {
            if let Ok(n) = val.parse() {
                self.server.max_connections = n;
            }
        }

        if let Ok(val) = std::env::var("SUPREME_CHAT_BASE_URL") {
            self.model.base_url = val;
        }
        if let Ok(val) = std::env::var("SUPREME_CHAT_MODEL") {
            self.model.model = val;
        }
        if let Ok(val) = std::env::var("SUPREME_CHAT_API_KEY_ENV") {
            self.model.api_key_env = val;
        }
        if let Ok(val) = std::env::var("SUPREME_CHAT_ENV_FILE") {
            self.model.env_file = val;
        }
        if let Ok(val) = std::env::var("SUPREME_CHAT_REQUEST_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.model.request_timeout_secs = n;
            }
        }

        if let Ok(val) = std::env::var("SUPREME_CHAT_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("SUPREME_CHAT_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("SUPREME_CHAT_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Expand ~ and environment variables in paths
    fn expand_paths(&mut self) {
        self.model.env_file = expand_path(&self.model.env_file);
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.bind_addr()?;

        let base = Url::parse(&self.model.base_url).map_err(|e| {
            Error::config_field_invalid("model.base_url", format!("Invalid base URL: {}", e))
        })?;
        if base.scheme() != "http" && base.scheme() != "https" {
            return Err(Error::config_field_invalid(
                "model.base_url",
                "Base URL must start with http:// or https://",
            ));
        }

        if self.model.model.trim().is_empty() {
            return Err(Error::config_field_invalid("model.model", "Model identifier cannot be empty"));
        }
        if self.model.api_key_env.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "model.api_key_env",
                "API key variable name cannot be empty",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        let valid_rotations = ["hourly", "daily", "never"];
        if !valid_rotations.contains(&self.logging.rotation.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.rotation",
                format!("Invalid rotation '{}'. Must be one of: hourly, daily, never", self.logging.rotation),
            ));
        }

        Ok(())
    }

    /// Parsed listen address of the chat server
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.server.bind.parse().map_err(|e| {
            Error::config_field_invalid(
                "server.bind",
                format!("Invalid bind address '{}': {}", self.server.bind, e),
            )
        })
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".supreme-chat")
                .join("config.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::config_validation(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# Supreme Chat Configuration

[server]
# Listen address for the chat WebSocket
bind = "127.0.0.1:8000"

# Message sent when a chat session starts
welcome = "Welcome! I am the Supreme AI. Ask me anything!"

# Maximum simultaneous chat sessions (0 = unlimited)
max_connections = 0

[model]
# OpenAI-compatible API base URL
base_url = "https://generativelanguage.googleapis.com/v1beta/openai/"

# Model identifier
model = "gemini-2.0-flash"

# Environment variable holding the API key
api_key_env = "GEMINI_API_KEY"

# Dotenv file consulted if the variable is not exported
env_file = ".env"

# TCP connect timeout in seconds
connect_timeout_secs = 30

# Whole-request timeout in seconds (0 = none)
request_timeout_secs = 0

[agent]
# Maximum handoffs followed within one turn
max_handoffs = 1

# Reply text shown until the first token arrives
placeholder = "Thinking..."

# Stream tokens as they arrive (false = one payload per reply)
stream = true

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.supreme-chat/logs/chat.log"

# File rotation: hourly, daily, never
rotation = "daily"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
