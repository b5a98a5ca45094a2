//! Error types for Supreme Chat
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for chat operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,
    CredentialMissing = 110,
    PersonaInvalid = 120,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Connection errors (3xx)
    ConnectionFailed = 300,
    ConnectionClosed = 301,

    // Protocol errors (4xx)
    ProtocolMalformed = 400,

    // Remote model errors (5xx)
    RemoteTransport = 500,
    RemoteStatus = 501,
    RemoteMalformed = 502,
    UnknownDelegate = 510,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10,
            200..=299 => 20,
            300..=399 => 30,
            400..=499 => 40,
            500..=599 => 50,
            900..=999 => 90,
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Required API credential is absent from the environment
    #[error("{var} is missing: set it in the environment or in {env_file}")]
    CredentialMissing { var: String, env_file: String },

    /// Bundled persona roster is inconsistent
    #[error("Invalid persona roster: {message}")]
    PersonaInvalid { message: String },

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // ─────────────────────────────────────────────────────────────
    // Connection / Protocol Errors (UI surface)
    // ─────────────────────────────────────────────────────────────

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The chat client went away mid-turn
    #[error("Chat connection closed")]
    ConnectionClosed,

    /// Malformed chat protocol message
    #[error("Malformed chat message: {message}")]
    ProtocolMalformed { message: String },

    // ─────────────────────────────────────────────────────────────
    // Remote Model Errors
    // ─────────────────────────────────────────────────────────────

    /// HTTP transport failure talking to the model endpoint
    #[error("Request to model endpoint failed: {0}")]
    RemoteTransport(#[from] reqwest::Error),

    /// Model endpoint answered with a non-success status
    #[error("Model endpoint returned {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    /// Model endpoint answered with something we could not parse
    #[error("Malformed response from model endpoint: {message}")]
    RemoteMalformed { message: String },

    /// The model asked to hand off to a persona that is not a delegate
    #[error("Model requested handoff to unknown delegate '{tool}'")]
    UnknownDelegate { tool: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::CredentialMissing { .. } => ErrorCode::CredentialMissing,
            Error::PersonaInvalid { .. } => ErrorCode::PersonaInvalid,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,

            Error::WebSocket(_) => ErrorCode::ConnectionFailed,
            Error::ConnectionClosed => ErrorCode::ConnectionClosed,
            Error::ProtocolMalformed { .. } => ErrorCode::ProtocolMalformed,

            Error::RemoteTransport(_) => ErrorCode::RemoteTransport,
            Error::RemoteStatus { .. } => ErrorCode::RemoteStatus,
            Error::RemoteMalformed { .. } => ErrorCode::RemoteMalformed,
            Error::UnknownDelegate { .. } => ErrorCode::UnknownDelegate,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Whether this error comes from talking to the model.
    ///
    /// These are recovered at the turn boundary; everything else is either
    /// fatal at startup or ends the chat connection.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Error::RemoteTransport(_)
                | Error::RemoteStatus { .. }
                | Error::RemoteMalformed { .. }
                | Error::UnknownDelegate { .. }
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'supreme-chat config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'supreme-chat config validate' to see details."
            ),
            Error::ConfigValidation { .. } => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::CredentialMissing { .. } => Some(
                "Export the API key (e.g. 'export GEMINI_API_KEY=...') or add it to a .env file."
            ),
            Error::RemoteStatus { .. } => Some(
                "Verify the API key and model name configured under [model]."
            ),
            Error::RemoteTransport(_) => Some(
                "Check your network connection and the configured model base_url."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound { path: path.into() }
    }

    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a malformed remote response error
    pub fn remote_malformed(message: impl Into<String>) -> Self {
        Error::RemoteMalformed {
            message: message.into(),
        }
    }

    /// Create a malformed chat protocol error
    pub fn protocol_malformed(message: impl Into<String>) -> Self {
        Error::ProtocolMalformed {
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::ConfigNotFound.as_str(), "E100");
        assert_eq!(ErrorCode::CredentialMissing.as_str(), "E110");
        assert_eq!(ErrorCode::RemoteStatus.as_str(), "E501");
    }

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(ErrorCode::CredentialMissing.exit_code(), 10);
        assert_eq!(ErrorCode::IoRead.exit_code(), 20);
        assert_eq!(ErrorCode::ConnectionClosed.exit_code(), 30);
        assert_eq!(ErrorCode::RemoteTransport.exit_code(), 50);
        assert_eq!(ErrorCode::InternalError.exit_code(), 90);
    }

    #[test]
    fn test_credential_missing_message() {
        let err = Error::CredentialMissing {
            var: "GEMINI_API_KEY".into(),
            env_file: ".env".into(),
        };
        assert!(err.to_string().contains("GEMINI_API_KEY is missing"));
        assert!(!err.is_remote());
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn test_remote_classification() {
        let err = Error::RemoteStatus {
            status: 503,
            body: "overloaded".into(),
        };
        assert!(err.is_remote());
        assert!(err.to_string().contains("503"));

        assert!(Error::remote_malformed("bad json").is_remote());
        assert!(Error::UnknownDelegate { tool: "x".into() }.is_remote());
        assert!(!Error::ConnectionClosed.is_remote());
    }

    #[test]
    fn test_error_suggestions() {
        let err = Error::config_not_found("/test");
        assert!(err.suggestion().unwrap().contains("config init"));

        let err = Error::CredentialMissing {
            var: "GEMINI_API_KEY".into(),
            env_file: ".env".into(),
        };
        assert!(err.suggestion().unwrap().contains(".env"));
    }

    #[test]
    fn test_format_for_terminal() {
        let err = Error::config_not_found("/test/config.toml");
        let formatted = err.format_for_terminal();

        assert!(formatted.contains("E100"));
        assert!(formatted.contains("\x1b[31m"));
        assert!(formatted.contains("Hint"));
    }

    #[test]
    fn test_format_for_log() {
        let err = Error::protocol_malformed("not json");
        let formatted = err.format_for_log();

        assert!(formatted.contains("[E400]"));
        assert!(!formatted.contains("\x1b["));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert_eq!(err.code(), ErrorCode::IoNotFound);
    }
}
