//! Error types for the tool-server host
//!
//! Four layers, each wrapping the one below with more context:
//!
//! - [`ConfigError`]: a server section (or the whole file) could not be loaded
//! - [`ConnectionError`]: transport-level failure, never shown to tool callers
//! - [`StartupError`]: the manager's view of a failed start, always names the server
//! - [`ToolError`]: a failed invocation, always names the server and operation

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Configuration loading errors.
///
/// Everything except [`ConfigError::Read`], [`ConfigError::Parse`] and
/// [`ConfigError::Invalid`] is scoped to a single server section; the loader
/// skips that section and keeps loading the rest.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("server '{server}': invalid section: {message}")]
    Section { server: String, message: String },

    #[error("server '{server}': missing required field '{field}'")]
    MissingField { server: String, field: &'static str },

    #[error("server '{server}': environment variable '{variable}' is not set")]
    UnsetVariable { server: String, variable: String },

    #[error("server '{server}': invalid endpoint '{url}': {reason}")]
    InvalidEndpoint {
        server: String,
        url: String,
        reason: String,
    },

    #[error("server '{server}': tool '{tool}' resolves to reserved name '{name}'")]
    ReservedName {
        server: String,
        tool: String,
        name: String,
    },

    #[error("server '{server}': tool '{tool}': {message}")]
    InvalidTool {
        server: String,
        tool: String,
        message: String,
    },
}

impl ConfigError {
    /// The server section this error belongs to, if it is section-scoped.
    pub fn server(&self) -> Option<&str> {
        match self {
            Self::Read { .. } | Self::Parse(_) | Self::Invalid(_) => None,
            Self::Section { server, .. }
            | Self::MissingField { server, .. }
            | Self::UnsetVariable { server, .. }
            | Self::InvalidEndpoint { server, .. }
            | Self::ReservedName { server, .. }
            | Self::InvalidTool { server, .. } => Some(server),
        }
    }
}

/// Transport-level failures while establishing, using or closing a session.
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to reach {url}: {message}")]
    Endpoint { url: String, message: String },

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("request failed: {0}")]
    Request(String),

    /// The server answered with a protocol-level error
    #[error("server rejected request ({code}): {message}")]
    Rejected { code: i32, message: String },

    #[error("failed to close connection: {0}")]
    Close(String),

    #[error("close timed out after {0:?}")]
    CloseTimeout(Duration),

    #[error("connection is closed")]
    Closed,
}

/// Why a server could not provide a session.
///
/// Cloneable so that every caller waiting on the same start attempt observes
/// the same outcome.
#[derive(Error, Debug, Clone)]
pub enum StartupError {
    #[error("server '{server}' is not configured")]
    UnknownServer { server: String },

    #[error("server '{server}' is disabled")]
    Disabled { server: String },

    #[error("server '{server}' failed to start: {source}")]
    Connect {
        server: String,
        #[source]
        source: Arc<ConnectionError>,
    },

    #[error("server '{server}' did not start within {after:?}")]
    Timeout { server: String, after: Duration },

    /// A running server's session broke; cleared by a reset like any failure
    #[error("server '{server}' lost its connection: {source}")]
    Lost {
        server: String,
        #[source]
        source: Arc<ConnectionError>,
    },

    #[error("server '{server}' is closed")]
    Closed { server: String },
}

impl StartupError {
    /// The server this error refers to.
    pub fn server(&self) -> &str {
        match self {
            Self::UnknownServer { server }
            | Self::Disabled { server }
            | Self::Connect { server, .. }
            | Self::Timeout { server, .. }
            | Self::Lost { server, .. }
            | Self::Closed { server } => server,
        }
    }

    /// Terminal errors never clear, not even through a reset.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed { .. } | Self::UnknownServer { .. })
    }
}

/// A failed tool invocation.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool '{tool}' unavailable: {source}")]
    Startup {
        tool: String,
        #[source]
        source: StartupError,
    },

    /// Raised locally before any request, or by the server's own validation
    #[error("invalid arguments for '{operation}' on server '{server}': {detail}")]
    InvalidArguments {
        server: String,
        operation: String,
        detail: String,
    },

    #[error("'{operation}' on server '{server}' returned an error: {detail}")]
    Remote {
        server: String,
        operation: String,
        detail: String,
    },

    #[error("'{operation}' on server '{server}' failed: {detail}")]
    Transport {
        server: String,
        operation: String,
        detail: String,
    },

    #[error("'{operation}' on server '{server}' timed out after {after:?}")]
    Timeout {
        server: String,
        operation: String,
        after: Duration,
    },

    #[error("tool '{0}' not found")]
    NotFound(String),
}

impl ToolError {
    /// The server involved, if the tool was resolved at all.
    pub fn server(&self) -> Option<&str> {
        match self {
            Self::Startup { source, .. } => Some(source.server()),
            Self::InvalidArguments { server, .. }
            | Self::Remote { server, .. }
            | Self::Transport { server, .. }
            | Self::Timeout { server, .. } => Some(server),
            Self::NotFound(_) => None,
        }
    }
}
