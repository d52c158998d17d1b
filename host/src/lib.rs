//! Lifecycle manager for external MCP tool servers
//!
//! Servers declared in configuration are started lazily on first use, shared
//! by every tool they expose, and closed together by a single shutdown pass.
//!
//! ```rust,ignore
//! let host = ToolHost::from_file(Path::new("mcp-host.toml"))?;
//! let reply = host.tools().call("mcp_echo", json!({ "message": "hi" })).await;
//! host.shutdown().await;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod host;
pub mod logging;
pub mod manager;
pub mod tool;
pub mod toolset;

#[cfg(test)]
mod testing;

pub use config::{ConfigLoader, LoadedConfig, ServerDescriptor, ToolDescriptor};
pub use error::{ConfigError, ConnectionError, StartupError, ToolError};
pub use host::ToolHost;
pub use manager::{ServerManager, ServerState, ServerStatus, ShutdownReport};
pub use tool::{ToolHandle, ToolOutput, ToolReply};
pub use toolset::ToolSet;
