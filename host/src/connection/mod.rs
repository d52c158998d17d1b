//! Connections to tool servers
//!
//! A [`Connection`] owns one established session (or none yet) with a single
//! server. The manager only sees the [`Connection`] and [`Session`] traits, so
//! the transport behind them can be swapped, including for a mock in tests.

mod http;
mod session;
mod stdio;

use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::{CallToolResult, JsonObject};
use rmcp::service::RunningService;
use rmcp::RoleClient;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::config::{LaunchSpec, ServerDescriptor};
use crate::error::ConnectionError;

pub use session::McpSession;

/// A tool as advertised by a server
#[derive(Debug, Clone)]
pub struct RemoteTool {
    /// Server this tool belongs to
    pub server: String,
    /// Tool name on the server
    pub name: String,
    /// Tool description
    pub description: Option<String>,
    /// Input schema (JSON)
    pub input_schema: Option<Value>,
}

/// An established session that accepts requests.
#[async_trait]
pub trait Session: Send + Sync {
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, ConnectionError>;

    async fn list_tools(&self) -> Result<Vec<RemoteTool>, ConnectionError>;

    /// True once the underlying transport has gone away
    fn is_closed(&self) -> bool {
        false
    }
}

/// Shared handle to a running session
pub type SessionHandle = Arc<dyn Session>;

/// One connection to one server.
///
/// `close` is idempotent and succeeds on a connection that never connected.
#[async_trait]
pub trait Connection: Send + Sync {
    async fn connect(&self) -> Result<SessionHandle, ConnectionError>;

    async fn close(&self) -> Result<(), ConnectionError>;
}

/// Builds connections from descriptors.
pub trait Connector: Send + Sync {
    fn create(&self, descriptor: &ServerDescriptor) -> Arc<dyn Connection>;
}

/// Connector for real MCP servers over stdio or streamable HTTP
#[derive(Debug, Default, Clone, Copy)]
pub struct McpConnector;

impl Connector for McpConnector {
    fn create(&self, descriptor: &ServerDescriptor) -> Arc<dyn Connection> {
        Arc::new(McpConnection::new(descriptor.clone()))
    }
}

/// A connection backed by an rmcp client service
pub struct McpConnection {
    descriptor: ServerDescriptor,
    service: Mutex<Option<RunningService<RoleClient, ()>>>,
}

impl McpConnection {
    pub fn new(descriptor: ServerDescriptor) -> Self {
        Self {
            descriptor,
            service: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Connection for McpConnection {
    async fn connect(&self) -> Result<SessionHandle, ConnectionError> {
        let mut slot = self.service.lock().await;
        if slot.is_some() {
            return Err(ConnectionError::Handshake(format!(
                "server '{}' is already connected",
                self.descriptor.id
            )));
        }

        let service = match &self.descriptor.launch {
            LaunchSpec::Process {
                command,
                args,
                working_dir,
            } => {
                stdio::connect(command, args, working_dir.as_deref(), &self.descriptor.env).await?
            }
            LaunchSpec::Endpoint { url, headers } => http::connect(url, headers).await?,
        };

        let session = McpSession::new(&self.descriptor.id, service.peer().clone());
        *slot = Some(service);
        Ok(Arc::new(session))
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        let service = self.service.lock().await.take();
        match service {
            Some(service) => {
                service
                    .cancel()
                    .await
                    .map_err(|e| ConnectionError::Close(e.to_string()))?;
                tracing::debug!("Closed connection to '{}'", self.descriptor.id);
                Ok(())
            }
            None => Ok(()),
        }
    }
}
