use async_trait::async_trait;
use rmcp::model::{CallToolRequestParam, CallToolResult, JsonObject};
use rmcp::service::{Peer, ServiceError};
use rmcp::RoleClient;

use super::{RemoteTool, Session};
use crate::error::ConnectionError;

/// Session over an rmcp client peer
#[derive(Clone)]
pub struct McpSession {
    server: String,
    peer: Peer<RoleClient>,
}

impl McpSession {
    pub fn new(server: &str, peer: Peer<RoleClient>) -> Self {
        Self {
            server: server.to_string(),
            peer,
        }
    }
}

#[async_trait]
impl Session for McpSession {
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, ConnectionError> {
        self.peer
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(request_error)
    }

    async fn list_tools(&self) -> Result<Vec<RemoteTool>, ConnectionError> {
        let response = self
            .peer
            .list_tools(Default::default())
            .await
            .map_err(request_error)?;

        let tools = response
            .tools
            .into_iter()
            .map(|t| RemoteTool {
                server: self.server.clone(),
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()),
                input_schema: serde_json::to_value(&t.input_schema).ok(),
            })
            .collect();
        Ok(tools)
    }

    fn is_closed(&self) -> bool {
        self.peer.is_transport_closed()
    }
}

fn request_error(err: ServiceError) -> ConnectionError {
    match err {
        ServiceError::McpError(data) => ConnectionError::Rejected {
            code: data.code.0,
            message: data.message.to_string(),
        },
        ServiceError::TransportClosed => ConnectionError::Closed,
        other => ConnectionError::Request(other.to_string()),
    }
}
