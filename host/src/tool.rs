//! Tool Adapter
//!
//! A [`ToolHandle`] wraps one remote operation as a locally callable tool.
//! The first invocation starts the owning server, so it may block for as long
//! as the server's startup timeout before the call itself begins.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rmcp::model::{CallToolResult, JsonObject, RawContent};
use serde_json::Value;
use tokio::time::Instant;

use crate::config::{ToolDescriptor, Visibility};
use crate::connection::SessionHandle;
use crate::error::{ConnectionError, ToolError};
use crate::manager::ServerManager;

/// JSON-RPC "invalid params"
const INVALID_PARAMS: i32 = -32602;

/// Normalized tool result
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Every content item was text; items joined by newlines
    Text(String),
    /// Structured content, or a JSON rendering of non-text content items
    Structured(Value),
}

impl ToolOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }
}

impl fmt::Display for ToolOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Structured(value) => write!(f, "{value}"),
        }
    }
}

/// What a consumer receives from a call: success and failure travel the same way.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReply {
    pub output: ToolOutput,
    pub is_error: bool,
}

impl ToolReply {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: ToolOutput::Text(message.into()),
            is_error: true,
        }
    }
}

impl From<Result<ToolOutput, ToolError>> for ToolReply {
    fn from(result: Result<ToolOutput, ToolError>) -> Self {
        match result {
            Ok(output) => Self {
                output,
                is_error: false,
            },
            Err(e) => Self::error(e.to_string()),
        }
    }
}

/// A remote operation exposed under its effective local name
#[derive(Clone)]
pub struct ToolHandle {
    descriptor: ToolDescriptor,
    manager: Arc<ServerManager>,
    call_timeout: Duration,
}

impl ToolHandle {
    pub fn new(descriptor: ToolDescriptor, manager: Arc<ServerManager>, call_timeout: Duration) -> Self {
        Self {
            descriptor,
            manager,
            call_timeout,
        }
    }

    /// Effective local name
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn server(&self) -> &str {
        &self.descriptor.server
    }

    pub fn remote_name(&self) -> &str {
        &self.descriptor.remote_name
    }

    pub fn description(&self) -> Option<&str> {
        self.descriptor.description.as_deref()
    }

    pub fn visibility(&self) -> Visibility {
        self.descriptor.visibility
    }

    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    /// Call the remote operation.
    ///
    /// Starts the owning server on first use and waits for it, bounded by the
    /// server's startup timeout. The call itself is bounded by the configured
    /// call timeout. `arguments` must be a JSON object or null.
    pub async fn invoke(&self, arguments: Value) -> Result<ToolOutput, ToolError> {
        self.run(arguments, None).await
    }

    /// Like [`invoke`](Self::invoke), with one deadline covering both the
    /// start (if needed) and the call.
    pub async fn invoke_within(&self, arguments: Value, timeout: Duration) -> Result<ToolOutput, ToolError> {
        self.run(arguments, Some(timeout)).await
    }

    /// Invoke and fold any failure into an error reply.
    pub async fn call(&self, arguments: Value) -> ToolReply {
        self.invoke(arguments).await.into()
    }

    async fn run(&self, arguments: Value, timeout: Option<Duration>) -> Result<ToolOutput, ToolError> {
        let result = self.run_inner(arguments, timeout).await;
        if let Err(e) = &result {
            tracing::warn!("Tool '{}' failed: {}", self.name(), e);
        }
        result
    }

    async fn run_inner(&self, arguments: Value, timeout: Option<Duration>) -> Result<ToolOutput, ToolError> {
        let arguments = self.arguments(arguments)?;
        let started = Instant::now();

        let session = match timeout {
            Some(timeout) => self.manager.get_or_start_within(self.server(), timeout).await,
            None => self.manager.get_or_start(self.server()).await,
        }
        .map_err(|source| ToolError::Startup {
            tool: self.name().to_string(),
            source,
        })?;

        let (deadline, after) = match timeout {
            Some(timeout) => (started + timeout, timeout),
            None => (Instant::now() + self.call_timeout, self.call_timeout),
        };

        tracing::debug!(
            "Calling '{}' on server '{}' as '{}'",
            self.remote_name(),
            self.server(),
            self.name()
        );

        let result = tokio::time::timeout_at(deadline, session.call_tool(self.remote_name(), arguments))
            .await
            .map_err(|_| ToolError::Timeout {
                server: self.server().to_string(),
                operation: self.remote_name().to_string(),
                after,
            })?;

        match result {
            Ok(result) => normalize(self.server(), self.remote_name(), result),
            Err(e) if is_lost(&e, &session) => {
                let err = self.call_error(&e);
                self.manager.invalidate(self.server(), &session, e).await;
                Err(err)
            }
            Err(e) => Err(self.call_error(&e)),
        }
    }

    fn arguments(&self, arguments: Value) -> Result<Option<JsonObject>, ToolError> {
        match arguments {
            Value::Null => Ok(None),
            Value::Object(map) => Ok(Some(map)),
            other => Err(ToolError::InvalidArguments {
                server: self.server().to_string(),
                operation: self.remote_name().to_string(),
                detail: format!("arguments must be a JSON object, got {}", json_type(&other)),
            }),
        }
    }

    fn call_error(&self, err: &ConnectionError) -> ToolError {
        let server = self.server().to_string();
        let operation = self.remote_name().to_string();
        match err {
            ConnectionError::Rejected { code, message } if *code == INVALID_PARAMS => {
                ToolError::InvalidArguments {
                    server,
                    operation,
                    detail: message.clone(),
                }
            }
            ConnectionError::Rejected { code, message } => ToolError::Remote {
                server,
                operation,
                detail: format!("{message} (code {code})"),
            },
            other => ToolError::Transport {
                server,
                operation,
                detail: other.to_string(),
            },
        }
    }
}

impl fmt::Debug for ToolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolHandle")
            .field("name", &self.descriptor.name)
            .field("server", &self.descriptor.server)
            .field("remote_name", &self.descriptor.remote_name)
            .finish()
    }
}

/// A failed request that leaves the session unusable
fn is_lost(err: &ConnectionError, session: &SessionHandle) -> bool {
    match err {
        ConnectionError::Rejected { .. } => false,
        ConnectionError::Closed => true,
        _ => session.is_closed(),
    }
}

/// Turn a raw call result into the local contract.
pub fn normalize(server: &str, operation: &str, result: CallToolResult) -> Result<ToolOutput, ToolError> {
    let texts: Vec<&str> = result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(text) => Some(text.text.as_str()),
            _ => None,
        })
        .collect();

    if result.is_error == Some(true) {
        let detail = if texts.is_empty() {
            "remote tool reported an error".to_string()
        } else {
            texts.join("\n")
        };
        return Err(ToolError::Remote {
            server: server.to_string(),
            operation: operation.to_string(),
            detail,
        });
    }

    if let Some(structured) = result.structured_content {
        return Ok(ToolOutput::Structured(structured));
    }

    if texts.len() == result.content.len() {
        return Ok(ToolOutput::Text(texts.join("\n")));
    }

    serde_json::to_value(&result.content)
        .map(ToolOutput::Structured)
        .map_err(|e| ToolError::Transport {
            server: server.to_string(),
            operation: operation.to_string(),
            detail: format!("failed to render content: {e}"),
        })
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
