//! Echo MCP Server
//!
//! Minimal stdio server used to exercise the host end to end.
//! Tools: `echo`, `add`, `fail`.
//!
//! `--upper` and `--prefix` (or `ECHO_MCP_PREFIX`) shape the echoed text, so
//! tests can check that arguments and environment reach the child process.

use clap::Parser;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(name = "echo-mcp", about = "Echo MCP server for host tests")]
struct Args {
    /// Upper-case echoed messages
    #[arg(long)]
    upper: bool,

    /// Text put in front of every echoed message
    #[arg(long, env = "ECHO_MCP_PREFIX", default_value = "")]
    prefix: String,
}

#[derive(Clone)]
pub struct EchoMcpServer {
    prefix: String,
    upper: bool,
    tool_router: ToolRouter<Self>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct EchoParams {
    #[schemars(description = "Text to echo back")]
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AddParams {
    #[schemars(description = "First operand")]
    pub a: i64,
    #[schemars(description = "Second operand")]
    pub b: i64,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct FailParams {
    #[schemars(description = "Error message to report")]
    pub reason: Option<String>,
}

#[tool_router]
impl EchoMcpServer {
    pub fn new(prefix: String, upper: bool) -> Self {
        Self {
            prefix,
            upper,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Echo the given message back")]
    async fn echo(&self, Parameters(params): Parameters<EchoParams>) -> Result<CallToolResult, McpError> {
        let message = if self.upper {
            params.message.to_uppercase()
        } else {
            params.message
        };
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{}{}",
            self.prefix, message
        ))]))
    }

    #[tool(description = "Add two integers")]
    async fn add(&self, Parameters(params): Parameters<AddParams>) -> Result<CallToolResult, McpError> {
        let sum = params
            .a
            .checked_add(params.b)
            .ok_or_else(|| McpError::invalid_params("integer overflow", None))?;
        Ok(CallToolResult::success(vec![Content::text(sum.to_string())]))
    }

    #[tool(description = "Always fail with the given reason")]
    async fn fail(&self, Parameters(params): Parameters<FailParams>) -> Result<CallToolResult, McpError> {
        let reason = params.reason.unwrap_or_else(|| "requested failure".to_string());
        Ok(CallToolResult::error(vec![Content::text(reason)]))
    }
}

impl Default for EchoMcpServer {
    fn default() -> Self {
        Self::new(String::new(), false)
    }
}

#[tool_handler]
impl rmcp::ServerHandler for EchoMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some("Echo MCP Server - echo, add and fail tools for testing.".into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    mcp_host::logging::init_tracing("echo_mcp")?;

    tracing::info!("Starting echo_mcp MCP Server");

    let service = EchoMcpServer::new(args.prefix, args.upper)
        .serve(rmcp::transport::stdio())
        .await?;

    tracing::info!("Server running, waiting for requests...");

    service.waiting().await?;

    tracing::info!("Server shutting down");
    Ok(())
}
