use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use mcp_host::config::{find_config_file, Visibility, CONFIG_FILE_NAME};
use mcp_host::{ToolHost, ToolOutput};

#[derive(Parser)]
#[command(name = "mcp-host")]
#[command(about = "Lazy lifecycle manager for external MCP tool servers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: nearest mcp-host.toml, then the global one)
    #[arg(long, global = true, env = "MCP_HOST_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured tools (does not start any server)
    Tools {
        /// Only list tools from a specific server
        #[arg(long)]
        server: Option<String>,
    },
    /// Call a tool directly, starting its server if needed
    Call {
        /// Tool name
        tool: String,
        /// Arguments as JSON
        #[arg(long, short)]
        args: Option<String>,
    },
    /// Start servers and list the tools they advertise
    Check {
        /// Only check this server
        server: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    mcp_host::logging::init_tracing("mcp_host")?;

    let cli = Cli::parse();

    let path = match cli.config {
        Some(path) => path,
        None => find_config_file(CONFIG_FILE_NAME).with_context(|| {
            format!("No {CONFIG_FILE_NAME} found in current directory, parents or global config")
        })?,
    };
    let host = ToolHost::from_file(&path)
        .with_context(|| format!("Failed to load {}", path.display()))?;

    let outcome = tokio::select! {
        result = run(&host, cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, shutting down");
            Err(anyhow::anyhow!("interrupted"))
        }
    };

    // The one teardown point for every exit path above
    let report = host.shutdown().await;
    for (server, err) in &report.failed {
        eprintln!("Failed to stop server '{}': {}", server, err);
    }

    outcome
}

async fn run(host: &ToolHost, command: Commands) -> Result<()> {
    match command {
        Commands::Tools { server } => run_tools(host, server.as_deref()),
        Commands::Call { tool, args } => run_call_tool(host, &tool, args).await,
        Commands::Check { server } => run_check(host, server.as_deref()).await,
    }
}

fn run_tools(host: &ToolHost, server_filter: Option<&str>) -> Result<()> {
    for err in host.config_errors() {
        println!("Skipped: {}", err);
    }

    for server in host.manager().server_ids() {
        if server_filter.is_some_and(|s| s != server) {
            continue;
        }

        let tools: Vec<_> = host.tools().iter().filter(|t| t.server() == server).collect();
        println!("=== {} ({} tools) ===", server, tools.len());
        for tool in tools {
            let marker = match tool.visibility() {
                Visibility::AlwaysAvailable => "*",
                Visibility::OnDemand => " ",
            };
            let desc = tool
                .description()
                .unwrap_or("No description")
                .lines()
                .next()
                .unwrap_or("");
            println!(" {} {} -> {} - {}", marker, tool.name(), tool.remote_name(), desc);
        }
        println!();
    }

    Ok(())
}

async fn run_call_tool(host: &ToolHost, tool_name: &str, args: Option<String>) -> Result<()> {
    let tool = host
        .tools()
        .get(tool_name)
        .with_context(|| format!("Tool '{}' not found", tool_name))?;

    let arguments: Value = match args {
        Some(json) => serde_json::from_str(&json).context("Arguments are not valid JSON")?,
        None => Value::Null,
    };

    println!("Calling tool: {} (server '{}')", tool_name, tool.server());
    println!();

    let output = tool.invoke(arguments).await?;

    println!("Result:");
    match output {
        ToolOutput::Text(text) => println!("{}", text),
        ToolOutput::Structured(value) => println!("{}", serde_json::to_string_pretty(&value)?),
    }

    Ok(())
}

async fn run_check(host: &ToolHost, server_filter: Option<&str>) -> Result<()> {
    let manager = host.manager();
    let mut failures = 0;

    for id in manager.server_ids() {
        if server_filter.is_some_and(|s| s != id) {
            continue;
        }

        let session = match manager.get_or_start(id).await {
            Ok(session) => session,
            Err(e) => {
                println!("[FAIL] {}", e);
                failures += 1;
                continue;
            }
        };

        match session.list_tools().await {
            Ok(tools) => {
                println!("[ OK ] {} ({} tools)", id, tools.len());
                for tool in tools {
                    println!("       {}", tool.name);
                }
            }
            Err(e) => {
                println!("[FAIL] {}: {}", id, e);
                failures += 1;
            }
        }
    }

    if let Some(id) = server_filter {
        if manager.descriptor(id).is_none() {
            anyhow::bail!("Server '{}' is not configured", id);
        }
    }
    if failures > 0 {
        anyhow::bail!("{} server(s) failed", failures);
    }
    Ok(())
}
