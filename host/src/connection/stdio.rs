//! Local-process transport: spawn the server and speak MCP over its stdio.

use std::collections::BTreeMap;
use std::path::Path;

use rmcp::service::RunningService;
use rmcp::transport::TokioChildProcess;
use rmcp::{RoleClient, ServiceExt};
use tokio::process::Command;

use crate::error::ConnectionError;

pub(super) async fn connect(
    command: &str,
    args: &[String],
    working_dir: Option<&Path>,
    env: &BTreeMap<String, String>,
) -> Result<RunningService<RoleClient, ()>, ConnectionError> {
    tracing::debug!("Spawning MCP server process: {} {:?}", command, args);

    let mut cmd = Command::new(command);
    if !args.is_empty() {
        cmd.args(args);
    }
    // Overrides only; the rest of the host environment is inherited
    cmd.envs(env);
    if let Some(dir) = working_dir {
        cmd.current_dir(dir);
    }
    cmd.kill_on_drop(true);

    let transport = TokioChildProcess::new(cmd).map_err(|source| ConnectionError::Spawn {
        command: command.to_string(),
        source,
    })?;

    ().serve(transport)
        .await
        .map_err(|e| ConnectionError::Handshake(e.to_string()))
}
