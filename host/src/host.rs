//! Facade tying a loaded configuration to a manager and its tool set.

use std::path::Path;
use std::sync::Arc;

use crate::config::{ConfigLoader, GlobalSettings, LoadedConfig};
use crate::connection::{Connector, McpConnector};
use crate::error::ConfigError;
use crate::manager::{ServerManager, ShutdownReport};
use crate::toolset::ToolSet;

/// Everything an application needs: the shared manager and the tools it backs.
#[derive(Debug)]
pub struct ToolHost {
    manager: Arc<ServerManager>,
    tools: ToolSet,
    global: GlobalSettings,
    config_errors: Vec<ConfigError>,
}

impl ToolHost {
    /// Build from a loaded configuration, connecting to real servers.
    pub fn new(config: LoadedConfig) -> Self {
        Self::with_connector(config, Arc::new(McpConnector))
    }

    pub fn with_connector(config: LoadedConfig, connector: Arc<dyn Connector>) -> Self {
        let LoadedConfig {
            global,
            servers,
            tools,
            errors,
        } = config;

        let manager = Arc::new(ServerManager::with_connector(servers, &global, connector));
        let tools = ToolSet::build(&tools, &manager, global.call_timeout);

        tracing::info!(
            "Tool host ready: {} server(s), {} tool(s) ({} always available)",
            manager.server_ids().len(),
            tools.len(),
            tools.always_available().count()
        );

        Self {
            manager,
            tools,
            global,
            config_errors: errors,
        }
    }

    /// Load `path` with the default loader and build a host from it.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Ok(Self::new(ConfigLoader::new().load_file(path)?))
    }

    pub fn manager(&self) -> &Arc<ServerManager> {
        &self.manager
    }

    pub fn tools(&self) -> &ToolSet {
        &self.tools
    }

    pub fn global(&self) -> &GlobalSettings {
        &self.global
    }

    /// Server sections rejected at load time
    pub fn config_errors(&self) -> &[ConfigError] {
        &self.config_errors
    }

    /// Close every server. Safe to call more than once.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.manager.shutdown().await
    }
}
