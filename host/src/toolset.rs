//! The catalogue of tools offered to consumers, keyed by effective name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::{ToolDescriptor, Visibility};
use crate::error::ToolError;
use crate::manager::ServerManager;
use crate::tool::{ToolHandle, ToolReply};

/// Tool handles in declaration order, unique by effective name
#[derive(Debug, Default, Clone)]
pub struct ToolSet {
    tools: Vec<ToolHandle>,
    index: HashMap<String, usize>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build handles for every enabled tool on an enabled server.
    ///
    /// Tools whose server is unknown to `manager` or disabled are skipped.
    pub fn build<'a, I>(tools: I, manager: &Arc<ServerManager>, call_timeout: Duration) -> Self
    where
        I: IntoIterator<Item = &'a ToolDescriptor>,
    {
        let mut set = Self::new();
        for descriptor in tools {
            if !descriptor.enabled {
                tracing::debug!("Skipping disabled tool '{}'", descriptor.name);
                continue;
            }
            match manager.descriptor(&descriptor.server) {
                Some(server) if server.enabled => {}
                _ => {
                    tracing::debug!(
                        "Skipping tool '{}': server '{}' is not available",
                        descriptor.name,
                        descriptor.server
                    );
                    continue;
                }
            }
            set.insert(ToolHandle::new(
                descriptor.clone(),
                Arc::clone(manager),
                call_timeout,
            ));
        }
        set
    }

    /// Add a handle. A handle with the same name is replaced in place and the
    /// replaced handle is returned.
    pub fn insert(&mut self, handle: ToolHandle) -> Option<ToolHandle> {
        match self.index.get(handle.name()) {
            Some(&position) => {
                let previous = std::mem::replace(&mut self.tools[position], handle);
                tracing::warn!(
                    "Tool name collision: '{}' from server '{}' overrides server '{}'",
                    previous.name(),
                    self.tools[position].server(),
                    previous.server()
                );
                Some(previous)
            }
            None => {
                self.index.insert(handle.name().to_string(), self.tools.len());
                self.tools.push(handle);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolHandle> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolHandle> {
        self.tools.iter()
    }

    pub fn always_available(&self) -> impl Iterator<Item = &ToolHandle> {
        self.with_visibility(Visibility::AlwaysAvailable)
    }

    pub fn on_demand(&self) -> impl Iterator<Item = &ToolHandle> {
        self.with_visibility(Visibility::OnDemand)
    }

    fn with_visibility(&self, visibility: Visibility) -> impl Iterator<Item = &ToolHandle> {
        self.tools.iter().filter(move |t| t.visibility() == visibility)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Call a tool by name. Never fails; errors come back as an error reply.
    pub async fn call(&self, name: &str, arguments: Value) -> ToolReply {
        match self.get(name) {
            Some(tool) => tool.call(arguments).await,
            None => ToolReply::error(ToolError::NotFound(name.to_string()).to_string()),
        }
    }
}
