//! Configuration loading
//!
//! Servers and the tools they expose are declared in `mcp-host.toml`:
//!
//! ```toml
//! [global]
//! startup_timeout_secs = 30
//!
//! [servers.github]
//! command = "github-mcp-server"
//! args = ["stdio"]
//! env = { GITHUB_TOKEN = "${GITHUB_TOKEN}" }
//!
//! [servers.github.tools.search_issues]
//! visibility = "always"
//! alias = "gh_search"
//! ```
//!
//! `${VAR}` placeholders in any string value of a server section are expanded
//! once, at load time. A placeholder naming an unset variable rejects the whole
//! server section ([`ConfigError::UnsetVariable`]); other sections still load.
//! Only the braced form is a placeholder: a bare `$` (in a password, a regex
//! argument) is kept as written.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::{Captures, Regex};
use serde::Deserialize;

use crate::error::ConfigError;

/// File name searched for by [`find_config_file`].
pub const CONFIG_FILE_NAME: &str = "mcp-host.toml";

/// Names owned by the surrounding runtime that no external tool may take.
pub const BUILTIN_RESERVED_NAMES: &[&str] = &[
    "load_tools",
    "list_tools",
    "delegate_task",
    "read_file",
    "write_file",
];

/// Default startup timeout for spawning and initializing a server
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default tool call timeout
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for closing a single server during shutdown
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

static PLACEHOLDER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid placeholder regex")
});

/// Find a config file by walking up the directory tree, then checking global config.
///
/// Search order:
/// 1. Current directory and parent directories (walking up to root)
/// 2. Global config at `<config_dir>/mcp-host/`
pub fn find_config_file(filename: &str) -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let candidate = current.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    let global_path = dirs::config_dir()?.join("mcp-host").join(filename);
    global_path.exists().then_some(global_path)
}

// ============================================================================
// Descriptors
// ============================================================================

/// How a server is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TransportKind {
    /// Child process speaking MCP over stdin/stdout
    #[serde(rename = "stdio", alias = "local-process")]
    LocalProcess,
    /// Remote MCP endpoint over streamable HTTP
    #[serde(rename = "streamable-http", alias = "remote-stream", alias = "http")]
    RemoteStream,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalProcess => write!(f, "stdio"),
            Self::RemoteStream => write!(f, "streamable-http"),
        }
    }
}

/// Everything needed to establish a session, per transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchSpec {
    Process {
        command: String,
        args: Vec<String>,
        working_dir: Option<PathBuf>,
    },
    Endpoint {
        url: String,
        /// Passed through verbatim on every request (credentials live here)
        headers: BTreeMap<String, String>,
    },
}

/// An immutable, fully resolved server declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDescriptor {
    pub id: String,
    pub launch: LaunchSpec,
    /// Environment overrides for the child process, placeholders already expanded
    pub env: BTreeMap<String, String>,
    pub enabled: bool,
    /// Overrides the global startup timeout for this server
    pub startup_timeout: Option<Duration>,
}

impl ServerDescriptor {
    /// A local-process server running `command`.
    pub fn local(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            launch: LaunchSpec::Process {
                command: command.into(),
                args: Vec::new(),
                working_dir: None,
            },
            env: BTreeMap::new(),
            enabled: true,
            startup_timeout: None,
        }
    }

    /// A remote-stream server at `url`.
    pub fn remote(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            launch: LaunchSpec::Endpoint {
                url: url.into(),
                headers: BTreeMap::new(),
            },
            env: BTreeMap::new(),
            enabled: true,
            startup_timeout: None,
        }
    }

    pub fn with_args<I, S>(mut self, new_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let LaunchSpec::Process { args, .. } = &mut self.launch {
            *args = new_args.into_iter().map(Into::into).collect();
        }
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = Some(timeout);
        self
    }

    pub fn transport(&self) -> TransportKind {
        match self.launch {
            LaunchSpec::Process { .. } => TransportKind::LocalProcess,
            LaunchSpec::Endpoint { .. } => TransportKind::RemoteStream,
        }
    }
}

/// Whether a tool is offered by default or only when loaded by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum Visibility {
    #[serde(rename = "always", alias = "always-available")]
    AlwaysAvailable,
    #[default]
    #[serde(rename = "on-demand", alias = "on_demand")]
    OnDemand,
}

/// How a remote operation name becomes the locally registered name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Naming {
    Alias(String),
    Prefix(String),
    Verbatim,
}

impl Naming {
    /// An alias always wins over a prefix.
    pub fn from_directives(alias: Option<String>, prefix: Option<String>) -> Self {
        match (alias, prefix) {
            (Some(alias), _) => Self::Alias(alias),
            (None, Some(prefix)) => Self::Prefix(prefix),
            (None, None) => Self::Verbatim,
        }
    }

    pub fn resolve(&self, remote_name: &str) -> String {
        match self {
            Self::Alias(alias) => alias.clone(),
            Self::Prefix(prefix) => format!("{prefix}{remote_name}"),
            Self::Verbatim => remote_name.to_string(),
        }
    }
}

/// An immutable tool declaration with its effective name already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    /// Owning server id
    pub server: String,
    /// Operation name on the remote server
    pub remote_name: String,
    /// Effective local name
    pub name: String,
    pub enabled: bool,
    pub visibility: Visibility,
    pub naming: Naming,
    pub description: Option<String>,
}

impl ToolDescriptor {
    pub fn new(server: impl Into<String>, remote_name: impl Into<String>, naming: Naming) -> Self {
        let remote_name = remote_name.into();
        Self {
            server: server.into(),
            name: naming.resolve(&remote_name),
            remote_name,
            enabled: true,
            visibility: Visibility::default(),
            naming,
            description: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Settings from the `[global]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalSettings {
    pub startup_timeout: Duration,
    pub call_timeout: Duration,
    pub close_timeout: Duration,
    pub reserved_names: BTreeSet<String>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            reserved_names: BUILTIN_RESERVED_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Result of a load: every section that passed validation plus the
/// per-section errors of the ones that did not.
#[derive(Debug, Default)]
pub struct LoadedConfig {
    pub global: GlobalSettings,
    /// In declaration order
    pub servers: Vec<ServerDescriptor>,
    /// In declaration order, grouped by server
    pub tools: Vec<ToolDescriptor>,
    pub errors: Vec<ConfigError>,
}

impl LoadedConfig {
    pub fn server(&self, id: &str) -> Option<&ServerDescriptor> {
        self.servers.iter().find(|s| s.id == id)
    }
}

// ============================================================================
// Raw file sections
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGlobal {
    startup_timeout_secs: Option<u64>,
    call_timeout_secs: Option<u64>,
    close_timeout_secs: Option<u64>,
    #[serde(default)]
    reserved_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawServer {
    transport: Option<TransportKind>,
    command: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    url: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    #[serde(default = "default_enabled")]
    enabled: bool,
    prefix: Option<String>,
    startup_timeout_secs: Option<u64>,
    #[serde(default)]
    tools: toml::Table,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTool {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    visibility: Visibility,
    alias: Option<String>,
    prefix: Option<String>,
    description: Option<String>,
}

fn default_enabled() -> bool {
    true
}

// ============================================================================
// Loader
// ============================================================================

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Parses configuration text into descriptors.
///
/// Loading never touches the network or spawns anything.
#[derive(Clone)]
pub struct ConfigLoader {
    reserved_names: BTreeSet<String>,
    env: EnvLookup,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader reading placeholders from the process environment.
    pub fn new() -> Self {
        Self {
            reserved_names: BUILTIN_RESERVED_NAMES.iter().map(|s| s.to_string()).collect(),
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Add names owned by the embedding runtime.
    pub fn with_reserved_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Resolve placeholders from `lookup` instead of the process environment.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    /// Load from a specific path
    pub fn load_file(&self, path: &Path) -> Result<LoadedConfig, ConfigError> {
        tracing::debug!("Loading configuration from: {}", path.display());
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.load_str(&content)
    }

    /// Parse configuration text.
    ///
    /// Only a syntactically broken document (or a malformed `[global]`) fails
    /// the whole load. Invalid server sections are skipped and reported in
    /// [`LoadedConfig::errors`].
    pub fn load_str(&self, content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut root: toml::Table = toml::from_str(content)?;

        let raw_global: RawGlobal = match root.remove("global") {
            Some(value) => value.try_into()?,
            None => RawGlobal::default(),
        };
        let global = self.global_settings(raw_global)?;

        let servers = match root.remove("servers") {
            Some(toml::Value::Table(servers)) => servers,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "'servers' must be a table, found {}",
                    other.type_str()
                )))
            }
            None => toml::Table::new(),
        };

        for key in root.keys() {
            tracing::warn!("Ignoring unknown configuration section '{}'", key);
        }

        let mut loaded = LoadedConfig {
            global,
            ..Default::default()
        };

        for (id, section) in servers {
            match self.load_server(&id, section, &loaded.global) {
                Ok((server, tools)) => {
                    loaded.servers.push(server);
                    loaded.tools.extend(tools);
                }
                Err(e) => {
                    tracing::warn!("Skipping server '{}': {}", id, e);
                    loaded.errors.push(e);
                }
            }
        }

        tracing::info!(
            "Loaded {} server(s) and {} tool(s), {} section(s) rejected",
            loaded.servers.len(),
            loaded.tools.len(),
            loaded.errors.len()
        );
        Ok(loaded)
    }

    fn global_settings(&self, raw: RawGlobal) -> Result<GlobalSettings, ConfigError> {
        let defaults = GlobalSettings::default();
        let mut reserved_names = self.reserved_names.clone();
        reserved_names.extend(raw.reserved_names);

        Ok(GlobalSettings {
            startup_timeout: timeout_or("startup_timeout_secs", raw.startup_timeout_secs, defaults.startup_timeout)?,
            call_timeout: timeout_or("call_timeout_secs", raw.call_timeout_secs, defaults.call_timeout)?,
            close_timeout: timeout_or("close_timeout_secs", raw.close_timeout_secs, defaults.close_timeout)?,
            reserved_names,
        })
    }

    fn load_server(
        &self,
        id: &str,
        mut section: toml::Value,
        global: &GlobalSettings,
    ) -> Result<(ServerDescriptor, Vec<ToolDescriptor>), ConfigError> {
        if id.trim().is_empty() {
            return Err(ConfigError::Section {
                server: id.to_string(),
                message: "server id must not be empty".to_string(),
            });
        }

        self.expand_placeholders(id, &mut section)?;

        let raw: RawServer = section.try_into().map_err(|e: toml::de::Error| ConfigError::Section {
            server: id.to_string(),
            message: e.message().to_string(),
        })?;

        let launch = launch_spec(id, &raw)?;
        let startup_timeout = match raw.startup_timeout_secs {
            Some(0) => {
                return Err(ConfigError::Section {
                    server: id.to_string(),
                    message: "startup_timeout_secs must be greater than zero".to_string(),
                })
            }
            Some(secs) => Some(Duration::from_secs(secs)),
            None => None,
        };

        let mut tools = Vec::with_capacity(raw.tools.len());
        for (remote_name, entry) in raw.tools {
            tools.push(tool_descriptor(id, remote_name, entry, raw.prefix.as_deref(), global)?);
        }

        let server = ServerDescriptor {
            id: id.to_string(),
            launch,
            env: raw.env,
            enabled: raw.enabled,
            startup_timeout,
        };
        Ok((server, tools))
    }

    fn expand_str(&self, server: &str, input: &str) -> Result<String, ConfigError> {
        let mut unset = None;
        let expanded = PLACEHOLDER_REGEX.replace_all(input, |caps: &Captures| {
            let name = &caps[1];
            (self.env)(name).unwrap_or_else(|| {
                unset.get_or_insert_with(|| name.to_string());
                String::new()
            })
        });

        match unset {
            Some(variable) => Err(ConfigError::UnsetVariable {
                server: server.to_string(),
                variable,
            }),
            None => Ok(expanded.into_owned()),
        }
    }

    /// Expand `${VAR}` in every string of a section, in place.
    fn expand_placeholders(&self, server: &str, value: &mut toml::Value) -> Result<(), ConfigError> {
        match value {
            toml::Value::String(s) => {
                *s = self.expand_str(server, s)?;
            }
            toml::Value::Array(items) => {
                for item in items {
                    self.expand_placeholders(server, item)?;
                }
            }
            toml::Value::Table(table) => {
                for (_, item) in table.iter_mut() {
                    self.expand_placeholders(server, item)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

fn timeout_or(field: &str, secs: Option<u64>, default: Duration) -> Result<Duration, ConfigError> {
    match secs {
        Some(0) => Err(ConfigError::Invalid(format!("global.{field} must be greater than zero"))),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}

fn launch_spec(id: &str, raw: &RawServer) -> Result<LaunchSpec, ConfigError> {
    let transport = match (raw.transport, &raw.command, &raw.url) {
        (Some(kind), _, _) => kind,
        (None, Some(_), None) => TransportKind::LocalProcess,
        (None, None, Some(_)) => TransportKind::RemoteStream,
        (None, Some(_), Some(_)) => {
            return Err(ConfigError::Section {
                server: id.to_string(),
                message: "both 'command' and 'url' given; set 'transport' or remove one".to_string(),
            })
        }
        (None, None, None) => {
            return Err(ConfigError::MissingField {
                server: id.to_string(),
                field: "command",
            })
        }
    };

    match transport {
        TransportKind::LocalProcess => {
            let command = raw
                .command
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .ok_or_else(|| ConfigError::MissingField {
                    server: id.to_string(),
                    field: "command",
                })?;
            Ok(LaunchSpec::Process {
                command: command.to_string(),
                args: raw.args.clone(),
                working_dir: raw.working_dir.clone(),
            })
        }
        TransportKind::RemoteStream => {
            let url = raw
                .url
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingField {
                    server: id.to_string(),
                    field: "url",
                })?;
            validate_endpoint(id, url)?;
            Ok(LaunchSpec::Endpoint {
                url: url.to_string(),
                headers: raw.headers.clone(),
            })
        }
    }
}

fn validate_endpoint(id: &str, url: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEndpoint {
        server: id.to_string(),
        url: url.to_string(),
        reason,
    };

    let parsed = url::Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

fn tool_descriptor(
    server: &str,
    remote_name: String,
    entry: toml::Value,
    server_prefix: Option<&str>,
    global: &GlobalSettings,
) -> Result<ToolDescriptor, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidTool {
        server: server.to_string(),
        tool: remote_name.clone(),
        message,
    };

    let raw: RawTool = entry
        .try_into()
        .map_err(|e: toml::de::Error| invalid(e.message().to_string()))?;

    if raw.alias.as_deref().is_some_and(|a| a.trim().is_empty()) {
        return Err(invalid("alias must not be empty".to_string()));
    }

    let prefix = raw.prefix.or_else(|| server_prefix.map(str::to_string));
    let naming = Naming::from_directives(raw.alias, prefix);
    let name = naming.resolve(&remote_name);

    if let Some(bad) = name.chars().find(|c| !is_name_char(*c)) {
        return Err(invalid(format!("resolved name '{name}' contains '{bad}'")));
    }

    if global.reserved_names.contains(&name) {
        return Err(ConfigError::ReservedName {
            server: server.to_string(),
            tool: remote_name,
            name,
        });
    }

    let mut descriptor = ToolDescriptor::new(server, remote_name, naming)
        .with_visibility(raw.visibility)
        .with_enabled(raw.enabled);
    if let Some(description) = raw.description {
        descriptor = descriptor.with_description(description);
    }
    Ok(descriptor)
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> ConfigLoader {
        ConfigLoader::new().with_env(|name| match name {
            "FOO" => Some("bar".to_string()),
            "TOKEN" => Some("s3cret".to_string()),
            _ => None,
        })
    }

    #[test]
    fn test_naming_resolution() {
        // Alias wins regardless of prefix
        let naming = Naming::from_directives(Some("mcp_echo".into()), Some("x_".into()));
        assert_eq!(naming.resolve("echo"), "mcp_echo");

        let naming = Naming::from_directives(None, Some("x_".into()));
        assert_eq!(naming.resolve("echo"), "x_echo");

        let naming = Naming::from_directives(None, None);
        assert_eq!(naming.resolve("echo"), "echo");
    }

    #[test]
    fn test_env_substitution() {
        let config = loader()
            .load_str(
                r#"
                [servers.local]
                command = "${FOO}"
                args = ["--token", "${TOKEN}"]
                env = { KEY = "${FOO}" }
                "#,
            )
            .unwrap();

        assert!(config.errors.is_empty());
        let server = config.server("local").unwrap();
        assert_eq!(server.env.get("KEY").map(String::as_str), Some("bar"));
        match &server.launch {
            LaunchSpec::Process { command, args, .. } => {
                assert_eq!(command, "bar");
                assert_eq!(args, &["--token", "s3cret"]);
            }
            other => panic!("unexpected launch spec: {other:?}"),
        }
    }

    #[test]
    fn test_env_substitution_from_process_environment() {
        std::env::set_var("MCP_HOST_TEST_SUBST_FOO", "bar");
        let config = ConfigLoader::new()
            .load_str(
                r#"
                [servers.remote]
                url = "https://example.com/mcp"
                headers = { Authorization = "${MCP_HOST_TEST_SUBST_FOO}" }
                "#,
            )
            .unwrap();

        let server = config.server("remote").unwrap();
        match &server.launch {
            LaunchSpec::Endpoint { headers, .. } => {
                assert_eq!(headers.get("Authorization").map(String::as_str), Some("bar"));
            }
            other => panic!("unexpected launch spec: {other:?}"),
        }
    }

    #[test]
    fn test_bare_dollar_is_not_a_placeholder() {
        let config = ConfigLoader::new()
            .with_env(|_| None)
            .load_str(
                r#"
                [servers.remote]
                url = "https://example.com/mcp"
                headers = { Authorization = "Bearer pa$sword" }

                [servers.local]
                command = "grep"
                args = ["^foo$", "$HOME", "$"]
                "#,
            )
            .unwrap();

        assert!(config.errors.is_empty(), "{:?}", config.errors);
        match &config.server("remote").unwrap().launch {
            LaunchSpec::Endpoint { headers, .. } => {
                assert_eq!(headers.get("Authorization").map(String::as_str), Some("Bearer pa$sword"));
            }
            other => panic!("unexpected launch spec: {other:?}"),
        }
        match &config.server("local").unwrap().launch {
            LaunchSpec::Process { args, .. } => assert_eq!(args, &["^foo$", "$HOME", "$"]),
            other => panic!("unexpected launch spec: {other:?}"),
        }
    }

    #[test]
    fn test_placeholders_inside_longer_strings() {
        let config = loader()
            .load_str(
                r#"
                [servers.remote]
                url = "https://example.com/mcp"
                headers = { Authorization = "Bearer ${TOKEN}", X-Both = "${FOO}-${TOKEN}$" }
                "#,
            )
            .unwrap();

        match &config.server("remote").unwrap().launch {
            LaunchSpec::Endpoint { headers, .. } => {
                assert_eq!(headers["Authorization"], "Bearer s3cret");
                assert_eq!(headers["X-Both"], "bar-s3cret$");
            }
            other => panic!("unexpected launch spec: {other:?}"),
        }
    }

    #[test]
    fn test_unset_variable_rejects_only_that_server() {
        let config = loader()
            .load_str(
                r#"
                [servers.broken]
                command = "server"
                env = { KEY = "${MCP_HOST_DEFINITELY_UNSET}" }

                [servers.fine]
                command = "server"
                "#,
            )
            .unwrap();

        assert!(config.server("broken").is_none());
        assert!(config.server("fine").is_some());
        assert_eq!(config.errors.len(), 1);
        match &config.errors[0] {
            ConfigError::UnsetVariable { server, variable } => {
                assert_eq!(server, "broken");
                assert_eq!(variable, "MCP_HOST_DEFINITELY_UNSET");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_command() {
        let config = loader()
            .load_str(
                r#"
                [servers.empty]
                enabled = true
                "#,
            )
            .unwrap();

        assert!(matches!(
            config.errors.as_slice(),
            [ConfigError::MissingField { field: "command", .. }]
        ));
    }

    #[test]
    fn test_explicit_remote_transport_requires_url() {
        let config = loader()
            .load_str(
                r#"
                [servers.remote]
                transport = "streamable-http"
                command = "ignored"
                "#,
            )
            .unwrap();

        assert!(matches!(
            config.errors.as_slice(),
            [ConfigError::MissingField { field: "url", .. }]
        ));
    }

    #[test]
    fn test_invalid_endpoint() {
        let config = loader()
            .load_str(
                r#"
                [servers.remote]
                url = "ftp://example.com"
                "#,
            )
            .unwrap();

        assert!(matches!(
            config.errors.as_slice(),
            [ConfigError::InvalidEndpoint { .. }]
        ));
    }

    #[test]
    fn test_reserved_alias_rejected() {
        let config = loader()
            .with_reserved_names(["runtime_tool"])
            .load_str(
                r#"
                [servers.a]
                command = "a"
                [servers.a.tools.echo]
                alias = "load_tools"

                [servers.b]
                command = "b"
                [servers.b.tools.echo]
                alias = "runtime_tool"

                [servers.c]
                command = "c"
                [servers.c.tools.echo]
                alias = "c_echo"
                "#,
            )
            .unwrap();

        assert_eq!(config.errors.len(), 2);
        assert!(config
            .errors
            .iter()
            .all(|e| matches!(e, ConfigError::ReservedName { .. })));
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.tools[0].name, "c_echo");
    }

    #[test]
    fn test_global_reserved_names_extend_builtins() {
        let config = loader()
            .load_str(
                r#"
                [global]
                reserved_names = ["shell"]

                [servers.a]
                command = "a"
                [servers.a.tools.shell]
                "#,
            )
            .unwrap();

        assert!(config.global.reserved_names.contains("shell"));
        assert!(config.global.reserved_names.contains("load_tools"));
        assert!(matches!(
            config.errors.as_slice(),
            [ConfigError::ReservedName { .. }]
        ));
    }

    #[test]
    fn test_tools_keep_declaration_order_and_prefixes() {
        let config = loader()
            .load_str(
                r#"
                [servers.test_stdio]
                command = "server"
                prefix = "srv_"

                [servers.test_stdio.tools.zeta]
                visibility = "always"

                [servers.test_stdio.tools.alpha]
                prefix = "own_"
                description = "Alpha"

                [servers.test_stdio.tools.mid]
                alias = "middle"
                enabled = false
                "#,
            )
            .unwrap();

        let names: Vec<_> = config.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["srv_zeta", "own_alpha", "middle"]);
        assert_eq!(config.tools[0].visibility, Visibility::AlwaysAvailable);
        assert_eq!(config.tools[1].visibility, Visibility::OnDemand);
        assert_eq!(config.tools[1].description.as_deref(), Some("Alpha"));
        assert!(!config.tools[2].enabled);
    }

    #[test]
    fn test_global_defaults_and_overrides() {
        let config = loader().load_str("").unwrap();
        assert_eq!(config.global.startup_timeout, DEFAULT_STARTUP_TIMEOUT);
        assert_eq!(config.global.call_timeout, DEFAULT_CALL_TIMEOUT);

        let config = loader()
            .load_str(
                r#"
                [global]
                startup_timeout_secs = 5
                call_timeout_secs = 7
                "#,
            )
            .unwrap();
        assert_eq!(config.global.startup_timeout, Duration::from_secs(5));
        assert_eq!(config.global.call_timeout, Duration::from_secs(7));
        assert_eq!(config.global.close_timeout, DEFAULT_CLOSE_TIMEOUT);
    }

    #[test]
    fn test_syntax_error_fails_whole_load() {
        let result = loader().load_str("[servers.a\ncommand = ");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_field_rejects_section() {
        let config = loader()
            .load_str(
                r#"
                [servers.a]
                command = "a"
                comand = "typo"
                "#,
            )
            .unwrap();
        assert!(matches!(
            config.errors.as_slice(),
            [ConfigError::Section { .. }]
        ));
    }

    #[test]
    fn test_disabled_server_still_described() {
        let config = loader()
            .load_str(
                r#"
                [servers.off]
                command = "server"
                enabled = false
                "#,
            )
            .unwrap();
        let server = config.server("off").unwrap();
        assert!(!server.enabled);
        assert_eq!(server.transport(), TransportKind::LocalProcess);
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
            [servers.remote]
            url = "http://localhost:8080/mcp"
            "#,
        )
        .unwrap();

        let config = loader().load_file(&path).unwrap();
        assert_eq!(config.servers[0].transport(), TransportKind::RemoteStream);

        let missing = loader().load_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
