//! Server Manager
//!
//! Owns one record per server id and hands out session handles. Servers are
//! started lazily on first use; concurrent callers for the same server share a
//! single start attempt. A failed start is remembered and returned to later
//! callers without retrying until [`ServerManager::reset`] is called. A
//! running session whose transport breaks is moved to `Failed` the same way,
//! so a reset reconnects it.
//!
//! Locking is per record. The record map is only locked for lookups and
//! inserts, never across I/O.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::config::{GlobalSettings, ServerDescriptor, TransportKind};
use crate::connection::{Connection, Connector, McpConnector, SessionHandle};
use crate::error::{ConnectionError, StartupError};

// =============================================================================
// State
// =============================================================================

enum ConnectionState {
    Unstarted,
    Starting,
    Running(SessionHandle),
    Failed(StartupError),
    Closed,
}

impl ConnectionState {
    fn public(&self) -> ServerState {
        match self {
            Self::Unstarted => ServerState::Unstarted,
            Self::Starting => ServerState::Starting,
            Self::Running(_) => ServerState::Running,
            Self::Failed(_) => ServerState::Failed,
            Self::Closed => ServerState::Closed,
        }
    }
}

/// Externally visible lifecycle state of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Unstarted,
    Starting,
    Running,
    Failed,
    Closed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unstarted => "unstarted",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Point-in-time status of one configured server
#[derive(Debug, Clone)]
pub struct ServerStatus {
    pub id: String,
    pub transport: TransportKind,
    pub enabled: bool,
    pub state: ServerState,
    /// Stored startup failure, if the server is in [`ServerState::Failed`]
    pub last_error: Option<String>,
}

/// Outcome of [`ServerManager::shutdown`]
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Servers whose connection closed cleanly
    pub closed: Vec<String>,
    /// Servers whose connection failed to close, with the cause
    pub failed: Vec<(String, ConnectionError)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct RecordInner {
    state: ConnectionState,
    connection: Option<Arc<dyn Connection>>,
}

struct ServerRecord {
    /// Serializes Unstarted -> Starting -> Running|Failed, and shutdown's close
    startup: tokio::sync::Mutex<()>,
    inner: Mutex<RecordInner>,
}

impl ServerRecord {
    fn new() -> Self {
        Self {
            startup: tokio::sync::Mutex::new(()),
            inner: Mutex::new(RecordInner {
                state: ConnectionState::Unstarted,
                connection: None,
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, RecordInner> {
        lock(&self.inner)
    }

    fn set_state(&self, state: ConnectionState) {
        self.inner().state = state;
    }

    /// The running session, if its transport has already gone away
    fn dead_session(&self) -> Option<SessionHandle> {
        match &self.inner().state {
            ConnectionState::Running(session) if session.is_closed() => Some(Arc::clone(session)),
            _ => None,
        }
    }

    /// The stored outcome, if there is one to return without starting.
    fn settled(&self, id: &str) -> Option<Result<SessionHandle, StartupError>> {
        match &self.inner().state {
            ConnectionState::Running(session) => Some(Ok(Arc::clone(session))),
            ConnectionState::Failed(err) => Some(Err(err.clone())),
            ConnectionState::Closed => Some(Err(StartupError::Closed {
                server: id.to_string(),
            })),
            ConnectionState::Unstarted | ConnectionState::Starting => None,
        }
    }
}

/// Rolls a record back out of `Starting` if the starting caller is dropped.
struct StartingGuard<'a> {
    record: &'a ServerRecord,
    armed: bool,
}

impl StartingGuard<'_> {
    fn settle(mut self, state: ConnectionState) {
        self.record.set_state(state);
        self.armed = false;
    }
}

impl Drop for StartingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut inner = self.record.inner();
            if matches!(inner.state, ConnectionState::Starting) {
                inner.state = ConnectionState::Unstarted;
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Absolute deadline supplied by a caller, with the budget it came from.
#[derive(Clone, Copy)]
struct Deadline {
    at: Instant,
    after: Duration,
}

impl Deadline {
    fn after(after: Duration) -> Self {
        Self {
            at: Instant::now() + after,
            after,
        }
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Lifecycle manager for all configured servers
///
/// Shared via `Arc` between every tool handle and the application's teardown
/// hook.
pub struct ServerManager {
    descriptors: HashMap<String, ServerDescriptor>,
    /// Declaration order, used for status and shutdown
    order: Vec<String>,
    records: Mutex<HashMap<String, Arc<ServerRecord>>>,
    closed: AtomicBool,
    connector: Arc<dyn Connector>,
    startup_timeout: Duration,
    close_timeout: Duration,
}

impl ServerManager {
    /// Create a manager that connects to real MCP servers
    pub fn new<I>(servers: I, global: &GlobalSettings) -> Self
    where
        I: IntoIterator<Item = ServerDescriptor>,
    {
        Self::with_connector(servers, global, Arc::new(McpConnector))
    }

    /// Create a manager with a custom connector
    pub fn with_connector<I>(servers: I, global: &GlobalSettings, connector: Arc<dyn Connector>) -> Self
    where
        I: IntoIterator<Item = ServerDescriptor>,
    {
        let mut descriptors = HashMap::new();
        let mut order = Vec::new();
        for server in servers {
            if !descriptors.contains_key(&server.id) {
                order.push(server.id.clone());
            }
            descriptors.insert(server.id.clone(), server);
        }

        Self {
            descriptors,
            order,
            records: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
            connector,
            startup_timeout: global.startup_timeout,
            close_timeout: global.close_timeout,
        }
    }

    /// Configured server ids in declaration order
    pub fn server_ids(&self) -> &[String] {
        &self.order
    }

    pub fn descriptor(&self, id: &str) -> Option<&ServerDescriptor> {
        self.descriptors.get(id)
    }

    /// Get a session for `id`, starting the server if needed.
    ///
    /// The first caller performs the start, bounded by the server's startup
    /// timeout; concurrent callers wait for it and get the same outcome. A
    /// stored failure is returned immediately.
    pub async fn get_or_start(&self, id: &str) -> Result<SessionHandle, StartupError> {
        self.start(id, None).await
    }

    /// Like [`get_or_start`](Self::get_or_start), but gives up after `timeout`.
    ///
    /// If this caller is the one starting the server, the timeout also bounds
    /// the start itself and a timed-out start leaves the server `Failed`.
    pub async fn get_or_start_within(
        &self,
        id: &str,
        timeout: Duration,
    ) -> Result<SessionHandle, StartupError> {
        self.start(id, Some(Deadline::after(timeout))).await
    }

    async fn start(&self, id: &str, deadline: Option<Deadline>) -> Result<SessionHandle, StartupError> {
        let descriptor = self
            .descriptors
            .get(id)
            .ok_or_else(|| StartupError::UnknownServer {
                server: id.to_string(),
            })?;
        if !descriptor.enabled {
            return Err(StartupError::Disabled {
                server: id.to_string(),
            });
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(StartupError::Closed {
                server: id.to_string(),
            });
        }

        let record = self.record(id);
        if let Some(session) = record.dead_session() {
            self.invalidate(id, &session, ConnectionError::Closed).await;
        }
        if let Some(outcome) = record.settled(id) {
            return outcome;
        }

        let _startup = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline.at, record.startup.lock())
                .await
                .map_err(|_| StartupError::Timeout {
                    server: id.to_string(),
                    after: deadline.after,
                })?,
            None => record.startup.lock().await,
        };

        // Another caller may have finished the start while we waited
        if let Some(outcome) = record.settled(id) {
            return outcome;
        }
        if self.closed.load(Ordering::SeqCst) {
            record.set_state(ConnectionState::Closed);
            return Err(StartupError::Closed {
                server: id.to_string(),
            });
        }

        let connection = {
            let mut inner = record.inner();
            inner.state = ConnectionState::Starting;
            Arc::clone(
                inner
                    .connection
                    .get_or_insert_with(|| self.connector.create(descriptor)),
            )
        };
        let guard = StartingGuard {
            record: &record,
            armed: true,
        };

        let deadline = deadline.unwrap_or_else(|| {
            Deadline::after(descriptor.startup_timeout.unwrap_or(self.startup_timeout))
        });

        tracing::info!(
            "Starting MCP server: {} ({})",
            id,
            descriptor.transport()
        );

        match tokio::time::timeout_at(deadline.at, connection.connect()).await {
            Ok(Ok(session)) => {
                tracing::info!("MCP server started: {}", id);
                guard.settle(ConnectionState::Running(Arc::clone(&session)));
                Ok(session)
            }
            Ok(Err(e)) => {
                let err = StartupError::Connect {
                    server: id.to_string(),
                    source: Arc::new(e),
                };
                tracing::warn!("Failed to start MCP server {}: {}", id, err);
                guard.settle(ConnectionState::Failed(err.clone()));
                Err(err)
            }
            Err(_) => {
                let err = StartupError::Timeout {
                    server: id.to_string(),
                    after: deadline.after,
                };
                tracing::warn!("MCP server '{}' startup timed out after {:?}", id, deadline.after);
                guard.settle(ConnectionState::Failed(err.clone()));
                // Release whatever the abandoned attempt left behind
                if let Err(e) = self.close_connection(&*connection).await {
                    tracing::debug!("Cleanup after timed-out start of {} failed: {}", id, e);
                }
                Err(err)
            }
        }
    }

    /// Non-blocking probe: is `id` currently running?
    pub fn is_running(&self, id: &str) -> bool {
        self.state(id) == Some(ServerState::Running)
    }

    /// Current state of `id`, or `None` if it is not configured
    pub fn state(&self, id: &str) -> Option<ServerState> {
        if !self.descriptors.contains_key(id) {
            return None;
        }
        let record = lock(&self.records).get(id).cloned();
        Some(match record {
            Some(record) => record.inner().state.public(),
            None if self.closed.load(Ordering::SeqCst) => ServerState::Closed,
            None => ServerState::Unstarted,
        })
    }

    /// Status of every configured server, in declaration order
    pub fn status(&self) -> Vec<ServerStatus> {
        self.order
            .iter()
            .filter_map(|id| {
                let descriptor = self.descriptors.get(id)?;
                let record = lock(&self.records).get(id).cloned();
                let (state, last_error) = match record {
                    Some(record) => {
                        let inner = record.inner();
                        let last_error = match &inner.state {
                            ConnectionState::Failed(e) => Some(e.to_string()),
                            _ => None,
                        };
                        (inner.state.public(), last_error)
                    }
                    None if self.closed.load(Ordering::SeqCst) => (ServerState::Closed, None),
                    None => (ServerState::Unstarted, None),
                };
                Some(ServerStatus {
                    id: id.clone(),
                    transport: descriptor.transport(),
                    enabled: descriptor.enabled,
                    state,
                    last_error,
                })
            })
            .collect()
    }

    /// Clear a stored startup failure so the next call tries again.
    ///
    /// Returns `true` if `id` was `Failed`. Closed servers stay closed.
    pub fn reset(&self, id: &str) -> bool {
        let Some(record) = lock(&self.records).get(id).cloned() else {
            return false;
        };
        let mut inner = record.inner();
        if matches!(inner.state, ConnectionState::Failed(_)) {
            tracing::info!("Resetting failed MCP server: {}", id);
            inner.state = ConnectionState::Unstarted;
            true
        } else {
            false
        }
    }

    /// Mark the running `session` of `id` as lost and release its connection.
    ///
    /// Called when a request fails at the transport level. The server moves to
    /// `Failed` and stays there until [`reset`](Self::reset). Returns `false`
    /// if `session` is no longer the current one (already invalidated,
    /// restarted or shut down).
    pub async fn invalidate(&self, id: &str, session: &SessionHandle, cause: ConnectionError) -> bool {
        let Some(record) = lock(&self.records).get(id).cloned() else {
            return false;
        };
        let _startup = record.startup.lock().await;

        let connection = {
            let mut inner = record.inner();
            match &inner.state {
                ConnectionState::Running(current) if Arc::ptr_eq(current, session) => {}
                _ => return false,
            }
            let err = StartupError::Lost {
                server: id.to_string(),
                source: Arc::new(cause),
            };
            tracing::warn!("{}", err);
            inner.state = ConnectionState::Failed(err);
            inner.connection.clone()
        };

        if let Some(connection) = connection {
            if let Err(e) = self.close_connection(&*connection).await {
                tracing::debug!("Releasing lost connection to {} failed: {}", id, e);
            }
        }
        true
    }

    /// Close every server.
    ///
    /// New starts are refused from the moment this is called; an in-flight
    /// start is awaited and then closed. Close failures are collected in the
    /// report and never stop the remaining servers from closing. Calling this
    /// again returns an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!("Server manager already shut down");
            return report;
        }

        tracing::info!("Shutting down {} MCP server(s)", self.order.len());

        for id in &self.order {
            let record = self.record(id);
            let _startup = record.startup.lock().await;

            let (was_running, connection) = {
                let mut inner = record.inner();
                let was_running = matches!(inner.state, ConnectionState::Running(_));
                inner.state = ConnectionState::Closed;
                (was_running, inner.connection.clone())
            };

            let Some(connection) = connection else {
                continue;
            };

            match self.close_connection(&*connection).await {
                Ok(()) if was_running => {
                    tracing::info!("Stopped MCP server: {}", id);
                    report.closed.push(id.clone());
                }
                Ok(()) => {}
                Err(e) if was_running => {
                    tracing::warn!("Error stopping MCP server {}: {}", id, e);
                    report.failed.push((id.clone(), e));
                }
                Err(e) => {
                    tracing::debug!("Error releasing MCP server {}: {}", id, e);
                }
            }
        }

        report
    }

    async fn close_connection(&self, connection: &dyn Connection) -> Result<(), ConnectionError> {
        match tokio::time::timeout(self.close_timeout, connection.close()).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::CloseTimeout(self.close_timeout)),
        }
    }

    fn record(&self, id: &str) -> Arc<ServerRecord> {
        let mut records = lock(&self.records);
        Arc::clone(
            records
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(ServerRecord::new())),
        )
    }
}

impl fmt::Debug for ServerManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerManager")
            .field("servers", &self.order)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}
