//! Scripted connector for manager and adapter tests

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Content, JsonObject};
use serde_json::json;

use crate::config::ServerDescriptor;
use crate::connection::{Connection, Connector, RemoteTool, Session, SessionHandle};
use crate::error::ConnectionError;

#[derive(Default)]
struct Shared {
    creates: AtomicUsize,
    connects: AtomicUsize,
    closes: AtomicUsize,
    connect_delay: Duration,
    failing_connect: HashSet<String>,
    failing_close: HashSet<String>,
    hanging_close: HashSet<String>,
    /// Liveness flag of every session handed out
    sessions: Mutex<Vec<Arc<AtomicBool>>>,
}

/// Counts every create, connect and close it sees.
///
/// Configure with the builder methods before handing a clone to a manager.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    shared: Arc<Shared>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn configure(mut self, f: impl FnOnce(&mut Shared)) -> Self {
        let shared = Arc::get_mut(&mut self.shared).expect("configure before sharing");
        f(shared);
        self
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.configure(|s| s.connect_delay = delay)
    }

    pub fn failing_connect(self, id: &str) -> Self {
        self.configure(|s| {
            s.failing_connect.insert(id.to_string());
        })
    }

    pub fn failing_close(self, id: &str) -> Self {
        self.configure(|s| {
            s.failing_close.insert(id.to_string());
        })
    }

    pub fn hanging_close(self, id: &str) -> Self {
        self.configure(|s| {
            s.hanging_close.insert(id.to_string());
        })
    }

    /// Break the transport of every session handed out so far
    pub fn kill_sessions(&self) {
        for alive in self.shared.sessions.lock().unwrap().iter() {
            alive.store(false, Ordering::SeqCst);
        }
    }

    pub fn creates(&self) -> usize {
        self.shared.creates.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn create(&self, descriptor: &ServerDescriptor) -> Arc<dyn Connection> {
        self.shared.creates.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockConnection {
            id: descriptor.id.clone(),
            shared: Arc::clone(&self.shared),
        })
    }
}

struct MockConnection {
    id: String,
    shared: Arc<Shared>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn connect(&self) -> Result<SessionHandle, ConnectionError> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if !self.shared.connect_delay.is_zero() {
            tokio::time::sleep(self.shared.connect_delay).await;
        }
        if self.shared.failing_connect.contains(&self.id) {
            return Err(ConnectionError::Spawn {
                command: format!("{}-bin", self.id),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            });
        }
        let alive = Arc::new(AtomicBool::new(true));
        self.shared.sessions.lock().unwrap().push(Arc::clone(&alive));
        Ok(Arc::new(MockSession {
            server: self.id.clone(),
            alive,
        }))
    }

    async fn close(&self) -> Result<(), ConnectionError> {
        if self.shared.hanging_close.contains(&self.id) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        if self.shared.failing_close.contains(&self.id) {
            return Err(ConnectionError::Close("process did not exit".to_string()));
        }
        self.shared.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Answers by operation name:
///
/// - `echo`: text of `arguments.message`
/// - `structured`: structured content `{"sum": 3}`
/// - `multi`: two text items
/// - `mixed`: text plus an image
/// - `fail`: remote error result
/// - `reject`: invalid-params protocol error
/// - `drop`: transport failure that also kills the session
/// - `slow`: never answers within a test
struct MockSession {
    server: String,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl Session for MockSession {
    async fn call_tool(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, ConnectionError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }
        let result = match name {
            "echo" => {
                let message = arguments
                    .as_ref()
                    .and_then(|a| a.get("message"))
                    .and_then(|m| m.as_str())
                    .unwrap_or_default()
                    .to_string();
                CallToolResult::success(vec![Content::text(message)])
            }
            "structured" => CallToolResult::structured(json!({ "sum": 3 })),
            "multi" => CallToolResult::success(vec![Content::text("first"), Content::text("second")]),
            "mixed" => CallToolResult::success(vec![
                Content::text("caption"),
                Content::image("aGVsbG8=", "image/png"),
            ]),
            "fail" => CallToolResult::error(vec![Content::text("something broke")]),
            "reject" => {
                return Err(ConnectionError::Rejected {
                    code: -32602,
                    message: "missing field `message`".to_string(),
                })
            }
            "drop" => {
                self.alive.store(false, Ordering::SeqCst);
                return Err(ConnectionError::Closed);
            }
            "slow" => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                CallToolResult::success(vec![Content::text("late")])
            }
            other => {
                return Err(ConnectionError::Rejected {
                    code: -32601,
                    message: format!("tool '{other}' not found"),
                })
            }
        };
        Ok(result)
    }

    async fn list_tools(&self) -> Result<Vec<RemoteTool>, ConnectionError> {
        Ok(["echo", "structured", "fail"]
            .into_iter()
            .map(|name| RemoteTool {
                server: self.server.clone(),
                name: name.to_string(),
                description: None,
                input_schema: None,
            })
            .collect())
    }

    fn is_closed(&self) -> bool {
        !self.alive.load(Ordering::SeqCst)
    }
}
