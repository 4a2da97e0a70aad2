//! Stdio JSON-RPC client for external tool-server processes, plus the proxy
//! adapters that expose remote tools through the local `Tool` interface.
//!
//! Two remote shapes exist and are chosen at registration time from the
//! server's tool descriptor:
//! - [`ProxyTool`]: plain request/response over `tools/call`
//! - [`DeferredProxyTool`]: `tools/submit` is acknowledged immediately and the
//!   result arrives later as a pushed notification matched by ticket
//!
//! Both end up behind the same `invoke` seam; callers cannot tell them apart.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::ToolServerConfig;

use super::{Tool, ToolSpec};

const PROTOCOL_VERSION: &str = "2025-06-18";

type PendingReply = oneshot::Sender<Result<Value, String>>;

/// Tool descriptor as reported by a server's `tools/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteToolInfo {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(rename = "inputSchema", alias = "input_schema", default = "empty_schema")]
    pub input_schema: Value,

    /// `"deferred"` selects the fire-and-forget adapter; anything else (or
    /// nothing) selects request/response.
    #[serde(default)]
    pub invocation: Option<String>,
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

struct ServerInner {
    name: String,
    writer: Mutex<Option<ChildStdin>>,
    // Held so the child lives as long as the client; killed on drop.
    child: Mutex<Option<Child>>,
    pending: Mutex<HashMap<u64, PendingReply>>,
    deferred: Mutex<HashMap<String, PendingReply>>,
    next_id: AtomicU64,
}

/// Handle to one spawned tool-server process.
pub struct ToolServer {
    inner: Arc<ServerInner>,
}

impl ToolServer {
    /// Spawn the configured process and run the initialize handshake.
    pub async fn spawn(config: &ToolServerConfig) -> anyhow::Result<Arc<Self>> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn tool server '{}': {}", config.name, e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("Tool server '{}' has no stdin", config.name))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("Tool server '{}' has no stdout", config.name))?;

        let inner = Arc::new(ServerInner {
            name: config.name.clone(),
            writer: Mutex::new(Some(stdin)),
            child: Mutex::new(Some(child)),
            pending: Mutex::new(HashMap::new()),
            deferred: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        });
        spawn_reader(inner.clone(), stdout);

        let server = Arc::new(Self { inner });
        server
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "clientInfo": {
                        "name": "toolgate",
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                    "capabilities": {},
                }),
            )
            .await?;
        server.notify("notifications/initialized", json!({})).await?;

        Ok(server)
    }

    /// List the tools the server exposes.
    pub async fn list_tools(&self) -> anyhow::Result<Vec<RemoteToolInfo>> {
        let result = self.request("tools/list", json!({})).await?;
        let raw = result["tools"].as_array().cloned().unwrap_or_default();

        let mut tools = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_value::<RemoteToolInfo>(entry) {
                Ok(info) => tools.push(info),
                Err(e) => warn!(server = %self.inner.name, "Skipping malformed tool entry: {}", e),
            }
        }
        Ok(tools)
    }

    /// Request/response invocation: the reply to `tools/call` carries the result.
    pub async fn call(&self, name: &str, args: Value) -> anyhow::Result<String> {
        let result = self
            .request("tools/call", json!({"name": name, "arguments": args}))
            .await?;
        Ok(extract_text(&result))
    }

    /// Fire-and-forget invocation: `tools/submit` is only acknowledged; the
    /// result is pushed later as a `notifications/tools/result` with our ticket.
    pub async fn submit(&self, name: &str, args: Value) -> anyhow::Result<String> {
        let ticket = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.inner.deferred.lock().await.insert(ticket.clone(), tx);

        let ack = self
            .request(
                "tools/submit",
                json!({"name": name, "arguments": args, "ticket": ticket}),
            )
            .await;
        if let Err(e) = ack {
            self.inner.deferred.lock().await.remove(&ticket);
            return Err(e);
        }

        match rx.await {
            Ok(Ok(result)) => Ok(extract_text(&result)),
            Ok(Err(err)) => Err(anyhow::anyhow!(
                "Tool server '{}' reported failure for '{}': {}",
                self.inner.name,
                name,
                err
            )),
            Err(_) => Err(anyhow::anyhow!(
                "Tool server '{}' dropped the deferred result for '{}'",
                self.inner.name,
                name
            )),
        }
    }

    async fn request(&self, method: &str, params: Value) -> anyhow::Result<Value> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().await.insert(id, tx);

        let payload = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        if let Err(e) = self.write_line(&payload).await {
            self.inner.pending.lock().await.remove(&id);
            return Err(e);
        }

        match rx.await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(err)) => Err(anyhow::anyhow!(
                "Tool server '{}' rejected {}: {}",
                self.inner.name,
                method,
                err
            )),
            Err(_) => Err(anyhow::anyhow!(
                "Tool server '{}' exited before answering {}",
                self.inner.name,
                method
            )),
        }
    }

    async fn notify(&self, method: &str, params: Value) -> anyhow::Result<()> {
        self.write_line(&json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await
    }

    async fn write_line(&self, payload: &Value) -> anyhow::Result<()> {
        let mut guard = self.inner.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| anyhow::anyhow!("Tool server '{}' stdin is closed", self.inner.name))?;

        let mut line = payload.to_string();
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }
}

fn spawn_reader(inner: Arc<ServerInner>, stdout: ChildStdout) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    handle_line(&inner, &line).await;
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(server = %inner.name, "Error reading tool server output: {}", e);
                    break;
                }
            }
        }
        fail_all_pending(&inner).await;
        // Reap the child so a crashed server does not linger as a zombie.
        if let Some(mut child) = inner.child.lock().await.take() {
            let _ = child.kill().await;
        }
        inner.writer.lock().await.take();
    });
}

async fn handle_line(inner: &Arc<ServerInner>, line: &str) {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!(server = %inner.name, "Ignoring non-JSON line from tool server: {}", e);
            return;
        }
    };

    // Replies to our requests carry the id we assigned.
    if let Some(id) = value["id"].as_u64() {
        let sender = inner.pending.lock().await.remove(&id);
        let Some(tx) = sender else {
            debug!(server = %inner.name, id, "Reply with no pending request");
            return;
        };
        let outcome = if value["error"].is_null() {
            Ok(value["result"].clone())
        } else {
            Err(value["error"].to_string())
        };
        let _ = tx.send(outcome);
        return;
    }

    match value["method"].as_str() {
        Some("notifications/tools/result") => {
            let params = &value["params"];
            let Some(ticket) = params["ticket"].as_str() else {
                warn!(server = %inner.name, "Deferred result without a ticket");
                return;
            };
            let sender = inner.deferred.lock().await.remove(ticket);
            match sender {
                Some(tx) => {
                    let outcome = if params["error"].is_null() {
                        Ok(params["result"].clone())
                    } else {
                        Err(params["error"].to_string())
                    };
                    let _ = tx.send(outcome);
                }
                None => warn!(server = %inner.name, ticket, "Deferred result with no waiter"),
            }
        }
        Some(method) => debug!(server = %inner.name, method, "Ignoring server notification"),
        None => debug!(server = %inner.name, "Ignoring message without method or id"),
    }
}

async fn fail_all_pending(inner: &Arc<ServerInner>) {
    let gone = "tool server exited".to_string();
    for (_, tx) in inner.pending.lock().await.drain() {
        let _ = tx.send(Err(gone.clone()));
    }
    for (_, tx) in inner.deferred.lock().await.drain() {
        let _ = tx.send(Err(gone.clone()));
    }
}

/// Join the text fragments of a tool result; fall back to raw JSON for
/// results that do not use the content-array shape.
fn extract_text(result: &Value) -> String {
    match result["content"].as_array() {
        Some(parts) => {
            let texts: Vec<&str> = parts
                .iter()
                .filter_map(|p| p["text"].as_str())
                .collect();
            if texts.is_empty() {
                result.to_string()
            } else {
                texts.join("\n")
            }
        }
        None => result.to_string(),
    }
}

/// Wrap a discovered remote tool in the adapter its descriptor asks for.
pub fn into_tool(server: Arc<ToolServer>, info: RemoteToolInfo) -> Arc<dyn Tool> {
    let spec = ToolSpec {
        name: info.name,
        description: info.description,
        parameters: info.input_schema,
    };
    match info.invocation.as_deref() {
        Some("deferred") => Arc::new(DeferredProxyTool { server, spec }),
        _ => Arc::new(ProxyTool { server, spec }),
    }
}

/// Request/response proxy to a remote tool.
pub struct ProxyTool {
    server: Arc<ToolServer>,
    spec: ToolSpec,
}

#[async_trait]
impl Tool for ProxyTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    fn parameters_schema(&self) -> Value {
        self.spec.parameters.clone()
    }

    async fn invoke(&self, args: Value) -> anyhow::Result<String> {
        self.server.call(&self.spec.name, args).await
    }
}

/// Fire-and-forget proxy: submission is acknowledged immediately, the result
/// still arrives (and is awaited) via the server's pushed notification.
pub struct DeferredProxyTool {
    server: Arc<ToolServer>,
    spec: ToolSpec,
}

#[async_trait]
impl Tool for DeferredProxyTool {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn description(&self) -> &str {
        &self.spec.description
    }

    fn parameters_schema(&self) -> Value {
        self.spec.parameters.clone()
    }

    async fn invoke(&self, args: Value) -> anyhow::Result<String> {
        self.server.submit(&self.spec.name, args).await
    }
}
