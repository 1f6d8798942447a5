//! WebSocket endpoint the browser extension connects to, and the per-connection state that
//! backs it. Grounded in the connection-handling shape used elsewhere in this workspace for
//! WebSocket relays: per-connection `mpsc` channel feeding a dedicated writer task, shared state
//! behind a single `Mutex`, and a pending-response map per connection resolved by `oneshot`
//! senders.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};

use tabd_protocol::{ExtensionCommand, ExtensionFrame, ExtensionResponse, RegisterInfo, SessionAssigned};

use crate::error::{DaemonError, Result};
use crate::session::SessionRegistry;

/// Opaque, non-owning identifier for one open extension WebSocket connection. The gateway is the
/// only component that dereferences it into a real transport; everyone else just compares it.
pub type ConnectionId = u64;

/// Lifecycle notifications other components (namely the router) need to react to.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Connected { session_id: String },
    Disconnected { session_id: String },
}

struct Connection {
    tx: mpsc::UnboundedSender<Message>,
    /// In-flight commands for *this* connection only, keyed by command id. Scoped per connection
    /// so that one extension disconnecting never resolves another session's pending commands.
    pending: HashMap<String, oneshot::Sender<ExtensionResponse>>,
}

struct GatewayState {
    connections: HashMap<ConnectionId, Connection>,
    by_session: HashMap<String, ConnectionId>,
}

impl GatewayState {
    fn new() -> Self {
        Self {
            connections: HashMap::new(),
            by_session: HashMap::new(),
        }
    }
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
}

#[derive(Clone)]
pub struct Gateway {
    state: Arc<Mutex<GatewayState>>,
    registry: SessionRegistry,
    config: GatewayConfig,
    next_connection_id: Arc<AtomicU64>,
    events: mpsc::UnboundedSender<GatewayEvent>,
}

impl Gateway {
    /// Builds a gateway bound to `registry` (used to resolve registration and to flip
    /// `active`/`disconnected` as connections come and go), returning the paired event receiver
    /// the router drains to learn about connects/disconnects.
    pub fn new(registry: SessionRegistry, config: GatewayConfig) -> (Self, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let gateway = Self {
            state: Arc::new(Mutex::new(GatewayState::new())),
            registry,
            config,
            next_connection_id: Arc::new(AtomicU64::new(1)),
            events,
        };
        (gateway, rx)
    }

    /// The `/extension` route, ready to be nested or served directly.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/extension", get(upgrade_extension))
            .with_state(self.clone())
    }

    pub async fn serve(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(target = "tabd.gateway", %addr, "extension gateway listening");
        self.serve_on(listener).await
    }

    async fn serve_on(self, listener: TcpListener) -> Result<()> {
        let app = self.router();
        axum::serve(listener, app.into_make_service()).await?;
        Ok(())
    }

    pub async fn is_connected(&self, session_id: &str) -> bool {
        self.state.lock().await.by_session.contains_key(session_id)
    }

    /// Sends `cmd` to the extension bound to `session_id` and waits up to `timeout` for the
    /// matching response.
    pub async fn send_command(&self, session_id: &str, cmd: ExtensionCommand, timeout: Duration) -> Result<ExtensionResponse> {
        let (resp_tx, resp_rx) = oneshot::channel();
        let tx = {
            let mut state = self.state.lock().await;
            let conn_id = *state
                .by_session
                .get(session_id)
                .ok_or_else(|| DaemonError::ExtensionNotConnected(session_id.to_string()))?;
            let conn = state.connections.get_mut(&conn_id).ok_or_else(|| DaemonError::ExtensionNotConnected(session_id.to_string()))?;
            conn.pending.insert(cmd.id.clone(), resp_tx);
            conn.tx.clone()
        };

        let frame = ExtensionFrame::Command(cmd.clone());
        let payload = serde_json::to_string(&frame)?;
        if tx.send(Message::Text(payload.into())).is_err() {
            self.take_pending(session_id, &cmd.id).await;
            return Err(DaemonError::ExtensionNotConnected(session_id.to_string()));
        }

        match tokio::time::timeout(timeout, resp_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(DaemonError::ExtensionNotConnected(session_id.to_string())),
            Err(_) => {
                self.take_pending(session_id, &cmd.id).await;
                Err(DaemonError::CommandTimeout)
            }
        }
    }

    async fn take_pending(&self, session_id: &str, command_id: &str) -> Option<oneshot::Sender<ExtensionResponse>> {
        let mut state = self.state.lock().await;
        let conn_id = *state.by_session.get(session_id)?;
        state.connections.get_mut(&conn_id)?.pending.remove(command_id)
    }
}

async fn upgrade_extension(ws: WebSocketUpgrade, State(gateway): State<Gateway>) -> axum::response::Response {
    ws.on_upgrade(|socket| handle_extension_socket(socket, gateway))
}

async fn handle_extension_socket(socket: WebSocket, gateway: Gateway) {
    let conn_id = gateway.next_connection_id.fetch_add(1, Ordering::Relaxed);
    let (tx, rx) = mpsc::unbounded_channel();
    let mut rx_stream = UnboundedReceiverStream::new(rx);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx_stream.next().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let session_id = match wait_for_registration(&mut ws_rx, &tx, &gateway, conn_id).await {
        Some(id) => id,
        None => {
            send_task.abort();
            return;
        }
    };

    let last_pong = Arc::new(Mutex::new(Instant::now()));
    let (close_tx, mut close_rx) = oneshot::channel::<()>();
    let heartbeat_tx = tx.clone();
    let heartbeat_interval = gateway.config.heartbeat_interval;
    let heartbeat_timeout = gateway.config.heartbeat_timeout;
    let heartbeat_last_pong = last_pong.clone();
    let heartbeat_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let ping_sent_at = Instant::now();
            let frame = serde_json::to_string(&ExtensionFrame::Ping).unwrap_or_default();
            if heartbeat_tx.send(Message::Text(frame.into())).is_err() {
                break;
            }
            tokio::time::sleep(heartbeat_timeout).await;
            if *heartbeat_last_pong.lock().await < ping_sent_at {
                let _ = close_tx.send(());
                break;
            }
        }
    });

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(err) = handle_extension_frame(&gateway, &session_id, &text, &last_pong).await {
                            warn!(target = "tabd.gateway", session_id = %session_id, error = %err, "malformed extension frame");
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(target = "tabd.gateway", session_id = %session_id, error = %err, "extension websocket error");
                        break;
                    }
                }
            }
            _ = &mut close_rx => {
                warn!(target = "tabd.gateway", session_id = %session_id, "heartbeat timed out, closing connection");
                break;
            }
        }
    }

    heartbeat_task.abort();
    send_task.abort();
    gateway.finish_connection(conn_id, &session_id).await;
}

/// Resolves registration precedence: a still-connectable cached session id wins, then the
/// earliest session still `awaiting_extension` (FIFO), then a freshly created `default` session.
/// Never silently rebinds an already-active session out from under its current connection.
async fn wait_for_registration(
    ws_rx: &mut futures::stream::SplitStream<WebSocket>,
    tx: &mpsc::UnboundedSender<Message>,
    gateway: &Gateway,
    conn_id: ConnectionId,
) -> Option<String> {
    let msg = ws_rx.next().await?;
    let text = match msg {
        Ok(Message::Text(text)) => text,
        _ => return None,
    };
    let frame: ExtensionFrame = serde_json::from_str(&text).ok()?;
    let info = match frame {
        ExtensionFrame::Register(info) => info,
        _ => return None,
    };

    let session_id = match resolve_registration(gateway, &info).await {
        Ok(id) => id,
        Err(err) => {
            warn!(target = "tabd.gateway", error = %err, "extension registration failed");
            return None;
        }
    };

    {
        let mut state = gateway.state.lock().await;
        state.connections.insert(conn_id, Connection { tx: tx.clone(), pending: HashMap::new() });
        state.by_session.insert(session_id.clone(), conn_id);
    }

    if let Err(err) = gateway.registry.set_extension_connection(&session_id, Some(conn_id)).await {
        warn!(target = "tabd.gateway", session_id = %session_id, error = %err, "failed to bind extension connection to session");
    }

    let reply = ExtensionFrame::SessionAssigned(SessionAssigned { session_id: session_id.clone() });
    if let Ok(payload) = serde_json::to_string(&reply) {
        let _ = tx.send(Message::Text(payload.into()));
    }

    let _ = gateway.events.send(GatewayEvent::Connected { session_id: session_id.clone() });
    info!(target = "tabd.gateway", session_id = %session_id, window_id = info.window_id, "extension registered");
    Some(session_id)
}

async fn resolve_registration(gateway: &Gateway, info: &RegisterInfo) -> std::result::Result<String, DaemonError> {
    if let Some(cached) = &info.cached_session_id {
        if let Some(session) = gateway.registry.get(cached).await {
            if !gateway.is_connected(&session.id).await {
                return Ok(session.id);
            }
        }
    }

    if let Some(session) = gateway.registry.assign_next_awaiting().await {
        return Ok(session.id);
    }

    if let Some(name) = &info.cached_session_id {
        if name == "default" {
            let session = gateway.registry.get_or_create_default(None).await?;
            return Ok(session.id);
        }
        if crate::session::is_valid_name(name) && gateway.registry.get_by_name(name).await.is_none() {
            let session = gateway.registry.create(name, None).await?;
            return Ok(session.id);
        }
    }

    let session = gateway.registry.get_or_create_default(None).await?;
    Ok(session.id)
}

async fn handle_extension_frame(gateway: &Gateway, session_id: &str, raw: &str, last_pong: &Arc<Mutex<Instant>>) -> Result<()> {
    let frame: ExtensionFrame = serde_json::from_str(raw)?;
    match frame {
        ExtensionFrame::Response(response) => {
            let sender = gateway.take_pending(session_id, &response.id).await;
            if let Some(sender) = sender {
                let _ = sender.send(response);
            } else {
                debug!(target = "tabd.gateway", session_id, id = %response.id, "response for unknown or already-resolved command");
            }
        }
        ExtensionFrame::Pong => {
            *last_pong.lock().await = Instant::now();
            debug!(target = "tabd.gateway", session_id, "heartbeat pong");
        }
        other => {
            warn!(target = "tabd.gateway", session_id, frame = ?other, "unexpected frame from extension");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_gateway_has_no_connections() {
        let registry = SessionRegistry::new();
        let config = GatewayConfig { heartbeat_interval: Duration::from_secs(30), heartbeat_timeout: Duration::from_secs(10) };
        let (gateway, _events) = Gateway::new(registry, config);
        assert!(!gateway.is_connected("whatever").await);
    }

    #[tokio::test]
    async fn send_command_without_connection_fails() {
        let registry = SessionRegistry::new();
        let config = GatewayConfig { heartbeat_interval: Duration::from_secs(30), heartbeat_timeout: Duration::from_secs(10) };
        let (gateway, _events) = Gateway::new(registry, config);
        let cmd = ExtensionCommand { id: "c1".to_string(), command_type: "click".to_string(), params: None };
        let err = gateway.send_command("missing", cmd, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, DaemonError::ExtensionNotConnected(_)));
    }
}

impl Gateway {
    async fn finish_connection(&self, conn_id: ConnectionId, session_id: &str) {
        {
            let mut state = self.state.lock().await;
            state.by_session.remove(session_id);
            // Drop any pending senders rather than resolving them here: the dropped `oneshot`
            // fails `send_command`'s `resp_rx` await with `Ok(Err(_))`, which it maps to
            // `ExtensionNotConnected` — giving the caller the correct command id and message
            // instead of a synthesized response forged at the connection layer.
            state.connections.remove(&conn_id);
        }

        if let Err(err) = self.registry.set_extension_connection(session_id, None).await {
            warn!(target = "tabd.gateway", session_id, error = %err, "failed to clear extension connection on disconnect");
        }
        let _ = self.events.send(GatewayEvent::Disconnected { session_id: session_id.to_string() });
        info!(target = "tabd.gateway", session_id, "extension disconnected");
    }
}
