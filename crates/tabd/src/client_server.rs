//! Local stream socket clients talk to. One line in, one line out, then close — the same
//! accept-loop-plus-per-connection-task split used by the extension gateway's WebSocket side, cut
//! down to a single request/response turn per connection instead of a long-lived duplex stream.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::BoxFuture;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tabd_protocol::{Command, EndpointInfo, ExtensionResponse, IpcMessage, IpcMessageType};

pub type CommandHandler = Arc<dyn Fn(Command) -> BoxFuture<'static, ExtensionResponse> + Send + Sync>;
pub type RegistrationHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Value> + Send + Sync>;

struct ServerState {
    listener_task: Option<JoinHandle<()>>,
    connections: HashMap<u64, oneshot::Sender<()>>,
}

/// Accepts client connections on a Unix domain socket and dispatches one `IpcMessage` per
/// connection to the router, the registration handler, or a handful of built-in service replies.
#[derive(Clone)]
pub struct ClientServer {
    socket_path: PathBuf,
    ws_port: u16,
    command_handler: CommandHandler,
    registration_handler: RegistrationHandler,
    state: Arc<Mutex<ServerState>>,
    next_connection_id: Arc<AtomicU64>,
}

impl ClientServer {
    pub fn new(socket_path: PathBuf, ws_port: u16, command_handler: CommandHandler, registration_handler: RegistrationHandler) -> Self {
        Self {
            socket_path,
            ws_port,
            command_handler,
            registration_handler,
            state: Arc::new(Mutex::new(ServerState { listener_task: None, connections: HashMap::new() })),
            next_connection_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub async fn start(&self) -> std::io::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        info!(target = "tabd.server", socket = %self.socket_path.display(), "client server listening");

        let server = self.clone();
        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, _addr)) => server.accept(stream).await,
                    Err(err) => {
                        warn!(target = "tabd.server", error = %err, "accept failed");
                        break;
                    }
                }
            }
        });
        self.state.lock().await.listener_task = Some(task);
        Ok(())
    }

    async fn accept(&self, stream: UnixStream) {
        let conn_id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (close_tx, close_rx) = oneshot::channel();
        self.state.lock().await.connections.insert(conn_id, close_tx);

        let server = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = server.serve_connection(stream) => {}
                _ = close_rx => {}
            }
            server.state.lock().await.connections.remove(&conn_id);
        });
    }

    async fn serve_connection(&self, stream: UnixStream) {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(err) => {
                warn!(target = "tabd.server", error = %err, "failed to read client line");
                return;
            }
        };

        let reply = self.dispatch(&line).await;
        if let Ok(payload) = serde_json::to_string(&reply) {
            let _ = write_half.write_all(payload.as_bytes()).await;
            let _ = write_half.write_all(b"\n").await;
        }
        let _ = write_half.shutdown().await;
    }

    async fn dispatch(&self, line: &str) -> IpcMessage {
        let envelope: IpcMessage = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(err) => {
                debug!(target = "tabd.server", error = %err, "malformed client envelope");
                return error_envelope("unknown", "Invalid message envelope");
            }
        };

        match envelope.message_type {
            IpcMessageType::Ping => IpcMessage::pong(),
            IpcMessageType::GetEndpoint => {
                let info = EndpointInfo { ip: "127.0.0.1".to_string(), port: self.ws_port };
                IpcMessage::new(IpcMessageType::Endpoint, serde_json::to_value(info).ok())
            }
            IpcMessageType::RegisterExtension => {
                let payload = envelope.payload.unwrap_or(Value::Null);
                let result = (self.registration_handler)(payload).await;
                IpcMessage::new(IpcMessageType::Registration, Some(result))
            }
            IpcMessageType::Command => match envelope.payload.and_then(|p| serde_json::from_value::<Command>(p).ok()) {
                Some(cmd) => {
                    let response = (self.command_handler)(cmd).await;
                    IpcMessage::new(IpcMessageType::Response, serde_json::to_value(response).ok())
                }
                None => error_envelope("unknown", "Invalid command structure"),
            },
            _ => error_envelope("unknown", "Unrecognized message type"),
        }
    }

    /// Closes every open connection and the listener, then removes the socket file. Safe to call
    /// more than once.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.listener_task.take() {
            task.abort();
        }
        for (_, close) in state.connections.drain() {
            let _ = close.send(());
        }
        drop(state);
        let _ = std::fs::remove_file(&self.socket_path);
        info!(target = "tabd.server", "client server stopped");
    }
}

fn error_envelope(id: &str, message: &str) -> IpcMessage {
    let response = ExtensionResponse::failure(id, message);
    IpcMessage::new(IpcMessageType::Error, serde_json::to_value(response).ok())
}
