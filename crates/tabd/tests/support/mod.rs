#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tabd_core::DaemonConfig;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use tabd::controller::Controller;
use tabd_protocol::{ExtensionCommand, ExtensionFrame, ExtensionResponse, IpcMessage, IpcMessageType, RegisterInfo};

/// A running daemon bound to a throwaway socket path and a caller-chosen port, torn down via
/// `stop()` when the harness itself is dropped is not automatic — call [`Harness::stop`]
/// explicitly at the end of a test.
pub struct Harness {
    pub controller: Controller,
    _tempdir: tempfile::TempDir,
    pub socket_path: PathBuf,
    pub ws_port: u16,
}

impl Harness {
    pub async fn start(ws_port: u16) -> Self {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let socket_path = tempdir.path().join("tabd.sock");
        let config = DaemonConfig {
            ipc_socket_path: socket_path.clone(),
            ws_port,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(10),
            default_browser_path: None,
        };
        let controller = Controller::new(config);
        controller.start().await.expect("daemon failed to start");
        // Give the Unix listener and the extension gateway's TCP listener a moment to come up.
        tokio::time::sleep(Duration::from_millis(50)).await;
        Self { controller, _tempdir: tempdir, socket_path, ws_port }
    }

    pub async fn stop(&self) {
        self.controller.stop().await;
    }

    /// Sends one `IpcMessage` over a fresh Unix connection and returns the daemon's reply.
    pub async fn send(&self, message: IpcMessage) -> IpcMessage {
        let stream = UnixStream::connect(&self.socket_path).await.expect("connect to client socket");
        let (read_half, mut write_half) = stream.into_split();
        let line = serde_json::to_string(&message).unwrap();
        write_half.write_all(line.as_bytes()).await.unwrap();
        write_half.write_all(b"\n").await.unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let line = lines.next_line().await.unwrap().expect("daemon closed without replying");
        serde_json::from_str(&line).unwrap()
    }

    /// Opens a raw connection for tests that need to control the write/read timing themselves
    /// (e.g. asserting queuing behavior across two in-flight requests).
    pub async fn connect(&self) -> UnixStream {
        UnixStream::connect(&self.socket_path).await.expect("connect to client socket")
    }

    /// Creates (or resolves) a session by name over the IPC `register_extension` verb, returning
    /// its daemon-assigned id.
    pub async fn create_session(&self, name: &str) -> String {
        let payload = serde_json::json!({ "sessionId": name });
        let reply = self.send(IpcMessage::new(IpcMessageType::RegisterExtension, Some(payload))).await;
        assert_eq!(reply.message_type, IpcMessageType::Registration);
        reply.payload.unwrap().get("sessionId").unwrap().as_str().unwrap().to_string()
    }
}

/// A fake extension connection, standing in for a real browser window's companion extension.
pub struct FakeExtension {
    socket: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
}

impl FakeExtension {
    /// Connects and registers, binding to `cached_session_id` (expected to already exist and have
    /// no active extension).
    pub async fn connect(ws_port: u16, cached_session_id: &str) -> Self {
        let url = format!("ws://127.0.0.1:{ws_port}/extension");
        let (socket, _response) = connect_async(url).await.expect("connect to extension gateway");
        let mut this = Self { socket };

        let register = ExtensionFrame::Register(RegisterInfo { window_id: 1, cached_session_id: Some(cached_session_id.to_string()) });
        this.send_frame(&register).await;

        match this.recv_frame().await {
            ExtensionFrame::SessionAssigned(assigned) => assert_eq!(assigned.session_id, cached_session_id),
            other => panic!("expected session_assigned, got {other:?}"),
        }
        this
    }

    async fn send_frame(&mut self, frame: &ExtensionFrame) {
        let text = serde_json::to_string(frame).unwrap();
        self.socket.send(WsMessage::Text(text.into())).await.unwrap();
    }

    async fn recv_frame(&mut self) -> ExtensionFrame {
        loop {
            let msg = self.socket.next().await.expect("extension socket closed").expect("websocket error");
            if let WsMessage::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    /// Waits for the next command sent by the router and replies with `success=true, data=echo`.
    pub async fn echo_next_command(&mut self) -> ExtensionCommand {
        match self.recv_frame().await {
            ExtensionFrame::Command(cmd) => {
                let response = ExtensionResponse { id: cmd.id.clone(), success: true, data: Some(Value::String(cmd.command_type.clone())), error: None };
                self.send_frame(&ExtensionFrame::Response(response)).await;
                cmd
            }
            other => panic!("expected command frame, got {other:?}"),
        }
    }

    /// Waits for the next command frame without replying to it.
    pub async fn recv_command(&mut self) -> ExtensionCommand {
        match self.recv_frame().await {
            ExtensionFrame::Command(cmd) => cmd,
            other => panic!("expected command frame, got {other:?}"),
        }
    }

    pub async fn reply(&mut self, id: &str, success: bool) {
        let response = ExtensionResponse { id: id.to_string(), success, data: None, error: None };
        self.send_frame(&ExtensionFrame::Response(response)).await;
    }

    pub async fn close(mut self) {
        let _ = self.socket.send(WsMessage::Close(None)).await;
    }
}
