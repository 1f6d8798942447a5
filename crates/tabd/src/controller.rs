//! Wires the registry, gateway, browser supervisor, router, and client server together, owns
//! startup/shutdown ordering, and converges signal-driven and RPC-driven shutdown on one path —
//! the same `run()`-loop shape the daemon side of this workspace uses for its own signal handling.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use tabd_core::{BrowserEvent, BrowserSupervisor, DaemonConfig, Gateway, GatewayConfig, GatewayEvent, Router, SessionRegistry, SessionState};
use tabd_protocol::{Command, ExtensionResponse};

use crate::client_server::ClientServer;
use crate::error::Result;

const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct Controller {
    config: DaemonConfig,
    registry: SessionRegistry,
    gateway: Gateway,
    browser: BrowserSupervisor,
    router: Router,
    server: ClientServer,
    running: Arc<AtomicBool>,
    gateway_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Controller {
    pub fn new(config: DaemonConfig) -> Self {
        let registry = SessionRegistry::new();
        let gateway_config = GatewayConfig { heartbeat_interval: config.heartbeat_interval, heartbeat_timeout: config.heartbeat_timeout };
        let (gateway, gateway_events) = Gateway::new(registry.clone(), gateway_config);
        let (browser, browser_events) = BrowserSupervisor::new();
        let router = Router::new(registry.clone(), gateway.clone(), browser.clone());

        let running = Arc::new(AtomicBool::new(false));

        let command_handler = {
            let controller_registry = registry.clone();
            let controller_router = router.clone();
            let controller_running = running.clone();
            Arc::new(move |cmd: Command| {
                let registry = controller_registry.clone();
                let router = controller_router.clone();
                let running = controller_running.clone();
                Box::pin(async move {
                    if !running.load(Ordering::SeqCst) {
                        return ExtensionResponse::failure(cmd.id, "Daemon is shutting down");
                    }
                    handle_cli_command(&registry, &router, cmd).await
                }) as futures::future::BoxFuture<'static, ExtensionResponse>
            })
        };
        let registration_handler = {
            let controller_registry = registry.clone();
            Arc::new(move |payload: Value| {
                let registry = controller_registry.clone();
                Box::pin(async move { handle_register_extension(&registry, payload).await }) as futures::future::BoxFuture<'static, Value>
            })
        };

        let server = ClientServer::new(config.ipc_socket_path.clone(), config.ws_port, command_handler, registration_handler);

        let controller = Self {
            config,
            registry,
            gateway,
            browser,
            router,
            server,
            running,
            gateway_task: Arc::new(Mutex::new(None)),
        };

        controller.spawn_event_loops(gateway_events, browser_events);
        controller
    }

    fn spawn_event_loops(&self, mut gateway_events: tokio::sync::mpsc::UnboundedReceiver<GatewayEvent>, mut browser_events: tokio::sync::mpsc::UnboundedReceiver<BrowserEvent>) {
        let router = self.router.clone();
        tokio::spawn(async move {
            while let Some(event) = gateway_events.recv().await {
                match event {
                    GatewayEvent::Connected { session_id } => {
                        info!(target = "tabd.controller", session_id = %session_id, "extension connected");
                        router.notify_extension_connected(&session_id).await;
                    }
                    GatewayEvent::Disconnected { session_id } => {
                        info!(target = "tabd.controller", session_id = %session_id, "extension disconnected");
                        router.handle_extension_disconnected(&session_id).await;
                    }
                }
            }
        });

        let registry = self.registry.clone();
        let gateway = self.gateway.clone();
        tokio::spawn(async move {
            while let Some(event) = browser_events.recv().await {
                match event {
                    BrowserEvent::Started { session_id, pid } => {
                        let _ = registry.set_browser_process(&session_id, Some(pid)).await;
                    }
                    BrowserEvent::Exited { session_id, exit_code } => {
                        info!(target = "tabd.controller", session_id = %session_id, ?exit_code, "browser exited");
                        let _ = registry.set_browser_process(&session_id, None).await;
                        if let Some(session) = registry.get(&session_id).await {
                            if !gateway.is_connected(&session_id).await && session.state != SessionState::AwaitingExtension {
                                let _ = registry.update_state(&session_id, SessionState::Disconnected).await;
                            }
                        }
                    }
                    BrowserEvent::Error { session_id, message } => {
                        warn!(target = "tabd.controller", session_id = %session_id, error = %message, "browser process error");
                    }
                }
            }
        });
    }

    pub async fn start(&self) -> Result<()> {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), self.config.ws_port);
        let gateway = self.gateway.clone();
        let task = tokio::spawn(async move {
            if let Err(err) = gateway.serve(addr).await {
                warn!(target = "tabd.controller", error = %err, "extension gateway stopped unexpectedly");
            }
        });
        *self.gateway_task.lock().await = Some(task);

        self.server.start().await?;
        self.running.store(true, Ordering::SeqCst);
        info!(target = "tabd.controller", "daemon started");
        Ok(())
    }

    /// Runs until a `SIGTERM`/`SIGINT` arrives, then shuts down.
    pub async fn run(&self) -> anyhow::Result<()> {
        self.start().await?;

        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => info!(target = "tabd.controller", "received SIGTERM"),
            _ = sigint.recv() => info!(target = "tabd.controller", "received SIGINT"),
        }

        self.stop().await;
        Ok(())
    }

    /// Idempotent: cancels outstanding router work, waits briefly for it to drain, kills every
    /// managed browser, then tears down the client server and extension gateway.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(target = "tabd.controller", "daemon stopping");

        self.router.cancel_all().await;
        let deadline = tokio::time::Instant::now() + SHUTDOWN_DRAIN_TIMEOUT;
        while self.router.has_outstanding_work().await && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
        if self.router.has_outstanding_work().await {
            warn!(target = "tabd.controller", "outstanding work remained after drain timeout, forcing cancellation");
            self.router.cancel_all().await;
        }

        self.browser.kill_all().await;
        self.server.stop().await;
        if let Some(task) = self.gateway_task.lock().await.take() {
            task.abort();
        }
        info!(target = "tabd.controller", "daemon stopped");
    }
}

async fn handle_cli_command(registry: &SessionRegistry, router: &Router, mut cmd: Command) -> ExtensionResponse {
    let session = match resolve_or_create_session(registry, &cmd.session_id, cmd.profile.clone()).await {
        Ok(session) => session,
        Err(err) => return ExtensionResponse::failure(cmd.id, err.to_string()),
    };
    cmd.session_id = session.id;
    router.submit(cmd).await
}

async fn resolve_or_create_session(registry: &SessionRegistry, session_id: &str, profile: Option<String>) -> tabd_core::Result<tabd_core::Session> {
    if let Some(session) = registry.get(session_id).await {
        return Ok(session);
    }
    if let Some(session) = registry.get_by_name(session_id).await {
        return Ok(session);
    }

    let profile_dir = profile.map(std::path::PathBuf::from);
    if session_id.is_empty() || session_id == "default" {
        registry.get_or_create_default(profile_dir).await
    } else {
        registry.create(session_id, profile_dir).await
    }
}

async fn handle_register_extension(registry: &SessionRegistry, payload: Value) -> Value {
    let session_id = payload.get("sessionId").and_then(Value::as_str).unwrap_or("");
    match resolve_or_create_session(registry, session_id, None).await {
        Ok(session) => json!({ "sessionId": session.id }),
        Err(err) => json!({ "error": err.to_string() }),
    }
}
