//! The scheduler: enforces at-most-one-in-flight-per-session, queues overflow FIFO, drives
//! auto-launch for navigation-class commands, and matches responses back to their submitters.
//!
//! Response matching and per-command timeouts live on [`crate::gateway::Gateway::send_command`]
//! (a direct `oneshot` await per in-flight command) rather than in a separate pending-map +
//! timer-handle structure — the natural Rust shape for "wait for one reply or time out" is an
//! awaited future, not hand-rolled bookkeeping. See DESIGN.md for why this still satisfies every
//! ordering and cancellation guarantee this component is responsible for.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, oneshot, watch};
use tracing::info;

use tabd_protocol::{ClientResponse, Command, ExtensionResponse, translate_for_extension, validate_command};

use crate::browser::{BrowserSupervisor, LaunchRequest};
use crate::config::{COMMAND_TIMEOUT, EXTENSION_ARRIVAL_TIMEOUT};
use crate::error::DaemonError;
use crate::gateway::Gateway;
use crate::session::{SessionRegistry, SessionState};

struct QueuedCommand {
    command: Command,
    resolver: oneshot::Sender<ClientResponse>,
}

struct RouterState {
    in_flight: HashMap<String, String>,
    queues: HashMap<String, VecDeque<QueuedCommand>>,
    connection_waiters: HashMap<String, Vec<oneshot::Sender<()>>>,
}

impl RouterState {
    fn new() -> Self {
        Self {
            in_flight: HashMap::new(),
            queues: HashMap::new(),
            connection_waiters: HashMap::new(),
        }
    }
}

#[derive(Clone)]
pub struct Router {
    state: Arc<Mutex<RouterState>>,
    registry: SessionRegistry,
    gateway: Gateway,
    browser: BrowserSupervisor,
    shutdown: watch::Sender<bool>,
}

impl Router {
    pub fn new(registry: SessionRegistry, gateway: Gateway, browser: BrowserSupervisor) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            state: Arc::new(Mutex::new(RouterState::new())),
            registry,
            gateway,
            browser,
            shutdown,
        }
    }

    /// Submits `cmd` for execution, resolving once the extension has answered, the command was
    /// cancelled, or it timed out at any stage.
    pub async fn submit(&self, mut cmd: Command) -> ClientResponse {
        if validate_command(&cmd).is_err() {
            return ExtensionResponse::failure(cmd.id.clone(), "Invalid command structure");
        }

        let session = match self.resolve_session(&cmd).await {
            Ok(session) => session,
            Err(response) => return response,
        };
        cmd.session_id = session.id.clone();

        if !self.gateway.is_connected(&session.id).await {
            if cmd.command_type.is_navigation_class() {
                if let Err(response) = self.auto_launch(&session.id, session.profile_dir.clone(), &cmd).await {
                    return response;
                }
            } else {
                return ExtensionResponse::failure(cmd.id.clone(), format!("Extension not connected. session={}", session.id));
            }
        }

        self.enqueue_or_execute(cmd).await
    }

    async fn resolve_session(&self, cmd: &Command) -> std::result::Result<crate::session::Session, ClientResponse> {
        if let Some(session) = self.registry.get(&cmd.session_id).await {
            return Ok(session);
        }
        if let Some(session) = self.registry.get_by_name(&cmd.session_id).await {
            return Ok(session);
        }
        Err(ExtensionResponse::failure(cmd.id.clone(), format!("Session not found: {}", cmd.session_id)))
    }

    async fn auto_launch(&self, session_id: &str, profile_dir: Option<std::path::PathBuf>, cmd: &Command) -> std::result::Result<(), ClientResponse> {
        if !self.browser.has(session_id).await {
            let _ = self.registry.update_state(session_id, SessionState::AwaitingExtension).await;
            let request = LaunchRequest {
                session_id: session_id.to_string(),
                profile_dir,
                url: cmd.param_str("url").map(str::to_string),
                executable_path: None,
                extra_args: Vec::new(),
            };
            if let Err(err) = self.browser.launch(request).await {
                let _ = self.registry.update_state(session_id, SessionState::Disconnected).await;
                return Err(ExtensionResponse::failure(cmd.id.clone(), format!("Failed to launch browser: {err}")));
            }
        }

        if self.wait_for_extension(session_id, EXTENSION_ARRIVAL_TIMEOUT).await {
            Ok(())
        } else {
            self.browser.kill(session_id).await;
            let _ = self.registry.update_state(session_id, SessionState::Disconnected).await;
            Err(ExtensionResponse::failure(cmd.id.clone(), "Timed out waiting for extension to connect"))
        }
    }

    async fn wait_for_extension(&self, session_id: &str, timeout: Duration) -> bool {
        if self.gateway.is_connected(session_id).await {
            return true;
        }
        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            state.connection_waiters.entry(session_id.to_string()).or_default().push(tx);
        }
        tokio::time::timeout(timeout, rx).await.is_ok_and(|r| r.is_ok())
    }

    /// Called once the gateway reports a session's extension connected, waking any callers
    /// blocked in [`Router::wait_for_extension`] for that session.
    pub async fn notify_extension_connected(&self, session_id: &str) {
        let waiters = {
            let mut state = self.state.lock().await;
            state.connection_waiters.remove(session_id).unwrap_or_default()
        };
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// Fails every queued command for `session_id` with "Extension disconnected". Any in-flight
    /// command resolves on its own: its `gateway.send_command` await fails the moment the
    /// connection drops.
    pub async fn handle_extension_disconnected(&self, session_id: &str) {
        let queued = {
            let mut state = self.state.lock().await;
            state.queues.remove(session_id).unwrap_or_default()
        };
        for queued in queued {
            let _ = queued.resolver.send(ExtensionResponse::failure(queued.command.id, "Extension disconnected"));
        }
    }

    async fn enqueue_or_execute(&self, cmd: Command) -> ClientResponse {
        let session_id = cmd.session_id.clone();
        let must_queue = {
            let state = self.state.lock().await;
            state.in_flight.contains_key(&session_id)
        };

        if !must_queue {
            return self.execute_immediately(cmd).await;
        }

        let (resolver, rx) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            state.queues.entry(session_id).or_default().push_back(QueuedCommand { command: cmd, resolver });
        }
        rx.await.unwrap_or_else(|_| ExtensionResponse::failure("", "Command cancelled: daemon shutting down"))
    }

    /// Marks `cmd`'s session in-flight and runs it. Callers are responsible for having checked
    /// that no other command is already in flight for this session.
    async fn execute_immediately(&self, cmd: Command) -> ClientResponse {
        let session_id = cmd.session_id.clone();
        {
            let mut state = self.state.lock().await;
            state.in_flight.insert(session_id.clone(), cmd.id.clone());
        }
        self.run_in_flight(cmd).await
    }

    /// Sends `cmd` to its extension and awaits the reply, assuming `in_flight` is already set for
    /// its session.
    async fn run_in_flight(&self, cmd: Command) -> ClientResponse {
        let session_id = cmd.session_id.clone();
        let ext_cmd = translate_for_extension(&cmd);
        let mut shutdown_rx = self.shutdown.subscribe();
        let response = tokio::select! {
            result = self.gateway.send_command(&session_id, ext_cmd, COMMAND_TIMEOUT) => match result {
                Ok(response) => response,
                Err(DaemonError::CommandTimeout) => ExtensionResponse::failure(cmd.id.clone(), "Command timed out"),
                Err(DaemonError::ExtensionNotConnected(_)) => ExtensionResponse::failure(cmd.id.clone(), "Extension disconnected"),
                Err(_) => ExtensionResponse::failure(cmd.id.clone(), "Failed to send command to extension"),
            },
            _ = shutdown_rx.changed() => ExtensionResponse::failure(cmd.id.clone(), "Command cancelled: daemon shutting down"),
        };

        self.finish_and_drain(&session_id).await;
        response
    }

    /// Clears `in_flight` for `session_id` and, if a command was queued behind it, re-marks it
    /// in-flight under the same lock before handing it off — so a `submit` arriving in between
    /// never sees an empty `in_flight` slot and executes concurrently with the dequeued command.
    async fn finish_and_drain(&self, session_id: &str) {
        let next = {
            let mut state = self.state.lock().await;
            state.in_flight.remove(session_id);
            let next = state.queues.get_mut(session_id).and_then(VecDeque::pop_front);
            if let Some(queued) = &next {
                state.in_flight.insert(session_id.to_string(), queued.command.id.clone());
            }
            next
        };
        if let Some(QueuedCommand { command, resolver }) = next {
            let router = self.clone();
            tokio::spawn(async move {
                let response = router.run_in_flight(command).await;
                let _ = resolver.send(response);
            });
        }
    }

    /// Resolves every pending and queued command with a cancellation error and stops accepting
    /// new in-flight work from resolving normally. Idempotent.
    pub async fn cancel_all(&self) {
        let _ = self.shutdown.send(true);
        let queues = {
            let mut state = self.state.lock().await;
            std::mem::take(&mut state.queues)
        };
        for (_, queued) in queues {
            for queued in queued {
                let _ = queued.resolver.send(ExtensionResponse::failure(queued.command.id, "Command cancelled: daemon shutting down"));
            }
        }
        info!(target = "tabd.router", "cancelled all pending and queued commands");
    }

    /// True while any session has an in-flight or queued command.
    pub async fn has_outstanding_work(&self) -> bool {
        let state = self.state.lock().await;
        !state.in_flight.is_empty() || state.queues.values().any(|q| !q.is_empty())
    }
}
