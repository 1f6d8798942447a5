//! Launches, monitors, and terminates headed browser child processes.
//!
//! Executable discovery and launch-flag shape follow the Chrome-launching code used elsewhere in
//! this workspace (`session::connector::find_chrome_executable`/`launch_chrome`); process
//! supervision (track pid, escalate from graceful to forceful kill) follows the same workspace's
//! `process_killer` module.

mod discovery;

pub use discovery::find_executable;

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{DaemonError, Result};
use crate::session::now_ts;

const GRACEFUL_WAIT: Duration = Duration::from_secs(5);
const FORCEFUL_WAIT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub session_id: String,
    pub profile_dir: Option<PathBuf>,
    pub url: Option<String>,
    pub executable_path: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ProcessInfo {
    pub pid: u32,
    pub launched_at: u64,
}

#[derive(Debug, Clone)]
pub enum BrowserEvent {
    Started { session_id: String, pid: u32 },
    Exited { session_id: String, exit_code: Option<i32> },
    Error { session_id: String, message: String },
}

struct Managed {
    child: Child,
    info: ProcessInfo,
}

struct SupervisorState {
    processes: HashMap<String, Managed>,
}

/// Manages one headed browser process per session.
#[derive(Clone)]
pub struct BrowserSupervisor {
    state: Arc<Mutex<SupervisorState>>,
    events: mpsc::UnboundedSender<BrowserEvent>,
}

impl BrowserSupervisor {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<BrowserEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let supervisor = Self {
            state: Arc::new(Mutex::new(SupervisorState { processes: HashMap::new() })),
            events,
        };
        (supervisor, rx)
    }

    pub async fn has(&self, session_id: &str) -> bool {
        self.state.lock().await.processes.contains_key(session_id)
    }

    pub async fn get_info(&self, session_id: &str) -> Option<ProcessInfo> {
        self.state.lock().await.processes.get(session_id).map(|m| m.info)
    }

    pub async fn list(&self) -> Vec<(String, ProcessInfo)> {
        self.state.lock().await.processes.iter().map(|(id, m)| (id.clone(), m.info)).collect()
    }

    /// Spawns a browser for `request.session_id`, refusing if one is already running for it.
    pub async fn launch(&self, request: LaunchRequest) -> Result<ProcessInfo> {
        {
            let state = self.state.lock().await;
            if state.processes.contains_key(&request.session_id) {
                return Err(DaemonError::BrowserAlreadyRunning(request.session_id));
            }
        }

        let executable = match &request.executable_path {
            Some(path) => path.clone(),
            None => find_executable(None).ok_or(DaemonError::NoExecutable)?,
        };

        let mut cmd = Command::new(&executable);
        cmd.args(automation_flags());
        if let Some(dir) = &request.profile_dir {
            cmd.arg(format!("--user-data-dir={}", dir.display()));
        }
        cmd.args(&request.extra_args);
        if let Some(url) = &request.url {
            cmd.arg("--new-window").arg(url);
        }
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null()).kill_on_drop(false);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| DaemonError::SpawnFailure(e.to_string()))?;
        let pid = child.id().ok_or_else(|| DaemonError::SpawnFailure("child exited immediately".to_string()))?;
        let info = ProcessInfo { pid, launched_at: now_ts() };

        {
            let mut state = self.state.lock().await;
            state.processes.insert(request.session_id.clone(), Managed { child, info });
        }

        self.watch_exit(request.session_id.clone());
        let _ = self.events.send(BrowserEvent::Started { session_id: request.session_id.clone(), pid });
        info!(target = "tabd.browser", session_id = %request.session_id, pid, "browser launched");
        Ok(info)
    }

    fn watch_exit(&self, session_id: String) {
        let state = self.state.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            enum Outcome {
                Exited(Option<i32>),
                WaitFailed(String),
            }
            loop {
                tokio::time::sleep(Duration::from_millis(500)).await;
                let outcome = {
                    let mut guard = state.lock().await;
                    match guard.processes.get_mut(&session_id) {
                        Some(managed) => match managed.child.try_wait() {
                            Ok(Some(status)) => Some(Outcome::Exited(status.code())),
                            Ok(None) => None,
                            Err(err) => Some(Outcome::WaitFailed(err.to_string())),
                        },
                        None => return,
                    }
                };
                let Some(outcome) = outcome else { continue };

                state.lock().await.processes.remove(&session_id);
                match outcome {
                    Outcome::Exited(exit_code) => {
                        let _ = events.send(BrowserEvent::Exited { session_id: session_id.clone(), exit_code });
                        info!(target = "tabd.browser", session_id = %session_id, "browser process exited");
                    }
                    Outcome::WaitFailed(message) => {
                        let _ = events.send(BrowserEvent::Error { session_id: session_id.clone(), message });
                    }
                }
                return;
            }
        });
    }

    /// Graceful SIGTERM, escalating to SIGKILL after [`GRACEFUL_WAIT`] if still alive.
    pub async fn kill(&self, session_id: &str) -> bool {
        let mut managed = {
            let mut state = self.state.lock().await;
            match state.processes.remove(session_id) {
                Some(m) => m,
                None => return false,
            }
        };

        terminate_gracefully(managed.info.pid);
        if tokio::time::timeout(GRACEFUL_WAIT, managed.child.wait()).await.is_err() {
            warn!(target = "tabd.browser", session_id, pid = managed.info.pid, "graceful shutdown timed out, killing");
            let _ = managed.child.start_kill();
            let _ = tokio::time::timeout(FORCEFUL_WAIT, managed.child.wait()).await;
        }
        true
    }

    /// Concurrent graceful-then-forceful shutdown of every managed process.
    pub async fn kill_all(&self) {
        let session_ids: Vec<String> = {
            let state = self.state.lock().await;
            state.processes.keys().cloned().collect()
        };
        let kills = session_ids.into_iter().map(|id| {
            let supervisor = self.clone();
            async move { supervisor.kill(&id).await }
        });
        futures::future::join_all(kills).await;
    }
}

fn automation_flags() -> Vec<&'static str> {
    vec![
        "--no-first-run",
        "--no-default-browser-check",
        "--disable-background-timer-throttling",
        "--disable-backgrounding-occluded-windows",
        "--disable-renderer-backgrounding",
        "--disable-popup-blocking",
        "--disable-translate",
        "--disable-default-apps",
    ]
}

#[cfg(unix)]
fn terminate_gracefully(pid: u32) {
    let _ = std::process::Command::new("kill").args(["-TERM", &pid.to_string()]).status();
}

#[cfg(not(unix))]
fn terminate_gracefully(_pid: u32) {}
