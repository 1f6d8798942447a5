use std::path::PathBuf;
use std::time::Duration;

/// Resolved daemon configuration.
///
/// Construction layers defaults → environment variables → explicit overrides (typically CLI
/// flags parsed by the `tabd` binary). This struct only holds the resolved values; layering lives
/// in [`DaemonConfig::from_env`] and the binary's `cli` module so the core crate stays agnostic of
/// `clap`.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub ipc_socket_path: PathBuf,
    pub ws_port: u16,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub default_browser_path: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            ipc_socket_path: PathBuf::from("/tmp/tab-daemon.sock"),
            ws_port: 9222,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(10),
            default_browser_path: None,
        }
    }
}

impl DaemonConfig {
    /// Layers the `TAB_SOCKET_PATH` / `TAB_WS_PORT` / `TAB_BROWSER_PATH` environment variables
    /// over the built-in defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("TAB_SOCKET_PATH") {
            config.ipc_socket_path = PathBuf::from(path);
        }
        if let Ok(port) = std::env::var("TAB_WS_PORT") {
            if let Ok(port) = port.parse() {
                config.ws_port = port;
            }
        }
        if let Ok(path) = std::env::var("TAB_BROWSER_PATH") {
            config.default_browser_path = Some(PathBuf::from(path));
        }
        config
    }

}

/// Timeout applied to an individual in-flight command while awaiting the extension's response.
/// Independent from the connection-level `heartbeat_timeout` in [`DaemonConfig`]; see DESIGN.md.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout used while an auto-launched browser is awaited to register its extension.
pub const EXTENSION_ARRIVAL_TIMEOUT: Duration = Duration::from_secs(30);
