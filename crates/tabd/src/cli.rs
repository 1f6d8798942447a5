use std::path::PathBuf;

use clap::Parser;

use crate::styles::cli_styles;

/// Local daemon that mediates between command-line clients and browser extension windows.
#[derive(Debug, Parser)]
#[command(name = "tabd", version, styles = cli_styles())]
pub struct Cli {
    /// Path to the client-facing stream socket. Overrides `TAB_SOCKET_PATH`.
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Port the extension gateway listens on. Overrides `TAB_WS_PORT`.
    #[arg(long)]
    pub port: Option<u16>,

    /// Browser executable to launch instead of the auto-discovered one. Overrides `TAB_BROWSER_PATH`.
    #[arg(long)]
    pub browser: Option<PathBuf>,

    /// Increases log verbosity; repeatable (`-v`, `-vv`).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Layers these CLI overrides onto a config already resolved from defaults and environment.
    pub fn apply(&self, mut config: tabd_core::DaemonConfig) -> tabd_core::DaemonConfig {
        if let Some(socket) = &self.socket {
            config.ipc_socket_path = socket.clone();
        }
        if let Some(port) = self.port {
            config.ws_port = port;
        }
        if let Some(browser) = &self.browser {
            config.default_browser_path = Some(browser.clone());
        }
        config
    }
}
