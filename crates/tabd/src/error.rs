use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

/// Thin error wrapper at the binary edge; `tabd_core::DaemonError` carries the real taxonomy.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("daemon error: {0}")]
    Daemon(#[from] tabd_core::DaemonError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
