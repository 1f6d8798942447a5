use thiserror::Error;

/// The wire-level error taxonomy, independent of how a [`DaemonError`] arose internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    SessionNotFound,
    SessionDisconnected,
    ExtensionNotConnected,
    CommandTimeout,
    BrowserLaunchFailed,
    InvalidCommand,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::SessionDisconnected => "SESSION_DISCONNECTED",
            ErrorCode::ExtensionNotConnected => "EXTENSION_NOT_CONNECTED",
            ErrorCode::CommandTimeout => "COMMAND_TIMEOUT",
            ErrorCode::BrowserLaunchFailed => "BROWSER_LAUNCH_FAILED",
            ErrorCode::InvalidCommand => "INVALID_COMMAND",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Typed errors raised by the registry, supervisor, gateway, and router.
///
/// Every variant carries enough context to produce both a human-readable message (via
/// `#[error(...)]`) and a classified [`ErrorCode`] (via [`DaemonError::code`]).
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("session name is invalid: {0}")]
    NameInvalid(String),

    #[error("a live session named {0:?} already exists")]
    NameTaken(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session {0} is disconnected")]
    SessionDisconnected(String),

    #[error("a browser is already running for session {0}")]
    BrowserAlreadyRunning(String),

    #[error("no browser executable found")]
    NoExecutable,

    #[error("failed to spawn browser: {0}")]
    SpawnFailure(String),

    #[error("extension not connected. {0}")]
    ExtensionNotConnected(String),

    #[error("command timed out")]
    CommandTimeout,

    #[error("invalid command structure")]
    InvalidCommand,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl DaemonError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DaemonError::NameInvalid(_) | DaemonError::NameTaken(_) => ErrorCode::InvalidCommand,
            DaemonError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            DaemonError::SessionDisconnected(_) => ErrorCode::SessionDisconnected,
            DaemonError::BrowserAlreadyRunning(_) | DaemonError::NoExecutable | DaemonError::SpawnFailure(_) => {
                ErrorCode::BrowserLaunchFailed
            }
            DaemonError::ExtensionNotConnected(_) => ErrorCode::ExtensionNotConnected,
            DaemonError::CommandTimeout => ErrorCode::CommandTimeout,
            DaemonError::InvalidCommand => ErrorCode::InvalidCommand,
            DaemonError::Io(_) | DaemonError::Json(_) | DaemonError::Internal(_) => ErrorCode::InternalError,
        }
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
