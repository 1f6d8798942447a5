mod registry;

pub use registry::SessionRegistry;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

/// State machine for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    AwaitingExtension,
    Active,
    Disconnected,
}

/// A non-owning handle to an open extension transport, as held by a [`Session`].
///
/// The Gateway owns the real connection; the registry only needs to know *that* one exists so it
/// can answer `state == active` queries and expose it for the router to send through.
pub type ExtensionHandle = crate::gateway::ConnectionId;

/// A non-owning handle to a managed browser child process, as held by a [`Session`].
pub type BrowserHandle = u32;

/// A session: the logical binding between one browser window and the daemon's routing identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub profile_dir: Option<PathBuf>,
    pub state: SessionState,
    pub created_at: u64,
    pub extension_connection: Option<ExtensionHandle>,
    pub browser_process: Option<BrowserHandle>,
}

impl Session {
    fn new(name: String, profile_dir: Option<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            profile_dir,
            state: SessionState::Pending,
            created_at: now_ts(),
            extension_connection: None,
            browser_process: None,
        }
    }
}

pub(crate) fn now_ts() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Normalizes a profile directory into the key used for the per-profile `default` index. `None`
/// maps to a sentinel distinct from any real path so the unset-profile default and an
/// explicit-path default don't collide.
pub(crate) fn profile_key(profile_dir: Option<&PathBuf>) -> String {
    match profile_dir {
        Some(path) => format!("path:{}", path.display()),
        None => "unset".to_string(),
    }
}

/// Validates a session name against `^[A-Za-z0-9_-]{1,64}$`.
pub fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > 64 {
        return false;
    }
    name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

// Constructor kept crate-private; only `SessionRegistry::create` builds live sessions.
impl Session {
    pub(crate) fn build(name: String, profile_dir: Option<PathBuf>) -> Self {
        Session::new(name, profile_dir)
    }
}
