use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use super::{BrowserHandle, ExtensionHandle, Session, SessionState, is_valid_name, profile_key};
use crate::error::{DaemonError, Result};

#[derive(Default)]
struct RegistryState {
    by_id: HashMap<String, Session>,
    by_name: HashMap<String, String>,
    /// profile key -> session id, for the per-profile `default` session.
    default_by_profile: HashMap<String, String>,
}

/// Authoritative store of sessions.
///
/// A single `tokio::sync::Mutex` guards every index, the same single-`Mutex<State>`-per-component
/// shape used throughout this workspace's shared daemon state.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `default` is exempt from the global name index: it is unique per profile, not process-wide,
    /// so its uniqueness check and slot live solely in `default_by_profile`, keyed by profile.
    pub async fn create(&self, name: &str, profile_dir: Option<PathBuf>) -> Result<Session> {
        if !is_valid_name(name) {
            return Err(DaemonError::NameInvalid(name.to_string()));
        }

        let mut state = self.state.lock().await;
        if name == "default" {
            if state.default_by_profile.contains_key(&profile_key(profile_dir.as_ref())) {
                return Err(DaemonError::NameTaken(name.to_string()));
            }
        } else if state.by_name.contains_key(name) {
            return Err(DaemonError::NameTaken(name.to_string()));
        }

        let session = Session::build(name.to_string(), profile_dir.clone());
        let id = session.id.clone();

        if name == "default" {
            state.default_by_profile.insert(profile_key(profile_dir.as_ref()), id.clone());
        } else {
            state.by_name.insert(name.to_string(), id.clone());
        }
        state.by_id.insert(id.clone(), session.clone());

        debug!(target = "tabd.registry", session_id = %id, name, "session created");
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Session> {
        self.state.lock().await.by_id.get(id).cloned()
    }

    pub async fn get_by_name(&self, name: &str) -> Option<Session> {
        let state = self.state.lock().await;
        let id = state.by_name.get(name)?;
        state.by_id.get(id).cloned()
    }

    /// Returns the live `default` session for `profile_dir`, creating it if none exists yet.
    pub async fn get_or_create_default(&self, profile_dir: Option<PathBuf>) -> Result<Session> {
        let key = profile_key(profile_dir.as_ref());
        {
            let state = self.state.lock().await;
            if let Some(id) = state.default_by_profile.get(&key) {
                if let Some(session) = state.by_id.get(id) {
                    return Ok(session.clone());
                }
            }
        }
        self.create("default", profile_dir).await
    }

    pub async fn list(&self) -> Vec<Session> {
        self.state.lock().await.by_id.values().cloned().collect()
    }

    pub async fn list_by_state(&self, wanted: SessionState) -> Vec<Session> {
        self.state.lock().await.by_id.values().filter(|s| s.state == wanted).cloned().collect()
    }

    pub async fn delete(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(session) = state.by_id.remove(id) else {
            return false;
        };
        state.by_name.remove(&session.name);
        state.default_by_profile.retain(|_, v| v != id);
        true
    }

    pub async fn update_state(&self, id: &str, new_state: SessionState) -> Result<()> {
        let mut state = self.state.lock().await;
        let session = state.by_id.get_mut(id).ok_or_else(|| DaemonError::SessionNotFound(id.to_string()))?;
        session.state = new_state;
        Ok(())
    }

    /// Binds (or clears) the extension handle; toggles `state` to match.
    pub async fn set_extension_connection(&self, id: &str, handle: Option<ExtensionHandle>) -> Result<()> {
        let mut state = self.state.lock().await;
        let session = state.by_id.get_mut(id).ok_or_else(|| DaemonError::SessionNotFound(id.to_string()))?;
        session.extension_connection = handle;
        session.state = if session.extension_connection.is_some() {
            SessionState::Active
        } else {
            SessionState::Disconnected
        };
        Ok(())
    }

    pub async fn set_browser_process(&self, id: &str, handle: Option<BrowserHandle>) -> Result<()> {
        let mut state = self.state.lock().await;
        let session = state.by_id.get_mut(id).ok_or_else(|| DaemonError::SessionNotFound(id.to_string()))?;
        session.browser_process = handle;
        Ok(())
    }

    /// Returns the earliest-created session still `awaiting_extension` (FIFO), without mutating
    /// its state — the caller transitions it after binding.
    pub async fn assign_next_awaiting(&self) -> Option<Session> {
        let state = self.state.lock().await;
        state
            .by_id
            .values()
            .filter(|s| s.state == SessionState::AwaitingExtension)
            .min_by_key(|s| s.created_at)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_rejects_invalid_name() {
        let registry = SessionRegistry::new();
        let err = registry.create("not valid!", None).await.unwrap_err();
        assert!(matches!(err, DaemonError::NameInvalid(_)));
    }

    #[tokio::test]
    async fn create_rejects_duplicate_name() {
        let registry = SessionRegistry::new();
        registry.create("work", None).await.unwrap();
        let err = registry.create("work", None).await.unwrap_err();
        assert!(matches!(err, DaemonError::NameTaken(_)));
    }

    #[tokio::test]
    async fn default_is_scoped_per_profile() {
        let registry = SessionRegistry::new();
        let a = registry.get_or_create_default(None).await.unwrap();
        let b = registry.get_or_create_default(Some(PathBuf::from("/profiles/work"))).await.unwrap();
        assert_ne!(a.id, b.id);

        let a_again = registry.get_or_create_default(None).await.unwrap();
        assert_eq!(a.id, a_again.id);
    }

    #[tokio::test]
    async fn extension_connection_toggles_state() {
        let registry = SessionRegistry::new();
        let session = registry.create("s1", None).await.unwrap();
        registry.set_extension_connection(&session.id, Some(1)).await.unwrap();
        let session = registry.get(&session.id).await.unwrap();
        assert_eq!(session.state, SessionState::Active);
        assert!(session.extension_connection.is_some());

        registry.set_extension_connection(&session.id, None).await.unwrap();
        let session = registry.get(&session.id).await.unwrap();
        assert_eq!(session.state, SessionState::Disconnected);
        assert!(session.extension_connection.is_none());
    }

    #[tokio::test]
    async fn assign_next_awaiting_is_fifo() {
        let registry = SessionRegistry::new();
        let first = registry.create("a", None).await.unwrap();
        registry.update_state(&first.id, SessionState::AwaitingExtension).await.unwrap();
        let second = registry.create("b", None).await.unwrap();
        registry.update_state(&second.id, SessionState::AwaitingExtension).await.unwrap();

        let next = registry.assign_next_awaiting().await.unwrap();
        assert_eq!(next.id, first.id);

        // Does not mutate state; caller must transition explicitly.
        let still_awaiting = registry.get(&first.id).await.unwrap();
        assert_eq!(still_awaiting.state, SessionState::AwaitingExtension);
    }

    #[tokio::test]
    async fn delete_removes_from_all_indices() {
        let registry = SessionRegistry::new();
        let session = registry.create("gone", None).await.unwrap();
        assert!(registry.delete(&session.id).await);
        assert!(registry.get(&session.id).await.is_none());
        assert!(registry.get_by_name("gone").await.is_none());
        assert!(!registry.delete(&session.id).await);
    }
}
