//! API state management for the REST server.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type SessionKey = (String, String);
type SessionLocks = Arc<Mutex<HashMap<SessionKey, Arc<AsyncMutex<()>>>>>;

use crate::config::{Config, SessionBackend};
use crate::rest::error::ApiError;
use crate::wizard::definition::{load_definitions, LoadedWizard};
use crate::wizard::{FileSessionStore, MemorySessionStore, SessionStore};

/// Shared state for the REST API
#[derive(Clone)]
pub struct ApiState {
    /// Wizards by form id, loaded once at startup
    pub forms: Arc<BTreeMap<String, LoadedWizard>>,
    /// Session substrate shared by every wizard
    pub store: Arc<dyn SessionStore>,
    pub config: Arc<Config>,
    /// One lock per (session, form) so a session's requests run one at a time
    session_locks: SessionLocks,
}

impl ApiState {
    /// Load wizard definitions and open the configured session store
    pub fn new(config: Config) -> Result<Self> {
        let forms = load_definitions(&config.forms_path(), &config.session.prefix)?;
        tracing::info!(
            count = forms.len(),
            dir = %config.forms_path().display(),
            "Loaded form definitions"
        );

        let store: Arc<dyn SessionStore> = match config.session.backend {
            SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
            SessionBackend::File => Arc::new(FileSessionStore::new(config.sessions_path())),
        };

        Ok(Self::with_forms(config, forms.into_values(), store))
    }

    /// Build state from already loaded wizards
    pub fn with_forms(
        config: Config,
        forms: impl IntoIterator<Item = LoadedWizard>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let forms = forms
            .into_iter()
            .map(|wizard| (wizard.id.clone(), wizard))
            .collect();

        Self {
            forms: Arc::new(forms),
            store,
            config: Arc::new(config),
            session_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn form(&self, form_id: &str) -> Result<&LoadedWizard, ApiError> {
        self.forms
            .get(form_id)
            .ok_or_else(|| ApiError::NotFound(format!("Form '{}' not found", form_id)))
    }

    /// Sessions with a request in flight or queued
    pub fn active_sessions(&self) -> usize {
        self.session_locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    /// Wait for exclusive access to one session's wizard
    pub async fn lock_session(&self, session_id: &str, form_id: &str) -> Result<SessionGuard, ApiError> {
        let key = (session_id.to_string(), form_id.to_string());
        let lock = {
            let mut locks = self
                .session_locks
                .lock()
                .map_err(|_| ApiError::InternalError("session lock table poisoned".to_string()))?;
            Arc::clone(locks.entry(key.clone()).or_default())
        };

        Ok(SessionGuard {
            guard: Some(lock.lock_owned().await),
            key,
            locks: Arc::clone(&self.session_locks),
        })
    }
}

/// Exclusive access to one (session, form) pair.
///
/// Dropping it releases the lock and removes the table entry once no other
/// request holds or waits on it.
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: SessionKey,
    locks: SessionLocks,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        // Entries are only cloned under the table lock, so a count of one
        // means no request holds or waits on this mutex.
        if let Ok(mut locks) = self.locks.lock() {
            if locks
                .get(&self.key)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
            {
                locks.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.paths.forms = dir.path().join("forms").to_string_lossy().to_string();
        config.paths.sessions = dir.path().join("sessions").to_string_lossy().to_string();
        config
    }

    #[test]
    fn test_api_state_new_loads_forms() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("forms")).unwrap();
        std::fs::write(dir.path().join("forms/signup.yaml"), "steps: [1, 2]\n").unwrap();

        let state = ApiState::new(test_config(&dir)).unwrap();
        assert_eq!(state.forms.len(), 1);
        assert!(state.form("signup").is_ok());
        assert!(matches!(state.form("other"), Err(ApiError::NotFound(_))));
    }

    #[test]
    fn test_api_state_without_forms_dir() {
        let dir = TempDir::new().unwrap();
        let state = ApiState::new(test_config(&dir)).unwrap();
        assert!(state.forms.is_empty());
    }

    #[tokio::test]
    async fn test_session_lock_is_per_session() {
        let dir = TempDir::new().unwrap();
        let state = ApiState::new(test_config(&dir)).unwrap();

        let held = state.lock_session("a", "signup").await.unwrap();
        // A different session is not blocked
        let _other = state.lock_session("b", "signup").await.unwrap();

        let same = state.session_locks.lock().unwrap()[&("a".to_string(), "signup".to_string())].clone();
        assert!(same.try_lock().is_err());
        drop(held);
        assert!(same.try_lock().is_ok());
    }

    #[tokio::test]
    async fn test_lock_table_drops_released_sessions() {
        let dir = TempDir::new().unwrap();
        let state = ApiState::new(test_config(&dir)).unwrap();

        for i in 0..100 {
            let _guard = state.lock_session(&format!("session-{i}"), "signup").await.unwrap();
        }
        assert_eq!(state.active_sessions(), 0);

        let held = state.lock_session("a", "signup").await.unwrap();
        assert_eq!(state.active_sessions(), 1);
        drop(held);
        assert_eq!(state.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_queued_request_keeps_session_serialized() {
        let dir = TempDir::new().unwrap();
        let state = ApiState::new(test_config(&dir)).unwrap();

        let first = state.lock_session("a", "signup").await.unwrap();

        let (acquired_tx, acquired_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let waiter_state = state.clone();
        let waiter = tokio::spawn(async move {
            let _second = waiter_state.lock_session("a", "signup").await.unwrap();
            acquired_tx.send(()).unwrap();
            release_rx.await.unwrap();
        });

        // Wait until the waiter has picked up the session's mutex
        let key = ("a".to_string(), "signup".to_string());
        while Arc::strong_count(&state.session_locks.lock().unwrap()[&key]) < 3 {
            tokio::task::yield_now().await;
        }

        drop(first);
        acquired_rx.await.unwrap();
        // The queued request holds the session, so the entry stays
        assert_eq!(state.active_sessions(), 1);

        let third = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            state.lock_session("a", "signup"),
        )
        .await;
        assert!(third.is_err(), "third request ran alongside the queued one");

        release_tx.send(()).unwrap();
        waiter.await.unwrap();
        let _third = state.lock_session("a", "signup").await.unwrap();
    }
}
