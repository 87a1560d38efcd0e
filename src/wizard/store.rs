//! Session storage abstraction.
//!
//! The wizard never reaches for ambient session state. Hosts hand it a
//! [`SessionStore`]; this module provides a process-local implementation for
//! tests and single-process servers, and a JSON file implementation that
//! survives restarts.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::wizard::state::WizardState;

/// Errors raised by a session substrate
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("session store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize session record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed per-client storage for wizard records.
///
/// `session` identifies the client session, `key` the wizard within it
/// (`session_prefix + form_id`). Implementations must offer read-after-write
/// consistency for a single session.
pub trait SessionStore: Send + Sync {
    fn get(&self, session: &str, key: &str) -> Result<Option<WizardState>, StoreError>;

    fn set(&self, session: &str, key: &str, record: &WizardState) -> Result<(), StoreError>;

    fn delete(&self, session: &str, key: &str) -> Result<(), StoreError>;
}

/// Session records held in process memory
#[derive(Default, Clone)]
pub struct MemorySessionStore {
    records: Arc<Mutex<HashMap<(String, String), WizardState>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all sessions
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), WizardState>>, StoreError>
    {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, session: &str, key: &str) -> Result<Option<WizardState>, StoreError> {
        Ok(self
            .lock()?
            .get(&(session.to_string(), key.to_string()))
            .cloned())
    }

    fn set(&self, session: &str, key: &str, record: &WizardState) -> Result<(), StoreError> {
        self.lock()?
            .insert((session.to_string(), key.to_string()), record.clone());
        Ok(())
    }

    fn delete(&self, session: &str, key: &str) -> Result<(), StoreError> {
        self.lock()?
            .remove(&(session.to_string(), key.to_string()));
        Ok(())
    }
}

/// Session records stored as `<root>/<session>/<key>.json`
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, session: &str, key: &str) -> PathBuf {
        self.root
            .join(sanitize(session))
            .join(format!("{}.json", sanitize(key)))
    }
}

/// Keep path components to a safe character set
fn sanitize(component: &str) -> String {
    let cleaned: String = component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, session: &str, key: &str) -> Result<Option<WizardState>, StoreError> {
        let path = self.record_path(session, key);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn set(&self, session: &str, key: &str, record: &WizardState) -> Result<(), StoreError> {
        let path = self.record_path(session, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(record)?;
        fs::write(path, contents)?;
        Ok(())
    }

    fn delete(&self, session: &str, key: &str) -> Result<(), StoreError> {
        let path = self.record_path(session, key);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
