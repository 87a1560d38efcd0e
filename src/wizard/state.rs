//! Session-scoped wizard state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wizard::request::StepData;
use crate::wizard::step::StepId;
use crate::wizard::store::{SessionStore, StoreError};

/// The persisted record for one wizard in one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardState {
    /// Unset until the first access defaults it to the first step
    #[serde(default)]
    pub current_step: Option<StepId>,
    #[serde(default)]
    pub step_data: HashMap<StepId, StepData>,
    #[serde(default)]
    pub completed_steps: Vec<StepId>,
    #[serde(default)]
    pub correlation_id: Option<i64>,
    /// Whether the init-step record hook has run
    #[serde(default)]
    pub initialized: bool,
    pub created_at: DateTime<Utc>,
}

impl WizardState {
    pub fn new() -> Self {
        Self {
            current_step: None,
            step_data: HashMap::new(),
            completed_steps: Vec::new(),
            correlation_id: None,
            initialized: false,
            created_at: Utc::now(),
        }
    }
}

impl Default for WizardState {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns one wizard record for the duration of a request.
///
/// Reads and writes go to the in-memory record; [`StateStore::save`] writes it
/// back to the session substrate.
pub struct StateStore {
    store: Arc<dyn SessionStore>,
    session_id: String,
    key: String,
    record: WizardState,
}

impl StateStore {
    /// Load the record for `key` in `session_id`, creating it if absent
    pub fn load(
        store: Arc<dyn SessionStore>,
        session_id: impl Into<String>,
        key: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let session_id = session_id.into();
        let key = key.into();
        let record = match store.get(&session_id, &key)? {
            Some(record) => record,
            None => {
                tracing::debug!(session = %session_id, key = %key, "Initializing wizard state");
                WizardState::new()
            }
        };

        Ok(Self {
            store,
            session_id,
            key,
            record,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read-only view of the whole record
    pub fn record(&self) -> &WizardState {
        &self.record
    }

    /// Persist the record to the session substrate
    pub fn save(&self) -> Result<(), StoreError> {
        self.store.set(&self.session_id, &self.key, &self.record)
    }

    pub fn current_step(&self) -> Option<&StepId> {
        self.record.current_step.as_ref()
    }

    pub fn set_current_step(&mut self, step: StepId) {
        self.record.current_step = Some(step);
    }

    /// Data last submitted for `step`, empty if none
    pub fn step_data(&self, step: &StepId) -> StepData {
        self.record.step_data.get(step).cloned().unwrap_or_default()
    }

    /// Replace the data stored for `step`
    pub fn set_step_data(&mut self, step: StepId, data: StepData) {
        self.record.step_data.insert(step, data);
    }

    /// Shallow merge into the data stored for `step`; new keys win
    pub fn merge_step_data(&mut self, step: StepId, data: StepData) {
        self.record.step_data.entry(step).or_default().extend(data);
    }

    pub fn all_step_data(&self) -> &HashMap<StepId, StepData> {
        &self.record.step_data
    }

    pub fn clear_step_data(&mut self, step: &StepId) {
        self.record.step_data.remove(step);
    }

    pub fn is_step_completed(&self, step: &StepId) -> bool {
        self.record.completed_steps.contains(step)
    }

    /// Mark `step` completed. Marking twice has no further effect.
    pub fn mark_step_completed(&mut self, step: StepId) {
        if !self.is_step_completed(&step) {
            self.record.completed_steps.push(step);
        }
    }

    pub fn remove_completed_step(&mut self, step: &StepId) {
        self.record.completed_steps.retain(|s| s != step);
    }

    pub fn completed_steps(&self) -> &[StepId] {
        &self.record.completed_steps
    }

    pub fn correlation_id(&self) -> Option<i64> {
        self.record.correlation_id
    }

    pub fn set_correlation_id(&mut self, value: Option<i64>) {
        self.record.correlation_id = value;
    }

    pub fn is_initialized(&self) -> bool {
        self.record.initialized
    }

    pub fn mark_initialized(&mut self) {
        self.record.initialized = true;
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.record.created_at
    }

    /// Union of every step's data, walking `order` so later steps win on
    /// field-name collisions. Steps stored but absent from `order` come last.
    pub fn combined_data(&self, order: &[StepId]) -> StepData {
        let mut combined = StepData::new();
        for step in order {
            if let Some(data) = self.record.step_data.get(step) {
                combined.extend(data.clone());
            }
        }

        let mut stray: Vec<&StepId> = self
            .record
            .step_data
            .keys()
            .filter(|step| !order.contains(step))
            .collect();
        stray.sort();
        for step in stray {
            combined.extend(self.record.step_data[step].clone());
        }

        combined
    }

    /// Drop the persisted record and start over with a fresh one
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.store.delete(&self.session_id, &self.key)?;
        self.record = WizardState::new();
        tracing::debug!(session = %self.session_id, key = %self.key, "Wizard state reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::request::{step_data, FieldValue};
    use crate::wizard::store::MemorySessionStore;

    fn make_store() -> (Arc<MemorySessionStore>, StateStore) {
        let backend = Arc::new(MemorySessionStore::new());
        let state = StateStore::load(backend.clone(), "session-1", "form_step_default").unwrap();
        (backend, state)
    }

    #[test]
    fn test_fresh_state_defaults() {
        let (_, state) = make_store();
        assert!(state.current_step().is_none());
        assert!(state.completed_steps().is_empty());
        assert!(state.correlation_id().is_none());
        assert!(!state.is_initialized());
        assert!(state.step_data(&StepId::from(1)).is_empty());
    }

    #[test]
    fn test_mark_step_completed_idempotent() {
        let (_, mut state) = make_store();
        state.mark_step_completed(StepId::from(1));
        state.mark_step_completed(StepId::from(1));
        assert_eq!(state.completed_steps(), &[StepId::from(1)]);

        state.remove_completed_step(&StepId::from(1));
        assert!(!state.is_step_completed(&StepId::from(1)));
    }

    #[test]
    fn test_set_replaces_merge_overlays() {
        let (_, mut state) = make_store();
        let step = StepId::from(1);
        state.set_step_data(step.clone(), step_data([("a", "1"), ("b", "2")]));
        state.set_step_data(step.clone(), step_data([("c", "3")]));
        assert_eq!(state.step_data(&step).len(), 1);

        state.merge_step_data(step.clone(), step_data([("c", "30"), ("d", "4")]));
        let data = state.step_data(&step);
        assert_eq!(data["c"], FieldValue::from("30"));
        assert_eq!(data["d"], FieldValue::from("4"));

        state.clear_step_data(&step);
        assert!(state.step_data(&step).is_empty());
    }

    #[test]
    fn test_combined_data_later_step_wins() {
        let (_, mut state) = make_store();
        state.set_step_data(StepId::from(2), step_data([("name", "second"), ("x", "2")]));
        state.set_step_data(StepId::from(10), step_data([("name", "tenth")]));
        state.set_step_data(StepId::from(1), step_data([("name", "first"), ("y", "1")]));

        let order = vec![StepId::from(1), StepId::from(2), StepId::from(10)];
        let combined = state.combined_data(&order);
        assert_eq!(combined["name"], FieldValue::from("tenth"));
        assert_eq!(combined["x"], FieldValue::from("2"));
        assert_eq!(combined["y"], FieldValue::from("1"));
    }

    #[test]
    fn test_save_and_reload() {
        let (backend, mut state) = make_store();
        state.set_current_step(StepId::from(2));
        state.set_correlation_id(Some(1234));
        state.save().unwrap();

        let reloaded = StateStore::load(backend, "session-1", "form_step_default").unwrap();
        assert_eq!(reloaded.current_step(), Some(&StepId::from(2)));
        assert_eq!(reloaded.correlation_id(), Some(1234));
        assert_eq!(reloaded.created_at(), state.created_at());
    }

    #[test]
    fn test_reset_clears_everything() {
        let (backend, mut state) = make_store();
        state.set_current_step(StepId::from(3));
        state.mark_step_completed(StepId::from(1));
        state.set_step_data(StepId::from(1), step_data([("a", "1")]));
        state.set_correlation_id(Some(9));
        state.mark_initialized();
        state.save().unwrap();

        state.reset().unwrap();
        assert!(state.current_step().is_none());
        assert!(state.completed_steps().is_empty());
        assert!(state.all_step_data().is_empty());
        assert!(state.correlation_id().is_none());
        assert!(!state.is_initialized());
        assert!(backend.is_empty());
    }
}
