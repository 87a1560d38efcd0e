//! Host-supplied business logic: step handlers and record hooks.

use anyhow::Result;
use rand::Rng;

use crate::wizard::request::StepData;
use crate::wizard::state::StateStore;

/// Result reported by a step handler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    /// `None` leaves the decision to [`MissingSuccessPolicy`](crate::wizard::MissingSuccessPolicy)
    pub success: Option<bool>,
    pub errors: Vec<String>,
    pub message: Option<String>,
}

impl StepOutcome {
    pub fn ok() -> Self {
        Self {
            success: Some(true),
            ..Self::default()
        }
    }

    /// An outcome that does not say whether it succeeded
    pub fn unspecified() -> Self {
        Self::default()
    }

    pub fn failed<I, S>(errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            success: Some(false),
            errors: errors.into_iter().map(Into::into).collect(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Business logic run after a step validates.
///
/// Handlers see the submitted data and the wizard state, so they can read or
/// set the correlation id. They run synchronously inside the request.
pub trait StepHandler: Send + Sync {
    fn handle(&self, data: &StepData, state: &mut StateStore) -> StepOutcome;
}

impl<F> StepHandler for F
where
    F: Fn(&StepData, &mut StateStore) -> StepOutcome + Send + Sync,
{
    fn handle(&self, data: &StepData, state: &mut StateStore) -> StepOutcome {
        self(data, state)
    }
}

/// Hooks tying the wizard to a backend record.
pub trait RecordHooks: Send + Sync {
    /// Create the backend record when the init step first completes in create
    /// mode. Returns the record's id.
    fn create_record(&self, data: &StepData, state: &StateStore) -> Result<i64>;

    /// Preload step data for an existing record in edit mode
    fn load_existing(&self, _state: &mut StateStore, _correlation_id: i64) -> Result<()> {
        Ok(())
    }
}

/// Default hooks: fabricate a placeholder id and load nothing.
///
/// Hosts that persist records replace this with their own [`RecordHooks`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderRecordHooks;

impl RecordHooks for PlaceholderRecordHooks {
    fn create_record(&self, _data: &StepData, _state: &StateStore) -> Result<i64> {
        let id = rand::thread_rng().gen_range(1000..=9999);
        tracing::warn!(id, "Using placeholder record id; install RecordHooks to create real records");
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wizard::store::MemorySessionStore;
    use std::sync::Arc;

    fn make_state() -> StateStore {
        StateStore::load(Arc::new(MemorySessionStore::new()), "s", "k").unwrap()
    }

    #[test]
    fn test_closure_is_a_handler() {
        let handler = |_: &StepData, state: &mut StateStore| {
            state.set_correlation_id(Some(5));
            StepOutcome::ok()
        };
        let mut state = make_state();
        let outcome = handler.handle(&StepData::new(), &mut state);
        assert_eq!(outcome.success, Some(true));
        assert_eq!(state.correlation_id(), Some(5));
    }

    #[test]
    fn test_placeholder_id_range() {
        let state = make_state();
        for _ in 0..20 {
            let id = PlaceholderRecordHooks
                .create_record(&StepData::new(), &state)
                .unwrap();
            assert!((1000..=9999).contains(&id));
        }
    }

    #[test]
    fn test_failed_outcome_collects_errors() {
        let outcome = StepOutcome::failed(["Email already used"]).with_message("rejected");
        assert_eq!(outcome.success, Some(false));
        assert_eq!(outcome.errors, vec!["Email already used".to_string()]);
        assert_eq!(outcome.message.as_deref(), Some("rejected"));
    }
}
