//! Step manager for handling wizard transitions

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use crate::wizard::config::{CommitPolicy, FormStepConfig, MissingSuccessPolicy, Mode};
use crate::wizard::errors::{
    FormErrors, COMPLETE_OFF_LAST_STEP, FINAL_STEP_PROCESSING_FAILED, INVALID_TARGET_STEP,
    NAVIGATION_NOT_ALLOWED, STEP_PROCESSING_FAILED,
};
use crate::wizard::handler::StepOutcome;
use crate::wizard::render::{
    missing_view, render_errors, render_navigation, render_progress, Progress, ViewContext,
};
use crate::wizard::request::{FormAction, FormRequest, StepData};
use crate::wizard::state::StateStore;
use crate::wizard::step::StepId;
use crate::wizard::store::StoreError;
use crate::wizard::validator::Validator;

/// Drives one wizard for one session through a request.
///
/// Build it with the config and the session's [`StateStore`], feed it the
/// submitted [`FormRequest`], then read the current step, errors and
/// completion to render the response.
pub struct FormStepManager {
    config: Arc<FormStepConfig>,
    state: StateStore,
    validator: Validator,
    errors: FormErrors,
    /// Message from a step handler that accepted the submission
    notice: Option<String>,
    processed: bool,
}

impl FormStepManager {
    /// Create a manager over `state`.
    ///
    /// In edit mode with a configured correlation id, the first time a state
    /// sees that id the init step is marked completed and the record hooks
    /// get a chance to preload existing data.
    pub fn new(config: Arc<FormStepConfig>, state: StateStore) -> Result<Self> {
        let mut validator = Validator::new();
        for (step, rules) in config.rules() {
            validator.set_rules(step.clone(), rules.clone());
        }

        let mut manager = Self {
            config,
            state,
            validator,
            errors: FormErrors::default(),
            notice: None,
            processed: false,
        };

        manager.ensure_current_step();

        if manager.config.mode() == Mode::Edit {
            if let Some(id) = manager.config.correlation_id() {
                if manager.state.correlation_id() != Some(id) {
                    manager.initialize_edit_mode(id)?;
                }
            }
        }

        Ok(manager)
    }

    fn ensure_current_step(&mut self) {
        let valid = self
            .state
            .current_step()
            .is_some_and(|s| self.config.contains(s));
        if !valid {
            if let Some(stale) = self.state.current_step() {
                tracing::warn!(step = %stale, "Stored step is not configured, restarting wizard");
            }
            self.state
                .set_current_step(self.config.first_step().clone());
        }
    }

    fn initialize_edit_mode(&mut self, id: i64) -> Result<()> {
        tracing::debug!(correlation_id = id, "Initializing edit mode");
        self.state.set_correlation_id(Some(id));
        self.state
            .mark_step_completed(self.config.init_step().clone());
        self.state.mark_initialized();

        let hooks = Arc::clone(self.config.record_hooks());
        hooks
            .load_existing(&mut self.state, id)
            .with_context(|| format!("Failed to load existing record {}", id))
    }

    /// Apply one submission and persist the resulting state.
    ///
    /// Returns `Ok(true)` when the transition went through. Validation,
    /// handler and navigation failures return `Ok(false)` and leave their
    /// messages in [`errors`](Self::errors). Only session store failures are
    /// returned as errors.
    pub fn process(&mut self, request: FormRequest) -> Result<bool, StoreError> {
        self.processed = true;
        self.errors.clear();
        self.notice = None;

        let current = self.current_step().clone();
        tracing::debug!(action = %request.action, step = %current, "Processing wizard request");

        match request.action {
            FormAction::Next => self.process_next(&current, request.data),
            FormAction::Prev => self.process_prev(&current),
            FormAction::Save => {
                self.commit_step(&current, request.data, STEP_PROCESSING_FAILED, true);
            }
            FormAction::Goto => self.process_goto(&current, request.target_step, request.data),
            FormAction::Complete => self.process_complete(&current, request.data),
        }

        if !self.errors.is_empty() {
            tracing::debug!(
                action = %request.action,
                step = %current,
                errors = self.errors.len(),
                "Wizard transition rejected"
            );
            self.notice = None;
        }

        self.state.save()?;
        Ok(self.errors.is_empty())
    }

    fn process_next(&mut self, current: &StepId, data: StepData) {
        if !self.commit_step(current, data, STEP_PROCESSING_FAILED, true) {
            return;
        }

        // Staying put on the last step absorbs double submissions
        if let Some(next) = self.config.next_step(current) {
            self.state.set_current_step(next.clone());
        }
    }

    fn process_prev(&mut self, current: &StepId) {
        if !self.config.allow_navigation() {
            self.errors.push(NAVIGATION_NOT_ALLOWED);
            return;
        }

        if let Some(prev) = self.config.previous_step(current) {
            self.state.set_current_step(prev.clone());
        }
    }

    fn process_goto(&mut self, current: &StepId, target: Option<StepId>, data: StepData) {
        if !self.config.allow_navigation() {
            self.errors.push(NAVIGATION_NOT_ALLOWED);
            return;
        }

        let Some((target, target_index)) = target.and_then(|t| {
            let index = self.config.index_of(&t)?;
            Some((t, index))
        }) else {
            self.errors.push(INVALID_TARGET_STEP);
            return;
        };

        let current_index = self.config.index_of(current).unwrap_or(0);
        let moving_forward = target_index > current_index;

        // Checked before the save below: a required step, the current one
        // included, has to be saved with `save` or `next` first.
        let blocking = self.config.steps()[..target_index]
            .iter()
            .find(|step| self.config.is_required_save_step(step) && !self.state.is_step_completed(step));
        if let Some(step) = blocking {
            self.errors
                .push(format!("Step {} must be completed before proceeding", step));
            return;
        }

        if moving_forward && !self.commit_step(current, data, STEP_PROCESSING_FAILED, true) {
            return;
        }

        self.state.set_current_step(target);
    }

    fn process_complete(&mut self, current: &StepId, data: StepData) {
        if !self.config.is_last_step(current) {
            self.errors.push(COMPLETE_OFF_LAST_STEP);
            return;
        }

        if self.commit_step(current, data, FINAL_STEP_PROCESSING_FAILED, false) {
            tracing::info!(
                session = %self.state.session_id(),
                correlation_id = ?self.state.correlation_id(),
                "Wizard completed"
            );
        }
    }

    /// Validate, store, run the handler, mark completed and, when due, create
    /// the backend record. Returns whether every stage succeeded.
    fn commit_step(
        &mut self,
        step: &StepId,
        data: StepData,
        failure_message: &str,
        run_init_hook: bool,
    ) -> bool {
        if !self.validator.validate(step, &data) {
            self.errors.fields = self.validator.errors().clone();
            return false;
        }

        let policy = self.config.commit_policy();
        if policy == CommitPolicy::SaveBeforeHandler {
            self.state.set_step_data(step.clone(), data.clone());
        }

        if let Some(handler) = self.config.handler(step).cloned() {
            let outcome = handler.handle(&data, &mut self.state);
            if !self.accept_outcome(step, outcome, failure_message) {
                return false;
            }
        }

        if policy == CommitPolicy::OnSuccess {
            self.state.set_step_data(step.clone(), data.clone());
        }

        self.state.mark_step_completed(step.clone());

        if run_init_hook
            && step == self.config.init_step()
            && self.config.mode() == Mode::Create
            && !self.state.is_initialized()
        {
            return self.run_init_hook(&data);
        }

        true
    }

    fn accept_outcome(&mut self, step: &StepId, outcome: StepOutcome, failure_message: &str) -> bool {
        let success = outcome.success.unwrap_or(
            self.config.strictness().missing_success == MissingSuccessPolicy::TreatAsSuccess,
        );
        if success {
            if let Some(message) = outcome.message {
                self.notice = Some(message);
            }
            return true;
        }

        tracing::debug!(step = %step, errors = ?outcome.errors, "Step handler reported failure");
        if outcome.errors.is_empty() {
            self.errors.push(failure_message);
        } else {
            self.errors.messages.extend(outcome.errors);
        }
        false
    }

    fn run_init_hook(&mut self, data: &StepData) -> bool {
        let hooks = Arc::clone(self.config.record_hooks());
        match hooks.create_record(data, &self.state) {
            Ok(id) => {
                tracing::info!(correlation_id = id, "Created wizard record");
                self.state.set_correlation_id(Some(id));
                self.state.mark_initialized();
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Record creation failed");
                self.errors.push(format!("Failed to create record: {}", e));
                false
            }
        }
    }

    /// Message the last accepted step handler left for the user
    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn config(&self) -> &FormStepConfig {
        &self.config
    }

    pub fn current_step(&self) -> &StepId {
        self.state
            .current_step()
            .unwrap_or_else(|| self.config.first_step())
    }

    /// Data stored for `step`
    pub fn step_data(&self, step: &StepId) -> StepData {
        self.state.step_data(step)
    }

    pub fn current_step_data(&self) -> StepData {
        self.state.step_data(self.current_step())
    }

    pub fn all_step_data(&self) -> &HashMap<StepId, StepData> {
        self.state.all_step_data()
    }

    /// Every step's data merged in step order, later steps winning
    pub fn combined_data(&self) -> StepData {
        self.state.combined_data(self.config.steps())
    }

    pub fn correlation_id(&self) -> Option<i64> {
        self.state.correlation_id()
    }

    pub fn is_step_completed(&self, step: &StepId) -> bool {
        self.state.is_step_completed(step)
    }

    /// On the last step and that step is completed
    pub fn is_complete(&self) -> bool {
        let current = self.current_step();
        self.config.is_last_step(current) && self.state.is_step_completed(current)
    }

    pub fn errors(&self) -> &FormErrors {
        &self.errors
    }

    /// Whether a submission has been handled by this manager
    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn progress(&self) -> Progress {
        Progress::new(&self.config, self.current_step(), self.state.completed_steps())
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn into_state(self) -> StateStore {
        self.state
    }

    /// Start the wizard over: state cleared, first step current, no errors
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.state.reset()?;
        self.state
            .set_current_step(self.config.first_step().clone());
        self.errors.clear();
        self.notice = None;
        self.processed = false;
        Ok(())
    }

    /// Context handed to step views
    pub fn view_context(&self, step: &StepId) -> ViewContext {
        ViewContext {
            step: step.clone(),
            step_index: self.config.index_of(step).unwrap_or(0),
            total_steps: self.config.total_steps(),
            title: self.config.presentation(step).title,
            data: self.state.step_data(step),
            errors: self.errors.clone(),
            error_messages: self.errors.all(),
            correlation_id: self.state.correlation_id(),
            mode: self.config.mode(),
            is_first: self.config.is_first_step(step),
            is_last: self.config.is_last_step(step),
        }
    }

    /// Render one step's markup through its view
    pub fn render_step(&self, step: &StepId) -> Result<String> {
        match self.config.view(step) {
            Some(view) => view.render(&self.view_context(step)),
            None => Ok(missing_view(step)),
        }
    }

    /// Render the current step with progress bar, errors and navigation
    pub fn render(&self) -> Result<String> {
        let step = self.current_step();
        let content = self.render_step(step)?;

        let mut out = render_progress(&self.progress());
        out.push_str("<div class=\"formstep-content\">\n");
        if let Some(title) = self.config.presentation(step).title {
            out.push_str(&format!(
                "<h3 class=\"formstep-title\">{}</h3>\n",
                handlebars::html_escape(&title)
            ));
        }
        if let Some(notice) = &self.notice {
            out.push_str(&format!(
                "<div class=\"formstep-notice\">{}</div>\n",
                handlebars::html_escape(notice)
            ));
        }
        out.push_str(&render_errors(&self.errors));
        out.push_str(&content);
        out.push_str("\n</div>\n");
        out.push_str(&render_navigation(&self.config, step));
        Ok(out)
    }

    /// Settings a browser-side script needs to drive the wizard
    pub fn client_config(&self) -> serde_json::Value {
        let steps: serde_json::Map<String, serde_json::Value> = self
            .config
            .steps()
            .iter()
            .map(|step| {
                let p = self.config.presentation(step);
                (
                    step.to_string(),
                    json!({
                        "title": p.title.clone().unwrap_or_default(),
                        "next_label": p.next_label(),
                        "prev_label": p.prev_label(),
                        "complete_label": p.complete_label(),
                        "required_save": self.config.is_required_save_step(step),
                    }),
                )
            })
            .collect();

        json!({
            "current_step": self.current_step(),
            "total_steps": self.config.total_steps(),
            "mode": self.config.mode(),
            "allow_navigation": self.config.allow_navigation(),
            "session_prefix": self.config.session_prefix(),
            "steps": steps,
        })
    }
}
