//! Wizard configuration.
//!
//! A [`FormStepConfig`] is built once, checked for consistency, and never
//! changes afterwards. All misconfiguration surfaces here as a
//! [`ConfigError`]; nothing is deferred to request time.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wizard::handler::{PlaceholderRecordHooks, RecordHooks, StepHandler};
use crate::wizard::render::StepView;
use crate::wizard::rules::FieldRules;
use crate::wizard::step::StepId;
use crate::wizard::validator::StepRules;

pub const DEFAULT_SESSION_PREFIX: &str = "form_step_";

/// Fatal configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("steps cannot be empty")]
    EmptySteps,

    #[error("step '{0}' is listed more than once")]
    DuplicateStep(String),

    #[error("init step '{0}' must be one of the defined steps")]
    InitStepNotInSteps(String),

    #[error("required save step '{0}' must be one of the defined steps")]
    RequiredSaveStepNotInSteps(String),

    #[error("mode must be either \"create\" or \"edit\", got '{0}'")]
    InvalidMode(String),

    #[error("{kind} registered for unknown step '{step}'")]
    UnknownStep { kind: &'static str, step: String },

    #[error("unknown validation rule '{rule}' for field '{field}' on step '{step}'")]
    UnknownRule {
        step: String,
        field: String,
        rule: String,
    },

    #[error("failed to load wizard definition {path}: {message}")]
    Definition { path: String, message: String },
}

/// Whether the wizard creates a new record or edits an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Create,
    Edit,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Create => "create",
            Mode::Edit => "edit",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Mode::Create),
            "edit" => Ok(Mode::Edit),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

/// What to do with rule names the validator does not know
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownRulePolicy {
    #[default]
    Ignore,
    Reject,
}

/// How to read a handler outcome that does not state success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSuccessPolicy {
    #[default]
    TreatAsSuccess,
    TreatAsFailure,
}

/// Ordering of step-data commit relative to the step handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Store the data, then run the handler. A failing handler leaves the
    /// data stored.
    #[default]
    SaveBeforeHandler,
    /// Run the handler first and store the data only if it succeeds
    OnSuccess,
}

/// Permissive defaults, gathered in one place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Strictness {
    #[serde(default)]
    pub unknown_rules: UnknownRulePolicy,
    #[serde(default)]
    pub missing_success: MissingSuccessPolicy,
}

impl Strictness {
    pub const PERMISSIVE: Strictness = Strictness {
        unknown_rules: UnknownRulePolicy::Ignore,
        missing_success: MissingSuccessPolicy::TreatAsSuccess,
    };

    pub const STRICT: Strictness = Strictness {
        unknown_rules: UnknownRulePolicy::Reject,
        missing_success: MissingSuccessPolicy::TreatAsFailure,
    };
}

/// Title and button labels for a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepPresentation {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub next_label: Option<String>,
    #[serde(default)]
    pub prev_label: Option<String>,
    #[serde(default)]
    pub complete_label: Option<String>,
}

impl StepPresentation {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn next_label(&self) -> &str {
        self.next_label.as_deref().unwrap_or("Next")
    }

    pub fn prev_label(&self) -> &str {
        self.prev_label.as_deref().unwrap_or("Previous")
    }

    pub fn complete_label(&self) -> &str {
        self.complete_label.as_deref().unwrap_or("Complete")
    }
}

/// Immutable description of a wizard
#[derive(Clone)]
pub struct FormStepConfig {
    steps: Vec<StepId>,
    init_step: StepId,
    required_save_steps: HashSet<StepId>,
    allow_navigation: bool,
    mode: Mode,
    correlation_id: Option<i64>,
    session_prefix: String,
    handlers: HashMap<StepId, Arc<dyn StepHandler>>,
    rules: HashMap<StepId, StepRules>,
    views: HashMap<StepId, Arc<dyn StepView>>,
    presentation: HashMap<StepId, StepPresentation>,
    record_hooks: Arc<dyn RecordHooks>,
    strictness: Strictness,
    commit_policy: CommitPolicy,
}

impl fmt::Debug for FormStepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormStepConfig")
            .field("steps", &self.steps)
            .field("init_step", &self.init_step)
            .field("required_save_steps", &self.required_save_steps)
            .field("allow_navigation", &self.allow_navigation)
            .field("mode", &self.mode)
            .field("correlation_id", &self.correlation_id)
            .field("session_prefix", &self.session_prefix)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .field("views", &self.views.keys().collect::<Vec<_>>())
            .field("strictness", &self.strictness)
            .field("commit_policy", &self.commit_policy)
            .finish_non_exhaustive()
    }
}

impl FormStepConfig {
    pub fn builder() -> FormStepConfigBuilder {
        FormStepConfigBuilder::default()
    }

    pub fn steps(&self) -> &[StepId] {
        &self.steps
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    pub fn init_step(&self) -> &StepId {
        &self.init_step
    }

    pub fn first_step(&self) -> &StepId {
        &self.steps[0]
    }

    pub fn last_step(&self) -> &StepId {
        &self.steps[self.steps.len() - 1]
    }

    pub fn allow_navigation(&self) -> bool {
        self.allow_navigation
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Correlation id supplied up front (edit mode)
    pub fn correlation_id(&self) -> Option<i64> {
        self.correlation_id
    }

    pub fn session_prefix(&self) -> &str {
        &self.session_prefix
    }

    /// Session key for a form: `session_prefix + form_id`
    pub fn session_key(&self, form_id: &str) -> String {
        format!("{}{}", self.session_prefix, form_id)
    }

    pub fn strictness(&self) -> Strictness {
        self.strictness
    }

    pub fn commit_policy(&self) -> CommitPolicy {
        self.commit_policy
    }

    pub fn record_hooks(&self) -> &Arc<dyn RecordHooks> {
        &self.record_hooks
    }

    pub fn handler(&self, step: &StepId) -> Option<&Arc<dyn StepHandler>> {
        self.handlers.get(step)
    }

    pub fn view(&self, step: &StepId) -> Option<&Arc<dyn StepView>> {
        self.views.get(step)
    }

    /// Parsed validation rules, per step
    pub fn rules(&self) -> &HashMap<StepId, StepRules> {
        &self.rules
    }

    pub fn presentation(&self, step: &StepId) -> StepPresentation {
        self.presentation.get(step).cloned().unwrap_or_default()
    }

    pub fn required_save_steps(&self) -> &HashSet<StepId> {
        &self.required_save_steps
    }

    pub fn is_required_save_step(&self, step: &StepId) -> bool {
        self.required_save_steps.contains(step)
    }

    /// Position of `step` in the sequence
    pub fn index_of(&self, step: &StepId) -> Option<usize> {
        self.steps.iter().position(|s| s == step)
    }

    pub fn contains(&self, step: &StepId) -> bool {
        self.index_of(step).is_some()
    }

    pub fn next_step(&self, step: &StepId) -> Option<&StepId> {
        let index = self.index_of(step)?;
        self.steps.get(index + 1)
    }

    pub fn previous_step(&self, step: &StepId) -> Option<&StepId> {
        let index = self.index_of(step)?;
        index.checked_sub(1).and_then(|i| self.steps.get(i))
    }

    pub fn is_first_step(&self, step: &StepId) -> bool {
        self.index_of(step) == Some(0)
    }

    pub fn is_last_step(&self, step: &StepId) -> bool {
        self.index_of(step) == Some(self.steps.len() - 1)
    }
}

/// Builder for [`FormStepConfig`]
pub struct FormStepConfigBuilder {
    steps: Vec<StepId>,
    total_steps: Option<usize>,
    init_step: Option<StepId>,
    required_save_steps: Vec<StepId>,
    allow_navigation: bool,
    mode: Mode,
    correlation_id: Option<i64>,
    session_prefix: String,
    handlers: Vec<(StepId, Arc<dyn StepHandler>)>,
    rules: Vec<(StepId, Vec<(String, FieldRules)>)>,
    views: Vec<(StepId, Arc<dyn StepView>)>,
    presentation: Vec<(StepId, StepPresentation)>,
    record_hooks: Arc<dyn RecordHooks>,
    strictness: Strictness,
    commit_policy: CommitPolicy,
}

impl Default for FormStepConfigBuilder {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            total_steps: None,
            init_step: None,
            required_save_steps: Vec::new(),
            allow_navigation: true,
            mode: Mode::Create,
            correlation_id: None,
            session_prefix: DEFAULT_SESSION_PREFIX.to_string(),
            handlers: Vec::new(),
            rules: Vec::new(),
            views: Vec::new(),
            presentation: Vec::new(),
            record_hooks: Arc::new(PlaceholderRecordHooks),
            strictness: Strictness::PERMISSIVE,
            commit_policy: CommitPolicy::default(),
        }
    }
}

impl FormStepConfigBuilder {
    pub fn steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        self.steps = steps.into_iter().map(Into::into).collect();
        self
    }

    /// Number the steps `1..=n`. Ignored when explicit steps are given.
    pub fn total_steps(mut self, n: usize) -> Self {
        self.total_steps = Some(n);
        self
    }

    pub fn init_step(mut self, step: impl Into<StepId>) -> Self {
        self.init_step = Some(step.into());
        self
    }

    pub fn required_save_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<StepId>,
    {
        self.required_save_steps = steps.into_iter().map(Into::into).collect();
        self
    }

    pub fn allow_navigation(mut self, allow: bool) -> Self {
        self.allow_navigation = allow;
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn correlation_id(mut self, id: i64) -> Self {
        self.correlation_id = Some(id);
        self
    }

    pub fn session_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.session_prefix = prefix.into();
        self
    }

    pub fn handler(mut self, step: impl Into<StepId>, handler: impl StepHandler + 'static) -> Self {
        self.handlers.push((step.into(), Arc::new(handler)));
        self
    }

    /// Rules for the fields of a step, replacing any earlier call for it
    pub fn rules<I, F, R>(mut self, step: impl Into<StepId>, fields: I) -> Self
    where
        I: IntoIterator<Item = (F, R)>,
        F: Into<String>,
        R: Into<FieldRules>,
    {
        let step = step.into();
        let fields = fields
            .into_iter()
            .map(|(f, r)| (f.into(), r.into()))
            .collect();
        self.rules.retain(|(s, _)| s != &step);
        self.rules.push((step, fields));
        self
    }

    pub fn view(mut self, step: impl Into<StepId>, view: impl StepView + 'static) -> Self {
        self.views.push((step.into(), Arc::new(view)));
        self
    }

    pub fn shared_view(mut self, step: impl Into<StepId>, view: Arc<dyn StepView>) -> Self {
        self.views.push((step.into(), view));
        self
    }

    pub fn title(self, step: impl Into<StepId>, title: impl Into<String>) -> Self {
        self.presentation(step, StepPresentation::titled(title))
    }

    pub fn presentation(mut self, step: impl Into<StepId>, presentation: StepPresentation) -> Self {
        let step = step.into();
        self.presentation.retain(|(s, _)| s != &step);
        self.presentation.push((step, presentation));
        self
    }

    pub fn record_hooks(mut self, hooks: impl RecordHooks + 'static) -> Self {
        self.record_hooks = Arc::new(hooks);
        self
    }

    pub fn strictness(mut self, strictness: Strictness) -> Self {
        self.strictness = strictness;
        self
    }

    pub fn commit_policy(mut self, policy: CommitPolicy) -> Self {
        self.commit_policy = policy;
        self
    }

    /// Check every invariant and produce the config
    pub fn build(self) -> Result<FormStepConfig, ConfigError> {
        let steps = if self.steps.is_empty() {
            (1..=self.total_steps.unwrap_or(0))
                .map(StepId::from)
                .collect()
        } else {
            self.steps
        };

        if steps.is_empty() {
            return Err(ConfigError::EmptySteps);
        }

        let mut seen = HashSet::new();
        for step in &steps {
            if !seen.insert(step) {
                return Err(ConfigError::DuplicateStep(step.to_string()));
            }
        }

        let init_step = self.init_step.unwrap_or_else(|| steps[0].clone());
        if !seen.contains(&init_step) {
            return Err(ConfigError::InitStepNotInSteps(init_step.to_string()));
        }

        for step in &self.required_save_steps {
            if !seen.contains(step) {
                return Err(ConfigError::RequiredSaveStepNotInSteps(step.to_string()));
            }
        }

        let check_known = |kind: &'static str, step: &StepId| {
            if seen.contains(step) {
                Ok(())
            } else {
                Err(ConfigError::UnknownStep {
                    kind,
                    step: step.to_string(),
                })
            }
        };

        let mut handlers = HashMap::new();
        for (step, handler) in self.handlers {
            check_known("handler", &step)?;
            handlers.insert(step, handler);
        }

        let mut views = HashMap::new();
        for (step, view) in self.views {
            check_known("view", &step)?;
            views.insert(step, view);
        }

        let mut presentation = HashMap::new();
        for (step, p) in self.presentation {
            check_known("presentation", &step)?;
            presentation.insert(step, p);
        }

        let mut rules = HashMap::new();
        for (step, fields) in self.rules {
            check_known("validation rules", &step)?;
            let mut compiled = Vec::with_capacity(fields.len());
            for (field, field_rules) in fields {
                let specs =
                    field_rules.parse(step.as_str(), &field, self.strictness.unknown_rules)?;
                compiled.push((field, specs));
            }
            rules.insert(step, compiled);
        }

        let config = FormStepConfig {
            steps,
            init_step,
            required_save_steps: self.required_save_steps.into_iter().collect(),
            allow_navigation: self.allow_navigation,
            mode: self.mode,
            correlation_id: self.correlation_id,
            session_prefix: self.session_prefix,
            handlers,
            rules,
            views,
            presentation,
            record_hooks: self.record_hooks,
            strictness: self.strictness,
            commit_policy: self.commit_policy,
        };

        tracing::debug!(
            steps = config.steps.len(),
            init_step = %config.init_step,
            mode = %config.mode,
            "Wizard config built"
        );

        Ok(config)
    }
}
