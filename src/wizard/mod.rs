//! Multi-step form wizard.
//!
//! A wizard is an ordered list of steps. Each submission moves one session's
//! [`FormStepManager`] through a transition (next, prev, save, goto,
//! complete). The submitted data is validated, stored per step in the
//! session, and handed to an optional [`StepHandler`].
//!
//! Wizard state lives behind a [`SessionStore`]. Managers assume a single
//! writer per session: two concurrent requests for the same session and form
//! race, and the last save wins. Callers that serve concurrent requests must
//! serialize them per session (the REST layer does).

pub mod config;
pub mod definition;
pub mod errors;
pub mod handler;
pub mod manager;
pub mod render;
pub mod request;
pub mod rules;
pub mod state;
pub mod step;
pub mod store;
pub mod validator;

pub use config::{
    CommitPolicy, ConfigError, FormStepConfig, FormStepConfigBuilder, MissingSuccessPolicy, Mode,
    StepPresentation, Strictness, UnknownRulePolicy, DEFAULT_SESSION_PREFIX,
};
pub use definition::{load_definition, load_definitions, LoadedWizard, ViewSpec, WizardDefinition};
pub use errors::FormErrors;
pub use handler::{PlaceholderRecordHooks, RecordHooks, StepHandler, StepOutcome};
pub use manager::FormStepManager;
pub use render::{Progress, StepView, TemplateView, ViewContext};
pub use request::{step_data, FieldValue, FileRef, FormAction, FormRequest, RequestError, StepData};
pub use rules::{FieldRules, Rule, RuleDescriptor, RuleSpec};
pub use state::{StateStore, WizardState};
pub use step::StepId;
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoreError};
pub use validator::{ValidationErrors, Validator};
