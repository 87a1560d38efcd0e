//! Data Transfer Objects for the REST API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::wizard::definition::LoadedWizard;
use crate::wizard::{FormErrors, FormStepManager, StepData};

// =============================================================================
// Form DTOs
// =============================================================================

/// Summary of a loaded wizard definition
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct FormSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub steps: Vec<String>,
    pub mode: String,
    pub allow_navigation: bool,
    pub required_save_steps: Vec<String>,
}

impl From<&LoadedWizard> for FormSummary {
    fn from(wizard: &LoadedWizard) -> Self {
        let config = &wizard.config;
        let mut required: Vec<String> = config
            .required_save_steps()
            .iter()
            .map(ToString::to_string)
            .collect();
        required.sort_by_key(|s| {
            config
                .steps()
                .iter()
                .position(|step| step.as_str() == s)
                .unwrap_or(usize::MAX)
        });

        Self {
            id: wizard.id.clone(),
            description: wizard.description.clone(),
            steps: config.steps().iter().map(ToString::to_string).collect(),
            mode: config.mode().to_string(),
            allow_navigation: config.allow_navigation(),
            required_save_steps: required,
        }
    }
}

// =============================================================================
// Session DTOs
// =============================================================================

/// Response for a newly created wizard session
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionCreated {
    pub form_id: String,
    pub session_id: String,
    pub current_step: String,
}

/// JSON submission for the current step
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct SubmitRequest {
    /// next, prev, save, goto or complete (default next)
    #[serde(default)]
    pub action: Option<String>,
    /// Target step for goto
    #[serde(default)]
    pub target_step: Option<String>,
    /// Field values for the current step
    #[serde(default)]
    #[schema(value_type = Object)]
    pub data: StepData,
}

/// Errors attached to a wizard view
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct ErrorsView {
    /// Validation messages per field
    pub fields: BTreeMap<String, Vec<String>>,
    /// Handler and navigation messages
    pub messages: Vec<String>,
}

impl From<&FormErrors> for ErrorsView {
    fn from(errors: &FormErrors) -> Self {
        Self {
            fields: errors.fields.clone(),
            messages: errors.messages.clone(),
        }
    }
}

/// State of a wizard session as seen by a client
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WizardView {
    pub form_id: String,
    pub session_id: String,
    pub current_step: String,
    /// One-based position of the current step
    pub position: usize,
    pub total_steps: usize,
    pub percentage: u8,
    pub completed_steps: Vec<String>,
    pub is_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<i64>,
    /// Whether the submission went through; absent when nothing was submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub errors: ErrorsView,
    /// Message from the step handler that accepted the submission
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    /// Stored data for the current step
    #[schema(value_type = Object)]
    pub data: StepData,
}

impl WizardView {
    pub fn new(form_id: &str, session_id: &str, manager: &FormStepManager) -> Self {
        let progress = manager.progress();
        Self {
            form_id: form_id.to_string(),
            session_id: session_id.to_string(),
            current_step: manager.current_step().to_string(),
            position: progress.position(),
            total_steps: progress.total_steps,
            percentage: progress.percentage(),
            completed_steps: progress.completed,
            is_complete: manager.is_complete(),
            correlation_id: manager.correlation_id(),
            success: manager
                .is_processed()
                .then(|| manager.errors().is_empty()),
            errors: ErrorsView::from(manager.errors()),
            notice: manager.notice().map(str::to_string),
            data: manager.current_step_data(),
        }
    }
}

/// All step data merged in step order
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CombinedDataResponse {
    pub form_id: String,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<i64>,
    pub is_complete: bool,
    #[schema(value_type = Object)]
    pub data: StepData,
}

// =============================================================================
// Health DTOs
// =============================================================================

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Status response with registry info
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    pub form_count: usize,
    pub session_backend: String,
    /// Sessions with a request in flight or queued
    pub active_sessions: usize,
}
