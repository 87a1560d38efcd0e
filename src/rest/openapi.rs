//! OpenAPI specification builder using utoipa.

use utoipa::OpenApi;

use crate::rest::dto::{
    CombinedDataResponse, ErrorsView, FormSummary, HealthResponse, SessionCreated,
    StatusResponse, SubmitRequest, WizardView,
};
use crate::rest::error::ErrorResponse;

/// OpenAPI documentation for the formstep REST API
#[derive(OpenApi)]
#[openapi(
    info(
        title = "formstep API",
        description = "REST API for driving multi-step form wizard sessions.",
        license(name = "MIT")
    ),
    paths(
        // Health endpoints
        crate::rest::routes::health::health,
        crate::rest::routes::health::status,
        // Form endpoints
        crate::rest::routes::forms::list,
        // Session endpoints
        crate::rest::routes::forms::create_session,
        crate::rest::routes::forms::get_session,
        crate::rest::routes::forms::submit,
        crate::rest::routes::forms::submit_form,
        crate::rest::routes::forms::render,
        crate::rest::routes::forms::data,
        crate::rest::routes::forms::reset,
    ),
    components(
        schemas(
            // Response types
            HealthResponse,
            StatusResponse,
            FormSummary,
            SessionCreated,
            WizardView,
            ErrorsView,
            CombinedDataResponse,
            ErrorResponse,
            // Request types
            SubmitRequest,
        )
    ),
    tags(
        (name = "Health", description = "Health check and status endpoints"),
        (name = "Forms", description = "Loaded wizard definitions"),
        (name = "Sessions", description = "Wizard session transitions and rendering"),
    )
)]
pub struct ApiDoc;

impl ApiDoc {
    /// Generate the OpenAPI specification as a JSON string
    pub fn json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }

    /// Generate the OpenAPI specification as a YAML string
    pub fn yaml() -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&Self::openapi())
    }
}
