//! Wizard form and session endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Html,
    Form, Json,
};
use handlebars::html_escape;
use uuid::Uuid;

use crate::rest::dto::{CombinedDataResponse, FormSummary, SessionCreated, SubmitRequest, WizardView};
use crate::rest::error::ApiError;
use crate::rest::state::{ApiState, SessionGuard};
use crate::wizard::{FormAction, FormRequest, FormStepManager, StateStore, StepId};

/// Session ids are uuids, normalized to their hyphenated form
fn parse_session_id(raw: &str) -> Result<String, ApiError> {
    Uuid::parse_str(raw)
        .map(|id| id.to_string())
        .map_err(|_| ApiError::BadRequest(format!("Invalid session id '{}'", raw)))
}

/// Lock the session and build its manager. The guard must outlive every use
/// of the manager.
async fn open_session(
    state: &ApiState,
    form_id: &str,
    session_id: &str,
) -> Result<(SessionGuard, FormStepManager), ApiError> {
    let config = Arc::clone(&state.form(form_id)?.config);
    let guard = state.lock_session(session_id, form_id).await?;

    let store = StateStore::load(
        Arc::clone(&state.store),
        session_id,
        config.session_key(form_id),
    )?;
    let manager = FormStepManager::new(config, store)?;
    Ok((guard, manager))
}

impl TryFrom<SubmitRequest> for FormRequest {
    type Error = ApiError;

    fn try_from(req: SubmitRequest) -> Result<Self, Self::Error> {
        let action = match req.action.as_deref() {
            Some(action) => action.parse::<FormAction>()?,
            None => FormAction::default(),
        };
        Ok(FormRequest {
            action,
            target_step: req
                .target_step
                .filter(|s| !s.trim().is_empty())
                .map(|s| StepId::from(s.trim())),
            data: req.data,
        })
    }
}

/// Full HTML page for the current step
fn render_page(form_id: &str, session_id: &str, manager: &FormStepManager) -> Result<String, ApiError> {
    let body = manager.render()?;
    let client_config = serde_json::to_string(&manager.client_config())?.replace("</", "<\\/");
    let notice = if manager.is_complete() {
        "<p class=\"formstep-complete\">Form completed.</p>\n"
    } else {
        ""
    };

    Ok(format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n{notice}<form method=\"post\" action=\"/api/v1/forms/{form}/sessions/{session}/submit\" class=\"formstep-form\">\n{body}</form>\n<script type=\"application/json\" id=\"formstep-config\">{client_config}</script>\n</body>\n</html>\n",
        title = html_escape(form_id),
        form = html_escape(form_id),
        session = html_escape(session_id),
    ))
}

/// List loaded forms
#[utoipa::path(
    get,
    path = "/api/v1/forms",
    tag = "Forms",
    responses(
        (status = 200, description = "Loaded wizard definitions", body = Vec<FormSummary>)
    )
)]
pub async fn list(State(state): State<ApiState>) -> Json<Vec<FormSummary>> {
    Json(state.forms.values().map(FormSummary::from).collect())
}

/// Start a new wizard session
#[utoipa::path(
    post,
    path = "/api/v1/forms/{form_id}/sessions",
    tag = "Sessions",
    params(("form_id" = String, Path, description = "Form id")),
    responses(
        (status = 201, description = "Session created", body = SessionCreated),
        (status = 404, description = "Form not found", body = crate::rest::error::ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<ApiState>,
    Path(form_id): Path<String>,
) -> Result<(StatusCode, Json<SessionCreated>), ApiError> {
    let session_id = Uuid::new_v4().to_string();
    let (_guard, manager) = open_session(&state, &form_id, &session_id).await?;
    manager.state().save()?;

    tracing::info!(form = %form_id, session = %session_id, "Wizard session created");

    Ok((
        StatusCode::CREATED,
        Json(SessionCreated {
            current_step: manager.current_step().to_string(),
            form_id,
            session_id,
        }),
    ))
}

/// Current state of a wizard session
#[utoipa::path(
    get,
    path = "/api/v1/forms/{form_id}/sessions/{session_id}",
    tag = "Sessions",
    params(
        ("form_id" = String, Path, description = "Form id"),
        ("session_id" = String, Path, description = "Session id (uuid)")
    ),
    responses(
        (status = 200, description = "Wizard state", body = WizardView),
        (status = 400, description = "Invalid session id", body = crate::rest::error::ErrorResponse),
        (status = 404, description = "Form not found", body = crate::rest::error::ErrorResponse)
    )
)]
pub async fn get_session(
    State(state): State<ApiState>,
    Path((form_id, session_id)): Path<(String, String)>,
) -> Result<Json<WizardView>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let (_guard, manager) = open_session(&state, &form_id, &session_id).await?;
    Ok(Json(WizardView::new(&form_id, &session_id, &manager)))
}

/// Submit the current step as JSON
#[utoipa::path(
    post,
    path = "/api/v1/forms/{form_id}/sessions/{session_id}",
    tag = "Sessions",
    params(
        ("form_id" = String, Path, description = "Form id"),
        ("session_id" = String, Path, description = "Session id (uuid)")
    ),
    request_body = SubmitRequest,
    responses(
        (status = 200, description = "Submission processed; check success and errors", body = WizardView),
        (status = 400, description = "Malformed submission", body = crate::rest::error::ErrorResponse),
        (status = 404, description = "Form not found", body = crate::rest::error::ErrorResponse)
    )
)]
pub async fn submit(
    State(state): State<ApiState>,
    Path((form_id, session_id)): Path<(String, String)>,
    Json(req): Json<SubmitRequest>,
) -> Result<Json<WizardView>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let request = FormRequest::try_from(req)?;
    let (_guard, mut manager) = open_session(&state, &form_id, &session_id).await?;

    manager.process(request)?;
    Ok(Json(WizardView::new(&form_id, &session_id, &manager)))
}

/// Submit the current step from a browser form
#[utoipa::path(
    post,
    path = "/api/v1/forms/{form_id}/sessions/{session_id}/submit",
    tag = "Sessions",
    params(
        ("form_id" = String, Path, description = "Form id"),
        ("session_id" = String, Path, description = "Session id (uuid)")
    ),
    request_body(content = String, content_type = "application/x-www-form-urlencoded", description = "Step fields plus action and target_step"),
    responses(
        (status = 200, description = "Re-rendered wizard page", body = String, content_type = "text/html"),
        (status = 400, description = "Malformed submission", body = crate::rest::error::ErrorResponse),
        (status = 404, description = "Form not found", body = crate::rest::error::ErrorResponse)
    )
)]
pub async fn submit_form(
    State(state): State<ApiState>,
    Path((form_id, session_id)): Path<(String, String)>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Html<String>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let request = FormRequest::from_fields(fields)?;
    let (_guard, mut manager) = open_session(&state, &form_id, &session_id).await?;

    manager.process(request)?;
    Ok(Html(render_page(&form_id, &session_id, &manager)?))
}

/// Render the current step as an HTML page
#[utoipa::path(
    get,
    path = "/api/v1/forms/{form_id}/sessions/{session_id}/render",
    tag = "Sessions",
    params(
        ("form_id" = String, Path, description = "Form id"),
        ("session_id" = String, Path, description = "Session id (uuid)")
    ),
    responses(
        (status = 200, description = "Wizard page", body = String, content_type = "text/html"),
        (status = 404, description = "Form not found", body = crate::rest::error::ErrorResponse)
    )
)]
pub async fn render(
    State(state): State<ApiState>,
    Path((form_id, session_id)): Path<(String, String)>,
) -> Result<Html<String>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let (_guard, manager) = open_session(&state, &form_id, &session_id).await?;
    Ok(Html(render_page(&form_id, &session_id, &manager)?))
}

/// All collected data, merged in step order
#[utoipa::path(
    get,
    path = "/api/v1/forms/{form_id}/sessions/{session_id}/data",
    tag = "Sessions",
    params(
        ("form_id" = String, Path, description = "Form id"),
        ("session_id" = String, Path, description = "Session id (uuid)")
    ),
    responses(
        (status = 200, description = "Combined step data", body = CombinedDataResponse),
        (status = 404, description = "Form not found", body = crate::rest::error::ErrorResponse)
    )
)]
pub async fn data(
    State(state): State<ApiState>,
    Path((form_id, session_id)): Path<(String, String)>,
) -> Result<Json<CombinedDataResponse>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let (_guard, manager) = open_session(&state, &form_id, &session_id).await?;

    Ok(Json(CombinedDataResponse {
        correlation_id: manager.correlation_id(),
        is_complete: manager.is_complete(),
        data: manager.combined_data(),
        form_id,
        session_id,
    }))
}

/// Reset a wizard session to its first step
#[utoipa::path(
    delete,
    path = "/api/v1/forms/{form_id}/sessions/{session_id}",
    tag = "Sessions",
    params(
        ("form_id" = String, Path, description = "Form id"),
        ("session_id" = String, Path, description = "Session id (uuid)")
    ),
    responses(
        (status = 200, description = "Wizard reset", body = WizardView),
        (status = 404, description = "Form not found", body = crate::rest::error::ErrorResponse)
    )
)]
pub async fn reset(
    State(state): State<ApiState>,
    Path((form_id, session_id)): Path<(String, String)>,
) -> Result<Json<WizardView>, ApiError> {
    let session_id = parse_session_id(&session_id)?;
    let (_guard, mut manager) = open_session(&state, &form_id, &session_id).await?;
    manager.reset()?;

    tracing::info!(form = %form_id, session = %session_id, "Wizard session reset");
    Ok(Json(WizardView::new(&form_id, &session_id, &manager)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::wizard::definition::LoadedWizard;
    use crate::wizard::{step_data, FormStepConfig, MemorySessionStore, ViewContext};
    use std::path::PathBuf;

    fn test_state() -> ApiState {
        let config = FormStepConfig::builder()
            .steps([1, 2])
            .rules(1, [("email", "required|email")])
            .view(1, |ctx: &ViewContext| {
                Ok::<_, anyhow::Error>(format!("<input name=\"email\" data-step=\"{}\">", ctx.step))
            })
            .build()
            .unwrap();
        let wizard = LoadedWizard {
            id: "signup".to_string(),
            description: Some("Signup".to_string()),
            source: PathBuf::from("signup.yaml"),
            config: Arc::new(config),
        };
        ApiState::with_forms(
            Config::default(),
            vec![wizard],
            Arc::new(MemorySessionStore::new()),
        )
    }

    fn session_path(session_id: &str) -> Path<(String, String)> {
        Path(("signup".to_string(), session_id.to_string()))
    }

    #[tokio::test]
    async fn test_list() {
        let resp = list(State(test_state())).await;
        assert_eq!(resp.len(), 1);
        assert_eq!(resp[0].id, "signup");
    }

    #[tokio::test]
    async fn test_create_session_unknown_form() {
        let result = create_session(State(test_state()), Path("nope".to_string())).await;
        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_submit_flow() {
        let state = test_state();
        let (status, created) = create_session(State(state.clone()), Path("signup".to_string()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.current_step, "1");

        let bad = submit(
            State(state.clone()),
            session_path(&created.session_id),
            Json(SubmitRequest {
                data: step_data([("email", "not-an-email")]),
                ..SubmitRequest::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(bad.success, Some(false));
        assert_eq!(bad.current_step, "1");
        assert!(bad.errors.fields.contains_key("email"));

        let good = submit(
            State(state.clone()),
            session_path(&created.session_id),
            Json(SubmitRequest {
                data: step_data([("email", "ada@example.com")]),
                ..SubmitRequest::default()
            }),
        )
        .await
        .unwrap();
        assert_eq!(good.success, Some(true));
        assert_eq!(good.current_step, "2");
        assert_eq!(good.completed_steps, vec!["1"]);

        let combined = data(State(state), session_path(&created.session_id))
            .await
            .unwrap();
        assert_eq!(combined.data["email"].as_text(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn test_unknown_action_is_bad_request() {
        let state = test_state();
        let session_id = Uuid::new_v4().to_string();
        let result = submit(
            State(state),
            session_path(&session_id),
            Json(SubmitRequest {
                action: Some("jump".to_string()),
                ..SubmitRequest::default()
            }),
        )
        .await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_invalid_session_id() {
        let result = get_session(State(test_state()), session_path("../etc")).await;
        assert!(matches!(result, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_browser_submit_renders_page() {
        let state = test_state();
        let session_id = Uuid::new_v4().to_string();
        let Html(page) = submit_form(
            State(state),
            session_path(&session_id),
            Form(vec![
                ("action".to_string(), "next".to_string()),
                ("csrf_token".to_string(), "abc".to_string()),
                ("email".to_string(), String::new()),
            ]),
        )
        .await
        .unwrap();

        assert!(page.contains("<form method=\"post\""));
        assert!(page.contains("The email field is required."));
        assert!(page.contains("data-step=\"1\""));
        assert!(page.contains("id=\"formstep-config\""));
    }

    #[tokio::test]
    async fn test_reset() {
        let state = test_state();
        let session_id = Uuid::new_v4().to_string();
        submit(
            State(state.clone()),
            session_path(&session_id),
            Json(SubmitRequest {
                data: step_data([("email", "ada@example.com")]),
                ..SubmitRequest::default()
            }),
        )
        .await
        .unwrap();

        let view = reset(State(state.clone()), session_path(&session_id)).await.unwrap();
        assert_eq!(view.current_step, "1");
        assert!(view.completed_steps.is_empty());
        assert!(view.success.is_none());
        assert_eq!(state.active_sessions(), 0);
    }
}
