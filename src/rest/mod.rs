//! REST API serving wizard sessions.
//!
//! Browsers post urlencoded forms to `/submit` and get the re-rendered page
//! back; API clients drive the same sessions with JSON.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod dto;
pub mod error;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::ApiState;

/// Default port for the REST API server
pub const DEFAULT_PORT: u16 = 7010;

/// Build the API router with all routes
pub fn build_router(state: ApiState) -> Router {
    let cors_enabled = state.config.server.cors;

    let router = Router::new()
        // Health endpoints
        .route("/api/v1/health", get(routes::health::health))
        .route("/api/v1/status", get(routes::health::status))
        // Form endpoints
        .route("/api/v1/forms", get(routes::forms::list))
        .route(
            "/api/v1/forms/:form_id/sessions",
            post(routes::forms::create_session),
        )
        .route(
            "/api/v1/forms/:form_id/sessions/:session_id",
            get(routes::forms::get_session)
                .post(routes::forms::submit)
                .delete(routes::forms::reset),
        )
        .route(
            "/api/v1/forms/:form_id/sessions/:session_id/submit",
            post(routes::forms::submit_form),
        )
        .route(
            "/api/v1/forms/:form_id/sessions/:session_id/render",
            get(routes::forms::render),
        )
        .route(
            "/api/v1/forms/:form_id/sessions/:session_id/data",
            get(routes::forms::data),
        )
        .layer(TraceLayer::new_for_http());

    let router = if cors_enabled {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    };

    router.with_state(state)
}

/// Start the REST API server; runs until ctrl-c
pub async fn serve(state: ApiState, host: &str, port: u16) -> Result<()> {
    let ip = host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid server host '{}'", host))?;
    let addr = SocketAddr::new(ip, port);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("REST API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down REST API");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::wizard::{LoadedWizard, MemorySessionStore};
    use std::sync::Arc;

    #[test]
    fn test_build_router() {
        let state = ApiState::with_forms(
            Config::default(),
            Vec::<LoadedWizard>::new(),
            Arc::new(MemorySessionStore::new()),
        );
        let _router = build_router(state);
    }

    #[tokio::test]
    async fn test_serve_rejects_bad_host() {
        let state = ApiState::with_forms(
            Config::default(),
            Vec::<LoadedWizard>::new(),
            Arc::new(MemorySessionStore::new()),
        );
        let err = serve(state, "not a host", 0).await.unwrap_err();
        assert!(err.to_string().contains("Invalid server host"));
    }
}
