use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod auth;
pub mod contact;
pub mod employers;
pub mod freelancers;
pub mod health;

/// Body of the form pages; the markup itself is rendered elsewhere.
#[derive(Debug, Serialize)]
pub struct FormPage {
    pub page: &'static str,
}

pub fn create_router(state: AppState) -> Router<()> {
    let allow_origin = match state.config.cors_allowed_origin.as_ref() {
        Some(origins) => {
            let headers: Vec<HeaderValue> = origins
                .split(',')
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .filter_map(|value| match value.parse::<HeaderValue>() {
                    Ok(header) => Some(header),
                    Err(_) => {
                        tracing::warn!(origin = value, "ignoring invalid CORS allowed origin");
                        None
                    }
                })
                .collect();
            AllowOrigin::list(headers)
        }
        None => AllowOrigin::mirror_request(),
    };

    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(true);

    let account_routes = Router::new()
        .route("/", get(auth::index))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .route(
            "/freelancers/register",
            get(auth::freelancer_register_page).post(auth::freelancer_register),
        )
        .route(
            "/employers/register",
            get(auth::employer_register_page).post(auth::employer_register),
        );

    let employer_routes = Router::new()
        .route("/employers/dashboard", get(employers::dashboard))
        .route(
            "/employer/upload",
            get(employers::upload_page).post(employers::upload_job),
        )
        .route(
            "/employer/job/edit/:id",
            get(employers::edit_page).post(employers::edit_job),
        )
        .route("/employer/job/delete/:id", post(employers::delete_job))
        .route(
            "/employer/job/applications/:id",
            get(employers::job_applications),
        )
        .route("/employer/applications", get(employers::all_applications))
        .route(
            "/download_resume/:application_id",
            get(employers::download_resume),
        );

    let freelancer_routes = Router::new()
        .route("/freelancers/dashboard", get(freelancers::dashboard))
        .route(
            "/job/apply/:id",
            get(freelancers::apply_page).post(freelancers::apply),
        );

    let max_upload_bytes = state.config.max_upload_bytes;

    Router::new()
        .merge(account_routes)
        .merge(employer_routes)
        .merge(freelancer_routes)
        .route("/contact", post(contact::submit))
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}
