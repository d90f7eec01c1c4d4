//! HTTP API: router assembly and cross-cutting middleware.

pub mod extract;
pub mod handlers;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth, state::AppState};

/// Wire URL paths and methods to handlers and apply cross-cutting layers.
pub fn create_router(state: AppState) -> Router {
    let doctor_routes = Router::new()
        .route("/signup", post(handlers::doctors::signup))
        .route("/login", post(handlers::doctors::login))
        .route("/logout", post(handlers::doctors::logout))
        .route(
            "/profile",
            get(handlers::doctors::profile)
                .route_layer(from_fn_with_state(state.clone(), auth::require_doctor)),
        );

    let patient_routes = Router::new()
        .route("/", post(handlers::patients::add_patient))
        .route("/", get(handlers::patients::get_all_patients))
        .route("/:id", get(handlers::patients::get_patient_by_id))
        .route("/:id", put(handlers::patients::update_patient))
        .route("/:id", delete(handlers::patients::delete_patient))
        .route("/:id/prediction", post(handlers::patients::prediction))
        .route("/:id/gradcam", post(handlers::patients::gradcam))
        .route_layer(from_fn_with_state(state.clone(), auth::require_doctor));

    let chatbot_routes = Router::new()
        .route("/upload", post(handlers::chatbot::upload))
        .route("/query", post(handlers::chatbot::query));

    Router::new()
        .route("/health", get(health))
        .nest("/api/doctors", doctor_routes)
        .nest("/api/patients", patient_routes)
        .nest("/chatbot", chatbot_routes)
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(cors_layer(&state))
        .layer(DefaultBodyLimit::max(state.config.server.max_request_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// CORS restricted to the configured origins; credentials allowed because the
/// auth token travels in a cookie.
fn cors_layer(state: &AppState) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}
