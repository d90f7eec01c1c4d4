//! Doctor handlers: signup, login, logout, profile.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension,
};
use serde_json::json;

use crate::{
    api::extract::Json,
    auth::AuthDoctor,
    models::{DoctorPublic, LoginRequest, SignupRequest},
    state::AppState,
    Error, Result,
};

pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Response> {
    let (name, email, password, specialty) = match (
        non_empty(req.name),
        non_empty(req.email),
        non_empty(req.password),
        non_empty(req.specialty),
    ) {
        (Some(name), Some(email), Some(password), Some(specialty)) => {
            (name, email, password, specialty)
        }
        _ => return Err(Error::BadRequest("All fields are required".to_string())),
    };

    // bcrypt is CPU-bound; keep it off the async workers.
    let password_hash = tokio::task::spawn_blocking(move || {
        bcrypt::hash(password, bcrypt::DEFAULT_COST)
    })
    .await
    .map_err(|e| Error::Internal(format!("Hashing task failed: {e}")))?
    .map_err(|e| Error::Internal(format!("Password hashing failed: {e}")))?;

    let doctor = state
        .doctors
        .create(&name, &email, &password_hash, &specialty)
        .await?;

    tracing::info!(doctor_id = doctor.id, "Doctor created");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Doctor created successfully", "doctor": doctor })),
    )
        .into_response())
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Response> {
    let (email, password) = match (non_empty(req.email), non_empty(req.password)) {
        (Some(email), Some(password)) => (email, password),
        _ => return Err(Error::BadRequest("Email and password are required".to_string())),
    };

    let record = state
        .doctors
        .find_by_email(&email)
        .await?
        .ok_or_else(|| Error::NotFound("Doctor not found".to_string()))?;

    let hash = record.password_hash.clone();
    let password_valid = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| Error::Internal(format!("Verification task failed: {e}")))?
        .map_err(|e| Error::Internal(format!("Password verification failed: {e}")))?;

    if !password_valid {
        return Err(Error::Unauthorized("Invalid password".to_string()));
    }

    let token = state.auth.issue_token(record.id)?;
    let cookie = state.auth.auth_cookie(&token)?;

    let user = DoctorPublic {
        id: record.id,
        name: record.name,
        email: record.email,
    };

    let mut response = (
        StatusCode::OK,
        Json(json!({ "message": "Login successful", "token": token, "user": user })),
    )
        .into_response();
    response.headers_mut().insert(header::SET_COOKIE, cookie);

    Ok(response)
}

pub async fn logout(State(state): State<AppState>) -> Result<Response> {
    let mut response = (
        StatusCode::OK,
        Json(json!({ "message": "Logged out successfully" })),
    )
        .into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, state.auth.clear_auth_cookie());

    Ok(response)
}

/// Authenticated doctor plus eagerly loaded patients and scan collections.
pub async fn profile(
    State(state): State<AppState>,
    Extension(doctor): Extension<AuthDoctor>,
) -> Result<Response> {
    let profile = state.doctors.profile(doctor.id).await?;
    Ok((StatusCode::OK, Json(profile)).into_response())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
