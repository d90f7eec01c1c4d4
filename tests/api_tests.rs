#![allow(unused)]
//! Integration tests exercising the router end to end.
//!
//! Covers the request paths that resolve without a live database: health,
//! authentication gating, input validation, and cookie handling. Persistence
//! semantics are covered in `db_tests.rs`.

mod support;

use axum::http::{header, Method, StatusCode};
use serde_json::json;
use support::{assert_status, error_message, TestApp};

#[tokio::test]
async fn health_returns_ok() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, body) = app.request(Method::GET, "/health", &[], None).await?;

    assert_status(status, StatusCode::OK, "GET /health");
    let body: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn responses_carry_security_headers() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (_, headers, _) = app.request(Method::GET, "/health", &[], None).await?;

    assert_eq!(
        headers
            .get("x-content-type-options")
            .and_then(|v| v.to_str().ok()),
        Some("nosniff")
    );
    assert_eq!(
        headers.get("x-frame-options").and_then(|v| v.to_str().ok()),
        Some("DENY")
    );
    Ok(())
}

#[tokio::test]
async fn patients_without_token_is_unauthorized() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, body) = app.request(Method::GET, "/api/patients", &[], None).await?;

    assert_status(status, StatusCode::UNAUTHORIZED, "GET /api/patients");
    assert_eq!(error_message(&body), "No token provided");
    Ok(())
}

#[tokio::test]
async fn profile_with_garbage_token_is_unauthorized() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, body) = app
        .request(
            Method::GET,
            "/api/doctors/profile",
            &[(header::COOKIE, "jwt=not-a-real-token")],
            None,
        )
        .await?;

    assert_status(status, StatusCode::UNAUTHORIZED, "GET /api/doctors/profile");
    assert!(error_message(&body).starts_with("Invalid token"));
    Ok(())
}

#[tokio::test]
async fn bearer_header_is_accepted_as_token_source() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    // A malformed bearer token must still reach verification (401), not be
    // treated as a missing token.
    let (status, _, body) = app
        .request(
            Method::GET,
            "/api/patients",
            &[(header::AUTHORIZATION, "Bearer not-a-real-token")],
            None,
        )
        .await?;

    assert_status(status, StatusCode::UNAUTHORIZED, "GET /api/patients");
    assert!(error_message(&body).starts_with("Invalid token"));
    Ok(())
}

#[tokio::test]
async fn signup_with_missing_fields_is_bad_request() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, body) = app
        .post_json(
            "/api/doctors/signup",
            json!({ "name": "Dr. Apt", "email": "apt@example.com" }),
            &[],
        )
        .await?;

    assert_status(status, StatusCode::BAD_REQUEST, "POST /api/doctors/signup");
    assert_eq!(error_message(&body), "All fields are required");
    Ok(())
}

#[tokio::test]
async fn signup_with_blank_fields_is_bad_request() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, body) = app
        .post_json(
            "/api/doctors/signup",
            json!({ "name": "", "email": "", "password": "", "specialty": "" }),
            &[],
        )
        .await?;

    assert_status(status, StatusCode::BAD_REQUEST, "POST /api/doctors/signup");
    assert_eq!(error_message(&body), "All fields are required");
    Ok(())
}

#[tokio::test]
async fn malformed_json_body_is_bad_request_with_error_shape() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, body) = app
        .request(
            Method::POST,
            "/api/doctors/login",
            &[(header::CONTENT_TYPE, "application/json")],
            Some(axum::body::Body::from(r#"{"email": "#)),
        )
        .await?;

    assert_status(status, StatusCode::BAD_REQUEST, "malformed login body");
    let body: serde_json::Value = serde_json::from_slice(&body)?;
    assert!(
        body["error"].as_str().is_some_and(|e| !e.is_empty()),
        "expected an error body, got {body}"
    );
    Ok(())
}

#[tokio::test]
async fn non_json_query_body_is_bad_request_with_error_shape() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, body) = app
        .request(
            Method::POST,
            "/chatbot/query",
            &[(header::CONTENT_TYPE, "text/plain")],
            Some(axum::body::Body::from("hello")),
        )
        .await?;

    assert_status(status, StatusCode::BAD_REQUEST, "non-JSON query body");
    assert!(!error_message(&body).is_empty());
    Ok(())
}

#[tokio::test]
async fn login_without_password_is_bad_request() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, body) = app
        .post_json(
            "/api/doctors/login",
            json!({ "email": "apt@example.com" }),
            &[],
        )
        .await?;

    assert_status(status, StatusCode::BAD_REQUEST, "POST /api/doctors/login");
    assert_eq!(error_message(&body), "Email and password are required");
    Ok(())
}

#[tokio::test]
async fn logout_clears_auth_cookie() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, headers, _) = app
        .request(Method::POST, "/api/doctors/logout", &[], None)
        .await?;

    assert_status(status, StatusCode::OK, "POST /api/doctors/logout");
    let cookie = headers
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(cookie.starts_with("jwt=;"), "unexpected cookie: {cookie}");
    assert!(cookie.contains("Max-Age=0"), "unexpected cookie: {cookie}");
    Ok(())
}

#[tokio::test]
async fn chatbot_query_without_text_is_bad_request() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, body) = app.post_json("/chatbot/query", json!({}), &[]).await?;

    assert_status(status, StatusCode::BAD_REQUEST, "POST /chatbot/query");
    assert_eq!(error_message(&body), "Text is required");
    Ok(())
}

#[tokio::test]
async fn chatbot_query_without_session_is_bad_request() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, body) = app
        .post_json("/chatbot/query", json!({ "text": "what does this show?" }), &[])
        .await?;

    assert_status(status, StatusCode::BAD_REQUEST, "POST /chatbot/query");
    assert_eq!(
        error_message(&body),
        "No image associated with this session. Please upload an image first."
    );
    Ok(())
}

#[tokio::test]
async fn unknown_route_is_not_found() -> anyhow::Result<()> {
    let app = TestApp::new()?;

    let (status, _, _) = app
        .request(Method::GET, "/api/unknown", &[], None)
        .await?;

    assert_status(status, StatusCode::NOT_FOUND, "GET /api/unknown");
    Ok(())
}
