#![allow(unused)]
//! Integration tests for the persistence semantics: unique-email conflicts,
//! ownership scoping, cascade delete, the atomic score append, merge updates,
//! and chat-session expiry.
//!
//! These run against a live PostgreSQL database and skip when neither
//! `TEST_DATABASE_URL` nor `DATABASE_URL` is set.

mod support;

use axum::http::{header, HeaderMap, Method, StatusCode};
use neuroscan::db::{ChatSessionRepository, PatientRepository};
use serde_json::json;
use support::{
    assert_status, bearer, create_doctor, create_patient, error_message, unique_email, TestApp,
};
use uuid::Uuid;

#[tokio::test]
async fn duplicate_email_signup_is_conflict() -> anyhow::Result<()> {
    let Some(app) = TestApp::with_database().await? else {
        return Ok(());
    };

    let email = unique_email("dup");
    let body = json!({
        "name": "Dr. First",
        "email": email,
        "password": "pw-one",
        "specialty": "neurology",
    });

    let (status, _, _) = app.post_json("/api/doctors/signup", body.clone(), &[]).await?;
    assert_status(status, StatusCode::CREATED, "first signup");

    let (status, _, resp) = app.post_json("/api/doctors/signup", body, &[]).await?;
    assert_status(status, StatusCode::CONFLICT, "duplicate signup");
    assert_eq!(error_message(&resp), "Email already exists");
    Ok(())
}

#[tokio::test]
async fn patients_are_scoped_to_their_doctor() -> anyhow::Result<()> {
    let Some(app) = TestApp::with_database().await? else {
        return Ok(());
    };

    let (_, token_a) = create_doctor(&app, &unique_email("owner")).await?;
    let (_, token_b) = create_doctor(&app, &unique_email("other")).await?;
    let patient_id = create_patient(&app, &token_a, "Scoped Patient").await?;

    let authz_b = bearer(&token_b);
    let headers_b = [(header::AUTHORIZATION, authz_b.as_str())];
    let uri = format!("/api/patients/{patient_id}");

    // Another doctor's reads, updates, and deletes are all forbidden.
    let (status, _, body) = app.request(Method::GET, &uri, &headers_b, None).await?;
    assert_status(status, StatusCode::FORBIDDEN, "cross-doctor read");
    assert_eq!(error_message(&body), "Patient belongs to a different doctor");

    let (status, _, _) = put_patient(&app, &authz_b, &uri, json!({ "name": "Hijacked" })).await?;
    assert_status(status, StatusCode::FORBIDDEN, "cross-doctor update");

    let (status, _, _) = app.request(Method::DELETE, &uri, &headers_b, None).await?;
    assert_status(status, StatusCode::FORBIDDEN, "cross-doctor delete");

    // The other doctor's listing never includes the patient.
    let (status, _, body) = app
        .request(Method::GET, "/api/patients", &headers_b, None)
        .await?;
    assert_status(status, StatusCode::OK, "other doctor's list");
    let body: serde_json::Value = serde_json::from_slice(&body)?;
    let listed = body["patients"]
        .as_array()
        .map(|p| p.iter().any(|p| p["id"] == json!(patient_id)))
        .unwrap_or(false);
    assert!(!listed, "patient leaked into another doctor's list");

    // A nonexistent id is plain not-found, for the owner too.
    let authz_a = bearer(&token_a);
    let (status, _, body) = app
        .request(
            Method::GET,
            "/api/patients/2147000000",
            &[(header::AUTHORIZATION, authz_a.as_str())],
            None,
        )
        .await?;
    assert_status(status, StatusCode::NOT_FOUND, "nonexistent patient");
    assert_eq!(error_message(&body), "Patient not found");
    Ok(())
}

#[tokio::test]
async fn delete_removes_dependent_scan_rows() -> anyhow::Result<()> {
    let Some(app) = TestApp::with_database().await? else {
        return Ok(());
    };

    let (_, token) = create_doctor(&app, &unique_email("cascade")).await?;
    let patient_id = create_patient(&app, &token, "Cascade Patient").await?;

    let patients = PatientRepository::new(app.pool.clone());
    let mri = patients
        .insert_mri_scan(patient_id, "https://cdn.example.com/mri.png")
        .await?;
    patients
        .insert_gradcam_scan(patient_id, mri.id, "https://cdn.example.com/heatmap.png")
        .await?;

    let authz = bearer(&token);
    let headers = [(header::AUTHORIZATION, authz.as_str())];
    let uri = format!("/api/patients/{patient_id}");

    let (status, _, _) = app.request(Method::DELETE, &uri, &headers, None).await?;
    assert_status(status, StatusCode::OK, "delete patient");

    let (status, _, _) = app.request(Method::GET, &uri, &headers, None).await?;
    assert_status(status, StatusCode::NOT_FOUND, "read after delete");

    let mri_left: i64 =
        sqlx::query_scalar("SELECT count(*) FROM mri_scans WHERE patient_id = $1")
            .bind(patient_id)
            .fetch_one(&app.pool)
            .await?;
    let gradcam_left: i64 =
        sqlx::query_scalar("SELECT count(*) FROM gradcam_scans WHERE patient_id = $1")
            .bind(patient_id)
            .fetch_one(&app.pool)
            .await?;
    assert_eq!(mri_left, 0, "mri_scans rows survived the cascade");
    assert_eq!(gradcam_left, 0, "gradcam_scans rows survived the cascade");
    Ok(())
}

#[tokio::test]
async fn concurrent_score_appends_are_all_kept() -> anyhow::Result<()> {
    let Some(app) = TestApp::with_database().await? else {
        return Ok(());
    };

    let (_, token) = create_doctor(&app, &unique_email("append")).await?;
    let patient_id = create_patient(&app, &token, "Append Patient").await?;

    let patients = PatientRepository::new(app.pool.clone());
    let mut tasks = Vec::new();
    for i in 0..8 {
        let repo = PatientRepository::new(app.pool.clone());
        tasks.push(tokio::spawn(async move {
            repo.append_prediction_score(patient_id, f64::from(i)).await
        }));
    }
    for task in tasks {
        task.await??;
    }

    let patient = patients
        .find_by_id(patient_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("patient disappeared"))?;
    let mut scores = patient.alzheimer_prediction_scores;
    scores.sort_by(|a, b| a.total_cmp(b));
    assert_eq!(scores, (0..8).map(f64::from).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn update_applies_only_truthy_fields() -> anyhow::Result<()> {
    let Some(app) = TestApp::with_database().await? else {
        return Ok(());
    };

    let (_, token) = create_doctor(&app, &unique_email("merge")).await?;
    let patient_id = create_patient(&app, &token, "Merge Patient").await?;

    let authz = bearer(&token);
    let uri = format!("/api/patients/{patient_id}");

    // Falsy replacements leave the stored values untouched.
    let (status, _, body) = put_patient(
        &app,
        &authz,
        &uri,
        json!({ "name": "", "age": 0, "smoker": false, "alcoholConsumption": false }),
    )
    .await?;
    assert_status(status, StatusCode::OK, "falsy update");
    let body: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(body["patient"]["name"], "Merge Patient");
    assert_eq!(body["patient"]["age"], 62);
    assert_eq!(body["patient"]["alcoholConsumption"], true);

    // Truthy replacements land exactly.
    let (status, _, body) = put_patient(
        &app,
        &authz,
        &uri,
        json!({ "name": "Renamed", "age": "63", "smoker": true }),
    )
    .await?;
    assert_status(status, StatusCode::OK, "truthy update");
    let body: serde_json::Value = serde_json::from_slice(&body)?;
    assert_eq!(body["patient"]["name"], "Renamed");
    assert_eq!(body["patient"]["age"], 63);
    assert_eq!(body["patient"]["smoker"], true);
    assert_eq!(body["patient"]["gender"], "female");
    Ok(())
}

#[tokio::test]
async fn idle_chat_sessions_expire_and_get_pruned() -> anyhow::Result<()> {
    let Some(app) = TestApp::with_database().await? else {
        return Ok(());
    };

    let sessions = ChatSessionRepository::new(app.pool.clone());
    let ttl = 24 * 60 * 60;

    let session_id = Uuid::new_v4();
    sessions
        .set_image_url(session_id, "https://cdn.example.com/chat.png")
        .await?;
    assert!(sessions.find_active(session_id, ttl).await?.is_some());

    // Age the row past the TTL.
    sqlx::query("UPDATE chat_sessions SET updated_at = now() - interval '2 days' WHERE id = $1")
        .bind(session_id)
        .execute(&app.pool)
        .await?;

    assert!(
        sessions.find_active(session_id, ttl).await?.is_none(),
        "expired session still resolved"
    );

    // A follow-up query against the expired session is a fresh-session error.
    let cookie = format!("chat_session={session_id}");
    let (status, _, body) = app
        .post_json(
            "/chatbot/query",
            json!({ "text": "what does this show?" }),
            &[(header::COOKIE, cookie.as_str())],
        )
        .await?;
    assert_status(status, StatusCode::BAD_REQUEST, "query with expired session");
    assert_eq!(
        error_message(&body),
        "No image associated with this session. Please upload an image first."
    );

    assert!(sessions.prune_expired(ttl).await? >= 1);
    let left: i64 = sqlx::query_scalar("SELECT count(*) FROM chat_sessions WHERE id = $1")
        .bind(session_id)
        .fetch_one(&app.pool)
        .await?;
    assert_eq!(left, 0, "expired session row survived the prune");
    Ok(())
}

async fn put_patient(
    app: &TestApp,
    authz: &str,
    uri: &str,
    payload: serde_json::Value,
) -> anyhow::Result<(StatusCode, HeaderMap, Vec<u8>)> {
    app.request(
        Method::PUT,
        uri,
        &[
            (header::AUTHORIZATION, authz),
            (header::CONTENT_TYPE, "application/json"),
        ],
        Some(axum::body::Body::from(serde_json::to_vec(&payload)?)),
    )
    .await
}
