//! Chatbot proxy handlers.
//!
//! `upload` takes an image plus a prompt, stores the image, remembers its URL
//! in a per-conversation session row, and relays the analysis. `query` answers
//! text-only follow-ups against the session's stored image.

use axum::{
    extract::{Multipart, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::path::Path as FsPath;
use uuid::Uuid;

use crate::{
    api::extract::Json,
    auth::{build_set_cookie, extract_cookie_value},
    services::TempFile,
    state::AppState,
    Error, Result,
};

pub const SESSION_COOKIE: &str = "chat_session";

// Conversations are short-lived; a day is plenty. Enforced both as the cookie
// Max-Age and server-side against the session row's updated_at.
pub const SESSION_TTL_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub text: Option<String>,
}

pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut file: Option<(Option<String>, Vec<u8>)> = None;
    let mut text: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::BadRequest(format!("Failed to read upload: {e}")))?;
                if !bytes.is_empty() {
                    file = Some((file_name, bytes.to_vec()));
                }
            }
            "text" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::BadRequest(format!("Failed to read text field: {e}")))?;
                if !value.trim().is_empty() {
                    text = Some(value);
                }
            }
            _ => {}
        }
    }

    let ((file_name, bytes), text) = match (file, text) {
        (Some(file), Some(text)) => (file, text),
        _ => {
            return Err(Error::BadRequest(
                "Please provide both a file and text".to_string(),
            ))
        }
    };

    let temp = TempFile::create(
        FsPath::new(&state.config.media.temp_dir),
        file_name.as_deref(),
        &bytes,
    )
    .await?;

    let image_url = state.storage.upload_image(temp.path()).await?;
    drop(temp);

    // Expired conversations are dead weight; sweep them on the write path.
    let pruned = state.chat_sessions.prune_expired(SESSION_TTL_SECONDS).await?;
    if pruned > 0 {
        tracing::debug!(pruned, "Expired chat sessions removed");
    }

    let session_id = session_id_from_headers(&headers).unwrap_or_else(Uuid::new_v4);
    state.chat_sessions.set_image_url(session_id, &image_url).await?;

    let analysis = state.inference.analyze(&text, &image_url).await?;

    let cookie = build_set_cookie(
        SESSION_COOKIE,
        &session_id.to_string(),
        SESSION_TTL_SECONDS,
        state.config.auth.cookie_secure,
    );

    let mut response = (
        StatusCode::OK,
        Json(json!({
            "message": "File uploaded and analyzed successfully",
            "analysisResult": analysis.get("response").cloned().unwrap_or(analysis),
        })),
    )
        .into_response();

    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }

    Ok(response)
}

/// Text-only follow-up answered against the image previously uploaded in this
/// session.
pub async fn query(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<QueryRequest>,
) -> Result<Response> {
    let text = req
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| Error::BadRequest("Text is required".to_string()))?;

    let session_id = session_id_from_headers(&headers).ok_or_else(no_session_error)?;

    let session = state
        .chat_sessions
        .find_active(session_id, SESSION_TTL_SECONDS)
        .await?
        .ok_or_else(no_session_error)?;

    let image_url = session.image_url.ok_or_else(no_session_error)?;

    let analysis = state.inference.analyze(&text, &image_url).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "Text query analyzed successfully",
            "analysisResult": analysis.get("response").cloned().unwrap_or(analysis),
        })),
    )
        .into_response())
}

fn session_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    extract_cookie_value(headers, SESSION_COOKIE)
        .and_then(|value| Uuid::parse_str(&value).ok())
}

fn no_session_error() -> Error {
    Error::BadRequest(
        "No image associated with this session. Please upload an image first.".to_string(),
    )
}
