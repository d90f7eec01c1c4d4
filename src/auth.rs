//! Doctor authentication.
//!
//! Login issues an HS256 token (subject = doctor id) delivered both in the
//! response body and as an HttpOnly `jwt` cookie. Protected routes accept the
//! cookie or an `Authorization: Bearer` header, verify signature and expiry,
//! and resolve the subject to a doctor row before the handler runs.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::{state::AppState, Error, Result};

pub const AUTH_COOKIE: &str = "jwt";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: usize,
    exp: usize,
}

/// Authenticated caller identity attached to request extensions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthDoctor {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub specialty: String,
}

#[derive(Clone)]
pub struct AuthManager {
    secret: Vec<u8>,
    token_ttl_seconds: u64,
    cookie_secure: bool,
}

impl AuthManager {
    pub fn new(secret: &str, token_ttl_seconds: u64, cookie_secure: bool) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            token_ttl_seconds,
            cookie_secure,
        }
    }

    pub fn issue_token(&self, doctor_id: i32) -> Result<String> {
        let now = now_epoch_seconds();
        let claims = SessionClaims {
            sub: doctor_id.to_string(),
            iat: now,
            exp: now.saturating_add(self.token_ttl_seconds as usize),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| Error::Internal(format!("Failed to sign token: {e}")))
    }

    /// Verify signature and expiry, returning the doctor id from the subject.
    pub fn verify_token(&self, token: &str) -> Result<i32> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data =
            decode::<SessionClaims>(token, &DecodingKey::from_secret(&self.secret), &validation)
                .map_err(|e| Error::Unauthorized(format!("Invalid token: {e}")))?;

        data.claims
            .sub
            .parse::<i32>()
            .map_err(|_| Error::Unauthorized("Invalid token subject".to_string()))
    }

    pub fn auth_cookie(&self, token: &str) -> Result<HeaderValue> {
        let cookie = build_set_cookie(
            AUTH_COOKIE,
            token,
            self.token_ttl_seconds,
            self.cookie_secure,
        );
        HeaderValue::from_str(&cookie)
            .map_err(|e| Error::Internal(format!("Invalid cookie value: {e}")))
    }

    pub fn clear_auth_cookie(&self) -> HeaderValue {
        let cookie = build_clear_cookie(AUTH_COOKIE, self.cookie_secure);
        HeaderValue::from_str(&cookie).unwrap_or_else(|_| HeaderValue::from_static(""))
    }
}

/// Resolve the caller to a doctor and attach the identity to the request.
///
/// One persistence read per protected request.
pub async fn require_doctor(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_token(req.headers())
        .ok_or_else(|| Error::Unauthorized("No token provided".to_string()).into_response())?;

    let doctor_id = state
        .auth
        .verify_token(&token)
        .map_err(IntoResponse::into_response)?;

    let doctor = state
        .doctors
        .find_by_id(doctor_id)
        .await
        .map_err(IntoResponse::into_response)?
        .ok_or_else(|| Error::NotFound("Doctor not found".to_string()).into_response())?;

    req.extensions_mut().insert(AuthDoctor {
        id: doctor.id,
        name: doctor.name,
        email: doctor.email,
        specialty: doctor.specialty,
    });

    Ok(next.run(req).await)
}

/// Bearer token from the `jwt` cookie or the `Authorization` header.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_cookie_value(headers, AUTH_COOKIE) {
        return Some(token);
    }

    let authz = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    authz
        .strip_prefix("Bearer ")
        .or_else(|| authz.strip_prefix("bearer "))
        .map(|t| t.trim().to_string())
}

pub fn extract_cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((k, v)) = part.split_once('=') {
            if k.trim() == name {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}

pub fn build_set_cookie(name: &str, value: &str, max_age_seconds: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        name, value, max_age_seconds
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

pub fn build_clear_cookie(name: &str, secure: bool) -> String {
    let mut cookie = format!("{name}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn now_epoch_seconds() -> usize {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as usize
}
