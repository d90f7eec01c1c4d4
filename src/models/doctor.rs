//! Doctor row types and auth payloads.

use crate::models::patient::PatientDetail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Doctor as exposed over the API. Never carries the password hash.
#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub specialty: String,
    pub created_at: DateTime<Utc>,
}

/// Full row including the bcrypt hash; used only by login.
#[derive(Debug, Clone, FromRow)]
pub struct DoctorRecord {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub specialty: String,
    pub created_at: DateTime<Utc>,
}

/// Minimal identity returned alongside a login token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorPublic {
    pub id: i32,
    pub name: String,
    pub email: String,
}

/// Doctor with eagerly loaded patients and their scan collections.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorProfile {
    #[serde(flatten)]
    pub doctor: Doctor,
    pub patients: Vec<PatientDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}
