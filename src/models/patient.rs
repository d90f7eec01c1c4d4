//! Patient row types, scan artifacts, and the partial-update merge semantics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: i32,
    pub doctor_id: i32,
    pub name: String,
    pub email: Option<String>,
    pub age: i32,
    pub gender: String,
    pub smoker: bool,
    pub alcohol_consumption: bool,
    pub neurological_condition: bool,
    pub alzheimer_prediction_scores: Vec<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MriScan {
    pub id: i32,
    pub patient_id: i32,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GradCamScan {
    pub id: i32,
    pub patient_id: i32,
    pub mri_scan_id: i32,
    pub heatmap_url: String,
    pub created_at: DateTime<Utc>,
}

/// Patient with nested scan collections, most recent first.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDetail {
    #[serde(flatten)]
    pub patient: Patient,
    pub mri_scans: Vec<MriScan>,
    pub grad_cam_scans: Vec<GradCamScan>,
}

/// Age arrives from clients as either a number or a numeric string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AgeField {
    Number(i64),
    Text(String),
}

impl AgeField {
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            AgeField::Number(n) => i32::try_from(*n).ok(),
            AgeField::Text(s) => s.trim().parse::<i32>().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddPatientRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub age: Option<AgeField>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub smoker: Option<bool>,
    #[serde(default)]
    pub alcohol_consumption: Option<bool>,
    #[serde(default)]
    pub neurological_condition: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePatientRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub age: Option<AgeField>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub smoker: Option<bool>,
    #[serde(default)]
    pub alcohol_consumption: Option<bool>,
    #[serde(default)]
    pub neurological_condition: Option<bool>,
}

impl UpdatePatientRequest {
    /// Merge-style partial update: a replacement value is applied only if
    /// truthy (non-empty string, positive age, `true` flag); otherwise the
    /// stored value is retained exactly.
    pub fn merge_into(&self, current: &Patient) -> Patient {
        let mut merged = current.clone();

        if let Some(name) = truthy_string(&self.name) {
            merged.name = name;
        }
        if let Some(email) = truthy_string(&self.email) {
            merged.email = Some(email);
        }
        if let Some(age) = self.age.as_ref().and_then(AgeField::as_i32) {
            if age > 0 {
                merged.age = age;
            }
        }
        if let Some(gender) = truthy_string(&self.gender) {
            merged.gender = gender;
        }
        if self.smoker == Some(true) {
            merged.smoker = true;
        }
        if self.alcohol_consumption == Some(true) {
            merged.alcohol_consumption = true;
        }
        if self.neurological_condition == Some(true) {
            merged.neurological_condition = true;
        }

        merged
    }
}

fn truthy_string(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.to_string())
}
