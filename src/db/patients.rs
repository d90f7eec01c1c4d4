//! Patient repository.
//!
//! Ownership scoping (which doctor may see a row) lives in the handlers; this
//! layer exposes unscoped primary-key lookups plus doctor-scoped listings, and
//! owns the two transactional invariants: cascade delete and the append-only
//! prediction-score sequence.

use sqlx::{PgPool, Row};

use crate::{
    models::{GradCamScan, MriScan, Patient, PatientDetail},
    Error, Result,
};

const PATIENT_COLUMNS: &str = "id, doctor_id, name, email, age, gender, smoker, \
     alcohol_consumption, neurological_condition, alzheimer_prediction_scores, created_at";

pub struct NewPatient {
    pub name: String,
    pub email: Option<String>,
    pub age: i32,
    pub gender: String,
    pub smoker: bool,
    pub alcohol_consumption: bool,
    pub neurological_condition: bool,
}

#[derive(Clone)]
pub struct PatientRepository {
    pool: PgPool,
}

impl PatientRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, doctor_id: i32, new: NewPatient) -> Result<Patient> {
        let patient = sqlx::query_as::<_, Patient>(&format!(
            "INSERT INTO patients
                 (doctor_id, name, email, age, gender, smoker,
                  alcohol_consumption, neurological_condition)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {PATIENT_COLUMNS}"
        ))
        .bind(doctor_id)
        .bind(&new.name)
        .bind(&new.email)
        .bind(new.age)
        .bind(&new.gender)
        .bind(new.smoker)
        .bind(new.alcohol_consumption)
        .bind(new.neurological_condition)
        .fetch_one(&self.pool)
        .await?;

        Ok(patient)
    }

    pub async fn list_for_doctor(&self, doctor_id: i32) -> Result<Vec<Patient>> {
        let patients = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {PATIENT_COLUMNS}
             FROM patients
             WHERE doctor_id = $1
             ORDER BY id"
        ))
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(patients)
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<Patient>> {
        let patient = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {PATIENT_COLUMNS}
             FROM patients
             WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(patient)
    }

    /// Patient with nested scan collections ordered by creation time, most
    /// recent first.
    pub async fn detail(&self, patient: Patient) -> Result<PatientDetail> {
        let mri_scans = sqlx::query_as::<_, MriScan>(
            "SELECT id, patient_id, image_url, created_at
             FROM mri_scans
             WHERE patient_id = $1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(patient.id)
        .fetch_all(&self.pool)
        .await?;

        let grad_cam_scans = sqlx::query_as::<_, GradCamScan>(
            "SELECT id, patient_id, mri_scan_id, heatmap_url, created_at
             FROM gradcam_scans
             WHERE patient_id = $1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(patient.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(PatientDetail {
            patient,
            mri_scans,
            grad_cam_scans,
        })
    }

    /// Persist a fully merged patient (the handler applies the partial-update
    /// semantics before calling this).
    pub async fn update(&self, patient: &Patient) -> Result<Patient> {
        let updated = sqlx::query_as::<_, Patient>(&format!(
            "UPDATE patients
             SET name = $2, email = $3, age = $4, gender = $5, smoker = $6,
                 alcohol_consumption = $7, neurological_condition = $8
             WHERE id = $1
             RETURNING {PATIENT_COLUMNS}"
        ))
        .bind(patient.id)
        .bind(&patient.name)
        .bind(&patient.email)
        .bind(patient.age)
        .bind(&patient.gender)
        .bind(patient.smoker)
        .bind(patient.alcohol_consumption)
        .bind(patient.neurological_condition)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::NotFound("Patient not found".to_string()))?;

        Ok(updated)
    }

    /// Delete a patient and its dependent scan rows in one transaction.
    ///
    /// The patient row may disappear between the handler's ownership lookup and
    /// this call; that race surfaces as `NotFound`.
    pub async fn delete_cascade(&self, patient_id: i32) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM gradcam_scans WHERE patient_id = $1")
            .bind(patient_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM mri_scans WHERE patient_id = $1")
            .bind(patient_id)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(patient_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(Error::NotFound("Patient not found".to_string()));
        }

        tx.commit().await?;
        Ok(())
    }

    /// Append one prediction score to the patient's sequence.
    ///
    /// Read-then-append-then-write runs inside a transaction with the row
    /// locked, so two concurrent prediction requests each append exactly one
    /// value and neither update is lost.
    pub async fn append_prediction_score(&self, patient_id: i32, score: f64) -> Result<Vec<f64>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT alzheimer_prediction_scores
             FROM patients
             WHERE id = $1
             FOR UPDATE",
        )
        .bind(patient_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound("Patient not found".to_string()))?;

        let mut scores: Vec<f64> = row.get("alzheimer_prediction_scores");
        scores.push(score);

        sqlx::query(
            "UPDATE patients
             SET alzheimer_prediction_scores = $2
             WHERE id = $1",
        )
        .bind(patient_id)
        .bind(&scores)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(scores)
    }

    pub async fn insert_mri_scan(&self, patient_id: i32, image_url: &str) -> Result<MriScan> {
        let scan = sqlx::query_as::<_, MriScan>(
            "INSERT INTO mri_scans (patient_id, image_url)
             VALUES ($1, $2)
             RETURNING id, patient_id, image_url, created_at",
        )
        .bind(patient_id)
        .bind(image_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(scan)
    }

    pub async fn insert_gradcam_scan(
        &self,
        patient_id: i32,
        mri_scan_id: i32,
        heatmap_url: &str,
    ) -> Result<GradCamScan> {
        let scan = sqlx::query_as::<_, GradCamScan>(
            "INSERT INTO gradcam_scans (patient_id, mri_scan_id, heatmap_url)
             VALUES ($1, $2, $3)
             RETURNING id, patient_id, mri_scan_id, heatmap_url, created_at",
        )
        .bind(patient_id)
        .bind(mri_scan_id)
        .bind(heatmap_url)
        .fetch_one(&self.pool)
        .await?;

        Ok(scan)
    }
}
