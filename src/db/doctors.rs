//! Doctor repository.

use sqlx::PgPool;
use std::collections::HashMap;

use crate::{
    error::map_unique_violation,
    models::{
        Doctor, DoctorProfile, DoctorRecord, GradCamScan, MriScan, Patient, PatientDetail,
    },
    Error, Result,
};

#[derive(Clone)]
pub struct DoctorRepository {
    pool: PgPool,
}

impl DoctorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new doctor. A duplicate email surfaces as `Conflict`.
    pub async fn create(
        &self,
        name: &str,
        email: &str,
        password_hash: &str,
        specialty: &str,
    ) -> Result<Doctor> {
        let doctor = sqlx::query_as::<_, Doctor>(
            "INSERT INTO doctors (name, email, password_hash, specialty)
             VALUES ($1, $2, $3, $4)
             RETURNING id, name, email, specialty, created_at",
        )
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(specialty)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Email already exists"))?;

        Ok(doctor)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<DoctorRecord>> {
        let record = sqlx::query_as::<_, DoctorRecord>(
            "SELECT id, name, email, password_hash, specialty, created_at
             FROM doctors
             WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn find_by_id(&self, id: i32) -> Result<Option<Doctor>> {
        let doctor = sqlx::query_as::<_, Doctor>(
            "SELECT id, name, email, specialty, created_at
             FROM doctors
             WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(doctor)
    }

    /// Doctor with eagerly loaded patients and their scan collections,
    /// scans ordered most recent first.
    pub async fn profile(&self, doctor_id: i32) -> Result<DoctorProfile> {
        let doctor = self
            .find_by_id(doctor_id)
            .await?
            .ok_or_else(|| Error::NotFound("Doctor not found".to_string()))?;

        let patients = sqlx::query_as::<_, Patient>(
            "SELECT id, doctor_id, name, email, age, gender, smoker,
                    alcohol_consumption, neurological_condition,
                    alzheimer_prediction_scores, created_at
             FROM patients
             WHERE doctor_id = $1
             ORDER BY id",
        )
        .bind(doctor_id)
        .fetch_all(&self.pool)
        .await?;

        let patient_ids: Vec<i32> = patients.iter().map(|p| p.id).collect();

        let mri_scans = sqlx::query_as::<_, MriScan>(
            "SELECT id, patient_id, image_url, created_at
             FROM mri_scans
             WHERE patient_id = ANY($1)
             ORDER BY created_at DESC, id DESC",
        )
        .bind(&patient_ids)
        .fetch_all(&self.pool)
        .await?;

        let gradcam_scans = sqlx::query_as::<_, GradCamScan>(
            "SELECT id, patient_id, mri_scan_id, heatmap_url, created_at
             FROM gradcam_scans
             WHERE patient_id = ANY($1)
             ORDER BY created_at DESC, id DESC",
        )
        .bind(&patient_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut mri_by_patient: HashMap<i32, Vec<MriScan>> = HashMap::new();
        for scan in mri_scans {
            mri_by_patient.entry(scan.patient_id).or_default().push(scan);
        }
        let mut gradcam_by_patient: HashMap<i32, Vec<GradCamScan>> = HashMap::new();
        for scan in gradcam_scans {
            gradcam_by_patient
                .entry(scan.patient_id)
                .or_default()
                .push(scan);
        }

        let patients = patients
            .into_iter()
            .map(|patient| {
                let mri_scans = mri_by_patient.remove(&patient.id).unwrap_or_default();
                let grad_cam_scans = gradcam_by_patient.remove(&patient.id).unwrap_or_default();
                PatientDetail {
                    patient,
                    mri_scans,
                    grad_cam_scans,
                }
            })
            .collect();

        Ok(DoctorProfile { doctor, patients })
    }
}
