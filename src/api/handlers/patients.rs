//! Patient handlers: CRUD plus the prediction and Grad-CAM pipelines.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension,
};
use serde_json::json;
use std::path::Path as FsPath;

use crate::{
    api::extract::Json,
    auth::AuthDoctor,
    db::patients::NewPatient,
    models::{AddPatientRequest, AgeField, Patient, UpdatePatientRequest},
    services::{inference::extract_probability, TempFile},
    state::AppState,
    Error, Result,
};

pub async fn add_patient(
    State(state): State<AppState>,
    Extension(doctor): Extension<AuthDoctor>,
    Json(req): Json<AddPatientRequest>,
) -> Result<Response> {
    let age = req.age.as_ref().and_then(AgeField::as_i32);

    let new = match (
        req.name.filter(|n| !n.trim().is_empty()),
        req.gender.filter(|g| !g.trim().is_empty()),
        age,
        req.smoker,
        req.alcohol_consumption,
        req.neurological_condition,
    ) {
        (Some(name), Some(gender), Some(age), Some(smoker), Some(alcohol), Some(neuro)) => {
            NewPatient {
                name,
                email: req.email.filter(|e| !e.trim().is_empty()),
                age,
                gender,
                smoker,
                alcohol_consumption: alcohol,
                neurological_condition: neuro,
            }
        }
        _ => return Err(Error::BadRequest("All fields are required".to_string())),
    };

    let patient = state.patients.insert(doctor.id, new).await?;
    tracing::info!(patient_id = patient.id, doctor_id = doctor.id, "Patient added");

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Patient added successfully", "patient": patient })),
    )
        .into_response())
}

pub async fn get_all_patients(
    State(state): State<AppState>,
    Extension(doctor): Extension<AuthDoctor>,
) -> Result<Response> {
    let patients = state.patients.list_for_doctor(doctor.id).await?;
    Ok((StatusCode::OK, Json(json!({ "patients": patients }))).into_response())
}

pub async fn get_patient_by_id(
    State(state): State<AppState>,
    Extension(doctor): Extension<AuthDoctor>,
    Path(id): Path<i32>,
) -> Result<Response> {
    let patient = find_owned_patient(&state, &doctor, id).await?;
    let detail = state.patients.detail(patient).await?;

    Ok((StatusCode::OK, Json(json!({ "patient": detail }))).into_response())
}

pub async fn update_patient(
    State(state): State<AppState>,
    Extension(doctor): Extension<AuthDoctor>,
    Path(id): Path<i32>,
    Json(req): Json<UpdatePatientRequest>,
) -> Result<Response> {
    let current = find_owned_patient(&state, &doctor, id).await?;
    let merged = req.merge_into(&current);
    let updated = state.patients.update(&merged).await?;

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Patient details updated successfully", "patient": updated })),
    )
        .into_response())
}

pub async fn delete_patient(
    State(state): State<AppState>,
    Extension(doctor): Extension<AuthDoctor>,
    Path(id): Path<i32>,
) -> Result<Response> {
    let patient = find_owned_patient(&state, &doctor, id).await?;
    state.patients.delete_cascade(patient.id).await?;

    tracing::info!(patient_id = id, doctor_id = doctor.id, "Patient removed");

    Ok((
        StatusCode::OK,
        Json(json!({ "message": "Patient removed successfully" })),
    )
        .into_response())
}

/// Upload an MRI, relay it to the prediction endpoint, and append the returned
/// probability to the patient's score sequence.
pub async fn prediction(
    State(state): State<AppState>,
    Extension(doctor): Extension<AuthDoctor>,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> Result<Response> {
    let patient = find_owned_patient(&state, &doctor, id).await?;

    let upload = read_file_field(multipart, &["file"]).await?;
    let temp = TempFile::create(
        FsPath::new(&state.config.media.temp_dir),
        upload.file_name.as_deref(),
        &upload.bytes,
    )
    .await?;

    let image_url = state.storage.upload_image(temp.path()).await?;
    drop(temp);

    let scan = state.patients.insert_mri_scan(patient.id, &image_url).await?;

    let prediction = state.inference.predict(&image_url).await?;

    if let Some(probability) = extract_probability(&prediction) {
        state
            .patients
            .append_prediction_score(patient.id, probability)
            .await?;
    } else {
        tracing::warn!(
            patient_id = patient.id,
            mri_scan_id = scan.id,
            "Prediction payload carried no probability; nothing appended"
        );
    }

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": "File uploaded and processed successfully",
            "cloudinaryUrl": image_url,
            "prediction": prediction,
        })),
    )
        .into_response())
}

/// Upload an MRI, have the ML server generate a Grad-CAM heatmap, store both
/// images, and link the resulting scan rows.
///
/// A mid-pipeline failure leaves the already-persisted MRI row in place; temp
/// files are still released by their guards.
pub async fn gradcam(
    State(state): State<AppState>,
    Extension(doctor): Extension<AuthDoctor>,
    Path(id): Path<i32>,
    multipart: Multipart,
) -> Result<Response> {
    let patient = find_owned_patient(&state, &doctor, id).await?;

    let upload = read_file_field(multipart, &["mri", "file"]).await?;
    let temp = TempFile::create(
        FsPath::new(&state.config.media.temp_dir),
        upload.file_name.as_deref(),
        &upload.bytes,
    )
    .await?;

    let mri_url = state.storage.upload_image(temp.path()).await?;
    drop(temp);

    let mri_scan = state.patients.insert_mri_scan(patient.id, &mri_url).await?;

    let heatmap_path = state.inference.gradcam(&mri_url).await?;
    let heatmap_temp = TempFile::adopt(heatmap_path.into());

    let heatmap_url = state.storage.upload_image(heatmap_temp.path()).await?;
    drop(heatmap_temp);

    let gradcam_scan = state
        .patients
        .insert_gradcam_scan(patient.id, mri_scan.id, &heatmap_url)
        .await?;

    tracing::info!(
        patient_id = patient.id,
        mri_scan_id = mri_scan.id,
        gradcam_scan_id = gradcam_scan.id,
        "Grad-CAM pipeline complete"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Heatmap generated successfully",
            "mriUrl": mri_url,
            "heatmapUrl": heatmap_url,
        })),
    )
        .into_response())
}

/// Fetch a patient and enforce ownership: nonexistent ids are `NotFound`,
/// another doctor's patients are `Forbidden`.
async fn find_owned_patient(
    state: &AppState,
    doctor: &AuthDoctor,
    patient_id: i32,
) -> Result<Patient> {
    let patient = state
        .patients
        .find_by_id(patient_id)
        .await?
        .ok_or_else(|| Error::NotFound("Patient not found".to_string()))?;

    if patient.doctor_id != doctor.id {
        return Err(Error::Forbidden(
            "Patient belongs to a different doctor".to_string(),
        ));
    }

    Ok(patient)
}

pub(crate) struct FileUpload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// Pull the first matching file field out of a multipart body.
pub(crate) async fn read_file_field(
    mut multipart: Multipart,
    field_names: &[&str],
) -> Result<FileUpload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if !field_names.contains(&name.as_str()) {
            continue;
        }

        let file_name = field.file_name().map(|s| s.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Error::BadRequest(format!("Failed to read upload: {e}")))?;

        if bytes.is_empty() {
            return Err(Error::BadRequest("No file provided".to_string()));
        }

        return Ok(FileUpload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    Err(Error::BadRequest("No file provided".to_string()))
}
