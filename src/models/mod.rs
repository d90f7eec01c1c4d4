//! Row types and request/response payloads.

pub mod doctor;
pub mod patient;

pub use doctor::{Doctor, DoctorProfile, DoctorPublic, DoctorRecord, LoginRequest, SignupRequest};
pub use patient::{
    AddPatientRequest, AgeField, GradCamScan, MriScan, Patient, PatientDetail, UpdatePatientRequest,
};
