//! Typed data-access layer over PostgreSQL.

pub mod chat_sessions;
pub mod doctors;
pub mod patients;

pub use chat_sessions::ChatSessionRepository;
pub use doctors::DoctorRepository;
pub use patients::PatientRepository;
