//! Outbound-service clients and request-scoped resources.

pub mod inference;
pub mod media;

pub use inference::InferenceClient;
pub use media::{CloudinaryStorage, ObjectStorage, TempFile};
