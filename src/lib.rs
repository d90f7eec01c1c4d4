//! NeuroScan server library.
//!
//! Clinic backend for MRI-based Alzheimer's screening: doctors manage patient
//! records, upload MRI images to object storage, and relay them to an external
//! ML server for risk prediction and Grad-CAM heatmap generation.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{Error, Result};
