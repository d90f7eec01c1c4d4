//! Object storage client and request-scoped temp files.
//!
//! Uploaded images are spooled to a local temp file, pushed to a
//! Cloudinary-style store over its signed-upload HTTP API, and the temp file is
//! released by an RAII guard on every exit path.

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

use crate::{config::MediaConfig, Error, Result};

/// Seam for the external object store; handlers depend on the trait, not on
/// the Cloudinary implementation.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload a local file, returning its public URL.
    async fn upload_image(&self, path: &Path) -> Result<String>;
}

/// Temp file scoped to one request. The file is removed when the guard drops,
/// covering success, upstream failure, and panic unwinding alike. Removal
/// failure is logged and non-fatal.
pub struct TempFile {
    path: PathBuf,
}

impl TempFile {
    /// Spool uploaded bytes into `dir`, preserving the original extension so
    /// downstream services see a plausible image filename.
    pub async fn create(dir: &Path, original_name: Option<&str>, bytes: &[u8]) -> Result<Self> {
        let extension = original_name
            .and_then(|name| Path::new(name).extension())
            .and_then(|ext| ext.to_str())
            .unwrap_or("bin");
        let path = dir.join(format!("upload-{}.{}", Uuid::new_v4(), extension));

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| Error::Internal(format!("Failed to write temp file: {e}")))?;

        Ok(Self { path })
    }

    /// Take ownership of an existing file (e.g. a heatmap path returned by the
    /// ML server) so it is cleaned up like any other temp file.
    pub fn adopt(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to delete temp file");
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

/// Cloudinary-style signed upload client.
pub struct CloudinaryStorage {
    http: reqwest::Client,
    upload_url: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryStorage {
    pub fn new(config: &MediaConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upload_timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        let upload_url = match &config.upload_base_url {
            Some(base) => format!("{}/image/upload", base.trim_end_matches('/')),
            None => format!(
                "https://api.cloudinary.com/v1_1/{}/image/upload",
                config.cloud_name
            ),
        };

        Ok(Self {
            http,
            upload_url,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }
}

#[async_trait]
impl ObjectStorage for CloudinaryStorage {
    async fn upload_image(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::Internal(format!("Failed to read upload file: {e}")))?;

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin")
            .to_string();

        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string();

        let signature = sign_upload(&[("timestamp", &timestamp)], &self.api_secret);

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .http
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("Object storage upload failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "Object storage upload failed with status {status}: {body}"
            )));
        }

        let payload: UploadResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Invalid object storage response: {e}")))?;

        payload
            .secure_url
            .or(payload.url)
            .ok_or_else(|| Error::Upstream("Object storage response missing URL".to_string()))
    }
}

/// Signature over the sorted parameter string plus the secret, hex-encoded
/// SHA-256 as required by the store's signed-upload API.
fn sign_upload(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted: Vec<&(&str, &str)> = params.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);

    let to_sign: Vec<String> = sorted.iter().map(|(k, v)| format!("{k}={v}")).collect();
    let to_sign = format!("{}{}", to_sign.join("&"), api_secret);

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_sha256_of_sorted_params_and_secret() {
        let signature = sign_upload(&[("timestamp", "1700000000")], "shhh");

        let mut hasher = Sha256::new();
        hasher.update(b"timestamp=1700000000shhh");
        let expected = hex::encode(hasher.finalize());

        assert_eq!(signature, expected);
    }

    #[test]
    fn signature_sorts_parameters_alphabetically() {
        let a = sign_upload(&[("timestamp", "1"), ("public_id", "x")], "s");
        let b = sign_upload(&[("public_id", "x"), ("timestamp", "1")], "s");
        assert_eq!(a, b);

        let mut hasher = Sha256::new();
        hasher.update(b"public_id=x&timestamp=1s");
        assert_eq!(a, hex::encode(hasher.finalize()));
    }

    #[tokio::test]
    async fn temp_file_is_removed_on_drop() {
        let dir = std::env::temp_dir();
        let temp = TempFile::create(&dir, Some("scan.jpg"), b"bytes")
            .await
            .unwrap();
        let path = temp.path().to_path_buf();

        assert!(path.exists());
        assert_eq!(path.extension().and_then(|e| e.to_str()), Some("jpg"));

        drop(temp);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn adopted_file_is_removed_on_drop() {
        let path = std::env::temp_dir().join(format!("heatmap-{}.png", Uuid::new_v4()));
        tokio::fs::write(&path, b"png").await.unwrap();

        drop(TempFile::adopt(path.clone()));
        assert!(!path.exists());
    }
}
