//! Client for the external ML inference server.
//!
//! Three JSON endpoints: `/predict` (Alzheimer's risk from an MRI URL),
//! `/process` (Grad-CAM heatmap generation, returns a local file path), and
//! `/analyze` (vision chatbot). Calls carry an explicit timeout and a bounded
//! retry on connect/timeout failures.

use serde_json::{json, Value as JsonValue};
use std::time::Duration;

use crate::{config::InferenceConfig, Error, Result};

pub struct InferenceClient {
    http: reqwest::Client,
    base_url: String,
    retry_attempts: u32,
}

impl InferenceClient {
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry_attempts: config.retry_attempts,
        })
    }

    /// Forward an MRI URL for Alzheimer's-risk prediction; returns the raw
    /// payload so the handler can relay it verbatim.
    pub async fn predict(&self, image_url: &str) -> Result<JsonValue> {
        self.post_json("/predict", &json!({ "imageUrl": image_url }))
            .await
    }

    /// Ask the Grad-CAM endpoint to process an MRI URL; returns the local path
    /// of the generated heatmap image.
    pub async fn gradcam(&self, image_url: &str) -> Result<String> {
        let payload = self
            .post_json("/process", &json!({ "imageUrl": image_url }))
            .await?;

        payload
            .get("heatmapPath")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Upstream("Heatmap generation returned no path".to_string()))
    }

    /// Forward a prompt (and image URL) to the vision chatbot endpoint.
    pub async fn analyze(&self, prompt: &str, image_url: &str) -> Result<JsonValue> {
        self.post_json(
            "/analyze",
            &json!({ "prompt": prompt, "image_url": image_url }),
        )
        .await
    }

    async fn post_json(&self, endpoint: &str, body: &JsonValue) -> Result<JsonValue> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut attempt = 0u32;

        let response = loop {
            match self.http.post(&url).json(body).send().await {
                Ok(response) => break response,
                Err(e) if attempt < self.retry_attempts && is_retryable(&e) => {
                    attempt += 1;
                    tracing::warn!(
                        endpoint,
                        attempt,
                        error = %e,
                        "Inference call failed, retrying"
                    );
                }
                Err(e) => {
                    return Err(Error::Upstream(format!(
                        "Inference call to {endpoint} failed: {e}"
                    )))
                }
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!(
                "Inference call to {endpoint} failed with status {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("Invalid inference response: {e}")))
    }
}

fn is_retryable(e: &reqwest::Error) -> bool {
    e.is_connect() || e.is_timeout()
}

/// Pull the Alzheimer's probability out of a prediction payload, if present.
///
/// The ML server omits the field when it classifies the image as Non-MRI; in
/// that case nothing is appended to the patient's score sequence.
pub fn extract_probability(payload: &JsonValue) -> Option<f64> {
    payload.get("alzheimer_probability").and_then(|v| v.as_f64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_extracted_from_prediction_payload() {
        let payload = json!({ "prediction": "MRI", "alzheimer_probability": 73.2 });
        assert_eq!(extract_probability(&payload), Some(73.2));
    }

    #[test]
    fn non_mri_payload_has_no_probability() {
        let payload = json!({ "prediction": "Non-MRI" });
        assert_eq!(extract_probability(&payload), None);

        let payload = json!({ "alzheimer_probability": "high" });
        assert_eq!(extract_probability(&payload), None);
    }
}
