//! Reqwest-backed [`ObjectDetector`] speaking to an inference sidecar.
//!
//! The pretrained vision model is an external collaborator; the sidecar
//! exposes it over HTTP. The endpoint is configurable so tests can point the
//! client at a local mock server.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

use super::{Detection, DetectorError, ObjectDetector};

/// Wire shape of the sidecar response.
#[derive(Debug, Deserialize)]
struct DetectResponse {
    #[serde(default)]
    detections: Vec<WireDetection>,
}

#[derive(Debug, Deserialize)]
struct WireDetection {
    class_name: String,
    confidence: f64,
}

/// HTTP client for the object-detection sidecar.
#[derive(Debug, Clone)]
pub struct SidecarDetector {
    endpoint: String,
    model: String,
    http: reqwest::Client,
}

impl SidecarDetector {
    pub fn new(endpoint: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ObjectDetector for SidecarDetector {
    async fn detect(&self, image: &Path) -> Result<Vec<Detection>, DetectorError> {
        let bytes = std::fs::read(image).map_err(|source| DetectorError::Io {
            path: image.to_path_buf(),
            source,
        })?;

        let file_name = image
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image.jpg".to_string());
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .part("image", part);

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|err| DetectorError::Network(err.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DetectorError::Http { status, body });
        }

        let parsed: DetectResponse = response
            .json()
            .await
            .map_err(|err| DetectorError::Malformed(err.to_string()))?;

        Ok(parsed
            .detections
            .into_iter()
            .map(|d| Detection {
                class_name: d.class_name,
                confidence: d.confidence,
            })
            .collect())
    }
}
