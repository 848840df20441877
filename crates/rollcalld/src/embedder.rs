//! HTTP client for the face embedding service.
//!
//! The service takes raw image bytes on `POST /detect` and answers with
//! `{"faces": [{"box": {...}, "embedding": [...]}]}`.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use rollcall_core::{DetectedFace, DetectorError, FaceDetector};
use serde::Deserialize;
use std::time::Duration;

#[derive(Deserialize)]
struct DetectResponse {
    faces: Vec<DetectedFace>,
}

pub struct HttpDetector {
    client: reqwest::Client,
    detect_url: String,
}

impl HttpDetector {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DetectorError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DetectorError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            detect_url: format!("{}/detect", base_url.trim_end_matches('/')),
        })
    }
}

fn request_error(err: reqwest::Error) -> DetectorError {
    if err.is_timeout() {
        DetectorError::Timeout
    } else {
        DetectorError::Unavailable(err.to_string())
    }
}

#[async_trait]
impl FaceDetector for HttpDetector {
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>, DetectorError> {
        let response = self
            .client
            .post(&self.detect_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectorError::Unavailable(format!(
                "embedder returned HTTP {status}"
            )));
        }

        let body: DetectResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                DetectorError::Timeout
            } else {
                DetectorError::InvalidResponse(e.to_string())
            }
        })?;
        tracing::debug!(faces = body.faces.len(), "embedder responded");
        Ok(body.faces)
    }
}
