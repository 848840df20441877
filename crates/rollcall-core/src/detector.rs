//! Face detection and embedding, provided by an external model.

use crate::types::{BoundingBox, Embedding};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("detector unavailable: {0}")]
    Unavailable(String),
    #[error("detector timed out")]
    Timeout,
    #[error("detector returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// One face found in an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub embedding: Embedding,
}

/// Turns an encoded image into zero or more detected faces.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<Vec<DetectedFace>, DetectorError>;
}
