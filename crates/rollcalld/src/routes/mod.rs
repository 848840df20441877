pub mod attendance;
pub mod frames;
pub mod identities;
pub mod scan;

use crate::error::AppError;
use axum::extract::rejection::JsonRejection;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// Unwrap a JSON body, turning extractor rejections into a 400 `bad_request`.
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| AppError::bad_request(e.body_text()))
}

/// Decode a base64 image, accepting a bare payload or a `data:` URL.
pub(crate) fn decode_frame(frame: &str) -> Result<Vec<u8>, AppError> {
    let encoded = match frame.strip_prefix("data:") {
        Some(url) => {
            let (_, data) = url
                .split_once(',')
                .ok_or_else(|| AppError::bad_request("data URL has no payload"))?;
            data
        }
        None => frame,
    };
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| AppError::bad_request(format!("frame is not valid base64: {e}")))?;
    if bytes.is_empty() {
        return Err(AppError::bad_request("frame is empty"));
    }
    Ok(bytes)
}
