use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rollcall_core::{DetectorError, StoreError};

/// Sentinel carrying an explicit status and error key through the
/// `anyhow::Error` chain.
#[derive(Debug)]
struct RequestError {
    status: StatusCode,
    key: &'static str,
    message: String,
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for RequestError {}

/// Request-level failure, rendered as `{"error": <key>, "message": <text>}`.
///
/// Per-face problems never come through here; they are reported inline in
/// the frame results.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    fn request(status: StatusCode, key: &'static str, msg: impl Into<String>) -> Self {
        Self(
            RequestError {
                status,
                key,
                message: msg.into(),
            }
            .into(),
        )
    }

    /// 400 for a payload that could not be decoded.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::request(StatusCode::BAD_REQUEST, "bad_request", msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::request(StatusCode::FORBIDDEN, "forbidden", msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::request(StatusCode::NOT_FOUND, "not_found", msg)
    }

    /// 422 for an enrollment image without a usable face.
    pub fn no_face(msg: impl Into<String>) -> Self {
        Self::request(StatusCode::UNPROCESSABLE_ENTITY, "no_face", msg)
    }

    fn parts(&self) -> (StatusCode, &'static str) {
        if let Some(r) = self.0.downcast_ref::<RequestError>() {
            return (r.status, r.key);
        }
        if let Some(e) = self.0.downcast_ref::<DetectorError>() {
            return match e {
                DetectorError::Timeout => (StatusCode::BAD_GATEWAY, "detector_timeout"),
                DetectorError::Unavailable(_) | DetectorError::InvalidResponse(_) => {
                    (StatusCode::BAD_GATEWAY, "detector_error")
                }
            };
        }
        if let Some(e) = self.0.downcast_ref::<StoreError>() {
            return match e {
                StoreError::Timeout => (StatusCode::SERVICE_UNAVAILABLE, "store_timeout"),
                StoreError::Backend(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_error"),
                StoreError::Corrupt(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_corrupt"),
            };
        }
        (StatusCode::INTERNAL_SERVER_ERROR, "internal")
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, key) = self.parts();
        if status.is_server_error() {
            tracing::error!(error = %self.0, key, "request failed");
        } else {
            tracing::debug!(error = %self.0, key, "request rejected");
        }
        let body = serde_json::json!({ "error": key, "message": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
