use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use rollcall_core::FaceResult;
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use super::{decode_frame, json_body};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FrameRequest {
    pub frame: String,
    pub course_id: i64,
    pub schedule_id: i64,
}

#[derive(Debug, Serialize)]
pub struct FrameResponse {
    pub results: Vec<FaceResult>,
}

/// POST /process_frame: detect every face in the frame and record attendance
/// for the requested session.
pub async fn process_frame(
    State(app): State<AppState>,
    payload: Result<Json<FrameRequest>, JsonRejection>,
) -> Result<Json<FrameResponse>, AppError> {
    let req = json_body(payload)?;
    let frame_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "frame",
        %frame_id,
        course = req.course_id,
        schedule = req.schedule_id
    );

    async move {
        let image = decode_frame(&req.frame)?;
        let faces = app.detector.detect(&image).await?;
        let now = app.clock.now();
        let results = app
            .processor
            .process_frame(&faces, req.course_id, req.schedule_id, now)
            .await;
        tracing::info!(faces = results.len(), "frame processed");
        Ok::<_, AppError>(Json(FrameResponse { results }))
    }
    .instrument(span)
    .await
}
