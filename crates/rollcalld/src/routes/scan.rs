use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use rollcall_core::AttendanceStore;
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_body;
use crate::error::AppError;
use crate::state::{ActiveScan, AppState};

#[derive(Debug, Deserialize)]
pub struct StartScanRequest {
    pub course_id: i64,
    pub teacher_id: i64,
    pub schedule_id: i64,
}

/// POST /start_scan: check that the teacher owns the session before a
/// client starts streaming frames for it.
pub async fn start_scan(
    State(app): State<AppState>,
    payload: Result<Json<StartScanRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let req = json_body(payload)?;
    let session = app
        .store
        .find_scan_session(req.course_id, req.teacher_id, req.schedule_id)
        .await?;
    if session.is_none() {
        tracing::info!(
            course = req.course_id,
            teacher = req.teacher_id,
            schedule = req.schedule_id,
            "scan refused: no such session for this teacher"
        );
        return Err(AppError::forbidden("invalid course or schedule for this teacher"));
    }

    app.set_active_scan(Some(ActiveScan {
        course_id: req.course_id,
        teacher_id: req.teacher_id,
        schedule_id: req.schedule_id,
    }));
    tracing::info!(course = req.course_id, schedule = req.schedule_id, "scanning started");
    Ok(Json(json!({
        "status": "scanning_started",
        "course_id": req.course_id,
        "schedule_id": req.schedule_id,
    })))
}

/// POST /stop_scan
pub async fn stop_scan(State(app): State<AppState>) -> Json<Value> {
    if let Some(scan) = app.active_scan() {
        tracing::info!(course = scan.course_id, schedule = scan.schedule_id, "scanning stopped");
    }
    app.set_active_scan(None);
    Json(json!({ "status": "scanning_stopped" }))
}

/// GET /test: liveness probe. Also reports the scan in progress, if any.
pub async fn health(State(app): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": app.clock.now().format("%Y-%m-%d %H:%M:%S").to_string(),
        "scanning": app.active_scan(),
    }))
}
