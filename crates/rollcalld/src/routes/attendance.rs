use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{NaiveDate, NaiveDateTime};
use rollcall_core::{AttendanceRecord, AttendanceStatus, AttendanceStore};
use rollcall_store::codec::parse_timestamp;
use rollcall_store::{CourseReport, ScanEntry};
use serde::Deserialize;
use serde_json::{json, Value};

use super::json_body;
use crate::error::AppError;
use crate::state::AppState;

/// GET /attendance/today: every record scanned today, oldest first.
pub async fn today(State(app): State<AppState>) -> Result<Json<Vec<ScanEntry>>, AppError> {
    let today = app.clock.now().date();
    Ok(Json(app.store.scans_on(today).await?))
}

#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    pub course_id: i64,
    /// `YYYY-MM-DD`; defaults to today.
    pub date: Option<String>,
}

async fn load_report(
    app: &AppState,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> Result<CourseReport, AppError> {
    let Query(query) = query.map_err(|e| AppError::bad_request(e.body_text()))?;
    let day = match query.date.as_deref() {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| AppError::bad_request(format!("invalid date {raw:?}, expected YYYY-MM-DD")))?,
        None => app.clock.now().date(),
    };
    app.store
        .course_report(query.course_id, day)
        .await?
        .ok_or_else(|| AppError::not_found(format!("course {} not found", query.course_id)))
}

/// GET /attendance/report?course_id=&date=
pub async fn report(
    State(app): State<AppState>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> Result<Json<CourseReport>, AppError> {
    Ok(Json(load_report(&app, query).await?))
}

/// GET /attendance/export?course_id=&date=: the course report as a CSV download.
pub async fn export(
    State(app): State<AppState>,
    query: Result<Query<ReportQuery>, QueryRejection>,
) -> Result<Response, AppError> {
    let report = load_report(&app, query).await?;
    let mut body = Vec::new();
    report.write_csv(&mut body)?;

    let filename: String = report
        .course_code
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let disposition = format!("attachment; filename=\"{filename}_{}.csv\"", report.date);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ManualEntry {
    pub identity_id: i64,
    pub schedule_id: i64,
    /// The instructor making the entry; must own the session.
    pub teacher_id: i64,
    /// `YYYY-MM-DD HH:MM:SS` or ISO 8601; defaults to now.
    pub scan_time: Option<String>,
    pub status: AttendanceStatus,
}

fn parse_scan_time(raw: &str) -> Result<NaiveDateTime, AppError> {
    parse_timestamp(raw)
        .ok()
        .or_else(|| raw.parse::<NaiveDateTime>().ok())
        .ok_or_else(|| AppError::bad_request(format!("invalid scan_time {raw:?}")))
}

/// POST /attendance: set a record by hand, bypassing the cooldown.
///
/// Only the instructor who owns the session may write to it.
pub async fn set_attendance(
    State(app): State<AppState>,
    payload: Result<Json<ManualEntry>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let entry = json_body(payload)?;
    let scan_time = match entry.scan_time.as_deref() {
        Some(raw) => parse_scan_time(raw)?,
        None => app.clock.now(),
    };

    let session = app
        .store
        .find_session(entry.schedule_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("schedule {} not found", entry.schedule_id)))?;
    if session.teacher_id != entry.teacher_id {
        return Err(AppError::forbidden(format!(
            "teacher {} does not teach schedule {}",
            entry.teacher_id, entry.schedule_id
        )));
    }
    let name = app
        .store
        .identity_name(entry.identity_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("identity {} not found", entry.identity_id)))?;

    app.store
        .set_attendance(&AttendanceRecord {
            identity_id: entry.identity_id,
            schedule_id: entry.schedule_id,
            scan_time,
            status: entry.status,
        })
        .await?;

    Ok(Json(json!({
        "status": "saved",
        "identity_id": entry.identity_id,
        "name": name,
        "schedule_id": entry.schedule_id,
        "scan_time": scan_time,
        "attendance_status": entry.status,
    })))
}
