use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use rollcall_core::{Identity, EMBEDDING_DIM};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{decode_frame, json_body};
use crate::error::AppError;
use crate::state::AppState;

/// POST /reload_faces: re-read the identity roster from the database.
///
/// On failure the previous roster stays in place.
pub async fn reload_faces(State(app): State<AppState>) -> Result<Json<Value>, AppError> {
    let count = app.processor.roster().reload(&*app.store).await?;
    Ok(Json(json!({ "status": "reloaded", "count": count })))
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub id: i64,
    pub name: String,
    pub frame: String,
}

/// POST /identities: enroll (or re-enroll) an identity from a photo.
///
/// Uses the first detected face and reloads the roster so the identity is
/// recognizable on the next frame.
pub async fn enroll_identity(
    State(app): State<AppState>,
    payload: Result<Json<EnrollRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let req = json_body(payload)?;
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }

    let image = decode_frame(&req.frame)?;
    let faces = app.detector.detect(&image).await?;
    if faces.len() > 1 {
        tracing::warn!(id = req.id, faces = faces.len(), "several faces in enrollment photo, using the first");
    }
    let face = faces
        .into_iter()
        .next()
        .ok_or_else(|| AppError::no_face("no face found in the enrollment photo"))?;
    if face.embedding.len() != EMBEDDING_DIM {
        return Err(AppError::no_face(format!(
            "embedder returned a {}-dim embedding, expected {EMBEDDING_DIM}",
            face.embedding.len()
        )));
    }
    if !face.embedding.is_finite() {
        return Err(AppError::no_face("embedder returned a non-finite embedding"));
    }

    app.store
        .upsert_identity(&Identity {
            id: req.id,
            name: name.to_string(),
            embedding: face.embedding,
        })
        .await?;
    let count = app.processor.roster().reload(&*app.store).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "enrolled", "id": req.id, "name": name, "count": count })),
    ))
}
