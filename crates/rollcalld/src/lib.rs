//! rollcalld: HTTP front end of the attendance engine.
//!
//! Clients post camera frames; each face found by the embedding service is
//! matched against the roster and its attendance recorded for the session
//! named in the request.

pub mod embedder;
pub mod error;
pub mod routes;
pub mod state;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Base64 frames from high-resolution cameras exceed axum's 2 MB default.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Build the axum Router with all routes and middleware.
pub fn build_router(state: state::AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/process_frame", post(routes::frames::process_frame))
        .route("/start_scan", post(routes::scan::start_scan))
        .route("/stop_scan", post(routes::scan::stop_scan))
        .route("/reload_faces", post(routes::identities::reload_faces))
        .route("/identities", post(routes::identities::enroll_identity))
        .route("/attendance/today", get(routes::attendance::today))
        .route("/attendance", post(routes::attendance::set_attendance))
        .route("/attendance/report", get(routes::attendance::report))
        .route("/attendance/export", get(routes::attendance::export))
        .route("/test", get(routes::scan::health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
