use rollcall_core::{
    AttendancePolicy, AttendanceStore, Clock, EuclideanMatcher, FaceDetector, FrameProcessor,
    RosterHandle,
};
use rollcall_store::SqliteStore;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

/// The session a client announced with `/start_scan`.
///
/// Informational only: one slot for the whole daemon, shown by `/test`.
/// Each `/process_frame` request names its own course and schedule, so
/// several clients can scan different sessions at once; the slot then
/// shows whichever scan started last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ActiveScan {
    pub course_id: i64,
    pub teacher_id: i64,
    pub schedule_id: i64,
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub processor: Arc<FrameProcessor>,
    pub detector: Arc<dyn FaceDetector>,
    pub clock: Arc<dyn Clock>,
    scan: Arc<Mutex<Option<ActiveScan>>>,
}

impl AppState {
    pub fn new(
        store: Arc<SqliteStore>,
        roster: Arc<RosterHandle>,
        detector: Arc<dyn FaceDetector>,
        clock: Arc<dyn Clock>,
        matcher: EuclideanMatcher,
        policy: AttendancePolicy,
    ) -> Self {
        let engine_store: Arc<dyn AttendanceStore> = store.clone();
        let processor = FrameProcessor::new(roster, engine_store, matcher, policy);
        Self {
            store,
            processor: Arc::new(processor),
            detector,
            clock,
            scan: Arc::new(Mutex::new(None)),
        }
    }

    fn scan_slot(&self) -> MutexGuard<'_, Option<ActiveScan>> {
        self.scan.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn active_scan(&self) -> Option<ActiveScan> {
        *self.scan_slot()
    }

    pub fn set_active_scan(&self, scan: Option<ActiveScan>) {
        *self.scan_slot() = scan;
    }
}
