//! Per-frame orchestration: match → resolve → log, once per detected face.

use crate::detector::DetectedFace;
use crate::ledger::{AttendancePolicy, Ledger, LedgerError, LogOutcome};
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::roster::{Roster, RosterHandle};
use crate::schedule::{ResolveError, ScheduleResolver};
use crate::store::AttendanceStore;
use crate::types::{AttendanceStatus, BoundingBox, SessionWindow};
use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Stable, display-language independent outcome key for one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultKey {
    Unknown,
    Present,
    Late,
    Absent,
    TooSoon,
    ClassEnded,
    NotEnrolled,
    OutsideSchedule,
    InvalidSchedule,
    Error,
}

impl ResultKey {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultKey::Unknown => "unknown",
            ResultKey::Present => "present",
            ResultKey::Late => "late",
            ResultKey::Absent => "absent",
            ResultKey::TooSoon => "too_soon",
            ResultKey::ClassEnded => "class_ended",
            ResultKey::NotEnrolled => "not_enrolled",
            ResultKey::OutsideSchedule => "outside_schedule",
            ResultKey::InvalidSchedule => "invalid_schedule",
            ResultKey::Error => "error",
        }
    }
}

impl fmt::Display for ResultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AttendanceStatus> for ResultKey {
    fn from(status: AttendanceStatus) -> Self {
        match status {
            AttendanceStatus::Present => ResultKey::Present,
            AttendanceStatus::Late => ResultKey::Late,
            AttendanceStatus::Absent => ResultKey::Absent,
        }
    }
}

/// Outcome for one detected face, in the order faces were detected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceResult {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<i64>,
    pub attendance_text: String,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub reason: ResultKey,
}

pub const UNKNOWN_NAME: &str = "Unknown";

pub struct FrameProcessor {
    roster: Arc<RosterHandle>,
    store: Arc<dyn AttendanceStore>,
    matcher: EuclideanMatcher,
    policy: AttendancePolicy,
}

impl FrameProcessor {
    pub fn new(
        roster: Arc<RosterHandle>,
        store: Arc<dyn AttendanceStore>,
        matcher: EuclideanMatcher,
        policy: AttendancePolicy,
    ) -> Self {
        Self {
            roster,
            store,
            matcher,
            policy,
        }
    }

    pub fn roster(&self) -> &Arc<RosterHandle> {
        &self.roster
    }

    /// Process every face of one frame against the requested session.
    ///
    /// A failure on one face becomes an `error` entry for that face and does
    /// not stop the others. All faces see the same roster snapshot.
    pub async fn process_frame(
        &self,
        faces: &[DetectedFace],
        course_id: i64,
        schedule_id: i64,
        now: NaiveDateTime,
    ) -> Vec<FaceResult> {
        let roster = self.roster.snapshot();
        let mut results = Vec::with_capacity(faces.len());
        for face in faces {
            results.push(self.process_face(&roster, face, course_id, schedule_id, now).await);
        }
        results
    }

    async fn process_face(
        &self,
        roster: &Roster,
        face: &DetectedFace,
        course_id: i64,
        schedule_id: i64,
        now: NaiveDateTime,
    ) -> FaceResult {
        let matched = match self.matcher.find(&face.embedding, roster) {
            Ok(Some(m)) => m,
            Ok(None) => {
                return FaceResult {
                    name: UNKNOWN_NAME.to_string(),
                    identity_id: None,
                    attendance_text: "No attendance record".to_string(),
                    bbox: face.bbox,
                    reason: ResultKey::Unknown,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed face embedding");
                return FaceResult {
                    name: UNKNOWN_NAME.to_string(),
                    identity_id: None,
                    attendance_text: error_text(),
                    bbox: face.bbox,
                    reason: ResultKey::Error,
                };
            }
        };

        let (reason, attendance_text) = self
            .decide(matched.identity_id, course_id, schedule_id, now)
            .await;
        FaceResult {
            name: matched.name,
            identity_id: Some(matched.identity_id),
            attendance_text,
            bbox: face.bbox,
            reason,
        }
    }

    async fn decide(
        &self,
        identity_id: i64,
        course_id: i64,
        schedule_id: i64,
        now: NaiveDateTime,
    ) -> (ResultKey, String) {
        let store = self.store.as_ref();
        let ledger = Ledger::new(store, self.policy);

        let window = match ScheduleResolver::new(store)
            .resolve(identity_id, course_id, schedule_id, now)
            .await
        {
            Ok(window) => window,
            Err(ResolveError::NotEnrolledOrInvalidSchedule) => {
                return (ResultKey::NotEnrolled, "No matching schedule".to_string())
            }
            Err(ResolveError::OutsideScheduleTime(window)) => {
                return self.outside_window(&ledger, identity_id, &window, now).await
            }
            Err(ResolveError::Store(e)) => {
                tracing::warn!(identity = identity_id, error = %e, "schedule lookup failed");
                return (ResultKey::Error, error_text());
            }
        };

        match ledger.log_attendance(identity_id, window.schedule_id, now).await {
            Ok(LogOutcome::Recorded(status)) => (
                status.into(),
                format!("Attendance logged for {}. Status: {status}", window.course_name),
            ),
            Ok(LogOutcome::TooSoon) | Ok(LogOutcome::AlreadyRecorded) => (
                ResultKey::TooSoon,
                format!("Attendance recently logged for {}", window.course_name),
            ),
            Ok(LogOutcome::ClassEnded) => (
                ResultKey::ClassEnded,
                format!("{} has already ended", window.course_name),
            ),
            Err(LedgerError::InvalidSchedule(_)) => (
                ResultKey::InvalidSchedule,
                "Schedule no longer exists".to_string(),
            ),
            Err(LedgerError::Store(_)) => (ResultKey::Error, error_text()),
        }
    }

    async fn outside_window(
        &self,
        ledger: &Ledger<'_>,
        identity_id: i64,
        window: &SessionWindow,
        now: NaiveDateTime,
    ) -> (ResultKey, String) {
        let base = format!(
            "Outside class time for {} ({} - {})",
            window.course_name,
            window.start_dt.time(),
            window.end_dt.time()
        );
        // Early arrivals are left alone so a later scan inside the window counts.
        if !self.policy.mark_absent_outside_window || now < window.start_dt {
            return (ResultKey::OutsideSchedule, base);
        }
        match ledger.mark_absent(identity_id, window.schedule_id, now).await {
            Ok(LogOutcome::Recorded(_)) => (ResultKey::OutsideSchedule, format!("{base}; marked absent")),
            Ok(_) => (ResultKey::OutsideSchedule, base),
            Err(e) => {
                tracing::warn!(identity = identity_id, error = %e, "absent mark failed");
                (ResultKey::Error, error_text())
            }
        }
    }
}

fn error_text() -> String {
    "Attendance could not be recorded; please try again".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::types::{Embedding, Identity, Session, TimeOfDay, EMBEDDING_DIM};
    use chrono::{NaiveDate, Weekday};

    fn basis(i: usize) -> Embedding {
        let mut values = vec![0.0; EMBEDDING_DIM];
        values[i] = 1.0;
        Embedding::new(values)
    }

    fn face(i: usize, left: i32) -> DetectedFace {
        DetectedFace {
            bbox: BoundingBox { top: 10, right: left + 50, bottom: 60, left },
            embedding: basis(i),
        }
    }

    // 2024-03-04 is a Monday.
    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    async fn setup(policy: AttendancePolicy) -> (Arc<MemoryStore>, FrameProcessor) {
        let store = Arc::new(MemoryStore::new());
        store.add_identity(Identity { id: 1, name: "Alice".into(), embedding: basis(0) });
        store.add_identity(Identity { id: 2, name: "Bob".into(), embedding: basis(1) });
        store.add_course(10, "Algorithms", 99);
        store.add_session(Session {
            schedule_id: 5,
            course_id: 10,
            teacher_id: 99,
            day_of_week: Weekday::Mon,
            start_time: TimeOfDay::from_hms(9, 0, 0).unwrap(),
            end_time: TimeOfDay::from_hms(10, 0, 0).unwrap(),
        });
        store.enroll(1, 10);

        let roster = Arc::new(RosterHandle::load(&*store).await.unwrap());
        let processor = FrameProcessor::new(roster, store.clone(), EuclideanMatcher::default(), policy);
        (store, processor)
    }

    #[test]
    fn test_keys_serialize_snake_case() {
        assert_eq!(serde_json::to_string(&ResultKey::TooSoon).unwrap(), "\"too_soon\"");
        assert_eq!(serde_json::to_string(&ResultKey::OutsideSchedule).unwrap(), "\"outside_schedule\"");
        assert_eq!(ResultKey::ClassEnded.as_str(), "class_ended");
    }

    #[tokio::test]
    async fn test_three_faces_one_unknown() {
        let (store, processor) = setup(AttendancePolicy::default()).await;
        let faces = vec![face(0, 0), face(7, 100), face(1, 200)];
        let results = processor.process_frame(&faces, 10, 5, at(9, 0)).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].name, "Alice");
        assert_eq!(results[0].reason, ResultKey::Present);
        assert_eq!(results[1].name, UNKNOWN_NAME);
        assert_eq!(results[1].reason, ResultKey::Unknown);
        assert_eq!(results[1].attendance_text, "No attendance record");
        assert_eq!(results[2].name, "Bob");
        assert_eq!(results[2].reason, ResultKey::NotEnrolled);
        for (result, face) in results.iter().zip(&faces) {
            assert_eq!(result.bbox, face.bbox);
        }
        // Alice and Bob each hit the resolver once; the unknown face never does.
        assert_eq!(store.session_lookups(), 2);
        assert_eq!(store.scan_lookups(), 1);
    }

    #[tokio::test]
    async fn test_not_enrolled_never_writes() {
        let (store, processor) = setup(AttendancePolicy::default()).await;
        let results = processor.process_frame(&[face(1, 0)], 10, 5, at(9, 5)).await;
        assert_eq!(results[0].reason, ResultKey::NotEnrolled);
        assert_eq!(store.scan_lookups(), 0);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_repeat_frames_are_too_soon() {
        let (store, processor) = setup(AttendancePolicy::default()).await;
        let first = processor.process_frame(&[face(0, 0)], 10, 5, at(9, 10)).await;
        assert_eq!(first[0].reason, ResultKey::Late);
        assert_eq!(first[0].attendance_text, "Attendance logged for Algorithms. Status: late");
        let second = processor.process_frame(&[face(0, 0)], 10, 5, at(9, 11)).await;
        assert_eq!(second[0].reason, ResultKey::TooSoon);
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_after_window_marks_absent() {
        let (store, processor) = setup(AttendancePolicy::default()).await;
        let results = processor.process_frame(&[face(0, 0)], 10, 5, at(10, 30)).await;
        assert_eq!(results[0].reason, ResultKey::OutsideSchedule);
        assert!(results[0].attendance_text.ends_with("marked absent"));
        let day = at(10, 30).date();
        assert_eq!(store.record(1, 5, day).unwrap().status, AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn test_early_arrival_is_not_penalized() {
        let (store, processor) = setup(AttendancePolicy::default()).await;
        let early = processor.process_frame(&[face(0, 0)], 10, 5, at(8, 55)).await;
        assert_eq!(early[0].reason, ResultKey::OutsideSchedule);
        assert!(!early[0].attendance_text.contains("absent"));
        assert_eq!(store.record_count(), 0);

        let on_time = processor.process_frame(&[face(0, 0)], 10, 5, at(9, 0)).await;
        assert_eq!(on_time[0].reason, ResultKey::Present);
    }

    #[tokio::test]
    async fn test_outside_window_without_absent_policy() {
        let policy = AttendancePolicy {
            mark_absent_outside_window: false,
            ..AttendancePolicy::default()
        };
        let (store, processor) = setup(policy).await;
        let results = processor.process_frame(&[face(0, 0)], 10, 5, at(10, 30)).await;
        assert_eq!(results[0].reason, ResultKey::OutsideSchedule);
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_bad_embedding_does_not_abort_frame() {
        let (_store, processor) = setup(AttendancePolicy::default()).await;
        let bad = DetectedFace {
            bbox: BoundingBox { top: 0, right: 1, bottom: 1, left: 0 },
            embedding: Embedding::new(vec![0.5; 3]),
        };
        let results = processor.process_frame(&[bad, face(0, 0)], 10, 5, at(9, 0)).await;
        assert_eq!(results[0].reason, ResultKey::Error);
        assert_eq!(results[1].reason, ResultKey::Present);
    }

    #[tokio::test]
    async fn test_store_failure_is_per_face_error() {
        let (store, processor) = setup(AttendancePolicy::default()).await;
        store.set_failing_writes(true);
        let results = processor.process_frame(&[face(0, 0), face(7, 0)], 10, 5, at(9, 0)).await;
        assert_eq!(results[0].reason, ResultKey::Error);
        assert_eq!(results[1].reason, ResultKey::Unknown);
    }
}
