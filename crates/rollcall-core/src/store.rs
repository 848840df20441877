//! Persistence boundary consumed by the engine.

use crate::types::{ActiveSession, AttendanceRecord, Identity, Session};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, NaiveDateTime, Weekday};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("storage operation timed out")]
    Timeout,
    #[error("malformed stored row: {0}")]
    Corrupt(String),
}

/// Condition applied atomically by [`AttendanceStore::upsert_attendance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteGuard {
    /// Insert, or overwrite the day's record only if its scan_time is at
    /// least `cooldown` before the new scan_time.
    Cooldown(Duration),
    /// Insert only when no record exists for the key yet.
    FirstOfDay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    /// The guard rejected the write; nothing changed.
    Rejected,
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Every identity with a well-formed embedding.
    async fn list_identities(&self) -> Result<Vec<Identity>, StoreError>;

    /// The session `schedule_id` of `course_id` held on `weekday`, provided
    /// `identity_id` is enrolled in the course.
    async fn find_active_session(
        &self,
        identity_id: i64,
        course_id: i64,
        schedule_id: i64,
        weekday: Weekday,
    ) -> Result<Option<ActiveSession>, StoreError>;

    async fn find_session(&self, schedule_id: i64) -> Result<Option<Session>, StoreError>;

    /// The session identified by all three of course, teacher and schedule.
    async fn find_scan_session(
        &self,
        course_id: i64,
        teacher_id: i64,
        schedule_id: i64,
    ) -> Result<Option<Session>, StoreError>;

    async fn last_scan_time(
        &self,
        identity_id: i64,
        schedule_id: i64,
        day: NaiveDate,
    ) -> Result<Option<NaiveDateTime>, StoreError>;

    /// Write the record keyed by (identity, schedule, scan day) if `guard`
    /// allows it. Check and write happen as one atomic operation.
    async fn upsert_attendance(
        &self,
        record: &AttendanceRecord,
        guard: WriteGuard,
    ) -> Result<WriteOutcome, StoreError>;
}
