//! Attendance ledger: status classification and guarded writes.
//!
//! One record exists per (identity, schedule, day). A new attempt within
//! the cooldown of the last recorded scan is rejected without a write, which
//! keeps consecutive video frames of the same person from re-logging. The
//! cooldown is checked twice: once up front to short-circuit, and again by
//! the store as part of the conditional upsert, so concurrent attempts for
//! one key cannot both write.

use crate::store::{AttendanceStore, StoreError, WriteGuard, WriteOutcome};
use crate::types::{AttendanceRecord, AttendanceStatus, Session};
use chrono::{Duration, NaiveDateTime};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendancePolicy {
    /// Window after session start during which an arrival counts as late.
    pub grace: Duration,
    /// Minimum gap between two accepted writes for one key.
    pub cooldown: Duration,
    /// Record `absent` for recognized faces scanned after the session window.
    pub mark_absent_outside_window: bool,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            grace: Duration::minutes(15),
            cooldown: Duration::minutes(30),
            mark_absent_outside_window: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Recorded(AttendanceStatus),
    /// A scan for this key was accepted less than a cooldown ago.
    TooSoon,
    /// The session is over for today.
    ClassEnded,
    /// An absent mark was skipped because the day already has a record.
    AlreadyRecorded,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("schedule {0} does not exist")]
    InvalidSchedule(i64),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Classify an arrival at `now` against the session start.
pub fn classify(now: NaiveDateTime, start_dt: NaiveDateTime, grace: Duration) -> AttendanceStatus {
    if now <= start_dt {
        AttendanceStatus::Present
    } else if now <= start_dt + grace {
        AttendanceStatus::Late
    } else {
        AttendanceStatus::Absent
    }
}

pub struct Ledger<'a> {
    store: &'a dyn AttendanceStore,
    policy: AttendancePolicy,
}

impl<'a> Ledger<'a> {
    pub fn new(store: &'a dyn AttendanceStore, policy: AttendancePolicy) -> Self {
        Self { store, policy }
    }

    /// Whether the last accepted scan of today is within the cooldown.
    async fn last_scan_within_cooldown(
        &self,
        identity_id: i64,
        schedule_id: i64,
        now: NaiveDateTime,
    ) -> Result<Option<bool>, LedgerError> {
        let last = self
            .store
            .last_scan_time(identity_id, schedule_id, now.date())
            .await?;
        Ok(last.map(|last| now - last < self.policy.cooldown))
    }

    async fn session(&self, schedule_id: i64) -> Result<Session, LedgerError> {
        self.store
            .find_session(schedule_id)
            .await?
            .ok_or(LedgerError::InvalidSchedule(schedule_id))
    }

    /// Classify and record an attendance attempt at `now`.
    pub async fn log_attendance(
        &self,
        identity_id: i64,
        schedule_id: i64,
        now: NaiveDateTime,
    ) -> Result<LogOutcome, LedgerError> {
        if self.last_scan_within_cooldown(identity_id, schedule_id, now).await? == Some(true) {
            tracing::debug!(identity = identity_id, schedule = schedule_id, "too soon to log again");
            return Ok(LogOutcome::TooSoon);
        }

        let session = self.session(schedule_id).await?;
        let (start_dt, end_dt) = session.window_on(now.date());
        if now > end_dt {
            return Ok(LogOutcome::ClassEnded);
        }

        let status = classify(now, start_dt, self.policy.grace);
        let record = AttendanceRecord {
            identity_id,
            schedule_id,
            scan_time: now,
            status,
        };
        match self
            .store
            .upsert_attendance(&record, WriteGuard::Cooldown(self.policy.cooldown))
            .await
        {
            Ok(WriteOutcome::Written) => {
                tracing::info!(identity = identity_id, schedule = schedule_id, %status, scan_time = %now, "attendance logged");
                Ok(LogOutcome::Recorded(status))
            }
            Ok(WriteOutcome::Rejected) => {
                tracing::debug!(identity = identity_id, schedule = schedule_id, "concurrent scan won the cooldown race");
                Ok(LogOutcome::TooSoon)
            }
            Err(e) => {
                tracing::warn!(identity = identity_id, schedule = schedule_id, error = %e, "attendance write failed");
                Err(e.into())
            }
        }
    }

    /// Record `absent` for a scan outside the session window.
    ///
    /// Never overwrites an existing record for the day.
    pub async fn mark_absent(
        &self,
        identity_id: i64,
        schedule_id: i64,
        now: NaiveDateTime,
    ) -> Result<LogOutcome, LedgerError> {
        match self.last_scan_within_cooldown(identity_id, schedule_id, now).await? {
            Some(true) => return Ok(LogOutcome::TooSoon),
            Some(false) => return Ok(LogOutcome::AlreadyRecorded),
            None => {}
        }

        self.session(schedule_id).await?;
        let record = AttendanceRecord {
            identity_id,
            schedule_id,
            scan_time: now,
            status: AttendanceStatus::Absent,
        };
        match self.store.upsert_attendance(&record, WriteGuard::FirstOfDay).await? {
            WriteOutcome::Written => {
                tracing::info!(identity = identity_id, schedule = schedule_id, scan_time = %now, "marked absent outside session window");
                Ok(LogOutcome::Recorded(AttendanceStatus::Absent))
            }
            WriteOutcome::Rejected => Ok(LogOutcome::AlreadyRecorded),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::types::{ActiveSession, Identity, TimeOfDay};
    use async_trait::async_trait;
    use chrono::{NaiveDate, Weekday};

    // 2024-03-04 is a Monday.
    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, s).unwrap()
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.add_course(10, "Algorithms", 99);
        for schedule_id in [5, 6] {
            store.add_session(Session {
                schedule_id,
                course_id: 10,
                teacher_id: 99,
                day_of_week: Weekday::Mon,
                start_time: TimeOfDay::from_hms(9, 0, 0).unwrap(),
                end_time: TimeOfDay::from_hms(10, 0, 0).unwrap(),
            });
        }
        store
    }

    async fn log(store: &MemoryStore, identity: i64, schedule: i64, now: NaiveDateTime) -> LogOutcome {
        Ledger::new(store, AttendancePolicy::default())
            .log_attendance(identity, schedule, now)
            .await
            .unwrap()
    }

    #[test]
    fn test_classify_boundaries() {
        let start = at(9, 0, 0);
        let grace = Duration::minutes(15);
        assert_eq!(classify(at(8, 0, 0), start, grace), AttendanceStatus::Present);
        assert_eq!(classify(start, start, grace), AttendanceStatus::Present);
        assert_eq!(classify(at(9, 0, 1), start, grace), AttendanceStatus::Late);
        assert_eq!(classify(at(9, 15, 0), start, grace), AttendanceStatus::Late);
        assert_eq!(classify(at(9, 15, 1), start, grace), AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn test_boundaries_through_ledger() {
        let store = store();
        assert_eq!(log(&store, 1, 5, at(9, 0, 0)).await, LogOutcome::Recorded(AttendanceStatus::Present));
        assert_eq!(log(&store, 2, 5, at(9, 15, 0)).await, LogOutcome::Recorded(AttendanceStatus::Late));
        assert_eq!(log(&store, 3, 5, at(10, 0, 0)).await, LogOutcome::Recorded(AttendanceStatus::Absent));
        assert_eq!(log(&store, 4, 5, at(10, 0, 1)).await, LogOutcome::ClassEnded);
        assert!(store.record(4, 5, day()).is_none());
    }

    #[tokio::test]
    async fn test_alice_scenario() {
        let store = store();
        assert_eq!(log(&store, 1, 5, at(8, 55, 0)).await, LogOutcome::Recorded(AttendanceStatus::Present));
        assert_eq!(log(&store, 1, 5, at(9, 10, 0)).await, LogOutcome::TooSoon);
        assert_eq!(
            store.record(1, 5, day()).unwrap().scan_time,
            at(8, 55, 0),
            "too-soon attempt must not touch the record"
        );
        assert_eq!(log(&store, 1, 5, at(9, 40, 0)).await, LogOutcome::Recorded(AttendanceStatus::Absent));
        assert_eq!(log(&store, 1, 6, at(10, 5, 0)).await, LogOutcome::ClassEnded);

        let record = store.record(1, 5, day()).unwrap();
        assert_eq!(record.scan_time, at(9, 40, 0));
        assert_eq!(record.status, AttendanceStatus::Absent);
        assert_eq!(store.record_count(), 1);
    }

    #[tokio::test]
    async fn test_cooldown_is_exactly_thirty_minutes() {
        let store = store();
        log(&store, 1, 5, at(8, 30, 0)).await;
        assert_eq!(log(&store, 1, 5, at(8, 59, 59)).await, LogOutcome::TooSoon);
        assert_eq!(log(&store, 1, 5, at(9, 0, 0)).await, LogOutcome::Recorded(AttendanceStatus::Present));
    }

    #[tokio::test]
    async fn test_cooldown_resets_on_a_new_day() {
        let store = store();
        log(&store, 1, 5, at(9, 50, 0)).await;
        let next_week = at(9, 0, 0) + Duration::days(7);
        assert_eq!(log(&store, 1, 5, next_week).await, LogOutcome::Recorded(AttendanceStatus::Present));
        assert_eq!(store.record_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_schedule() {
        let store = store();
        let err = Ledger::new(&store, AttendancePolicy::default())
            .log_attendance(1, 404, at(9, 0, 0))
            .await
            .unwrap_err();
        assert_eq!(err, LedgerError::InvalidSchedule(404));
    }

    #[tokio::test]
    async fn test_write_failure_is_an_error_and_retryable() {
        let store = store();
        store.set_failing_writes(true);
        let ledger = Ledger::new(&store, AttendancePolicy::default());
        assert!(matches!(
            ledger.log_attendance(1, 5, at(9, 0, 0)).await,
            Err(LedgerError::Store(_))
        ));
        assert_eq!(store.record_count(), 0);

        store.set_failing_writes(false);
        assert_eq!(
            ledger.log_attendance(1, 5, at(9, 0, 5)).await.unwrap(),
            LogOutcome::Recorded(AttendanceStatus::Late)
        );
    }

    #[tokio::test]
    async fn test_mark_absent_only_first_of_day() {
        let store = store();
        let ledger = Ledger::new(&store, AttendancePolicy::default());
        assert_eq!(
            ledger.mark_absent(1, 5, at(8, 0, 0)).await.unwrap(),
            LogOutcome::Recorded(AttendanceStatus::Absent)
        );
        assert_eq!(ledger.mark_absent(1, 5, at(8, 10, 0)).await.unwrap(), LogOutcome::TooSoon);

        log(&store, 2, 5, at(9, 0, 0)).await;
        assert_eq!(ledger.mark_absent(2, 5, at(11, 0, 0)).await.unwrap(), LogOutcome::AlreadyRecorded);
        assert_eq!(store.record(2, 5, day()).unwrap().status, AttendanceStatus::Present);
    }

    /// Store whose reads never see the day's record, as when another scan
    /// commits between the ledger's cooldown check and its write.
    struct StaleReads(MemoryStore);

    #[async_trait]
    impl AttendanceStore for StaleReads {
        async fn list_identities(&self) -> Result<Vec<Identity>, StoreError> {
            self.0.list_identities().await
        }

        async fn find_active_session(
            &self,
            identity_id: i64,
            course_id: i64,
            schedule_id: i64,
            weekday: Weekday,
        ) -> Result<Option<ActiveSession>, StoreError> {
            self.0.find_active_session(identity_id, course_id, schedule_id, weekday).await
        }

        async fn find_session(&self, schedule_id: i64) -> Result<Option<Session>, StoreError> {
            self.0.find_session(schedule_id).await
        }

        async fn find_scan_session(
            &self,
            course_id: i64,
            teacher_id: i64,
            schedule_id: i64,
        ) -> Result<Option<Session>, StoreError> {
            self.0.find_scan_session(course_id, teacher_id, schedule_id).await
        }

        async fn last_scan_time(
            &self,
            _identity_id: i64,
            _schedule_id: i64,
            _day: NaiveDate,
        ) -> Result<Option<NaiveDateTime>, StoreError> {
            Ok(None)
        }

        async fn upsert_attendance(
            &self,
            record: &AttendanceRecord,
            guard: WriteGuard,
        ) -> Result<WriteOutcome, StoreError> {
            self.0.upsert_attendance(record, guard).await
        }
    }

    #[tokio::test]
    async fn test_lost_cooldown_race_is_too_soon() {
        let store = StaleReads(store());
        let ledger = Ledger::new(&store, AttendancePolicy::default());
        assert_eq!(
            ledger.log_attendance(1, 5, at(9, 5, 0)).await.unwrap(),
            LogOutcome::Recorded(AttendanceStatus::Late)
        );
        assert_eq!(ledger.log_attendance(1, 5, at(9, 6, 0)).await.unwrap(), LogOutcome::TooSoon);
        assert_eq!(store.0.record(1, 5, day()).unwrap().scan_time, at(9, 5, 0));
        assert_eq!(store.0.writes(), 1);
    }

    #[tokio::test]
    async fn test_lost_absent_race_is_already_recorded() {
        let store = StaleReads(store());
        let ledger = Ledger::new(&store, AttendancePolicy::default());
        ledger.log_attendance(1, 5, at(9, 0, 0)).await.unwrap();
        assert_eq!(ledger.mark_absent(1, 5, at(11, 0, 0)).await.unwrap(), LogOutcome::AlreadyRecorded);
        assert_eq!(store.0.record(1, 5, day()).unwrap().status, AttendanceStatus::Present);
    }
}
