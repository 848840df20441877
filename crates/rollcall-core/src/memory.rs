//! In-memory [`AttendanceStore`], for tests and for exercising the engine
//! without a database.

use crate::store::{AttendanceStore, StoreError, WriteGuard, WriteOutcome};
use crate::types::{ActiveSession, AttendanceRecord, Identity, Session};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

type RecordKey = (i64, i64, NaiveDate);

#[derive(Default)]
struct Tables {
    identities: BTreeMap<i64, Identity>,
    courses: HashMap<i64, (String, i64)>,
    sessions: HashMap<i64, Session>,
    enrollments: HashSet<(i64, i64)>,
    records: HashMap<RecordKey, AttendanceRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing: AtomicBool,
    failing_writes: AtomicBool,
    session_lookups: AtomicUsize,
    scan_lookups: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory store set to fail".into()));
        }
        Ok(())
    }

    pub fn add_identity(&self, identity: Identity) {
        self.tables().identities.insert(identity.id, identity);
    }

    pub fn add_course(&self, course_id: i64, name: &str, teacher_id: i64) {
        self.tables().courses.insert(course_id, (name.to_string(), teacher_id));
    }

    pub fn add_session(&self, session: Session) {
        self.tables().sessions.insert(session.schedule_id, session);
    }

    pub fn enroll(&self, identity_id: i64, course_id: i64) {
        self.tables().enrollments.insert((identity_id, course_id));
    }

    /// Make every operation fail with a backend error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make only attendance writes fail.
    pub fn set_failing_writes(&self, failing: bool) {
        self.failing_writes.store(failing, Ordering::SeqCst);
    }

    pub fn record(&self, identity_id: i64, schedule_id: i64, day: NaiveDate) -> Option<AttendanceRecord> {
        self.tables().records.get(&(identity_id, schedule_id, day)).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.tables().records.len()
    }

    /// Number of active-session lookups served (resolver calls).
    pub fn session_lookups(&self) -> usize {
        self.session_lookups.load(Ordering::SeqCst)
    }

    /// Number of last-scan lookups served (ledger calls).
    pub fn scan_lookups(&self) -> usize {
        self.scan_lookups.load(Ordering::SeqCst)
    }

    /// Number of successful attendance writes.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AttendanceStore for MemoryStore {
    async fn list_identities(&self) -> Result<Vec<Identity>, StoreError> {
        self.check_available()?;
        Ok(self.tables().identities.values().cloned().collect())
    }

    async fn find_active_session(
        &self,
        identity_id: i64,
        course_id: i64,
        schedule_id: i64,
        weekday: Weekday,
    ) -> Result<Option<ActiveSession>, StoreError> {
        self.check_available()?;
        self.session_lookups.fetch_add(1, Ordering::SeqCst);
        let tables = self.tables();
        if !tables.enrollments.contains(&(identity_id, course_id)) {
            return Ok(None);
        }
        let Some(session) = tables.sessions.get(&schedule_id) else {
            return Ok(None);
        };
        if session.course_id != course_id || session.day_of_week != weekday {
            return Ok(None);
        }
        Ok(tables.courses.get(&course_id).map(|(name, _)| ActiveSession {
            session: session.clone(),
            course_name: name.clone(),
        }))
    }

    async fn find_session(&self, schedule_id: i64) -> Result<Option<Session>, StoreError> {
        self.check_available()?;
        Ok(self.tables().sessions.get(&schedule_id).cloned())
    }

    async fn find_scan_session(
        &self,
        course_id: i64,
        teacher_id: i64,
        schedule_id: i64,
    ) -> Result<Option<Session>, StoreError> {
        self.check_available()?;
        Ok(self
            .tables()
            .sessions
            .get(&schedule_id)
            .filter(|s| s.course_id == course_id && s.teacher_id == teacher_id)
            .cloned())
    }

    async fn last_scan_time(
        &self,
        identity_id: i64,
        schedule_id: i64,
        day: NaiveDate,
    ) -> Result<Option<NaiveDateTime>, StoreError> {
        self.check_available()?;
        self.scan_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tables()
            .records
            .get(&(identity_id, schedule_id, day))
            .map(|r| r.scan_time))
    }

    async fn upsert_attendance(
        &self,
        record: &AttendanceRecord,
        guard: WriteGuard,
    ) -> Result<WriteOutcome, StoreError> {
        self.check_available()?;
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("attendance write failed".into()));
        }
        let mut tables = self.tables();
        if !tables.sessions.contains_key(&record.schedule_id) {
            return Err(StoreError::Backend(format!(
                "unknown schedule {}",
                record.schedule_id
            )));
        }
        let key = (record.identity_id, record.schedule_id, record.day());
        let allowed = match (tables.records.get(&key), guard) {
            (None, _) => true,
            (Some(_), WriteGuard::FirstOfDay) => false,
            (Some(existing), WriteGuard::Cooldown(cooldown)) => {
                existing.scan_time <= record.scan_time - cooldown
            }
        };
        if !allowed {
            return Ok(WriteOutcome::Rejected);
        }
        tables.records.insert(key, record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(WriteOutcome::Written)
    }
}
