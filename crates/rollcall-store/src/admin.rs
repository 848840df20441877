//! Administrative writes: identities, courses, timetable and enrollments.

use crate::codec::{encode_embedding, format_date, format_timestamp, weekday_name};
use crate::sqlite::SqliteStore;
use rollcall_core::{AttendanceRecord, Identity, Session, StoreError, EMBEDDING_DIM};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub course_id: i64,
    pub course_code: String,
    pub course_name: String,
    pub teacher_id: i64,
}

impl SqliteStore {
    /// Insert or replace an identity and its face encoding.
    pub async fn upsert_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        if identity.embedding.len() != EMBEDDING_DIM {
            return Err(StoreError::Corrupt(format!(
                "refusing to store {}-dim embedding for identity {}",
                identity.embedding.len(),
                identity.id
            )));
        }
        if !identity.embedding.is_finite() {
            return Err(StoreError::Corrupt(format!(
                "refusing to store non-finite embedding for identity {}",
                identity.id
            )));
        }
        let id = identity.id;
        let name = identity.name.clone();
        let blob = encode_embedding(&identity.embedding);
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO identities (id, name, face_encoding) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   face_encoding = excluded.face_encoding",
                params![id, name, blob],
            )?;
            Ok(())
        })
        .await?;
        tracing::info!(identity = id, "identity stored");
        Ok(())
    }

    pub async fn add_course(&self, course: &Course) -> Result<(), StoreError> {
        let course = course.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO courses (course_id, course_code, course_name, teacher_id)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(course_id) DO UPDATE SET
                   course_code = excluded.course_code,
                   course_name = excluded.course_name,
                   teacher_id = excluded.teacher_id",
                params![course.course_id, course.course_code, course.course_name, course.teacher_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn add_session(&self, session: &Session) -> Result<(), StoreError> {
        let schedule_id = session.schedule_id;
        let course_id = session.course_id;
        let teacher_id = session.teacher_id;
        let day = weekday_name(session.day_of_week);
        let start = session.start_time.to_string();
        let end = session.end_time.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO schedules (schedule_id, course_id, teacher_id, day_of_week, start_time, end_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(schedule_id) DO UPDATE SET
                   course_id = excluded.course_id,
                   teacher_id = excluded.teacher_id,
                   day_of_week = excluded.day_of_week,
                   start_time = excluded.start_time,
                   end_time = excluded.end_time",
                params![schedule_id, course_id, teacher_id, day, start, end],
            )?;
            Ok(())
        })
        .await
    }

    /// Enroll an identity in a course. Returns false if already enrolled.
    pub async fn enroll(&self, identity_id: i64, course_id: i64) -> Result<bool, StoreError> {
        let inserted = self
            .run(move |conn| {
                let n = conn.execute(
                    "INSERT OR IGNORE INTO enrollments (identity_id, course_id) VALUES (?1, ?2)",
                    params![identity_id, course_id],
                )?;
                Ok(n)
            })
            .await?;
        Ok(inserted > 0)
    }

    /// Name of the identity `id`, if enrolled in the roster table.
    pub async fn identity_name(&self, id: i64) -> Result<Option<String>, StoreError> {
        self.run(move |conn| {
            let name = conn
                .query_row("SELECT name FROM identities WHERE id = ?1", params![id], |r| r.get(0))
                .optional()?;
            Ok(name)
        })
        .await
    }

    /// Write a record as given, replacing the day's record for the key
    /// without any cooldown check. Used for manual corrections.
    pub async fn set_attendance(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let identity_id = record.identity_id;
        let schedule_id = record.schedule_id;
        let scan_day = format_date(record.day());
        let scan_time = format_timestamp(record.scan_time);
        let status = record.status.as_str();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO attendance (identity_id, schedule_id, scan_day, scan_time, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(identity_id, schedule_id, scan_day) DO UPDATE SET
                   scan_time = excluded.scan_time,
                   status = excluded.status",
                params![identity_id, schedule_id, scan_day, scan_time, status],
            )?;
            Ok(())
        })
        .await?;
        tracing::info!(identity = identity_id, schedule = schedule_id, %status, "attendance set manually");
        Ok(())
    }
}
