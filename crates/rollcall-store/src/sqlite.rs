use crate::codec::{
    decode_embedding, format_date, format_timestamp, parse_timestamp, weekday_name, DecodeError,
    SessionRow, SESSION_COLUMNS,
};
use crate::pool::{backend, Pool};
use crate::schema::SCHEMA_V1;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, Weekday};
use rollcall_core::{
    ActiveSession, AttendanceRecord, AttendanceStore, Identity, Session, StoreError, WriteGuard,
    WriteOutcome,
};
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const UPSERT_AFTER_COOLDOWN: &str = "INSERT INTO attendance (identity_id, schedule_id, scan_day, scan_time, status)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT(identity_id, schedule_id, scan_day) DO UPDATE SET
       scan_time = excluded.scan_time,
       status = excluded.status
     WHERE attendance.scan_time <= ?6";

const INSERT_FIRST_OF_DAY: &str = "INSERT INTO attendance (identity_id, schedule_id, scan_day, scan_time, status)
     VALUES (?1, ?2, ?3, ?4, ?5)
     ON CONFLICT(identity_id, schedule_id, scan_day) DO NOTHING";

#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    pub pool_size: usize,
    /// Upper bound on any single operation, including waiting for a connection.
    pub op_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            pool_size: 4,
            op_timeout: Duration::from_secs(5),
        }
    }
}

/// SQLite-backed [`AttendanceStore`].
///
/// Needs a file path: each pooled connection opens the database separately,
/// so `:memory:` would give every connection its own empty database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Arc<Pool>,
    op_timeout: Duration,
}

pub(crate) fn corrupt(err: DecodeError) -> StoreError {
    StoreError::Corrupt(err.to_string())
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Backend(format!("create {}: {e}", parent.display())))?;
        }
        let pool = Pool::open(path, options.pool_size).await?;
        let store = Self {
            pool: Arc::new(pool),
            op_timeout: options.op_timeout,
        };
        store
            .run(|conn| {
                conn.execute_batch(SCHEMA_V1)?;
                Ok(())
            })
            .await?;
        tracing::info!(path = %path.display(), pool = options.pool_size, "attendance database ready");
        Ok(store)
    }

    /// Run `f` on a pooled connection, bounded by the operation timeout.
    ///
    /// Once dispatched, `f` runs to completion on the connection's thread
    /// even if the caller stops waiting. A write that times out after
    /// dispatch may therefore still commit: `StoreError::Timeout` means
    /// "outcome unknown", not "nothing written". Retrying a guarded
    /// attendance write is safe; the retry reports `TooSoon` if the first
    /// attempt landed.
    pub(crate) async fn run<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut rusqlite::Connection) -> tokio_rusqlite::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let work = async {
            let conn = self.pool.get().await?;
            conn.call(f).await.map_err(backend)
        };
        tokio::time::timeout(self.op_timeout, work)
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}

#[async_trait]
impl AttendanceStore for SqliteStore {
    async fn list_identities(&self) -> Result<Vec<Identity>, StoreError> {
        let rows: Vec<(i64, String, Vec<u8>)> = self
            .run(|conn| {
                let mut stmt =
                    conn.prepare("SELECT id, name, face_encoding FROM identities ORDER BY id")?;
                let rows = stmt
                    .query_map([], |r| {
                        Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?, r.get::<_, Vec<u8>>(2)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut identities = Vec::with_capacity(rows.len());
        for (id, name, blob) in rows {
            match decode_embedding(&blob) {
                Ok(embedding) => identities.push(Identity { id, name, embedding }),
                Err(e) => tracing::warn!(id, name = %name, error = %e, "skipping identity with bad face encoding"),
            }
        }
        Ok(identities)
    }

    async fn find_active_session(
        &self,
        identity_id: i64,
        course_id: i64,
        schedule_id: i64,
        weekday: Weekday,
    ) -> Result<Option<ActiveSession>, StoreError> {
        let day = weekday_name(weekday);
        let row = self
            .run(move |conn| {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS}, c.course_name
                     FROM schedules s
                     JOIN courses c ON c.course_id = s.course_id
                     JOIN enrollments e ON e.course_id = s.course_id AND e.identity_id = ?1
                     WHERE s.course_id = ?2 AND s.schedule_id = ?3 AND s.day_of_week = ?4"
                );
                let row = conn
                    .query_row(&sql, params![identity_id, course_id, schedule_id, day], |r| {
                        Ok((SessionRow::read(r, 0)?, r.get::<_, String>(6)?))
                    })
                    .optional()?;
                Ok(row)
            })
            .await?;

        row.map(|(session, course_name)| -> Result<ActiveSession, StoreError> {
            Ok(ActiveSession {
                session: session.into_session().map_err(corrupt)?,
                course_name,
            })
        })
        .transpose()
    }

    async fn find_session(&self, schedule_id: i64) -> Result<Option<Session>, StoreError> {
        let row = self
            .run(move |conn| {
                let sql = format!("SELECT {SESSION_COLUMNS} FROM schedules s WHERE s.schedule_id = ?1");
                let row = conn
                    .query_row(&sql, params![schedule_id], |r| SessionRow::read(r, 0))
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(|r| r.into_session().map_err(corrupt)).transpose()
    }

    async fn find_scan_session(
        &self,
        course_id: i64,
        teacher_id: i64,
        schedule_id: i64,
    ) -> Result<Option<Session>, StoreError> {
        let row = self
            .run(move |conn| {
                let sql = format!(
                    "SELECT {SESSION_COLUMNS} FROM schedules s
                     WHERE s.schedule_id = ?1 AND s.course_id = ?2 AND s.teacher_id = ?3"
                );
                let row = conn
                    .query_row(&sql, params![schedule_id, course_id, teacher_id], |r| {
                        SessionRow::read(r, 0)
                    })
                    .optional()?;
                Ok(row)
            })
            .await?;
        row.map(|r| r.into_session().map_err(corrupt)).transpose()
    }

    async fn last_scan_time(
        &self,
        identity_id: i64,
        schedule_id: i64,
        day: NaiveDate,
    ) -> Result<Option<NaiveDateTime>, StoreError> {
        let day = format_date(day);
        let raw: Option<String> = self
            .run(move |conn| {
                let raw = conn
                    .query_row(
                        "SELECT scan_time FROM attendance
                         WHERE identity_id = ?1 AND schedule_id = ?2 AND scan_day = ?3",
                        params![identity_id, schedule_id, day],
                        |r| r.get(0),
                    )
                    .optional()?;
                Ok(raw)
            })
            .await?;
        raw.map(|s| parse_timestamp(&s).map_err(corrupt)).transpose()
    }

    async fn upsert_attendance(
        &self,
        record: &AttendanceRecord,
        guard: WriteGuard,
    ) -> Result<WriteOutcome, StoreError> {
        let identity_id = record.identity_id;
        let schedule_id = record.schedule_id;
        let scan_day = format_date(record.day());
        let scan_time = format_timestamp(record.scan_time);
        let status = record.status.as_str();
        let cooldown_cutoff = match guard {
            WriteGuard::Cooldown(cooldown) => Some(format_timestamp(record.scan_time - cooldown)),
            WriteGuard::FirstOfDay => None,
        };

        let changed = self
            .run(move |conn| {
                let tx = conn.transaction()?;
                let changed = match cooldown_cutoff {
                    Some(cutoff) => tx.execute(
                        UPSERT_AFTER_COOLDOWN,
                        params![identity_id, schedule_id, scan_day, scan_time, status, cutoff],
                    )?,
                    None => tx.execute(
                        INSERT_FIRST_OF_DAY,
                        params![identity_id, schedule_id, scan_day, scan_time, status],
                    )?,
                };
                tx.commit()?;
                Ok(changed)
            })
            .await?;

        Ok(if changed > 0 {
            WriteOutcome::Written
        } else {
            WriteOutcome::Rejected
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{Embedding, EMBEDDING_DIM};

    #[tokio::test]
    async fn test_bad_face_encoding_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("db/rollcall.db"), StoreOptions::default())
            .await
            .unwrap();
        store
            .upsert_identity(&Identity {
                id: 1,
                name: "Alice".into(),
                embedding: Embedding::new(vec![0.5; EMBEDDING_DIM]),
            })
            .await
            .unwrap();
        store
            .run(|conn| {
                conn.execute(
                    "INSERT INTO identities (id, name, face_encoding) VALUES (2, 'Broken', x'0102')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let mut nan_blob = vec![0u8; crate::codec::EMBEDDING_BLOB_LEN];
        nan_blob[..8].copy_from_slice(&f64::NAN.to_le_bytes());
        store
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO identities (id, name, face_encoding) VALUES (3, 'NaN', ?1)",
                    params![nan_blob],
                )?;
                Ok(())
            })
            .await
            .unwrap();

        let identities = store.list_identities().await.unwrap();
        assert_eq!(identities.len(), 1);
        assert_eq!(identities[0].id, 1);
    }

    #[tokio::test]
    async fn test_operation_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            pool_size: 1,
            op_timeout: Duration::from_millis(50),
        };
        let store = SqliteStore::open(dir.path().join("t.db"), options).await.unwrap();

        let pool = Arc::clone(&store.pool);
        let _held = pool.get().await.unwrap();
        let err = store.list_identities().await.unwrap_err();
        assert_eq!(err, StoreError::Timeout);
    }

    #[tokio::test]
    async fn test_timed_out_write_may_still_commit() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            pool_size: 1,
            op_timeout: Duration::from_millis(50),
        };
        let store = SqliteStore::open(dir.path().join("t.db"), options).await.unwrap();

        let err = store
            .run(|conn| {
                std::thread::sleep(Duration::from_millis(200));
                conn.execute(
                    "INSERT INTO courses (course_id, course_code, course_name, teacher_id)
                     VALUES (1, 'PHY101', 'Physics', 7)",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Timeout);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let count: i64 = store
            .run(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM courses", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
