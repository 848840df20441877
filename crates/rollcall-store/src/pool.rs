//! Fixed-size pool of SQLite connections.
//!
//! Each [`tokio_rusqlite::Connection`] owns a background thread. A checked
//! out connection is returned to the pool when its guard drops, including
//! on error and cancellation paths.

use rollcall_core::StoreError;
use std::ops::Deref;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_rusqlite::Connection;

const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL;
     PRAGMA foreign_keys = ON;
     PRAGMA busy_timeout = 5000;";

pub struct Pool {
    idle: Mutex<Vec<Connection>>,
    permits: Semaphore,
    size: usize,
}

/// A connection borrowed from the pool.
pub struct PooledConnection<'a> {
    conn: Option<Connection>,
    pool: &'a Pool,
    _permit: SemaphorePermit<'a>,
}

impl Pool {
    /// Open `size` connections to the database at `path`.
    pub async fn open(path: &Path, size: usize) -> Result<Self, StoreError> {
        let size = size.max(1);
        let mut conns = Vec::with_capacity(size);
        for _ in 0..size {
            let conn = Connection::open(path).await.map_err(backend)?;
            conn.call(|conn| {
                conn.execute_batch(CONNECTION_PRAGMAS)?;
                Ok(())
            })
            .await
            .map_err(backend)?;
            conns.push(conn);
        }
        tracing::debug!(path = %path.display(), size, "sqlite pool opened");
        Ok(Self {
            idle: Mutex::new(conns),
            permits: Semaphore::new(size),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    fn idle(&self) -> MutexGuard<'_, Vec<Connection>> {
        self.idle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait for a free connection.
    pub async fn get(&self) -> Result<PooledConnection<'_>, StoreError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::Backend("connection pool closed".into()))?;
        let conn = self
            .idle()
            .pop()
            .ok_or_else(|| StoreError::Backend("connection pool exhausted".into()))?;
        Ok(PooledConnection {
            conn: Some(conn),
            pool: self,
            _permit: permit,
        })
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection already returned")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.idle().push(conn);
        }
    }
}

pub(crate) fn backend(err: tokio_rusqlite::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connections_return_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("pool.db"), 2).await.unwrap();

        let a = pool.get().await.unwrap();
        let b = pool.get().await.unwrap();
        assert!(pool.permits.try_acquire().is_err());
        drop(a);
        drop(b);

        assert_eq!(pool.idle().len(), 2);
        let c = pool.get().await.unwrap();
        let n: i64 = c.call(|conn| Ok(conn.query_row("SELECT 1", [], |r| r.get(0))?)).await.unwrap();
        assert_eq!(n, 1);
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let pool = Pool::open(&dir.path().join("fk.db"), 1).await.unwrap();
        let conn = pool.get().await.unwrap();
        let on: i64 = conn
            .call(|conn| Ok(conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(on, 1);
    }
}
