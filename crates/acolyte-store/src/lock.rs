//! Named locks shared by every process that opens the same database file.
//!
//! A held key is a row in `named_locks`. Acquisition inserts the row and
//! retries with backoff while another owner holds it. Rows older than the
//! lease are treated as left behind by a dead process and removed.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use acolyte_core::{EngineError, LockGuard, NamedLock};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::{Result, StoreError};

/// How long a held key is honored before waiters may reclaim it.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(30);

pub(crate) const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_BACKOFF: Duration = Duration::from_millis(2);
const MAX_BACKOFF: Duration = Duration::from_millis(50);

static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);

/// [`NamedLock`] backed by the `named_locks` table.
///
/// Uses its own connection, so holding a key never blocks store access.
pub struct SqliteLock {
    conn: Arc<Mutex<Connection>>,
    lease: Duration,
}

impl SqliteLock {
    /// Open a lock service on the database at `path`.
    ///
    /// The schema must exist: open a [`crate::SqliteStore`] on `path` first.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        debug!(path = %path.display(), "Opened named lock table");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            lease: DEFAULT_LEASE,
        })
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Owner currently holding `key`, if any.
    pub fn holder(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .lock()
            .query_row(
                "SELECT owner FROM named_locks WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn try_insert(&self, key: &str, owner: &str) -> Result<bool> {
        let inserted = self.conn.lock().execute(
            "INSERT INTO named_locks (key, owner, acquired_on) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO NOTHING",
            params![key, owner, Utc::now().timestamp_millis()],
        )?;
        Ok(inserted == 1)
    }

    fn reclaim_expired(&self, key: &str) -> Result<()> {
        let lease = i64::try_from(self.lease.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp_millis().saturating_sub(lease);
        let removed = self.conn.lock().execute(
            "DELETE FROM named_locks WHERE key = ?1 AND acquired_on < ?2",
            params![key, cutoff],
        )?;
        if removed > 0 {
            warn!(key, "Reclaimed expired named lock");
        }
        Ok(())
    }
}

impl NamedLock for SqliteLock {
    fn acquire(&self, key: &str) -> acolyte_core::Result<LockGuard> {
        let owner = format!(
            "{}:{}",
            std::process::id(),
            NEXT_OWNER.fetch_add(1, Ordering::Relaxed)
        );
        let mut backoff = MIN_BACKOFF;
        loop {
            if self.try_insert(key, &owner).map_err(lock_error)? {
                debug!(key, owner, "Acquired named lock");
                return Ok(LockGuard::new(HeldKey {
                    conn: self.conn.clone(),
                    key: key.to_string(),
                    owner,
                }));
            }
            self.reclaim_expired(key).map_err(lock_error)?;
            thread::sleep(backoff);
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

fn lock_error(err: StoreError) -> EngineError {
    EngineError::Lock(err.to_string())
}

/// Deletes its row on drop. Only the owner's row is removed, so a key
/// reclaimed by someone else stays held.
struct HeldKey {
    conn: Arc<Mutex<Connection>>,
    key: String,
    owner: String,
}

impl Drop for HeldKey {
    fn drop(&mut self) {
        let released = self.conn.lock().execute(
            "DELETE FROM named_locks WHERE key = ?1 AND owner = ?2",
            params![self.key, self.owner],
        );
        match released {
            Ok(_) => debug!(key = %self.key, "Released named lock"),
            Err(e) => warn!(key = %self.key, error = %e, "Failed to release named lock"),
        }
    }
}
