//! Store-backed advisory mutexes, keyed on `FNV-1a(region_path)`.
//!
//! The lock table lives in the persistent store so multiple processes
//! coordinate; an in-process mutex would not serialize mutations across
//! consumers. Acquisition inserts the key row, release deletes it. The
//! RAII guard releases on drop from whichever code path exits.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};
use uuid::Uuid;

use crate::connection::ConnectionPool;
use crate::errors::Result;
use crate::repositories::now_iso;

const ACQUIRE_POLL: Duration = Duration::from_millis(50);

/// 64-bit FNV-1a, cast to `i64` for the integer lock key.
#[must_use]
pub fn fnv1a_64(s: &str) -> i64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash as i64
}

/// Held advisory lock on one region path. Dropping releases it.
pub struct RegionLockGuard {
    pool: ConnectionPool,
    key: i64,
    holder: String,
    path: String,
}

impl RegionLockGuard {
    /// The integer lock key.
    #[must_use]
    pub fn key(&self) -> i64 {
        self.key
    }
}

impl Drop for RegionLockGuard {
    fn drop(&mut self) {
        let released = self.pool.get().map_err(crate::errors::StoreError::from).and_then(|conn| {
            conn.execute(
                "DELETE FROM advisory_locks WHERE key = ?1 AND holder = ?2",
                rusqlite::params![self.key, self.holder],
            )
            .map_err(Into::into)
        });
        match released {
            Ok(1) => trace!(path = %self.path, "region lock released"),
            Ok(_) => warn!(path = %self.path, "region lock row was already gone"),
            Err(err) => warn!(path = %self.path, %err, "failed to release region lock"),
        }
    }
}

/// Try to take the lock for `path` without waiting.
pub fn try_acquire_region_lock(
    pool: &ConnectionPool,
    path: &str,
) -> Result<Option<RegionLockGuard>> {
    let key = fnv1a_64(path);
    let holder = Uuid::new_v4().to_string();
    let conn = pool.get()?;
    let inserted = conn.execute(
        "INSERT INTO advisory_locks (key, holder, acquired_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO NOTHING",
        rusqlite::params![key, holder, now_iso()],
    )?;
    if inserted == 1 {
        trace!(%path, key, "region lock acquired");
        Ok(Some(RegionLockGuard {
            pool: pool.clone(),
            key,
            holder,
            path: path.to_owned(),
        }))
    } else {
        Ok(None)
    }
}

/// Take the lock for `path`, polling until it frees or `cancel` fires.
/// Returns `None` only on cancellation.
pub fn acquire_region_lock(
    pool: &ConnectionPool,
    path: &str,
    cancel: &CancellationToken,
) -> Result<Option<RegionLockGuard>> {
    loop {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        if let Some(guard) = try_acquire_region_lock(pool, path)? {
            return Ok(Some(guard));
        }
        std::thread::sleep(ACQUIRE_POLL);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
