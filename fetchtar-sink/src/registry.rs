// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! Bookkeeping of durable stores.
//!
//! A durable sink whose process dies before `dispose` leaves its database
//! file behind. Every sink records itself here when it opens its store, and
//! the next sink to open in the same scratch directory deletes the stores
//! that have not been touched within the TTL.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, OpenFlags, params};
use tracing::debug;

use crate::error::{Error, Result};
use crate::schema::REGISTRY_SCHEMA_SQL;

/// File name of the registry database inside a scratch directory.
pub const REGISTRY_FILE: &str = "registry.sqlite";

/// How long a store may stay untouched before another run deletes it.
pub const DEFAULT_STORE_TTL: Duration = Duration::from_secs(30 * 60);

/// SQLite table of store names and the time they were last used.
pub struct StoreRegistry {
    conn: Mutex<Connection>,
}

impl StoreRegistry {
    /// Open or create the registry database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| Error::DatabaseOpen {
            path: path.to_owned(),
            source: e,
        })?;
        // Several runs may share one scratch directory.
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(REGISTRY_SCHEMA_SQL)?;
        debug!("Opened store registry at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the registry kept in `dir`.
    pub fn open_in<P: AsRef<Path>>(dir: P) -> Result<Self> {
        Self::open(dir.as_ref().join(REGISTRY_FILE))
    }

    /// Create an in-memory registry (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(REGISTRY_SCHEMA_SQL)?;
        debug!("Created in-memory store registry");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `name` as in use at `now`.
    pub fn touch(&self, name: &str, now: SystemTime) -> Result<()> {
        self.conn().execute(
            "INSERT INTO stores (name, last_used) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET last_used = excluded.last_used",
            params![name, unix_millis(now)],
        )?;
        Ok(())
    }

    /// Drop the row for `name`. Returns whether a row existed.
    pub fn forget(&self, name: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM stores WHERE name = ?1", params![name])?;
        Ok(rows > 0)
    }

    /// Stores last used more than `ttl` before `now`, oldest first.
    pub fn stale(&self, now: SystemTime, ttl: Duration) -> Result<Vec<String>> {
        let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let cutoff = unix_millis(now).saturating_sub(ttl);
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT name FROM stores WHERE last_used < ?1 ORDER BY last_used, name")?;
        let names = stmt
            .query_map(params![cutoff], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Forget every stale store except `except` and return the forgotten names.
    ///
    /// Only the rows are removed; deleting the files is up to the caller.
    pub fn expire(&self, now: SystemTime, ttl: Duration, except: &str) -> Result<Vec<String>> {
        let mut expired = Vec::new();
        for name in self.stale(now, ttl)? {
            if name != except && self.forget(&name)? {
                expired.push(name);
            }
        }
        Ok(expired)
    }

    /// Every registered store name, sorted.
    pub fn names(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(names)
    }
}

/// Convert SystemTime to milliseconds since the Unix epoch.
pub(crate) fn unix_millis(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(duration) => duration.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn test_touch_and_forget() {
        let registry = StoreRegistry::open_memory().unwrap();
        registry.touch("b", at(10)).unwrap();
        registry.touch("a", at(20)).unwrap();
        registry.touch("a", at(30)).unwrap();
        assert_eq!(registry.names().unwrap(), vec!["a", "b"]);

        assert!(registry.forget("a").unwrap());
        assert!(!registry.forget("a").unwrap());
        assert_eq!(registry.names().unwrap(), vec!["b"]);
    }

    #[test]
    fn test_stale_uses_ttl() {
        let registry = StoreRegistry::open_memory().unwrap();
        registry.touch("old", at(0)).unwrap();
        registry.touch("recent", at(1500)).unwrap();

        let now = at(1801);
        assert_eq!(registry.stale(now, DEFAULT_STORE_TTL).unwrap(), vec!["old"]);
        assert!(registry.stale(at(1800), DEFAULT_STORE_TTL).unwrap().is_empty());
    }

    #[test]
    fn test_expire_spares_current_store() {
        let registry = StoreRegistry::open_memory().unwrap();
        registry.touch("old", at(0)).unwrap();
        registry.touch("mine", at(0)).unwrap();

        let expired = registry
            .expire(at(3600), DEFAULT_STORE_TTL, "mine")
            .unwrap();
        assert_eq!(expired, vec!["old"]);
        assert_eq!(registry.names().unwrap(), vec!["mine"]);
    }

    #[test]
    fn test_unix_millis() {
        assert_eq!(unix_millis(at(2)), 2000);
        assert_eq!(unix_millis(UNIX_EPOCH - Duration::from_millis(5)), -5);
    }
}
