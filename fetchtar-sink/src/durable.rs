// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! SQLite-backed sink.
//!
//! Each sink owns one database file in a scratch directory. The file is
//! created on first use, so a sink that is never written to costs nothing
//! and disposing it is trivially successful.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use rusqlite::{Connection, OpenFlags, params};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::registry::{DEFAULT_STORE_TTL, StoreRegistry, unix_millis};
use crate::schema::CHUNKS_SCHEMA_SQL;
use crate::sink::{ChunkSink, write_block};

/// Prefix shared by every generated store name.
pub const STORE_PREFIX: &str = "__fetchtar__.";

/// Rows fetched per query when streaming blocks out.
const PAGE_BLOCKS: u64 = 256;

static STORE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a store name unique within this host session.
///
/// Format: `__fetchtar__.<unix millis>.<process counter>.<random hex>`.
pub fn generate_store_name() -> String {
    let millis = unix_millis(SystemTime::now());
    let count = STORE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut random = [0u8; 4];
    if let Err(e) = getrandom::fill(&mut random) {
        // millis and counter still keep names apart inside one process
        warn!("No randomness for store name: {e}");
    }
    let suffix: String = random.iter().map(|b| format!("{b:02x}")).collect();
    format!("{STORE_PREFIX}{millis}.{count}.{suffix}")
}

/// Path of the database file for store `name` in `dir`.
pub fn store_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.sqlite"))
}

/// Remove the database file of store `name` and its rollback journal.
///
/// Files that are already gone are not an error.
pub fn remove_store_files(dir: &Path, name: &str) -> Result<()> {
    let db = store_path(dir, name);
    let mut journal = db.clone().into_os_string();
    journal.push("-journal");
    for path in [db, PathBuf::from(journal)] {
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::io(
                    format!("Failed to remove '{}'", path.display()),
                    e,
                ));
            }
        }
    }
    Ok(())
}

/// Connection to one store's `chunks` table.
pub(crate) struct ChunkDb {
    conn: Connection,
}

impl ChunkDb {
    fn create(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(|e| Error::DatabaseOpen {
            path: path.to_owned(),
            source: e,
        })?;
        let db = Self { conn };
        db.configure_pragmas()?;
        db.conn.execute_batch(CHUNKS_SCHEMA_SQL)?;
        debug!("Opened chunk database at {}", path.display());
        Ok(db)
    }

    /// Scratch data: durability across power loss is not needed.
    fn configure_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA synchronous = OFF;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;
        Ok(())
    }

    fn insert(&self, position: u64, content: &[u8]) -> Result<()> {
        self.conn.execute(
            "INSERT INTO chunks (position, content) VALUES (?1, ?2)",
            params![position as i64, content],
        )?;
        Ok(())
    }

    fn update(&self, position: u64, content: &[u8]) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE chunks SET content = ?2 WHERE position = ?1",
            params![position as i64, content],
        )?;
        Ok(rows)
    }

    fn select_page(&self, start: u64, limit: u64) -> Result<Vec<Bytes>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT content FROM chunks WHERE position >= ?1 ORDER BY position LIMIT ?2",
        )?;
        let blocks = stmt
            .query_map(params![start as i64, limit as i64], |row| {
                row.get::<_, Vec<u8>>(0)
            })?
            .map(|content| content.map(Bytes::from))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(blocks)
    }
}

async fn db_operation<T, F>(db: Arc<Mutex<ChunkDb>>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&ChunkDb) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let db = db.blocking_lock();
        f(&db)
    })
    .await
    .map_err(|e| Error::Join(e.to_string()))?
}

/// Register `own` and delete stores abandoned by earlier runs.
///
/// Failures are logged and otherwise ignored: housekeeping never fails the
/// sink that triggered it.
fn expire_abandoned(registry: &StoreRegistry, dir: &Path, own: &str, ttl: Duration) {
    let now = SystemTime::now();
    if let Err(e) = registry.touch(own, now) {
        warn!(store = own, "Failed to register store: {e}");
    }
    let expired = match registry.expire(now, ttl, own) {
        Ok(expired) => expired,
        Err(e) => {
            warn!("Failed to look up abandoned stores: {e}");
            return;
        }
    };
    for name in expired {
        match remove_store_files(dir, &name) {
            Ok(()) => debug!(store = %name, "Deleted abandoned store"),
            Err(e) => {
                warn!(store = %name, "Failed to delete abandoned store: {e}");
                // keep it stale so the next run retries
                if let Err(e) = registry.touch(&name, UNIX_EPOCH) {
                    warn!(store = %name, "Failed to re-register store: {e}");
                }
            }
        }
    }
}

/// Sink storing each block as a row of a per-sink SQLite database.
pub struct DurableSink {
    name: String,
    dir: PathBuf,
    registry: Option<Arc<StoreRegistry>>,
    store_ttl: Duration,
    db: Option<Arc<Mutex<ChunkDb>>>,
    /// Last time the registry row was refreshed by this sink.
    touched_at: Option<Instant>,
    cursor: u64,
    disposed: bool,
}

impl DurableSink {
    /// A sink in `dir` with a freshly generated store name.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            name: generate_store_name(),
            dir: dir.into(),
            registry: None,
            store_ttl: DEFAULT_STORE_TTL,
            db: None,
            touched_at: None,
            cursor: 0,
            disposed: false,
        }
    }

    /// Record the store in `registry` and expire abandoned stores on open.
    pub fn with_registry(mut self, registry: Arc<StoreRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_store_ttl(mut self, ttl: Duration) -> Self {
        self.store_ttl = ttl;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Location of the database file, which only exists once a block is stored.
    pub fn path(&self) -> PathBuf {
        store_path(&self.dir, &self.name)
    }

    async fn db(&mut self) -> Result<Arc<Mutex<ChunkDb>>> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        if let Some(db) = &self.db {
            return Ok(db.clone());
        }

        let dir = self.dir.clone();
        let name = self.name.clone();
        let registry = self.registry.clone();
        let ttl = self.store_ttl;
        let db = tokio::task::spawn_blocking(move || {
            std::fs::create_dir_all(&dir).map_err(|e| {
                Error::io(
                    format!("Failed to create scratch directory '{}'", dir.display()),
                    e,
                )
            })?;
            let db = ChunkDb::create(&store_path(&dir, &name))?;
            if let Some(registry) = registry {
                expire_abandoned(&registry, &dir, &name, ttl);
            }
            Ok::<_, Error>(db)
        })
        .await
        .map_err(|e| Error::Join(e.to_string()))??;

        let db = Arc::new(Mutex::new(db));
        self.db = Some(db.clone());
        self.touched_at = Some(Instant::now());
        Ok(db)
    }

    /// Refresh the registry row of a store that is still being written.
    ///
    /// Rows are refreshed at most every half TTL, so a long run is never
    /// mistaken for an abandoned one by sinks opening next to it.
    async fn keep_alive(&mut self) {
        let Some(registry) = self.registry.clone() else {
            return;
        };
        let interval = self.store_ttl / 2;
        if self.touched_at.is_some_and(|at| at.elapsed() < interval) {
            return;
        }
        self.touched_at = Some(Instant::now());
        let name = self.name.clone();
        let touched =
            tokio::task::spawn_blocking(move || registry.touch(&name, SystemTime::now())).await;
        match touched {
            Ok(Ok(())) => trace!(store = %self.name, "Refreshed store registration"),
            Ok(Err(e)) => warn!(store = %self.name, "Failed to refresh store registration: {e}"),
            Err(e) => warn!(store = %self.name, "Failed to refresh store registration: {e}"),
        }
    }
}

impl std::fmt::Debug for DurableSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableSink")
            .field("name", &self.name)
            .field("dir", &self.dir)
            .field("cursor", &self.cursor)
            .field("open", &self.db.is_some())
            .field("touched_at", &self.touched_at)
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl ChunkSink for DurableSink {
    fn cursor(&self) -> u64 {
        self.cursor
    }

    async fn append(&mut self, block: Bytes) -> Result<u64> {
        let db = self.db().await?;
        let position = self.cursor;
        let len = block.len();
        db_operation(db, move |db| db.insert(position, &block)).await?;
        self.cursor += 1;
        trace!(store = %self.name, position, len, "Stored block");
        self.keep_alive().await;
        Ok(position)
    }

    async fn overwrite(&mut self, position: u64, block: Bytes) -> Result<()> {
        let len = self.cursor;
        if self.disposed {
            return Err(Error::Disposed);
        }
        if position >= len {
            return Err(Error::PositionOutOfRange { position, len });
        }
        let db = self.db().await?;
        let rows = db_operation(db, move |db| db.update(position, &block)).await?;
        if rows == 0 {
            return Err(Error::PositionOutOfRange { position, len });
        }
        self.keep_alive().await;
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Bytes>> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        let Some(db) = self.db.clone() else {
            return Ok(Vec::new());
        };
        let limit = self.cursor;
        db_operation(db, move |db| db.select_page(0, limit)).await
    }

    async fn copy_to<W>(&self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        if self.disposed {
            return Err(Error::Disposed);
        }
        let mut written = 0;
        if let Some(db) = &self.db {
            let mut start = 0;
            while start < self.cursor {
                let page = db_operation(db.clone(), move |db| db.select_page(start, PAGE_BLOCKS))
                    .await?;
                if page.is_empty() {
                    break;
                }
                start += page.len() as u64;
                for block in &page {
                    write_block(writer, block).await?;
                    written += block.len() as u64;
                }
            }
        }
        writer
            .flush()
            .await
            .map_err(|e| Error::io("Failed to flush archive output", e))?;
        Ok(written)
    }

    async fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;

        let db = self.db.take();
        let dir = self.dir.clone();
        let name = self.name.clone();
        let registry = self.registry.clone();
        tokio::task::spawn_blocking(move || {
            // close the connection before its file goes away
            drop(db);
            remove_store_files(&dir, &name)?;
            if let Some(registry) = registry {
                if let Err(e) = registry.forget(&name) {
                    warn!(store = %name, "Failed to unregister store: {e}");
                }
            }
            debug!(store = %name, "Disposed durable sink");
            Ok::<_, Error>(())
        })
        .await
        .map_err(|e| Error::Join(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_names_are_unique() {
        let a = generate_store_name();
        let b = generate_store_name();
        assert_ne!(a, b);
        assert!(a.starts_with(STORE_PREFIX));

        let parts: Vec<&str> = a[STORE_PREFIX.len()..].split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts[0].parse::<i64>().is_ok());
        assert!(parts[1].parse::<u64>().is_ok());
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_remove_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        remove_store_files(dir.path(), "nothing-here").unwrap();
    }

    #[tokio::test]
    async fn test_file_created_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DurableSink::new(dir.path());
        assert!(!sink.path().exists());
        assert!(sink.read_all().await.unwrap().is_empty());

        sink.append(Bytes::from_static(b"x")).await.unwrap();
        assert!(sink.path().exists());

        sink.dispose().await.unwrap();
        assert!(!sink.path().exists());
    }
}
