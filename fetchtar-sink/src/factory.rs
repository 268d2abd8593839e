// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! Backend selection.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::AsyncWrite;
use tracing::{debug, warn};

use crate::durable::{DurableSink, generate_store_name};
use crate::error::{Error, Result};
use crate::registry::{DEFAULT_STORE_TTL, StoreRegistry};
use crate::sink::ChunkSink;
use crate::volatile::VolatileSink;

/// Which backend to store blocks in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SinkKind {
    /// Durable when the scratch directory is usable, volatile otherwise
    #[default]
    Auto,
    Volatile,
    Durable,
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub kind: SinkKind,
    pub scratch_dir: Option<PathBuf>,
    pub store_ttl: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::Auto,
            scratch_dir: None,
            store_ttl: DEFAULT_STORE_TTL,
        }
    }
}

/// A sink of either backend, so callers can be written once against
/// [`ChunkSink`].
#[derive(Debug)]
pub enum AnySink {
    Volatile(VolatileSink),
    Durable(DurableSink),
}

impl AnySink {
    pub fn is_durable(&self) -> bool {
        matches!(self, Self::Durable(_))
    }
}

impl From<VolatileSink> for AnySink {
    fn from(sink: VolatileSink) -> Self {
        Self::Volatile(sink)
    }
}

impl From<DurableSink> for AnySink {
    fn from(sink: DurableSink) -> Self {
        Self::Durable(sink)
    }
}

impl ChunkSink for AnySink {
    fn cursor(&self) -> u64 {
        match self {
            Self::Volatile(sink) => sink.cursor(),
            Self::Durable(sink) => sink.cursor(),
        }
    }

    async fn append(&mut self, block: Bytes) -> Result<u64> {
        match self {
            Self::Volatile(sink) => sink.append(block).await,
            Self::Durable(sink) => sink.append(block).await,
        }
    }

    async fn overwrite(&mut self, position: u64, block: Bytes) -> Result<()> {
        match self {
            Self::Volatile(sink) => sink.overwrite(position, block).await,
            Self::Durable(sink) => sink.overwrite(position, block).await,
        }
    }

    async fn read_all(&self) -> Result<Vec<Bytes>> {
        match self {
            Self::Volatile(sink) => sink.read_all().await,
            Self::Durable(sink) => sink.read_all().await,
        }
    }

    async fn copy_to<W>(&self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match self {
            Self::Volatile(sink) => sink.copy_to(writer).await,
            Self::Durable(sink) => sink.copy_to(writer).await,
        }
    }

    async fn dispose(&mut self) -> Result<()> {
        match self {
            Self::Volatile(sink) => sink.dispose().await,
            Self::Durable(sink) => sink.dispose().await,
        }
    }
}

/// Create the sink described by `config`.
///
/// Opening a durable sink also opens the store registry in the scratch
/// directory. A registry that cannot be opened only disables expiry of
/// abandoned stores.
pub fn open_sink(config: &SinkConfig) -> Result<AnySink> {
    match config.kind {
        SinkKind::Volatile => Ok(VolatileSink::new().into()),
        SinkKind::Durable => {
            let dir = config.scratch_dir.as_deref().ok_or(Error::MissingScratchDir)?;
            std::fs::create_dir_all(dir).map_err(|e| {
                Error::io(
                    format!("Failed to create scratch directory '{}'", dir.display()),
                    e,
                )
            })?;
            Ok(durable_sink(dir, config.store_ttl).into())
        }
        SinkKind::Auto => match config.scratch_dir.as_deref() {
            Some(dir) if scratch_is_usable(dir) => Ok(durable_sink(dir, config.store_ttl).into()),
            Some(dir) => {
                debug!(
                    "Scratch directory {} is not writable, using volatile storage",
                    dir.display()
                );
                Ok(VolatileSink::new().into())
            }
            None => Ok(VolatileSink::new().into()),
        },
    }
}

fn durable_sink(dir: &Path, ttl: Duration) -> DurableSink {
    let sink = DurableSink::new(dir).with_store_ttl(ttl);
    match StoreRegistry::open_in(dir) {
        Ok(registry) => sink.with_registry(Arc::new(registry)),
        Err(e) => {
            warn!("Store registry unavailable, abandoned stores will not expire: {e}");
            sink
        }
    }
}

/// Scratch file used to test whether `dir` accepts new files.
///
/// Unique per call, so concurrent probes never remove each other's file.
fn probe_path(dir: &Path) -> PathBuf {
    dir.join(format!(".probe.{}", generate_store_name()))
}

/// Whether `dir` exists or can be created, and accepts new files.
fn scratch_is_usable(dir: &Path) -> bool {
    if std::fs::create_dir_all(dir).is_err() {
        return false;
    }
    let probe = probe_path(dir);
    match std::fs::write(&probe, b"") {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(&probe) {
                warn!("Failed to remove probe file {}: {e}", probe.display());
            }
            true
        }
        Err(e) => {
            debug!("Cannot write to {}: {e}", dir.display());
            false
        }
    }
}
