// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! Error types for chunk storage.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for chunk storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while storing or reading archive blocks.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to open database with context
    #[error("Failed to open database at '{path}': {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Overwrite target was never appended
    #[error("Block position {position} out of range (sink holds {len} blocks)")]
    PositionOutOfRange { position: u64, len: u64 },

    /// Durable storage was requested without a location
    #[error("Durable storage requires a scratch directory")]
    MissingScratchDir,

    /// Sink was used after `dispose`
    #[error("Sink has been disposed")]
    Disposed,

    /// Filesystem error with context
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Blocking task failed to complete
    #[error("Task join error: {0}")]
    Join(String),
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}
