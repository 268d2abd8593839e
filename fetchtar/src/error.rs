// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! Error types for the archive pipeline.

use std::io;

use fetchtar_archive::HeaderError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that abort a pipeline run.
///
/// Every error aborts the whole run; no partial archive is returned and the
/// sink is still disposed.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Transport failure or non-success response
    #[error("Failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },

    /// Entry name does not fit a header
    #[error("\"{name}\" file name exceeded {limit} byte limit ({len} bytes)")]
    NameTooLong {
        name: String,
        len: usize,
        limit: usize,
    },

    /// Cancellation was requested
    #[error("Pipeline cancelled")]
    Cancelled,

    /// Chunk storage failed
    #[error("Storage error: {0}")]
    Storage(#[from] fetchtar_sink::Error),

    /// Nothing was written, so there is no archive
    #[error("No blocks were written, archive is empty")]
    EmptyResult,

    /// The background task ended without delivering a result
    #[error("Pipeline task ended without a result")]
    Aborted,

    /// I/O error with context
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Header could not be encoded
    #[error("Header error: {0}")]
    Header(HeaderError),
}

impl From<HeaderError> for PipelineError {
    fn from(err: HeaderError) -> Self {
        match err {
            HeaderError::NameTooLong { name, len, limit } => Self::NameTooLong { name, len, limit },
            other => Self::Header(other),
        }
    }
}

impl From<io::Error> for PipelineError {
    fn from(source: io::Error) -> Self {
        Self::Io {
            context: "Failed to read response body".to_string(),
            source,
        }
    }
}

impl PipelineError {
    /// Attribute a body read failure to the resource it came from.
    pub(crate) fn for_url(self, url: &str) -> Self {
        match self {
            Self::Io { source, .. } => Self::Fetch {
                url: url.to_string(),
                reason: source.to_string(),
            },
            other => other,
        }
    }
}
