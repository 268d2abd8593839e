// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! Error types for header encoding and decoding.

use thiserror::Error;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, HeaderError>;

/// Errors that can occur while encoding or decoding a header block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    /// File name does not fit the 100 byte name field
    #[error("\"{name}\" file name exceeded {limit} byte limit ({len} bytes)")]
    NameTooLong {
        name: String,
        len: usize,
        limit: usize,
    },

    /// Numeric value does not fit its octal field
    #[error("{field} value {value} does not fit in {digits} octal digits")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        digits: usize,
    },

    /// Header blocks are exactly one block long
    #[error("header block must be 512 bytes, got {0}")]
    InvalidLength(usize),

    /// All-zero block, usually part of an end-of-archive marker
    #[error("empty header block")]
    EmptyBlock,

    /// Stored checksum does not match the header bytes
    #[error("header checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: u32, computed: u32 },

    /// Field could not be parsed
    #[error("invalid {field} field: {reason}")]
    InvalidField { field: &'static str, reason: String },
}
