// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! File header encoding and decoding.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{HeaderError, Result};
use crate::{BLOCK_SIZE, NAME_LIMIT, offset};

const SPACE: u8 = b' ';
const CHECKSUM_LEN: usize = 8;
const DEFAULT_MODE: u32 = 0o644;
const REGULAR_FILE: u8 = b'0';
const MAGIC: &[u8; 6] = b"ustar\0";
const VERSION: &[u8; 2] = b"00";

/// Metadata of a single regular file entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    /// Modification time in seconds since the Unix epoch.
    pub mtime: u64,
}

impl FileHeader {
    /// Header for `name` holding `size` bytes, stamped with the current time.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        let mtime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            name: name.into(),
            size,
            mode: DEFAULT_MODE,
            mtime,
        }
    }

    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Encode into a single header block.
    ///
    /// The checksum is computed last, over the bytes actually written, with
    /// its own field counted as spaces.
    pub fn encode(&self) -> Result<[u8; BLOCK_SIZE]> {
        check_name(&self.name)?;

        let mut block = [0u8; BLOCK_SIZE];
        let name = self.name.as_bytes();
        block[offset::NAME..offset::NAME + name.len()].copy_from_slice(name);

        put_octal(&mut block, offset::MODE, "mode", self.mode as u64, 6)?;
        put_octal(&mut block, offset::SIZE, "size", self.size, 11)?;
        put_octal(&mut block, offset::MTIME, "mtime", self.mtime, 11)?;
        block[offset::TYPEFLAG] = REGULAR_FILE;
        block[offset::MAGIC..offset::MAGIC + MAGIC.len()].copy_from_slice(MAGIC);
        block[offset::VERSION..offset::VERSION + VERSION.len()].copy_from_slice(VERSION);

        let sum = checksum_of(&block);
        let field = format!("{sum:06o}");
        let at = offset::CHECKSUM;
        block[at..at + 6].copy_from_slice(field.as_bytes());
        block[at + 6] = 0;
        block[at + 7] = SPACE;

        Ok(block)
    }
}

/// Encode a header block for `name` holding `size` bytes.
pub fn encode_file_header(name: &str, size: u64) -> Result<[u8; BLOCK_SIZE]> {
    FileHeader::new(name, size).encode()
}

/// Fail with [`HeaderError::NameTooLong`] when `name` cannot be stored.
pub fn check_name(name: &str) -> Result<()> {
    let len = name.len();
    if len > NAME_LIMIT {
        return Err(HeaderError::NameTooLong {
            name: name.to_owned(),
            len,
            limit: NAME_LIMIT,
        });
    }
    Ok(())
}

/// Parse and verify a header block produced by [`FileHeader::encode`] or any
/// other ustar/v7 writer.
pub fn decode_file_header(block: &[u8]) -> Result<FileHeader> {
    if block.len() != BLOCK_SIZE {
        return Err(HeaderError::InvalidLength(block.len()));
    }
    if block.iter().all(|b| *b == 0) {
        return Err(HeaderError::EmptyBlock);
    }

    let stored = parse_octal(
        &block[offset::CHECKSUM..offset::CHECKSUM + CHECKSUM_LEN],
        "checksum",
    )? as u32;
    let computed = checksum_of(block);
    if stored != computed {
        return Err(HeaderError::ChecksumMismatch { stored, computed });
    }

    let name_field = &block[offset::NAME..offset::NAME + NAME_LIMIT];
    let name = std::str::from_utf8(until_nul(name_field))
        .map_err(|e| HeaderError::InvalidField {
            field: "name",
            reason: e.to_string(),
        })?
        .to_owned();

    Ok(FileHeader {
        name,
        mode: parse_octal(&block[offset::MODE..offset::MODE + 8], "mode")? as u32,
        size: parse_octal(&block[offset::SIZE..offset::SIZE + 12], "size")?,
        mtime: parse_octal(&block[offset::MTIME..offset::MTIME + 12], "mtime")?,
    })
}

/// Unsigned byte sum with the checksum field read as eight spaces.
fn checksum_of(block: &[u8]) -> u32 {
    let field = offset::CHECKSUM..offset::CHECKSUM + CHECKSUM_LEN;
    block
        .iter()
        .enumerate()
        .map(|(i, b)| if field.contains(&i) { SPACE } else { *b })
        .map(u32::from)
        .sum()
}

fn put_octal(
    block: &mut [u8],
    at: usize,
    field: &'static str,
    value: u64,
    digits: usize,
) -> Result<()> {
    let text = format!("{value:0digits$o}");
    if text.len() > digits {
        return Err(HeaderError::FieldOverflow {
            field,
            value,
            digits,
        });
    }
    block[at..at + digits].copy_from_slice(text.as_bytes());
    block[at + digits] = SPACE;
    Ok(())
}

fn until_nul(field: &[u8]) -> &[u8] {
    match field.iter().position(|b| *b == 0) {
        Some(end) => &field[..end],
        None => field,
    }
}

fn parse_octal(field: &[u8], name: &'static str) -> Result<u64> {
    let text = std::str::from_utf8(until_nul(field)).map_err(|e| HeaderError::InvalidField {
        field: name,
        reason: e.to_string(),
    })?;
    let text = text.trim_matches(' ');
    if text.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(text, 8).map_err(|e| HeaderError::InvalidField {
        field: name,
        reason: e.to_string(),
    })
}


#[cfg(test)]
mod proptests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn proptest_encode_decode(
            name in "[a-zA-Z0-9._-]{1,100}",
            size in 0u64..=0o77777777777,
            mtime in 0u64..=0o77777777777,
        ) {
            let header = FileHeader::new(name, size).with_mtime(mtime);
            let decoded = decode_file_header(&header.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, header);
        }
    }
}
