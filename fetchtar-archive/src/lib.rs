// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! Minimal ustar block codec.
//!
//! This crate encodes the handful of TAR records needed to pack a flat list of
//! regular files into an archive that standard `tar` readers accept.
//!
//! **Architecture**: This is the Format Layer of fetchtar. It knows nothing
//! about fetching or storage; the pipeline in the `fetchtar` crate decides
//! where the encoded blocks end up.
//!
//! # Layout
//!
//! Every file is written as
//!
//! 1. a 512 byte header block ([`FileHeader`]),
//! 2. the raw file content,
//! 3. zero padding up to the next multiple of [`BLOCK_SIZE`] ([`padding_len`]).
//!
//! | Offset | Length | Field    | Encoding |
//! | -----: | -----: | -------- | -------- |
//! | 0      | 100    | name     | raw bytes, NUL filled |
//! | 100    | 8      | mode     | 6 octal digits, space, NUL |
//! | 124    | 12     | size     | 11 octal digits, space |
//! | 136    | 12     | mtime    | 11 octal digits, space |
//! | 148    | 8      | checksum | 6 octal digits, NUL, space |
//! | 156    | 1      | typeflag | `'0'` (regular file) |
//! | 257    | 6      | magic    | `ustar\0` |
//! | 263    | 2      | version  | `00` |
//!
//! Directories, links, long names and every other extension are out of reach
//! on purpose.
//!
//! # Example
//!
//! ```
//! use fetchtar_archive::{BLOCK_SIZE, FileHeader, decode_file_header, padding_len};
//!
//! let header = FileHeader::new("a.txt", 2).with_mtime(0).encode().unwrap();
//! assert_eq!(header.len(), BLOCK_SIZE);
//! assert_eq!(padding_len(2), 510);
//!
//! let decoded = decode_file_header(&header).unwrap();
//! assert_eq!(decoded.name, "a.txt");
//! assert_eq!(decoded.size, 2);
//! ```

mod block;
mod error;
mod header;

pub use block::{encode_block, encode_padding, end_of_archive, padding_len};
pub use error::{HeaderError, Result};
pub use header::{FileHeader, check_name, decode_file_header, encode_file_header};

/// Size of every TAR record.
pub const BLOCK_SIZE: usize = 512;

/// Longest file name the header can hold without extensions.
pub const NAME_LIMIT: usize = 100;

/// Field offsets inside a header block.
pub mod offset {
    pub const NAME: usize = 0;
    pub const MODE: usize = 100;
    pub const SIZE: usize = 124;
    pub const MTIME: usize = 136;
    pub const CHECKSUM: usize = 148;
    pub const TYPEFLAG: usize = 156;
    pub const MAGIC: usize = 257;
    pub const VERSION: usize = 263;
}
