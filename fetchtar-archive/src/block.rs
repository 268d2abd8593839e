// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

use bytes::Bytes;

use crate::BLOCK_SIZE;

/// Zero bytes needed after `size` bytes of content to reach a block boundary.
///
/// Content that already ends on a boundary needs no padding at all.
pub fn padding_len(size: u64) -> usize {
    let rem = (size % BLOCK_SIZE as u64) as usize;
    (BLOCK_SIZE - rem) % BLOCK_SIZE
}

/// A run of `size` zero bytes.
pub fn encode_padding(size: usize) -> Bytes {
    Bytes::from(vec![0u8; size])
}

/// One full zero block, used as a placeholder for headers written later.
pub fn encode_block() -> Bytes {
    encode_padding(BLOCK_SIZE)
}

/// The two zero blocks that terminate an archive.
pub fn end_of_archive() -> Bytes {
    encode_padding(2 * BLOCK_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::empty(0, 0)]
    #[case::one(1, 511)]
    #[case::two(2, 510)]
    #[case::three(3, 509)]
    #[case::almost(511, 1)]
    #[case::exact(512, 0)]
    #[case::past(513, 511)]
    #[case::many(4096, 0)]
    fn test_padding_len(#[case] size: u64, #[case] expected: usize) {
        assert_eq!(padding_len(size), expected);
        assert_eq!((size as usize + expected) % BLOCK_SIZE, 0);
    }

    #[test]
    fn test_zero_blocks() {
        assert!(encode_padding(7).iter().all(|b| *b == 0));
        assert_eq!(encode_padding(0).len(), 0);
        assert_eq!(encode_block().len(), BLOCK_SIZE);
        assert_eq!(end_of_archive().len(), 1024);
    }
}
