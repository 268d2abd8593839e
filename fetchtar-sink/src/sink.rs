// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

use std::future::Future;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

/// Ordered, append-only sequence of binary blocks with positional overwrite.
///
/// Positions are zero-based and equal to the number of blocks appended
/// before the block in question. A sink has a single writer; the pipeline
/// that owns it awaits every operation before issuing the next one.
pub trait ChunkSink: Send + Sync {
    /// Number of blocks appended so far.
    fn cursor(&self) -> u64;

    /// Store `block` at the current cursor and return that position.
    fn append(&mut self, block: Bytes) -> impl Future<Output = Result<u64>> + Send;

    /// Replace the block at `position`, which must already have been appended.
    fn overwrite(&mut self, position: u64, block: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Every stored block in append order.
    fn read_all(&self) -> impl Future<Output = Result<Vec<Bytes>>> + Send;

    /// All blocks joined into one buffer.
    fn materialize(&self) -> impl Future<Output = Result<Bytes>> + Send {
        async move {
            let mut blocks = self.read_all().await?;
            if blocks.len() == 1 {
                return Ok(blocks.remove(0));
            }
            let len = blocks.iter().map(Bytes::len).sum();
            let mut out = BytesMut::with_capacity(len);
            for block in &blocks {
                out.extend_from_slice(block);
            }
            Ok(out.freeze())
        }
    }

    /// Write all blocks to `writer` in order, returning the byte count.
    fn copy_to<W>(&self, writer: &mut W) -> impl Future<Output = Result<u64>> + Send
    where
        W: AsyncWrite + Unpin + Send,
    {
        async move {
            let mut written = 0;
            for block in self.read_all().await? {
                write_block(writer, &block).await?;
                written += block.len() as u64;
            }
            writer
                .flush()
                .await
                .map_err(|e| Error::io("Failed to flush archive output", e))?;
            Ok(written)
        }
    }

    /// Release every block and backing resource.
    ///
    /// Calling this more than once is a no-op. It succeeds even when the
    /// backing store was never opened.
    fn dispose(&mut self) -> impl Future<Output = Result<()>> + Send;
}

pub(crate) async fn write_block<W>(writer: &mut W, block: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    writer
        .write_all(block)
        .await
        .map_err(|e| Error::io("Failed to write archive output", e))
}
