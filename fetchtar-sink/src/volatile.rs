// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::sink::ChunkSink;

/// In-process sink backed by a vector of blocks.
#[derive(Debug, Default)]
pub struct VolatileSink {
    blocks: Vec<Bytes>,
    disposed: bool,
}

impl VolatileSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        Ok(())
    }
}

impl ChunkSink for VolatileSink {
    fn cursor(&self) -> u64 {
        self.blocks.len() as u64
    }

    async fn append(&mut self, block: Bytes) -> Result<u64> {
        self.ensure_live()?;
        let position = self.cursor();
        self.blocks.push(block);
        Ok(position)
    }

    async fn overwrite(&mut self, position: u64, block: Bytes) -> Result<()> {
        self.ensure_live()?;
        let len = self.cursor();
        let slot = usize::try_from(position)
            .ok()
            .and_then(|i| self.blocks.get_mut(i))
            .ok_or(Error::PositionOutOfRange { position, len })?;
        *slot = block;
        Ok(())
    }

    async fn read_all(&self) -> Result<Vec<Bytes>> {
        self.ensure_live()?;
        Ok(self.blocks.clone())
    }

    async fn dispose(&mut self) -> Result<()> {
        self.blocks = Vec::new();
        self.disposed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_and_overwrite() {
        let mut sink = VolatileSink::new();
        assert_eq!(sink.append(Bytes::from_static(b"aa")).await.unwrap(), 0);
        assert_eq!(sink.append(Bytes::from_static(b"bb")).await.unwrap(), 1);
        sink.overwrite(0, Bytes::from_static(b"AA")).await.unwrap();

        assert_eq!(sink.cursor(), 2);
        assert_eq!(sink.materialize().await.unwrap(), Bytes::from_static(b"AAbb"));
    }

    #[tokio::test]
    async fn test_overwrite_never_creates_gaps() {
        let mut sink = VolatileSink::new();
        sink.append(Bytes::from_static(b"aa")).await.unwrap();

        let err = sink.overwrite(1, Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::PositionOutOfRange {
                position: 1,
                len: 1
            }
        ));
        assert_eq!(sink.cursor(), 1);
    }

    #[tokio::test]
    async fn test_dispose_releases_blocks() {
        let mut sink = VolatileSink::new();
        sink.append(Bytes::from_static(b"aa")).await.unwrap();

        sink.dispose().await.unwrap();
        sink.dispose().await.unwrap();

        assert_eq!(sink.cursor(), 0);
        assert!(matches!(sink.read_all().await, Err(Error::Disposed)));
        assert!(matches!(
            sink.append(Bytes::new()).await,
            Err(Error::Disposed)
        ));
    }
}
