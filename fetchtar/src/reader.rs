// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! Drains a body stream into a consumer, one chunk at a time.

use std::future::Future;
use std::io;
use std::pin::pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};

/// Receives the chunks of a drained stream.
pub trait ChunkConsumer: Send {
    type Error: From<io::Error>;

    fn consume(&mut self, chunk: Bytes) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Feed every non-empty chunk of `stream` to `consumer`, in order.
///
/// The next chunk is not requested before the consumer has finished with the
/// previous one. A stream or consumer error ends the drain immediately.
/// Returns the number of chunks consumed.
pub async fn drain<S, C>(stream: S, consumer: &mut C) -> Result<u64, C::Error>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
    C: ChunkConsumer,
{
    let mut stream = pin!(stream);
    let mut consumed = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if chunk.is_empty() {
            continue;
        }
        consumer.consume(chunk).await?;
        consumed += 1;
    }
    Ok(consumed)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::stream;

    use super::*;

    #[derive(Default)]
    struct Collect {
        chunks: Vec<Bytes>,
        fail_on: Option<usize>,
    }

    impl ChunkConsumer for Collect {
        type Error = io::Error;

        async fn consume(&mut self, chunk: Bytes) -> io::Result<()> {
            if self.fail_on == Some(self.chunks.len()) {
                return Err(io::Error::other("consumer refused"));
            }
            self.chunks.push(chunk);
            Ok(())
        }
    }

    fn chunks(items: &[&'static [u8]]) -> Vec<io::Result<Bytes>> {
        items.iter().map(|c| Ok(Bytes::from_static(c))).collect()
    }

    #[tokio::test]
    async fn test_order_and_empty_chunks() {
        let mut consumer = Collect::default();
        let items = chunks(&[b"ab", b"", b"cd", b""]);

        let consumed = drain(stream::iter(items), &mut consumer).await.unwrap();
        assert_eq!(consumed, 2);
        assert_eq!(consumer.chunks, vec![&b"ab"[..], &b"cd"[..]]);
    }

    #[tokio::test]
    async fn test_stream_error_stops() {
        let mut consumer = Collect::default();
        let items = vec![
            Ok(Bytes::from_static(b"ab")),
            Err(io::Error::other("connection reset")),
            Ok(Bytes::from_static(b"cd")),
        ];

        let err = drain(stream::iter(items), &mut consumer).await.unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
        assert_eq!(consumer.chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_consumer_error_stops_polling() {
        let polled = Arc::new(AtomicUsize::new(0));
        let counter = polled.clone();
        let items = stream::iter(chunks(&[b"a", b"b", b"c", b"d"])).inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let mut consumer = Collect {
            fail_on: Some(1),
            ..Collect::default()
        };

        assert!(drain(items, &mut consumer).await.is_err());
        assert_eq!(consumer.chunks.len(), 1);
        assert_eq!(polled.load(Ordering::SeqCst), 2);
    }
}
