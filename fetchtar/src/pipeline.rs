// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! The entry pipeline.
//!
//! Entries are processed strictly in order. For each one the resource is
//! fetched, its name resolved and checked, and its blocks appended to the
//! sink:
//!
//! - Streamed bodies get a zero placeholder header first. Chunks are stored
//!   as they arrive, and the placeholder is overwritten with the real header
//!   once the transferred length is known.
//! - Whole bodies are awaited while pseudo-progress ticks, then written as
//!   header, content and padding.
//!
//! Any failure aborts the run. [`Pipeline::spawn`] always disposes the sink
//! afterwards, once the result has been handed to the caller.

use std::fmt;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use fetchtar_archive::{
    FileHeader, check_name, encode_block, encode_padding, end_of_archive, padding_len,
};
use fetchtar_sink::ChunkSink;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use tokio::io::AsyncWrite;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::entry::Entry;
use crate::error::{PipelineError, Result};
use crate::fetch::{Body, Fetch, Response, ResponseMeta};
use crate::progress::{CancelFlag, ProgressFn, ProgressTracker, PseudoProgress};
use crate::reader::{ChunkConsumer, drain};

/// Default interval between pseudo-progress ticks for whole bodies.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Clone)]
pub struct PipelineOptions {
    /// Return the raw content instead of an archive when there is exactly
    /// one entry.
    pub unpack_single: bool,
    /// Append the two zero blocks that formally end an archive.
    pub terminate_archive: bool,
    pub progress_interval: Duration,
    pub on_progress: Option<ProgressFn>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            unpack_single: false,
            terminate_archive: false,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            on_progress: None,
        }
    }
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("unpack_single", &self.unpack_single)
            .field("terminate_archive", &self.terminate_archive)
            .field("progress_interval", &self.progress_interval)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveResult {
    pub archive: Bytes,
    /// Name of the single entry whose raw content is in `archive`, when
    /// single-file unwrapping applied.
    pub unpacked_name: Option<String>,
}

/// Name and transferred size of a packed entry.
#[derive(Debug)]
struct PackedEntry {
    name: String,
    size: u64,
}

/// Stores body chunks of a streamed entry as they arrive.
struct EntryWriter<'a, S> {
    sink: &'a mut S,
    cancel: &'a CancelFlag,
    tracker: &'a mut ProgressTracker,
    declared: Option<u64>,
    pseudo: PseudoProgress,
    size: u64,
}

impl<S: ChunkSink> ChunkConsumer for EntryWriter<'_, S> {
    type Error = PipelineError;

    async fn consume(&mut self, chunk: Bytes) -> Result<()> {
        self.cancel.check()?;
        let len = chunk.len() as u64;
        let position = self.sink.append(chunk).await?;
        self.size += len;
        match self.declared {
            Some(declared) => self.tracker.advance_bytes(len, declared),
            None => self.tracker.advance(self.pseudo.next_step()),
        }
        trace!(position, len, total = self.size, "Stored body chunk");
        Ok(())
    }
}

pub struct Pipeline<F> {
    fetcher: F,
    options: PipelineOptions,
}

impl<F: Fetch> Pipeline<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            fetcher,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Pack `entries` into `sink` and return the finished archive.
    ///
    /// The sink is not disposed; callers that own it are responsible for
    /// that.
    pub async fn build<S: ChunkSink>(
        &self,
        entries: &[Entry],
        sink: &mut S,
        cancel: &CancelFlag,
    ) -> Result<ArchiveResult> {
        let mut tracker = ProgressTracker::new(entries.len(), self.options.on_progress.clone());
        let packed = self.pack_entries(entries, sink, cancel, &mut tracker).await?;
        if sink.cursor() == 0 {
            return Err(PipelineError::EmptyResult);
        }

        let result = match (self.options.unpack_single, packed.as_slice()) {
            (true, [only]) => ArchiveResult {
                archive: unpacked_content(sink, only.size).await?,
                unpacked_name: Some(only.name.clone()),
            },
            _ => {
                self.terminate(sink).await?;
                ArchiveResult {
                    archive: sink.materialize().await?,
                    unpacked_name: None,
                }
            }
        };
        tracker.complete();
        Ok(result)
    }

    /// Pack `entries` into `sink` and stream the archive into `writer`.
    ///
    /// Never unwraps a single entry. The archive is copied out of the sink
    /// without being materialized, so a durable sink keeps memory use flat.
    /// Returns the number of bytes written.
    pub async fn write_to<S, W>(
        &self,
        entries: &[Entry],
        sink: &mut S,
        cancel: &CancelFlag,
        writer: &mut W,
    ) -> Result<u64>
    where
        S: ChunkSink,
        W: AsyncWrite + Unpin + Send,
    {
        let mut tracker = ProgressTracker::new(entries.len(), self.options.on_progress.clone());
        self.pack_entries(entries, sink, cancel, &mut tracker).await?;
        if sink.cursor() == 0 {
            return Err(PipelineError::EmptyResult);
        }
        self.terminate(sink).await?;
        cancel.check()?;
        let written = sink.copy_to(writer).await?;
        tracker.complete();
        Ok(written)
    }

    async fn terminate<S: ChunkSink>(&self, sink: &mut S) -> Result<()> {
        if self.options.terminate_archive {
            sink.append(end_of_archive()).await?;
        }
        Ok(())
    }

    async fn pack_entries<S: ChunkSink>(
        &self,
        entries: &[Entry],
        sink: &mut S,
        cancel: &CancelFlag,
        tracker: &mut ProgressTracker,
    ) -> Result<Vec<PackedEntry>> {
        let mut packed = Vec::with_capacity(entries.len());
        for entry in entries {
            cancel.check()?;
            let Response { meta, body } = self.fetch(&entry.source).await?;

            let name = entry.name.resolve(&meta).await;
            check_name(&name)?;

            let size = match body {
                Body::Stream(stream) => {
                    pack_stream(&name, &meta, stream, sink, cancel, tracker).await?
                }
                Body::Whole(body) => {
                    let interval = self.options.progress_interval;
                    pack_whole(&name, &meta, body, interval, sink, cancel, tracker).await?
                }
            };
            tracker.finish_entry();
            debug!(name = %name, size, source = %entry.source, "Packed entry");
            packed.push(PackedEntry { name, size });
        }
        Ok(packed)
    }

    async fn fetch(&self, url: &str) -> Result<Response> {
        let response = self
            .fetcher
            .fetch(url)
            .await
            .map_err(|e| PipelineError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if !response.meta.ok {
            return Err(PipelineError::Fetch {
                url: url.to_string(),
                reason: format!("response status {}", response.meta.status),
            });
        }
        Ok(response)
    }
}

async fn pack_stream<S: ChunkSink>(
    name: &str,
    meta: &ResponseMeta,
    stream: BoxStream<'static, std::io::Result<Bytes>>,
    sink: &mut S,
    cancel: &CancelFlag,
    tracker: &mut ProgressTracker,
) -> Result<u64> {
    let placeholder = sink.append(encode_block()).await?;

    let mut writer = EntryWriter {
        sink: &mut *sink,
        cancel,
        tracker,
        declared: meta.content_length,
        pseudo: PseudoProgress::new(),
        size: 0,
    };
    drain(stream, &mut writer)
        .await
        .map_err(|e| e.for_url(&meta.url))?;
    let size = writer.size;

    let padding = padding_len(size);
    if padding > 0 {
        sink.append(encode_padding(padding)).await?;
    }
    let header = FileHeader::new(name, size).encode()?;
    sink.overwrite(placeholder, Bytes::copy_from_slice(&header))
        .await?;
    Ok(size)
}

async fn pack_whole<S: ChunkSink>(
    name: &str,
    meta: &ResponseMeta,
    mut body: BoxFuture<'static, std::io::Result<Bytes>>,
    interval: Duration,
    sink: &mut S,
    cancel: &CancelFlag,
    tracker: &mut ProgressTracker,
) -> Result<u64> {
    let mut ticks = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticks.tick().await;
    let mut pseudo = PseudoProgress::new();

    let content = loop {
        tokio::select! {
            content = &mut body => {
                break content.map_err(|e| PipelineError::Fetch {
                    url: meta.url.clone(),
                    reason: e.to_string(),
                })?;
            }
            _ = ticks.tick() => {
                cancel.check()?;
                tracker.advance(pseudo.next_step());
            }
        }
    };
    cancel.check()?;

    let size = content.len() as u64;
    let header = FileHeader::new(name, size).encode()?;
    sink.append(Bytes::copy_from_slice(&header)).await?;
    if !content.is_empty() {
        sink.append(content).await?;
    }
    let padding = padding_len(size);
    if padding > 0 {
        sink.append(encode_padding(padding)).await?;
    }
    Ok(size)
}

impl<F: Fetch + 'static> Pipeline<F> {
    /// Run on a background task that owns `sink`.
    ///
    /// The task delivers the result, yields once so the caller can observe
    /// it, then disposes the sink whatever the outcome.
    pub fn spawn<S>(self, entries: Vec<Entry>, sink: S) -> PipelineHandle
    where
        S: ChunkSink + 'static,
    {
        let cancel = CancelFlag::new();
        let flag = cancel.clone();
        let (tx, rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut sink = sink;
            let result = self.build(&entries, &mut sink, &flag).await;
            if let Err(e) = &result {
                debug!("Pipeline failed: {e}");
            }
            // a dropped handle does not stop the cleanup below
            let _ = tx.send(result);
            tokio::task::yield_now().await;
            if let Err(e) = sink.dispose().await {
                warn!("Failed to dispose sink: {e}");
            }
        });

        PipelineHandle {
            cancel,
            result: rx,
            task,
        }
    }
}

/// Handle to a spawned pipeline run.
#[derive(Debug)]
pub struct PipelineHandle {
    cancel: CancelFlag,
    result: oneshot::Receiver<Result<ArchiveResult>>,
    task: JoinHandle<()>,
}

impl PipelineHandle {
    /// Request cancellation; the run fails with [`PipelineError::Cancelled`]
    /// at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A flag that cancels this run, for use after the handle is consumed.
    pub fn canceller(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Wait for the result. Disposal of the sink may still be in progress.
    pub async fn result(self) -> Result<ArchiveResult> {
        self.result.await.map_err(|_| PipelineError::Aborted)?
    }

    /// Wait for the result and for the sink to be disposed.
    pub async fn join(self) -> Result<ArchiveResult> {
        let result = self.result.await;
        if let Err(e) = self.task.await {
            warn!("Pipeline task failed: {e}");
        }
        result.map_err(|_| PipelineError::Aborted)?
    }
}

/// Content of the only entry in `sink`: every block between its header and
/// its padding.
async fn unpacked_content<S: ChunkSink>(sink: &S, size: u64) -> Result<Bytes> {
    let blocks = sink.read_all().await?;
    let padded = usize::from(padding_len(size) > 0);
    let body = blocks
        .get(1..blocks.len().saturating_sub(padded))
        .unwrap_or_default();
    if let [block] = body {
        return Ok(block.clone());
    }
    let mut content = BytesMut::with_capacity(body.iter().map(Bytes::len).sum());
    for block in body {
        content.extend_from_slice(block);
    }
    Ok(content.freeze())
}
