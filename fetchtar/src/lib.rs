// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! Fetch a list of resources into one TAR archive.
//!
//! Each [`Entry`] names a file and the locator it is fetched from. A
//! [`Pipeline`] fetches the entries one after another through a [`Fetch`]
//! implementation and appends header, content and padding blocks to a
//! [`ChunkSink`](fetchtar_sink::ChunkSink). Content is stored chunk by chunk
//! as it arrives, so with a durable sink the archive never has to fit in
//! memory.
//!
//! ```no_run
//! use fetchtar::{Entry, FileFetcher, Pipeline};
//! use fetchtar_sink::VolatileSink;
//!
//! # async fn run() -> fetchtar::Result<()> {
//! let entries = vec![
//!     Entry::new("a.txt", "file:///srv/a.txt"),
//!     Entry::suggested("file:///srv/report.pdf"),
//! ];
//! let handle = Pipeline::new(FileFetcher::new()).spawn(entries, VolatileSink::new());
//! let archive = handle.result().await?.archive;
//! # Ok(())
//! # }
//! ```

pub mod entry;
mod error;
pub mod fetch;
pub mod pipeline;
pub mod progress;
pub mod reader;

pub use entry::{Entry, EntryName};
pub use error::{PipelineError, Result};
pub use fetch::{Body, BodyMode, Fetch, FileFetcher, Response, ResponseMeta};
pub use pipeline::{ArchiveResult, Pipeline, PipelineHandle, PipelineOptions};
pub use progress::{CancelFlag, ProgressFn};
