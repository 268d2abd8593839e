// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! Ordered block storage for archives under construction.
//!
//! An archive is assembled as a sequence of blocks: headers, content chunks
//! and padding. [`ChunkSink`] stores that sequence and lets a header that was
//! reserved up front be written once the real content length is known.
//!
//! Two backends exist:
//!
//! - [`VolatileSink`] keeps blocks in memory.
//! - [`DurableSink`] writes them to a per-sink SQLite database in a scratch
//!   directory, so the archive never has to fit in memory. Stores left behind
//!   by crashed runs are tracked in a [`StoreRegistry`] and expire after
//!   [`DEFAULT_STORE_TTL`].
//!
//! [`open_sink`] picks a backend from a [`SinkConfig`].

pub mod durable;
mod error;
mod factory;
pub mod registry;
pub mod schema;
mod sink;
mod volatile;

pub use durable::DurableSink;
pub use error::{Error, Result};
pub use factory::{AnySink, SinkConfig, SinkKind, open_sink};
pub use registry::{DEFAULT_STORE_TTL, StoreRegistry};
pub use sink::ChunkSink;
pub use volatile::VolatileSink;
