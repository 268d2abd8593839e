// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! Progress reporting and cancellation.
//!
//! Progress is a single number across all entries: each entry contributes at
//! most 1.0, so a run over `n` entries ends at `(n, n)`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{PipelineError, Result};

/// Progress callback, called with `(accumulated, total)`.
pub type ProgressFn = Arc<dyn Fn(f64, f64) + Send + Sync>;

/// Shared cancellation request, observed at every suspension point of a run.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`PipelineError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

pub struct ProgressTracker {
    total: usize,
    finished: usize,
    current: f64,
    callback: Option<ProgressFn>,
}

impl ProgressTracker {
    pub fn new(total: usize, callback: Option<ProgressFn>) -> Self {
        Self {
            total,
            finished: 0,
            current: 0.0,
            callback,
        }
    }

    pub fn accumulated(&self) -> f64 {
        self.finished as f64 + self.current
    }

    /// Add `fraction` of an entry to the current entry, which never exceeds 1.0.
    pub fn advance(&mut self, fraction: f64) {
        if fraction.is_nan() || fraction <= 0.0 {
            return;
        }
        let next = (self.current + fraction).min(1.0);
        if next > self.current {
            self.current = next;
            self.report();
        }
    }

    /// Account for `bytes` of an entry declared to be `declared` bytes long.
    pub fn advance_bytes(&mut self, bytes: u64, declared: u64) {
        if declared > 0 {
            self.advance(bytes as f64 / declared as f64);
        }
    }

    /// Top the current entry up to exactly 1.0 and move to the next one.
    pub fn finish_entry(&mut self) {
        self.finished += 1;
        self.current = 0.0;
        self.report();
    }

    /// Report `(total, total)`.
    pub fn complete(&mut self) {
        self.finished = self.total;
        self.current = 0.0;
        self.report();
    }

    fn report(&self) {
        if let Some(callback) = &self.callback {
            callback(self.accumulated(), self.total as f64);
        }
    }
}

/// Synthetic progress that slows down as it approaches, but never reaches, 1.0.
///
/// Each step takes a random 5 to 25 percent of what is left.
#[derive(Debug, Clone)]
pub struct PseudoProgress {
    remaining: f64,
}

impl Default for PseudoProgress {
    fn default() -> Self {
        Self { remaining: 1.0 }
    }
}

impl PseudoProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_step(&mut self) -> f64 {
        let step = self.remaining * (0.05 + 0.2 * random_unit());
        self.remaining -= step;
        step
    }
}

/// Uniform value in `[0, 1)`; progress is cosmetic, so a failing entropy
/// source just yields the midpoint.
fn random_unit() -> f64 {
    let mut buf = [0u8; 8];
    if getrandom::fill(&mut buf).is_err() {
        return 0.5;
    }
    (u64::from_le_bytes(buf) >> 11) as f64 / (1u64 << 53) as f64
}
