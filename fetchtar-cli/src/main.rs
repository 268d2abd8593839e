// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

mod config;
mod error;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fetchtar::{CancelFlag, FileFetcher, Pipeline, PipelineOptions, ProgressFn};
use fetchtar_sink::{AnySink, ChunkSink, open_sink};
use tokio::io::BufWriter;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::{IoErrorContext, Result};

fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Logs every ten percent of overall progress.
fn progress_logger() -> ProgressFn {
    let last_decile = AtomicU64::new(0);
    Arc::new(move |done, total| {
        let percent = if total > 0.0 {
            (done / total * 100.0) as u64
        } else {
            100
        };
        let decile = percent / 10;
        if last_decile.fetch_max(decile, Ordering::Relaxed) < decile {
            info!("{percent}% done");
        }
    })
}

/// Remove an output file left behind by a failed run.
async fn discard_incomplete(output: &Path) {
    match tokio::fs::remove_file(output).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove incomplete {}: {e}", output.display()),
    }
}

async fn write_unpacked(output: &Path, content: &[u8]) -> Result<()> {
    let written = tokio::fs::write(output, content)
        .await
        .io_context(format!("Failed to write {}", output.display()));
    if written.is_err() {
        discard_incomplete(output).await;
    }
    written
}

async fn build_output(
    config: &Config,
    sink: &mut AnySink,
    cancel: &CancelFlag,
) -> Result<()> {
    let pipeline = Pipeline::new(FileFetcher::new()).with_options(PipelineOptions {
        on_progress: Some(progress_logger()),
        ..config.pipeline_options()
    });
    let entries = config.entries();
    let output = &config.output;

    if config.unwraps_single() {
        let result = pipeline.build(&entries, sink, cancel).await?;
        write_unpacked(output, &result.archive).await?;
        info!(
            "Wrote {} ({} bytes) to {}",
            result.unpacked_name.as_deref().unwrap_or("content"),
            result.archive.len(),
            output.display()
        );
        return Ok(());
    }

    let file = tokio::fs::File::create(output)
        .await
        .io_context(format!("Failed to create {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    let written = pipeline.write_to(&entries, sink, cancel, &mut writer).await;
    match written {
        Ok(written) => {
            info!(
                "Wrote archive with {} entries ({written} bytes) to {}",
                entries.len(),
                output.display()
            );
            Ok(())
        }
        Err(e) => {
            // no partial archives
            drop(writer);
            discard_incomplete(output).await;
            Err(e.into())
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let mut sink = open_sink(&config.sink_config())?;
    info!(
        entries = config.entries.len(),
        durable = sink.is_durable(),
        "Building {}",
        config.output.display()
    );

    let cancel = CancelFlag::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            canceller.cancel();
        }
    });

    let outcome = build_output(&config, &mut sink, &cancel).await;
    if let Err(e) = sink.dispose().await {
        warn!("Failed to dispose sink: {e}");
    }
    outcome
}

#[tokio::main]
async fn main() -> ExitCode {
    let path = config::config_path(std::env::args().nth(1));
    let config = Config::load(&path);
    init_logging(config.as_ref().map_or("info", |c| c.log_level.as_str()));

    let result = match config {
        Ok(config) => run(config).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
