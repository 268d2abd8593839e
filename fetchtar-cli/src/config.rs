// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

use std::fs::read_to_string;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fetchtar::{Entry, PipelineOptions};
use fetchtar_sink::{SinkConfig, SinkKind};
use serde::Deserialize;

use crate::error::{ConfigError, Result};

/// Environment variable naming the configuration file.
pub(crate) const CONFIG_ENV: &str = "FETCHTAR_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "fetchtar.toml";

fn default_store_ttl_secs() -> u64 {
    30 * 60
}

fn default_progress_interval_ms() -> u64 {
    200
}

fn default_log_level() -> String {
    "info".into()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Storage {
    #[default]
    Auto,
    Volatile,
    Durable,
}

impl From<Storage> for SinkKind {
    fn from(storage: Storage) -> Self {
        match storage {
            Storage::Auto => SinkKind::Auto,
            Storage::Volatile => SinkKind::Volatile,
            Storage::Durable => SinkKind::Durable,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct EntryConfig {
    pub(crate) source: String,
    /// Defaults to the name suggested by the response.
    #[serde(default)]
    pub(crate) name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Config {
    pub(crate) output: PathBuf,
    #[serde(default)]
    pub(crate) unpack_single: bool,
    #[serde(default)]
    pub(crate) terminate_archive: bool,
    #[serde(default)]
    pub(crate) storage: Storage,
    #[serde(default)]
    pub(crate) scratch_dir: Option<PathBuf>,
    #[serde(default = "default_store_ttl_secs")]
    pub(crate) store_ttl_secs: u64,
    #[serde(default = "default_progress_interval_ms")]
    pub(crate) progress_interval_ms: u64,
    #[serde(default = "default_log_level")]
    pub(crate) log_level: String,
    #[serde(default)]
    pub(crate) entries: Vec<EntryConfig>,
}

impl Config {
    pub(crate) fn load(settings_file: &Path) -> Result<Config> {
        let contents = read_to_string(settings_file).map_err(|e| ConfigError::ReadFile {
            path: settings_file.display().to_string(),
            source: e,
        })?;
        Self::parse(&contents)
    }

    pub(crate) fn parse(contents: &str) -> Result<Config> {
        let config: Config = toml::from_str(contents).map_err(ConfigError::from)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        let invalid = |reason: &str| {
            Err(ConfigError::Invalid {
                reason: reason.to_string(),
            })
        };
        if self.output.as_os_str().is_empty() {
            return invalid("output must not be empty");
        }
        if self.entries.is_empty() {
            return invalid("at least one entry is required");
        }
        if self.entries.iter().any(|e| e.source.is_empty()) {
            return invalid("entry source must not be empty");
        }
        if self.progress_interval_ms == 0 {
            return invalid("progress_interval_ms must be greater than 0");
        }
        if self.storage == Storage::Durable && self.scratch_dir.is_none() {
            return invalid("durable storage requires scratch_dir");
        }
        Ok(())
    }

    pub(crate) fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            kind: self.storage.into(),
            scratch_dir: self.scratch_dir.clone(),
            store_ttl: Duration::from_secs(self.store_ttl_secs),
        }
    }

    pub(crate) fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            unpack_single: self.unpack_single,
            terminate_archive: self.terminate_archive,
            progress_interval: Duration::from_millis(self.progress_interval_ms),
            on_progress: None,
        }
    }

    pub(crate) fn entries(&self) -> Vec<Entry> {
        self.entries
            .iter()
            .map(|entry| match &entry.name {
                Some(name) => Entry::new(name.as_str(), entry.source.as_str()),
                None => Entry::suggested(entry.source.as_str()),
            })
            .collect()
    }

    /// Whether the run produces raw content instead of an archive.
    pub(crate) fn unwraps_single(&self) -> bool {
        self.unpack_single && self.entries.len() == 1
    }
}

/// Configuration file from the first argument, else [`CONFIG_ENV`], else
/// `fetchtar.toml` in the working directory.
pub(crate) fn config_path(arg: Option<String>) -> PathBuf {
    arg.or_else(|| std::env::var(CONFIG_ENV).ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}
