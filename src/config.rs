// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Engine configuration.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! `SOUNDPOOL_*` environment variables.
use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;

use crate::pool_file::PoolFileOptions;

mod error;

pub use error::ConfigError;

/// Samples summarized by one cached peak chunk.
pub const DEFAULT_PEAK_CHUNK_SIZE: u64 = 500;

/// Largest extent handed out in one piece when a channel grows.
pub const DEFAULT_MAX_SEGMENT_BYTES: u64 = 4 << 20;

/// A YAML representation of the engine settings.
#[derive(Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory that holds working files. Defaults to the system temp dir.
    working_dir: Option<PathBuf>,

    /// Samples per peak chunk.
    peak_chunk_size: u64,

    /// Upper bound on document length in samples, if any.
    max_length: Option<u64>,

    /// Largest extent allocated in one piece, in bytes.
    max_segment_bytes: u64,

    /// Whether checkpoints are flushed to stable storage.
    sync: bool,

    /// Whether every structural edit ends with a checkpoint.
    auto_checkpoint: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            working_dir: None,
            peak_chunk_size: DEFAULT_PEAK_CHUNK_SIZE,
            max_length: None,
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            sync: true,
            auto_checkpoint: true,
        }
    }
}

impl EngineConfig {
    /// Loads the configuration from an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml));
        }
        let config: EngineConfig = builder
            .add_source(Environment::with_prefix("SOUNDPOOL").try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses the configuration from a YAML string, ignoring the environment.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.peak_chunk_size == 0 {
            return Err(ConfigError::Invalid {
                field: "peak_chunk_size",
                message: "must be at least 1".into(),
            });
        }
        if self.max_segment_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_segment_bytes",
                message: "must be at least 1".into(),
            });
        }
        if self.max_length == Some(0) {
            return Err(ConfigError::Invalid {
                field: "max_length",
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Gets the working directory.
    pub fn working_dir(&self) -> PathBuf {
        self.working_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn peak_chunk_size(&self) -> u64 {
        self.peak_chunk_size
    }

    pub fn max_length(&self) -> Option<u64> {
        self.max_length
    }

    pub fn max_segment_bytes(&self) -> u64 {
        self.max_segment_bytes
    }

    pub fn sync(&self) -> bool {
        self.sync
    }

    pub fn auto_checkpoint(&self) -> bool {
        self.auto_checkpoint
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_peak_chunk_size(mut self, chunk_size: u64) -> Self {
        self.peak_chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_max_length(mut self, max_length: Option<u64>) -> Self {
        self.max_length = max_length.map(|length| length.max(1));
        self
    }

    pub fn with_max_segment_bytes(mut self, bytes: u64) -> Self {
        self.max_segment_bytes = bytes.max(1);
        self
    }

    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn with_auto_checkpoint(mut self, auto_checkpoint: bool) -> Self {
        self.auto_checkpoint = auto_checkpoint;
        self
    }

    /// Pool file settings derived from this config.
    pub fn pool_file_options(&self) -> PoolFileOptions {
        PoolFileOptions {
            max_segment_bytes: self.max_segment_bytes,
            sync: self.sync,
        }
    }
}
