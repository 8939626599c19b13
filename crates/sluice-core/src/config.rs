// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Start-up configuration of the resource loader.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on the number of resource sets per copy engine.
pub const MAX_RESOURCE_SETS: u32 = 3;

/// Smallest ring buffer a copy engine will create, in bytes.
pub const MIN_STAGING_BUFFER_SIZE: u64 = 32;

/// Errors raised while reading or validating a [`LoaderConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The resource set count is outside `1..=MAX_RESOURCE_SETS`.
    #[error("buffer_count must be between 1 and {MAX_RESOURCE_SETS}, got {0}")]
    InvalidBufferCount(u32),
    /// The staging ring is empty.
    #[error("staging_buffer_size must be greater than zero")]
    EmptyStagingBuffer,
    /// The configuration text could not be parsed.
    #[error("failed to parse loader configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Immutable settings chosen when the loader is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Capacity of each resource set's staging ring, in bytes.
    pub staging_buffer_size: u64,
    /// Number of resource sets rotated by every copy engine.
    pub buffer_count: u32,
    /// Run the streamer inline on the producer thread instead of a worker.
    pub single_threaded: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            staging_buffer_size: 8 << 20,
            buffer_count: 2,
            single_threaded: false,
        }
    }
}

impl LoaderConfig {
    /// Parses a JSON document. Missing fields take their default value.
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: LoaderConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the values can be used to build copy engines.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_count == 0 || self.buffer_count > MAX_RESOURCE_SETS {
            return Err(ConfigError::InvalidBufferCount(self.buffer_count));
        }
        if self.staging_buffer_size == 0 {
            return Err(ConfigError::EmptyStagingBuffer);
        }
        Ok(())
    }

    /// Ring capacity actually allocated per resource set.
    pub fn effective_staging_size(&self) -> u64 {
        self.staging_buffer_size.max(MIN_STAGING_BUFFER_SIZE)
    }
}
