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

use std::time::Duration;

use serde::Deserialize;

use super::error::{parse_duration, ConfigError};
use crate::audio::DEFAULT_ANALYSIS_SIZE;

const DEFAULT_CHUNK_INTERVAL: &str = "100ms";

/// Bus recording.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Recorder {
    /// When false, recording is reported as unavailable.
    enabled: bool,

    /// How often captured audio is cut into an encoded chunk.
    chunk_interval: String,
}

impl Default for Recorder {
    fn default() -> Self {
        Recorder {
            enabled: true,
            chunk_interval: DEFAULT_CHUNK_INTERVAL.to_string(),
        }
    }
}

impl Recorder {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn disabled() -> Recorder {
        Recorder {
            enabled: false,
            ..Default::default()
        }
    }

    pub fn chunk_interval(&self) -> Result<Duration, ConfigError> {
        let interval = parse_duration("recorder.chunk_interval", &self.chunk_interval)?;
        if interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "recorder.chunk_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(interval)
    }
}

/// The bus analysis tap.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Analysis {
    /// Number of samples returned by a time-domain snapshot.
    size: usize,
}

impl Default for Analysis {
    fn default() -> Self {
        Analysis {
            size: DEFAULT_ANALYSIS_SIZE,
        }
    }
}

impl Analysis {
    pub fn size(&self) -> usize {
        self.size.max(1)
    }
}
