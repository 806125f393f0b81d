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

const DEFAULT_DEVICE: &str = "default";
const DEFAULT_CHANNELS: u16 = 2;
const DEFAULT_THREAD_PRIORITY: u8 = 70;

/// Frames used for the schedule-ahead when neither a latency nor a buffer
/// size is configured.
pub const DEFAULT_SCHEDULE_FRAMES: u32 = 512;

/// A YAML representation of the audio configuration.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Audio {
    /// The output device. "default" picks the host default, "mock*" the
    /// manual-clock backend.
    device: String,

    /// Output sample rate in Hz. Unset means the device's default.
    sample_rate: Option<u32>,

    /// Output channel count (default: 2).
    channels: Option<u16>,

    /// Fixed device buffer size in frames. Unset lets the backend choose.
    buffer_size: Option<u32>,

    /// Schedule-ahead applied to new voices, e.g. "10ms". Defaults to one
    /// device buffer.
    latency: Option<String>,

    /// Priority (0-99) the output callback thread is raised to. Default 70.
    thread_priority: Option<u8>,

    /// Whether to request realtime (SCHED_FIFO) scheduling for the output
    /// callback thread where the platform supports it. Default true.
    realtime: Option<bool>,
}

impl Default for Audio {
    fn default() -> Self {
        Audio::new(DEFAULT_DEVICE)
    }
}

impl Audio {
    /// New will create a new Audio configuration.
    pub fn new(device: &str) -> Audio {
        Audio {
            device: device.to_string(),
            sample_rate: None,
            channels: None,
            buffer_size: None,
            latency: None,
            thread_priority: None,
            realtime: None,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns true if this configuration selects the mock backend.
    pub fn is_mock(&self) -> bool {
        self.device.starts_with("mock")
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    /// Returns the output channel count (default: 2, never zero).
    pub fn channels(&self) -> u16 {
        self.channels.unwrap_or(DEFAULT_CHANNELS).max(1)
    }

    pub fn buffer_size(&self) -> Option<u32> {
        self.buffer_size.filter(|size| *size > 0)
    }

    /// Returns the configured latency, if any.
    pub fn latency(&self) -> Result<Option<Duration>, ConfigError> {
        self.latency
            .as_deref()
            .map(|latency| parse_duration("audio.latency", latency))
            .transpose()
    }

    /// Returns the schedule-ahead in frames at the given sample rate.
    pub fn latency_frames(&self, sample_rate: u32) -> Result<u64, ConfigError> {
        Ok(match self.latency()? {
            Some(latency) => (latency.as_secs_f64() * sample_rate as f64).round() as u64,
            None => u64::from(self.buffer_size().unwrap_or(DEFAULT_SCHEDULE_FRAMES)),
        })
    }

    /// Returns the callback thread priority, rejecting values above 99.
    pub fn thread_priority(&self) -> Result<u8, ConfigError> {
        match self.thread_priority {
            Some(priority) if priority > 99 => Err(ConfigError::Invalid {
                field: "audio.thread_priority",
                reason: format!("{} is outside 0-99", priority),
            }),
            Some(priority) => Ok(priority),
            None => Ok(DEFAULT_THREAD_PRIORITY),
        }
    }

    pub fn realtime(&self) -> bool {
        self.realtime.unwrap_or(true)
    }

    /// Builder-style setters, mostly for tests and the CLI.
    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = Some(sample_rate);
        self
    }

    pub fn with_channels(mut self, channels: u16) -> Self {
        self.channels = Some(channels);
        self
    }

    pub fn with_latency(mut self, latency: &str) -> Self {
        self.latency = Some(latency.to_string());
        self
    }

    pub fn with_thread_priority(mut self, priority: u8) -> Self {
        self.thread_priority = Some(priority);
        self
    }

    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = Some(realtime);
        self
    }
}
