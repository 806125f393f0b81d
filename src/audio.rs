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

use std::{error::Error, fmt, sync::Arc};

use crate::config;

pub mod analysis;
pub mod buffer;
pub mod bus;
pub mod cpal;
pub mod decode;
pub mod envelope;
pub mod error;
pub mod mock;
mod thread_priority;

pub use analysis::{AnalysisTap, DEFAULT_ANALYSIS_SIZE};
pub use buffer::PcmBuffer;
pub use bus::{BusEvent, BusSource, MasterBus, Route};
pub use decode::decode_bytes;
pub use envelope::Envelope;
pub use error::DecodeError;

/// A running output backend. Dropping or closing it stops rendering the bus.
pub trait Output: fmt::Display + Send {
    /// The sample rate the bus is rendered at.
    fn sample_rate(&self) -> u32;

    /// Returns true if nothing renders the bus on its own; callers advance
    /// time with `MasterBus::render`.
    fn is_manual(&self) -> bool {
        false
    }

    /// Stops rendering. Idempotent.
    fn close(&mut self);
}

/// A device as reported by `list_devices`.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// Lists output devices known to cpal.
pub fn list_devices() -> Result<Vec<DeviceInfo>, Box<dyn Error>> {
    cpal::list()
}

/// Creates the master bus and starts the backend that renders it.
pub fn open_output(
    config: &config::Audio,
    analysis_size: usize,
) -> Result<(Arc<MasterBus>, Box<dyn Output>), Box<dyn Error>> {
    if config.is_mock() {
        let (bus, output) = mock::Output::open(config, analysis_size)?;
        return Ok((bus, Box::new(output)));
    }

    let (bus, output) = cpal::Output::open(config, analysis_size)?;
    Ok((bus, Box::new(output)))
}
