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

//! Fetch, decode and resample.
//!
//! Buffers are decoded entirely into memory so a pad can start instantly.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::error::LoadError;
use super::fetch::Fetcher;
use crate::audio::{decode_bytes, PcmBuffer};

/// Produces ready-to-play buffers from source refs or raw bytes.
#[derive(Clone)]
pub struct SampleLoader {
    fetcher: Fetcher,
    /// Rate of the bus buffers are converted to. None keeps the decoded rate;
    /// voices then compensate while rendering.
    target_sample_rate: Option<u32>,
}

impl SampleLoader {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            target_sample_rate: None,
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn target_sample_rate(&self) -> Option<u32> {
        self.target_sample_rate
    }

    pub fn set_target_sample_rate(&mut self, sample_rate: Option<u32>) {
        self.target_sample_rate = sample_rate;
    }

    /// Fetches and decodes `source_ref`.
    pub async fn load(&self, source_ref: &str) -> Result<Arc<PcmBuffer>, LoadError> {
        let bytes = self.fetcher.fetch(source_ref).await?;
        self.decode(bytes, source_ref)
    }

    /// Decodes caller-supplied bytes. `source_ref` only provides a format hint.
    pub fn decode(&self, bytes: Vec<u8>, source_ref: &str) -> Result<Arc<PcmBuffer>, LoadError> {
        let size = bytes.len();
        let decoded = decode_bytes(bytes, extension_hint(source_ref))?;

        let buffer = match self.target_sample_rate {
            Some(target) if target != decoded.sample_rate() => {
                debug!(
                    source_rate = decoded.sample_rate(),
                    target_rate = target,
                    "Transcoding sample"
                );
                decoded.resampled(target)
            }
            _ => decoded,
        };

        info!(
            source_ref,
            bytes = size,
            channels = buffer.channel_count(),
            sample_rate = buffer.sample_rate(),
            duration_ms = Duration::from_secs_f64(buffer.duration_secs()).as_millis() as u64,
            memory_kb = buffer.memory_size() / 1024,
            "Sample loaded"
        );
        Ok(Arc::new(buffer))
    }
}

/// The file extension of a path or URL, ignoring any query or fragment.
fn extension_hint(source_ref: &str) -> Option<&str> {
    let path = source_ref.split(['?', '#']).next().unwrap_or(source_ref);
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, extension) = name.rsplit_once('.')?;
    (!stem.is_empty() && !extension.is_empty()).then_some(extension)
}
