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

//! The sixteen pad slots and the buffers loaded into them.

use std::sync::Arc;

use tracing::debug;

use crate::audio::PcmBuffer;

/// Number of pads. Fixed; slots never grow or shrink.
pub const PAD_COUNT: usize = 16;

/// Returns true if `pad` addresses a slot.
pub fn valid_pad(pad: usize) -> bool {
    pad < PAD_COUNT
}

/// What is loaded into a pad.
#[derive(Clone, Default)]
pub struct PadSlot {
    buffer: Option<Arc<PcmBuffer>>,
    /// Where the buffer came from. Kept for persistence, never used for playback.
    source_ref: Option<String>,
}

impl PadSlot {
    pub fn buffer(&self) -> Option<&Arc<PcmBuffer>> {
        self.buffer.as_ref()
    }

    pub fn source_ref(&self) -> Option<&str> {
        self.source_ref.as_deref()
    }
}

/// Owns one decoded buffer per pad.
#[derive(Default)]
pub struct SampleStore {
    slots: [PadSlot; PAD_COUNT],
}

impl SampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, pad: usize) -> Option<&PadSlot> {
        self.slots.get(pad)
    }

    pub fn buffer(&self, pad: usize) -> Option<&Arc<PcmBuffer>> {
        self.slot(pad).and_then(PadSlot::buffer)
    }

    pub fn source_ref(&self, pad: usize) -> Option<&str> {
        self.slot(pad).and_then(PadSlot::source_ref)
    }

    pub fn has_sound(&self, pad: usize) -> bool {
        self.buffer(pad).is_some()
    }

    /// Replaces the pad's buffer and source ref together. Returns false for
    /// an out-of-range pad.
    pub fn set(&mut self, pad: usize, buffer: Arc<PcmBuffer>, source_ref: &str) -> bool {
        let Some(slot) = self.slots.get_mut(pad) else {
            return false;
        };
        slot.buffer = Some(buffer);
        slot.source_ref = Some(source_ref.to_string());
        true
    }

    pub fn clear(&mut self, pad: usize) -> bool {
        let Some(slot) = self.slots.get_mut(pad) else {
            return false;
        };
        *slot = PadSlot::default();
        true
    }

    pub fn clear_all(&mut self) {
        debug!("Clearing all pad buffers");
        for slot in self.slots.iter_mut() {
            *slot = PadSlot::default();
        }
    }

    /// Returns the bytes held by loaded buffers.
    pub fn memory_usage(&self) -> usize {
        self.slots
            .iter()
            .filter_map(PadSlot::buffer)
            .map(|b| b.memory_size())
            .sum()
    }
}
