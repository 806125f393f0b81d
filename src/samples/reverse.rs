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

//! Reversed copies of pad buffers, built on first use.

use std::sync::{Arc, Weak};

use tracing::debug;

use super::store::PAD_COUNT;
use crate::audio::PcmBuffer;

/// Returns a new buffer with every channel's samples in reverse order.
pub fn get_reversed(buffer: &PcmBuffer) -> PcmBuffer {
    buffer.reversed()
}

struct Entry {
    /// The buffer this entry was built from. Weak so a replaced buffer can be
    /// freed while the stale entry waits to be overwritten.
    original: Weak<PcmBuffer>,
    reversed: Arc<PcmBuffer>,
}

impl Entry {
    fn matches(&self, buffer: &Arc<PcmBuffer>) -> bool {
        self.original.as_ptr() == Arc::as_ptr(buffer) && self.original.strong_count() > 0
    }
}

/// One memoised reversal per pad, keyed by buffer identity.
#[derive(Default)]
pub struct ReversalCache {
    entries: [Option<Entry>; PAD_COUNT],
}

impl ReversalCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the reversed form of `buffer` for `pad`, reusing the cached
    /// copy when it was built from this same buffer.
    pub fn get(&mut self, pad: usize, buffer: &Arc<PcmBuffer>) -> Arc<PcmBuffer> {
        let Some(entry) = self.entries.get_mut(pad) else {
            return Arc::new(get_reversed(buffer));
        };
        if let Some(cached) = entry.as_ref().filter(|e| e.matches(buffer)) {
            return cached.reversed.clone();
        }

        debug!(pad, frames = buffer.frames(), "Building reversed buffer");
        let reversed = Arc::new(get_reversed(buffer));
        *entry = Some(Entry {
            original: Arc::downgrade(buffer),
            reversed: reversed.clone(),
        });
        reversed
    }

    /// Drops the pad's entry. Called whenever the pad's buffer is replaced.
    pub fn invalidate(&mut self, pad: usize) {
        if let Some(entry) = self.entries.get_mut(pad) {
            *entry = None;
        }
    }

    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            *entry = None;
        }
    }

    /// Bytes held by cached reversals.
    pub fn memory_usage(&self) -> usize {
        self.entries
            .iter()
            .flatten()
            .map(|e| e.reversed.memory_size())
            .sum()
    }
}
