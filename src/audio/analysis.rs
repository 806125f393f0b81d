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

//! Read-only time-domain view of the master bus for oscilloscope rendering.

use parking_lot::Mutex;

/// Default number of samples in a snapshot.
pub const DEFAULT_ANALYSIS_SIZE: usize = 2048;

/// Keeps the most recent `size` mono samples written by the render thread.
pub struct AnalysisTap {
    ring: Mutex<Ring>,
}

struct Ring {
    samples: Vec<f32>,
    /// Next write index; also the oldest sample once the ring has wrapped.
    write_pos: usize,
}

impl AnalysisTap {
    pub fn new(size: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                samples: vec![0.0; size.max(1)],
                write_pos: 0,
            }),
        }
    }

    /// Pushes an interleaved block, down-mixing each frame to mono.
    pub fn write_interleaved(&self, block: &[f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let mut ring = self.ring.lock();
        let len = ring.samples.len();
        for frame in block.chunks_exact(channels) {
            let mono = frame.iter().sum::<f32>() / channels as f32;
            let pos = ring.write_pos;
            ring.samples[pos] = mono;
            ring.write_pos = (pos + 1) % len;
        }
    }

    /// Returns the last `size` samples, oldest first.
    pub fn snapshot(&self) -> Vec<f32> {
        let ring = self.ring.lock();
        let mut out = Vec::with_capacity(ring.samples.len());
        out.extend_from_slice(&ring.samples[ring.write_pos..]);
        out.extend_from_slice(&ring.samples[..ring.write_pos]);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_fixed_size() {
        let tap = AnalysisTap::new(8);
        assert_eq!(tap.snapshot(), vec![0.0; 8]);
        tap.write_interleaved(&[1.0, 1.0], 2);
        assert_eq!(tap.snapshot().len(), 8);
    }

    #[test]
    fn test_snapshot_order_after_wrap() {
        let tap = AnalysisTap::new(4);
        tap.write_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 1);
        assert_eq!(tap.snapshot(), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_downmix() {
        let tap = AnalysisTap::new(2);
        tap.write_interleaved(&[1.0, 0.0, 0.5, 0.5], 2);
        assert_eq!(tap.snapshot(), vec![0.5, 0.5]);
    }
}
