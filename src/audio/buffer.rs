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

//! Decoded PCM audio held in memory.

use std::time::Duration;

use super::error::DecodeError;

/// A decoded, immutable block of planar f32 audio.
///
/// Buffers are shared between the pad store, the reversal cache and any
/// voices reading them, so they are always handed around as `Arc<PcmBuffer>`.
#[derive(Clone, Debug, PartialEq)]
pub struct PcmBuffer {
    /// One Vec per channel, all of equal length.
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl PcmBuffer {
    /// Creates a buffer from planar channel data.
    pub fn from_planar(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self, DecodeError> {
        if channels.is_empty() {
            return Err(DecodeError::Malformed("buffer has no channels".to_string()));
        }
        if sample_rate == 0 {
            return Err(DecodeError::Malformed("sample rate must be > 0".to_string()));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(DecodeError::Malformed(
                "channels have differing lengths".to_string(),
            ));
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Creates a buffer from interleaved samples.
    pub fn from_interleaved(
        samples: &[f32],
        channel_count: u16,
        sample_rate: u32,
    ) -> Result<Self, DecodeError> {
        let num_channels = channel_count as usize;
        if num_channels == 0 {
            return Err(DecodeError::Malformed("buffer has no channels".to_string()));
        }
        let frames = samples.len() / num_channels;
        let mut planar = vec![Vec::with_capacity(frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (ch, sample) in frame.iter().enumerate() {
                planar[ch].push(*sample);
            }
        }
        Self::from_planar(planar, sample_rate)
    }

    /// Number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Number of sample frames per channel.
    pub fn frames(&self) -> usize {
        self.channels[0].len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }

    /// Samples for a single channel.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    /// All channels, planar.
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Returns the memory size in bytes.
    pub fn memory_size(&self) -> usize {
        self.channels.len() * self.frames() * std::mem::size_of::<f32>()
    }

    /// Returns a copy with every channel's sample order inverted.
    pub fn reversed(&self) -> PcmBuffer {
        PcmBuffer {
            channels: self
                .channels
                .iter()
                .map(|c| c.iter().rev().copied().collect())
                .collect(),
            sample_rate: self.sample_rate,
        }
    }

    /// Linearly interpolated sample at a fractional frame position. Positions
    /// past the last frame read as silence.
    #[inline]
    pub fn sample_at(&self, channel: usize, position: f64) -> f32 {
        let data = &self.channels[channel];
        let index = position.floor();
        if index < 0.0 {
            return 0.0;
        }
        let index = index as usize;
        let Some(&s0) = data.get(index) else {
            return 0.0;
        };
        let s1 = data.get(index + 1).copied().unwrap_or(0.0);
        let frac = (position - index as f64) as f32;
        s0 + (s1 - s0) * frac
    }

    /// Resamples to the target rate using linear interpolation. Adequate for
    /// drum hits and one-shots; returns a clone if the rates already match.
    pub fn resampled(&self, target_rate: u32) -> PcmBuffer {
        if target_rate == self.sample_rate || target_rate == 0 {
            return self.clone();
        }
        let ratio = target_rate as f64 / self.sample_rate as f64;
        let target_frames = (self.frames() as f64 * ratio).ceil() as usize;

        let channels = self
            .channels
            .iter()
            .map(|data| {
                (0..target_frames)
                    .map(|target_frame| {
                        let source_pos = target_frame as f64 / ratio;
                        let source_frame = source_pos.floor() as usize;
                        let frac = source_pos.fract() as f32;
                        let s0 = data.get(source_frame).copied().unwrap_or(0.0);
                        let s1 = data.get(source_frame + 1).copied().unwrap_or(s0);
                        s0 + (s1 - s0) * frac
                    })
                    .collect()
            })
            .collect();

        PcmBuffer {
            channels,
            sample_rate: target_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_interleaved() {
        let buffer = PcmBuffer::from_interleaved(&[1.0, -1.0, 0.5, -0.5], 2, 44100).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel(0).unwrap(), &[1.0, 0.5]);
        assert_eq!(buffer.channel(1).unwrap(), &[-1.0, -0.5]);
    }

    #[test]
    fn test_rejects_ragged_channels() {
        let result = PcmBuffer::from_planar(vec![vec![0.0; 4], vec![0.0; 3]], 44100);
        assert!(matches!(result, Err(DecodeError::Malformed(_))));
        assert!(PcmBuffer::from_planar(Vec::new(), 44100).is_err());
        assert!(PcmBuffer::from_planar(vec![vec![0.0]], 0).is_err());
    }

    #[test]
    fn test_duration() {
        let buffer = PcmBuffer::from_planar(vec![vec![0.0; 88200]], 44100).unwrap();
        assert_eq!(buffer.duration_secs(), 2.0);
        assert_eq!(buffer.memory_size(), 88200 * 4);
    }

    #[test]
    fn test_sample_at_interpolates() {
        let buffer = PcmBuffer::from_planar(vec![vec![0.0, 1.0, 0.0]], 44100).unwrap();
        assert_eq!(buffer.sample_at(0, 0.5), 0.5);
        assert_eq!(buffer.sample_at(0, 1.0), 1.0);
        assert_eq!(buffer.sample_at(0, 1.25), 0.75);
        assert_eq!(buffer.sample_at(0, 3.0), 0.0);
    }

    #[test]
    fn test_resample_up() {
        let source: Vec<f32> = (0..4410)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        let buffer = PcmBuffer::from_planar(vec![source], 44100).unwrap();
        let result = buffer.resampled(48000);

        let expected_len = (4410.0_f64 * 48000.0 / 44100.0).ceil() as usize;
        assert_eq!(result.frames(), expected_len);
        assert_eq!(result.sample_rate(), 48000);
        assert!((result.duration_secs() - buffer.duration_secs()).abs() < 0.001);
    }

    #[test]
    fn test_resample_preserves_channels() {
        let buffer =
            PcmBuffer::from_interleaved(&[1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0], 2, 44100)
                .unwrap();
        let result = buffer.resampled(48000);
        assert_eq!(result.channel_count(), 2);
        assert!((result.channel(0).unwrap()[0] - 1.0).abs() < 0.1);
        assert!((result.channel(1).unwrap()[0] + 1.0).abs() < 0.1);
    }
}
