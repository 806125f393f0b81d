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

//! Captures the master bus into a WAV blob.
//!
//! While recording, the bus copies every rendered block into a channel. A
//! collector thread cuts the stream into fixed-interval chunks of 16-bit PCM;
//! stopping drains the channel and wraps the chunks into one WAV file.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{debug, info, span, warn, Level};

use crate::audio::{decode_bytes, DecodeError, MasterBus, PcmBuffer};
use crate::config;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Recording is not available")]
    Unavailable,

    #[error("A recording is already in progress")]
    AlreadyRecording,

    #[error("Invalid recorder configuration: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Recorder thread failed: {0}")]
    Collector(String),

    #[error("WAV encoding failed: {0}")]
    Encode(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A finished recording. Immutable; clones share the bytes.
#[derive(Clone, Debug)]
pub struct RecordedTrack {
    wav: Arc<[u8]>,
    sample_rate: u32,
    channels: u16,
    frames: u64,
}

impl RecordedTrack {
    /// The complete WAV file.
    pub fn wav_bytes(&self) -> &Arc<[u8]> {
        &self.wav
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames as f64 / self.sample_rate.max(1) as f64)
    }

    /// Decodes the blob back into samples.
    pub fn to_buffer(&self) -> Result<PcmBuffer, DecodeError> {
        decode_bytes(self.wav.to_vec(), Some("wav"))
    }

    pub fn save(&self, path: &Path) -> Result<(), RecorderError> {
        std::fs::write(path, &self.wav)?;
        info!(path = ?path, bytes = self.wav.len(), "Saved recording");
        Ok(())
    }
}

/// The encoded output of one session.
struct Chunks {
    /// Little-endian i16 interleaved PCM, one entry per interval.
    chunks: Vec<Vec<u8>>,
    frames: u64,
}

struct Session {
    collector: thread::JoinHandle<Chunks>,
    sample_rate: u32,
    channels: u16,
}

/// Bus recorder state machine.
pub struct Recorder {
    enabled: bool,
    chunk_interval: Duration,
    session: Option<Session>,
    last: Option<RecordedTrack>,
}

impl Recorder {
    pub fn new(config: &config::Recorder) -> Result<Self, RecorderError> {
        Ok(Self {
            enabled: config.enabled(),
            chunk_interval: config.chunk_interval()?,
            session: None,
            last: None,
        })
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// The most recent finished recording. Survives a new `start` until that
    /// recording is stopped.
    pub fn recorded_track(&self) -> Option<&RecordedTrack> {
        self.last.as_ref()
    }

    /// Starts capturing `bus`.
    pub fn start(&mut self, bus: &MasterBus) -> Result<(), RecorderError> {
        if !self.enabled {
            return Err(RecorderError::Unavailable);
        }
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        if !bus.attach_record_tap(tx) {
            return Err(RecorderError::AlreadyRecording);
        }

        let channels = bus.num_channels();
        let sample_rate = bus.sample_rate();
        let chunk_frames =
            ((self.chunk_interval.as_secs_f64() * sample_rate as f64).round() as usize).max(1);
        let collector = thread::Builder::new()
            .name("recorder".to_string())
            .spawn(move || collect(rx, channels as usize, chunk_frames));
        let collector = match collector {
            Ok(collector) => collector,
            Err(e) => {
                bus.detach_record_tap();
                return Err(e.into());
            }
        };

        info!(
            sample_rate,
            channels,
            chunk_ms = self.chunk_interval.as_millis() as u64,
            "Recording started"
        );
        self.session = Some(Session {
            collector,
            sample_rate,
            channels,
        });
        Ok(())
    }

    /// Stops capturing and finalises the blob. Returns None if nothing was
    /// being recorded.
    pub async fn stop(
        &mut self,
        bus: &MasterBus,
    ) -> Result<Option<RecordedTrack>, RecorderError> {
        let Some(session) = self.session.take() else {
            debug!("Stop requested while not recording");
            return Ok(None);
        };

        // Dropping the sender lets the collector drain what is queued and exit.
        bus.detach_record_tap();
        let chunks = tokio::task::spawn_blocking(move || session.collector.join())
            .await
            .map_err(|e| RecorderError::Collector(e.to_string()))?
            .map_err(|_| RecorderError::Collector("collector panicked".to_string()))?;

        let track = finalize(chunks, session.sample_rate, session.channels)?;
        info!(
            frames = track.frames,
            bytes = track.wav.len(),
            duration_ms = track.duration().as_millis() as u64,
            "Recording stopped"
        );
        self.last = Some(track.clone());
        Ok(Some(track))
    }

    /// Abandons an in-progress recording without producing a blob.
    pub fn abort(&mut self, bus: &MasterBus) {
        if let Some(session) = self.session.take() {
            bus.detach_record_tap();
            if session.collector.join().is_err() {
                warn!("Recorder thread panicked during abort");
            }
            info!("Recording aborted");
        }
    }
}

/// Collector thread body: accumulate blocks, emit a chunk per interval.
fn collect(rx: Receiver<Vec<f32>>, channels: usize, chunk_frames: usize) -> Chunks {
    let span = span!(Level::DEBUG, "recorder collector");
    let _enter = span.enter();

    let chunk_samples = chunk_frames * channels.max(1);
    let mut pending: Vec<f32> = Vec::with_capacity(chunk_samples);
    let mut chunks = Vec::new();
    let mut total_samples: u64 = 0;

    while let Ok(block) = rx.recv() {
        total_samples += block.len() as u64;
        pending.extend_from_slice(&block);
        while pending.len() >= chunk_samples {
            let rest = pending.split_off(chunk_samples);
            chunks.push(encode_chunk(&pending));
            pending = rest;
        }
    }
    if !pending.is_empty() {
        chunks.push(encode_chunk(&pending));
    }

    debug!(chunks = chunks.len(), "Collector finished");
    Chunks {
        chunks,
        frames: total_samples / channels.max(1) as u64,
    }
}

fn encode_chunk(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Wraps the chunk sequence into a single WAV file.
fn finalize(chunks: Chunks, sample_rate: u32, channels: u16) -> Result<RecordedTrack, RecorderError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(
            &mut cursor,
            WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: SampleFormat::Int,
            },
        )?;
        for chunk in &chunks.chunks {
            for pair in chunk.chunks_exact(2) {
                writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
            }
        }
        writer.finalize()?;
    }

    Ok(RecordedTrack {
        wav: Arc::from(cursor.into_inner()),
        sample_rate,
        channels,
        frames: chunks.frames,
    })
}
