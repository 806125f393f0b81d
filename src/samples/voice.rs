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

//! Voices: one in-flight playback of a pad's buffer.
//!
//! A voice is split in two. The [`VoiceSource`] lives on the render thread
//! inside the master bus and owns the read position. The [`VoiceControl`] is
//! shared with it and carries everything the control side may change while
//! the voice sounds: playback rate, gain automation and a scheduled stop.
//! The engine only ever holds a weak [`VoiceHandle`] to the control, so a
//! voice disappears as soon as the bus drops its source.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::audio::bus::BusSource;
use crate::audio::{Envelope, PcmBuffer};

use super::store::PAD_COUNT;

/// Global voice ID counter.
static NEXT_VOICE_ID: AtomicU64 = AtomicU64::new(1);

/// Marker for "no stop scheduled".
const NO_STOP: u64 = u64::MAX;

/// Opaque identity of a voice. Never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoiceId(u64);

impl VoiceId {
    fn next() -> Self {
        VoiceId(NEXT_VOICE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Rebuilds an id reported by the bus.
    pub(crate) fn from_raw(id: u64) -> Self {
        VoiceId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// State shared between a voice's render source and its handle.
pub struct VoiceControl {
    id: VoiceId,
    /// Playback rate as f32 bits.
    rate: AtomicU32,
    /// Bus frame at which the voice is cut, or NO_STOP.
    stop_at: AtomicU64,
    envelope: Mutex<Envelope>,
    finished: AtomicBool,
}

impl VoiceControl {
    fn new(rate: f32, envelope: Envelope) -> Self {
        Self {
            id: VoiceId::next(),
            rate: AtomicU32::new(rate.to_bits()),
            stop_at: AtomicU64::new(NO_STOP),
            envelope: Mutex::new(envelope),
            finished: AtomicBool::new(false),
        }
    }

    fn rate(&self) -> f32 {
        f32::from_bits(self.rate.load(Ordering::Relaxed))
    }
}

/// Where in the buffer a voice plays, in buffer frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayWindow {
    /// First frame played.
    pub start: f64,
    /// Frame at which playback ends, or wraps back to `start` when looping.
    pub end: f64,
    pub looping: bool,
}

/// Render-side half of a voice.
pub struct VoiceSource {
    control: Arc<VoiceControl>,
    buffer: Arc<PcmBuffer>,
    window: PlayWindow,
    /// Read position in buffer frames.
    position: f64,
    /// Bus frame at which playback begins.
    start_frame: u64,
    /// Converts the playback rate into buffer frames per bus frame.
    rate_scale: f64,
    /// Per-block gain scratch.
    gains: Vec<f32>,
}

impl VoiceSource {
    /// Creates a voice and returns its render source along with a weak handle
    /// for the control side. The source starts at `start_frame` on the bus.
    pub fn new(
        buffer: Arc<PcmBuffer>,
        window: PlayWindow,
        rate: f32,
        envelope: Envelope,
        start_frame: u64,
        bus_sample_rate: u32,
    ) -> (VoiceSource, VoiceHandle) {
        let control = Arc::new(VoiceControl::new(rate, envelope));
        let handle = VoiceHandle {
            id: control.id,
            control: Arc::downgrade(&control),
        };
        let rate_scale = buffer.sample_rate() as f64 / bus_sample_rate.max(1) as f64;
        let source = VoiceSource {
            control,
            position: window.start,
            buffer,
            window,
            start_frame,
            rate_scale,
            gains: Vec::new(),
        };
        (source, handle)
    }

    fn finish(&self) -> bool {
        self.control.finished.store(true, Ordering::Release);
        false
    }
}

impl BusSource for VoiceSource {
    fn id(&self) -> u64 {
        self.control.id.0
    }

    fn mix_into(&mut self, out: &mut [f32], channels: usize, block_start: u64) -> bool {
        if channels == 0 || self.control.finished.load(Ordering::Acquire) {
            return false;
        }
        let frames = out.len() / channels;
        let stop_at = self.control.stop_at.load(Ordering::Acquire);
        if block_start >= stop_at {
            return self.finish();
        }

        self.gains.resize(frames, 0.0);
        self.control.envelope.lock().fill(block_start, &mut self.gains);
        let step = self.control.rate() as f64 * self.rate_scale;

        let src_channels = self.buffer.channel_count() as usize;
        // Folding more source channels than outputs keeps overall level.
        let fold = if src_channels > channels {
            channels as f32 / src_channels as f32
        } else {
            1.0
        };
        let loop_len = self.window.end - self.window.start;

        for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
            let now = block_start + i as u64;
            if now < self.start_frame {
                continue;
            }
            if now >= stop_at {
                return self.finish();
            }
            if !self.window.looping && self.position >= self.window.end {
                return self.finish();
            }

            let gain = self.gains[i];
            if src_channels == 1 {
                let sample = self.buffer.sample_at(0, self.position) * gain;
                for out_sample in frame.iter_mut() {
                    *out_sample += sample;
                }
            } else {
                for ch in 0..src_channels {
                    let sample = self.buffer.sample_at(ch, self.position) * gain * fold;
                    frame[ch % channels] += sample;
                }
            }

            self.position += step;
            if self.window.looping && self.position >= self.window.end {
                self.position = if loop_len > 0.0 {
                    self.window.start + (self.position - self.window.end) % loop_len
                } else {
                    self.window.start
                };
            }
        }
        true
    }
}

/// Control-side reference to a voice. Holding a handle does not keep the
/// voice alive.
#[derive(Clone)]
pub struct VoiceHandle {
    id: VoiceId,
    control: Weak<VoiceControl>,
}

impl VoiceHandle {
    pub fn id(&self) -> VoiceId {
        self.id
    }

    /// True while the bus still renders this voice (or has yet to pick it up).
    pub fn is_alive(&self) -> bool {
        self.control
            .upgrade()
            .is_some_and(|c| !c.finished.load(Ordering::Acquire))
    }

    /// Changes the playback rate in place.
    pub fn set_rate(&self, rate: f32) {
        if let Some(control) = self.control.upgrade() {
            control.rate.store(rate.to_bits(), Ordering::Relaxed);
        }
    }

    /// Moves the gain target without restarting the envelope.
    pub fn set_gain(&self, gain: f32, at_frame: u64) {
        if let Some(control) = self.control.upgrade() {
            control.envelope.lock().retarget(gain, at_frame);
        }
    }

    /// The envelope's value at `frame`, or 0 if the voice is gone.
    pub fn gain_at(&self, frame: u64) -> f32 {
        self.control
            .upgrade()
            .map(|c| c.envelope.lock().value_at(frame))
            .unwrap_or(0.0)
    }

    /// Cuts the voice at `frame`. An earlier scheduled stop wins.
    pub fn stop_at(&self, frame: u64) {
        if let Some(control) = self.control.upgrade() {
            control.stop_at.fetch_min(frame, Ordering::AcqRel);
        }
    }

    /// Ramps from the instantaneous gain at `frame` down to silence over
    /// `release_frames`, then stops. Returns the gain the ramp starts from.
    pub fn release(&self, frame: u64, release_frames: u64) -> f32 {
        let Some(control) = self.control.upgrade() else {
            return 0.0;
        };
        let end = frame + release_frames.max(1);
        let held = {
            let mut envelope = control.envelope.lock();
            let held = envelope.cancel_and_hold(frame);
            envelope.linear_ramp_to(0.0, end);
            held
        };
        control.stop_at.fetch_min(end, Ordering::AcqRel);
        held
    }

    /// The scheduled stop frame, if any.
    pub fn scheduled_stop(&self) -> Option<u64> {
        self.control
            .upgrade()
            .map(|c| c.stop_at.load(Ordering::Acquire))
            .filter(|f| *f != NO_STOP)
    }

    /// Current playback rate, if the voice is still alive.
    pub fn rate(&self) -> Option<f32> {
        self.control.upgrade().map(|c| c.rate())
    }
}

impl std::fmt::Debug for VoiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceHandle")
            .field("id", &self.id.0)
            .field("alive", &self.is_alive())
            .finish()
    }
}

/// The voices belonging to a single pad.
#[derive(Default)]
struct PadVoices {
    /// The voice `play` registered last. At most one.
    active: Option<VoiceHandle>,
    /// Voices stopped with a release ramp that are still fading out.
    releasing: Vec<VoiceHandle>,
}

/// Tracks which voice belongs to which pad.
pub struct VoiceManager {
    pads: [PadVoices; PAD_COUNT],
}

impl VoiceManager {
    pub fn new() -> Self {
        Self {
            pads: Default::default(),
        }
    }

    /// Registers `voice` as the pad's active voice. Returns the voice it
    /// replaces, which the caller must cut.
    pub fn register(&mut self, pad: usize, voice: VoiceHandle) -> Option<VoiceHandle> {
        let previous = self.pads[pad].active.replace(voice);
        if let Some(previous) = &previous {
            debug!(pad, voice_id = previous.id.0, "Voice superseded");
        }
        previous
    }

    pub fn active(&self, pad: usize) -> Option<&VoiceHandle> {
        self.pads[pad].active.as_ref()
    }

    /// Removes and returns the pad's active voice.
    pub fn take_active(&mut self, pad: usize) -> Option<VoiceHandle> {
        self.pads[pad].active.take()
    }

    /// Keeps track of a voice that is fading out after a release.
    pub fn push_releasing(&mut self, pad: usize, voice: VoiceHandle) {
        self.pads[pad].releasing.push(voice);
    }

    /// Handles a voice that has stopped sounding. Pad state only changes if
    /// `id` is still the voice registered there; a stale notification for a
    /// superseded voice is ignored. Returns the pad that went idle, if any.
    pub fn handle_ended(&mut self, id: VoiceId) -> Option<usize> {
        for (pad, voices) in self.pads.iter_mut().enumerate() {
            voices.releasing.retain(|v| v.id != id);
            if voices.active.as_ref().is_some_and(|v| v.id == id) {
                voices.active = None;
                return Some(pad);
            }
        }
        None
    }

    /// Drops handles to voices the bus no longer renders.
    pub fn prune(&mut self) {
        for voices in self.pads.iter_mut() {
            voices.releasing.retain(|v| v.is_alive());
            if voices.active.as_ref().is_some_and(|v| !v.is_alive()) {
                voices.active = None;
            }
        }
    }

    /// True if the pad has an active voice or one still fading out.
    pub fn is_sounding(&self, pad: usize) -> bool {
        let voices = &self.pads[pad];
        voices.active.is_some() || voices.releasing.iter().any(|v| v.is_alive())
    }

    /// Returns the number of pads with an active voice.
    pub fn active_count(&self) -> usize {
        self.pads.iter().filter(|p| p.active.is_some()).count()
    }

    /// Pads that currently have an active voice.
    pub fn active_pads(&self) -> Vec<usize> {
        self.pads
            .iter()
            .enumerate()
            .filter(|(_, p)| p.active.is_some())
            .map(|(pad, _)| pad)
            .collect()
    }

    /// Removes and returns every voice still fading out.
    pub fn take_releasing(&mut self) -> Vec<VoiceHandle> {
        self.pads
            .iter_mut()
            .flat_map(|p| std::mem::take(&mut p.releasing))
            .collect()
    }
}

impl Default for VoiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VoiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceManager")
            .field("active_voices", &self.active_count())
            .finish()
    }
}
