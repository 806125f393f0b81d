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

//! The pad engine: sixteen pads, their voices, the bus and the recorder.
//!
//! Playback calls only schedule work. Every start, ramp and stop is expressed
//! as an absolute bus frame and handed to the render thread, so `play`,
//! `stop` and the setters return immediately.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::error::EngineError;
use super::fetch::Fetcher;
use super::loader::SampleLoader;
use super::params::{PadSettings, ParamTable, PlayMode, TrimValues};
use super::reverse::ReversalCache;
use super::store::{valid_pad, SampleStore, PAD_COUNT};
use super::voice::{PlayWindow, VoiceHandle, VoiceId, VoiceManager, VoiceSource};
use crate::audio::{self, BusEvent, Envelope, MasterBus, Output, PcmBuffer, Route};
use crate::config::EngineConfig;
use crate::preset::{LoadListener, Preset, PresetClient};
use crate::recorder::{RecordedTrack, Recorder, RecorderError};

/// The running audio side: bus plus the backend rendering it.
struct AudioContext {
    bus: Arc<MasterBus>,
    output: Box<dyn Output>,
    /// Schedule-ahead for new voices, in frames.
    latency_frames: u64,
}

impl AudioContext {
    /// The earliest frame new automation can safely land on.
    fn schedule_frame(&self) -> u64 {
        self.bus.current_frame() + self.latency_frames
    }
}

/// Sixteen-pad sample player.
pub struct PadEngine {
    config: EngineConfig,
    store: SampleStore,
    params: ParamTable,
    reversals: ReversalCache,
    voices: VoiceManager,
    loader: SampleLoader,
    recorder: Recorder,
    /// Playback of the recorded track on the direct path.
    track_voice: Option<VoiceHandle>,
    context: Option<AudioContext>,
}

impl PadEngine {
    /// Creates an engine. Nothing is opened until [`PadEngine::init`].
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let fetcher = Fetcher::new(config.loader().clone())?;
        let recorder = Recorder::new(config.recorder())?;
        Ok(Self {
            store: SampleStore::new(),
            params: ParamTable::new(),
            reversals: ReversalCache::new(),
            voices: VoiceManager::new(),
            loader: SampleLoader::new(fetcher),
            recorder,
            track_voice: None,
            context: None,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Opens the audio output. Idempotent; returns false if the device
    /// could not be opened.
    pub fn init(&mut self) -> bool {
        if self.context.is_some() {
            return true;
        }
        match self.open_context() {
            Ok(context) => {
                info!(
                    output = %context.output,
                    sample_rate = context.bus.sample_rate(),
                    latency_frames = context.latency_frames,
                    "Engine initialized"
                );
                self.loader
                    .set_target_sample_rate(Some(context.bus.sample_rate()));
                self.context = Some(context);
                true
            }
            Err(e) => {
                error!(err = %e, "Failed to initialize engine");
                false
            }
        }
    }

    fn open_context(&self) -> Result<AudioContext, EngineError> {
        let audio = self.config.audio();
        let (bus, output) = audio::open_output(audio, self.config.analysis().size())
            .map_err(|e| EngineError::Output(e.to_string()))?;
        let latency_frames = audio.latency_frames(bus.sample_rate())?;
        Ok(AudioContext {
            bus,
            output,
            latency_frames,
        })
    }

    /// Stops everything and closes the output. Loaded sounds and settings
    /// are kept; `init` can be called again.
    pub fn close(&mut self) {
        let Some(mut context) = self.context.take() else {
            return;
        };
        self.recorder.abort(&context.bus);
        self.voices = VoiceManager::new();
        self.track_voice = None;
        context.bus.clear();
        context.output.close();
        self.loader.set_target_sample_rate(None);
        info!("Engine closed");
    }

    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    /// True if nothing renders the bus on its own (the manual mock clock).
    pub fn is_manual_clock(&self) -> bool {
        self.context.as_ref().is_some_and(|c| c.output.is_manual())
    }

    /// The master bus, while initialized.
    pub fn bus(&self) -> Option<&Arc<MasterBus>> {
        self.context.as_ref().map(|c| &c.bus)
    }

    /// Applies voice-ended notifications from the render thread. Returns how
    /// many pads went idle.
    pub fn poll_events(&mut self) -> usize {
        let Some(context) = &self.context else {
            return 0;
        };
        let mut idled = 0;
        for event in context.bus.events().try_iter() {
            match event {
                BusEvent::SourceEnded(id) => {
                    if let Some(pad) = self.voices.handle_ended(VoiceId::from_raw(id)) {
                        debug!(pad, voice_id = id, "Voice ended, pad idle");
                        idled += 1;
                    }
                }
            }
        }
        self.voices.prune();
        idled
    }

    /// Starts the pad. Retriggering cuts the previous voice at the frame the
    /// new one begins. Returns false if the pad cannot play.
    pub fn play(&mut self, pad: usize) -> bool {
        self.poll_events();
        match self.try_play(pad) {
            Ok(id) => {
                debug!(pad, voice_id = id.as_u64(), "Pad playing");
                true
            }
            Err(EngineError::InvalidPad(_)) | Err(EngineError::NoSound(_)) => false,
            Err(e) => {
                warn!(pad, err = %e, "Play failed");
                false
            }
        }
    }

    fn try_play(&mut self, pad: usize) -> Result<VoiceId, EngineError> {
        if !valid_pad(pad) {
            return Err(EngineError::InvalidPad(pad));
        }
        let context = self.context.as_ref().ok_or(EngineError::Uninitialized)?;
        let buffer = self
            .store
            .buffer(pad)
            .cloned()
            .ok_or(EngineError::NoSound(pad))?;
        let settings = self.params.get(pad).copied().unwrap_or_default();

        let effective = if settings.reverse {
            self.reversals.get(pad, &buffer)
        } else {
            buffer
        };

        // Trims are fractions of the effective buffer's duration.
        let frames = effective.frames() as f64;
        let window = PlayWindow {
            start: settings.trim_start * frames,
            end: settings.trim_end * frames,
            looping: settings.looping,
        };

        let bus = &context.bus;
        let start = context.schedule_frame();
        let attack_frames = bus.secs_to_frames(settings.attack).max(1);
        let mut envelope = Envelope::new(0.0);
        envelope.set_value_at(0.0, start);
        envelope.linear_ramp_to(settings.volume as f32, start + attack_frames);

        let (source, handle) = VoiceSource::new(
            effective,
            window,
            settings.pitch as f32,
            envelope,
            start,
            bus.sample_rate(),
        );
        let id = handle.id();

        if let Some(previous) = self.voices.register(pad, handle) {
            previous.stop_at(start);
        }
        bus.add_source(Route::Bus, Box::new(source));
        Ok(id)
    }

    /// Stops the pad. Without release the voice is cut at once; with release
    /// its gain ramps from wherever it is now down to silence over the pad's
    /// release time. Either way the pad no longer has an active voice.
    pub fn stop(&mut self, pad: usize, use_release: bool) {
        if !valid_pad(pad) {
            return;
        }
        let Some(voice) = self.voices.take_active(pad) else {
            return;
        };
        let Some(context) = &self.context else {
            return;
        };

        let now = context.bus.current_frame();
        if use_release {
            let release = self.params.get(pad).map(|s| s.release).unwrap_or_default();
            let release_frames = context.bus.secs_to_frames(release).max(1);
            let from = voice.release(now, release_frames);
            debug!(
                pad,
                voice_id = voice.id().as_u64(),
                from,
                release_frames,
                "Releasing pad"
            );
            self.voices.push_releasing(pad, voice);
        } else {
            voice.stop_at(now);
            debug!(pad, voice_id = voice.id().as_u64(), "Pad stopped");
        }
    }

    /// Stops every sounding pad. A hard stop also cuts release tails.
    pub fn stop_all(&mut self, use_release: bool) {
        let pads = self.voices.active_pads();
        for &pad in &pads {
            self.stop(pad, use_release);
        }
        if !use_release {
            if let Some(context) = &self.context {
                let now = context.bus.current_frame();
                for voice in self.voices.take_releasing() {
                    voice.stop_at(now);
                }
            }
        }
        if !pads.is_empty() {
            info!(stopped = pads.len(), use_release, "All pads stopped");
        }
    }

    /// Applies `update` to the pad's settings, logging rejected input.
    fn update_settings<F>(&mut self, pad: usize, name: &'static str, update: F) -> bool
    where
        F: FnOnce(&mut PadSettings) -> bool,
    {
        let Some(settings) = self.params.get_mut(pad) else {
            return false;
        };
        let accepted = update(settings);
        if !accepted {
            warn!(pad, param = name, "Ignoring non-finite value");
        }
        accepted
    }

    pub fn set_trim_start(&mut self, pad: usize, value: f64) {
        self.update_settings(pad, "trim_start", |s| s.set_trim_start(value));
    }

    pub fn set_trim_end(&mut self, pad: usize, value: f64) {
        self.update_settings(pad, "trim_end", |s| s.set_trim_end(value));
    }

    pub fn set_loop(&mut self, pad: usize, looping: bool) {
        self.update_settings(pad, "loop", |s| {
            s.looping = looping;
            true
        });
    }

    pub fn set_reverse(&mut self, pad: usize, reverse: bool) {
        self.update_settings(pad, "reverse", |s| {
            s.reverse = reverse;
            true
        });
    }

    pub fn set_play_mode(&mut self, pad: usize, mode: PlayMode) {
        self.update_settings(pad, "play_mode", |s| {
            s.play_mode = mode;
            true
        });
    }

    pub fn set_attack(&mut self, pad: usize, secs: f64) {
        self.update_settings(pad, "attack", |s| s.set_attack(secs));
    }

    pub fn set_release(&mut self, pad: usize, secs: f64) {
        self.update_settings(pad, "release", |s| s.set_release(secs));
    }

    /// Sets the pitch; a sounding voice changes rate in place.
    pub fn set_pitch(&mut self, pad: usize, pitch: f64) {
        if !self.update_settings(pad, "pitch", |s| s.set_pitch(pitch)) {
            return;
        }
        if let (Some(voice), Some(settings)) = (self.voices.active(pad), self.params.get(pad)) {
            voice.set_rate(settings.pitch as f32);
        }
    }

    /// Sets the volume; a sounding voice moves to the new level in place.
    pub fn set_volume(&mut self, pad: usize, volume: f64) {
        if !self.update_settings(pad, "volume", |s| s.set_volume(volume)) {
            return;
        }
        let (Some(voice), Some(settings), Some(context)) = (
            self.voices.active(pad),
            self.params.get(pad),
            self.context.as_ref(),
        ) else {
            return;
        };
        voice.set_gain(settings.volume as f32, context.bus.current_frame());
    }

    pub fn reset_pad_settings(&mut self, pad: usize) -> bool {
        self.params.reset(pad)
    }

    pub fn has_sound(&self, pad: usize) -> bool {
        self.store.has_sound(pad)
    }

    /// True while the pad has an active voice or a release tail still fading.
    pub fn is_playing(&mut self, pad: usize) -> bool {
        if !valid_pad(pad) {
            return false;
        }
        self.poll_events();
        self.voices.is_sounding(pad)
    }

    /// Identity of the pad's active voice.
    pub fn active_voice(&self, pad: usize) -> Option<VoiceId> {
        if !valid_pad(pad) {
            return None;
        }
        self.voices.active(pad).map(VoiceHandle::id)
    }

    pub fn get_trim_values(&self, pad: usize) -> Option<TrimValues> {
        self.params.get(pad).map(PadSettings::trim)
    }

    pub fn get_pad_settings(&self, pad: usize) -> Option<PadSettings> {
        self.params.get(pad).copied()
    }

    /// The pad's decoded samples, for waveform drawing.
    pub fn get_buffer_data(&self, pad: usize) -> Option<Arc<PcmBuffer>> {
        self.store.buffer(pad).cloned()
    }

    /// Duration of the pad's buffer in seconds.
    pub fn get_buffer_duration(&self, pad: usize) -> Option<f64> {
        self.store.buffer(pad).map(|b| b.duration_secs())
    }

    pub fn get_sound_url(&self, pad: usize) -> Option<&str> {
        self.store.source_ref(pad)
    }

    /// The latest bus samples, oldest first. Silence while uninitialized.
    pub fn get_time_domain_data(&self) -> Vec<f32> {
        match &self.context {
            Some(context) => context.bus.time_domain_data(),
            None => vec![0.0; self.config.analysis().size()],
        }
    }

    /// The loader, for callers that decode off to the side and commit with
    /// [`PadEngine::install`].
    pub fn loader(&self) -> &SampleLoader {
        &self.loader
    }

    /// Fetches and decodes `source_ref` into the pad. On failure the pad is
    /// left as it was.
    pub async fn load_sound(&mut self, pad: usize, source_ref: &str) -> bool {
        if !valid_pad(pad) {
            debug!(pad, "Ignoring load for invalid pad");
            return false;
        }
        match self.loader.load(source_ref).await {
            Ok(buffer) => self.install(pad, buffer, source_ref),
            Err(e) => {
                warn!(pad, source_ref, err = %e, "Failed to load sound");
                false
            }
        }
    }

    /// Decodes uploaded bytes into the pad.
    pub fn load_bytes(&mut self, pad: usize, bytes: Vec<u8>, source_ref: &str) -> bool {
        if !valid_pad(pad) {
            return false;
        }
        match self.loader.decode(bytes, source_ref) {
            Ok(buffer) => self.install(pad, buffer, source_ref),
            Err(e) => {
                warn!(pad, source_ref, err = %e, "Failed to decode upload");
                false
            }
        }
    }

    /// Commits a decoded buffer. The last commit for a pad wins.
    pub fn install(&mut self, pad: usize, buffer: Arc<PcmBuffer>, source_ref: &str) -> bool {
        if !self.store.set(pad, buffer, source_ref) {
            return false;
        }
        self.reversals.invalidate(pad);
        info!(pad, source_ref, "Pad loaded");
        true
    }

    /// Stores bytes under a `blob:` ref that `load_sound` accepts.
    pub fn register_blob(&self, bytes: Arc<[u8]>) -> String {
        self.loader.fetcher().blobs().register(bytes)
    }

    pub fn clear_pad(&mut self, pad: usize) -> bool {
        if !self.store.clear(pad) {
            return false;
        }
        self.reversals.invalidate(pad);
        true
    }

    pub fn clear_all(&mut self) {
        self.store.clear_all();
        self.reversals.clear();
    }

    /// Clears every pad, then loads the preset's sounds one at a time in
    /// declaration order. Individual failures are reported to the listener
    /// and do not stop the batch.
    pub async fn load_preset<L: LoadListener>(&mut self, preset: &Preset, listener: &mut L) -> bool {
        info!(id = %preset.id, name = %preset.name, sounds = preset.sounds.len(), "Loading preset");
        self.clear_all();

        let total = preset.sounds.len();
        listener.on_progress(0, total);
        let mut loaded = 0;
        for (index, sound) in preset.sounds.iter().enumerate() {
            let ok = match sound.pad_index() {
                Some(pad) => self.load_sound(pad, &sound.url).await,
                None => {
                    warn!(pad = sound.pad, url = %sound.url, "Preset sound targets an invalid pad");
                    false
                }
            };
            if ok {
                loaded += 1;
            }
            listener.on_pad_loaded(sound.pad, ok);
            listener.on_progress(index + 1, total);
        }

        info!(id = %preset.id, loaded, total, "Preset loaded");
        true
    }

    /// Fetches a preset descriptor, then loads it. Returns false without
    /// touching any pad if the descriptor cannot be fetched.
    pub async fn load_preset_by_id<L: LoadListener>(
        &mut self,
        client: &PresetClient,
        id: &str,
        listener: &mut L,
    ) -> bool {
        match client.get(id).await {
            Ok(preset) => self.load_preset(&preset, listener).await,
            Err(e) => {
                warn!(id, err = %e, "Failed to fetch preset");
                false
            }
        }
    }

    /// Bytes held by pad buffers and cached reversals.
    pub fn memory_usage(&self) -> usize {
        self.store.memory_usage() + self.reversals.memory_usage()
    }

    /// Starts capturing the bus. False if uninitialized, already recording
    /// or recording is unavailable.
    pub fn start_recording(&mut self) -> bool {
        let Some(context) = &self.context else {
            warn!(err = %EngineError::Uninitialized, "Cannot start recording");
            return false;
        };
        match self.recorder.start(&context.bus) {
            Ok(()) => true,
            Err(e) => {
                warn!(err = %e, "Cannot start recording");
                false
            }
        }
    }

    /// Finalises the recording. None if nothing was being recorded.
    pub async fn stop_recording(&mut self) -> Option<RecordedTrack> {
        let context = self.context.as_ref()?;
        match self.recorder.stop(&context.bus).await {
            Ok(track) => track,
            Err(e) => {
                error!(err = %e, "Failed to finalize recording");
                None
            }
        }
    }

    pub fn is_track_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn get_recorded_track(&self) -> Option<RecordedTrack> {
        self.recorder.recorded_track().cloned()
    }

    /// Plays the recorded track on the direct path, which the analysis and
    /// recorder taps do not see. Restarts it if already playing.
    pub fn play_recorded_track(&mut self) -> bool {
        let Some(track) = self.recorder.recorded_track() else {
            debug!("No recorded track to play");
            return false;
        };
        let Some(context) = &self.context else {
            warn!("Cannot play recorded track: engine not initialized");
            return false;
        };
        let buffer = match track.to_buffer() {
            Ok(buffer) => Arc::new(buffer),
            Err(e) => {
                error!(err = %e, "Failed to decode recorded track");
                return false;
            }
        };

        let start = context.schedule_frame();
        let window = PlayWindow {
            start: 0.0,
            end: buffer.frames() as f64,
            looping: false,
        };
        let (source, handle) = VoiceSource::new(
            buffer,
            window,
            1.0,
            Envelope::new(1.0),
            start,
            context.bus.sample_rate(),
        );
        if let Some(previous) = self.track_voice.replace(handle) {
            previous.stop_at(start);
        }
        context.bus.add_source(Route::Direct, Box::new(source));
        info!(duration_ms = track.duration().as_millis() as u64, "Playing recorded track");
        true
    }

    pub fn stop_recorded_track(&mut self) {
        if let (Some(voice), Some(context)) = (self.track_voice.take(), &self.context) {
            voice.stop_at(context.bus.current_frame());
        }
    }

    pub fn is_recorded_track_playing(&self) -> bool {
        self.track_voice.as_ref().is_some_and(VoiceHandle::is_alive)
    }

    /// Loads the recorded track onto a pad through a `blob:` ref.
    pub async fn load_recorded_track(&mut self, pad: usize) -> bool {
        if !valid_pad(pad) {
            return false;
        }
        let Some(track) = self.recorder.recorded_track() else {
            return false;
        };
        let source_ref = self.register_blob(track.wav_bytes().clone());
        self.load_sound(pad, &source_ref).await
    }

    /// Writes the recorded track to disk.
    pub fn save_recorded_track(&self, path: &Path) -> bool {
        let result = self
            .recorder
            .recorded_track()
            .ok_or(RecorderError::Unavailable)
            .and_then(|track| track.save(path));
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(path = ?path, err = %e, "Failed to save recording");
                false
            }
        }
    }

    /// Number of pads with an active voice.
    pub fn active_pad_count(&self) -> usize {
        self.voices.active_count()
    }

    pub const fn pad_count() -> usize {
        PAD_COUNT
    }
}

impl Drop for PadEngine {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, EngineConfig};
    use crate::preset::PresetSound;
    use crate::testutil::{ramp, serve_once, wav_bytes, write_wav};

    const RATE: u32 = 1000;

    fn test_config() -> EngineConfig {
        EngineConfig::mock().with_audio(
            config::Audio::new("mock")
                .with_sample_rate(RATE)
                .with_channels(1)
                .with_latency("0ms"),
        )
    }

    fn engine() -> PadEngine {
        let mut engine = PadEngine::new(test_config()).unwrap();
        assert!(engine.init());
        engine
    }

    fn constant(frames: usize, value: f32) -> Arc<PcmBuffer> {
        Arc::new(PcmBuffer::from_planar(vec![vec![value; frames]], RATE).unwrap())
    }

    fn mono(samples: Vec<f32>) -> Arc<PcmBuffer> {
        Arc::new(PcmBuffer::from_planar(vec![samples], RATE).unwrap())
    }

    fn render(engine: &PadEngine, frames: usize) -> Vec<f32> {
        engine.bus().unwrap().render(frames)
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[derive(Default)]
    struct Progress {
        loaded: Vec<(i64, bool)>,
        progress: Vec<(usize, usize)>,
    }

    impl LoadListener for Progress {
        fn on_pad_loaded(&mut self, pad: i64, ok: bool) {
            self.loaded.push((pad, ok));
        }

        fn on_progress(&mut self, loaded: usize, total: usize) {
            self.progress.push((loaded, total));
        }
    }

    #[test]
    fn test_play_without_buffer() {
        let mut engine = engine();
        assert!(!engine.play(0));
        assert!(!engine.is_playing(0));
        assert_eq!(engine.active_voice(0), None);
        render(&engine, 8);
        assert_eq!(engine.bus().unwrap().active_source_count(), 0);
    }

    #[test]
    fn test_uninitialized() {
        let mut engine = PadEngine::new(test_config()).unwrap();
        assert!(!engine.is_initialized());
        engine.install(0, constant(10, 1.0), "x");
        assert!(!engine.play(0));
        assert!(!engine.start_recording());
        assert!(!engine.play_recorded_track());
        assert_eq!(engine.get_time_domain_data(), vec![0.0; 2048]);
    }

    #[tokio::test]
    async fn test_stop_recording_uninitialized() {
        let mut engine = PadEngine::new(test_config()).unwrap();
        assert!(engine.stop_recording().await.is_none());
    }

    #[test]
    fn test_invalid_pad_is_a_no_op() {
        let mut engine = engine();
        assert!(!engine.play(16));
        engine.stop(16, true);
        engine.set_pitch(99, 2.0);
        engine.set_trim_start(16, 0.5);
        assert!(!engine.is_playing(16));
        assert!(engine.get_pad_settings(16).is_none());
        assert!(engine.get_trim_values(16).is_none());
        assert!(!engine.load_bytes(16, wav_bytes(&[ramp(10)], RATE), "x.wav"));
        assert!(!engine.install(16, constant(1, 0.0), "x"));
        assert!(!engine.clear_pad(16));
        assert!(!engine.reset_pad_settings(16));
    }

    #[test]
    fn test_trim_window_scenario() {
        let mut engine = engine();
        // Two seconds; sample i holds i / 2000.
        engine.install(0, mono(ramp(2000)), "ramp.wav");
        engine.set_trim_start(0, 0.25);
        engine.set_trim_end(0, 0.75);
        engine.set_attack(0, 0.001);

        assert!(engine.play(0));
        assert!(engine.is_playing(0));
        let out = render(&engine, 1500);

        // Frame 0 is the bottom of the one-frame attack.
        assert_eq!(out[0], 0.0);
        assert!(approx(out[1], 501.0 / 2000.0));
        assert!(approx(out[999], 1499.0 / 2000.0));
        assert!(out[1000..].iter().all(|s| *s == 0.0));

        assert!(!engine.is_playing(0));
        assert_eq!(engine.active_voice(0), None);
    }

    #[test]
    fn test_retrigger_cuts_previous_voice() {
        let mut engine = engine();
        engine.install(0, constant(1000, 0.5), "c.wav");
        engine.set_attack(0, 0.001);

        assert!(engine.play(0));
        let first = engine.active_voice(0).unwrap();
        render(&engine, 10);
        assert!(engine.play(0));
        let second = engine.active_voice(0).unwrap();
        assert_ne!(first, second);

        let out = render(&engine, 20);
        assert!(out.iter().all(|s| *s <= 0.5 + 1e-6), "two voices audible");
        assert_eq!(engine.bus().unwrap().active_source_count(), 1);

        // The cut voice's end notification must not idle the pad.
        assert!(engine.is_playing(0));
        assert_eq!(engine.active_voice(0), Some(second));
    }

    #[test]
    fn test_gate_release_from_partial_attack() {
        let mut engine = engine();
        engine.install(0, constant(100, 1.0), "c.wav");
        engine.set_play_mode(0, PlayMode::Gate);
        engine.set_loop(0, true);
        engine.set_attack(0, 0.5);
        engine.set_release(0, 0.5);

        assert!(engine.play(0));
        render(&engine, 200);
        engine.stop(0, true);

        // The active voice is gone at once but the tail still sounds.
        assert_eq!(engine.active_voice(0), None);
        assert!(engine.is_playing(0));

        let out = render(&engine, 500);
        assert!(approx(out[0], 0.4), "release starts at {}", out[0]);
        assert!(approx(out[250], 0.2));
        assert!(out[499] < 0.01);

        assert_eq!(render(&engine, 1), vec![0.0]);
        assert!(!engine.is_playing(0));
    }

    #[test]
    fn test_new_play_not_blocked_by_release_tail() {
        let mut engine = engine();
        engine.install(0, constant(100, 1.0), "c.wav");
        engine.set_loop(0, true);
        engine.set_release(0, 5.0);
        engine.play(0);
        render(&engine, 20);
        engine.stop(0, true);
        assert!(engine.play(0));
        assert!(engine.active_voice(0).is_some());
        assert_eq!(engine.bus().unwrap().active_source_count(), 1);
        render(&engine, 1);
        assert_eq!(engine.bus().unwrap().active_source_count(), 2);
    }

    #[test]
    fn test_stop_idle_pad() {
        let mut engine = engine();
        engine.stop(0, false);
        engine.stop(0, true);
        engine.install(0, constant(10, 1.0), "c.wav");
        engine.stop(0, true);
        assert!(!engine.is_playing(0));
    }

    #[test]
    fn test_hard_stop() {
        let mut engine = engine();
        engine.install(0, constant(100, 1.0), "c.wav");
        engine.set_loop(0, true);
        engine.play(0);
        render(&engine, 20);
        engine.stop(0, false);
        assert!(!engine.is_playing(0));
        assert!(render(&engine, 10).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_stop_all() {
        let mut engine = engine();
        for pad in [0, 1] {
            engine.install(pad, constant(100, 0.25), "c.wav");
            engine.set_loop(pad, true);
            assert!(engine.play(pad));
        }
        render(&engine, 10);
        engine.stop_all(true);
        assert_eq!(engine.active_pad_count(), 0);
        assert!(engine.is_playing(0) && engine.is_playing(1));

        engine.stop_all(false);
        render(&engine, 1);
        assert!(!engine.is_playing(0));
        assert!(!engine.is_playing(1));
    }

    #[test]
    fn test_live_pitch_and_volume() {
        let mut engine = engine();
        engine.install(0, constant(100, 1.0), "c.wav");
        engine.set_loop(0, true);
        engine.set_attack(0, 0.001);
        engine.play(0);
        render(&engine, 10);

        engine.set_pitch(0, 2.0);
        assert_eq!(engine.voices.active(0).unwrap().rate(), Some(2.0));

        engine.set_volume(0, 0.5);
        let out = render(&engine, 10);
        assert!(out.iter().all(|s| approx(*s, 0.5)));
        assert_eq!(engine.get_pad_settings(0).unwrap().volume, 0.5);
    }

    #[test]
    fn test_non_finite_setter_ignored() {
        let mut engine = engine();
        engine.set_pitch(0, f64::NAN);
        engine.set_trim_end(0, f64::INFINITY);
        assert_eq!(engine.get_pad_settings(0), Some(PadSettings::default()));
    }

    #[test]
    fn test_reverse_playback() {
        let mut engine = engine();
        engine.install(0, mono(ramp(100)), "ramp.wav");
        engine.set_reverse(0, true);
        engine.set_attack(0, 0.001);
        engine.play(0);
        let out = render(&engine, 5);
        assert!(approx(out[1], 0.98));
        assert!(approx(out[2], 0.97));
        assert_eq!(engine.memory_usage(), 2 * 100 * std::mem::size_of::<f32>());

        // A new load drops the cached reversal.
        engine.install(0, mono(ramp(10)), "short.wav");
        assert_eq!(engine.memory_usage(), 10 * std::mem::size_of::<f32>());
    }

    #[test]
    fn test_settings_survive_reload_and_reset() {
        let mut engine = engine();
        engine.set_pitch(3, 2.0);
        engine.install(3, constant(10, 0.0), "a.wav");
        engine.install(3, constant(20, 0.0), "b.wav");
        assert_eq!(engine.get_pad_settings(3).unwrap().pitch, 2.0);
        assert_eq!(engine.get_sound_url(3), Some("b.wav"));
        assert!(engine.reset_pad_settings(3));
        assert_eq!(engine.get_pad_settings(3), Some(PadSettings::default()));
    }

    #[test]
    fn test_load_bytes() {
        let mut engine = engine();
        assert!(engine.load_bytes(2, wav_bytes(&[ramp(100)], RATE), "upload.wav"));
        assert!(engine.has_sound(2));
        assert_eq!(engine.get_buffer_duration(2), Some(0.1));
        assert_eq!(engine.get_sound_url(2), Some("upload.wav"));
        assert_eq!(engine.get_buffer_data(2).unwrap().frames(), 100);

        assert!(!engine.load_bytes(2, b"junk".to_vec(), "junk.wav"));
        assert_eq!(engine.get_sound_url(2), Some("upload.wav"));

        assert!(engine.clear_pad(2));
        assert!(!engine.has_sound(2));
    }

    #[tokio::test]
    async fn test_failed_load_leaves_slot() {
        let mut engine = engine();
        engine.install(1, constant(10, 0.0), "keep.wav");
        let dir = tempfile::tempdir().unwrap();
        let missing = reqwest::Url::from_file_path(dir.path().join("gone.wav")).unwrap();
        assert!(!engine.load_sound(1, missing.as_str()).await);
        assert_eq!(engine.get_sound_url(1), Some("keep.wav"));
        assert!(!engine.load_sound(16, "whatever.wav").await);
    }

    #[tokio::test]
    async fn test_http_error_leaves_slot() {
        let (origin, server) = serve_once(404, b"").await;
        let mut engine =
            PadEngine::new(test_config().with_loader(config::Loader::new(&origin, "/api/proxy")))
                .unwrap();
        assert!(engine.init());
        engine.install(6, constant(10, 0.5), "keep.wav");

        assert!(!engine.load_sound(6, &format!("{}/kits/kick.wav", origin)).await);
        assert_eq!(engine.get_sound_url(6), Some("keep.wav"));
        assert!(engine.has_sound(6));
        assert_eq!(server.await.unwrap(), "GET /kits/kick.wav HTTP/1.1");
    }

    #[tokio::test]
    async fn test_load_preset_reports_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let kick = dir.path().join("kick.wav");
        let hat = dir.path().join("hat.wav");
        write_wav(&kick, &[ramp(50)], RATE).unwrap();
        write_wav(&hat, &[ramp(80)], RATE).unwrap();
        let missing = reqwest::Url::from_file_path(dir.path().join("snare.wav")).unwrap();

        let preset = Preset {
            id: "1".to_string(),
            name: "Kit".to_string(),
            category: None,
            sounds: vec![
                PresetSound {
                    pad: 0,
                    url: kick.to_str().unwrap().to_string(),
                    name: None,
                },
                PresetSound {
                    pad: 3,
                    url: missing.to_string(),
                    name: None,
                },
                PresetSound {
                    pad: 7,
                    url: hat.to_str().unwrap().to_string(),
                    name: Some("Hat".to_string()),
                },
            ],
        };

        let mut engine = engine();
        engine.install(5, constant(10, 0.0), "old.wav");
        let mut progress = Progress::default();
        assert!(engine.load_preset(&preset, &mut progress).await);

        assert_eq!(progress.loaded, vec![(0, true), (3, false), (7, true)]);
        assert_eq!(progress.progress, vec![(0, 3), (1, 3), (2, 3), (3, 3)]);
        assert!(!engine.has_sound(5));
        assert!(!engine.has_sound(3));
        assert_eq!(engine.get_buffer_data(7).unwrap().frames(), 80);
    }

    #[tokio::test]
    async fn test_preset_invalid_pad_still_advances() {
        let dir = tempfile::tempdir().unwrap();
        let clap = dir.path().join("clap.wav");
        write_wav(&clap, &[ramp(40)], RATE).unwrap();
        let json = format!(
            r#"{{
                "id": 2,
                "name": "Odd",
                "sounds": [
                    {{"pad": -1, "url": "x.wav"}},
                    {{"pad": 20, "url": "y.wav"}},
                    {{"pad": 2, "url": {:?}}}
                ]
            }}"#,
            clap.to_str().unwrap()
        );
        let preset: Preset = serde_json::from_str(&json).unwrap();

        let mut engine = engine();
        let mut progress = Progress::default();
        assert!(engine.load_preset(&preset, &mut progress).await);
        assert_eq!(progress.loaded, vec![(-1, false), (20, false), (2, true)]);
        assert_eq!(progress.progress, vec![(0, 3), (1, 3), (2, 3), (3, 3)]);
        assert_eq!(engine.get_buffer_data(2).unwrap().frames(), 40);
    }

    #[tokio::test]
    async fn test_preset_fetch_failure_keeps_pads() {
        let mut engine = engine();
        engine.install(0, constant(10, 0.0), "keep.wav");
        let client = PresetClient::new(&config::Presets::new("http://127.0.0.1:9")).unwrap();
        let mut progress = Progress::default();
        assert!(!engine.load_preset_by_id(&client, "1", &mut progress).await);
        assert!(engine.has_sound(0));
        assert!(progress.progress.is_empty());
    }

    #[tokio::test]
    async fn test_second_start_recording_rejected() {
        let mut engine = engine();
        assert!(engine.start_recording());
        render(&engine, 10);
        assert!(!engine.start_recording());
        assert!(engine.is_track_recording());
        render(&engine, 10);

        let track = engine.stop_recording().await.unwrap();
        assert_eq!(track.frames(), 20);
        assert!(!engine.is_track_recording());
        assert!(engine.stop_recording().await.is_none());
        assert_eq!(engine.get_recorded_track().unwrap().frames(), 20);
    }

    #[tokio::test]
    async fn test_recording_independent_of_pads() {
        let mut engine = engine();
        engine.install(0, constant(100, 0.5), "c.wav");
        engine.set_loop(0, true);
        engine.play(0);
        assert!(engine.start_recording());
        render(&engine, 50);
        engine.stop_all(false);
        render(&engine, 50);
        assert!(engine.is_track_recording());
        let track = engine.stop_recording().await.unwrap();
        assert_eq!(track.frames(), 100);
    }

    #[tokio::test]
    async fn test_recorded_track_bypasses_taps() {
        let mut engine = engine();
        engine.install(0, constant(100, 0.5), "c.wav");
        engine.set_loop(0, true);
        engine.set_attack(0, 0.001);
        engine.play(0);
        engine.start_recording();
        render(&engine, 100);
        engine.stop(0, false);
        engine.stop_recording().await.unwrap();
        render(&engine, 10);

        assert!(engine.start_recording());
        assert!(engine.play_recorded_track());
        let out = render(&engine, 50);
        assert!(approx(out[20], 0.5));
        assert!(engine.is_recorded_track_playing());

        let second = engine.stop_recording().await.unwrap();
        let buffer = second.to_buffer().unwrap();
        assert!(buffer.channel(0).unwrap().iter().all(|s| *s == 0.0));
    }

    #[tokio::test]
    async fn test_load_and_save_recorded_track() {
        let mut engine = engine();
        assert!(!engine.load_recorded_track(4).await);
        engine.start_recording();
        render(&engine, 30);
        engine.stop_recording().await.unwrap();

        assert!(engine.load_recorded_track(4).await);
        assert!(engine.has_sound(4));
        assert!(engine.get_sound_url(4).unwrap().starts_with("blob:"));
        assert_eq!(engine.get_buffer_data(4).unwrap().frames(), 30);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        assert!(engine.save_recorded_track(&path));
        assert!(path.exists());
    }

    #[test]
    fn test_disabled_recorder() {
        let config = test_config().with_recorder(config::Recorder::disabled());
        let mut engine = PadEngine::new(config).unwrap();
        assert!(engine.init());
        assert!(!engine.start_recording());
    }

    #[test]
    fn test_time_domain_data() {
        let mut engine = engine();
        engine.install(0, constant(5000, 0.25), "c.wav");
        engine.set_attack(0, 0.001);
        engine.play(0);
        render(&engine, 4096);
        let data = engine.get_time_domain_data();
        assert_eq!(data.len(), 2048);
        assert!(data.iter().all(|s| approx(*s, 0.25)));
    }

    #[test]
    fn test_close_and_reinit() {
        let mut engine = engine();
        engine.install(0, constant(100, 1.0), "c.wav");
        engine.set_loop(0, true);
        engine.play(0);
        engine.close();
        assert!(!engine.is_initialized());
        assert!(!engine.is_playing(0));
        assert!(engine.has_sound(0));
        assert!(engine.init());
        assert!(engine.play(0));
    }
}
