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

//! Per-pad playback parameters.
//!
//! Every setter clamps into range and keeps the trim window at least
//! [`MIN_TRIM_WINDOW`] wide by moving the other bound. Non-finite input is
//! rejected so a bad slider value never poisons the table.

use serde::{Deserialize, Serialize};

use super::store::PAD_COUNT;

/// Smallest allowed `trim_end - trim_start`.
pub const MIN_TRIM_WINDOW: f64 = 0.01;

pub const PITCH_RANGE: (f64, f64) = (0.25, 4.0);
pub const VOLUME_RANGE: (f64, f64) = (0.0, 1.0);
pub const ATTACK_RANGE: (f64, f64) = (0.001, 2.0);
pub const RELEASE_RANGE: (f64, f64) = (0.001, 5.0);

/// How the caller is expected to drive a pad.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayMode {
    /// Triggered once per press; plays to completion.
    #[default]
    OneShot,
    /// Plays while held; released with a ramp on key-up.
    Gate,
}

/// The trim window as fractions of the buffer duration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrimValues {
    pub start: f64,
    pub end: f64,
}

/// One pad's mutable configuration.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PadSettings {
    pub trim_start: f64,
    pub trim_end: f64,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub pitch: f64,
    pub volume: f64,
    pub reverse: bool,
    pub play_mode: PlayMode,
    /// Seconds.
    pub attack: f64,
    /// Seconds.
    pub release: f64,
}

impl Default for PadSettings {
    fn default() -> Self {
        PadSettings {
            trim_start: 0.0,
            trim_end: 1.0,
            looping: false,
            pitch: 1.0,
            volume: 1.0,
            reverse: false,
            play_mode: PlayMode::OneShot,
            attack: 0.01,
            release: 0.1,
        }
    }
}

fn clamp(value: f64, (min, max): (f64, f64)) -> Option<f64> {
    value.is_finite().then(|| value.clamp(min, max))
}

/// The largest start that still leaves a full window before 1.0.
fn max_trim_start() -> f64 {
    let mut start = 1.0 - MIN_TRIM_WINDOW;
    while 1.0 - start < MIN_TRIM_WINDOW {
        start = step_down(start);
    }
    start
}

/// The next representable value above a non-negative `value`.
fn step_up(value: f64) -> f64 {
    f64::from_bits(value.to_bits() + 1)
}

/// The next representable value below a positive `value`.
fn step_down(value: f64) -> f64 {
    f64::from_bits(value.to_bits() - 1)
}

impl PadSettings {
    pub fn trim(&self) -> TrimValues {
        TrimValues {
            start: self.trim_start,
            end: self.trim_end,
        }
    }

    /// Moves the start bound, pushing the end out if the window would get
    /// too small. Returns false for non-finite input.
    pub fn set_trim_start(&mut self, value: f64) -> bool {
        let Some(start) = clamp(value, (0.0, max_trim_start())) else {
            return false;
        };
        self.trim_start = start;
        if self.trim_end - start < MIN_TRIM_WINDOW {
            // start + MIN can round so the difference lands a hair short.
            let mut end = (start + MIN_TRIM_WINDOW).min(1.0);
            while end - start < MIN_TRIM_WINDOW && end < 1.0 {
                end = step_up(end).min(1.0);
            }
            self.trim_end = end;
        }
        true
    }

    /// Moves the end bound, pulling the start in if the window would get too
    /// small. Returns false for non-finite input.
    pub fn set_trim_end(&mut self, value: f64) -> bool {
        let Some(end) = clamp(value, (MIN_TRIM_WINDOW, 1.0)) else {
            return false;
        };
        self.trim_end = end;
        if end - self.trim_start < MIN_TRIM_WINDOW {
            let mut start = (end - MIN_TRIM_WINDOW).max(0.0);
            while end - start < MIN_TRIM_WINDOW && start > 0.0 {
                start = step_down(start).max(0.0);
            }
            self.trim_start = start;
        }
        true
    }

    pub fn set_pitch(&mut self, value: f64) -> bool {
        clamp(value, PITCH_RANGE).map(|v| self.pitch = v).is_some()
    }

    pub fn set_volume(&mut self, value: f64) -> bool {
        clamp(value, VOLUME_RANGE).map(|v| self.volume = v).is_some()
    }

    pub fn set_attack(&mut self, value: f64) -> bool {
        clamp(value, ATTACK_RANGE).map(|v| self.attack = v).is_some()
    }

    pub fn set_release(&mut self, value: f64) -> bool {
        clamp(value, RELEASE_RANGE).map(|v| self.release = v).is_some()
    }
}

/// Settings for every pad.
#[derive(Clone, Debug, Default)]
pub struct ParamTable {
    pads: [PadSettings; PAD_COUNT],
}

impl ParamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pad: usize) -> Option<&PadSettings> {
        self.pads.get(pad)
    }

    pub fn get_mut(&mut self, pad: usize) -> Option<&mut PadSettings> {
        self.pads.get_mut(pad)
    }

    pub fn reset(&mut self, pad: usize) -> bool {
        self.get_mut(pad)
            .map(|settings| *settings = PadSettings::default())
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_window(settings: &PadSettings) {
        assert!(settings.trim_start >= 0.0);
        assert!(settings.trim_end <= 1.0);
        assert!(
            settings.trim_end - settings.trim_start >= MIN_TRIM_WINDOW,
            "window too small: {:?}",
            settings.trim()
        );
    }

    #[test]
    fn test_defaults() {
        let settings = PadSettings::default();
        assert_eq!(settings.trim(), TrimValues { start: 0.0, end: 1.0 });
        assert!(!settings.looping);
        assert_eq!(settings.pitch, 1.0);
        assert_eq!(settings.volume, 1.0);
        assert!(!settings.reverse);
        assert_eq!(settings.play_mode, PlayMode::OneShot);
        assert_eq!(settings.attack, 0.01);
        assert_eq!(settings.release, 0.1);
    }

    #[test]
    fn test_trim_start_pushes_end() {
        let mut settings = PadSettings::default();
        settings.set_trim_end(0.5);
        settings.set_trim_start(0.495);
        assert_eq!(settings.trim_start, 0.495);
        assert!((settings.trim_end - 0.505).abs() < 1e-9);
        assert_window(&settings);
    }

    #[test]
    fn test_trim_end_pulls_start() {
        let mut settings = PadSettings::default();
        settings.set_trim_start(0.6);
        settings.set_trim_end(0.2);
        assert_eq!(settings.trim_end, 0.2);
        assert!((settings.trim_start - 0.19).abs() < 1e-9);
        assert_window(&settings);
    }

    #[test]
    fn test_trim_extremes() {
        let mut settings = PadSettings::default();
        settings.set_trim_start(1.0);
        assert!((settings.trim_start - 0.99).abs() < 1e-12);
        assert_eq!(settings.trim_end, 1.0);
        assert_window(&settings);

        settings.set_trim_end(-3.0);
        assert_eq!(settings.trim_end, MIN_TRIM_WINDOW);
        assert_eq!(settings.trim_start, 0.0);
        assert_window(&settings);
    }

    #[test]
    fn test_same_value_both_bounds() {
        for i in 0..=1000 {
            let v = i as f64 / 1000.0;

            let mut settings = PadSettings::default();
            settings.set_trim_start(v);
            assert_window(&settings);
            settings.set_trim_end(v);
            assert_window(&settings);

            let mut settings = PadSettings::default();
            settings.set_trim_end(v);
            assert_window(&settings);
            settings.set_trim_start(v);
            assert_window(&settings);
        }
    }

    #[test]
    fn test_window_exact_after_rounding() {
        // 0.026 - 0.016 rounds below 0.01 without correction.
        let mut settings = PadSettings::default();
        settings.set_trim_start(0.026);
        settings.set_trim_end(0.026);
        assert_eq!(settings.trim_end, 0.026);
        assert!(settings.trim_end - settings.trim_start >= MIN_TRIM_WINDOW);
        assert!(settings.trim_start < 0.016 + 1e-12);
    }

    #[test]
    fn test_ranges_clamp() {
        let mut settings = PadSettings::default();
        settings.set_pitch(10.0);
        assert_eq!(settings.pitch, 4.0);
        settings.set_pitch(0.0);
        assert_eq!(settings.pitch, 0.25);
        settings.set_volume(1.5);
        assert_eq!(settings.volume, 1.0);
        settings.set_attack(0.0);
        assert_eq!(settings.attack, 0.001);
        settings.set_release(9.0);
        assert_eq!(settings.release, 5.0);
    }

    #[test]
    fn test_non_finite_rejected() {
        let mut settings = PadSettings::default();
        assert!(!settings.set_pitch(f64::NAN));
        assert!(!settings.set_trim_start(f64::INFINITY));
        assert!(!settings.set_volume(f64::NEG_INFINITY));
        assert_eq!(settings, PadSettings::default());
    }

    #[test]
    fn test_table_reset() {
        let mut table = ParamTable::new();
        table.get_mut(4).unwrap().set_pitch(2.0);
        assert!(table.reset(4));
        assert_eq!(table.get(4), Some(&PadSettings::default()));
        assert!(!table.reset(16));
        assert!(table.get(16).is_none());
    }

    #[test]
    fn test_settings_json_shape() {
        let json = serde_json::to_value(PadSettings::default()).unwrap();
        assert_eq!(json["trimStart"], 0.0);
        assert_eq!(json["loop"], false);
        assert_eq!(json["playMode"], "oneshot");
    }
}
