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

//! A sixteen pad sample player: per-pad trim, pitch, loop and envelope
//! control, live parameter changes, and recording of the master bus.

pub mod audio;
pub mod config;
pub mod preset;
pub mod recorder;
pub mod samples;
#[cfg(test)]
mod testutil;

pub use config::EngineConfig;
pub use preset::{LoadListener, Preset, PresetClient, PresetSummary};
pub use recorder::RecordedTrack;
pub use samples::{PadEngine, PadSettings, PlayMode};
