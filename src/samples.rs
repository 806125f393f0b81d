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

//! Pad sample playback.
//!
//! This module provides:
//! - The sixteen pad slots and their loaded buffers
//! - Per-pad parameters (trim, loop, pitch, volume, reverse, mode, envelope)
//! - Fetching, decoding and reversing sample buffers
//! - Voice tracking and the pad engine that drives the master bus

mod engine;
mod error;
mod fetch;
mod loader;
mod params;
mod reverse;
mod store;
mod voice;

pub use engine::PadEngine;
pub use error::{EngineError, LoadError};
pub use fetch::{resolve_source, BlobRegistry, Fetcher, ResolvedSource};
pub use loader::SampleLoader;
pub use params::{PadSettings, PlayMode, TrimValues, MIN_TRIM_WINDOW};
pub use reverse::{get_reversed, ReversalCache};
pub use store::{valid_pad, PadSlot, SampleStore, PAD_COUNT};
pub use voice::{PlayWindow, VoiceHandle, VoiceId, VoiceSource};
