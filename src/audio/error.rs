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

/// Error types for decoding audio into memory.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Unsupported or unrecognized audio: {0}")]
    Unsupported(String),

    #[error("No audio track found")]
    NoTrack,

    #[error("Sample rate not specified")]
    NoSampleRate,

    #[error("Decoded audio contains no samples")]
    Empty,

    #[error("Malformed audio buffer: {0}")]
    Malformed(String),

    #[error("Audio file error: {0}")]
    AudioError(#[from] symphonia::core::errors::Error),
}
