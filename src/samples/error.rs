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

use crate::audio::DecodeError;

/// Why a pad load failed. The slot is left untouched in every case.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Invalid source reference {0:?}")]
    InvalidSource(String),

    #[error("Unknown blob {0}")]
    UnknownBlob(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),
}

/// Failures the engine reports as `false`/`None` on its public surface.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Engine is not initialized")]
    Uninitialized,

    #[error("Pad index {0} is out of range")]
    InvalidPad(usize),

    #[error("Pad {0} has no sound loaded")]
    NoSound(usize),

    #[error("Audio output error: {0}")]
    Output(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Loader setup failed: {0}")]
    Load(#[from] LoadError),

    #[error("Recorder setup failed: {0}")]
    Recorder(#[from] crate::recorder::RecorderError),
}
