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

use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

mod audio;
mod error;
mod loader;
mod recorder;

pub use self::audio::{Audio, DEFAULT_SCHEDULE_FRAMES};
pub use self::error::ConfigError;
pub use self::loader::{Loader, Presets};
pub use self::recorder::{Analysis, Recorder};

/// Prefix for environment overrides, e.g. PADSAMPLER__AUDIO__DEVICE=mock.
const ENV_PREFIX: &str = "PADSAMPLER";

/// The full engine configuration. Every section is optional.
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct EngineConfig {
    audio: Audio,
    loader: Loader,
    presets: Presets,
    recorder: Recorder,
    analysis: Analysis,
}

impl EngineConfig {
    /// Loads the configuration from an optional YAML file, then applies
    /// PADSAMPLER__SECTION__FIELD environment overrides.
    pub fn load(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        Ok(builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<EngineConfig>()?)
    }

    /// A configuration using the manual-clock mock backend.
    pub fn mock() -> EngineConfig {
        EngineConfig {
            audio: Audio::new("mock"),
            ..Default::default()
        }
    }

    pub fn audio(&self) -> &Audio {
        &self.audio
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn presets(&self) -> &Presets {
        &self.presets
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    pub fn with_audio(mut self, audio: Audio) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_loader(mut self, loader: Loader) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_presets(mut self, presets: Presets) -> Self {
        self.presets = presets;
        self
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = recorder;
        self
    }
}
