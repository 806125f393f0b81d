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

use std::time::Duration;

use serde::Deserialize;

use super::error::{parse_duration, ConfigError};

const DEFAULT_ORIGIN: &str = "http://localhost:3000";
const DEFAULT_PROXY: &str = "/api/proxy";
const DEFAULT_TIMEOUT: &str = "30s";
const DEFAULT_API_BASE: &str = "http://localhost:3000/api";

/// Where sample bytes come from.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Loader {
    /// The origin considered "same-origin"; relative refs resolve against it.
    origin: String,

    /// Path of the proxy endpoint used for cross-origin URLs.
    proxy: String,

    /// HTTP request timeout.
    timeout: String,
}

impl Default for Loader {
    fn default() -> Self {
        Loader {
            origin: DEFAULT_ORIGIN.to_string(),
            proxy: DEFAULT_PROXY.to_string(),
            timeout: DEFAULT_TIMEOUT.to_string(),
        }
    }
}

impl Loader {
    pub fn new(origin: &str, proxy: &str) -> Loader {
        Loader {
            origin: origin.trim_end_matches('/').to_string(),
            proxy: proxy.to_string(),
            ..Default::default()
        }
    }

    pub fn origin(&self) -> &str {
        self.origin.trim_end_matches('/')
    }

    pub fn proxy(&self) -> &str {
        &self.proxy
    }

    pub fn timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration("loader.timeout", &self.timeout)
    }
}

/// The preset API.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Presets {
    api_base: String,
}

impl Default for Presets {
    fn default() -> Self {
        Presets {
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

impl Presets {
    pub fn new(api_base: &str) -> Presets {
        Presets {
            api_base: api_base.to_string(),
        }
    }

    /// The API root, without a trailing slash.
    pub fn api_base(&self) -> &str {
        self.api_base.trim_end_matches('/')
    }
}
