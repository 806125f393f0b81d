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

//! Preset descriptors and the API that serves them.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::config;
use crate::samples::valid_pad;

const PRESET_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum PresetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Accepts ids sent as either strings or numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(text) => text,
        Id::Number(number) => number.to_string(),
    })
}

/// One sound in a preset. `pad` is kept as declared, so an out-of-range
/// or negative index still parses and is rejected per sound at load time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresetSound {
    pub pad: i64,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PresetSound {
    /// The pad this sound targets, if it names one of the sixteen pads.
    pub fn pad_index(&self) -> Option<usize> {
        usize::try_from(self.pad).ok().filter(|pad| valid_pad(*pad))
    }
}

/// A full preset descriptor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub sounds: Vec<PresetSound>,
}

impl Preset {
    /// Reads an offline JSON descriptor.
    pub fn from_file(path: &Path) -> Result<Preset, PresetError> {
        let preset: Preset = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        debug!(path = ?path, id = %preset.id, sounds = preset.sounds.len(), "Read preset file");
        Ok(preset)
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} sounds)", self.name, self.sounds.len())
    }
}

/// A preset as listed by the API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetSummary {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub sound_count: usize,
}

impl fmt::Display for PresetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.category {
            Some(category) => write!(
                f,
                "{}: {} [{}] ({} sounds)",
                self.id, self.name, category, self.sound_count
            ),
            None => write!(f, "{}: {} ({} sounds)", self.id, self.name, self.sound_count),
        }
    }
}

/// Some deployments wrap the list in an object.
#[derive(Deserialize)]
#[serde(untagged)]
enum PresetList {
    Bare(Vec<PresetSummary>),
    Wrapped { presets: Vec<PresetSummary> },
}

/// Client for the preset API.
#[derive(Clone)]
pub struct PresetClient {
    client: reqwest::Client,
    api_base: String,
}

impl PresetClient {
    pub fn new(config: &config::Presets) -> Result<Self, PresetError> {
        let client = reqwest::Client::builder()
            .timeout(PRESET_REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base().to_string(),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// `GET {api_base}/presets`
    pub async fn list(&self) -> Result<Vec<PresetSummary>, PresetError> {
        let url = format!("{}/presets", self.api_base);
        let list: PresetList = self.get_json(&url).await?;
        let presets = match list {
            PresetList::Bare(presets) | PresetList::Wrapped { presets } => presets,
        };
        info!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// `GET {api_base}/presets/{id}`
    pub async fn get(&self, id: &str) -> Result<Preset, PresetError> {
        let url = format!("{}/presets/{}", self.api_base, id);
        let preset: Preset = self.get_json(&url).await?;
        info!(id = %preset.id, name = %preset.name, sounds = preset.sounds.len(), "Fetched preset");
        Ok(preset)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, PresetError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(PresetError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

/// Receives per-pad results and progress while a preset loads. Both methods
/// default to doing nothing.
pub trait LoadListener {
    /// Called once per declared sound, in declaration order, with the pad
    /// index exactly as the descriptor declared it.
    fn on_pad_loaded(&mut self, _pad: i64, _ok: bool) {}

    /// Called once before any load with `(0, total)` and once after each load.
    fn on_progress(&mut self, _loaded: usize, _total: usize) {}
}

impl LoadListener for () {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_json() {
        let preset: Preset = serde_json::from_str(
            r#"{
                "id": 12,
                "name": "Boom Bap",
                "category": "drums",
                "sounds": [
                    {"pad": 0, "url": "/sounds/kick.wav", "name": "Kick"},
                    {"pad": 3, "url": "https://cdn.example.com/snare.wav"}
                ],
                "createdAt": "2024-01-01"
            }"#,
        )
        .unwrap();
        assert_eq!(preset.id, "12");
        assert_eq!(preset.category.as_deref(), Some("drums"));
        assert_eq!(preset.sounds.len(), 2);
        assert_eq!(preset.sounds[1].name, None);
        assert_eq!(preset.to_string(), "Boom Bap (2 sounds)");
    }

    #[test]
    fn test_out_of_range_pads_still_parse() {
        let preset: Preset = serde_json::from_str(
            r#"{
                "id": "odd",
                "name": "Odd",
                "sounds": [
                    {"pad": -1, "url": "a.wav"},
                    {"pad": 15, "url": "b.wav"},
                    {"pad": 16, "url": "c.wav"}
                ]
            }"#,
        )
        .unwrap();
        let pads: Vec<Option<usize>> = preset.sounds.iter().map(PresetSound::pad_index).collect();
        assert_eq!(pads, vec![None, Some(15), None]);
        assert_eq!(preset.sounds[0].pad, -1);
    }

    #[test]
    fn test_summary_list_shapes() {
        let bare: PresetList =
            serde_json::from_str(r#"[{"id": "a", "name": "A", "soundCount": 4}]"#).unwrap();
        let wrapped: PresetList = serde_json::from_str(
            r#"{"presets": [{"id": 1, "name": "B", "category": "fx", "soundCount": 2}]}"#,
        )
        .unwrap();
        let PresetList::Bare(bare) = bare else {
            panic!("expected bare list");
        };
        assert_eq!(bare[0].sound_count, 4);
        let PresetList::Wrapped { presets } = wrapped else {
            panic!("expected wrapped list");
        };
        assert_eq!(presets[0].to_string(), "1: B [fx] (2 sounds)");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preset.json");
        std::fs::write(&path, r#"{"id": "x", "name": "X", "sounds": []}"#).unwrap();
        let preset = Preset::from_file(&path).unwrap();
        assert_eq!(preset.id, "x");
        assert!(preset.sounds.is_empty());

        std::fs::write(&path, "{").unwrap();
        assert!(matches!(Preset::from_file(&path), Err(PresetError::Json(_))));
    }

    #[tokio::test]
    async fn test_unreachable_api() {
        let client = PresetClient::new(&config::Presets::new("http://127.0.0.1:9")).unwrap();
        assert!(client.list().await.is_err());
        assert!(client.get("1").await.is_err());
    }
}
