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

use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use duration_string::DurationString;
use padsampler::samples::PAD_COUNT;
use padsampler::{
    audio, EngineConfig, LoadListener, PadEngine, PlayMode, Preset, PresetClient,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sixteen pad sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Lists the presets served by the configured preset API.
    Presets {
        /// The path to the engine config.
        config: PathBuf,
    },
    /// Loads a preset and plays its pads one after another.
    Audition {
        /// The path to the engine config.
        config: PathBuf,
        /// A preset ID known to the API, or the path to a preset JSON file.
        preset: String,
        /// The pads to play, in order. Should be in the form 0,3,7. Defaults to every loaded pad.
        #[arg(short, long, value_delimiter = ',')]
        pads: Vec<usize>,
        /// How long each pad plays before the next starts.
        #[arg(short, long, default_value = "750ms")]
        gap: String,
        /// Records the bus to this WAV file while auditioning.
        #[arg(short, long)]
        record: Option<PathBuf>,
    },
}

/// Prints preset load progress.
struct ConsoleProgress;

impl LoadListener for ConsoleProgress {
    fn on_pad_loaded(&mut self, pad: i64, ok: bool) {
        if ok {
            println!("  pad {:>2}: loaded", pad);
        } else {
            println!("  pad {:>2}: FAILED", pad);
        }
    }

    fn on_progress(&mut self, loaded: usize, total: usize) {
        info!(loaded, total, "Preset progress");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Presets { config } => {
            let config = EngineConfig::load(Some(&config))?;
            let client = PresetClient::new(config.presets())?;
            let presets = client.list().await?;

            if presets.is_empty() {
                println!("No presets found at {}.", client.api_base());
                return Ok(());
            }

            println!("Presets (count: {}):", presets.len());
            for preset in presets {
                println!("- {}", preset);
            }
        }
        Commands::Audition {
            config,
            preset,
            pads,
            gap,
            record,
        } => {
            let config = EngineConfig::load(Some(&config))?;
            let gap: Duration = DurationString::from_string(gap)?.into();
            audition(config, &preset, pads, gap, record.as_deref()).await?;
        }
    }

    Ok(())
}

async fn audition(
    config: EngineConfig,
    preset: &str,
    pads: Vec<usize>,
    gap: Duration,
    record: Option<&Path>,
) -> Result<(), Box<dyn Error>> {
    let client = PresetClient::new(config.presets())?;
    let mut engine = PadEngine::new(config)?;
    if !engine.init() {
        return Err("unable to open the audio output".into());
    }

    let loaded = if Path::new(preset).is_file() {
        let preset = Preset::from_file(Path::new(preset))?;
        println!("Loading {}", preset);
        engine.load_preset(&preset, &mut ConsoleProgress).await
    } else {
        println!("Loading preset {}", preset);
        engine
            .load_preset_by_id(&client, preset, &mut ConsoleProgress)
            .await
    };
    if !loaded {
        return Err(format!("unable to load preset {}", preset).into());
    }

    let pads: Vec<usize> = if pads.is_empty() {
        (0..PAD_COUNT).filter(|pad| engine.has_sound(*pad)).collect()
    } else {
        pads
    };

    if record.is_some() && !engine.start_recording() {
        return Err("unable to start recording".into());
    }

    for pad in pads {
        if !engine.play(pad) {
            println!("Pad {} has nothing to play", pad);
            continue;
        }
        println!("Playing pad {}", pad);
        wait(&engine, gap).await;
        key_up(&mut engine, pad);
    }

    // Let release tails ring out.
    wait(&engine, Duration::from_millis(500)).await;

    if let Some(path) = record {
        match engine.stop_recording().await {
            Some(track) => {
                track.save(path)?;
                println!(
                    "Recorded {:.2}s to {}",
                    track.duration().as_secs_f64(),
                    path.display()
                );
            }
            None => println!("Nothing was recorded"),
        }
    }

    engine.close();
    Ok(())
}

/// Ends a press the way a pad controller would: gate pads release, one-shot
/// pads keep ringing. Returns whether a release was issued.
fn key_up(engine: &mut PadEngine, pad: usize) -> bool {
    let gated = engine
        .get_pad_settings(pad)
        .is_some_and(|settings| settings.play_mode == PlayMode::Gate);
    if gated {
        engine.stop(pad, true);
    }
    gated
}

/// Lets `duration` of audio pass, rendering it ourselves on a manual clock.
async fn wait(engine: &PadEngine, duration: Duration) {
    match engine.bus() {
        Some(bus) if engine.is_manual_clock() => {
            let frames = (duration.as_secs_f64() * bus.sample_rate() as f64) as usize;
            bus.render(frames);
        }
        _ => tokio::time::sleep(duration).await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use padsampler::audio::PcmBuffer;
    use padsampler::config;

    use super::*;

    #[test]
    fn test_key_up_only_releases_gate_pads() {
        let config = EngineConfig::mock().with_audio(
            config::Audio::new("mock")
                .with_sample_rate(1000)
                .with_channels(1)
                .with_latency("0ms"),
        );
        let mut engine = PadEngine::new(config).unwrap();
        assert!(engine.init());
        let buffer = Arc::new(PcmBuffer::from_planar(vec![vec![0.5; 5000]], 1000).unwrap());
        engine.install(0, buffer.clone(), "one-shot.wav");
        engine.install(1, buffer, "gate.wav");
        engine.set_play_mode(1, PlayMode::Gate);

        assert!(engine.play(0));
        assert!(engine.play(1));
        engine.bus().unwrap().render(100);

        assert!(!key_up(&mut engine, 0));
        assert!(engine.active_voice(0).is_some());
        assert!(key_up(&mut engine, 1));
        assert!(engine.active_voice(1).is_none());
        assert!(!key_up(&mut engine, 16));
    }
}
