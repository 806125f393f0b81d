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

use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info, span, warn, Level};

use super::thread_priority::CallbackPriority;
use super::{DeviceInfo, MasterBus};
use crate::config;

/// How often the stream-owning thread checks for shutdown.
const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(50);

/// A cpal output stream rendering the master bus.
pub struct Output {
    name: String,
    host: String,
    sample_rate: u32,
    channels: u16,
    stop: Arc<AtomicBool>,
    /// The stream is not Send on every host, so it lives on this thread.
    stream_thread: Option<thread::JoinHandle<()>>,
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}, {} Hz) ({})",
            self.name, self.channels, self.sample_rate, self.host
        )
    }
}

/// f32 callback: render straight into the cpal buffer.
fn create_f32_callback(
    bus: Arc<MasterBus>,
    mut priority: CallbackPriority,
) -> impl FnMut(&mut [f32], &cpal::OutputCallbackInfo) + Send + 'static {
    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        priority.promote_current_thread();
        bus.render_into(data);
    }
}

/// Integer callback: render into scratch and convert.
fn create_converting_callback<T>(
    bus: Arc<MasterBus>,
    mut priority: CallbackPriority,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch: Vec<f32> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        priority.promote_current_thread();
        scratch.resize(data.len(), 0.0);
        bus.render_into(&mut scratch);
        for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
            *dst = T::from_sample(src);
        }
    }
}

fn err_fn(err: cpal::StreamError) {
    error!("CPAL output stream error: {}", err);
}

fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    bus: Arc<MasterBus>,
    priority: CallbackPriority,
) -> Result<cpal::Stream, Box<dyn Error>> {
    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_output_stream(
            config,
            create_f32_callback(bus, priority),
            err_fn,
            None,
        )?,
        cpal::SampleFormat::I16 => device.build_output_stream(
            config,
            create_converting_callback::<i16>(bus, priority),
            err_fn,
            None,
        )?,
        cpal::SampleFormat::I32 => device.build_output_stream(
            config,
            create_converting_callback::<i32>(bus, priority),
            err_fn,
            None,
        )?,
        cpal::SampleFormat::U16 => device.build_output_stream(
            config,
            create_converting_callback::<u16>(bus, priority),
            err_fn,
            None,
        )?,
        other => return Err(format!("unsupported device sample format {:?}", other).into()),
    };
    Ok(stream)
}

impl Output {
    /// Opens the configured device, creates a bus at its rate and starts
    /// the stream.
    pub fn open(
        config: &config::Audio,
        analysis_size: usize,
    ) -> Result<(Arc<MasterBus>, Output), Box<dyn Error>> {
        let span = span!(Level::INFO, "open output", device = config.device());
        let _enter = span.enter();

        let priority = CallbackPriority::from_config(config)?;
        let (device, host) = find_device(config.device())?;
        let default_config = device.default_output_config()?;
        let sample_rate = config
            .sample_rate()
            .unwrap_or(default_config.sample_rate().0);
        let channels = config.channels();
        let sample_format = default_config.sample_format();
        let stream_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: match config.buffer_size() {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        };

        let bus = Arc::new(MasterBus::new(channels, sample_rate, analysis_size));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        let stream_thread = {
            let bus = bus.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("cpal-output".to_string())
                .spawn(move || {
                    let stream = match build_stream(
                        &device,
                        &stream_config,
                        sample_format,
                        bus,
                        priority,
                    ) {
                        Ok(stream) => stream,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    if let Err(e) = stream.play() {
                        let _ = ready_tx.send(Err(e.to_string()));
                        return;
                    }
                    let _ = ready_tx.send(Ok(()));

                    while !stop.load(Ordering::Relaxed) {
                        thread::sleep(KEEPALIVE_INTERVAL);
                    }
                    drop(stream);
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = stream_thread.join();
                return Err(format!("failed to start output stream: {}", e).into());
            }
            Err(_) => {
                let _ = stream_thread.join();
                return Err("output thread exited before starting the stream".into());
            }
        }

        info!(
            device = config.device(),
            host = %host,
            sample_rate,
            channels,
            format = ?sample_format,
            realtime = config.realtime(),
            "CPAL output stream started"
        );

        Ok((
            bus,
            Output {
                name: config.device().to_string(),
                host,
                sample_rate,
                channels,
                stop,
                stream_thread: Some(stream_thread),
            },
        ))
    }
}

impl super::Output for Output {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(stream_thread) = self.stream_thread.take() {
            if stream_thread.join().is_err() {
                warn!(device = %self.name, "Output thread panicked");
            }
        }
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        super::Output::close(self);
    }
}

/// Finds a device by name. "default" is the default host's default output.
fn find_device(name: &str) -> Result<(cpal::Device, String), Box<dyn Error>> {
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    if name == "default" {
        let host = cpal::default_host();
        let host_name = host.id().name().to_string();
        return match host.default_output_device() {
            Some(device) => Ok((device, host_name)),
            None => Err("no default output device".into()),
        };
    }

    for host_id in cpal::available_hosts() {
        let devices = match cpal::host_from_id(host_id)?.devices() {
            Ok(devices) => devices,
            Err(e) => {
                error!(
                    err = %e,
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };
        for device in devices {
            if device.name().is_ok_and(|n| n.trim() == name) {
                return Ok((device, host_id.name().to_string()));
            }
        }
    }
    Err(format!("no device found with name {}", name).into())
}

/// Lists cpal output devices.
pub fn list() -> Result<Vec<DeviceInfo>, Box<dyn Error>> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host_devices = match cpal::host_from_id(host_id)?.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = %e,
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs
                .map(|output_config| output_config.channels())
                .max()
                .unwrap_or(0);

            if max_channels > 0 {
                devices.push(DeviceInfo {
                    name: device.name()?,
                    host: host_id.name().to_string(),
                    max_channels,
                });
            }
        }
    }

    devices.sort_by_key(|device| device.name.to_string());
    Ok(devices)
}
