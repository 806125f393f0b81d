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
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, info, span, Level};

use super::MasterBus;
use crate::config;

const DEFAULT_MOCK_SAMPLE_RATE: u32 = 44100;

/// Block size used by the paced mock.
const REALTIME_BLOCK_FRAMES: usize = 256;

/// A mock output. Doesn't actually play anything.
///
/// A device named "mock-realtime" renders the bus on a background thread
/// paced to wall-clock time. Any other "mock*" name leaves the clock alone
/// so tests can render blocks themselves.
pub struct Output {
    name: String,
    sample_rate: u32,
    stop: Arc<AtomicBool>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl Output {
    pub fn open(
        config: &config::Audio,
        analysis_size: usize,
    ) -> Result<(Arc<MasterBus>, Output), Box<dyn Error>> {
        let sample_rate = config.sample_rate().unwrap_or(DEFAULT_MOCK_SAMPLE_RATE);
        let bus = Arc::new(MasterBus::new(
            config.channels(),
            sample_rate,
            analysis_size,
        ));
        let stop = Arc::new(AtomicBool::new(false));

        let join_handle = if config.device() == "mock-realtime" {
            let bus = bus.clone();
            let stop = stop.clone();
            Some(
                thread::Builder::new()
                    .name("mock-render".to_string())
                    .spawn(move || render_paced(bus, stop))?,
            )
        } else {
            None
        };

        info!(
            device = config.device(),
            sample_rate,
            channels = config.channels(),
            "Opened mock output"
        );

        Ok((
            bus,
            Output {
                name: config.device().to_string(),
                sample_rate,
                stop,
                join_handle,
            },
        ))
    }
}

/// Renders blocks so the bus clock tracks wall-clock time.
fn render_paced(bus: Arc<MasterBus>, stop: Arc<AtomicBool>) {
    let span = span!(Level::DEBUG, "mock render");
    let _enter = span.enter();

    let block = Duration::from_secs_f64(REALTIME_BLOCK_FRAMES as f64 / bus.sample_rate() as f64);
    let mut scratch = vec![0.0f32; REALTIME_BLOCK_FRAMES * bus.num_channels() as usize];
    let started = Instant::now();
    let mut rendered = Duration::ZERO;

    while !stop.load(Ordering::Relaxed) {
        bus.render_into(&mut scratch);
        rendered += block;
        if let Some(ahead) = rendered.checked_sub(started.elapsed()) {
            thread::sleep(ahead);
        }
    }
    debug!("Mock render thread stopped");
}

impl super::Output for Output {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn is_manual(&self) -> bool {
        self.join_handle.is_none()
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.join();
        }
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        super::Output::close(self);
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
