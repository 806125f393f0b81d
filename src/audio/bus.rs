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

// Master bus: mixes every voice, feeds the analysis and recorder taps, then
// adds the direct path on top. Used by both the cpal output and the mock.
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::analysis::AnalysisTap;

/// Something the bus can render.
pub trait BusSource: Send {
    /// Unique ID for this source.
    fn id(&self) -> u64;

    /// Adds this source's output for the block starting at bus frame
    /// `block_start` into `out` (interleaved, `channels` wide). Returns false
    /// once the source has finished and should be dropped.
    fn mix_into(&mut self, out: &mut [f32], channels: usize, block_start: u64) -> bool;
}

/// Which path a source is mixed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Through the bus: heard, analysed and recorded.
    Bus,
    /// Straight to the output, bypassing the taps.
    Direct,
}

/// Notifications from the render thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusEvent {
    /// A source stopped rendering, naturally or because it was cut.
    SourceEnded(u64),
}

/// The shared mixing point.
pub struct MasterBus {
    num_channels: u16,
    sample_rate: u32,
    /// Frames rendered since creation; the bus's notion of "now".
    clock: AtomicU64,
    /// Channel for adding sources without contending on the source lists.
    source_tx: Sender<(Route, Box<dyn BusSource>)>,
    source_rx: Receiver<(Route, Box<dyn BusSource>)>,
    bus_sources: Mutex<Vec<Box<dyn BusSource>>>,
    direct_sources: Mutex<Vec<Box<dyn BusSource>>>,
    analysis: AnalysisTap,
    record_tap: Mutex<Option<Sender<Vec<f32>>>>,
    event_tx: Sender<BusEvent>,
    event_rx: Receiver<BusEvent>,
}

impl MasterBus {
    pub fn new(num_channels: u16, sample_rate: u32, analysis_size: usize) -> Self {
        let (source_tx, source_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        Self {
            num_channels: num_channels.max(1),
            sample_rate,
            clock: AtomicU64::new(0),
            source_tx,
            source_rx,
            bus_sources: Mutex::new(Vec::new()),
            direct_sources: Mutex::new(Vec::new()),
            analysis: AnalysisTap::new(analysis_size),
            record_tap: Mutex::new(None),
            event_tx,
            event_rx,
        }
    }

    pub fn num_channels(&self) -> u16 {
        self.num_channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// The next frame the bus will render.
    pub fn current_frame(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    /// Converts seconds to bus frames.
    pub fn secs_to_frames(&self, secs: f64) -> u64 {
        (secs.max(0.0) * self.sample_rate as f64).round() as u64
    }

    /// Queues a source; the render thread picks it up at its next block.
    pub fn add_source(&self, route: Route, source: Box<dyn BusSource>) {
        if self.source_tx.send((route, source)).is_err() {
            warn!("Bus source channel closed");
        }
    }

    /// Receiver for render notifications.
    pub fn events(&self) -> &Receiver<BusEvent> {
        &self.event_rx
    }

    /// Starts copying every rendered bus block (before the direct path) to
    /// `tap`. Fails if a tap is already attached.
    pub fn attach_record_tap(&self, tap: Sender<Vec<f32>>) -> bool {
        let mut slot = self.record_tap.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(tap);
        true
    }

    /// Detaches the record tap. Dropping the sender lets the receiver drain
    /// and observe disconnection.
    pub fn detach_record_tap(&self) -> bool {
        self.record_tap.lock().take().is_some()
    }

    /// A snapshot of the most recent bus samples, mono, oldest first.
    pub fn time_domain_data(&self) -> Vec<f32> {
        self.analysis.snapshot()
    }

    /// Number of sources currently being rendered on either path.
    pub fn active_source_count(&self) -> usize {
        self.bus_sources.lock().len() + self.direct_sources.lock().len()
    }

    /// Drops every source, pending or active.
    pub fn clear(&self) {
        while self.source_rx.try_recv().is_ok() {}
        let mut ended: Vec<u64> = self.bus_sources.lock().drain(..).map(|s| s.id()).collect();
        ended.extend(self.direct_sources.lock().drain(..).map(|s| s.id()));
        for id in ended {
            let _ = self.event_tx.send(BusEvent::SourceEnded(id));
        }
    }

    /// Renders `frames` frames and returns them interleaved.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; frames * self.num_channels as usize];
        self.render_into(&mut out);
        out
    }

    /// Renders one block into `out` (interleaved). This is the render thread's
    /// entry point.
    pub fn render_into(&self, out: &mut [f32]) {
        let channels = self.num_channels as usize;
        let frames = out.len() / channels;
        out.fill(0.0);

        {
            let mut bus = self.bus_sources.lock();
            let mut direct = self.direct_sources.lock();
            while let Ok((route, source)) = self.source_rx.try_recv() {
                match route {
                    Route::Bus => bus.push(source),
                    Route::Direct => direct.push(source),
                }
            }
        }

        let block_start = self.clock.load(Ordering::Acquire);
        let mut ended = Vec::new();

        self.bus_sources.lock().retain_mut(|source| {
            let alive = source.mix_into(out, channels, block_start);
            if !alive {
                ended.push(source.id());
            }
            alive
        });

        self.analysis.write_interleaved(out, channels);
        {
            let mut tap = self.record_tap.lock();
            if let Some(tx) = tap.as_ref() {
                if tx.send(out.to_vec()).is_err() {
                    debug!("Record tap receiver gone, detaching");
                    *tap = None;
                }
            }
        }

        self.direct_sources.lock().retain_mut(|source| {
            let alive = source.mix_into(out, channels, block_start);
            if !alive {
                ended.push(source.id());
            }
            alive
        });

        self.clock.fetch_add(frames as u64, Ordering::AcqRel);

        for id in ended {
            let _ = self.event_tx.send(BusEvent::SourceEnded(id));
        }
    }
}

impl std::fmt::Debug for MasterBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterBus")
            .field("num_channels", &self.num_channels)
            .field("sample_rate", &self.sample_rate)
            .field("current_frame", &self.current_frame())
            .finish()
    }
}
