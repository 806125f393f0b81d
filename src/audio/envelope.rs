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

//! Sample-accurate gain automation for voices.
//!
//! An [`Envelope`] is an ordered list of automation events expressed in
//! absolute bus frames. Values between events are either held (after a set)
//! or linearly interpolated (when the next event is a ramp).

/// A single automation event.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Event {
    /// Jump to `value` at `frame`.
    Set { frame: u64, value: f32 },
    /// Arrive at `value` at `frame`, ramping linearly from the previous event.
    Ramp { frame: u64, value: f32 },
}

impl Event {
    fn frame(&self) -> u64 {
        match self {
            Event::Set { frame, .. } | Event::Ramp { frame, .. } => *frame,
        }
    }

    fn value(&self) -> f32 {
        match self {
            Event::Set { value, .. } | Event::Ramp { value, .. } => *value,
        }
    }
}

/// Gain automation timeline.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// Value before the first event.
    initial: f32,
    /// Events sorted by frame. Events on the same frame keep insertion order.
    events: Vec<Event>,
}

impl Envelope {
    pub fn new(initial: f32) -> Self {
        Self {
            initial,
            events: Vec::new(),
        }
    }

    fn insert(&mut self, event: Event) {
        let index = self.events.partition_point(|e| e.frame() <= event.frame());
        self.events.insert(index, event);
    }

    /// Schedules an immediate jump to `value` at `frame`.
    pub fn set_value_at(&mut self, value: f32, frame: u64) {
        self.insert(Event::Set { frame, value });
    }

    /// Schedules a linear ramp that reaches `value` at `end_frame`, starting
    /// from whatever the previous event leaves behind.
    pub fn linear_ramp_to(&mut self, value: f32, end_frame: u64) {
        self.insert(Event::Ramp {
            frame: end_frame,
            value,
        });
    }

    /// The instantaneous gain at `frame`.
    pub fn value_at(&self, frame: u64) -> f32 {
        let next_index = self.events.partition_point(|e| e.frame() <= frame);
        let (start_frame, start_value) = match next_index.checked_sub(1) {
            Some(i) => (self.events[i].frame(), self.events[i].value()),
            None => (0, self.initial),
        };

        match self.events.get(next_index) {
            Some(Event::Ramp {
                frame: end_frame,
                value: end_value,
            }) => {
                let span = end_frame.saturating_sub(start_frame);
                if span == 0 {
                    return *end_value;
                }
                let progress = (frame.saturating_sub(start_frame)) as f64 / span as f64;
                start_value + (end_value - start_value) * progress as f32
            }
            _ => start_value,
        }
    }

    /// Fills `out` with per-frame gains starting at `start_frame`.
    pub fn fill(&self, start_frame: u64, out: &mut [f32]) {
        for (i, gain) in out.iter_mut().enumerate() {
            *gain = self.value_at(start_frame + i as u64);
        }
    }

    /// Drops every event after `frame` and pins the current value there, so
    /// new automation starts from the instantaneous gain. Returns that gain.
    ///
    /// History before `frame` collapses into the held value, so the timeline
    /// only ever holds the automation still ahead of the caller.
    pub fn cancel_and_hold(&mut self, frame: u64) -> f32 {
        let held = self.value_at(frame);
        self.initial = held;
        self.events.clear();
        self.events.push(Event::Set { frame, value: held });
        held
    }

    /// Changes the level the envelope is heading for without restarting it.
    ///
    /// A ramp that has not finished by `frame` (including one scheduled to
    /// start later) keeps its end time but arrives at `value` instead.
    /// Otherwise the level jumps to `value` at `frame`.
    pub fn retarget(&mut self, value: f32, frame: u64) {
        let next_index = self.events.partition_point(|e| e.frame() <= frame);
        let pending_ramp = self.events[next_index..]
            .iter_mut()
            .rev()
            .find(|e| matches!(e, Event::Ramp { .. }));
        if let Some(Event::Ramp { value: target, .. }) = pending_ramp {
            *target = value;
            return;
        }
        self.cancel_and_hold(frame);
        self.set_value_at(value, frame);
    }
}
