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

use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{debug, warn};

use crate::config::{self, ConfigError};

/// Raises the output callback thread the first time the callback runs.
///
/// cpal owns the callback thread, so promotion can only happen from inside
/// the callback. Settings are resolved up front so the callback never parses
/// config.
#[derive(Clone, Debug)]
pub struct CallbackPriority {
    priority: ThreadPriorityValue,
    realtime: bool,
    applied: bool,
}

impl CallbackPriority {
    pub fn from_config(config: &config::Audio) -> Result<Self, ConfigError> {
        let value = config.thread_priority()?;
        let priority =
            ThreadPriorityValue::try_from(value).map_err(|e| ConfigError::Invalid {
                field: "audio.thread_priority",
                reason: e.to_string(),
            })?;
        Ok(Self {
            priority,
            realtime: config.realtime(),
            applied: false,
        })
    }

    pub fn realtime(&self) -> bool {
        self.realtime
    }

    pub fn is_applied(&self) -> bool {
        self.applied
    }

    /// Promotes the calling thread. Only the first call does any work;
    /// failures are logged and not retried.
    pub fn promote_current_thread(&mut self) {
        if self.applied {
            return;
        }
        self.applied = true;

        let priority = ThreadPriority::Crossplatform(self.priority);
        if let Err(e) = set_current_thread_priority(priority) {
            debug!(err = ?e, "Unable to raise output thread priority");
        }
        if self.realtime {
            promote_realtime(priority);
        }
    }
}

#[cfg(unix)]
fn promote_realtime(priority: ThreadPriority) {
    use thread_priority::unix::{
        set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
        ThreadSchedulePolicy,
    };

    let policy = ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo);
    match set_thread_priority_and_policy(thread_native_id(), priority, policy) {
        Ok(()) => debug!("Output thread running SCHED_FIFO"),
        Err(e) => warn!(err = %e, "Unable to enable SCHED_FIFO for output thread"),
    }
}

#[cfg(not(unix))]
fn promote_realtime(_priority: ThreadPriority) {}
