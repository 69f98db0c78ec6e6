// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Fail-open breaker for internal governor faults.
//!
//! The governor must never take the tick loop down with it. Any stage
//! that keeps erroring trips its breaker and becomes a pass-through for
//! the rest of the run; admission then behaves as if that stage did not
//! exist.

use std::sync::Arc;
use warden_telemetry::{ReasonStats, TelemetryReason};

/// Counts consecutive internal errors for one pipeline stage and opens
/// (disables the stage) once they reach the threshold.
///
/// Opening is one-way: an open breaker stays open until [`reset`] is
/// called explicitly, and logs exactly once when it trips.
///
/// [`reset`]: FaultBreaker::reset
#[derive(Debug)]
pub struct FaultBreaker {
    name: &'static str,
    threshold: u32,
    consecutive: u32,
    open: bool,
    stats: Arc<ReasonStats>,
}

impl FaultBreaker {
    /// Creates a closed breaker for the stage called `name`.
    pub fn new(name: &'static str, threshold: u32, stats: Arc<ReasonStats>) -> Self {
        Self {
            name,
            threshold,
            consecutive: 0,
            open: false,
            stats,
        }
    }

    /// Records one internal error. Returns `true` if the breaker is now
    /// open (whether it just tripped or was open already).
    pub fn record_error(&mut self, error: &dyn std::fmt::Display) -> bool {
        self.stats.increment(TelemetryReason::InternalFault);
        if self.open {
            return true;
        }
        self.consecutive += 1;
        log::warn!("[Breaker] {} fault {}/{}: {error}", self.name, self.consecutive, self.threshold);
        if self.consecutive >= self.threshold {
            self.open = true;
            log::error!(
                "[Breaker] {} disabled after {} consecutive faults; passing through",
                self.name,
                self.threshold
            );
        }
        self.open
    }

    /// Records a clean pass through the stage, ending any error run.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// `true` once the stage has disabled itself.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Closes the breaker and clears the error run.
    pub fn reset(&mut self) {
        self.open = false;
        self.consecutive = 0;
    }
}
