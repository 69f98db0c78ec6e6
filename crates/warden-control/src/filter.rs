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

//! Same-tick duplicate request suppression.

use std::collections::HashSet;
use std::sync::Arc;
use warden_telemetry::{ReasonStats, TelemetryReason};

/// Suppresses redundant concurrent requests for the same agent/target
/// within a single tick.
///
/// The seen-set is keyed by `(agent_id, quantized_target)` and cleared
/// at `on_tick_start`, so a pair admitted in tick N is admissible again
/// in tick N+1. Checking is a single test-and-set.
#[derive(Debug)]
pub struct DuplicateRequestFilter {
    seen: HashSet<(u32, i32, i32)>,
    current_tick: Option<u64>,
    strict: bool,
    stats: Arc<ReasonStats>,
}

impl DuplicateRequestFilter {
    /// Creates an empty filter reporting into `stats`.
    pub fn new(stats: Arc<ReasonStats>) -> Self {
        Self {
            seen: HashSet::new(),
            current_tick: None,
            strict: false,
            stats,
        }
    }

    /// Clears the per-tick window.
    pub fn on_tick_start(&mut self, tick: u64) {
        if self.current_tick != Some(tick) {
            self.seen.clear();
            self.current_tick = Some(tick);
        }
    }

    /// Tick-end clear. Redundant with `on_tick_start`, kept so a missed
    /// start hook cannot leak a window into the next tick.
    pub fn on_tick_end(&mut self) {
        self.seen.clear();
    }

    /// Tests and records the pair in one operation.
    ///
    /// Returns `false` the first time a pair is seen within the current
    /// tick window and `true` for every subsequent call.
    pub fn is_duplicate(&mut self, agent_id: u32, target_x: f32, target_y: f32) -> bool {
        let key = (agent_id, self.quantize(target_x), self.quantize(target_y));
        if self.seen.insert(key) {
            false
        } else {
            self.stats.increment(TelemetryReason::DuplicateFiltered);
            true
        }
    }

    /// Switches between whole-tile and 0.1-tile target matching.
    ///
    /// Strict matching is engaged by the panic protocol: finer keys mean
    /// fewer distinct targets collapse together, so more re-requests are
    /// recognized as duplicates of work already in flight.
    pub fn set_strict_matching(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Number of distinct pairs seen this tick.
    pub fn window_len(&self) -> usize {
        self.seen.len()
    }

    fn quantize(&self, coordinate: f32) -> i32 {
        if self.strict {
            (coordinate * 10.0).round() as i32
        } else {
            coordinate.round() as i32
        }
    }
}
