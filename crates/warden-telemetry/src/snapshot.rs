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

//! Read-only status snapshot of the governor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use warden_core::throttle::ThrottleLevel;

/// A point-in-time view of governor state, suitable for periodic logging
/// or a diagnostics endpoint. Pure data; holding one does not pin any
/// governor internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorSnapshot {
    /// Master enable flag.
    pub enabled: bool,
    /// Tick the snapshot was taken on.
    pub tick: u64,
    /// Effective throttle level (ladder level or panic floor, whichever
    /// is more aggressive).
    pub throttle_level: ThrottleLevel,
    /// `true` while the hysteresis ladder is away from baseline.
    pub throttle_active: bool,
    /// Consecutive qualifying recovery ticks accumulated so far.
    pub stability_counter: u32,
    /// Panic protocol phase name (`Normal`, `Panic`, or `Recovering`).
    pub panic_phase: String,
    /// `true` while a safety event holds the gate in guarded mode.
    pub guarded: bool,
    /// Current number of queued deferred requests.
    pub queue_depth: usize,
    /// Budget units still available this tick.
    pub remaining_budget: u32,
    /// Entries promoted out of the defer queue at the last tick end.
    pub promoted_last_tick: u32,
    /// Per-reason intervention counters (monotonic totals).
    pub reasons: BTreeMap<String, u64>,
}

impl GovernorSnapshot {
    /// Serializes the snapshot as pretty JSON for a diagnostics surface.
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
