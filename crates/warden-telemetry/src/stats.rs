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

//! Per-reason intervention counters.
//!
//! These are the only governor state touched from outside the tick
//! thread: a diagnostics surface may read them at any time while the
//! tick thread increments them. All counters are monotonic `AtomicU64`
//! accumulators; no reader ever performs a read-modify-write.

use crate::reason::TelemetryReason;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic, wait-free counters indexed by [`TelemetryReason`].
#[derive(Debug)]
pub struct ReasonStats {
    counters: [AtomicU64; TelemetryReason::COUNT],
}

impl ReasonStats {
    /// Creates a zeroed counter set.
    pub fn new() -> Self {
        Self {
            counters: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Increments the counter for `reason` by one.
    pub fn increment(&self, reason: TelemetryReason) {
        self.counters[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Increments the counter for `reason` by `n`.
    pub fn add(&self, reason: TelemetryReason, n: u64) {
        self.counters[reason.index()].fetch_add(n, Ordering::Relaxed);
    }

    /// Current value of the counter for `reason`.
    pub fn get(&self, reason: TelemetryReason) -> u64 {
        self.counters[reason.index()].load(Ordering::Relaxed)
    }

    /// Sum across all reasons.
    pub fn total(&self) -> u64 {
        self.counters.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Point-in-time copy of all counters, keyed by reason name.
    ///
    /// Counters are read individually; the map is not an atomic snapshot
    /// across reasons, which is fine for diagnostics.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        TelemetryReason::ALL
            .iter()
            .map(|&reason| (reason.name().to_string(), self.get(reason)))
            .collect()
    }
}

impl Default for ReasonStats {
    fn default() -> Self {
        Self::new()
    }
}
