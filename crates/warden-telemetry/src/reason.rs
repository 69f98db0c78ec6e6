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

//! Reason codes for every governor intervention.
//!
//! Nothing the governor drops, defers, or discards goes uncounted: each
//! intervention increments exactly one of these reasons.

use serde::{Deserialize, Serialize};

/// Why the governor intervened (or declined to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryReason {
    /// A same-tick duplicate request was suppressed.
    DuplicateFiltered,
    /// A combat-priority request bypassed the budget.
    CombatBypass,
    /// A near-band request bypassed the defer queue.
    NearBypass,
    /// A request was deferred to a later tick.
    BudgetDeferred,
    /// A queued entry was dropped because the queue was full.
    QueueDropped,
    /// A queued entry aged out and was dropped.
    DeferAgedOut,
    /// The starvation escape valve force-admitted a request.
    ForceAdmitted,
    /// A deferred entry was promoted for the next tick.
    DeferPromoted,
    /// A guarded computation exceeded the hard limit; result discarded.
    TimeoutDiscarded,
    /// A guarded computation was slow but under the hard limit.
    SlowWarning,
    /// Frame-local memo served a cached fact.
    MemoHit,
    /// Frame-local memo had no cached fact.
    MemoMiss,
    /// The panic protocol entered its panic phase.
    PanicEntered,
    /// The hysteresis ladder demoted one level.
    ThrottleDemoted,
    /// The hysteresis ladder promoted one level toward baseline.
    ThrottleRecovered,
    /// An internal fault was swallowed and resolved to pass-through.
    InternalFault,
}

impl TelemetryReason {
    /// All reasons, in counter-index order.
    pub const ALL: [TelemetryReason; 16] = [
        TelemetryReason::DuplicateFiltered,
        TelemetryReason::CombatBypass,
        TelemetryReason::NearBypass,
        TelemetryReason::BudgetDeferred,
        TelemetryReason::QueueDropped,
        TelemetryReason::DeferAgedOut,
        TelemetryReason::ForceAdmitted,
        TelemetryReason::DeferPromoted,
        TelemetryReason::TimeoutDiscarded,
        TelemetryReason::SlowWarning,
        TelemetryReason::MemoHit,
        TelemetryReason::MemoMiss,
        TelemetryReason::PanicEntered,
        TelemetryReason::ThrottleDemoted,
        TelemetryReason::ThrottleRecovered,
        TelemetryReason::InternalFault,
    ];

    /// Number of distinct reasons.
    pub const COUNT: usize = Self::ALL.len();

    /// Stable index of this reason into the counter array.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Stable snake_case name used in snapshots and logs.
    pub fn name(self) -> &'static str {
        match self {
            TelemetryReason::DuplicateFiltered => "duplicate_filtered",
            TelemetryReason::CombatBypass => "combat_bypass",
            TelemetryReason::NearBypass => "near_bypass",
            TelemetryReason::BudgetDeferred => "budget_deferred",
            TelemetryReason::QueueDropped => "queue_dropped",
            TelemetryReason::DeferAgedOut => "defer_aged_out",
            TelemetryReason::ForceAdmitted => "force_admitted",
            TelemetryReason::DeferPromoted => "defer_promoted",
            TelemetryReason::TimeoutDiscarded => "timeout_discarded",
            TelemetryReason::SlowWarning => "slow_warning",
            TelemetryReason::MemoHit => "memo_hit",
            TelemetryReason::MemoMiss => "memo_miss",
            TelemetryReason::PanicEntered => "panic_entered",
            TelemetryReason::ThrottleDemoted => "throttle_demoted",
            TelemetryReason::ThrottleRecovered => "throttle_recovered",
            TelemetryReason::InternalFault => "internal_fault",
        }
    }
}

impl std::fmt::Display for TelemetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
