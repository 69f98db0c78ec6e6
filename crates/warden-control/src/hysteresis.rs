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

//! Hysteresis ladder driving the throttle level from tick timings.
//!
//! Entry and exit use different thresholds on different windows, so the
//! ladder cannot oscillate when load sits near a single threshold:
//! demotion is instant on a bad window, promotion requires a long
//! unbroken run of healthy ticks.

use std::sync::Arc;
use warden_core::stats::TickStatsSource;
use warden_core::throttle::ThrottleLevel;
use warden_telemetry::{ReasonStats, TelemetryReason};

/// Owns the current [`ThrottleLevel`] and transitions it one step at a
/// time from observed tick statistics.
#[derive(Debug)]
pub struct ThrottleStateMachine {
    entry_max_1s_ms: f64,
    entry_avg_5s_ms: f64,
    exit_avg_5s_ms: f64,
    exit_stability_ticks: u32,
    level: ThrottleLevel,
    stability: u32,
    active: bool,
    stats: Arc<ReasonStats>,
}

impl ThrottleStateMachine {
    /// Creates a machine at `Full` with the given thresholds.
    pub fn new(
        entry_max_1s_ms: f64,
        entry_avg_5s_ms: f64,
        exit_avg_5s_ms: f64,
        exit_stability_ticks: u32,
        stats: Arc<ReasonStats>,
    ) -> Self {
        Self {
            entry_max_1s_ms,
            entry_avg_5s_ms,
            exit_avg_5s_ms,
            exit_stability_ticks,
            level: ThrottleLevel::Full,
            stability: 0,
            active: false,
            stats,
        }
    }

    /// Applies one tick of statistics and returns the (possibly new)
    /// level.
    ///
    /// With `None`, or a source that has not yet filled its 1-second
    /// window, no transition happens in either direction and the current
    /// level is simply held.
    pub fn apply(&mut self, stats: Option<&dyn TickStatsSource>) -> ThrottleLevel {
        let Some(source) = stats else {
            return self.level;
        };
        if !source.has_enough_data() {
            return self.level;
        }

        let max_1s = source.max_1s_ms();
        let avg_5s = source.avg_5s_ms();

        if max_1s > self.entry_max_1s_ms || avg_5s > self.entry_avg_5s_ms {
            // A qualifying window always restarts the stability run,
            // even when the ladder is already at its floor.
            self.stability = 0;
            self.active = true;
            let demoted = self.level.demoted();
            if demoted != self.level {
                log::info!(
                    "[Throttle] {} -> {} (max_1s {:.1}ms, avg_5s {:.1}ms)",
                    self.level,
                    demoted,
                    max_1s,
                    avg_5s
                );
                self.stats.increment(TelemetryReason::ThrottleDemoted);
                self.level = demoted;
            }
            return self.level;
        }

        if self.active {
            if avg_5s < self.exit_avg_5s_ms {
                self.stability += 1;
                if self.stability >= self.exit_stability_ticks {
                    self.stability = 0;
                    self.level = self.level.promoted();
                    self.stats.increment(TelemetryReason::ThrottleRecovered);
                    log::info!("[Throttle] Recovered one level to {}", self.level);
                    if self.level == ThrottleLevel::Full {
                        self.active = false;
                    }
                }
            } else {
                // Between exit and entry: the dead band. Hold the level,
                // restart the count.
                self.stability = 0;
            }
        }
        self.level
    }

    /// The level the machine currently commands.
    pub fn level(&self) -> ThrottleLevel {
        self.level
    }

    /// `true` while any throttling below `Full` is in effect.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Current length of the healthy-tick run toward promotion.
    pub fn stability_counter(&self) -> u32 {
        self.stability
    }

    /// Returns the machine to `Full` with no history.
    pub fn reset(&mut self) {
        self.level = ThrottleLevel::Full;
        self.stability = 0;
        self.active = false;
    }
}
