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

//! Sliding-window spike detection and the emergency panic protocol.
//!
//! The hysteresis ladder reacts to averages; it is too slow for a
//! cascade, where one severe spike begets the next. The panic protocol
//! watches for repeated severe spikes inside a short wall-clock window
//! and, when they cluster, slams admission down immediately, then climbs
//! back out in gradual phases instead of snapping to normal.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use warden_core::throttle::ThrottleLevel;
use warden_telemetry::{ReasonStats, TelemetryReason};

/// Number of gradual recovery phases between panic and normal.
const RECOVERY_PHASES: u32 = 3;

/// Phase of the panic protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanicPhase {
    /// No spike cluster observed; the protocol is dormant.
    Normal,
    /// A cluster was detected; admission is slammed to the floor.
    Panic,
    /// Climbing back toward normal in fixed-length phases.
    Recovering,
}

impl std::fmt::Display for PanicPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Detects spike clusters and drives the panic/recovery state machine.
#[derive(Debug)]
pub struct PanicProtocol {
    spike_threshold_ms: f64,
    window: Duration,
    spike_count_threshold: u32,
    recovery_phase_ticks: u32,
    spikes: VecDeque<Instant>,
    phase: PanicPhase,
    recovery_phase: u32,
    recovery_tick_counter: u32,
    calm_tick_counter: u32,
    stats: Arc<ReasonStats>,
}

impl PanicProtocol {
    /// Creates a dormant protocol.
    pub fn new(
        spike_threshold_ms: f64,
        spike_window_ms: u64,
        spike_count_threshold: u32,
        recovery_phase_ticks: u32,
        stats: Arc<ReasonStats>,
    ) -> Self {
        Self {
            spike_threshold_ms,
            window: Duration::from_millis(spike_window_ms),
            spike_count_threshold,
            recovery_phase_ticks,
            spikes: VecDeque::new(),
            phase: PanicPhase::Normal,
            recovery_phase: 0,
            recovery_tick_counter: 0,
            calm_tick_counter: 0,
            stats,
        }
    }

    /// Feeds one finished tick's duration into the protocol.
    pub fn record_tick_duration(&mut self, tick_ms: f64) {
        self.record_at(tick_ms, Instant::now());
    }

    fn record_at(&mut self, tick_ms: f64, now: Instant) {
        let is_spike = tick_ms >= self.spike_threshold_ms;
        if is_spike {
            self.spikes.push_back(now);
        }
        self.prune(now);

        match self.phase {
            PanicPhase::Normal => {
                if self.spikes.len() as u32 >= self.spike_count_threshold {
                    self.enter_panic();
                }
            }
            PanicPhase::Panic => {
                // Admission is at the floor, so ticks normalize quickly.
                // Any new spike restarts the calm run.
                if is_spike {
                    self.calm_tick_counter = 0;
                } else {
                    self.calm_tick_counter += 1;
                    if self.calm_tick_counter >= self.recovery_phase_ticks {
                        self.enter_recovering();
                    }
                }
            }
            PanicPhase::Recovering => {
                if is_spike {
                    self.enter_panic();
                    return;
                }
                self.recovery_tick_counter += 1;
                if self.recovery_tick_counter >= self.recovery_phase_ticks {
                    self.recovery_phase += 1;
                    self.recovery_tick_counter = 0;
                    if self.recovery_phase >= RECOVERY_PHASES {
                        self.enter_normal();
                    } else {
                        log::info!(
                            "[Panic] Recovery phase {}/{} (multiplier {:.2})",
                            self.recovery_phase,
                            RECOVERY_PHASES,
                            self.throttle_multiplier()
                        );
                    }
                }
            }
        }
    }

    fn enter_panic(&mut self) {
        let spikes_in_window = self.spikes.len();
        self.phase = PanicPhase::Panic;
        self.recovery_phase = 0;
        self.recovery_tick_counter = 0;
        self.calm_tick_counter = 0;
        self.stats.increment(TelemetryReason::PanicEntered);
        log::warn!(
            "[Panic] Entered panic: {spikes_in_window} spikes within {:?} window",
            self.window
        );
    }

    fn enter_recovering(&mut self) {
        self.phase = PanicPhase::Recovering;
        self.recovery_phase = 0;
        self.recovery_tick_counter = 0;
        log::info!("[Panic] Entering gradual recovery");
    }

    fn enter_normal(&mut self) {
        self.phase = PanicPhase::Normal;
        self.recovery_phase = 0;
        self.recovery_tick_counter = 0;
        self.calm_tick_counter = 0;
        log::info!("[Panic] Fully recovered to normal");
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.spikes.front() {
            if now.duration_since(oldest) > self.window {
                self.spikes.pop_front();
            } else {
                break;
            }
        }
    }

    /// Current phase.
    pub fn phase(&self) -> PanicPhase {
        self.phase
    }

    /// `true` whenever the protocol is not dormant. Drives conservative
    /// budget mode and strict duplicate matching.
    pub fn is_degraded(&self) -> bool {
        self.phase != PanicPhase::Normal
    }

    /// Minimum throttle severity the protocol imposes, if any. The
    /// effective level is the more aggressive of this floor and whatever
    /// the hysteresis ladder commands.
    pub fn floor_level(&self) -> Option<ThrottleLevel> {
        match self.phase {
            PanicPhase::Normal => None,
            PanicPhase::Panic => Some(ThrottleLevel::Minimal),
            PanicPhase::Recovering => match self.recovery_phase {
                0 => Some(ThrottleLevel::Low),
                1 => Some(ThrottleLevel::Reduced),
                _ => None,
            },
        }
    }

    /// Fraction of normal activity permitted: 0.1 in panic, climbing
    /// 0.5 / 0.75 / 1.0 through recovery.
    pub fn throttle_multiplier(&self) -> f64 {
        match self.phase {
            PanicPhase::Normal => 1.0,
            PanicPhase::Panic => 0.1,
            PanicPhase::Recovering => 0.5 + f64::from(self.recovery_phase) * 0.25,
        }
    }

    /// Number of spikes currently inside the window.
    pub fn spikes_in_window(&self) -> usize {
        self.spikes.len()
    }

    /// Returns the protocol to dormant and clears the spike window.
    pub fn reset(&mut self) {
        self.spikes.clear();
        self.enter_normal();
    }
}
