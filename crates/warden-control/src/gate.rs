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

//! The admission gate: the single entry point external collaborators call.
//!
//! Composes the whole pipeline (duplicate filter, budget governor,
//! defer queue, throttle ladder, panic protocol, timeout guard, and
//! frame-local memo) behind three calls: `on_tick_start`,
//! `check_request`, and `on_tick_end`.
//!
//! The gate fails open. When disabled (by config or over the control
//! channel) every check passes through, and internal faults trip a
//! breaker instead of propagating: this subsystem must never be the
//! reason the protected computation stops working.

use crate::breaker::FaultBreaker;
use crate::budget::BudgetGovernor;
use crate::command::{control_channel, ControlCommand, ControlHandle};
use crate::defer::{DeferQueue, DeferredRequest};
use crate::filter::DuplicateRequestFilter;
use crate::guard::ComputationTimeoutGuard;
use crate::hysteresis::ThrottleStateMachine;
use crate::memo::FrameLocalMemo;
use crate::panic::PanicProtocol;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use warden_core::config::GovernorConfig;
use warden_core::error::{GovernorError, GovernorResult};
use warden_core::request::PathRequest;
use warden_core::stats::TickStatsSource;
use warden_core::throttle::ThrottleLevel;
use warden_telemetry::{GovernorSnapshot, ReasonStats};

/// Consecutive guarded-computation timeouts counted as a safety event.
const CONSECUTIVE_TIMEOUT_SAFETY: u32 = 3;
/// Minimum ticks guarded mode stays engaged once entered (2s at 60 Hz).
const MIN_GUARDED_DURATION_TICKS: u64 = 120;

/// Admission gate over the full governor pipeline.
///
/// Owned by the tick thread; all methods except the control handle are
/// called from that thread only. The reason counters behind [`stats`]
/// are the single piece of state other threads may read.
///
/// [`stats`]: AdmissionGate::stats
#[derive(Debug)]
pub struct AdmissionGate {
    enabled: bool,
    tick: u64,

    filter: DuplicateRequestFilter,
    budget: BudgetGovernor,
    queue: DeferQueue,
    machine: ThrottleStateMachine,
    panic: PanicProtocol,
    guard: ComputationTimeoutGuard,
    memo: FrameLocalMemo,

    timing_breaker: FaultBreaker,
    effective_level: ThrottleLevel,
    guarded: bool,
    guarded_entered_tick: u64,
    promoted_last_tick: u32,
    status_log_interval_ticks: u64,

    control_rx: Receiver<ControlCommand>,
    stats: Arc<ReasonStats>,
}

impl AdmissionGate {
    /// Builds a gate from a validated config, returning it together with
    /// the cloneable control handle for out-of-band adjustments.
    pub fn new(config: GovernorConfig) -> GovernorResult<(Self, ControlHandle)> {
        config.validate()?;
        let stats = Arc::new(ReasonStats::new());
        let (handle, control_rx) = control_channel(config.control_buffer_size);

        let gate = Self {
            enabled: config.enabled,
            tick: 0,
            filter: DuplicateRequestFilter::new(Arc::clone(&stats)),
            budget: BudgetGovernor::new(config.budget_per_tick, Arc::clone(&stats)),
            queue: DeferQueue::new(
                config.defer_queue_max,
                config.near_dist_sq,
                config.far_dist_sq,
                config.max_consecutive_drops,
                config.defer_max_age_ticks,
                Arc::clone(&stats),
            ),
            machine: ThrottleStateMachine::new(
                config.entry_max_1s_ms,
                config.entry_avg_5s_ms,
                config.exit_avg_5s_ms,
                config.exit_stability_ticks,
                Arc::clone(&stats),
            ),
            panic: PanicProtocol::new(
                config.spike_threshold_ms,
                config.spike_window_ms,
                config.spike_count_threshold,
                config.recovery_phase_ticks,
                Arc::clone(&stats),
            ),
            guard: ComputationTimeoutGuard::new(
                config.warn_elapsed_ms,
                config.timeout_elapsed_ms,
                Arc::clone(&stats),
            ),
            memo: FrameLocalMemo::new(Arc::clone(&stats)),
            timing_breaker: FaultBreaker::new(
                "tick-timing",
                config.fault_disable_threshold,
                Arc::clone(&stats),
            ),
            effective_level: ThrottleLevel::Full,
            guarded: false,
            guarded_entered_tick: 0,
            promoted_last_tick: 0,
            status_log_interval_ticks: config.status_log_interval_ticks,
            control_rx,
            stats,
        };
        log::info!(
            "[Gate] Admission gate initialized (budget {}/tick, queue max {})",
            config.budget_per_tick,
            config.defer_queue_max
        );
        Ok((gate, handle))
    }

    /// Opens a new tick: applies queued control commands, then resets all
    /// per-tick state.
    ///
    /// Control commands are drained even while disabled, so a disabled
    /// gate can always be re-enabled.
    pub fn on_tick_start(&mut self, tick: u64) {
        self.drain_control();
        if !self.enabled {
            return;
        }
        self.tick = tick;
        self.filter.on_tick_start(tick);
        self.memo.on_tick_start();
        self.budget.on_tick_start(self.promoted_last_tick);
    }

    /// Decides one admission.
    ///
    /// `true` means the caller proceeds: either the computation may run
    /// this tick, or an identical one is already accounted for in this
    /// tick's window and its result should be reused. `false` means the
    /// request was deferred to a later tick and must not be retried now.
    pub fn check_request(&mut self, ctx: &mut PathRequest) -> bool {
        if !self.enabled {
            return true;
        }
        if self
            .filter
            .is_duplicate(ctx.agent_id, ctx.target_x, ctx.target_y)
        {
            return true;
        }
        self.budget.check_request(ctx, &mut self.queue)
    }

    /// Closes the tick: feeds the finished tick's duration to the panic
    /// protocol, advances the throttle ladder, clears the one-tick
    /// windows, and drains the defer queue.
    ///
    /// Returns the promoted deferred requests; the caller re-presents
    /// them next tick, and their cost is already reserved against that
    /// tick's budget.
    pub fn on_tick_end(
        &mut self,
        tick: u64,
        tick_duration_ms: f64,
        timing: Option<&dyn TickStatsSource>,
    ) -> Vec<DeferredRequest> {
        if !self.enabled {
            return Vec::new();
        }

        if tick_duration_ms.is_finite() && tick_duration_ms >= 0.0 {
            self.panic.record_tick_duration(tick_duration_ms);
            self.timing_breaker.record_success();
        } else {
            // Skip the poisoned sample; the breaker decides when to stop
            // complaining about the upstream clock.
            self.timing_breaker
                .record_error(&GovernorError::NonFiniteSample(tick_duration_ms));
        }

        // Safety events latch guarded mode independently of the spike
        // protocol: a near-full backlog or a run of discarded
        // computations means pressure the timing windows have not shown
        // yet. Once engaged, guarded mode holds for a minimum dwell so a
        // briefly drained queue cannot flap it.
        let safety_event = self.queue.is_overflowing()
            || self.guard.consecutive_timeouts() >= CONSECUTIVE_TIMEOUT_SAFETY;
        if safety_event && !self.guarded {
            self.guarded = true;
            self.guarded_entered_tick = tick;
            log::info!(
                "[Gate] Guarded mode engaged (queue depth {}, consecutive timeouts {})",
                self.queue.len(),
                self.guard.consecutive_timeouts()
            );
        } else if self.guarded
            && !safety_event
            && tick.saturating_sub(self.guarded_entered_tick) >= MIN_GUARDED_DURATION_TICKS
        {
            self.guarded = false;
            log::info!("[Gate] Guarded mode released");
        }

        let degraded = self.panic.is_degraded() || self.guarded;
        self.budget.set_conservative(degraded);
        self.filter.set_strict_matching(degraded);

        let ladder = self.machine.apply(timing);
        self.effective_level = match self.panic.floor_level() {
            Some(floor) => ladder.max(floor),
            None => ladder,
        };

        self.filter.on_tick_end();
        self.memo.on_tick_end();

        let max_promotions = (self.budget.effective_budget() / 2) as usize;
        let promoted = self.queue.on_tick_end(tick, max_promotions);
        self.promoted_last_tick = promoted.len() as u32;

        if self.status_log_interval_ticks > 0 && tick > 0 && tick % self.status_log_interval_ticks == 0
        {
            self.log_status_summary();
        }
        promoted
    }

    fn drain_control(&mut self) {
        while let Ok(command) = self.control_rx.try_recv() {
            match command {
                ControlCommand::SetEnabled(enabled) => {
                    if enabled != self.enabled {
                        log::info!("[Gate] Admission control {}", if enabled { "enabled" } else { "disabled" });
                    }
                    self.enabled = enabled;
                }
                ControlCommand::SetBudgetPerTick(budget) => {
                    if budget == 0 {
                        log::warn!("[Gate] Ignoring zero per-tick budget");
                    } else {
                        self.budget.set_budget_per_tick(budget);
                    }
                }
                ControlCommand::ResetThrottle => {
                    self.machine.reset();
                    self.recompute_effective_level();
                }
                ControlCommand::ResetPanic => {
                    self.panic.reset();
                    self.guarded = false;
                    self.recompute_effective_level();
                }
            }
        }
    }

    fn recompute_effective_level(&mut self) {
        let ladder = self.machine.level();
        self.effective_level = match self.panic.floor_level() {
            Some(floor) => ladder.max(floor),
            None => ladder,
        };
    }

    /// Effective throttle level for the coming tick: the more aggressive
    /// of the hysteresis ladder and the panic floor.
    pub fn throttle_level(&self) -> ThrottleLevel {
        if !self.enabled {
            return ThrottleLevel::Full;
        }
        self.effective_level
    }

    /// Whether the object with `sequence_id` is update-eligible on
    /// `tick` at the current effective level.
    pub fn should_update_agent(&self, sequence_id: u64, tick: u64) -> bool {
        self.throttle_level().should_update(sequence_id, tick)
    }

    /// The timeout guard wrapping individual admitted computations.
    pub fn timeout_guard(&mut self) -> &mut ComputationTimeoutGuard {
        &mut self.guard
    }

    /// The frame-local memo for one-tick boolean facts.
    pub fn memo(&mut self) -> &mut FrameLocalMemo {
        &mut self.memo
    }

    /// `true` while a safety event (backlog overflow or a timeout run)
    /// holds the gate in guarded mode.
    pub fn is_guarded(&self) -> bool {
        self.guarded
    }

    /// Master enable flag.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables or disables admission control directly (same effect as
    /// [`ControlCommand::SetEnabled`], for callers on the tick thread).
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Shared handle to the reason counters.
    pub fn stats(&self) -> Arc<ReasonStats> {
        Arc::clone(&self.stats)
    }

    /// Point-in-time view of the whole governor.
    pub fn snapshot(&self) -> GovernorSnapshot {
        GovernorSnapshot {
            enabled: self.enabled,
            tick: self.tick,
            throttle_level: self.effective_level,
            throttle_active: self.machine.is_active(),
            stability_counter: self.machine.stability_counter(),
            panic_phase: self.panic.phase().to_string(),
            guarded: self.guarded,
            queue_depth: self.queue.len(),
            remaining_budget: self.budget.remaining(),
            promoted_last_tick: self.promoted_last_tick,
            reasons: self.stats.snapshot(),
        }
    }

    /// Logs a multi-line status summary at info level.
    pub fn log_status_summary(&self) {
        let snapshot = self.snapshot();
        log::info!("[Gate] ── Status (tick {}) ──", snapshot.tick);
        log::info!(
            "[Gate]   throttle: {} (active: {}, stability run: {})",
            snapshot.throttle_level,
            snapshot.throttle_active,
            snapshot.stability_counter
        );
        log::info!("[Gate]   panic: {}", snapshot.panic_phase);
        log::info!(
            "[Gate]   budget remaining: {}, queue depth: {}, promoted last tick: {}",
            snapshot.remaining_budget,
            snapshot.queue_depth,
            snapshot.promoted_last_tick
        );
        for (reason, count) in &snapshot.reasons {
            if *count > 0 {
                log::info!("[Gate]   {reason}: {count}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::request::Priority;
    use warden_core::stats::RollingTickStats;
    use warden_telemetry::TelemetryReason;

    fn request(agent_id: u32, distance_sq: f32, tick: u64) -> PathRequest {
        PathRequest {
            agent_id,
            distance_sq,
            priority: Priority::Wander,
            tick,
            target_x: agent_id as f32 * 100.0,
            target_y: 0.0,
            in_combat: false,
            has_existing_path: false,
            deferred: false,
        }
    }

    fn gate() -> (AdmissionGate, ControlHandle) {
        AdmissionGate::new(GovernorConfig::default()).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = GovernorConfig::default();
        config.budget_per_tick = 0;
        assert!(AdmissionGate::new(config).is_err());
    }

    #[test]
    fn test_sixty_requests_against_budget_of_fifty() {
        let (mut g, _handle) = gate();
        g.on_tick_start(1);

        let mut admitted = 0;
        let mut deferred = 0;
        for i in 0..60 {
            let mut ctx = request(i, 2500.0, 1);
            if g.check_request(&mut ctx) {
                admitted += 1;
            } else {
                deferred += 1;
            }
        }
        assert_eq!(admitted, 50);
        assert_eq!(deferred, 10);
        assert_eq!(g.snapshot().queue_depth, 10);

        // Tick end promotes all ten (cap is budget/2 = 25).
        let promoted = g.on_tick_end(1, 10.0, None);
        assert_eq!(promoted.len(), 10);
        assert_eq!(g.snapshot().queue_depth, 0);

        // Next tick's budget has the promotions pre-charged.
        g.on_tick_start(2);
        assert_eq!(g.snapshot().remaining_budget, 40);
    }

    #[test]
    fn test_duplicate_is_reported_handled_without_spending() {
        let (mut g, _handle) = gate();
        g.on_tick_start(1);

        let mut first = request(7, 2500.0, 1);
        assert!(g.check_request(&mut first));
        let mut again = request(7, 2500.0, 1);
        assert!(g.check_request(&mut again));

        let stats = g.stats();
        assert_eq!(stats.get(TelemetryReason::DuplicateFiltered), 1);
        // Only the first admission spent budget.
        assert_eq!(g.snapshot().remaining_budget, 49);
    }

    #[test]
    fn test_disabled_gate_passes_everything_through() {
        let (mut g, handle) = gate();
        handle.send(ControlCommand::SetEnabled(false)).unwrap();
        g.on_tick_start(1);

        for i in 0..200 {
            let mut ctx = request(i, 9000.0, 1);
            assert!(g.check_request(&mut ctx));
        }
        assert!(g.on_tick_end(1, 10.0, None).is_empty());
        assert_eq!(g.stats().total(), 0);
        assert_eq!(g.throttle_level(), ThrottleLevel::Full);
    }

    #[test]
    fn test_disabled_gate_can_be_reenabled_over_control() {
        let (mut g, handle) = gate();
        handle.send(ControlCommand::SetEnabled(false)).unwrap();
        g.on_tick_start(1);
        assert!(!g.is_enabled());

        handle.send(ControlCommand::SetEnabled(true)).unwrap();
        g.on_tick_start(2);
        assert!(g.is_enabled());
    }

    #[test]
    fn test_budget_change_applies_next_tick() {
        let (mut g, handle) = gate();
        handle.send(ControlCommand::SetBudgetPerTick(5)).unwrap();
        g.on_tick_start(1);
        assert_eq!(g.snapshot().remaining_budget, 5);
    }

    #[test]
    fn test_two_spikes_enter_panic_and_floor_throttling() {
        let (mut g, _handle) = gate();
        g.on_tick_start(1);
        g.on_tick_end(1, 150.0, None);
        assert_eq!(g.snapshot().panic_phase, "Normal");

        g.on_tick_start(2);
        g.on_tick_end(2, 150.0, None);

        let snapshot = g.snapshot();
        assert_eq!(snapshot.panic_phase, "Panic");
        assert_eq!(g.throttle_level(), ThrottleLevel::Minimal);

        // Panic engages conservative mode: next tick starts at half budget.
        g.on_tick_start(3);
        assert_eq!(g.snapshot().remaining_budget, 25);
    }

    #[test]
    fn test_panic_reset_over_control() {
        let (mut g, handle) = gate();
        g.on_tick_start(1);
        g.on_tick_end(1, 150.0, None);
        g.on_tick_start(2);
        g.on_tick_end(2, 150.0, None);
        assert_eq!(g.snapshot().panic_phase, "Panic");

        handle.send(ControlCommand::ResetPanic).unwrap();
        g.on_tick_start(3);
        assert_eq!(g.snapshot().panic_phase, "Normal");
        assert_eq!(g.throttle_level(), ThrottleLevel::Full);
    }

    #[test]
    fn test_no_stats_source_never_throttles() {
        let (mut g, _handle) = gate();
        for tick in 1..=100 {
            g.on_tick_start(tick);
            g.on_tick_end(tick, 40.0, None); // below the spike threshold
        }
        assert_eq!(g.throttle_level(), ThrottleLevel::Full);
    }

    #[test]
    fn test_overloaded_stats_demote_the_ladder() {
        let (mut g, _handle) = gate();
        let mut timing = RollingTickStats::new();
        for _ in 0..60 {
            timing.record(40.0).unwrap();
        }
        g.on_tick_start(1);
        g.on_tick_end(1, 40.0, Some(&timing));
        assert_eq!(g.throttle_level(), ThrottleLevel::Reduced);
        assert!(g.snapshot().throttle_active);
    }

    #[test]
    fn test_effective_level_is_max_of_ladder_and_panic_floor() {
        let (mut g, _handle) = gate();
        // Ladder demotes once (Reduced); panic floors at Minimal.
        let mut timing = RollingTickStats::new();
        for _ in 0..60 {
            timing.record(40.0).unwrap();
        }
        g.on_tick_start(1);
        g.on_tick_end(1, 150.0, Some(&timing));
        g.on_tick_start(2);
        g.on_tick_end(2, 150.0, Some(&timing));
        assert_eq!(g.throttle_level(), ThrottleLevel::Minimal);
    }

    #[test]
    fn test_non_finite_duration_is_skipped_not_fatal() {
        let (mut g, _handle) = gate();
        for tick in 1..=5 {
            g.on_tick_start(tick);
            g.on_tick_end(tick, f64::NAN, None);
        }
        // Samples were skipped: no spikes recorded, no panic.
        assert_eq!(g.snapshot().panic_phase, "Normal");
        assert_eq!(
            g.stats().get(TelemetryReason::InternalFault),
            5
        );
    }

    #[test]
    fn test_queue_overflow_engages_guarded_mode() {
        let mut config = GovernorConfig::default();
        config.budget_per_tick = 4;
        config.defer_queue_max = 10;
        let (mut g, _handle) = AdmissionGate::new(config).unwrap();

        g.on_tick_start(1);
        // 4 admitted, 9 deferred: depth 9 is past 90% of capacity 10.
        for i in 0..13 {
            let mut ctx = request(i, 2500.0, 1);
            g.check_request(&mut ctx);
        }
        g.on_tick_end(1, 10.0, None);
        assert!(g.is_guarded());
        assert!(g.snapshot().guarded);

        // Guarded mode halves the budget: effective 2, minus the one
        // promotion the halved cap allowed.
        g.on_tick_start(2);
        assert_eq!(g.snapshot().remaining_budget, 1);
    }

    #[test]
    fn test_consecutive_timeouts_engage_guarded_mode() {
        let mut config = GovernorConfig::default();
        config.warn_elapsed_ms = 0;
        config.timeout_elapsed_ms = 0;
        let (mut g, _handle) = AdmissionGate::new(config).unwrap();

        g.on_tick_start(1);
        for _ in 0..3 {
            let outcome = g.timeout_guard().guard(|| ());
            assert!(outcome.result.is_none());
        }
        g.on_tick_end(1, 10.0, None);
        assert!(g.is_guarded());

        g.on_tick_start(2);
        assert_eq!(g.snapshot().remaining_budget, 25);
    }

    #[test]
    fn test_guarded_mode_holds_for_minimum_dwell() {
        let mut config = GovernorConfig::default();
        config.budget_per_tick = 4;
        config.defer_queue_max = 10;
        let (mut g, _handle) = AdmissionGate::new(config).unwrap();

        g.on_tick_start(1);
        for i in 0..13 {
            let mut ctx = request(i, 2500.0, 1);
            g.check_request(&mut ctx);
        }
        g.on_tick_end(1, 10.0, None);
        assert!(g.is_guarded());

        // The backlog ages out within a few ticks, but guarded mode must
        // hold until 120 ticks after entry.
        for tick in 2..=120 {
            g.on_tick_start(tick);
            g.on_tick_end(tick, 10.0, None);
        }
        assert_eq!(g.snapshot().queue_depth, 0);
        assert!(g.is_guarded());

        g.on_tick_start(121);
        g.on_tick_end(121, 10.0, None);
        assert!(!g.is_guarded());

        // Released: the next fresh tick is back to the full budget.
        g.on_tick_start(122);
        assert_eq!(g.snapshot().remaining_budget, 4);
    }

    #[test]
    fn test_deferred_promotions_survive_to_next_tick() {
        let mut config = GovernorConfig::default();
        config.budget_per_tick = 2;
        let (mut g, _handle) = AdmissionGate::new(config).unwrap();

        g.on_tick_start(1);
        for i in 0..4 {
            let mut ctx = request(i, 2500.0, 1);
            g.check_request(&mut ctx);
        }
        // Budget 2: two deferred, but promotion is capped at budget/2 = 1.
        let promoted = g.on_tick_end(1, 10.0, None);
        assert_eq!(promoted.len(), 1);
        assert_eq!(g.snapshot().queue_depth, 1);

        g.on_tick_start(2);
        assert_eq!(g.snapshot().remaining_budget, 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let (mut g, _handle) = gate();
        g.on_tick_start(1);
        let json = g.snapshot().to_json().unwrap();
        assert!(json.contains("\"enabled\": true"));
    }
}
