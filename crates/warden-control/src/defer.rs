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

//! Bounded, priority-ordered backlog for over-budget requests.

use std::collections::VecDeque;
use std::sync::Arc;
use warden_core::request::{PathRequest, Priority};
use warden_telemetry::{ReasonStats, TelemetryReason};

/// What happened to a request handed to [`DeferQueue::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The request must run this tick after all (near-band bypass or
    /// starvation escape valve). The caller proceeds as if admitted.
    Admitted,
    /// The request was queued; the caller must not retry this tick.
    Deferred,
}

/// A request parked for a later tick.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredRequest {
    /// Identifier of the requesting agent.
    pub agent_id: u32,
    /// Priority tier at request time.
    pub priority: Priority,
    /// Squared distance at request time.
    pub distance_sq: f32,
    /// Target X coordinate.
    pub target_x: f32,
    /// Target Y coordinate.
    pub target_y: f32,
    /// Tick the request was originally made on.
    pub request_tick: u64,
}

impl DeferredRequest {
    fn from_context(ctx: &PathRequest) -> Self {
        Self {
            agent_id: ctx.agent_id,
            priority: ctx.priority,
            distance_sq: ctx.distance_sq,
            target_x: ctx.target_x,
            target_y: ctx.target_y,
            request_tick: ctx.tick,
        }
    }
}

/// Bounded defer queue with drop policy and starvation guard.
///
/// Overflow drops the globally lowest-priority entry (FIFO among equal
/// priority) and counts it. A global consecutive-drop counter acts as an
/// escape valve: once it exceeds the configured limit, the next overflow
/// request is force-admitted instead of dropped, so no agent can be
/// denied service indefinitely.
#[derive(Debug)]
pub struct DeferQueue {
    entries: VecDeque<DeferredRequest>,
    capacity: usize,
    near_dist_sq: f32,
    far_dist_sq: f32,
    max_consecutive_drops: u32,
    max_age_ticks: u64,
    consecutive_drops: u32,
    stats: Arc<ReasonStats>,
}

impl DeferQueue {
    /// Creates an empty queue.
    pub fn new(
        capacity: usize,
        near_dist_sq: f32,
        far_dist_sq: f32,
        max_consecutive_drops: u32,
        max_age_ticks: u64,
        stats: Arc<ReasonStats>,
    ) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            near_dist_sq,
            far_dist_sq,
            max_consecutive_drops,
            max_age_ticks,
            consecutive_drops: 0,
            stats,
        }
    }

    /// Accepts an over-budget request.
    ///
    /// Near-band requests are force-admitted without ever entering the
    /// queue: an agent close enough to be on screen never waits,
    /// regardless of budget, because deferred movement there reads as
    /// visible stutter.
    pub fn push(&mut self, ctx: &PathRequest) -> PushOutcome {
        if ctx.distance_sq < self.near_dist_sq {
            self.stats.increment(TelemetryReason::NearBypass);
            return PushOutcome::Admitted;
        }

        if self.entries.len() < self.capacity {
            self.entries.push_back(DeferredRequest::from_context(ctx));
            self.consecutive_drops = 0;
            self.stats.increment(TelemetryReason::BudgetDeferred);
            return PushOutcome::Deferred;
        }

        // Queue full. Escape valve first: a run of drops longer than the
        // limit means the backlog is churning, and the current request
        // must not join the churn.
        if self.consecutive_drops > self.max_consecutive_drops {
            self.consecutive_drops = 0;
            self.stats.increment(TelemetryReason::ForceAdmitted);
            log::debug!(
                "[DeferQueue] Force-admitting agent {} after {} consecutive drops",
                ctx.agent_id,
                self.max_consecutive_drops + 1
            );
            return PushOutcome::Admitted;
        }

        // An incoming far-band wander request ranks below anything
        // already queued; it is the drop candidate itself.
        if ctx.priority == Priority::Wander && ctx.distance_sq > self.far_dist_sq {
            self.consecutive_drops += 1;
            self.stats.increment(TelemetryReason::QueueDropped);
            return PushOutcome::Deferred;
        }

        // Make room by evicting the globally lowest-priority entry,
        // first-in among equals.
        if let Some(victim) = self.lowest_priority_index() {
            let dropped = self.entries.remove(victim);
            debug_assert!(dropped.is_some());
            self.consecutive_drops += 1;
            self.stats.increment(TelemetryReason::QueueDropped);
        }
        self.entries.push_back(DeferredRequest::from_context(ctx));
        self.stats.increment(TelemetryReason::BudgetDeferred);
        PushOutcome::Deferred
    }

    /// Ages out stale entries, then promotes up to `max_promotions`
    /// entries for processing next tick, highest priority first and
    /// oldest within a priority.
    pub fn on_tick_end(&mut self, current_tick: u64, max_promotions: usize) -> Vec<DeferredRequest> {
        let max_age = self.max_age_ticks;
        let before = self.entries.len();
        self.entries
            .retain(|entry| current_tick.saturating_sub(entry.request_tick) <= max_age);
        let aged_out = before - self.entries.len();
        if aged_out > 0 {
            self.stats.add(TelemetryReason::DeferAgedOut, aged_out as u64);
            log::debug!("[DeferQueue] Dropped {aged_out} entries older than {max_age} ticks");
        }

        let mut promoted = Vec::with_capacity(max_promotions.min(self.entries.len()));
        while promoted.len() < max_promotions {
            let Some(next) = self.highest_priority_index() else {
                break;
            };
            // remove() is O(n); the queue is small and bounded.
            if let Some(entry) = self.entries.remove(next) {
                promoted.push(entry);
            }
        }
        if !promoted.is_empty() {
            self.stats
                .add(TelemetryReason::DeferPromoted, promoted.len() as u64);
            log::debug!(
                "[DeferQueue] Promoted {} deferred requests for tick {}",
                promoted.len(),
                current_tick + 1
            );
        }
        promoted
    }

    /// Current backlog depth.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when the backlog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` when the backlog is at or past 90% of capacity. The gate
    /// treats this as a safety event and enters guarded mode.
    pub fn is_overflowing(&self) -> bool {
        self.entries.len() * 10 >= self.capacity * 9
    }

    /// Current value of the consecutive-drop counter.
    pub fn consecutive_drops(&self) -> u32 {
        self.consecutive_drops
    }

    // First occurrence wins both scans, which gives FIFO among entries
    // of equal priority.
    fn lowest_priority_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| (e.priority, e.request_tick))
            .map(|(i, _)| i)
    }

    fn highest_priority_index(&self) -> Option<usize> {
        self.entries
            .iter()
            .enumerate()
            .max_by_key(|(i, e)| (e.priority, std::cmp::Reverse(e.request_tick), std::cmp::Reverse(*i)))
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(agent_id: u32, priority: Priority, distance_sq: f32, tick: u64) -> PathRequest {
        PathRequest {
            agent_id,
            distance_sq,
            priority,
            tick,
            target_x: 0.0,
            target_y: 0.0,
            in_combat: false,
            has_existing_path: false,
            deferred: false,
        }
    }

    fn queue(capacity: usize) -> (DeferQueue, Arc<ReasonStats>) {
        let stats = Arc::new(ReasonStats::new());
        let q = DeferQueue::new(capacity, 400.0, 6400.0, 3, 2, Arc::clone(&stats));
        (q, stats)
    }

    // ── Near-band bypass ─────────────────────────────────────────────

    #[test]
    fn test_near_band_is_force_admitted() {
        let (mut q, stats) = queue(4);
        let outcome = q.push(&ctx(1, Priority::Wander, 399.0, 1));
        assert_eq!(outcome, PushOutcome::Admitted);
        assert_eq!(q.len(), 0);
        assert_eq!(stats.get(TelemetryReason::NearBypass), 1);
    }

    #[test]
    fn test_medium_band_is_deferred() {
        let (mut q, _) = queue(4);
        let outcome = q.push(&ctx(1, Priority::Wander, 1500.0, 1));
        assert_eq!(outcome, PushOutcome::Deferred);
        assert_eq!(q.len(), 1);
    }

    // ── Overflow drop policy ─────────────────────────────────────────

    #[test]
    fn test_overflow_drops_exactly_one_lowest_priority() {
        let (mut q, stats) = queue(3);
        q.push(&ctx(1, Priority::Chase, 2000.0, 1));
        q.push(&ctx(2, Priority::Wander, 2000.0, 1));
        q.push(&ctx(3, Priority::Chase, 2000.0, 1));
        assert_eq!(q.len(), 3);

        // Full: the Wander entry is evicted, the new Chase entry enters.
        let outcome = q.push(&ctx(4, Priority::Chase, 2000.0, 1));
        assert_eq!(outcome, PushOutcome::Deferred);
        assert_eq!(q.len(), 3);
        assert_eq!(stats.get(TelemetryReason::QueueDropped), 1);
        assert_eq!(q.consecutive_drops(), 1);
    }

    #[test]
    fn test_equal_priority_drops_first_in() {
        let (mut q, _) = queue(2);
        q.push(&ctx(1, Priority::Wander, 2000.0, 1));
        q.push(&ctx(2, Priority::Wander, 2000.0, 2));
        q.push(&ctx(3, Priority::Wander, 2000.0, 3));
        // Agent 1 (oldest, equal priority) was evicted.
        let promoted = q.on_tick_end(3, 10);
        let ids: Vec<u32> = promoted.iter().map(|e| e.agent_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn test_escape_valve_after_max_consecutive_drops() {
        let (mut q, stats) = queue(2);
        q.push(&ctx(1, Priority::Wander, 2000.0, 1));
        q.push(&ctx(2, Priority::Wander, 2000.0, 1));

        // max_consecutive_drops = 3: four overflow pushes drop, the
        // fifth trips the valve and is admitted outright.
        for i in 0..4 {
            let outcome = q.push(&ctx(10 + i, Priority::Wander, 2000.0, 1));
            assert_eq!(outcome, PushOutcome::Deferred);
        }
        assert_eq!(q.consecutive_drops(), 4);

        let outcome = q.push(&ctx(99, Priority::Wander, 2000.0, 1));
        assert_eq!(outcome, PushOutcome::Admitted);
        assert_eq!(q.consecutive_drops(), 0);
        assert_eq!(stats.get(TelemetryReason::QueueDropped), 4);
        assert_eq!(stats.get(TelemetryReason::ForceAdmitted), 1);
    }

    #[test]
    fn test_successful_enqueue_resets_drop_counter() {
        let (mut q, _) = queue(2);
        q.push(&ctx(1, Priority::Wander, 2000.0, 1));
        q.push(&ctx(2, Priority::Wander, 2000.0, 1));
        q.push(&ctx(3, Priority::Wander, 2000.0, 1)); // drop
        assert_eq!(q.consecutive_drops(), 1);

        q.on_tick_end(1, 10); // empties the queue
        q.push(&ctx(4, Priority::Wander, 2000.0, 2)); // capacity again
        assert_eq!(q.consecutive_drops(), 0);
    }

    // ── Promotion and aging ──────────────────────────────────────────

    #[test]
    fn test_promotion_is_priority_then_oldest_first() {
        let (mut q, stats) = queue(8);
        q.push(&ctx(1, Priority::Wander, 2000.0, 1));
        q.push(&ctx(2, Priority::Chase, 2000.0, 2));
        q.push(&ctx(3, Priority::Chase, 2000.0, 1));
        q.push(&ctx(4, Priority::Wander, 2000.0, 1));

        let promoted = q.on_tick_end(2, 3);
        let ids: Vec<u32> = promoted.iter().map(|e| e.agent_id).collect();
        // Chase before Wander; within Chase the older request first.
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(q.len(), 1);
        assert_eq!(stats.get(TelemetryReason::DeferPromoted), 3);
    }

    #[test]
    fn test_promotion_respects_cap() {
        let (mut q, _) = queue(8);
        for i in 0..6 {
            q.push(&ctx(i, Priority::Wander, 2000.0, 1));
        }
        let promoted = q.on_tick_end(1, 2);
        assert_eq!(promoted.len(), 2);
        assert_eq!(q.len(), 4);
    }

    #[test]
    fn test_aged_entries_dropped_with_telemetry() {
        let (mut q, stats) = queue(8);
        q.push(&ctx(1, Priority::Wander, 2000.0, 1));
        q.push(&ctx(2, Priority::Wander, 2000.0, 4));

        // max_age_ticks = 2: the tick-1 entry is 4 ticks old at tick 5.
        let promoted = q.on_tick_end(5, 0);
        assert!(promoted.is_empty());
        assert_eq!(q.len(), 1);
        assert_eq!(stats.get(TelemetryReason::DeferAgedOut), 1);
    }

    #[test]
    fn test_far_band_wander_is_dropped_on_overflow() {
        let (mut q, stats) = queue(2);
        q.push(&ctx(1, Priority::Chase, 2000.0, 1));
        q.push(&ctx(2, Priority::Chase, 2000.0, 1));

        // Incoming far-band wander: dropped itself, queue untouched.
        let outcome = q.push(&ctx(3, Priority::Wander, 7000.0, 1));
        assert_eq!(outcome, PushOutcome::Deferred);
        assert_eq!(q.len(), 2);
        assert_eq!(stats.get(TelemetryReason::QueueDropped), 1);

        // A far-band chase request still competes normally.
        let outcome = q.push(&ctx(4, Priority::Chase, 7000.0, 1));
        assert_eq!(outcome, PushOutcome::Deferred);
        assert_eq!(q.len(), 2);
    }

    // ── Overflow signal ──────────────────────────────────────────────

    #[test]
    fn test_overflow_signal_at_ninety_percent() {
        let (mut q, _) = queue(10);
        for i in 0..8 {
            q.push(&ctx(i, Priority::Wander, 2000.0, 1));
        }
        assert!(!q.is_overflowing());
        q.push(&ctx(8, Priority::Wander, 2000.0, 1));
        assert!(q.is_overflowing());
    }
}
