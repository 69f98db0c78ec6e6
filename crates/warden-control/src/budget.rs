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

//! Per-tick admission budget.
//!
//! The budget is a *count* of admitted computations, not a wall-clock
//! timer: individual call cost is roughly uniform, and counting avoids
//! timing every call in the hot path.

use crate::defer::{DeferQueue, PushOutcome};
use std::sync::Arc;
use warden_core::request::{PathRequest, Priority};
use warden_telemetry::{ReasonStats, TelemetryReason};

/// Enforces the per-tick unit budget and routes overflow to the defer
/// queue.
#[derive(Debug)]
pub struct BudgetGovernor {
    budget_per_tick: u32,
    remaining: u32,
    conservative: bool,
    stats: Arc<ReasonStats>,
}

impl BudgetGovernor {
    /// Creates a governor with a full first-tick budget.
    pub fn new(budget_per_tick: u32, stats: Arc<ReasonStats>) -> Self {
        Self {
            budget_per_tick,
            remaining: budget_per_tick,
            conservative: false,
            stats,
        }
    }

    /// Resets the budget for a fresh tick.
    ///
    /// `promoted_reserved` is the number of defer-queue entries promoted
    /// at the previous tick end; their cost comes out of this tick's
    /// budget before any new request is considered.
    pub fn on_tick_start(&mut self, promoted_reserved: u32) {
        self.remaining = self.effective_budget().saturating_sub(promoted_reserved);
    }

    /// Decides a single request: admit now, or hand to the defer queue.
    ///
    /// Returns `true` when the computation may run this tick.
    pub fn check_request(&mut self, ctx: &mut PathRequest, queue: &mut DeferQueue) -> bool {
        // Combat always runs. Recorded as a bypass, not a spend, so a
        // combat-heavy tick does not starve the regular budget.
        if ctx.in_combat || ctx.priority == Priority::Combat {
            self.stats.increment(TelemetryReason::CombatBypass);
            return true;
        }

        if self.remaining > 0 {
            self.remaining -= 1;
            return true;
        }

        ctx.deferred = true;
        match queue.push(ctx) {
            PushOutcome::Admitted => true,
            PushOutcome::Deferred => false,
        }
    }

    /// Engages or releases conservative mode (panic protocol hook).
    /// While engaged, each fresh tick starts with half the budget.
    pub fn set_conservative(&mut self, conservative: bool) {
        if conservative && !self.conservative {
            log::info!("[Budget] Conservative mode engaged, budget halved");
        }
        self.conservative = conservative;
    }

    /// Replaces the per-tick budget; takes effect next tick.
    pub fn set_budget_per_tick(&mut self, budget: u32) {
        self.budget_per_tick = budget;
    }

    /// Budget units still available this tick.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// The budget a fresh tick starts with under the current mode.
    pub fn effective_budget(&self) -> u32 {
        if self.conservative {
            self.budget_per_tick / 2
        } else {
            self.budget_per_tick
        }
    }
}
