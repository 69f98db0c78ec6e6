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

//! Request context types and the pooled arena they are recycled through.

use serde::{Deserialize, Serialize};

/// Caller-assigned priority tier for a pathfinding request.
///
/// The order of variants defines the priority ordering (first = lowest).
/// `Combat` bypasses the per-tick budget entirely.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum Priority {
    /// Passive wandering (lowest, first drop candidate).
    #[default]
    Wander,
    /// Active pursuit of a target.
    Chase,
    /// Combat engagement (highest, always admitted).
    Combat,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Ephemeral context for a single admission decision.
///
/// Constructed (or recycled from a [`RequestPool`]) immediately before a
/// check, consumed synchronously, and discarded or requeued at tick end.
/// It never survives past the tick in which its decision is finalized,
/// except while sitting in the defer queue.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathRequest {
    /// Identifier of the requesting agent.
    pub agent_id: u32,
    /// Squared distance to the nearest interested party (avoids a sqrt).
    pub distance_sq: f32,
    /// Caller-assigned priority tier.
    pub priority: Priority,
    /// Tick number at which the request was made.
    pub tick: u64,
    /// Target X coordinate.
    pub target_x: f32,
    /// Target Y coordinate.
    pub target_y: f32,
    /// `true` if the agent is in a combat state (budget bypass).
    pub in_combat: bool,
    /// `true` if the agent already holds a usable path.
    pub has_existing_path: bool,
    /// Set by the governor when the request is pushed to the defer queue.
    pub deferred: bool,
}

impl PathRequest {
    /// Resets this instance in place for reuse.
    ///
    /// Every field is overwritten; nothing from the previous use survives.
    #[allow(clippy::too_many_arguments)]
    pub fn reset(
        &mut self,
        agent_id: u32,
        distance_sq: f32,
        priority: Priority,
        tick: u64,
        target_x: f32,
        target_y: f32,
        in_combat: bool,
        has_existing_path: bool,
    ) {
        self.agent_id = agent_id;
        self.distance_sq = distance_sq;
        self.priority = priority;
        self.tick = tick;
        self.target_x = target_x;
        self.target_y = target_y;
        self.in_combat = in_combat;
        self.has_existing_path = has_existing_path;
        self.deferred = false;
    }
}

/// Free-list arena for [`PathRequest`] instances.
///
/// The admission path runs every tick for a large population, so request
/// contexts are reused instead of allocated. Instances are reset in place
/// on acquisition and are never shared between threads; each calling
/// thread owns its own pool.
#[derive(Debug, Default)]
pub struct RequestPool {
    free: Vec<PathRequest>,
}

impl RequestPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a pool pre-populated with `capacity` reusable instances.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: vec![PathRequest::default(); capacity],
        }
    }

    /// Acquires a request context, recycling a free instance when available.
    ///
    /// The returned instance is fully reset before being handed out.
    #[allow(clippy::too_many_arguments)]
    pub fn acquire(
        &mut self,
        agent_id: u32,
        distance_sq: f32,
        priority: Priority,
        tick: u64,
        target_x: f32,
        target_y: f32,
        in_combat: bool,
        has_existing_path: bool,
    ) -> PathRequest {
        let mut request = self.free.pop().unwrap_or_default();
        request.reset(
            agent_id,
            distance_sq,
            priority,
            tick,
            target_x,
            target_y,
            in_combat,
            has_existing_path,
        );
        request
    }

    /// Returns a consumed request to the free list.
    pub fn release(&mut self, request: PathRequest) {
        self.free.push(request);
    }

    /// Number of instances currently available for reuse.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}
