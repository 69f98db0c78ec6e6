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

//! Frame-local memo for repeated boolean queries.
//!
//! Within one tick the world does not move, so a pairwise or per-cell
//! query answered once is correct for the rest of the tick. The TTL is
//! exactly one tick and is not configurable; the cache is cleared at
//! both tick boundaries so stale answers cannot survive a missed hook.

use std::collections::HashMap;
use std::sync::Arc;
use warden_telemetry::{ReasonStats, TelemetryReason};

/// Key of one memoized query.
///
/// Pair keys are order-normalized so `(a, b)` and `(b, a)` share an
/// entry. Cell keys carry signed coordinates directly instead of packing
/// them into a bitmask, which silently collided on negative values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoKey {
    /// An unordered pair of entity identifiers.
    Pair {
        /// Smaller identifier of the pair.
        lo: u32,
        /// Larger identifier of the pair.
        hi: u32,
    },
    /// A single grid cell.
    Cell {
        /// Cell X coordinate.
        x: i32,
        /// Cell Y coordinate.
        y: i32,
    },
}

impl MemoKey {
    /// Builds an order-normalized pair key.
    pub fn pair(a: u32, b: u32) -> Self {
        Self::Pair {
            lo: a.min(b),
            hi: a.max(b),
        }
    }

    /// Builds a cell key.
    pub fn cell(x: i32, y: i32) -> Self {
        Self::Cell { x, y }
    }
}

/// One-tick cache of boolean query results.
#[derive(Debug)]
pub struct FrameLocalMemo {
    cache: HashMap<MemoKey, bool>,
    stats: Arc<ReasonStats>,
}

impl FrameLocalMemo {
    /// Creates an empty memo reporting into `stats`.
    pub fn new(stats: Arc<ReasonStats>) -> Self {
        Self {
            cache: HashMap::new(),
            stats,
        }
    }

    /// Looks up a cached answer, counting the hit or miss.
    pub fn get(&self, key: MemoKey) -> Option<bool> {
        match self.cache.get(&key) {
            Some(&value) => {
                self.stats.increment(TelemetryReason::MemoHit);
                Some(value)
            }
            None => {
                self.stats.increment(TelemetryReason::MemoMiss);
                None
            }
        }
    }

    /// Stores an answer for the remainder of the current tick.
    pub fn insert(&mut self, key: MemoKey, value: bool) {
        self.cache.insert(key, value);
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Tick-start clear.
    pub fn on_tick_start(&mut self) {
        self.cache.clear();
    }

    /// Tick-end clear.
    pub fn on_tick_end(&mut self) {
        self.cache.clear();
    }
}
