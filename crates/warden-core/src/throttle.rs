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

//! The throttle-level ladder.

use serde::{Deserialize, Serialize};

/// Global throttle aggressiveness level.
///
/// A totally ordered, closed set of four levels. The order of variants
/// defines aggressiveness (first = no throttling). Each level carries a
/// *spread* (update period in ticks) and a *max-skip* (consecutive ticks
/// an object may be skipped).
///
/// Update eligibility for a given object and tick is
/// `(tick + object_sequence_id) % spread == 0`, which deterministically
/// spreads load across ticks without per-object timers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub enum ThrottleLevel {
    /// Baseline: every object updates every tick.
    #[default]
    Full,
    /// Light throttling: updates spread over 2 ticks.
    Reduced,
    /// Heavy throttling: updates spread over 4 ticks.
    Low,
    /// Maximum throttling: updates spread over 8 ticks.
    Minimal,
}

impl ThrottleLevel {
    /// All levels, baseline first.
    pub const ALL: [ThrottleLevel; 4] = [
        ThrottleLevel::Full,
        ThrottleLevel::Reduced,
        ThrottleLevel::Low,
        ThrottleLevel::Minimal,
    ];

    /// Update period in ticks at this level.
    pub fn spread(self) -> u64 {
        match self {
            ThrottleLevel::Full => 1,
            ThrottleLevel::Reduced => 2,
            ThrottleLevel::Low => 4,
            ThrottleLevel::Minimal => 8,
        }
    }

    /// Maximum consecutive ticks an object may be skipped at this level.
    pub fn max_skip(self) -> u64 {
        match self {
            ThrottleLevel::Full => 0,
            ThrottleLevel::Reduced => 1,
            ThrottleLevel::Low => 3,
            ThrottleLevel::Minimal => 7,
        }
    }

    /// Whether the object with the given sequence id is update-eligible
    /// this tick.
    pub fn should_update(self, object_sequence_id: u64, tick: u64) -> bool {
        let spread = self.spread();
        if spread <= 1 {
            return true;
        }
        (tick.wrapping_add(object_sequence_id)) % spread == 0
    }

    /// The next more aggressive level; saturates at [`ThrottleLevel::Minimal`].
    pub fn demoted(self) -> ThrottleLevel {
        match self {
            ThrottleLevel::Full => ThrottleLevel::Reduced,
            ThrottleLevel::Reduced => ThrottleLevel::Low,
            ThrottleLevel::Low | ThrottleLevel::Minimal => ThrottleLevel::Minimal,
        }
    }

    /// The next level toward baseline; saturates at [`ThrottleLevel::Full`].
    pub fn promoted(self) -> ThrottleLevel {
        match self {
            ThrottleLevel::Full | ThrottleLevel::Reduced => ThrottleLevel::Full,
            ThrottleLevel::Low => ThrottleLevel::Reduced,
            ThrottleLevel::Minimal => ThrottleLevel::Low,
        }
    }

    /// `true` if this is the most aggressive level (demotion floor).
    pub fn is_floor(self) -> bool {
        self == ThrottleLevel::Minimal
    }
}

impl std::fmt::Display for ThrottleLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
