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

//! Rolling tick-timing statistics.
//!
//! The hysteresis ladder consumes two window views: the maximum tick
//! duration over the last ~1 second (spike detection) and the average
//! over the last ~5 seconds (stability). Both must be representable as
//! "insufficient data", which disables all entry/exit logic.

use crate::error::{GovernorError, GovernorResult};

/// Number of samples in the 1-second sub-window (60 ticks at 60 Hz).
const WINDOW_1S_TICKS: usize = 60;
/// Number of samples in the 5-second window (300 ticks at 60 Hz).
const WINDOW_5S_TICKS: usize = 300;

/// Read-only view of rolling tick-duration statistics.
///
/// Implemented by whatever collects tick timings; the governor only ever
/// consumes this trait. Both values are in milliseconds.
pub trait TickStatsSource {
    /// `true` once enough samples exist for the windows to be meaningful.
    fn has_enough_data(&self) -> bool;
    /// Maximum tick duration over the last ~1 second.
    fn max_1s_ms(&self) -> f64;
    /// Average tick duration over the last ~5 seconds.
    fn avg_5s_ms(&self) -> f64;
}

/// A fixed-size circular buffer for storing numerical samples.
#[derive(Debug, Clone)]
pub struct RingBuffer<T, const N: usize> {
    data: [T; N],
    index: usize,
    count: usize,
}

impl<T: Default + Copy, const N: usize> RingBuffer<T, N> {
    /// Creates a new, empty ring buffer.
    pub fn new() -> Self {
        Self {
            data: [T::default(); N],
            index: 0,
            count: 0,
        }
    }

    /// Pushes a new value into the buffer, overwriting the oldest if full.
    pub fn push(&mut self, value: T) {
        self.data[self.index] = value;
        self.index = (self.index + 1) % N;
        if self.count < N {
            self.count += 1;
        }
    }

    /// Returns the number of elements currently in the buffer.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Clears the buffer.
    pub fn clear(&mut self) {
        self.index = 0;
        self.count = 0;
        self.data = [T::default(); N];
    }

    /// Iterates over the newest `n` values, newest first.
    pub fn iter_newest(&self, n: usize) -> impl Iterator<Item = &T> {
        let take = n.min(self.count);
        (0..take).map(move |i| {
            let idx = (self.index + N - 1 - i) % N;
            &self.data[idx]
        })
    }
}

impl<T: Default + Copy, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> RingBuffer<f64, N> {
    /// Arithmetic mean of all stored values, or 0.0 if empty.
    pub fn average(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.iter_newest(self.count).sum::<f64>() / self.count as f64
    }

    /// Maximum over the newest `n` values, or 0.0 if empty.
    pub fn max_of_newest(&self, n: usize) -> f64 {
        self.iter_newest(n).copied().fold(0.0, f64::max)
    }
}

/// Default [`TickStatsSource`] backed by a 300-sample ring buffer.
///
/// Windows are monotonically advancing: a recorded sample can never be
/// referenced once it ages past the 5-second window.
#[derive(Debug, Clone, Default)]
pub struct RollingTickStats {
    durations: RingBuffer<f64, WINDOW_5S_TICKS>,
}

impl RollingTickStats {
    /// Creates an empty statistics window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the duration of one tick, in milliseconds.
    ///
    /// Non-finite or negative samples are rejected so one bad reading
    /// cannot poison the windows.
    pub fn record(&mut self, tick_ms: f64) -> GovernorResult<()> {
        if !tick_ms.is_finite() || tick_ms < 0.0 {
            return Err(GovernorError::NonFiniteSample(tick_ms));
        }
        self.durations.push(tick_ms);
        Ok(())
    }

    /// Number of samples currently held.
    pub fn sample_count(&self) -> usize {
        self.durations.count()
    }

    /// Discards all samples.
    pub fn reset(&mut self) {
        self.durations.clear();
    }
}

impl TickStatsSource for RollingTickStats {
    fn has_enough_data(&self) -> bool {
        // At least one full 1s window; shorter runs are not meaningful.
        self.durations.count() >= WINDOW_1S_TICKS
    }

    fn max_1s_ms(&self) -> f64 {
        self.durations.max_of_newest(WINDOW_1S_TICKS)
    }

    fn avg_5s_ms(&self) -> f64 {
        self.durations.average()
    }
}
