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

//! Wall-clock guard around individual admitted computations.
//!
//! The guard cannot interrupt a computation mid-flight; it measures the
//! finished call and discards results that blew the deadline, so one
//! pathological query cannot both stall the tick *and* inject a result
//! computed from a half-stalled world.

use std::sync::Arc;
use std::time::{Duration, Instant};
use warden_telemetry::{ReasonStats, TelemetryReason};

/// Outcome classification of a guarded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStatus {
    /// Finished under the warning threshold.
    Success,
    /// Finished between the warning and timeout thresholds.
    Warning,
    /// Blew the timeout; the result was discarded.
    Timeout,
}

/// Result of a guarded call: the value (unless discarded), the
/// classification, and the measured duration.
#[derive(Debug)]
pub struct GuardedOutcome<T> {
    /// The computed value, or `None` after a timeout.
    pub result: Option<T>,
    /// How the call was classified.
    pub status: GuardStatus,
    /// Wall-clock duration of the call.
    pub elapsed: Duration,
}

/// Measures guarded computations against warn/timeout deadlines.
#[derive(Debug)]
pub struct ComputationTimeoutGuard {
    warn_after: Duration,
    timeout_after: Duration,
    consecutive_timeouts: u32,
    stats: Arc<ReasonStats>,
}

impl ComputationTimeoutGuard {
    /// Creates a guard with the given thresholds, in milliseconds.
    pub fn new(warn_elapsed_ms: u64, timeout_elapsed_ms: u64, stats: Arc<ReasonStats>) -> Self {
        Self {
            warn_after: Duration::from_millis(warn_elapsed_ms),
            timeout_after: Duration::from_millis(timeout_elapsed_ms),
            consecutive_timeouts: 0,
            stats,
        }
    }

    /// Runs `computation` and classifies it by elapsed wall-clock time.
    pub fn guard<T>(&mut self, computation: impl FnOnce() -> T) -> GuardedOutcome<T> {
        let started = Instant::now();
        let value = computation();
        let elapsed = started.elapsed();

        match self.classify(elapsed) {
            GuardStatus::Timeout => {
                self.consecutive_timeouts += 1;
                self.stats.increment(TelemetryReason::TimeoutDiscarded);
                log::warn!(
                    "[Guard] Computation took {:.1}ms (limit {:?}), result discarded ({} consecutive)",
                    elapsed.as_secs_f64() * 1000.0,
                    self.timeout_after,
                    self.consecutive_timeouts
                );
                GuardedOutcome {
                    result: None,
                    status: GuardStatus::Timeout,
                    elapsed,
                }
            }
            GuardStatus::Warning => {
                self.consecutive_timeouts = 0;
                self.stats.increment(TelemetryReason::SlowWarning);
                log::debug!(
                    "[Guard] Slow computation: {:.1}ms (warn at {:?})",
                    elapsed.as_secs_f64() * 1000.0,
                    self.warn_after
                );
                GuardedOutcome {
                    result: Some(value),
                    status: GuardStatus::Warning,
                    elapsed,
                }
            }
            GuardStatus::Success => {
                self.consecutive_timeouts = 0;
                GuardedOutcome {
                    result: Some(value),
                    status: GuardStatus::Success,
                    elapsed,
                }
            }
        }
    }

    // The timeout bound is exclusive: a call landing exactly on the hard
    // limit is still a warning. The warning bound is inclusive.
    fn classify(&self, elapsed: Duration) -> GuardStatus {
        if elapsed > self.timeout_after {
            GuardStatus::Timeout
        } else if elapsed >= self.warn_after {
            GuardStatus::Warning
        } else {
            GuardStatus::Success
        }
    }

    /// Length of the current run of timed-out calls.
    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn guard(warn_ms: u64, timeout_ms: u64) -> (ComputationTimeoutGuard, Arc<ReasonStats>) {
        let stats = Arc::new(ReasonStats::new());
        (
            ComputationTimeoutGuard::new(warn_ms, timeout_ms, Arc::clone(&stats)),
            stats,
        )
    }

    #[test]
    fn test_fast_computation_succeeds() {
        let (mut g, _) = guard(50, 100);
        let outcome = g.guard(|| 42);
        assert_eq!(outcome.result, Some(42));
        assert_eq!(outcome.status, GuardStatus::Success);
    }

    #[test]
    fn test_slow_computation_warns_but_keeps_result() {
        let (mut g, stats) = guard(5, 1000);
        let outcome = g.guard(|| {
            thread::sleep(Duration::from_millis(20));
            7
        });
        assert_eq!(outcome.result, Some(7));
        assert_eq!(outcome.status, GuardStatus::Warning);
        assert_eq!(stats.get(TelemetryReason::SlowWarning), 1);
    }

    #[test]
    fn test_timeout_discards_result() {
        let (mut g, stats) = guard(5, 10);
        let outcome: GuardedOutcome<i32> = g.guard(|| {
            thread::sleep(Duration::from_millis(30));
            7
        });
        assert_eq!(outcome.result, None);
        assert_eq!(outcome.status, GuardStatus::Timeout);
        assert_eq!(stats.get(TelemetryReason::TimeoutDiscarded), 1);
        assert_eq!(g.consecutive_timeouts(), 1);
    }

    #[test]
    fn test_boundaries_classify_strictly() {
        let (g, _) = guard(50, 100);
        assert_eq!(g.classify(Duration::from_millis(49)), GuardStatus::Success);
        assert_eq!(g.classify(Duration::from_millis(50)), GuardStatus::Warning);
        // Exactly on the hard limit is still the warning band.
        assert_eq!(g.classify(Duration::from_millis(100)), GuardStatus::Warning);
        assert_eq!(g.classify(Duration::from_millis(101)), GuardStatus::Timeout);
    }

    #[test]
    fn test_success_resets_timeout_run() {
        let (mut g, _) = guard(5, 10);
        g.guard(|| thread::sleep(Duration::from_millis(30)));
        g.guard(|| thread::sleep(Duration::from_millis(30)));
        assert_eq!(g.consecutive_timeouts(), 2);
        g.guard(|| ());
        assert_eq!(g.consecutive_timeouts(), 0);
    }
}
