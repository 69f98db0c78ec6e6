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

//! Configuration for the admission governor.
//!
//! Every tunable has a stated default and can be overridden from JSON.
//! The frame-local memo TTL is deliberately *not* configurable: it is
//! fixed at one tick.

use crate::error::{GovernorError, GovernorResult};
use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}
fn default_budget_per_tick() -> u32 {
    50
}
fn default_defer_queue_max() -> usize {
    200
}
fn default_max_consecutive_drops() -> u32 {
    3
}
fn default_defer_max_age_ticks() -> u64 {
    2
}
fn default_near_dist_sq() -> f32 {
    400.0 // 20 tiles
}
fn default_medium_dist_sq() -> f32 {
    1600.0 // 40 tiles
}
fn default_far_dist_sq() -> f32 {
    6400.0 // 80 tiles
}
fn default_entry_max_1s_ms() -> f64 {
    33.33
}
fn default_entry_avg_5s_ms() -> f64 {
    20.0
}
fn default_exit_avg_5s_ms() -> f64 {
    12.0
}
fn default_exit_stability_ticks() -> u32 {
    300
}
fn default_spike_threshold_ms() -> f64 {
    100.0
}
fn default_spike_window_ms() -> u64 {
    5000
}
fn default_spike_count_threshold() -> u32 {
    2
}
fn default_recovery_phase_ticks() -> u32 {
    30
}
fn default_warn_elapsed_ms() -> u64 {
    50
}
fn default_timeout_elapsed_ms() -> u64 {
    100
}
fn default_fault_disable_threshold() -> u32 {
    3
}
fn default_status_log_interval_ticks() -> u64 {
    3600 // ~60s at 60 ticks/s; 0 disables the periodic summary
}
fn default_control_buffer_size() -> usize {
    64
}

/// All tunables of the admission governor, with their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Master enable flag. When `false`, every check passes through.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Unit budget of admitted computations per tick.
    #[serde(default = "default_budget_per_tick")]
    pub budget_per_tick: u32,
    /// Maximum number of entries the defer queue may hold.
    #[serde(default = "default_defer_queue_max")]
    pub defer_queue_max: usize,
    /// Consecutive queue-full drops tolerated before the escape valve
    /// force-admits the next overflow request.
    #[serde(default = "default_max_consecutive_drops")]
    pub max_consecutive_drops: u32,
    /// Ticks a deferred entry may age before it is dropped.
    #[serde(default = "default_defer_max_age_ticks")]
    pub defer_max_age_ticks: u64,

    /// Near distance band (squared). Requests inside it never wait.
    #[serde(default = "default_near_dist_sq")]
    pub near_dist_sq: f32,
    /// Medium distance band (squared).
    #[serde(default = "default_medium_dist_sq")]
    pub medium_dist_sq: f32,
    /// Far distance band (squared). Beyond it, requests are drop candidates.
    #[serde(default = "default_far_dist_sq")]
    pub far_dist_sq: f32,

    /// Hysteresis entry threshold on the 1s max window, in ms.
    #[serde(default = "default_entry_max_1s_ms")]
    pub entry_max_1s_ms: f64,
    /// Hysteresis entry threshold on the 5s average window, in ms.
    #[serde(default = "default_entry_avg_5s_ms")]
    pub entry_avg_5s_ms: f64,
    /// Hysteresis exit threshold on the 5s average window, in ms.
    #[serde(default = "default_exit_avg_5s_ms")]
    pub exit_avg_5s_ms: f64,
    /// Consecutive qualifying ticks required before a recovery promotion.
    #[serde(default = "default_exit_stability_ticks")]
    pub exit_stability_ticks: u32,

    /// Tick duration classified as a severe spike, in ms.
    #[serde(default = "default_spike_threshold_ms")]
    pub spike_threshold_ms: f64,
    /// Width of the sliding spike window, in ms.
    #[serde(default = "default_spike_window_ms")]
    pub spike_window_ms: u64,
    /// Spikes inside the window required to trigger panic.
    #[serde(default = "default_spike_count_threshold")]
    pub spike_count_threshold: u32,
    /// Length of each gradual-recovery phase, in ticks.
    #[serde(default = "default_recovery_phase_ticks")]
    pub recovery_phase_ticks: u32,

    /// Elapsed time after which a guarded computation logs a warning, in ms.
    #[serde(default = "default_warn_elapsed_ms")]
    pub warn_elapsed_ms: u64,
    /// Elapsed time after which a guarded computation's result is
    /// discarded, in ms.
    #[serde(default = "default_timeout_elapsed_ms")]
    pub timeout_elapsed_ms: u64,

    /// Consecutive internal errors before a stage disables itself.
    #[serde(default = "default_fault_disable_threshold")]
    pub fault_disable_threshold: u32,
    /// Ticks between periodic status summaries (0 = never).
    #[serde(default = "default_status_log_interval_ticks")]
    pub status_log_interval_ticks: u64,
    /// Capacity of the out-of-band control command channel.
    #[serde(default = "default_control_buffer_size")]
    pub control_buffer_size: usize,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        // Round-tripping through an empty JSON object applies every
        // field default exactly once, so they cannot drift apart.
        serde_json::from_str("{}").expect("defaults are infallible")
    }
}

impl GovernorConfig {
    /// Parses a config from a JSON string and validates it.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: GovernorConfig = serde_json::from_str(json)?;
        config.validate()?;
        log::debug!(
            "[Config] Loaded governor config (budget {}/tick, queue max {})",
            config.budget_per_tick,
            config.defer_queue_max
        );
        Ok(config)
    }

    /// Rejects values the governor cannot operate with.
    pub fn validate(&self) -> GovernorResult<()> {
        if self.budget_per_tick == 0 {
            return Err(GovernorError::InvalidConfig {
                field: "budget_per_tick",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.defer_queue_max == 0 {
            return Err(GovernorError::InvalidConfig {
                field: "defer_queue_max",
                reason: "must be greater than zero".to_string(),
            });
        }
        if !(self.near_dist_sq.is_finite()
            && self.medium_dist_sq.is_finite()
            && self.far_dist_sq.is_finite())
        {
            return Err(GovernorError::InvalidConfig {
                field: "near_dist_sq",
                reason: "distance bands must be finite".to_string(),
            });
        }
        if self.near_dist_sq > self.medium_dist_sq || self.medium_dist_sq > self.far_dist_sq {
            return Err(GovernorError::InvalidConfig {
                field: "medium_dist_sq",
                reason: "distance bands must be ordered near <= medium <= far".to_string(),
            });
        }
        if self.exit_avg_5s_ms >= self.entry_avg_5s_ms {
            return Err(GovernorError::InvalidConfig {
                field: "exit_avg_5s_ms",
                reason: "exit threshold must sit below the entry threshold (hysteresis)"
                    .to_string(),
            });
        }
        if self.exit_stability_ticks == 0 {
            return Err(GovernorError::InvalidConfig {
                field: "exit_stability_ticks",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.warn_elapsed_ms > self.timeout_elapsed_ms {
            return Err(GovernorError::InvalidConfig {
                field: "warn_elapsed_ms",
                reason: "warning threshold must not exceed the timeout threshold".to_string(),
            });
        }
        if self.spike_count_threshold == 0 {
            return Err(GovernorError::InvalidConfig {
                field: "spike_count_threshold",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_stated_values() {
        let config = GovernorConfig::default();
        assert!(config.enabled);
        assert_eq!(config.budget_per_tick, 50);
        assert_eq!(config.defer_queue_max, 200);
        assert_eq!(config.max_consecutive_drops, 3);
        assert_eq!(config.near_dist_sq, 400.0);
        assert_eq!(config.medium_dist_sq, 1600.0);
        assert_eq!(config.far_dist_sq, 6400.0);
        assert_eq!(config.entry_max_1s_ms, 33.33);
        assert_eq!(config.entry_avg_5s_ms, 20.0);
        assert_eq!(config.exit_avg_5s_ms, 12.0);
        assert_eq!(config.exit_stability_ticks, 300);
        assert_eq!(config.spike_threshold_ms, 100.0);
        assert_eq!(config.spike_window_ms, 5000);
        assert_eq!(config.spike_count_threshold, 2);
        assert_eq!(config.recovery_phase_ticks, 30);
        assert_eq!(config.warn_elapsed_ms, 50);
        assert_eq!(config.timeout_elapsed_ms, 100);
        assert_eq!(config.fault_disable_threshold, 3);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_json_override() {
        let config = GovernorConfig::from_json_str(r#"{ "budget_per_tick": 25 }"#).unwrap();
        assert_eq!(config.budget_per_tick, 25);
        assert_eq!(config.defer_queue_max, 200); // untouched default
    }

    #[test]
    fn test_rejects_zero_budget() {
        let result = GovernorConfig::from_json_str(r#"{ "budget_per_tick": 0 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_inverted_hysteresis_thresholds() {
        let mut config = GovernorConfig::default();
        config.exit_avg_5s_ms = 25.0; // above the 20.0 entry threshold
        assert!(matches!(
            config.validate(),
            Err(GovernorError::InvalidConfig {
                field: "exit_avg_5s_ms",
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_unordered_distance_bands() {
        let mut config = GovernorConfig::default();
        config.medium_dist_sq = 100.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_warning_above_timeout() {
        let mut config = GovernorConfig::default();
        config.warn_elapsed_ms = 150;
        assert!(config.validate().is_err());
    }
}
