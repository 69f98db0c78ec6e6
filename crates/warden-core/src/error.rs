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

//! Error types for the admission governor.
//!
//! The governor is fail-soft: none of these errors ever crosses the gate
//! boundary toward a caller. They exist so internal faults can be counted
//! under a reason code and resolved to the safest default (admit).

use std::fmt;

/// Convenience alias for governor-internal results.
pub type GovernorResult<T> = Result<T, GovernorError>;

/// Errors raised inside the governor subsystem.
#[derive(Debug, Clone, PartialEq)]
pub enum GovernorError {
    /// A timing sample was NaN, infinite, or negative.
    NonFiniteSample(f64),
    /// A configuration field holds a value the governor cannot operate with.
    InvalidConfig {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
    /// The control channel to the gate has been disconnected.
    ChannelDisconnected,
}

impl fmt::Display for GovernorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GovernorError::NonFiniteSample(v) => {
                write!(f, "non-finite or negative timing sample: {v}")
            }
            GovernorError::InvalidConfig { field, reason } => {
                write!(f, "invalid config field '{field}': {reason}")
            }
            GovernorError::ChannelDisconnected => {
                write!(f, "governor control channel disconnected")
            }
        }
    }
}

impl std::error::Error for GovernorError {}
