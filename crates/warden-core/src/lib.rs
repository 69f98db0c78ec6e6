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

//! # Warden Core
//!
//! Foundational crate containing the types and contracts shared by the
//! admission governor: request contexts and their priority tiers, the
//! throttle-level ladder, rolling tick statistics, configuration, and
//! error types.
//!
//! The governor itself lives in `warden-control`; this crate holds only
//! the vocabulary it speaks.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod request;
pub mod stats;
pub mod throttle;

pub use config::GovernorConfig;
pub use error::{GovernorError, GovernorResult};
pub use request::{PathRequest, Priority, RequestPool};
pub use stats::{RollingTickStats, TickStatsSource};
pub use throttle::ThrottleLevel;
