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

//! # Warden Control
//!
//! The admission-control governor: a closed-loop backpressure controller
//! protecting a fixed-budget tick loop. It decides *when* a requested
//! computation runs (this tick, a later tick, or never), never what
//! the computation produces.
//!
//! [`AdmissionGate`] is the only type external collaborators call. The
//! pipeline behind it: duplicate suppression → per-tick budget → bounded
//! defer queue, with a hysteresis throttle ladder and a sliding-window
//! panic protocol closing the loop on observed tick timings.
//!
//! The whole admission path runs synchronously on the owning tick thread.
//! There is no locking and no allocation in the hot path; the only state
//! readable from other threads is the monotonic reason counters.

#![warn(missing_docs)]

pub mod breaker;
pub mod budget;
pub mod command;
pub mod defer;
pub mod filter;
pub mod gate;
pub mod guard;
pub mod hysteresis;
pub mod memo;
pub mod panic;

pub use breaker::FaultBreaker;
pub use budget::BudgetGovernor;
pub use command::{control_channel, ControlCommand, ControlHandle};
pub use defer::{DeferQueue, DeferredRequest, PushOutcome};
pub use filter::DuplicateRequestFilter;
pub use gate::AdmissionGate;
pub use guard::{ComputationTimeoutGuard, GuardStatus, GuardedOutcome};
pub use hysteresis::ThrottleStateMachine;
pub use memo::{FrameLocalMemo, MemoKey};
pub use panic::{PanicPhase, PanicProtocol};
