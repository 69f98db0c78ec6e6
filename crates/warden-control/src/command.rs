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

//! Out-of-band control channel into the gate.
//!
//! Admission runs on the tick thread; operator tooling does not. The
//! bounded channel lets any thread adjust the gate without touching its
//! state directly. Commands are drained at the next tick start, disabled
//! or not, so an operator can always re-enable a disabled gate.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use warden_core::error::{GovernorError, GovernorResult};

/// An adjustment applied to the gate at the next tick boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlCommand {
    /// Enables or disables admission control entirely.
    SetEnabled(bool),
    /// Replaces the per-tick unit budget.
    SetBudgetPerTick(u32),
    /// Returns the throttle ladder to `Full` and clears its history.
    ResetThrottle,
    /// Returns the panic protocol to `Normal` and clears its window.
    ResetPanic,
}

/// Cloneable sending side of the control channel.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    sender: Sender<ControlCommand>,
}

impl ControlHandle {
    /// Queues a command for the next tick boundary.
    ///
    /// A full buffer drops the command with an error rather than
    /// blocking: the sender is never allowed to stall the tick thread's
    /// collaborators.
    pub fn send(&self, command: ControlCommand) -> GovernorResult<()> {
        match self.sender.try_send(command) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(cmd)) => {
                log::warn!("[Control] Buffer full, dropping {cmd:?}");
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(GovernorError::ChannelDisconnected),
        }
    }
}

/// Creates a bounded control channel. The receiver is owned by the gate.
pub fn control_channel(capacity: usize) -> (ControlHandle, Receiver<ControlCommand>) {
    let (sender, receiver) = bounded(capacity);
    (ControlHandle { sender }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_arrive_in_order() {
        let (handle, receiver) = control_channel(8);
        handle.send(ControlCommand::SetEnabled(false)).unwrap();
        handle.send(ControlCommand::SetBudgetPerTick(10)).unwrap();
        assert_eq!(receiver.try_recv().unwrap(), ControlCommand::SetEnabled(false));
        assert_eq!(receiver.try_recv().unwrap(), ControlCommand::SetBudgetPerTick(10));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_full_buffer_drops_without_blocking() {
        let (handle, _receiver) = control_channel(1);
        handle.send(ControlCommand::ResetThrottle).unwrap();
        // Buffer full: dropped, not an error, not a block.
        handle.send(ControlCommand::ResetPanic).unwrap();
    }

    #[test]
    fn test_disconnected_receiver_is_an_error() {
        let (handle, receiver) = control_channel(1);
        drop(receiver);
        assert!(matches!(
            handle.send(ControlCommand::ResetThrottle),
            Err(GovernorError::ChannelDisconnected)
        ));
    }
}
