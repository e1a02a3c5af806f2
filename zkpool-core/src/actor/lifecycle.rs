//! Actor scheduling state machine.

use std::fmt;

/// Scheduling state of an [`Actor`](super::Actor).
///
/// # State Transitions
///
/// ```text
/// Waiting → Scheduled → Running → Waiting
/// any → Terminated
/// ```
///
/// A runner that returns to `Waiting` with items still queued immediately
/// competes for `Scheduled` again, like any sender would.
///
/// # Invariants
///
/// - At most one runner holds `Running` at any time
/// - `Terminated` is a sink: no transition leaves it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ActorState {
    /// Mailbox drained, no runner scheduled.
    Waiting = 0,

    /// A run has been handed to the executor but has not started.
    Scheduled = 1,

    /// A runner is applying mailbox items.
    Running = 2,

    /// Stopped; sends are rejected.
    Terminated = 3,
}

impl ActorState {
    /// Check if transition to next state is valid.
    pub fn can_transition_to(&self, next: ActorState) -> bool {
        use ActorState::*;
        matches!(
            (self, next),
            (Waiting, Scheduled)
                | (Scheduled, Running)
                | (Running, Waiting)
                | (Waiting, Terminated)
                | (Scheduled, Terminated)
                | (Running, Terminated)
        )
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ActorState::Terminated)
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ActorState::Waiting,
            1 => ActorState::Scheduled,
            2 => ActorState::Running,
            _ => ActorState::Terminated,
        }
    }
}

impl fmt::Display for ActorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActorState::Waiting => "WAITING",
            ActorState::Scheduled => "SCHEDULED",
            ActorState::Running => "RUNNING",
            ActorState::Terminated => "TERMINATED",
        };
        f.write_str(name)
    }
}
