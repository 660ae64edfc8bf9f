//! Supervisor lifecycle states.

use std::fmt;

/// Where the supervised helper is in its lifecycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum SupervisorState {
    /// No helper running.
    #[default]
    Idle,
    /// Helper running with this process id.
    Running(u32),
    /// The last start or run failed.
    Failed(String),
}

impl SupervisorState {
    pub fn is_running(&self) -> bool {
        matches!(self, SupervisorState::Running(_))
    }

    /// Process id of the running helper.
    pub fn pid(&self) -> Option<u32> {
        match self {
            SupervisorState::Running(pid) => Some(*pid),
            _ => None,
        }
    }

    /// Diagnostic for a failed state.
    pub fn failure(&self) -> Option<&str> {
        match self {
            SupervisorState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Idle => write!(f, "Idle"),
            SupervisorState::Running(pid) => write!(f, "Running (PID: {})", pid),
            SupervisorState::Failed(reason) => write!(f, "Failed: {}", reason),
        }
    }
}
