//! Lifecycle state machines for connections and nodes.
//!
//! Both follow the same four-step cycle, and every transition is guarded:
//!
//! ```text
//! ConnectionState:  Idle    → Starting → Active  → Stopping → Idle
//! NodeState:        Stopped → Starting → Running → Stopping → Stopped
//! ```
//!
//! `Starting` and `Stopping` only exist while a lifecycle operation is in
//! flight. A failed start falls back to the resting state; a failed stop
//! falls back to the running state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TypewireError;

/// Lifecycle of a stream [`Client`](crate::Client) or [`Server`](crate::Server).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    #[default]
    Idle,
    Starting,
    Active,
    Stopping,
}

impl ConnectionState {
    /// Returns `true` if packets can be sent.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// The state's name, as used in errors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting => "Starting",
            Self::Active => "Active",
            Self::Stopping => "Stopping",
        }
    }

    /// Fails with [`TypewireError::InvalidState`] unless `self == wanted`.
    pub(crate) fn require(self, wanted: Self, operation: &'static str) -> Result<(), TypewireError> {
        if self == wanted {
            Ok(())
        } else {
            Err(TypewireError::InvalidState {
                operation,
                state: self.as_str(),
            })
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a datagram [`Node`](crate::Node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NodeState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl NodeState {
    /// Returns `true` if the node is bound and receiving.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// The state's name, as used in errors and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
        }
    }

    /// Fails with [`TypewireError::InvalidState`] unless `self == wanted`.
    pub(crate) fn require(self, wanted: Self, operation: &'static str) -> Result<(), TypewireError> {
        if self == wanted {
            Ok(())
        } else {
            Err(TypewireError::InvalidState {
                operation,
                state: self.as_str(),
            })
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_states() {
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
        assert_eq!(NodeState::default(), NodeState::Stopped);
    }

    #[test]
    fn test_require_accepts_matching_state() {
        assert!(ConnectionState::Idle.require(ConnectionState::Idle, "connect").is_ok());
        assert!(NodeState::Running.require(NodeState::Running, "send").is_ok());
    }

    #[test]
    fn test_require_rejects_other_states() {
        let err = ConnectionState::Stopping
            .require(ConnectionState::Active, "send")
            .unwrap_err();
        assert!(matches!(
            err,
            TypewireError::InvalidState {
                operation: "send",
                state: "Stopping"
            }
        ));
    }

    #[test]
    fn test_is_active_and_is_running() {
        assert!(ConnectionState::Active.is_active());
        assert!(!ConnectionState::Starting.is_active());
        assert!(NodeState::Running.is_running());
        assert!(!NodeState::Stopping.is_running());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Active.to_string(), "Active");
        assert_eq!(NodeState::Stopped.to_string(), "Stopped");
    }
}
