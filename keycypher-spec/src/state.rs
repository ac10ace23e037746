#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state shared by every platform service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ServiceState {
    Created,
    Initializing,
    Initialized,
    Closed,
    /// Terminal. Entered when a security invariant was violated.
    Compromised,
    Error,
}

impl ServiceState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initializing => "initializing",
            Self::Initialized => "initialized",
            Self::Closed => "closed",
            Self::Compromised => "compromised",
            Self::Error => "error",
        }
    }

    /// States from which `begin_initialize` may start a new stage.
    pub const fn can_initialize(self) -> bool {
        matches!(self, Self::Created | Self::Closed)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Compromised)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
