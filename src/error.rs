//! Error types for clock operations.
//!
//! Timing itself has no runtime failure mode: unsupported tiers are rejected
//! at compile time and counter wraparound is defined behavior. `ClockError`
//! only covers API misuse that a caller can observe and react to.

use core::fmt;

/// Clock error type.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockError {
    /// `init()` called on a clock that is already running
    AlreadyRunning,

    /// Operation needs a running clock (`init()` not called yet)
    NotRunning,

    /// Tick bus has no free subscriber slot
    SubscribersFull,
}

impl fmt::Display for ClockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockError::AlreadyRunning => write!(f, "Clock already running"),
            ClockError::NotRunning => write!(f, "Clock not running"),
            ClockError::SubscribersFull => write!(f, "Tick subscriber capacity exceeded"),
        }
    }
}
