//! Error types for the engine
//!
//! This module defines error types for configuration building ([`BuilderError`]),
//! rejected feature/rate requests ([`PolicyViolation`]) and runtime
//! operations ([`Error`]).
//!
//! ## Error Types
//!
//! - [`BuilderError`] - Errors during configuration construction
//! - [`PolicyViolation`] - A requested rate or feature combination is illegal;
//!   nothing was sent to the panel
//! - [`Error`] - Runtime errors, wrapping the interface error
//!
//! Vblank wait timeouts are never surfaced: the engine falls back to a
//! fixed sleep instead.
//!
//! ## Example
//!
//! ```
//! use amoled_vrr::{Builder, BuilderError};
//!
//! let result = Builder::new().max_vrefresh(90).build();
//! assert!(matches!(result, Err(BuilderError::InvalidMaxRefresh { hz: 90 })));
//! ```

use crate::command::CapacityError;
use crate::interface::PanelInterface;

/// An illegal rate or feature combination
///
/// Always detected before any command is sent, so the hardware shadow is
/// untouched and the caller may correct the request and resubmit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyViolation {
    /// Refresh rate outside the supported set
    UnsupportedRate {
        /// Requested rate in Hz
        vrefresh: u32,
    },
    /// Idle rate outside the supported idle tiers
    UnsupportedIdleRate {
        /// Requested idle rate in Hz
        idle_vrefresh: u32,
    },
    /// Idle rate is not strictly below the active rate
    IdleNotBelowTarget {
        /// Requested idle rate in Hz
        idle_vrefresh: u32,
        /// Active rate in Hz
        target_vrefresh: u32,
    },
    /// Automatic frame stepping must be on exactly when an idle rate is set
    AutoSteppingMismatch,
    /// Early exit is required at the maximum rate and whenever idle is set
    EarlyExitRequired,
    /// Mode rate exceeds the current operating rate
    RateAboveOperatingRate {
        /// Requested rate in Hz
        vrefresh: u32,
        /// Operating rate in Hz
        op_hz: u32,
    },
    /// Operating rate is not 60/120 Hz or is below the current mode's rate
    InvalidOperatingRate {
        /// Requested operating rate in Hz
        op_hz: u32,
        /// Current mode rate in Hz
        vrefresh: u32,
    },
}

impl core::fmt::Display for PolicyViolation {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnsupportedRate { vrefresh } => write!(f, "Unsupported refresh rate {vrefresh} Hz"),
            Self::UnsupportedIdleRate { idle_vrefresh } => {
                write!(f, "Unsupported idle refresh rate {idle_vrefresh} Hz")
            }
            Self::IdleNotBelowTarget {
                idle_vrefresh,
                target_vrefresh,
            } => write!(
                f,
                "Idle rate {idle_vrefresh} Hz must be below active rate {target_vrefresh} Hz"
            ),
            Self::AutoSteppingMismatch => {
                write!(f, "Automatic frame stepping must match idle rate presence")
            }
            Self::EarlyExitRequired => write!(f, "Early exit required for this configuration"),
            Self::RateAboveOperatingRate { vrefresh, op_hz } => {
                write!(f, "Refresh rate {vrefresh} Hz exceeds operating rate {op_hz} Hz")
            }
            Self::InvalidOperatingRate { op_hz, vrefresh } => {
                write!(f, "Invalid operating rate {op_hz} Hz for {vrefresh} Hz mode")
            }
        }
    }
}

impl core::error::Error for PolicyViolation {}

/// Errors that can occur while driving the panel
///
/// Generic over the interface type to preserve the specific error type.
#[derive(Debug)]
pub enum Error<I: PanelInterface> {
    /// Interface error from the command channel
    ///
    /// The hardware shadow is not updated, so the same commands are
    /// attempted again on the next reconcile.
    Interface(I::Error),
    /// Request rejected before any hardware traffic
    Policy(PolicyViolation),
    /// Command batch outgrew its fixed capacity
    BatchOverflow,
    /// Operation needs a current mode, but none has been set
    NoMode,
}

impl<I: PanelInterface> From<PolicyViolation> for Error<I> {
    fn from(violation: PolicyViolation) -> Self {
        Self::Policy(violation)
    }
}

impl<I: PanelInterface> From<CapacityError> for Error<I> {
    fn from(_: CapacityError) -> Self {
        Self::BatchOverflow
    }
}

impl<I: PanelInterface> core::fmt::Display for Error<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Interface(_) => write!(f, "Interface error"),
            Self::Policy(violation) => write!(f, "Policy violation: {violation}"),
            Self::BatchOverflow => write!(f, "Command batch overflow"),
            Self::NoMode => write!(f, "No current mode set"),
        }
    }
}

impl<I: PanelInterface + core::fmt::Debug> core::error::Error for Error<I> {}

/// Errors that can occur when building configuration
#[derive(Debug, PartialEq, Eq)]
pub enum BuilderError {
    /// Maximum refresh rate must be 60 or 120 Hz
    InvalidMaxRefresh {
        /// Requested maximum in Hz
        hz: u32,
    },
    /// Operating rate must be 60 or 120 Hz and not above the maximum
    InvalidOperatingRate {
        /// Requested operating rate in Hz
        hz: u32,
    },
    /// Early-exit threshold must be non-zero
    ZeroEarlyExitThreshold,
}

impl core::fmt::Display for BuilderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidMaxRefresh { hz } => {
                write!(f, "Invalid maximum refresh rate {hz} Hz (must be 60 or 120)")
            }
            Self::InvalidOperatingRate { hz } => write!(
                f,
                "Invalid operating rate {hz} Hz (must be 60 or 120, not above maximum)"
            ),
            Self::ZeroEarlyExitThreshold => write!(f, "Early-exit threshold must be non-zero"),
        }
    }
}

impl core::error::Error for BuilderError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_violation_display() {
        let violation = PolicyViolation::IdleNotBelowTarget {
            idle_vrefresh: 60,
            target_vrefresh: 60,
        };
        let mut buf = heapless::String::<96>::new();
        core::fmt::write(&mut buf, format_args!("{violation}")).unwrap();
        assert_eq!(
            buf.as_str(),
            "Idle rate 60 Hz must be below active rate 60 Hz"
        );
    }

    #[test]
    fn test_builder_error_display() {
        let mut buf = heapless::String::<96>::new();
        core::fmt::write(
            &mut buf,
            format_args!("{}", BuilderError::InvalidOperatingRate { hz: 90 }),
        )
        .unwrap();
        assert!(buf.starts_with("Invalid operating rate 90 Hz"));
    }
}
