//! Transient pixel clock override around self-refresh exit
//!
//! When the pipeline leaves self-refresh while the panel was coasting, or
//! resumes after being inactive, the panel runs at its fastest rate for a
//! frame before settling. [`ClockOverrideGuard::adjust`] asks the pipeline
//! to raise the adjusted mode clock to the fastest rate for that one commit,
//! and to put it back on the commit after.
//!
//! The guard keeps no state of its own: whether an override is in effect is
//! read from the adjusted clock in the pipeline state, which makes repeated
//! calls with unchanged state return `None`.

use crate::mode::{ModeDescriptor, clock_for};

/// The parts of a display pipeline commit state the guard inspects
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CrtcState {
    /// Pipeline is on
    pub active: bool,
    /// Pipeline is in self-refresh
    pub self_refresh_active: bool,
    /// Clock of the requested mode in kHz
    pub mode_clock_khz: u32,
    /// Clock the pipeline will actually run in kHz
    pub adjusted_clock_khz: u32,
    /// Horizontal total in pixels
    pub htotal: u32,
    /// Vertical total in lines
    pub vtotal: u32,
}

impl CrtcState {
    /// Active, non self-refresh state running `mode` unmodified
    pub fn for_mode(mode: &ModeDescriptor) -> Self {
        Self {
            active: true,
            self_refresh_active: false,
            mode_clock_khz: mode.clock_khz,
            adjusted_clock_khz: mode.clock_khz,
            htotal: mode.htotal,
            vtotal: mode.vtotal,
        }
    }

    /// Whether the adjusted clock differs from the mode clock
    pub const fn is_overridden(&self) -> bool {
        self.adjusted_clock_khz != self.mode_clock_khz
    }

    /// Apply an override returned by [`ClockOverrideGuard::adjust`]
    pub fn apply(&mut self, clock_override: ClockOverride) {
        self.adjusted_clock_khz = clock_override.clock_khz();
    }
}

/// Requested change to the adjusted mode clock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockOverride {
    /// Run this commit at the fastest supported clock
    Raise {
        /// Clock in kHz
        clock_khz: u32,
    },
    /// Undo a previous raise
    Restore {
        /// Clock in kHz
        clock_khz: u32,
    },
}

impl ClockOverride {
    /// Clock the adjusted mode should use, in kHz
    pub const fn clock_khz(self) -> u32 {
        match self {
            Self::Raise { clock_khz } | Self::Restore { clock_khz } => clock_khz,
        }
    }
}

/// Pre-commit hook deciding clock overrides
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClockOverrideGuard {
    max_vrefresh: u32,
}

impl ClockOverrideGuard {
    /// Create a guard for a panel whose fastest rate is `max_vrefresh`
    pub const fn new(max_vrefresh: u32) -> Self {
        Self { max_vrefresh }
    }

    /// Decide whether the upcoming commit needs a clock override
    ///
    /// `current_vrefresh` is the current mode's rate and `idle_active` whether
    /// an idle rate is in effect. Nothing is needed when the panel already
    /// runs at its fastest rate or the upcoming commit turns the pipeline off.
    pub fn adjust(
        &self,
        current_vrefresh: u32,
        idle_active: bool,
        old: &CrtcState,
        new: &CrtcState,
    ) -> Option<ClockOverride> {
        if current_vrefresh == self.max_vrefresh || !new.active {
            return None;
        }

        if (idle_active && old.self_refresh_active) || !old.active {
            let clock_khz = clock_for(new.htotal, new.vtotal, self.max_vrefresh);
            if new.adjusted_clock_khz == clock_khz {
                return None;
            }
            log::debug!(
                "raise mode clock to {} kHz on {}",
                clock_khz,
                if old.self_refresh_active {
                    "self refresh exit"
                } else {
                    "resume"
                }
            );
            return Some(ClockOverride::Raise { clock_khz });
        }

        if old.is_overridden() && new.is_overridden() {
            log::debug!(
                "restore mode clock to {} kHz after self refresh exit or resume",
                new.mode_clock_khz
            );
            return Some(ClockOverride::Restore {
                clock_khz: new.mode_clock_khz,
            });
        }

        None
    }
}
