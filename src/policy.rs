//! Idle refresh-rate policy
//!
//! [`compute_idle_vrefresh`] decides the lowest rate the panel may coast at
//! while no new frames arrive. It is pure and total: every input yields
//! either 0 (no idle) or a supported [`IdleTier`] strictly below the mode's
//! rate.
//!
//! ## Example
//!
//! ```
//! use amoled_vrr::policy::{compute_idle_vrefresh, IdlePolicyInput};
//!
//! let input = IdlePolicyInput {
//!     mode_vrefresh: 120,
//!     min_vrefresh: Some(7),
//!     ..IdlePolicyInput::default()
//! };
//! assert_eq!(compute_idle_vrefresh(&input), 10);
//!
//! let hbm = IdlePolicyInput { hbm: true, ..input };
//! assert_eq!(compute_idle_vrefresh(&hbm), 0);
//! ```

use fugit::MicrosDurationU64;

/// Idle rates the automatic frame stepping tables support
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IdleTier {
    /// 10 Hz
    Hz10,
    /// 30 Hz
    Hz30,
    /// 60 Hz
    Hz60,
}

impl IdleTier {
    /// Every tier, ascending
    pub const ALL: [Self; 3] = [Self::Hz10, Self::Hz30, Self::Hz60];

    /// Smallest tier that contains `floor`
    ///
    /// A floor of 7 resolves to 10 Hz, 11..=30 to 30 Hz, 31..=60 to 60 Hz.
    /// Floors above 60 Hz have no tier.
    pub const fn containing(floor: u32) -> Option<Self> {
        match floor {
            0..=10 => Some(Self::Hz10),
            11..=30 => Some(Self::Hz30),
            31..=60 => Some(Self::Hz60),
            _ => None,
        }
    }

    /// Exact tier for `hz`
    pub const fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            10 => Some(Self::Hz10),
            30 => Some(Self::Hz30),
            60 => Some(Self::Hz60),
            _ => None,
        }
    }

    /// Frequency in Hz
    pub const fn hz(self) -> u32 {
        match self {
            Self::Hz10 => 10,
            Self::Hz30 => 30,
            Self::Hz60 => 60,
        }
    }
}

/// Everything the idle policy looks at
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdlePolicyInput {
    /// Nominal rate of the target mode in Hz
    pub mode_vrefresh: u32,
    /// Configured idle floor in Hz; `None` disables idle
    pub min_vrefresh: Option<u32>,
    /// Idle turned off by user or policy control
    pub auto_idle_disabled: bool,
    /// High brightness mode is on
    pub hbm: bool,
    /// A dimming transition is in progress
    pub dimming: bool,
    /// Minimum delay before idle may be entered
    pub min_idle_delay: Option<MicrosDurationU64>,
    /// Time since the panel became idle-eligible
    pub idle_elapsed: MicrosDurationU64,
}

impl Default for IdlePolicyInput {
    fn default() -> Self {
        Self {
            mode_vrefresh: 0,
            min_vrefresh: None,
            auto_idle_disabled: false,
            hbm: false,
            dimming: false,
            min_idle_delay: None,
            idle_elapsed: MicrosDurationU64::from_ticks(0),
        }
    }
}

/// Whether the panel may currently use automatic idle stepping at all
pub fn is_idle_allowed(input: &IdlePolicyInput) -> bool {
    if input.hbm || input.dimming || input.auto_idle_disabled {
        return false;
    }

    match input.min_idle_delay {
        Some(delay) if input.idle_elapsed < delay => false,
        _ => true,
    }
}

/// Minimum legal idle refresh rate, 0 for no idle
pub fn compute_idle_vrefresh(input: &IdlePolicyInput) -> u32 {
    let Some(floor) = input.min_vrefresh else {
        return 0;
    };
    if !is_idle_allowed(input) {
        return 0;
    }

    let Some(tier) = IdleTier::containing(floor) else {
        return 0;
    };

    if tier.hz() >= input.mode_vrefresh {
        log::debug!(
            "min idle vrefresh ({}) higher than target ({})",
            tier.hz(),
            input.mode_vrefresh
        );
        return 0;
    }

    tier.hz()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(mode_vrefresh: u32, floor: u32) -> IdlePolicyInput {
        IdlePolicyInput {
            mode_vrefresh,
            min_vrefresh: Some(floor),
            ..IdlePolicyInput::default()
        }
    }

    #[test]
    fn test_floor_snaps_to_containing_tier() {
        assert_eq!(compute_idle_vrefresh(&input(120, 0)), 10);
        assert_eq!(compute_idle_vrefresh(&input(120, 7)), 10);
        assert_eq!(compute_idle_vrefresh(&input(120, 10)), 10);
        assert_eq!(compute_idle_vrefresh(&input(120, 11)), 30);
        assert_eq!(compute_idle_vrefresh(&input(120, 30)), 30);
        assert_eq!(compute_idle_vrefresh(&input(120, 45)), 60);
        assert_eq!(compute_idle_vrefresh(&input(120, 60)), 60);
    }

    #[test]
    fn test_floor_above_tiers_disables_idle() {
        assert_eq!(compute_idle_vrefresh(&input(120, 61)), 0);
        assert_eq!(compute_idle_vrefresh(&input(120, 120)), 0);
    }

    #[test]
    fn test_tier_not_below_mode_disables_idle() {
        assert_eq!(compute_idle_vrefresh(&input(60, 60)), 0);
        assert_eq!(compute_idle_vrefresh(&input(30, 20)), 0);
        assert_eq!(compute_idle_vrefresh(&input(60, 30)), 30);
        assert_eq!(compute_idle_vrefresh(&input(10, 1)), 0);
    }

    #[test]
    fn test_disabled_floor_returns_zero() {
        let disabled = IdlePolicyInput {
            mode_vrefresh: 120,
            min_vrefresh: None,
            ..IdlePolicyInput::default()
        };
        assert_eq!(compute_idle_vrefresh(&disabled), 0);
    }

    #[test]
    fn test_vetoes_return_zero() {
        let base = input(120, 10);
        assert_eq!(compute_idle_vrefresh(&IdlePolicyInput { hbm: true, ..base }), 0);
        assert_eq!(
            compute_idle_vrefresh(&IdlePolicyInput {
                dimming: true,
                ..base
            }),
            0
        );
        assert_eq!(
            compute_idle_vrefresh(&IdlePolicyInput {
                auto_idle_disabled: true,
                ..base
            }),
            0
        );
    }

    #[test]
    fn test_min_delay_gates_idle() {
        let base = IdlePolicyInput {
            min_idle_delay: Some(MicrosDurationU64::millis(100)),
            idle_elapsed: MicrosDurationU64::millis(99),
            ..input(120, 10)
        };
        assert_eq!(compute_idle_vrefresh(&base), 0);

        let elapsed = IdlePolicyInput {
            idle_elapsed: MicrosDurationU64::millis(100),
            ..base
        };
        assert_eq!(compute_idle_vrefresh(&elapsed), 10);
    }

    #[test]
    fn test_tier_lookup() {
        for tier in IdleTier::ALL {
            assert_eq!(IdleTier::from_hz(tier.hz()), Some(tier));
            assert_eq!(IdleTier::containing(tier.hz()), Some(tier));
        }
        assert_eq!(IdleTier::from_hz(5), None);
    }
}
