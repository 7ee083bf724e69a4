//! Correlated panel features
//!
//! A [`FeatureSet`] names the hardware features whose legal combinations
//! depend on each other, plus the active and idle refresh rates. The same
//! type describes both the configuration the engine wants ("desired") and
//! the configuration it believes the panel holds ([`HardwareShadow`]);
//! [`FeatureSet::diff`] compares the two.
//!
//! ## Example
//!
//! ```
//! use amoled_vrr::{FeatureSet, HardwareShadow};
//!
//! let desired = FeatureSet::for_rates(120, 10, 120, FeatureSet::default());
//! let shadow = HardwareShadow::new();
//! let diff = desired.diff(shadow.committed());
//! assert!(diff.early_exit && diff.auto_frame_stepping);
//! assert!(!diff.hbm);
//! ```

use crate::error::PolicyViolation;
use crate::mode::RefreshRate;
use crate::policy::IdleTier;

/// Rate the panel runs at out of reset
pub const RESET_VREFRESH: u32 = 60;

/// Correlated feature flags plus active and idle refresh rates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeatureSet {
    /// High brightness mode
    pub hbm: bool,
    /// IRC compensation disabled
    pub irc_off: bool,
    /// Early exit from a long frame
    pub early_exit: bool,
    /// Normal (low) operating speed rather than high speed
    pub operating_speed_low: bool,
    /// Automatic frame stepping rather than a fixed manual rate
    pub auto_frame_stepping: bool,
    /// Steady-state rate while frames are being produced
    pub target_vrefresh: u32,
    /// Lowest rate while no new frames arrive, 0 for no idle
    pub idle_vrefresh: u32,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self {
            hbm: false,
            irc_off: false,
            early_exit: false,
            operating_speed_low: false,
            auto_frame_stepping: false,
            target_vrefresh: RESET_VREFRESH,
            idle_vrefresh: 0,
        }
    }
}

impl FeatureSet {
    /// Derive the rate-dependent flags for a target/idle pair
    ///
    /// `hbm`, `irc_off` and `operating_speed_low` are carried over from
    /// `base`. Automatic stepping is on exactly when an idle rate is set;
    /// early exit is on at `max_vrefresh` and whenever idle is set.
    pub fn for_rates(
        target_vrefresh: u32,
        idle_vrefresh: u32,
        max_vrefresh: u32,
        base: Self,
    ) -> Self {
        Self {
            auto_frame_stepping: idle_vrefresh != 0,
            early_exit: target_vrefresh == max_vrefresh || idle_vrefresh != 0,
            target_vrefresh,
            idle_vrefresh,
            ..base
        }
    }

    /// Check the invariants that tie the flags to the rates
    ///
    /// # Errors
    ///
    /// Returns the first [`PolicyViolation`] found.
    pub fn validate(&self, max_vrefresh: u32) -> Result<(), PolicyViolation> {
        RefreshRate::from_hz(self.target_vrefresh)?;
        if self.target_vrefresh > max_vrefresh {
            return Err(PolicyViolation::UnsupportedRate {
                vrefresh: self.target_vrefresh,
            });
        }
        if self.idle_vrefresh != 0 {
            if IdleTier::from_hz(self.idle_vrefresh).is_none() {
                return Err(PolicyViolation::UnsupportedIdleRate {
                    idle_vrefresh: self.idle_vrefresh,
                });
            }
            if self.idle_vrefresh >= self.target_vrefresh {
                return Err(PolicyViolation::IdleNotBelowTarget {
                    idle_vrefresh: self.idle_vrefresh,
                    target_vrefresh: self.target_vrefresh,
                });
            }
        }
        if self.auto_frame_stepping != (self.idle_vrefresh != 0) {
            return Err(PolicyViolation::AutoSteppingMismatch);
        }
        if (self.target_vrefresh == max_vrefresh || self.idle_vrefresh != 0) && !self.early_exit {
            return Err(PolicyViolation::EarlyExitRequired);
        }
        Ok(())
    }

    /// Feature-wise and rate-wise difference against `other`
    pub fn diff(&self, other: &Self) -> FeatureDiff {
        FeatureDiff {
            hbm: self.hbm != other.hbm,
            irc_off: self.irc_off != other.irc_off,
            early_exit: self.early_exit != other.early_exit,
            operating_speed_low: self.operating_speed_low != other.operating_speed_low,
            auto_frame_stepping: self.auto_frame_stepping != other.auto_frame_stepping,
            target_vrefresh: self.target_vrefresh != other.target_vrefresh,
            idle_vrefresh: self.idle_vrefresh != other.idle_vrefresh,
        }
    }
}

/// Which parts of two [`FeatureSet`]s differ
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct FeatureDiff {
    /// `hbm` differs
    pub hbm: bool,
    /// `irc_off` differs
    pub irc_off: bool,
    /// `early_exit` differs
    pub early_exit: bool,
    /// `operating_speed_low` differs
    pub operating_speed_low: bool,
    /// `auto_frame_stepping` differs
    pub auto_frame_stepping: bool,
    /// `target_vrefresh` differs
    pub target_vrefresh: bool,
    /// `idle_vrefresh` differs
    pub idle_vrefresh: bool,
}

impl FeatureDiff {
    /// Everything marked as changed, used for a full resync
    pub const ALL: Self = Self {
        hbm: true,
        irc_off: true,
        early_exit: true,
        operating_speed_low: true,
        auto_frame_stepping: true,
        target_vrefresh: true,
        idle_vrefresh: true,
    };

    /// Whether any boolean feature differs
    pub const fn any_flag(&self) -> bool {
        self.hbm
            || self.irc_off
            || self.early_exit
            || self.operating_speed_low
            || self.auto_frame_stepping
    }

    /// Whether either rate differs
    pub const fn any_rate(&self) -> bool {
        self.target_vrefresh || self.idle_vrefresh
    }

    /// Whether nothing differs
    pub const fn is_empty(&self) -> bool {
        !self.any_flag() && !self.any_rate()
    }
}

/// Configuration the engine believes is committed to the panel
///
/// Only updated after a command batch has been sent in full; reset to the
/// panel's out-of-reset state whenever the panel is power cycled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HardwareShadow {
    committed: FeatureSet,
}

impl HardwareShadow {
    /// Shadow in the unknown/off state
    pub fn new() -> Self {
        Self::default()
    }

    /// The committed configuration
    pub const fn committed(&self) -> &FeatureSet {
        &self.committed
    }

    /// Forget everything committed, e.g. after the panel lost power
    pub fn reset(&mut self) {
        self.committed = FeatureSet::default();
    }

    pub(crate) fn commit(&mut self, features: FeatureSet) {
        self.committed = features;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_rates_derives_flags() {
        let base = FeatureSet {
            hbm: true,
            ..FeatureSet::default()
        };
        let features = FeatureSet::for_rates(60, 0, 120, base);
        assert!(features.hbm);
        assert!(!features.early_exit);
        assert!(!features.auto_frame_stepping);

        let features = FeatureSet::for_rates(120, 0, 120, base);
        assert!(features.early_exit);
        assert!(!features.auto_frame_stepping);

        let features = FeatureSet::for_rates(60, 30, 120, base);
        assert!(features.early_exit);
        assert!(features.auto_frame_stepping);
    }

    #[test]
    fn test_validate_accepts_derived_sets() {
        for target in [1, 5, 10, 30, 60, 120] {
            for idle in [0, 10, 30, 60] {
                if idle != 0 && idle >= target {
                    continue;
                }
                let features = FeatureSet::for_rates(target, idle, 120, FeatureSet::default());
                assert_eq!(features.validate(120), Ok(()), "{target}/{idle}");
            }
        }
    }

    #[test]
    fn test_validate_rejects_idle_not_below_target() {
        let features = FeatureSet::for_rates(60, 60, 120, FeatureSet::default());
        assert_eq!(
            features.validate(120),
            Err(PolicyViolation::IdleNotBelowTarget {
                idle_vrefresh: 60,
                target_vrefresh: 60
            })
        );
    }

    #[test]
    fn test_validate_rejects_unsupported_idle() {
        let features = FeatureSet::for_rates(120, 5, 120, FeatureSet::default());
        assert_eq!(
            features.validate(120),
            Err(PolicyViolation::UnsupportedIdleRate { idle_vrefresh: 5 })
        );
    }

    #[test]
    fn test_validate_rejects_inconsistent_flags() {
        let mut features = FeatureSet::for_rates(120, 10, 120, FeatureSet::default());
        features.auto_frame_stepping = false;
        assert_eq!(
            features.validate(120),
            Err(PolicyViolation::AutoSteppingMismatch)
        );

        let mut features = FeatureSet::for_rates(120, 0, 120, FeatureSet::default());
        features.early_exit = false;
        assert_eq!(features.validate(120), Err(PolicyViolation::EarlyExitRequired));
    }

    #[test]
    fn test_validate_rejects_rate_above_max() {
        let features = FeatureSet::for_rates(120, 0, 60, FeatureSet::default());
        assert_eq!(
            features.validate(60),
            Err(PolicyViolation::UnsupportedRate { vrefresh: 120 })
        );
    }

    #[test]
    fn test_diff_is_empty_for_equal_sets() {
        let features = FeatureSet::for_rates(120, 10, 120, FeatureSet::default());
        assert!(features.diff(&features).is_empty());
        assert!(!FeatureDiff::ALL.is_empty());
    }

    #[test]
    fn test_diff_separates_flags_and_rates() {
        let a = FeatureSet::default();
        let b = FeatureSet {
            target_vrefresh: 120,
            ..a
        };
        let diff = a.diff(&b);
        assert!(!diff.any_flag());
        assert!(diff.any_rate());
    }

    #[test]
    fn test_shadow_reset_returns_to_out_of_reset_state() {
        let mut shadow = HardwareShadow::new();
        shadow.commit(FeatureSet::for_rates(120, 10, 120, FeatureSet::default()));
        shadow.reset();
        assert_eq!(*shadow.committed(), FeatureSet::default());
        assert_eq!(shadow.committed().target_vrefresh, RESET_VREFRESH);
    }
}
