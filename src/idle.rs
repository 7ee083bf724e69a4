//! Idle state tracking
//!
//! [`IdleState`] records whether the panel is currently coasting at an idle
//! rate; [`IdleContext`] holds the timestamps and user policy the idle
//! decision depends on.

use fugit::MicrosDurationU64;

use crate::feature::FeatureSet;
use crate::interface::Timestamp;

/// Whether the panel is running at its active rate or coasting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdleState {
    /// Frames are being produced at the active rate
    Active {
        /// Active rate in Hz
        vrefresh: u32,
    },
    /// The panel may step down to `idle_vrefresh` without new frames
    Idle {
        /// Active rate in Hz
        vrefresh: u32,
        /// Idle rate in Hz
        idle_vrefresh: u32,
    },
}

impl IdleState {
    /// State for an active/idle rate pair, `idle_vrefresh` 0 meaning active
    pub const fn new(vrefresh: u32, idle_vrefresh: u32) -> Self {
        if idle_vrefresh == 0 {
            Self::Active { vrefresh }
        } else {
            Self::Idle {
                vrefresh,
                idle_vrefresh,
            }
        }
    }

    /// State described by `features`
    pub const fn from_features(features: &FeatureSet) -> Self {
        Self::new(features.target_vrefresh, features.idle_vrefresh)
    }

    /// Active rate in Hz
    pub const fn vrefresh(&self) -> u32 {
        match *self {
            Self::Active { vrefresh } | Self::Idle { vrefresh, .. } => vrefresh,
        }
    }

    /// Idle rate in Hz, 0 when active
    pub const fn idle_vrefresh(&self) -> u32 {
        match *self {
            Self::Active { .. } => 0,
            Self::Idle { idle_vrefresh, .. } => idle_vrefresh,
        }
    }

    /// Whether the panel may be coasting
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle { .. })
    }
}

/// Timestamps and idle policy for one panel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdleContext {
    last_commit: Option<Timestamp>,
    last_mode_set: Option<Timestamp>,
    min_idle_delay: Option<MicrosDurationU64>,
    auto_idle_enabled: bool,
}

impl IdleContext {
    /// Create a context with no history
    pub const fn new(min_idle_delay: Option<MicrosDurationU64>, auto_idle_enabled: bool) -> Self {
        Self {
            last_commit: None,
            last_mode_set: None,
            min_idle_delay,
            auto_idle_enabled,
        }
    }

    /// Record a frame commit at `now`
    ///
    /// Returns the time since the previous commit, or since the last mode
    /// set if there was no commit yet. `None` when neither happened or the
    /// clock went backwards.
    pub fn record_commit(&mut self, now: Timestamp) -> Option<MicrosDurationU64> {
        let reference = self.last_commit.or(self.last_mode_set);
        self.last_commit = Some(now);
        reference.and_then(|then| now.checked_duration_since(then))
    }

    /// Record an explicit mode set, or anything that forces the active rate
    pub fn record_mode_set(&mut self, now: Timestamp) {
        self.last_mode_set = Some(now);
    }

    /// Time since the panel became idle-eligible
    ///
    /// Measured from the later of the last commit and the last mode set.
    pub fn idle_elapsed(&self, now: Timestamp) -> MicrosDurationU64 {
        let since = match (self.last_commit, self.last_mode_set) {
            (Some(commit), Some(mode_set)) => Some(commit.max(mode_set)),
            (commit, mode_set) => commit.or(mode_set),
        };
        match since {
            Some(then) => now
                .checked_duration_since(then)
                .unwrap_or(MicrosDurationU64::from_ticks(0)),
            None => now.duration_since_epoch(),
        }
    }

    /// Last commit timestamp
    pub const fn last_commit(&self) -> Option<Timestamp> {
        self.last_commit
    }

    /// Last mode set timestamp
    pub const fn last_mode_set(&self) -> Option<Timestamp> {
        self.last_mode_set
    }

    /// Minimum delay before idle may be entered
    pub const fn min_idle_delay(&self) -> Option<MicrosDurationU64> {
        self.min_idle_delay
    }

    /// Change the minimum idle-entry delay
    pub fn set_min_idle_delay(&mut self, delay: Option<MicrosDurationU64>) {
        self.min_idle_delay = delay;
    }

    /// Whether automatic idle is enabled
    pub const fn auto_idle_enabled(&self) -> bool {
        self.auto_idle_enabled
    }

    /// Enable or disable automatic idle
    pub fn set_auto_idle_enabled(&mut self, enabled: bool) {
        self.auto_idle_enabled = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at_ms(ms: u64) -> Timestamp {
        Timestamp::from_ticks(ms * 1000)
    }

    #[test]
    fn test_state_from_rates() {
        assert_eq!(IdleState::new(120, 0), IdleState::Active { vrefresh: 120 });
        let idle = IdleState::new(120, 10);
        assert!(idle.is_idle());
        assert_eq!(idle.vrefresh(), 120);
        assert_eq!(idle.idle_vrefresh(), 10);
    }

    #[test]
    fn test_state_from_features() {
        let features = FeatureSet::for_rates(60, 30, 120, FeatureSet::default());
        assert_eq!(
            IdleState::from_features(&features),
            IdleState::Idle {
                vrefresh: 60,
                idle_vrefresh: 30
            }
        );
    }

    #[test]
    fn test_first_commit_measures_from_mode_set() {
        let mut ctx = IdleContext::new(None, true);
        assert_eq!(ctx.record_commit(at_ms(5)), None);

        let mut ctx = IdleContext::new(None, true);
        ctx.record_mode_set(at_ms(10));
        assert_eq!(
            ctx.record_commit(at_ms(30)),
            Some(MicrosDurationU64::millis(20))
        );
        assert_eq!(
            ctx.record_commit(at_ms(35)),
            Some(MicrosDurationU64::millis(5))
        );
    }

    #[test]
    fn test_idle_elapsed_uses_latest_event() {
        let mut ctx = IdleContext::new(None, true);
        ctx.record_commit(at_ms(10));
        ctx.record_mode_set(at_ms(40));
        assert_eq!(ctx.idle_elapsed(at_ms(50)), MicrosDurationU64::millis(10));

        ctx.record_commit(at_ms(45));
        assert_eq!(ctx.idle_elapsed(at_ms(50)), MicrosDurationU64::millis(5));
    }

    #[test]
    fn test_idle_elapsed_without_history_counts_from_boot() {
        let ctx = IdleContext::new(None, true);
        assert_eq!(ctx.idle_elapsed(at_ms(250)), MicrosDurationU64::millis(250));
    }

    #[test]
    fn test_clock_going_backwards_is_zero() {
        let mut ctx = IdleContext::new(None, true);
        ctx.record_commit(at_ms(100));
        assert_eq!(ctx.idle_elapsed(at_ms(50)), MicrosDurationU64::from_ticks(0));
        assert_eq!(ctx.record_commit(at_ms(50)), None);
    }
}
