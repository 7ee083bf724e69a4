//! Engine configuration types and builder

use fugit::MicrosDurationU64;

pub use crate::error::BuilderError;
use crate::reconcile::Te2Timing;

/// Default early-exit threshold for a panel whose fastest rate is
/// `max_vrefresh`: two frame periods, rounded up to whole milliseconds
///
/// 17 ms at 120 Hz, 34 ms at 60 Hz.
pub const fn early_exit_threshold_for(max_vrefresh: u32) -> MicrosDurationU64 {
    let max = if max_vrefresh == 0 { 1 } else { max_vrefresh };
    MicrosDurationU64::millis(2_000_u64.div_ceil(max as u64))
}

/// Default sleep when a vblank cannot be waited on: one 120 Hz frame
pub const DEFAULT_VBLANK_FALLBACK: MicrosDurationU64 = MicrosDurationU64::from_ticks(8_350);

/// What to do when a commit arrives after the panel may have started
/// stepping down on its own
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EarlyExitPolicy {
    /// Switch to manual mode so idle entry stays under explicit control
    DisableAutoStepping,
    /// Send a bare frequency update to force one full-rate frame
    Resync,
    /// Only record the commit
    Passive,
}

impl EarlyExitPolicy {
    /// Policy implied by the idle delay and TE settings
    pub const fn derive(min_idle_delay_set: bool, force_changeable_te: bool) -> Self {
        if min_idle_delay_set {
            Self::DisableAutoStepping
        } else if force_changeable_te {
            Self::Resync
        } else {
            Self::Passive
        }
    }
}

/// Engine configuration
///
/// This struct holds every tunable of the refresh-rate engine.
/// Use `Builder` to create a Config.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Fastest refresh rate the panel supports in Hz (60 or 120)
    pub max_vrefresh: u32,
    /// Initial operating rate in Hz (60 or 120)
    pub op_hz: u32,
    /// Idle floor in Hz; `None` disables idle
    pub min_vrefresh: Option<u32>,
    /// Minimum time without new frames before idle may be entered
    pub min_idle_delay: Option<MicrosDurationU64>,
    /// Whether automatic idle is enabled
    pub auto_idle: bool,
    /// Keep TE changeable even with early exit on
    pub force_changeable_te: bool,
    /// TE2 edge timing
    pub te2: Te2Timing,
    /// Commit gap after which the panel may already be stepping down
    pub early_exit_threshold: MicrosDurationU64,
    /// Sleep used when a vblank wait is not possible
    pub vblank_fallback: MicrosDurationU64,
    /// Early-exit policy; derived from the other settings when `None`
    pub early_exit_policy: Option<EarlyExitPolicy>,
}

impl Config {
    /// Early-exit policy in effect for the given idle delay
    pub const fn effective_early_exit_policy(
        &self,
        min_idle_delay: Option<MicrosDurationU64>,
    ) -> EarlyExitPolicy {
        match self.early_exit_policy {
            Some(policy) => policy,
            None => EarlyExitPolicy::derive(min_idle_delay.is_some(), self.force_changeable_te),
        }
    }
}

/// Builder for constructing engine configuration
///
/// # Example
///
/// ```
/// use amoled_vrr::{Builder, EarlyExitPolicy};
/// use fugit::MicrosDurationU64;
///
/// let config = match Builder::new()
///     .max_vrefresh(120)
///     .min_vrefresh(Some(10))
///     .min_idle_delay(Some(MicrosDurationU64::millis(100)))
///     .build()
/// {
///     Ok(config) => config,
///     Err(_) => return,
/// };
/// assert_eq!(
///     config.effective_early_exit_policy(config.min_idle_delay),
///     EarlyExitPolicy::DisableAutoStepping
/// );
/// ```
#[must_use]
pub struct Builder {
    /// Fastest refresh rate in Hz
    max_vrefresh: u32,
    /// Initial operating rate in Hz
    op_hz: u32,
    /// Idle floor in Hz
    min_vrefresh: Option<u32>,
    /// Minimum idle-entry delay
    min_idle_delay: Option<MicrosDurationU64>,
    /// Automatic idle enabled
    auto_idle: bool,
    /// Keep TE changeable with early exit on
    force_changeable_te: bool,
    /// TE2 edge timing
    te2: Te2Timing,
    /// Early-exit threshold; derived from the maximum rate when `None`
    early_exit_threshold: Option<MicrosDurationU64>,
    /// Vblank fallback sleep
    vblank_fallback: MicrosDurationU64,
    /// Explicit early-exit policy
    early_exit_policy: Option<EarlyExitPolicy>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            max_vrefresh: 120,
            op_hz: 120,
            // Lowest tier
            min_vrefresh: Some(0),
            min_idle_delay: None,
            auto_idle: true,
            force_changeable_te: false,
            te2: Te2Timing::default(),
            early_exit_threshold: None,
            vblank_fallback: DEFAULT_VBLANK_FALLBACK,
            early_exit_policy: None,
        }
    }
}

impl Builder {
    /// Create a new Builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the fastest refresh rate (60 or 120 Hz)
    pub fn max_vrefresh(mut self, hz: u32) -> Self {
        self.max_vrefresh = hz;
        self
    }

    /// Set the initial operating rate (60 or 120 Hz)
    pub fn op_hz(mut self, hz: u32) -> Self {
        self.op_hz = hz;
        self
    }

    /// Set the idle floor, `None` to disable idle
    pub fn min_vrefresh(mut self, hz: Option<u32>) -> Self {
        self.min_vrefresh = hz;
        self
    }

    /// Set the minimum time without new frames before idle
    pub fn min_idle_delay(mut self, delay: Option<MicrosDurationU64>) -> Self {
        self.min_idle_delay = delay;
        self
    }

    /// Enable or disable automatic idle
    pub fn auto_idle(mut self, enabled: bool) -> Self {
        self.auto_idle = enabled;
        self
    }

    /// Keep TE changeable even with early exit on
    pub fn force_changeable_te(mut self, force: bool) -> Self {
        self.force_changeable_te = force;
        self
    }

    /// Set TE2 edge timing
    pub fn te2_timing(mut self, te2: Te2Timing) -> Self {
        self.te2 = te2;
        self
    }

    /// Set the early-exit threshold
    ///
    /// Defaults to two frame periods at the fastest rate.
    pub fn early_exit_threshold(mut self, threshold: MicrosDurationU64) -> Self {
        self.early_exit_threshold = Some(threshold);
        self
    }

    /// Set the sleep used when a vblank cannot be waited on
    pub fn vblank_fallback(mut self, sleep: MicrosDurationU64) -> Self {
        self.vblank_fallback = sleep;
        self
    }

    /// Choose the early-exit policy explicitly
    pub fn early_exit_policy(mut self, policy: EarlyExitPolicy) -> Self {
        self.early_exit_policy = Some(policy);
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns `BuilderError::InvalidMaxRefresh` if the maximum is not 60 or
    /// 120 Hz, `BuilderError::InvalidOperatingRate` if the operating rate is
    /// not 60 or 120 Hz or exceeds the maximum, and
    /// `BuilderError::ZeroEarlyExitThreshold` for a zero threshold.
    pub fn build(self) -> Result<Config, BuilderError> {
        if !matches!(self.max_vrefresh, 60 | 120) {
            return Err(BuilderError::InvalidMaxRefresh {
                hz: self.max_vrefresh,
            });
        }
        if !matches!(self.op_hz, 60 | 120) || self.op_hz > self.max_vrefresh {
            return Err(BuilderError::InvalidOperatingRate { hz: self.op_hz });
        }
        let early_exit_threshold = self
            .early_exit_threshold
            .unwrap_or_else(|| early_exit_threshold_for(self.max_vrefresh));
        if early_exit_threshold.ticks() == 0 {
            return Err(BuilderError::ZeroEarlyExitThreshold);
        }

        Ok(Config {
            max_vrefresh: self.max_vrefresh,
            op_hz: self.op_hz,
            min_vrefresh: self.min_vrefresh,
            min_idle_delay: self.min_idle_delay,
            auto_idle: self.auto_idle,
            force_changeable_te: self.force_changeable_te,
            te2: self.te2,
            early_exit_threshold,
            vblank_fallback: self.vblank_fallback,
            early_exit_policy: self.early_exit_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Builder::new().build().unwrap();
        assert_eq!(config.max_vrefresh, 120);
        assert_eq!(config.op_hz, 120);
        assert_eq!(config.min_vrefresh, Some(0));
        assert_eq!(config.early_exit_threshold, MicrosDurationU64::millis(17));
        assert_eq!(config.vblank_fallback, MicrosDurationU64::micros(8350));
        assert_eq!(config.te2, Te2Timing::default());
    }

    #[test]
    fn test_threshold_follows_max_refresh() {
        let config = Builder::new().max_vrefresh(60).op_hz(60).build().unwrap();
        assert_eq!(config.early_exit_threshold, MicrosDurationU64::millis(34));
        assert_eq!(early_exit_threshold_for(120), MicrosDurationU64::millis(17));

        let config = Builder::new()
            .max_vrefresh(60)
            .op_hz(60)
            .early_exit_threshold(MicrosDurationU64::millis(50))
            .build()
            .unwrap();
        assert_eq!(config.early_exit_threshold, MicrosDurationU64::millis(50));
    }

    #[test]
    fn test_invalid_max_refresh() {
        assert_eq!(
            Builder::new().max_vrefresh(90).build().err(),
            Some(BuilderError::InvalidMaxRefresh { hz: 90 })
        );
    }

    #[test]
    fn test_op_rate_above_max_rejected() {
        assert_eq!(
            Builder::new().max_vrefresh(60).build().err(),
            Some(BuilderError::InvalidOperatingRate { hz: 120 })
        );
        assert!(Builder::new().max_vrefresh(60).op_hz(60).build().is_ok());
        assert_eq!(
            Builder::new().op_hz(30).build().err(),
            Some(BuilderError::InvalidOperatingRate { hz: 30 })
        );
    }

    #[test]
    fn test_zero_threshold_rejected() {
        assert_eq!(
            Builder::new()
                .early_exit_threshold(MicrosDurationU64::from_ticks(0))
                .build()
                .err(),
            Some(BuilderError::ZeroEarlyExitThreshold)
        );
    }

    #[test]
    fn test_policy_derivation() {
        assert_eq!(
            EarlyExitPolicy::derive(true, true),
            EarlyExitPolicy::DisableAutoStepping
        );
        assert_eq!(EarlyExitPolicy::derive(false, true), EarlyExitPolicy::Resync);
        assert_eq!(EarlyExitPolicy::derive(false, false), EarlyExitPolicy::Passive);
    }

    #[test]
    fn test_explicit_policy_wins() {
        let config = Builder::new()
            .force_changeable_te(true)
            .early_exit_policy(EarlyExitPolicy::Passive)
            .build()
            .unwrap();
        assert_eq!(
            config.effective_early_exit_policy(Some(MicrosDurationU64::millis(100))),
            EarlyExitPolicy::Passive
        );
    }
}
