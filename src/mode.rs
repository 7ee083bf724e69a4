//! Display mode descriptors and supported refresh rates

use crate::error::PolicyViolation;

/// Refresh rates the panel can be driven at
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RefreshRate {
    /// 1 Hz
    Hz1,
    /// 5 Hz
    Hz5,
    /// 10 Hz
    Hz10,
    /// 30 Hz
    Hz30,
    /// 60 Hz
    Hz60,
    /// 120 Hz
    Hz120,
}

impl RefreshRate {
    /// Every supported rate, ascending
    pub const ALL: [Self; 6] = [
        Self::Hz1,
        Self::Hz5,
        Self::Hz10,
        Self::Hz30,
        Self::Hz60,
        Self::Hz120,
    ];

    /// Look up a rate by its frequency in Hz
    ///
    /// # Errors
    ///
    /// Returns [`PolicyViolation::UnsupportedRate`] for any frequency outside
    /// the closed set {1, 5, 10, 30, 60, 120}.
    pub fn from_hz(hz: u32) -> Result<Self, PolicyViolation> {
        match hz {
            1 => Ok(Self::Hz1),
            5 => Ok(Self::Hz5),
            10 => Ok(Self::Hz10),
            30 => Ok(Self::Hz30),
            60 => Ok(Self::Hz60),
            120 => Ok(Self::Hz120),
            _ => Err(PolicyViolation::UnsupportedRate { vrefresh: hz }),
        }
    }

    /// Frequency in Hz
    pub const fn hz(self) -> u32 {
        match self {
            Self::Hz1 => 1,
            Self::Hz5 => 5,
            Self::Hz10 => 10,
            Self::Hz30 => 30,
            Self::Hz60 => 60,
            Self::Hz120 => 120,
        }
    }
}

/// Where a mode allows the panel to drop to its idle rate
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IdleMode {
    /// The mode never coasts at a lower rate
    #[default]
    Unsupported,
    /// The panel steps down by itself once no new frames arrive
    OnInactivity,
    /// Idle is entered only when the pipeline enters self-refresh
    OnSelfRefresh,
}

/// A display mode as seen by the refresh-rate engine
///
/// Only the fields the engine needs are carried: the nominal refresh rate,
/// the totals used to derive pixel clocks, and idle/low-power properties.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ModeDescriptor {
    /// Nominal refresh rate in Hz
    pub vrefresh: u32,
    /// Horizontal total in pixels
    pub htotal: u32,
    /// Vertical total in lines
    pub vtotal: u32,
    /// Nominal pixel clock in kHz
    pub clock_khz: u32,
    /// Idle behaviour of this mode
    pub idle_mode: IdleMode,
    /// Whether this is an always-on low-power mode
    pub low_power: bool,
}

impl ModeDescriptor {
    /// Create a mode with a clock derived from its totals and refresh rate
    pub fn new(vrefresh: u32, htotal: u32, vtotal: u32) -> Self {
        Self {
            vrefresh,
            htotal,
            vtotal,
            clock_khz: clock_for(htotal, vtotal, vrefresh),
            idle_mode: IdleMode::Unsupported,
            low_power: false,
        }
    }

    /// Set the idle behaviour
    pub fn with_idle_mode(mut self, idle_mode: IdleMode) -> Self {
        self.idle_mode = idle_mode;
        self
    }

    /// Mark as an always-on low-power mode
    pub fn with_low_power(mut self, low_power: bool) -> Self {
        self.low_power = low_power;
        self
    }

    /// Pixel clock in kHz this mode's timings need to run at `vrefresh`
    pub fn clock_at(&self, vrefresh: u32) -> u32 {
        clock_for(self.htotal, self.vtotal, vrefresh)
    }
}

pub(crate) fn clock_for(htotal: u32, vtotal: u32, vrefresh: u32) -> u32 {
    let clock = u64::from(htotal) * u64::from(vtotal) * u64::from(vrefresh) / 1000;
    u32::try_from(clock).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_hz_roundtrips_supported_rates() {
        for rate in RefreshRate::ALL {
            assert_eq!(RefreshRate::from_hz(rate.hz()), Ok(rate));
        }
    }

    #[test]
    fn test_from_hz_rejects_unsupported() {
        assert_eq!(
            RefreshRate::from_hz(90),
            Err(PolicyViolation::UnsupportedRate { vrefresh: 90 })
        );
        assert!(RefreshRate::from_hz(0).is_err());
    }

    #[test]
    fn test_mode_clock_from_totals() {
        // 1344x2992 WQHD timings
        let mode = ModeDescriptor::new(120, 1380, 3248);
        assert_eq!(mode.clock_khz, 537_868);
        assert_eq!(mode.clock_at(60), 268_934);
    }

    #[test]
    fn test_mode_builder_helpers() {
        let mode = ModeDescriptor::new(60, 100, 100)
            .with_idle_mode(IdleMode::OnSelfRefresh)
            .with_low_power(true);
        assert_eq!(mode.idle_mode, IdleMode::OnSelfRefresh);
        assert!(mode.low_power);
    }
}
