//! Incremental feature reconciliation
//!
//! [`FeatureReconciler`] compares a desired [`FeatureSet`] against the
//! [`HardwareShadow`] and builds the smallest ordered [`CommandBatch`] that
//! moves the panel from one to the other. Commands are emitted in a fixed
//! order because later settings override earlier ones on the panel:
//!
//! 1. TE width (depends on operating speed)
//! 2. Early exit enable/disable
//! 3. TE2 edge timing
//! 4. IRC compensation
//! 5. Operating speed switch
//! 6. Early exit + HBM frame insertion block
//! 7. Frequency stepping (automatic tables or manual rate index)
//! 8. [`FREQ_UPDATE`] marker
//!
//! Vendor registers are only writable while unlocked, so
//! [`FeatureReconciler::reconcile`] sends the batch between
//! [`UNLOCK_CMD_F0`] and [`LOCK_CMD_F0`]. The shadow is committed only once
//! every command went out.
//!
//! ## Example
//!
//! ```
//! use amoled_vrr::{FeatureReconciler, FeatureSet, HardwareShadow};
//!
//! let reconciler = FeatureReconciler::new(120);
//! let shadow = HardwareShadow::new();
//! let desired = FeatureSet::for_rates(120, 10, 120, FeatureSet::default());
//!
//! let batch = match reconciler.plan(&desired, &shadow, false) {
//!     Ok(batch) => batch,
//!     Err(_) => return,
//! };
//! assert!(batch.ends_with_update());
//!
//! // Nothing differs from itself
//! let same = match reconciler.plan(shadow.committed(), &shadow, false) {
//!     Ok(batch) => batch,
//!     Err(_) => return,
//! };
//! assert!(same.is_empty());
//! ```

use crate::command::{
    CapacityError, CommandBatch, FRAME_CTRL, FREQ_SELECT, FREQ_UPDATE, GLOBAL_PARAM, IRC_CTRL,
    LOCK_CMD_F0, OP_MODE_CTRL, TE_CHANGEABLE, TE_CTRL, TE_FIXED, UNLOCK_CMD_F0,
};
use crate::error::{Error, PolicyViolation};
use crate::feature::{FeatureDiff, FeatureSet, HardwareShadow};
use crate::interface::PanelInterface;
use crate::mode::RefreshRate;
use crate::policy::IdleTier;

/// Operating speed, the first key of every vendor table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpeedMode {
    /// Normal speed, 60 Hz operating rate
    Normal,
    /// High speed, 120 Hz operating rate
    High,
}

impl SpeedMode {
    /// Both speeds
    pub const ALL: [Self; 2] = [Self::Normal, Self::High];

    /// Speed selected by `features`
    pub const fn of(features: &FeatureSet) -> Self {
        if features.operating_speed_low {
            Self::Normal
        } else {
            Self::High
        }
    }

    /// Operating rate in Hz
    pub const fn op_hz(self) -> u32 {
        match self {
            Self::Normal => 60,
            Self::High => 120,
        }
    }
}

/// How the secondary TE signal is generated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Te2Option {
    /// Fixed TE2 at the operating rate
    Fixed,
    /// TE2 follows the current frame rate
    Changeable,
}

impl Te2Option {
    /// Option required for `features`
    ///
    /// Fixed while in low-power mode, or with early exit on and an idle rate
    /// below 30 Hz. No idle (0 Hz) counts as below 30 Hz.
    pub fn select(features: &FeatureSet, low_power: bool) -> Self {
        if low_power || (features.early_exit && features.idle_vrefresh < 30) {
            Self::Fixed
        } else {
            Self::Changeable
        }
    }

    const fn register_value(self) -> u8 {
        match self {
            Self::Fixed => TE_FIXED,
            Self::Changeable => TE_CHANGEABLE,
        }
    }
}

/// TE2 rising and falling edge positions, in lines
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Te2Timing {
    /// Rising edge
    pub rising: u16,
    /// Falling edge
    pub falling: u16,
    /// Falling edge for changeable TE2 at normal speed
    pub falling_ns: u16,
}

impl Default for Te2Timing {
    fn default() -> Self {
        Self {
            rising: 0x10,
            falling: 0x30,
            falling_ns: 0x25,
        }
    }
}

/// Planning failed before any command was sent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanError {
    /// The desired set is illegal
    Policy(PolicyViolation),
    /// The plan did not fit in a [`CommandBatch`]
    Capacity,
}

impl From<PolicyViolation> for PlanError {
    fn from(violation: PolicyViolation) -> Self {
        Self::Policy(violation)
    }
}

impl From<CapacityError> for PlanError {
    fn from(_: CapacityError) -> Self {
        Self::Capacity
    }
}

impl<I: PanelInterface> From<PlanError> for Error<I> {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::Policy(violation) => Self::Policy(violation),
            PlanError::Capacity => Self::BatchOverflow,
        }
    }
}

impl core::fmt::Display for PlanError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Policy(violation) => write!(f, "{violation}"),
            Self::Capacity => write!(f, "{}", CapacityError),
        }
    }
}

impl core::error::Error for PlanError {}

/// Builds and sends incremental feature updates
#[derive(Clone, Copy, Debug)]
pub struct FeatureReconciler {
    max_vrefresh: u32,
    force_changeable_te: bool,
    te2: Te2Timing,
    low_power: bool,
}

impl FeatureReconciler {
    /// Create a reconciler for a panel whose fastest rate is `max_vrefresh`
    pub fn new(max_vrefresh: u32) -> Self {
        Self {
            max_vrefresh,
            force_changeable_te: false,
            te2: Te2Timing::default(),
            low_power: false,
        }
    }

    /// Keep TE changeable even with early exit on
    #[must_use]
    pub fn with_force_changeable_te(mut self, force: bool) -> Self {
        self.force_changeable_te = force;
        self
    }

    /// Use custom TE2 edge timing
    #[must_use]
    pub fn with_te2_timing(mut self, te2: Te2Timing) -> Self {
        self.te2 = te2;
        self
    }

    /// Track whether the panel is in an always-on low-power mode
    pub fn set_low_power(&mut self, low_power: bool) {
        self.low_power = low_power;
    }

    /// Whether the panel is in an always-on low-power mode
    pub const fn low_power(&self) -> bool {
        self.low_power
    }

    /// Build the command batch that takes `shadow` to `desired`
    ///
    /// Returns an empty batch when nothing differs and `force` is false.
    /// With `force`, every step is emitted.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Policy`] if `desired` breaks a feature invariant
    /// or names a rate the selected speed cannot run.
    pub fn plan(
        &self,
        desired: &FeatureSet,
        shadow: &HardwareShadow,
        force: bool,
    ) -> Result<CommandBatch, PlanError> {
        desired.validate(self.max_vrefresh)?;

        let committed = shadow.committed();
        let diff = if force {
            FeatureDiff::ALL
        } else {
            desired.diff(committed)
        };

        let mut batch = CommandBatch::new();
        if diff.is_empty() {
            return Ok(batch);
        }

        let speed = SpeedMode::of(desired);

        if diff.operating_speed_low {
            push_te_width(&mut batch, speed)?;
        }
        if diff.early_exit || diff.operating_speed_low {
            self.push_early_exit(&mut batch, desired, speed)?;
        }
        let te2_changed = Te2Option::select(desired, self.low_power)
            != Te2Option::select(committed, self.low_power);
        if diff.operating_speed_low || diff.early_exit || te2_changed {
            self.push_te2(&mut batch, desired, speed)?;
        }
        if diff.irc_off {
            push_irc(&mut batch, desired)?;
        }
        if diff.operating_speed_low {
            push_op_mode(&mut batch, speed)?;
        }
        if diff.early_exit || diff.hbm || diff.operating_speed_low {
            push_frame_insertion(&mut batch, desired, speed)?;
        }
        if diff.auto_frame_stepping
            || diff.operating_speed_low
            || diff.hbm
            || diff.target_vrefresh
            || diff.idle_vrefresh
        {
            push_frequency(&mut batch, desired, speed)?;
        }
        batch.push(&FREQ_UPDATE)?;

        Ok(batch)
    }

    /// TE2 timing block on its own, followed by the update marker
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::Capacity`] if the block does not fit.
    pub fn te2_batch(&self, features: &FeatureSet) -> Result<CommandBatch, PlanError> {
        let mut batch = CommandBatch::new();
        self.push_te2(&mut batch, features, SpeedMode::of(features))?;
        batch.push(&FREQ_UPDATE)?;
        Ok(batch)
    }

    /// Plan, send and commit
    ///
    /// Nothing is sent when the plan is empty. On an interface error the
    /// shadow keeps its previous value so the same commands are retried on
    /// the next reconcile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Policy`] or [`Error::BatchOverflow`] before any
    /// traffic, or [`Error::Interface`] if a send fails.
    pub fn reconcile<I: PanelInterface>(
        &self,
        desired: &FeatureSet,
        shadow: &mut HardwareShadow,
        force: bool,
        interface: &mut I,
    ) -> Result<CommandBatch, Error<I>> {
        let batch = self.plan(desired, shadow, force)?;
        if batch.is_empty() {
            return Ok(batch);
        }

        transmit(interface, &batch).map_err(Error::Interface)?;
        shadow.commit(*desired);

        log::debug!(
            "op={} ee={} hbm={} irc={} fi={} fps={} idle_fps={}",
            if desired.operating_speed_low { "ns" } else { "hs" },
            on_off(desired.early_exit),
            on_off(desired.hbm),
            on_off(!desired.irc_off),
            if desired.auto_frame_stepping { "auto" } else { "manual" },
            desired.target_vrefresh,
            desired.idle_vrefresh
        );

        Ok(batch)
    }

    fn push_early_exit(
        &self,
        batch: &mut CommandBatch,
        features: &FeatureSet,
        speed: SpeedMode,
    ) -> Result<(), CapacityError> {
        if features.early_exit && !self.force_changeable_te {
            batch.push(&[TE_CTRL, TE_FIXED])?;
            batch.push(&[GLOBAL_PARAM, 0x00, 0x02, TE_CTRL])?;
            let ns = match speed {
                SpeedMode::Normal => 0x01,
                SpeedMode::High => 0x00,
            };
            batch.push(&[TE_CTRL, ns])
        } else {
            batch.push(&[TE_CTRL, TE_CHANGEABLE])
        }
    }

    fn push_te2(
        &self,
        batch: &mut CommandBatch,
        features: &FeatureSet,
        speed: SpeedMode,
    ) -> Result<(), CapacityError> {
        let option = Te2Option::select(features, self.low_power);

        batch.push(&[GLOBAL_PARAM, 0x00, 0x42, OP_MODE_CTRL])?;
        batch.push(&[OP_MODE_CTRL, 0x0D])?;
        batch.push(&[GLOBAL_PARAM, 0x00, 0x01, TE_CTRL])?;
        batch.push(&[TE_CTRL, option.register_value()])?;

        match option {
            Te2Option::Fixed => {
                batch.push(&[GLOBAL_PARAM, 0x00, 0x22, TE_CTRL])?;
                let [r0, r1, f0, f1] = edges(self.te2.rising, self.te2.falling);
                batch.push(&[TE_CTRL, r0, r1, f0, f1, r0, r1, f0, f1])
            }
            Te2Option::Changeable => {
                batch.push(&[GLOBAL_PARAM, 0x00, 0x1E, TE_CTRL])?;
                let falling = match speed {
                    SpeedMode::Normal => self.te2.falling_ns,
                    SpeedMode::High => self.te2.falling,
                };
                let [r0, r1, f0, f1] = edges(self.te2.rising, falling);
                batch.push(&[TE_CTRL, r0, r1, f0, f1])
            }
        }
    }
}

/// Send `batch` between the vendor unlock and lock commands
///
/// # Errors
///
/// Returns the first interface error; later commands are not sent.
pub fn transmit<I: PanelInterface>(interface: &mut I, batch: &CommandBatch) -> Result<(), I::Error> {
    interface.send(&UNLOCK_CMD_F0)?;
    for command in batch.iter() {
        interface.send(command)?;
    }
    interface.send(&LOCK_CMD_F0)
}

const fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn edges(rising: u16, falling: u16) -> [u8; 4] {
    let [r_hi, r_lo] = rising.to_be_bytes();
    let [f_hi, f_lo] = falling.to_be_bytes();
    [r_hi & 0x0F, r_lo, f_hi & 0x0F, f_lo]
}

fn push_te_width(batch: &mut CommandBatch, speed: SpeedMode) -> Result<(), CapacityError> {
    let unit: [u8; 4] = match speed {
        SpeedMode::Normal => [0x0B, 0xC9, 0x0B, 0xE8],
        SpeedMode::High => [0x0B, 0xE0, 0x00, 0x2F],
    };
    let mut command = [TE_CTRL; 13];
    for chunk in command[1..].chunks_exact_mut(4) {
        chunk.copy_from_slice(&unit);
    }
    batch.push(&[GLOBAL_PARAM, 0x00, 0x04, TE_CTRL])?;
    batch.push(&command)
}

fn push_irc(batch: &mut CommandBatch, features: &FeatureSet) -> Result<(), CapacityError> {
    batch.push(&[GLOBAL_PARAM, 0x01, 0x9B, IRC_CTRL])?;
    batch.push(&[IRC_CTRL, if features.irc_off { 0x07 } else { 0x27 }])
}

fn push_op_mode(batch: &mut CommandBatch, speed: SpeedMode) -> Result<(), CapacityError> {
    batch.push(&[OP_MODE_CTRL, 0x01])?;
    let select = match speed {
        SpeedMode::Normal => 0x18,
        SpeedMode::High => 0x00,
    };
    batch.push(&[FREQ_SELECT, select])
}

/// Frame insertion header bytes keyed by (early exit, hbm)
const fn frame_insertion_header(early_exit: bool, hbm: bool) -> (u8, u8) {
    match (early_exit, hbm) {
        (true, true) => (0x00, 0x01),
        (true, false) => (0x01, 0x03),
        (false, true) => (0x80, 0x01),
        (false, false) => (0x81, 0x03),
    }
}

/// Frame insertion cycle table keyed by (speed, hbm)
const fn frame_insertion_cycles(speed: SpeedMode, hbm: bool) -> [u8; 12] {
    match (speed, hbm) {
        (SpeedMode::Normal, true) => [
            0x00, 0x00, 0x00, 0x02, 0x00, 0x04, 0x00, 0x0A, 0x00, 0x16, 0x00, 0x76,
        ],
        (SpeedMode::High, true) => [
            0x00, 0x00, 0x00, 0x01, 0x00, 0x03, 0x00, 0x0B, 0x00, 0x17, 0x00, 0x77,
        ],
        (SpeedMode::Normal, false) => [
            0x00, 0x00, 0x00, 0x04, 0x00, 0x08, 0x00, 0x14, 0x00, 0x2C, 0x00, 0xEC,
        ],
        (SpeedMode::High, false) => [
            0x00, 0x00, 0x00, 0x02, 0x00, 0x06, 0x00, 0x16, 0x00, 0x2E, 0x00, 0xEE,
        ],
    }
}

fn push_frame_insertion(
    batch: &mut CommandBatch,
    features: &FeatureSet,
    speed: SpeedMode,
) -> Result<(), CapacityError> {
    let (mode, cycle) = frame_insertion_header(features.early_exit, features.hbm);
    batch.push(&[FRAME_CTRL, 0x21, mode, 0x83, 0x03, cycle])?;

    let ee = if features.early_exit { 0x22 } else { 0x00 };
    batch.push(&[GLOBAL_PARAM, 0x00, 0x10, FRAME_CTRL])?;
    batch.push(&[FRAME_CTRL, ee])?;
    batch.push(&[GLOBAL_PARAM, 0x00, 0x82, FRAME_CTRL])?;
    batch.push(&[FRAME_CTRL, ee, ee, ee, ee])?;

    let offset = match speed {
        SpeedMode::Normal => 0x4E,
        SpeedMode::High => 0x1E,
    };
    batch.push(&[GLOBAL_PARAM, 0x00, offset, FRAME_CTRL])?;

    let mut command = [FRAME_CTRL; 13];
    command[1..].copy_from_slice(&frame_insertion_cycles(speed, features.hbm));
    batch.push(&command)
}

/// Idle step divider keyed by (speed, tier, hbm)
const fn idle_divider(speed: SpeedMode, tier: IdleTier, hbm: bool) -> u8 {
    match (speed, tier, hbm) {
        (SpeedMode::Normal, IdleTier::Hz10, true) => 0x0A,
        (SpeedMode::Normal, IdleTier::Hz10, false) => 0x14,
        (SpeedMode::Normal, IdleTier::Hz30 | IdleTier::Hz60, true) => 0x02,
        (SpeedMode::Normal, IdleTier::Hz30 | IdleTier::Hz60, false) => 0x04,
        (SpeedMode::High, IdleTier::Hz10, true) => 0x0B,
        (SpeedMode::High, IdleTier::Hz10, false) => 0x16,
        (SpeedMode::High, IdleTier::Hz30, true) => 0x03,
        (SpeedMode::High, IdleTier::Hz30, false) => 0x06,
        (SpeedMode::High, IdleTier::Hz60, true) => 0x01,
        (SpeedMode::High, IdleTier::Hz60, false) => 0x02,
    }
}

/// Automatic stepping table keyed by (speed, hbm)
const fn stepping_table(speed: SpeedMode, hbm: bool) -> [u8; 6] {
    match (speed, hbm) {
        (SpeedMode::Normal, true) => [0x00, 0x02, 0x00, 0x0A, 0x00, 0x00],
        (SpeedMode::Normal, false) => [0x00, 0x04, 0x00, 0x14, 0x00, 0x00],
        (SpeedMode::High, true) => [0x00, 0x01, 0x00, 0x03, 0x00, 0x0B],
        (SpeedMode::High, false) => [0x00, 0x02, 0x00, 0x06, 0x00, 0x16],
    }
}

/// Stepping limits keyed by (speed, 60 Hz target, tier)
const fn stepping_limits(speed: SpeedMode, target_60: bool, tier: IdleTier) -> [u8; 3] {
    let to_10hz = matches!(tier, IdleTier::Hz10);
    match (speed, target_60, to_10hz) {
        (SpeedMode::Normal, _, true) => [0x01, 0x00, 0x00],
        (SpeedMode::Normal, _, false) => [0x00, 0x00, 0x00],
        (SpeedMode::High, true, true) => [0x01, 0x01, 0x00],
        (SpeedMode::High, true, false) => [0x01, 0x00, 0x00],
        (SpeedMode::High, false, true) => [0x00, 0x03, 0x00],
        (SpeedMode::High, false, false) => [0x00, 0x00, 0x00],
    }
}

/// Manual rate index for the frequency select register
///
/// `None` when the speed cannot run `rate`.
pub const fn manual_rate_index(speed: SpeedMode, rate: RefreshRate) -> Option<u8> {
    match (speed, rate) {
        (SpeedMode::Normal, RefreshRate::Hz1) => Some(0x1F),
        (SpeedMode::Normal, RefreshRate::Hz5) => Some(0x1E),
        (SpeedMode::Normal, RefreshRate::Hz10) => Some(0x1B),
        (SpeedMode::Normal, RefreshRate::Hz30) => Some(0x19),
        (SpeedMode::Normal, RefreshRate::Hz60) => Some(0x18),
        (SpeedMode::Normal, RefreshRate::Hz120) => None,
        (SpeedMode::High, RefreshRate::Hz1) => Some(0x07),
        (SpeedMode::High, RefreshRate::Hz5) => Some(0x06),
        (SpeedMode::High, RefreshRate::Hz10) => Some(0x03),
        (SpeedMode::High, RefreshRate::Hz30) => Some(0x02),
        (SpeedMode::High, RefreshRate::Hz60) => Some(0x01),
        (SpeedMode::High, RefreshRate::Hz120) => Some(0x00),
    }
}

fn push_frequency(
    batch: &mut CommandBatch,
    features: &FeatureSet,
    speed: SpeedMode,
) -> Result<(), PlanError> {
    if !features.auto_frame_stepping {
        let rate = RefreshRate::from_hz(features.target_vrefresh)?;
        let index = manual_rate_index(speed, rate).ok_or(PolicyViolation::RateAboveOperatingRate {
            vrefresh: features.target_vrefresh,
            op_hz: speed.op_hz(),
        })?;
        batch.push(&[FRAME_CTRL, 0x21])?;
        batch.push(&[FREQ_SELECT, index])?;
        return Ok(());
    }

    let tier = IdleTier::from_hz(features.idle_vrefresh).ok_or(
        PolicyViolation::UnsupportedIdleRate {
            idle_vrefresh: features.idle_vrefresh,
        },
    )?;
    let hbm = features.hbm;
    let target_60 = features.target_vrefresh == 60;

    match speed {
        SpeedMode::Normal => {
            batch.push(&[GLOBAL_PARAM, 0x00, 0x0C, FRAME_CTRL])?;
            batch.push(&[FRAME_CTRL, 0x00, 0x00])?;
        }
        SpeedMode::High => {
            let start = match (target_60, hbm) {
                (true, true) => 0x01,
                (true, false) => 0x02,
                (false, _) => 0x00,
            };
            batch.push(&[GLOBAL_PARAM, 0x00, 0x92, FRAME_CTRL])?;
            batch.push(&[FRAME_CTRL, 0x00, start])?;
        }
    }

    batch.push(&[GLOBAL_PARAM, 0x00, 0x12, FRAME_CTRL])?;
    batch.push(&[FRAME_CTRL, 0x00, 0x00, idle_divider(speed, tier, hbm)])?;

    let mut steps = [FRAME_CTRL; 7];
    steps[1..].copy_from_slice(&stepping_table(speed, hbm));
    batch.push(&[GLOBAL_PARAM, 0x00, 0x9E, FRAME_CTRL])?;
    batch.push(&steps)?;

    let [a, b, c] = stepping_limits(speed, target_60, tier);
    batch.push(&[GLOBAL_PARAM, 0x00, 0xAE, FRAME_CTRL])?;
    batch.push(&[FRAME_CTRL, a, b, c])?;

    batch.push(&[FRAME_CTRL, 0xA3])?;
    Ok(())
}
