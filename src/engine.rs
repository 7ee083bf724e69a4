//! Per-panel refresh-rate engine

use embedded_hal::delay::DelayNs;
use fugit::MicrosDurationU64;

use crate::clock::{ClockOverride, ClockOverrideGuard, CrtcState};
use crate::command::{
    AOD_CTRL, CommandBatch, FREQ_UPDATE, GLOBAL_PARAM, SET_DISPLAY_BRIGHTNESS, SET_DISPLAY_OFF,
    SET_DISPLAY_ON, WRCTRLD_BCTRL_BIT, WRCTRLD_DIMMING_BIT, WRCTRLD_HBM_BIT,
    WRCTRLD_LOCAL_HBM_BIT, WRITE_CONTROL_DISPLAY,
};
use crate::config::{Config, EarlyExitPolicy};
use crate::error::{Error, PolicyViolation};
use crate::feature::{FeatureSet, HardwareShadow, RESET_VREFRESH};
use crate::idle::{IdleContext, IdleState};
use crate::interface::{Clock, PanelInterface, Vblank};
use crate::mode::{IdleMode, ModeDescriptor, RefreshRate};
use crate::policy::{IdlePolicyInput, compute_idle_vrefresh};
use crate::reconcile::{FeatureReconciler, transmit};

type EngineResult<T, I> = core::result::Result<T, Error<I>>;

/// High brightness mode setting
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HbmMode {
    /// HBM off
    #[default]
    Off,
    /// HBM on with IRC compensation kept on
    OnIrcOn,
    /// HBM on with IRC compensation off
    OnIrcOff,
}

impl HbmMode {
    /// Whether HBM is on
    pub const fn is_on(self) -> bool {
        !matches!(self, Self::Off)
    }
}

/// What [`RefreshEngine::on_commit`] did about early exit
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EarlyExitAction {
    /// The commit came soon enough, or automatic stepping is off
    NotNeeded,
    /// Automatic stepping was switched off
    DisabledAutoStepping,
    /// A bare frequency update was sent
    Resynced,
    /// The panel may be stepping down but the policy is passive
    Ignored,
}

/// Adaptive refresh-rate engine for one panel
///
/// Owns the desired feature set, the hardware shadow and the idle context.
/// All methods must be called from a single control path; the display
/// pipeline serializes commits, so there is no internal locking.
pub struct RefreshEngine<I, C>
where
    I: PanelInterface,
    C: Clock,
{
    /// Panel command channel
    interface: I,
    /// Monotonic time source
    clock: C,
    /// Engine configuration
    config: Config,
    reconciler: FeatureReconciler,
    clock_guard: ClockOverrideGuard,
    /// Configuration the engine wants on the panel
    desired: FeatureSet,
    /// Configuration last committed to the panel
    shadow: HardwareShadow,
    context: IdleContext,
    state: IdleState,
    current_mode: Option<ModeDescriptor>,
    /// Whether the panel is powered and accepting commands
    enabled: bool,
    hbm_mode: HbmMode,
    local_hbm: bool,
    dimming: bool,
    min_vrefresh: Option<u32>,
    op_hz: u32,
    idle_exit_needs_vblank: bool,
    vblank_pending: bool,
    /// A forced reconcile failed to send; the retry must be forced too
    resync_pending: bool,
}

impl<I, C> RefreshEngine<I, C>
where
    I: PanelInterface,
    C: Clock,
{
    /// Create a new engine for a disabled panel
    pub fn new(interface: I, clock: C, config: Config) -> Self {
        let reconciler = FeatureReconciler::new(config.max_vrefresh)
            .with_force_changeable_te(config.force_changeable_te)
            .with_te2_timing(config.te2);
        Self {
            interface,
            clock,
            reconciler,
            clock_guard: ClockOverrideGuard::new(config.max_vrefresh),
            desired: FeatureSet {
                operating_speed_low: config.op_hz == 60,
                ..FeatureSet::default()
            },
            shadow: HardwareShadow::new(),
            context: IdleContext::new(config.min_idle_delay, config.auto_idle),
            state: IdleState::Active {
                vrefresh: config.max_vrefresh,
            },
            current_mode: None,
            enabled: false,
            hbm_mode: HbmMode::Off,
            local_hbm: false,
            dimming: false,
            min_vrefresh: config.min_vrefresh,
            op_hz: config.op_hz,
            idle_exit_needs_vblank: false,
            vblank_pending: false,
            resync_pending: false,
            config,
        }
    }

    /// Enable the panel at `mode`
    ///
    /// The panel state is unknown after power-up, so every feature is
    /// written before the idle rate for `mode` is applied.
    pub fn enable(&mut self, mode: ModeDescriptor) -> EngineResult<(), I> {
        self.check_mode(&mode)?;
        log::info!("enable at {} Hz", mode.vrefresh);

        self.current_mode = Some(mode);
        self.enabled = true;
        self.apply_mode_forced(&mode)
    }

    /// Mark the panel as powered off
    ///
    /// Panel registers are lost, so the shadow returns to the out-of-reset
    /// state and the next enable rewrites everything.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.vblank_pending = false;
        self.resync_pending = false;
        self.shadow.reset();
        self.state = IdleState::Active {
            vrefresh: self.current_mode.map_or(RESET_VREFRESH, |mode| mode.vrefresh),
        };
        log::info!("disable");
    }

    /// Switch to `mode`
    ///
    /// While the panel is disabled the mode is only remembered for the next
    /// enable.
    pub fn on_mode_set(&mut self, mode: ModeDescriptor) -> EngineResult<(), I> {
        self.check_mode(&mode)?;
        self.current_mode = Some(mode);

        if !self.enabled {
            log::debug!("cache mode {} Hz", mode.vrefresh);
            return Ok(());
        }

        self.context.record_mode_set(self.clock.now());
        self.reconciler.set_low_power(mode.low_power);
        self.change_frequency(&mode, true)
    }

    /// Handle a display pipeline commit that produced a new frame
    ///
    /// If automatic stepping is on and the previous commit is older than the
    /// early-exit threshold, the panel may already be stepping down; the
    /// configured [`EarlyExitPolicy`] decides what to send.
    pub fn on_commit(&mut self) -> EngineResult<EarlyExitAction, I> {
        let now = self.clock.now();
        let since_last = self.context.record_commit(now);

        let Some(mode) = self.current_mode else {
            return Ok(EarlyExitAction::NotNeeded);
        };
        self.state = IdleState::Active {
            vrefresh: mode.vrefresh,
        };

        if self.enabled && (self.resync_pending || *self.shadow.committed() != self.desired) {
            log::debug!(
                "resending features left over from a failed update (force: {})",
                self.resync_pending
            );
            self.reconcile_desired(false)?;
        }

        if !self.enabled || !self.desired.auto_frame_stepping {
            return Ok(EarlyExitAction::NotNeeded);
        }
        let Some(elapsed) = since_last else {
            return Ok(EarlyExitAction::NotNeeded);
        };
        if elapsed < self.config.early_exit_threshold {
            log::debug!("skip early exit. {}us since last commit", elapsed.ticks());
            return Ok(EarlyExitAction::NotNeeded);
        }

        // Early exit switches the panel back to its active rate
        self.context.record_mode_set(now);

        match self
            .config
            .effective_early_exit_policy(self.context.min_idle_delay())
        {
            EarlyExitPolicy::DisableAutoStepping => {
                self.update_refresh_mode(&mode, 0, false)?;
                Ok(EarlyExitAction::DisabledAutoStepping)
            }
            EarlyExitPolicy::Resync => {
                log::debug!("sending early exit out cmd");
                let mut batch = CommandBatch::new();
                batch.push(&FREQ_UPDATE)?;
                transmit(&mut self.interface, &batch).map_err(Error::Interface)?;
                Ok(EarlyExitAction::Resynced)
            }
            EarlyExitPolicy::Passive => Ok(EarlyExitAction::Ignored),
        }
    }

    /// Handle the pipeline entering (`true`) or leaving self-refresh
    ///
    /// Returns whether anything changed, i.e. whether the caller needs a
    /// pipeline commit. When leaving idle on a pipeline that asked for it,
    /// one vblank of settle time is requested; see
    /// [`settle_idle_exit`](Self::settle_idle_exit).
    pub fn on_self_refresh_request(&mut self, enable: bool) -> EngineResult<bool, I> {
        let Some(mode) = self.current_mode else {
            return Ok(false);
        };
        // Low-power modes always rely on early exit
        if !self.enabled || mode.low_power {
            return Ok(false);
        }

        let mut idle_vrefresh = self.min_idle_vrefresh(&mode);

        if mode.idle_mode != IdleMode::OnSelfRefresh {
            if mode.idle_mode == IdleMode::OnInactivity
                && self.desired.idle_vrefresh != idle_vrefresh
            {
                self.update_refresh_mode(&mode, idle_vrefresh, false)?;
                return Ok(true);
            }
            return Ok(false);
        }

        if !enable {
            idle_vrefresh = 0;
        }

        if self.state.idle_vrefresh() == idle_vrefresh {
            return Ok(false);
        }

        self.update_refresh_mode(&mode, idle_vrefresh, false)?;

        if idle_vrefresh != 0 {
            log::debug!(
                "idle enter: vrefresh {} Hz, idle {} Hz",
                mode.vrefresh,
                idle_vrefresh
            );
        } else if self.idle_exit_needs_vblank {
            log::debug!("wait one vblank after exit idle");
            self.vblank_pending = true;
        }

        Ok(true)
    }

    /// Perform the settle wait requested by leaving idle
    ///
    /// Waits for one vblank, or sleeps for the configured fallback if the
    /// pipeline cannot deliver one. Returns whether a wait was pending.
    pub fn settle_idle_exit<V, D>(&mut self, vblank: &mut V, delay: &mut D) -> bool
    where
        V: Vblank,
        D: DelayNs,
    {
        if !core::mem::take(&mut self.vblank_pending) {
            return false;
        }

        if let Err(err) = vblank.wait_for_vblank() {
            log::warn!(
                "{}, sleeping {}us instead",
                err,
                self.config.vblank_fallback.ticks()
            );
            delay.delay_us(as_micros_u32(self.config.vblank_fallback));
        }
        true
    }

    /// Pre-commit clock override for the pipeline
    ///
    /// See [`ClockOverrideGuard::adjust`].
    pub fn adjust_clock(&self, old: &CrtcState, new: &CrtcState) -> Option<ClockOverride> {
        let mode = self.current_mode?;
        self.clock_guard
            .adjust(mode.vrefresh, self.desired.idle_vrefresh != 0, old, new)
    }

    /// Set high brightness mode
    pub fn set_hbm(&mut self, mode: HbmMode) -> EngineResult<(), I> {
        if mode == self.hbm_mode {
            return Ok(());
        }

        self.hbm_mode = mode;
        self.desired.hbm = mode.is_on();
        self.desired.irc_off = mode == HbmMode::OnIrcOff;

        if !self.enabled {
            return Ok(());
        }

        if mode.is_on() {
            self.reconcile_desired(false)?;
            self.write_display_mode()
        } else {
            self.write_display_mode()?;
            self.reconcile_desired(false)
        }
    }

    /// Set local HBM
    pub fn set_local_hbm(&mut self, enabled: bool) -> EngineResult<(), I> {
        self.local_hbm = enabled;
        if !self.enabled {
            return Ok(());
        }
        self.write_display_mode()
    }

    /// Start or stop a dimming transition
    ///
    /// Idle is vetoed while dimming.
    pub fn set_dimming(&mut self, dimming: bool) -> EngineResult<(), I> {
        self.dimming = dimming;
        if !self.enabled {
            return Ok(());
        }
        if self.current_mode.is_some_and(|mode| mode.low_power) {
            log::info!("in lp mode, skip to update");
            return Ok(());
        }
        self.write_display_mode()
    }

    /// Set the operating rate (60 or 120 Hz)
    pub fn set_op_hz(&mut self, hz: u32) -> EngineResult<(), I> {
        let vrefresh = self.current_mode.map_or(0, |mode| mode.vrefresh);
        if vrefresh > hz || !matches!(hz, 60 | 120) || hz > self.config.max_vrefresh {
            log::error!("invalid op_hz={} for vrefresh={}", hz, vrefresh);
            return Err(Error::Policy(PolicyViolation::InvalidOperatingRate {
                op_hz: hz,
                vrefresh,
            }));
        }

        self.op_hz = hz;
        self.desired.operating_speed_low = hz == 60;

        if self.enabled {
            self.reconcile_desired(false)?;
        }
        log::info!(
            "{} op_hz at {}",
            if self.enabled { "set" } else { "cache" },
            hz
        );
        Ok(())
    }

    /// Resend the TE2 timing block
    pub fn update_te2(&mut self) -> EngineResult<(), I> {
        if self.current_mode.is_none() {
            return Err(Error::NoMode);
        }
        if !self.enabled {
            return Ok(());
        }
        let batch = self.reconciler.te2_batch(&self.desired)?;
        transmit(&mut self.interface, &batch).map_err(Error::Interface)
    }

    /// Rewrite every feature for the current mode
    ///
    /// For use when something outside the engine may have touched the panel
    /// registers.
    pub fn resync(&mut self) -> EngineResult<(), I> {
        let mode = self.current_mode.ok_or(Error::NoMode)?;
        if !self.enabled {
            return Ok(());
        }
        self.apply_mode_forced(&mode)
    }

    /// Leave an always-on low-power mode for `mode`
    ///
    /// The display is blanked while every feature is rewritten, then turned
    /// back on after one frame at the new rate.
    pub fn exit_low_power<D: DelayNs>(
        &mut self,
        mode: ModeDescriptor,
        delay: &mut D,
    ) -> EngineResult<(), I> {
        self.check_mode(&mode)?;
        let settle_us = 1_020_000 / mode.vrefresh;

        // Clear the brightness level
        self.send(&[SET_DISPLAY_BRIGHTNESS, 0x00, 0x00])?;
        self.send(&[SET_DISPLAY_OFF])?;

        // AOD low mode off
        let mut aod = CommandBatch::new();
        aod.push(&[GLOBAL_PARAM, 0x00, 0x52, AOD_CTRL])?;
        aod.push(&[AOD_CTRL, 0x00])?;
        transmit(&mut self.interface, &aod).map_err(Error::Interface)?;

        self.current_mode = Some(mode);
        self.enabled = true;
        self.apply_mode_forced(&mode)?;

        delay.delay_us(settle_us);
        self.send(&[SET_DISPLAY_ON])?;

        log::info!("exit LP mode");
        Ok(())
    }

    /// Enable or disable automatic idle
    ///
    /// Takes effect at the next mode set or self-refresh request.
    pub fn set_auto_idle(&mut self, enabled: bool) {
        self.context.set_auto_idle_enabled(enabled);
    }

    /// Set the idle floor, `None` to disable idle
    pub fn set_min_vrefresh(&mut self, hz: Option<u32>) {
        self.min_vrefresh = hz;
    }

    /// Set the minimum time without new frames before idle
    pub fn set_idle_delay(&mut self, delay: Option<MicrosDurationU64>) {
        self.context.set_min_idle_delay(delay);
    }

    /// Tell the engine whether leaving idle needs one vblank of settle time
    ///
    /// Set by the pipeline when a plane that cannot be scanned out at the
    /// fastest rate is assigned.
    pub fn set_idle_exit_needs_vblank(&mut self, needed: bool) {
        self.idle_exit_needs_vblank = needed;
    }

    /// Whether a settle wait is pending
    pub const fn idle_exit_wait_pending(&self) -> bool {
        self.vblank_pending
    }

    /// Current idle state
    pub const fn state(&self) -> IdleState {
        self.state
    }

    /// Configuration the engine wants on the panel
    pub const fn desired(&self) -> &FeatureSet {
        &self.desired
    }

    /// Configuration last committed to the panel
    pub const fn shadow(&self) -> &HardwareShadow {
        &self.shadow
    }

    /// Current mode, if one was set
    pub const fn current_mode(&self) -> Option<&ModeDescriptor> {
        self.current_mode.as_ref()
    }

    /// Whether the panel is enabled
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Current operating rate in Hz
    pub const fn op_hz(&self) -> u32 {
        self.op_hz
    }

    /// Current HBM setting
    pub const fn hbm_mode(&self) -> HbmMode {
        self.hbm_mode
    }

    /// Engine configuration
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// The panel command channel
    pub const fn interface(&self) -> &I {
        &self.interface
    }

    /// The panel command channel, mutably
    pub fn interface_mut(&mut self) -> &mut I {
        &mut self.interface
    }

    /// The time source
    pub const fn clock(&self) -> &C {
        &self.clock
    }

    /// Release the interface and clock
    pub fn release(self) -> (I, C) {
        (self.interface, self.clock)
    }

    fn check_mode(&self, mode: &ModeDescriptor) -> EngineResult<(), I> {
        self.validate_mode(mode).map_err(|violation| {
            log::error!("invalid mode {} Hz: {}", mode.vrefresh, violation);
            Error::Policy(violation)
        })
    }

    fn validate_mode(&self, mode: &ModeDescriptor) -> Result<(), PolicyViolation> {
        RefreshRate::from_hz(mode.vrefresh)?;
        if mode.vrefresh > self.config.max_vrefresh {
            return Err(PolicyViolation::UnsupportedRate {
                vrefresh: mode.vrefresh,
            });
        }
        if mode.vrefresh > self.op_hz {
            return Err(PolicyViolation::RateAboveOperatingRate {
                vrefresh: mode.vrefresh,
                op_hz: self.op_hz,
            });
        }
        Ok(())
    }

    fn apply_mode_forced(&mut self, mode: &ModeDescriptor) -> EngineResult<(), I> {
        self.context.record_mode_set(self.clock.now());
        self.reconciler.set_low_power(mode.low_power);

        let kept_idle = if self.desired.idle_vrefresh < mode.vrefresh {
            self.desired.idle_vrefresh
        } else {
            0
        };
        self.update_refresh_mode(mode, kept_idle, true)?;
        // Backlight control and dimming
        self.write_display_mode()?;
        self.change_frequency(mode, false)
    }

    fn change_frequency(&mut self, mode: &ModeDescriptor, force: bool) -> EngineResult<(), I> {
        let idle_vrefresh = if mode.idle_mode == IdleMode::OnInactivity {
            self.min_idle_vrefresh(mode)
        } else {
            0
        };
        self.update_refresh_mode(mode, idle_vrefresh, force)?;
        log::debug!("change to {} Hz", mode.vrefresh);
        Ok(())
    }

    fn update_refresh_mode(
        &mut self,
        mode: &ModeDescriptor,
        idle_vrefresh: u32,
        force: bool,
    ) -> EngineResult<(), I> {
        log::debug!(
            "update refresh mode: {} Hz, idle_vrefresh {}",
            mode.vrefresh,
            idle_vrefresh
        );
        let desired = FeatureSet::for_rates(
            mode.vrefresh,
            idle_vrefresh,
            self.config.max_vrefresh,
            self.desired,
        );
        desired.validate(self.config.max_vrefresh)?;

        // Kept even if the send fails; the next commit retries it
        self.desired = desired;
        self.reconcile_desired(force)?;
        // Best guess until the next commit tells otherwise
        self.state = IdleState::new(mode.vrefresh, idle_vrefresh);
        Ok(())
    }

    fn reconcile_desired(&mut self, force: bool) -> EngineResult<(), I> {
        let force = force || self.resync_pending;
        match self
            .reconciler
            .reconcile(&self.desired, &mut self.shadow, force, &mut self.interface)
        {
            Ok(_) => {
                self.resync_pending = false;
                Ok(())
            }
            Err(err) => {
                if force && matches!(err, Error::Interface(_)) {
                    self.resync_pending = true;
                }
                Err(err)
            }
        }
    }

    fn min_idle_vrefresh(&self, mode: &ModeDescriptor) -> u32 {
        compute_idle_vrefresh(&IdlePolicyInput {
            mode_vrefresh: mode.vrefresh,
            min_vrefresh: self.min_vrefresh,
            auto_idle_disabled: !self.context.auto_idle_enabled(),
            hbm: self.hbm_mode.is_on(),
            dimming: self.dimming,
            min_idle_delay: self.context.min_idle_delay(),
            idle_elapsed: self.context.idle_elapsed(self.clock.now()),
        })
    }

    fn write_display_mode(&mut self) -> EngineResult<(), I> {
        let mut val = WRCTRLD_BCTRL_BIT;
        if self.hbm_mode.is_on() {
            val |= WRCTRLD_HBM_BIT;
        }
        if self.local_hbm {
            val |= WRCTRLD_LOCAL_HBM_BIT;
        }
        if self.dimming {
            val |= WRCTRLD_DIMMING_BIT;
        }

        log::debug!(
            "wrctrld:{:#04x}, hbm: {}, dimming: {}, local_hbm: {}",
            val,
            if self.hbm_mode.is_on() { "on" } else { "off" },
            if self.dimming { "on" } else { "off" },
            if self.local_hbm { "on" } else { "off" }
        );
        self.send(&[WRITE_CONTROL_DISPLAY, val])
    }

    fn send(&mut self, command: &[u8]) -> EngineResult<(), I> {
        self.interface.send(command).map_err(Error::Interface)
    }
}

fn as_micros_u32(duration: MicrosDurationU64) -> u32 {
    u32::try_from(duration.ticks()).unwrap_or(u32::MAX)
}
