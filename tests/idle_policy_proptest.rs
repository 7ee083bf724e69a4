//! Property-based tests for idle rate selection and feature reconciliation.
//! Verifies invariants hold for all inputs, not just fixed examples.

use amoled_vrr::command::FREQ_UPDATE;
use amoled_vrr::policy::{IdlePolicyInput, IdleTier, compute_idle_vrefresh};
use amoled_vrr::{FeatureReconciler, FeatureSet, HardwareShadow, PanelInterface, RefreshRate};
use fugit::MicrosDurationU64;
use proptest::prelude::*;

#[derive(Debug, Default)]
struct NullPanel {
    sends: usize,
}

impl PanelInterface for NullPanel {
    type Error = core::convert::Infallible;

    fn send(&mut self, _command: &[u8]) -> Result<(), Self::Error> {
        self.sends += 1;
        Ok(())
    }

    fn read(&mut self, _register: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        buf.fill(0);
        Ok(())
    }
}

fn mode_rate() -> impl Strategy<Value = u32> {
    prop::sample::select(RefreshRate::ALL.iter().map(|rate| rate.hz()).collect::<Vec<_>>())
}

fn policy_input() -> impl Strategy<Value = IdlePolicyInput> {
    (
        mode_rate(),
        prop::option::of(0u32..=200),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
        prop::option::of(0u64..=1_000_000),
        0u64..=2_000_000,
    )
        .prop_map(
            |(mode_vrefresh, min_vrefresh, auto_idle_disabled, hbm, dimming, delay, elapsed)| {
                IdlePolicyInput {
                    mode_vrefresh,
                    min_vrefresh,
                    auto_idle_disabled,
                    hbm,
                    dimming,
                    min_idle_delay: delay.map(MicrosDurationU64::from_ticks),
                    idle_elapsed: MicrosDurationU64::from_ticks(elapsed),
                }
            },
        )
}

proptest! {
    /// The idle rate is 0 or a supported tier strictly below the mode rate.
    #[test]
    fn idle_rate_is_a_tier_below_mode(input in policy_input()) {
        let idle = compute_idle_vrefresh(&input);
        if idle != 0 {
            prop_assert!(IdleTier::from_hz(idle).is_some(), "{} is not a tier", idle);
            prop_assert!(idle < input.mode_vrefresh);
        }
    }

    /// HBM, dimming or disabled auto idle always veto idle.
    #[test]
    fn vetoes_always_win(input in policy_input()) {
        for vetoed in [
            IdlePolicyInput { hbm: true, ..input },
            IdlePolicyInput { dimming: true, ..input },
            IdlePolicyInput { auto_idle_disabled: true, ..input },
        ] {
            prop_assert_eq!(compute_idle_vrefresh(&vetoed), 0);
        }
    }

    /// The chosen tier is never below the configured floor.
    #[test]
    fn idle_rate_respects_floor(input in policy_input()) {
        let idle = compute_idle_vrefresh(&input);
        if let (true, Some(floor)) = (idle != 0, input.min_vrefresh) {
            prop_assert!(idle >= floor);
        }
    }

    /// A reconciled shadow plans nothing, and any plan ends with the update marker.
    #[test]
    fn reconcile_is_idempotent(
        target in mode_rate(),
        idle_tier in prop::sample::select(vec![0u32, 10, 30, 60]),
        hbm in any::<bool>(),
        irc_off in any::<bool>(),
    ) {
        let idle = if idle_tier < target { idle_tier } else { 0 };
        let base = FeatureSet { hbm, irc_off, ..FeatureSet::default() };
        let desired = FeatureSet::for_rates(target, idle, 120, base);

        let reconciler = FeatureReconciler::new(120);
        let mut shadow = HardwareShadow::new();
        let mut panel = NullPanel::default();

        let batch = reconciler.reconcile(&desired, &mut shadow, false, &mut panel).unwrap();
        if !batch.is_empty() {
            prop_assert!(batch.ends_with_update());
            prop_assert_eq!(batch.iter().last(), Some(&FREQ_UPDATE[..]));
        }
        prop_assert_eq!(shadow.committed(), &desired);

        let sends = panel.sends;
        let again = reconciler.plan(&desired, &shadow, false).unwrap();
        prop_assert!(again.is_empty());
        reconciler.reconcile(&desired, &mut shadow, false, &mut panel).unwrap();
        prop_assert_eq!(panel.sends, sends);
    }
}
