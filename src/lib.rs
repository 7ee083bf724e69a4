//! AMOLED Adaptive Refresh-Rate Engine
//!
//! Drives the refresh rate of a command-mode AMOLED panel that can step
//! itself down to an idle rate when no new frames arrive, and keeps the
//! panel's correlated features (early exit, operating speed, HBM, IRC, TE
//! timing) consistent with every rate change.
//!
//! ## Features
//!
//! - `no_std` compatible
//! - `embedded-hal` v1.0 SPI transport
//! - Idle rate selection from user floor, HBM, dimming and idle delay
//! - Minimal register-write plans against a committed hardware shadow
//! - Early-exit handling for late commits
//! - Transient pixel clock override on self-refresh exit
//!
//! ## Usage
//!
//! ```rust,no_run
//! use core::convert::Infallible;
//! use embedded_hal::spi::{Operation, SpiDevice};
//! use amoled_vrr::{Builder, Clock, IdleMode, Interface, ModeDescriptor, RefreshEngine, Timestamp};
//!
//! # struct MockSpi;
//! # impl embedded_hal::spi::ErrorType for MockSpi { type Error = Infallible; }
//! # impl SpiDevice for MockSpi {
//! #     fn transaction(
//! #         &mut self,
//! #         _operations: &mut [Operation<'_, u8>],
//! #     ) -> Result<(), Self::Error> {
//! #         Ok(())
//! #     }
//! # }
//! # struct MonotonicClock;
//! # impl Clock for MonotonicClock {
//! #     fn now(&self) -> Timestamp { Timestamp::from_ticks(0) }
//! # }
//! # let spi = MockSpi;
//! let interface = Interface::new(spi);
//! let config = match Builder::new().max_vrefresh(120).min_vrefresh(Some(10)).build() {
//!     Ok(config) => config,
//!     Err(_) => return,
//! };
//!
//! let mut engine = RefreshEngine::new(interface, MonotonicClock, config);
//! let mode = ModeDescriptor::new(120, 1380, 3248).with_idle_mode(IdleMode::OnInactivity);
//! let _ = engine.enable(mode);
//!
//! // Every frame commit
//! let _ = engine.on_commit();
//! ```

#![no_std]

#[cfg(any(test, feature = "alloc"))]
extern crate alloc;

/// Pixel clock override around self-refresh exit
pub mod clock;
/// Panel register map and command batches
pub mod command;
/// Engine configuration types and builder
pub mod config;
/// Refresh-rate engine
pub mod engine;
/// Error types for the engine
pub mod error;
/// Panel feature sets and the committed hardware shadow
pub mod feature;
/// Idle state and timestamps
pub mod idle;
/// Hardware interface abstraction
pub mod interface;
/// Display modes and refresh rates
pub mod mode;
/// Idle rate policy
pub mod policy;
/// Feature reconciliation into register writes
pub mod reconcile;

pub use clock::{ClockOverride, ClockOverrideGuard, CrtcState};
pub use command::CommandBatch;
pub use config::{Builder, Config, EarlyExitPolicy};
pub use engine::{EarlyExitAction, HbmMode, RefreshEngine};
pub use error::{BuilderError, Error, PolicyViolation};
pub use feature::{FeatureDiff, FeatureSet, HardwareShadow};
pub use idle::{IdleContext, IdleState};
pub use interface::{Clock, Interface, InterfaceError, PanelInterface, Timestamp, Vblank, VblankTimeout};
pub use mode::{IdleMode, ModeDescriptor, RefreshRate};
pub use policy::{IdlePolicyInput, IdleTier};
pub use reconcile::{FeatureReconciler, PlanError, SpeedMode, Te2Option, Te2Timing};
