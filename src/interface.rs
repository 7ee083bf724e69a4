//! Hardware interface abstraction
//!
//! This module provides the traits the engine consumes from its environment:
//!
//! - [`PanelInterface`] - synchronous register command channel (send/read)
//! - [`Clock`] - monotonic microsecond timestamps
//! - [`Vblank`] - wait for the next vertical blank
//!
//! and [`Interface`], a [`PanelInterface`] for AMOLED driver ICs addressed
//! over (Q)SPI in single-line mode.
//!
//! ## Wire Format
//!
//! Writes are framed as `0x02 0x00 <opcode> 0x00 <params...>`, reads as
//! `0x03 0x00 <register> 0x00` followed by the read-back bytes, all inside a
//! single chip-select transaction.
//!
//! ## Example
//!
//! ```rust,no_run
//! use amoled_vrr::{Interface, PanelInterface};
//! # use core::convert::Infallible;
//! # use embedded_hal::spi::{Operation, SpiDevice};
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
//! let mut interface = Interface::new(MockSpi);
//!
//! // Display on
//! let _ = interface.send(&[0x29]);
//!
//! // Read the DDIC id
//! let mut id = [0u8; 3];
//! let _ = interface.read(0x04, &mut id);
//! ```

use core::fmt::Debug;
use embedded_hal::spi::{Operation, SpiDevice};
use fugit::Instant;

type InterfaceResult<T, E> = core::result::Result<T, E>;

/// Microsecond timestamp used throughout the engine
pub type Timestamp = Instant<u64, 1, 1_000_000>;

/// Trait for the panel register command channel
///
/// Commands are sent exactly as given, in order, and synchronously.
/// Failures are surfaced to the caller and never retried here.
pub trait PanelInterface {
    /// Error type for interface operations
    ///
    /// Must implement [`Debug`] for error reporting.
    type Error: Debug;

    /// Send one command: opcode followed by its parameters
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails.
    fn send(&mut self, command: &[u8]) -> InterfaceResult<(), Self::Error>;

    /// Read `buf.len()` bytes back from `register`
    ///
    /// # Errors
    ///
    /// Returns an error if the transfer fails.
    fn read(&mut self, register: u8, buf: &mut [u8]) -> InterfaceResult<(), Self::Error>;
}

/// Monotonic time source
pub trait Clock {
    /// The current time
    fn now(&self) -> Timestamp;
}

/// The pipeline could not deliver a vblank in time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VblankTimeout;

impl core::fmt::Display for VblankTimeout {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Timeout waiting for vblank")
    }
}

impl core::error::Error for VblankTimeout {}

/// Access to the display pipeline's vertical blank
pub trait Vblank {
    /// Block until the next vertical blank
    ///
    /// # Errors
    ///
    /// Returns [`VblankTimeout`] if no vblank can be waited on, e.g. the
    /// vblank interrupt cannot be enabled right now.
    fn wait_for_vblank(&mut self) -> InterfaceResult<(), VblankTimeout>;
}

/// Errors that can occur at the interface level
#[derive(Debug)]
pub enum InterfaceError<SpiErr> {
    /// SPI communication error
    Spi(SpiErr),
    /// Command has no opcode byte
    EmptyCommand,
}

impl<SpiErr: Debug> core::fmt::Display for InterfaceError<SpiErr> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Spi(e) => write!(f, "SPI error: {e:?}"),
            Self::EmptyCommand => write!(f, "Empty command"),
        }
    }
}

impl<SpiErr: Debug> core::error::Error for InterfaceError<SpiErr> {}

/// Write instruction prefix in single-line SPI mode
pub const SPI_WRITE_PREFIX: u8 = 0x02;

/// Read instruction prefix in single-line SPI mode
pub const SPI_READ_PREFIX: u8 = 0x03;

/// [`PanelInterface`] over an embedded-hal v1.0 [`SpiDevice`]
///
/// Each command or read is issued as one SPI transaction so chip select
/// stays asserted between the header and the payload.
pub struct Interface<SPI> {
    /// SPI device for communication
    spi: SPI,
}

impl<SPI> Interface<SPI>
where
    SPI: SpiDevice,
{
    /// Create a new Interface
    pub fn new(spi: SPI) -> Self {
        Self { spi }
    }

    /// Release the SPI device
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI> PanelInterface for Interface<SPI>
where
    SPI: SpiDevice,
    SPI::Error: Debug,
{
    type Error = InterfaceError<SPI::Error>;

    fn send(&mut self, command: &[u8]) -> InterfaceResult<(), Self::Error> {
        let Some((&opcode, params)) = command.split_first() else {
            return Err(InterfaceError::EmptyCommand);
        };
        let header = [SPI_WRITE_PREFIX, 0x00, opcode, 0x00];
        if params.is_empty() {
            self.spi.write(&header).map_err(InterfaceError::Spi)
        } else {
            self.spi
                .transaction(&mut [Operation::Write(&header), Operation::Write(params)])
                .map_err(InterfaceError::Spi)
        }
    }

    fn read(&mut self, register: u8, buf: &mut [u8]) -> InterfaceResult<(), Self::Error> {
        let header = [SPI_READ_PREFIX, 0x00, register, 0x00];
        self.spi
            .transaction(&mut [Operation::Write(&header), Operation::Read(buf)])
            .map_err(InterfaceError::Spi)
    }
}
