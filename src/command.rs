//! Panel register map and command batches
//!
//! This module defines the opcodes used by the refresh-rate engine and the
//! [`Command`]/[`CommandBatch`] containers it hands to a
//! [`PanelInterface`](crate::PanelInterface).
//!
//! ## Command Structure
//!
//! Every command is a single byte sequence: the first byte is the opcode,
//! the remaining bytes are its parameters. Vendor registers are only
//! writable between [`UNLOCK_CMD_F0`] and [`LOCK_CMD_F0`]; parameters past
//! the first few bytes of a register are addressed by a preceding
//! [`GLOBAL_PARAM`] write that sets the offset.
//!
//! ## Example
//!
//! ```
//! use amoled_vrr::command::{self, CommandBatch};
//!
//! let mut batch = CommandBatch::new();
//! let _ = batch.push(&[command::GLOBAL_PARAM, 0x01, 0x9B, command::IRC_CTRL]);
//! let _ = batch.push(&[command::IRC_CTRL, 0x27]);
//! let _ = batch.push(&command::FREQ_UPDATE);
//! assert_eq!(batch.len(), 3);
//! assert!(batch.ends_with_update());
//! ```

use heapless::Vec;

// Standard DCS commands

/// Display off (0x28)
pub const SET_DISPLAY_OFF: u8 = 0x28;

/// Display on (0x29)
pub const SET_DISPLAY_ON: u8 = 0x29;

/// Set display brightness (0x51)
///
/// Requires 2 bytes: [level_MSB, level_LSB]
pub const SET_DISPLAY_BRIGHTNESS: u8 = 0x51;

/// Write control display (WRCTRLD, 0x53)
///
/// Requires 1 byte built from the `WRCTRLD_*` bits.
pub const WRITE_CONTROL_DISPLAY: u8 = 0x53;

/// WRCTRLD: dimming enabled
pub const WRCTRLD_DIMMING_BIT: u8 = 0x08;
/// WRCTRLD: local HBM enabled
pub const WRCTRLD_LOCAL_HBM_BIT: u8 = 0x10;
/// WRCTRLD: brightness control block enabled
pub const WRCTRLD_BCTRL_BIT: u8 = 0x20;
/// WRCTRLD: high brightness mode enabled
pub const WRCTRLD_HBM_BIT: u8 = 0xC0;

// Vendor registers

/// Level 2 access key register (0xF0)
pub const ACCESS_KEY: u8 = 0xF0;

/// Unlock vendor registers
pub const UNLOCK_CMD_F0: [u8; 3] = [ACCESS_KEY, 0x5A, 0x5A];

/// Lock vendor registers
pub const LOCK_CMD_F0: [u8; 3] = [ACCESS_KEY, 0xA5, 0xA5];

/// Global parameter offset (0xB0)
///
/// Requires 3 bytes: [offset_MSB, offset_LSB, target register]
pub const GLOBAL_PARAM: u8 = 0xB0;

/// TE control (0xB9)
///
/// Selects fixed or changeable TE and holds TE/TE2 edge timing.
pub const TE_CTRL: u8 = 0xB9;

/// Frame control (0xBD)
///
/// Early-exit, frame insertion and automatic frequency stepping tables.
pub const FRAME_CTRL: u8 = 0xBD;

/// IRC control (0x92)
pub const IRC_CTRL: u8 = 0x92;

/// Operating mode control (0xF2)
pub const OP_MODE_CTRL: u8 = 0xF2;

/// Frequency select (0x60)
///
/// Selects the operating speed, or the manual rate index in manual mode.
pub const FREQ_SELECT: u8 = 0x60;

/// AOD control (0x94)
pub const AOD_CTRL: u8 = 0x94;

/// Frequency update register (0xF7)
pub const FREQ_UPDATE_REG: u8 = 0xF7;

/// Frequency update marker
///
/// Latches every frame/frequency setting written since the previous update.
pub const FREQ_UPDATE: [u8; 2] = [FREQ_UPDATE_REG, 0x0F];

/// TE option: fixed TE
pub const TE_FIXED: u8 = 0x51;
/// TE option: changeable TE
pub const TE_CHANGEABLE: u8 = 0x04;

/// Longest command the engine emits, opcode included
pub const MAX_COMMAND_LEN: usize = 16;

/// Most commands a single reconcile may emit
pub const MAX_BATCH_LEN: usize = 40;

/// A single opcode plus parameters
pub type Command = Vec<u8, MAX_COMMAND_LEN>;

/// A batch ran out of room for another command
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CapacityError;

impl core::fmt::Display for CapacityError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "command batch capacity exceeded ({MAX_BATCH_LEN} commands of at most {MAX_COMMAND_LEN} bytes)"
        )
    }
}

impl core::error::Error for CapacityError {}

/// Ordered list of commands that must be sent as one unit
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CommandBatch {
    commands: Vec<Command, MAX_BATCH_LEN>,
}

impl CommandBatch {
    /// Create an empty batch
    pub const fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Append a command
    ///
    /// # Errors
    ///
    /// Returns [`CapacityError`] if the command is longer than
    /// [`MAX_COMMAND_LEN`] or the batch already holds [`MAX_BATCH_LEN`] commands.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), CapacityError> {
        let command = Command::from_slice(bytes).map_err(|_| CapacityError)?;
        self.commands.push(command).map_err(|_| CapacityError)
    }

    /// Number of commands in the batch
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the batch carries no commands
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Iterate over the commands in send order
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.commands.iter().map(|cmd| cmd.as_slice())
    }

    /// Whether the last command is the [`FREQ_UPDATE`] marker
    pub fn ends_with_update(&self) -> bool {
        self.commands
            .last()
            .is_some_and(|cmd| cmd.as_slice() == FREQ_UPDATE)
    }

    /// Position of the first command equal to `bytes`
    pub fn position(&self, bytes: &[u8]) -> Option<usize> {
        self.commands.iter().position(|cmd| cmd.as_slice() == bytes)
    }

    /// Whether any command starts with `prefix`
    pub fn contains_prefix(&self, prefix: &[u8]) -> bool {
        self.commands.iter().any(|cmd| cmd.starts_with(prefix))
    }
}
