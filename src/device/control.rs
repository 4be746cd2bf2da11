//! Control requests: get, set and reset a channel's capacity
//!
//! Request codes follow the Linux `_IO(type, nr)` layout: the magic byte in
//! bits 8..16 and the command number in bits 0..8.

use crate::core::MIN_CAPACITY;
use crate::error::{Result, ScdError};

/// Magic byte identifying scd control requests
pub const SCD_IOMAGIC: u8 = 0xDE;

/// Highest valid command number
pub const SCD_IOMAX: u8 = 2;

const NR_RESET: u8 = 0;
const NR_GET: u8 = 1;
const NR_SET: u8 = 2;

/// `_IO(type, nr)` without direction or size bits
pub const fn io(magic: u8, nr: u8) -> u32 {
    ((magic as u32) << 8) | nr as u32
}

/// Reset capacity to the device default
pub const SCD_IORBSIZE: u32 = io(SCD_IOMAGIC, NR_RESET);
/// Read the capacity in effect
pub const SCD_IOGBSIZE: u32 = io(SCD_IOMAGIC, NR_GET);
/// Store a capacity for the next allocation
pub const SCD_IOSBSIZE: u32 = io(SCD_IOMAGIC, NR_SET);

/// Decoded control operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOp {
    GetCapacity,
    SetCapacity(usize),
    ResetCapacity,
}

impl ControlOp {
    /// Validate and decode a raw request. `arg` is only read by SetCapacity.
    pub fn decode(cmd: u32, arg: usize) -> Result<Self> {
        let magic = (cmd >> 8) & 0xFF;
        let nr = cmd & 0xFF;

        if magic != SCD_IOMAGIC as u32 || cmd >> 16 != 0 {
            return Err(ScdError::invalid_argument(format!(
                "control request {:#x}: bad magic",
                cmd
            )));
        }
        if nr > SCD_IOMAX as u32 {
            return Err(ScdError::invalid_argument(format!(
                "control request {:#x}: unknown command {}",
                cmd, nr
            )));
        }

        match nr as u8 {
            NR_RESET => Ok(ControlOp::ResetCapacity),
            NR_GET => Ok(ControlOp::GetCapacity),
            _ if arg < MIN_CAPACITY => Err(ScdError::invalid_argument(format!(
                "capacity {} below minimum {}",
                arg, MIN_CAPACITY
            ))),
            _ => Ok(ControlOp::SetCapacity(arg)),
        }
    }

    /// Raw request code for this operation
    pub fn code(self) -> u32 {
        match self {
            ControlOp::GetCapacity => SCD_IOGBSIZE,
            ControlOp::SetCapacity(_) => SCD_IOSBSIZE,
            ControlOp::ResetCapacity => SCD_IORBSIZE,
        }
    }
}
