//! The data bus the CPU is attached to.
//!
//! The 6502 sees memory as a 64 KiB address space reached through an 8-bit
//! data bus. Addresses travel as a little-endian `(lo, hi)` byte pair; the
//! bus implementation decides what lives where (RAM, ROM, memory-mapped
//! I/O). Every access may fail, e.g. when the address decodes to nothing.
//! A failed access aborts the current instruction and is surfaced from
//! [`step`](crate::Mos6502::step) as a bus error.

use std::fmt;

/// An 8-bit data bus with a 16-bit little-endian address width.
///
/// Implemented by the caller. One `read` or `write` corresponds to one bus
/// cycle on the real part; the CPU accounts for that in the cycle totals it
/// reports.
pub trait Bus {
    /// Read a byte from `(lo, hi)`.
    fn read(&mut self, lo: u8, hi: u8) -> Result<u8, BusFault>;

    /// Write a byte to `(lo, hi)`.
    fn write(&mut self, lo: u8, hi: u8, value: u8) -> Result<(), BusFault>;
}

/// An aborted bus access.
///
/// Carries the message the bus implementation produced. The CPU does not
/// interpret it; it is handed back to the caller unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusFault {
    message: String,
}

impl BusFault {
    /// Create a fault with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message the bus reported.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for BusFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for BusFault {}
