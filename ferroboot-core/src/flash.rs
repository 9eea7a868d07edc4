// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash driver abstraction.
//!
//! A [`FlashDriver`] wraps a sector-erasable, write-aligned non-volatile
//! memory. Drivers are supplied by the host (board support code or a host
//! simulation) and live for the program's lifetime. Optional capabilities
//! (bank swap, sector queries) default to [`Error::NotImplemented`].

use bitflags::bitflags;

use crate::error::{Error, Result};

bitflags! {
    /// Capability flags reported by [`FlashInfo`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FlashFlags: u32 {
        /// A bank swap becomes effective only after the next reset.
        const LATER_SWAP = 0x1;
    }
}

/// Static description of a flash memory.
#[derive(Debug, Clone)]
pub struct FlashInfo {
    /// Memory name, for diagnostics.
    pub name: &'static str,
    /// Start address of the memory.
    pub addr: u32,
    /// Total size in bytes.
    pub size: usize,
    /// Minimum write granularity in bytes (e.g. 2, 4, 16).
    pub write_size: usize,
    /// Read granularity in bytes.
    pub read_size: usize,
    /// Whether the memory is organized as two swappable banks.
    pub dual_bank: bool,
    /// Size of one bank (dual-bank memories only).
    pub bank_size: usize,
    /// Start address of bank 1.
    pub bank1_addr: u32,
    /// Start address of bank 2.
    pub bank2_addr: u32,
    /// Capability flags.
    pub flags: FlashFlags,
}

/// Flash peripheral status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashStatus {
    Ok,
    Busy,
    Error,
}

/// Capability interface of a flash memory driver.
///
/// `write` fails unless the address is aligned to the minimum write size and
/// the length is a multiple of it; callers that need byte-granular output go
/// through the staged slot writer in [`crate::memory`]. `erase` operates on
/// whole sectors covering the requested range and requires a sector-aligned
/// start address. Hardware errors surface as [`Error::Failure`]; any retry
/// policy belongs to the caller.
pub trait FlashDriver {
    fn init(&mut self) -> Result<()>;

    /// Release the peripheral. Memories are initialized once per reset and
    /// never deinitialized during normal operation.
    fn deinit(&mut self) -> Result<()> {
        Ok(())
    }

    fn info(&self) -> Result<FlashInfo>;

    fn status(&self) -> Result<FlashStatus>;

    fn read(&self, addr: u32, data: &mut [u8]) -> Result<()>;

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<()>;

    fn erase(&mut self, addr: u32, len: usize) -> Result<()>;

    /// Flip which bank is mapped to the execution address.
    fn swap_banks(&mut self) -> Result<()> {
        Err(Error::NotImplemented)
    }

    /// Whether `addr` is the first address of a sector.
    fn is_sector_addr(&self, addr: u32) -> bool;

    /// Start address of the sector following the one containing `addr`.
    fn next_sector_addr(&self, _addr: u32) -> Result<u32> {
        Err(Error::NotImplemented)
    }
}
