// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Host-simulated flash memory.
//!
//! [`RamFlashDriver`] models a sector-erasable flash in a heap buffer. The
//! backing storage is shared (`Rc<RefCell<..>>`) so a test harness can keep a
//! handle across simulated resets: the updater writes through one driver
//! instance, the "rebooted" bootloader reads the same bytes through another.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::flash::{FlashDriver, FlashFlags, FlashInfo, FlashStatus};

/// Shared backing storage of a simulated flash.
pub type RamFlashStorage = Rc<RefCell<Vec<u8>>>;

/// In-RAM flash driver for host tests and demos.
pub struct RamFlashDriver {
    info: FlashInfo,
    sector_size: usize,
    storage: RamFlashStorage,
}

impl RamFlashDriver {
    /// Create a single-bank simulated flash, erased to `0xFF`.
    pub fn new(addr: u32, size: usize, write_size: usize, sector_size: usize) -> Self {
        let storage = Rc::new(RefCell::new(vec![0xFF; size]));
        Self::with_storage(addr, size, write_size, sector_size, storage)
    }

    /// Create a simulated flash over existing backing storage.
    pub fn with_storage(
        addr: u32,
        size: usize,
        write_size: usize,
        sector_size: usize,
        storage: RamFlashStorage,
    ) -> Self {
        Self {
            info: FlashInfo {
                name: "ram-flash",
                addr,
                size,
                write_size,
                read_size: 1,
                dual_bank: false,
                bank_size: 0,
                bank1_addr: 0,
                bank2_addr: 0,
                flags: FlashFlags::empty(),
            },
            sector_size,
            storage,
        }
    }

    /// Mark the memory as dual-bank, split in two equal halves.
    pub fn dual_bank(mut self, flags: FlashFlags) -> Self {
        let bank_size = self.info.size / 2;
        self.info.dual_bank = true;
        self.info.bank_size = bank_size;
        self.info.bank1_addr = self.info.addr;
        self.info.bank2_addr = self.info.addr + bank_size as u32;
        self.info.flags = flags;
        self
    }

    /// Handle on the backing storage, valid across driver instances.
    pub fn storage(&self) -> RamFlashStorage {
        Rc::clone(&self.storage)
    }

    fn offset(&self, addr: u32, len: usize) -> Result<usize> {
        let start = addr.checked_sub(self.info.addr).ok_or(Error::InvalidAddress)? as usize;
        if start + len > self.info.size {
            return Err(Error::InvalidAddress);
        }
        Ok(start)
    }
}

impl FlashDriver for RamFlashDriver {
    fn init(&mut self) -> Result<()> {
        if self.storage.borrow().len() != self.info.size {
            return Err(Error::Failure);
        }
        Ok(())
    }

    fn info(&self) -> Result<FlashInfo> {
        Ok(self.info.clone())
    }

    fn status(&self) -> Result<FlashStatus> {
        Ok(FlashStatus::Ok)
    }

    fn read(&self, addr: u32, data: &mut [u8]) -> Result<()> {
        let start = self.offset(addr, data.len())?;
        data.copy_from_slice(&self.storage.borrow()[start..start + data.len()]);
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        if addr as usize % self.info.write_size != 0 || data.len() % self.info.write_size != 0 {
            return Err(Error::Failure);
        }
        let start = self.offset(addr, data.len())?;
        self.storage.borrow_mut()[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn erase(&mut self, addr: u32, len: usize) -> Result<()> {
        if !self.is_sector_addr(addr) || len == 0 {
            return Err(Error::Failure);
        }
        // Widen to whole sectors covering [addr, addr + len).
        let sectors = len.div_ceil(self.sector_size);
        let start = self.offset(addr, sectors * self.sector_size)?;
        self.storage.borrow_mut()[start..start + sectors * self.sector_size].fill(0xFF);
        Ok(())
    }

    fn swap_banks(&mut self) -> Result<()> {
        if !self.info.dual_bank {
            return Err(Error::NotImplemented);
        }
        let bank = self.info.bank_size;
        let mut storage = self.storage.borrow_mut();
        let (low, high) = storage.split_at_mut(bank);
        low.swap_with_slice(&mut high[..bank]);
        Ok(())
    }

    fn is_sector_addr(&self, addr: u32) -> bool {
        addr >= self.info.addr && (addr - self.info.addr) as usize % self.sector_size == 0
    }

    fn next_sector_addr(&self, addr: u32) -> Result<u32> {
        let start = self.offset(addr, 0)?;
        let next = (start / self.sector_size + 1) * self.sector_size;
        if next >= self.info.size {
            return Err(Error::InvalidAddress);
        }
        Ok(self.info.addr + next as u32)
    }
}
