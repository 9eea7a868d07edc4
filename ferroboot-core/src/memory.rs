// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Memory and slot model.
//!
//! A [`Memory`] is a named region backed by one flash driver and divided into
//! typed, non-overlapping [`Slot`]s. Slot writes go through a staging buffer
//! that only emits bursts aligned to the driver's minimum write size, so the
//! streaming layers above can produce byte-granular output.

use bitflags::bitflags;
use log::{error, trace};

use crate::error::{Error, Result};
use crate::flash::{FlashDriver, FlashInfo};

/// Largest minimum-write granularity supported by the staged writer.
pub const MAX_WRITE_BLOCK_SIZE: usize = 64;

/// Role of a memory in the update scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRole {
    /// The flash the application executes from.
    Primary,
    /// Staging storage for update and backup images (single-bank mode).
    Secondary,
}

/// Kind of storage behind a memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Flash,
    /// File-system backed memory (host side); not wired up in this crate.
    Fs,
}

/// Kind of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotType {
    /// A flash offset/size interval.
    Direct,
    /// A file path (host side); not wired up in this crate.
    File,
}

bitflags! {
    /// What a slot is allowed to hold.
    ///
    /// `BINARY` means the slot stores a bare firmware binary with no image
    /// wrapping; without it the slot stores a full image (header, optional
    /// IV, payload, check trailer).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SlotContent: u8 {
        const APP           = 0x01;
        const UPDATE        = 0x02;
        const BACKUP        = 0x04;
        const BINARY        = 0x08;
        const DATA          = 0x10;
        const CONFIGURATION = 0x20;
        const BOOT          = 0x40;
    }
}

/// Write sequencing flag for the staged slot writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteFlag {
    /// Append; emit only full min-write blocks.
    Continue,
    /// Append, then zero-pad and commit whatever is staged.
    Flush,
    /// Discard any staged bytes from a previous session, then append.
    ResetAndContinue,
}

/// A sector-aligned interval inside a memory.
#[derive(Debug, Clone)]
pub struct Slot {
    pub slot_type: SlotType,
    pub content: SlotContent,
    pub addr: u32,
    pub size: usize,
}

impl Slot {
    pub fn direct(content: SlotContent, addr: u32, size: usize) -> Self {
        Self {
            slot_type: SlotType::Direct,
            content,
            addr,
            size,
        }
    }
}

/// Identifies a slot inside an ordered memory list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotId {
    pub memory: usize,
    pub slot: usize,
}

impl SlotId {
    pub const fn new(memory: usize, slot: usize) -> Self {
        Self { memory, slot }
    }
}

/// A driver-backed memory and its slots.
pub struct Memory {
    role: MemoryRole,
    mem_type: MemoryType,
    driver: Box<dyn FlashDriver>,
    slots: Vec<Slot>,
    staging: Staging,
}

struct Staging {
    buf: [u8; MAX_WRITE_BLOCK_SIZE],
    len: usize,
}

impl Memory {
    pub fn new(
        role: MemoryRole,
        mem_type: MemoryType,
        driver: Box<dyn FlashDriver>,
        slots: Vec<Slot>,
    ) -> Self {
        Self {
            role,
            mem_type,
            driver,
            slots,
            staging: Staging {
                buf: [0; MAX_WRITE_BLOCK_SIZE],
                len: 0,
            },
        }
    }

    /// Initialize the driver and validate the slot layout.
    ///
    /// Every direct slot must start on a sector boundary, lie inside the
    /// memory's address range, and be disjoint from every other slot.
    pub fn init(&mut self) -> Result<()> {
        match self.mem_type {
            MemoryType::Flash => {}
            MemoryType::Fs => return Err(Error::UnknownMemoryType),
        }

        self.driver
            .init()
            .map_err(|_| Error::MemoryDriverInitFailed)?;
        let info = self.info()?;

        if info.write_size == 0 || info.write_size > MAX_WRITE_BLOCK_SIZE {
            return Err(Error::InvalidValue);
        }

        for slot in &self.slots {
            if slot.slot_type != SlotType::Direct {
                return Err(Error::UnknownSlotType);
            }
            if !self.driver.is_sector_addr(slot.addr) {
                error!("slot at {:#010x} is not sector aligned", slot.addr);
                return Err(Error::InvalidAddress);
            }
            let end = slot.addr as u64 + slot.size as u64;
            if (slot.addr as u64) < info.addr as u64 || end > info.addr as u64 + info.size as u64 {
                return Err(Error::InvalidAddress);
            }
        }

        for (i, a) in self.slots.iter().enumerate() {
            for b in self.slots.iter().skip(i + 1) {
                if slots_overlap(a, b) {
                    return Err(Error::SlotsOverlap);
                }
            }
        }

        Ok(())
    }

    pub fn role(&self) -> MemoryRole {
        self.role
    }

    pub fn info(&self) -> Result<FlashInfo> {
        self.driver.info().map_err(|_| Error::MemoryDriverGetInfoFailed)
    }

    pub fn status(&self) -> Result<crate::flash::FlashStatus> {
        self.driver
            .status()
            .map_err(|_| Error::MemoryDriverGetStatusFailed)
    }

    pub fn slot(&self, index: usize) -> Result<&Slot> {
        self.slots.get(index).ok_or(Error::InvalidParameters)
    }

    pub fn slot_mut(&mut self, index: usize) -> Result<&mut Slot> {
        self.slots.get_mut(index).ok_or(Error::InvalidParameters)
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// First slot whose content mask contains all the requested bits.
    pub fn slot_by_content(&self, content: SlotContent) -> Result<usize> {
        self.slots
            .iter()
            .position(|s| s.content.contains(content))
            .ok_or(Error::Failure)
    }

    pub fn read_slot(&self, index: usize, offset: u32, data: &mut [u8]) -> Result<()> {
        let slot = self.slot(index)?;
        if offset as usize + data.len() > slot.size {
            return Err(Error::InvalidLength);
        }
        self.driver
            .read(slot.addr + offset, data)
            .map_err(|_| Error::MemoryDriverReadFailed)
    }

    /// Staged write into a slot.
    ///
    /// `offset` is the count of bytes already committed to flash for this
    /// stream (bytes held in the staging buffer are not committed). Returns
    /// the number of bytes committed by this call. After a
    /// [`WriteFlag::Flush`] the staging buffer is empty and the slot holds
    /// exactly the streamed bytes, zero-padded inside the last min-write
    /// block.
    pub fn write_slot(
        &mut self,
        index: usize,
        offset: u32,
        data: &[u8],
        flag: WriteFlag,
    ) -> Result<usize> {
        let slot = self.slots.get(index).ok_or(Error::InvalidParameters)?.clone();
        if slot.slot_type != SlotType::Direct {
            return Err(Error::UnknownSlotType);
        }
        let info = self.info()?;
        let block = info.write_size;

        if flag == WriteFlag::ResetAndContinue {
            self.staging.len = 0;
        }

        let mut data = data;
        let mut offset = offset;
        let mut written = 0usize;

        while !data.is_empty() {
            let n = usize::min(data.len(), block - self.staging.len);
            self.staging.buf[self.staging.len..self.staging.len + n].copy_from_slice(&data[..n]);
            self.staging.len += n;
            data = &data[n..];

            if self.staging.len == block {
                self.commit_block(&slot, offset, block)?;
                written += block;
                offset += block as u32;
            }
        }

        if flag == WriteFlag::Flush && self.staging.len != 0 {
            self.staging.buf[self.staging.len..block].fill(0);
            self.commit_block(&slot, offset, block)?;
            written += block;
        }

        Ok(written)
    }

    fn commit_block(&mut self, slot: &Slot, offset: u32, block: usize) -> Result<()> {
        if offset as usize + block > slot.size {
            return Err(Error::BufferOverflow);
        }
        trace!(
            "committing {} bytes at {:#010x}",
            block,
            slot.addr + offset
        );
        self.driver
            .write(slot.addr + offset, &self.staging.buf[..block])
            .map_err(|_| Error::MemoryDriverWriteFailed)?;
        self.staging.len = 0;
        Ok(())
    }

    /// Erase whole sectors covering `[offset, offset + len)` of a slot.
    pub fn erase_slot(&mut self, index: usize, offset: u32, len: usize) -> Result<()> {
        let slot = self.slots.get(index).ok_or(Error::InvalidParameters)?;
        if offset as usize + len > slot.size {
            return Err(Error::InvalidLength);
        }
        let addr = slot.addr + offset;
        self.driver
            .erase(addr, len)
            .map_err(|_| Error::MemoryDriverEraseFailed)
    }

    pub fn swap_banks(&mut self) -> Result<()> {
        self.driver.swap_banks()
    }
}

fn slots_overlap(a: &Slot, b: &Slot) -> bool {
    let (a_start, a_end) = (a.addr as u64, a.addr as u64 + a.size as u64);
    let (b_start, b_end) = (b.addr as u64, b.addr as u64 + b.size as u64);
    a_start < b_end && b_start < a_end
}
