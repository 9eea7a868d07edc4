// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Shared fixtures: simulated flash layouts and image helpers.

#![allow(dead_code)]

use ferroboot_core::flash::FlashFlags;
use ferroboot_core::image::pack_version;
use ferroboot_core::memory::{Memory, MemoryRole, MemoryType, Slot, SlotContent};
use ferroboot_core::ram_flash::{RamFlashDriver, RamFlashStorage};
use ferroboot_core::verify::IntegrityAlgo;
use ferroboot_core::{ImageBuilder, TrailerSpec};

pub const PRIMARY_ADDR: u32 = 0x0800_0000;
pub const PRIMARY_SLOT_SIZE: usize = 64 * 1024;
pub const PRIMARY_WRITE_SIZE: usize = 8;
pub const SECTOR_SIZE: usize = 4096;

pub const BANK2_ADDR: u32 = 0x0801_0000;

pub const SECONDARY_ADDR: u32 = 0x9000_0000;
pub const SECONDARY_SLOT_SIZE: usize = 64 * 1024;
pub const SECONDARY_WRITE_SIZE: usize = 4;
pub const BACKUP_SLOT_ADDR: u32 = 0x9001_0000;

/// Dual-bank primary memory: slot 0 = active bank, slot 1 = inactive bank.
pub fn dual_bank_memory(flags: FlashFlags) -> (Memory, RamFlashStorage) {
    let driver = RamFlashDriver::new(
        PRIMARY_ADDR,
        2 * PRIMARY_SLOT_SIZE,
        PRIMARY_WRITE_SIZE,
        SECTOR_SIZE,
    )
    .dual_bank(flags);
    let storage = driver.storage();
    let memory = Memory::new(
        MemoryRole::Primary,
        MemoryType::Flash,
        Box::new(driver),
        vec![
            Slot::direct(SlotContent::APP, PRIMARY_ADDR, PRIMARY_SLOT_SIZE),
            Slot::direct(SlotContent::UPDATE, BANK2_ADDR, PRIMARY_SLOT_SIZE),
        ],
    );
    (memory, storage)
}

/// Single-bank primary memory over optionally pre-existing storage.
pub fn primary_memory(storage: Option<RamFlashStorage>) -> (Memory, RamFlashStorage) {
    let driver = match storage {
        Some(storage) => RamFlashDriver::with_storage(
            PRIMARY_ADDR,
            PRIMARY_SLOT_SIZE,
            PRIMARY_WRITE_SIZE,
            SECTOR_SIZE,
            storage,
        ),
        None => RamFlashDriver::new(
            PRIMARY_ADDR,
            PRIMARY_SLOT_SIZE,
            PRIMARY_WRITE_SIZE,
            SECTOR_SIZE,
        ),
    };
    let storage = driver.storage();
    let memory = Memory::new(
        MemoryRole::Primary,
        MemoryType::Flash,
        Box::new(driver),
        vec![Slot::direct(
            SlotContent::APP,
            PRIMARY_ADDR,
            PRIMARY_SLOT_SIZE,
        )],
    );
    (memory, storage)
}

/// Secondary memory with one update slot, plus a backup slot with fallback.
pub fn secondary_memory(
    fallback: bool,
    storage: Option<RamFlashStorage>,
) -> (Memory, RamFlashStorage) {
    let size = 2 * SECONDARY_SLOT_SIZE;
    let driver = match storage {
        Some(storage) => RamFlashDriver::with_storage(
            SECONDARY_ADDR,
            size,
            SECONDARY_WRITE_SIZE,
            SECTOR_SIZE,
            storage,
        ),
        None => RamFlashDriver::new(SECONDARY_ADDR, size, SECONDARY_WRITE_SIZE, SECTOR_SIZE),
    };
    let storage = driver.storage();
    let mut slots = vec![Slot::direct(
        SlotContent::UPDATE,
        SECONDARY_ADDR,
        SECONDARY_SLOT_SIZE,
    )];
    if fallback {
        slots.push(Slot::direct(
            SlotContent::BACKUP,
            BACKUP_SLOT_ADDR,
            SECONDARY_SLOT_SIZE,
        ));
    }
    let memory = Memory::new(
        MemoryRole::Secondary,
        MemoryType::Flash,
        Box::new(driver),
        slots,
    );
    (memory, storage)
}

/// A firmware payload whose vector table passes the bootloader's
/// reset-vector check when booted from `slot_addr` with a 64-byte VTOR
/// offset: word 0 is the stack pointer, word 1 the reset vector.
pub fn make_firmware(len: usize, slot_addr: u32) -> Vec<u8> {
    assert!(len >= 8);
    let mut firmware = Vec::with_capacity(len);
    firmware.extend_from_slice(&0x2000_8000u32.to_le_bytes());
    firmware.extend_from_slice(&(slot_addr + 64 + 9).to_le_bytes());
    firmware.extend((8..len).map(|i| (i % 251) as u8));
    firmware
}

/// Build a plain CRC32-checked image.
pub fn build_crc32_image(firmware: &[u8], index: u32, version: (u8, u8, u8)) -> Vec<u8> {
    let mut builder = ImageBuilder::new(TrailerSpec::Integrity(IntegrityAlgo::Crc32));
    builder.index = index;
    builder.firmware_version = pack_version(version.0, version.1, version.2);
    builder.build(firmware).unwrap()
}

/// Copy raw bytes into the simulated flash at an absolute address.
pub fn program(storage: &RamFlashStorage, base: u32, addr: u32, bytes: &[u8]) {
    let offset = (addr - base) as usize;
    storage.borrow_mut()[offset..offset + bytes.len()].copy_from_slice(bytes);
}

/// Read raw bytes from the simulated flash at an absolute address.
pub fn read_flash(storage: &RamFlashStorage, base: u32, addr: u32, len: usize) -> Vec<u8> {
    let offset = (addr - base) as usize;
    storage.borrow()[offset..offset + len].to_vec()
}
