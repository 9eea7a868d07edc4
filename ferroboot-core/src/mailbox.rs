// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Cross-reset mailbox.
//!
//! A fixed 128-byte record living in a dedicated, non-zeroed RAM section
//! shared between the updater and the bootloader across a reset. It carries
//! the PSK of the staged secondary image in exactly one configuration:
//! single-bank mode with encrypted secondary storage and no fallback.
//!
//! The placement of the cell (a linker `.boot_mailbox` section on real
//! targets, a shared buffer on hosts) is a platform concern behind
//! [`MailboxPort`]; this module only defines the record layout and its
//! lifecycle. The bootloader must zero the cell after reading it.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::image::pack_version;

/// Size of the mailbox RAM cell.
pub const BOOT_MAILBOX_SIZE: usize = 128;

/// Mailbox record version (1.0.0, packed).
pub const BOOT_MAILBOX_VERSION: u32 = pack_version(1, 0, 0);

/// Mailbox signature marker.
pub const BOOT_MAILBOX_SIGNATURE: u32 = 0x1B24_1671;

/// Largest PSK the mailbox can carry.
pub const BOOT_MAILBOX_PSK_MAX_SIZE: usize = 32;

/// The 128-byte mailbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootMailBox {
    pub version: u32,
    pub signature: u32,
    pub psk_size: u32,
    pub psk: [u8; BOOT_MAILBOX_PSK_MAX_SIZE],
}

impl BootMailBox {
    /// An all-zero record; used to deny later readers.
    pub fn zeroed() -> Self {
        Self {
            version: 0,
            signature: 0,
            psk_size: 0,
            psk: [0; BOOT_MAILBOX_PSK_MAX_SIZE],
        }
    }

    /// A valid record carrying the given PSK.
    pub fn with_psk(psk: &[u8]) -> Result<Self> {
        if psk.is_empty() || psk.len() > BOOT_MAILBOX_PSK_MAX_SIZE {
            return Err(Error::InvalidLength);
        }
        let mut record = Self {
            version: BOOT_MAILBOX_VERSION,
            signature: BOOT_MAILBOX_SIGNATURE,
            psk_size: psk.len() as u32,
            psk: [0; BOOT_MAILBOX_PSK_MAX_SIZE],
        };
        record.psk[..psk.len()].copy_from_slice(psk);
        Ok(record)
    }

    /// True iff version and signature both match.
    pub fn check(&self) -> bool {
        self.version == BOOT_MAILBOX_VERSION && self.signature == BOOT_MAILBOX_SIGNATURE
    }

    pub fn encode(&self) -> [u8; BOOT_MAILBOX_SIZE] {
        let mut buf = [0u8; BOOT_MAILBOX_SIZE];
        buf[0..4].copy_from_slice(&self.version.to_le_bytes());
        buf[4..8].copy_from_slice(&self.signature.to_le_bytes());
        buf[8..12].copy_from_slice(&self.psk_size.to_le_bytes());
        buf[12..44].copy_from_slice(&self.psk);
        buf
    }

    pub fn decode(buf: &[u8; BOOT_MAILBOX_SIZE]) -> Self {
        let mut psk = [0u8; BOOT_MAILBOX_PSK_MAX_SIZE];
        psk.copy_from_slice(&buf[12..44]);
        Self {
            version: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            signature: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            psk_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            psk,
        }
    }
}

/// Access to the platform's mailbox cell.
pub trait MailboxPort {
    fn get(&self) -> BootMailBox;
    fn set(&mut self, record: &BootMailBox);
}

/// Host-simulated mailbox cell; the backing RAM is shared so both "sides"
/// of a simulated reset observe the same bytes.
pub struct RamMailbox {
    ram: Rc<RefCell<[u8; BOOT_MAILBOX_SIZE]>>,
}

impl RamMailbox {
    pub fn new() -> Self {
        Self {
            ram: Rc::new(RefCell::new([0; BOOT_MAILBOX_SIZE])),
        }
    }

    /// A second port over the same cell.
    pub fn share(&self) -> Self {
        Self {
            ram: Rc::clone(&self.ram),
        }
    }

    /// Raw cell contents, for inspection.
    pub fn raw(&self) -> [u8; BOOT_MAILBOX_SIZE] {
        *self.ram.borrow()
    }
}

impl Default for RamMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxPort for RamMailbox {
    fn get(&self) -> BootMailBox {
        BootMailBox::decode(&self.ram.borrow())
    }

    fn set(&mut self, record: &BootMailBox) {
        *self.ram.borrow_mut() = record.encode();
    }
}
