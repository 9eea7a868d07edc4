// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Fallback trigger and slot comparison helpers.
//!
//! Fallback reverts the device to the previously running application using
//! the two secondary slots: the slot holding the image "equivalent" to the
//! broken current application (same image index) is erased, and the other
//! slot — the backup — is migrated back into the primary slot. The revert
//! is atomic in effect: any abort leaves all three images intact.

use crate::error::{Error, Result};
use crate::image::ImageHeader;
use crate::memory::Memory;

/// State of the fallback request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerStatus {
    Idle,
    Raised,
}

/// Host-supplied fallback request source (a button, a watchdog flag, ...).
pub trait FallbackTrigger {
    fn init(&mut self) -> Result<()>;
    fn status(&mut self) -> Result<TriggerStatus>;
}

/// Stub trigger for configurations built without a fallback request
/// source; both hooks report [`Error::NotImplemented`].
pub struct NoTrigger;

impl FallbackTrigger for NoTrigger {
    fn init(&mut self) -> Result<()> {
        Err(Error::NotImplemented)
    }

    fn status(&mut self) -> Result<TriggerStatus> {
        Err(Error::NotImplemented)
    }
}

/// Find the secondary slot whose image has the same index as the current
/// application image in the primary slot.
pub(crate) fn find_slot_with_equivalent_image(memories: &[Memory]) -> Result<usize> {
    let current = ImageHeader::read_from_slot(&memories[0], 0)?;

    for slot in 0..memories[1].slot_count() {
        let header = ImageHeader::read_from_slot(&memories[1], slot)?;
        if header.img_index == current.img_index {
            return Ok(slot);
        }
    }
    Err(Error::Failure)
}

/// Compare two slots by the index of the images they hold.
pub(crate) fn compare_slot_images(
    memories: &[Memory],
    a: (usize, usize),
    b: (usize, usize),
) -> Result<core::cmp::Ordering> {
    let header_a = ImageHeader::read_from_slot(&memories[a.0], a.1)?;
    let header_b = ImageHeader::read_from_slot(&memories[b.0], b.1)?;
    Ok(header_a.img_index.cmp(&header_b.img_index))
}
