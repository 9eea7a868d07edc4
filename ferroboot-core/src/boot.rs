// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Bootloader orchestrator.
//!
//! At reset the bootloader selects among the candidate images, re-verifies
//! the chosen one, migrates a staged secondary image into the primary slot
//! when one is newer, and finally jumps to the application. The state
//! machine is:
//!
//! ```text
//! IDLE -> (trigger raised)        -> FALLBACK_APP -> reset
//!      -> (newer secondary image) -> UPDATE_APP   -> reset
//!      -> (else)                  -> RUN_APP      -> jump
//! ERROR is terminal; a failed update or fallback falls back to RUN_APP.
//! ```
//!
//! On real targets the jump and the reset never return; on hosts they are
//! recorded by the MCU port and surface as a [`BootOutcome`].

use log::{debug, error, info};

use crate::cipher::{CipherEngine, AES_BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::fallback::{self, FallbackTrigger, TriggerStatus};
use crate::image::{ImageHeader, CRC32, CRC32_DIGEST_SIZE, IMAGE_HEADER_SIZE};
use crate::mailbox::MailboxPort;
use crate::mcu::McuPort;
use crate::memory::{Memory, SlotId, WriteFlag};

/// Bootloader states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    Idle,
    RunApp,
    UpdateApp,
    FallbackApp,
    Error,
}

/// How the boot sequence handed control off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Jumped into the application at the given entry address.
    Jump(u32),
    /// A migration or fallback completed; a system reset was requested.
    Reset,
}

/// Bootloader user settings.
pub struct BootSettings {
    /// Primary memory first, secondary second.
    pub memories: Vec<Memory>,
    /// Enable the two-slot secondary layout and the fallback state.
    pub fallback: bool,
    /// Require strictly newer firmware versions during slot selection.
    pub anti_rollback: bool,
    /// Secondary storage is CBC-encrypted; migration decrypts it.
    pub ext_mem_encryption: bool,
    /// Decryption PSK; required with `ext_mem_encryption` + `fallback`.
    pub psk: Option<Vec<u8>>,
    /// Fallback request source; required with `fallback`.
    pub trigger: Option<Box<dyn FallbackTrigger>>,
    /// Cross-reset mailbox; required with `ext_mem_encryption` and no
    /// fallback (the PSK arrives from the updater through it).
    pub mailbox: Option<Box<dyn MailboxPort>>,
    pub mcu: Box<dyn McuPort>,
}

/// Bootloader context.
pub struct BootContext {
    state: BootState,
    memories: Vec<Memory>,
    fallback: bool,
    anti_rollback: bool,
    ext_mem_encryption: bool,
    psk: Option<Vec<u8>>,
    trigger: Option<Box<dyn FallbackTrigger>>,
    mailbox: Option<Box<dyn MailboxPort>>,
    mcu: Box<dyn McuPort>,
    selected: SlotId,
}

impl BootContext {
    /// Validate the settings and initialize the memories.
    pub fn new(settings: BootSettings) -> Result<Self> {
        let BootSettings {
            mut memories,
            fallback,
            anti_rollback,
            ext_mem_encryption,
            psk,
            mut trigger,
            mailbox,
            mcu,
        } = settings;

        if memories.len() < 2 {
            return Err(Error::InvalidParameters);
        }
        if fallback && memories[1].slot_count() < 2 {
            return Err(Error::InvalidParameters);
        }
        if ext_mem_encryption {
            if fallback && psk.is_none() {
                return Err(Error::InvalidParameters);
            }
            if !fallback && mailbox.is_none() {
                return Err(Error::InvalidParameters);
            }
        }

        for memory in &mut memories {
            memory.init()?;
        }

        if fallback {
            match &mut trigger {
                Some(trigger) => trigger.init()?,
                None => return Err(Error::InvalidParameters),
            }
        }

        Ok(Self {
            state: BootState::Idle,
            memories,
            fallback,
            anti_rollback,
            ext_mem_encryption,
            psk,
            trigger,
            mailbox,
            mcu,
            selected: SlotId::new(0, 0),
        })
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    /// Drive the state machine until control is handed off.
    pub fn run(&mut self) -> Result<BootOutcome> {
        loop {
            match self.state {
                BootState::Idle => self.task_idle()?,
                BootState::RunApp => return self.task_run_app(),
                BootState::UpdateApp => {
                    if let Some(outcome) = self.task_update_app()? {
                        return Ok(outcome);
                    }
                }
                BootState::FallbackApp => {
                    if let Some(outcome) = self.task_fallback_app() {
                        return Ok(outcome);
                    }
                }
                BootState::Error => {
                    error!("bootloader is in error state");
                    return Err(Error::InvalidState);
                }
            }
        }
    }

    fn task_idle(&mut self) -> Result<()> {
        if self.fallback {
            let status = match self.trigger.as_mut().unwrap().status() {
                Ok(status) => status,
                Err(e) => {
                    self.state = BootState::Error;
                    return Err(e);
                }
            };
            if status == TriggerStatus::Raised {
                info!("fallback requested");
                self.state = BootState::FallbackApp;
                return Ok(());
            }
        }

        match self.select_update_image_slot() {
            Ok(selected) => {
                debug!(
                    "selected slot: memory {} slot {}",
                    selected.memory, selected.slot
                );
                self.selected = selected;
                self.state = if selected != SlotId::new(0, 0) {
                    BootState::UpdateApp
                } else {
                    BootState::RunApp
                };
                Ok(())
            }
            Err(e) => {
                error!("no valid image found");
                self.state = BootState::Error;
                Err(e)
            }
        }
    }

    fn task_run_app(&mut self) -> Result<BootOutcome> {
        self.selected = SlotId::new(0, 0);
        info!("checking current application image");

        if let Err(e) = self.check_image(self.selected, false) {
            self.state = BootState::Error;
            return Err(e);
        }
        if let Err(e) = self.check_app_reset_vector(self.selected) {
            self.state = BootState::Error;
            return Err(e);
        }

        let entry = self.memories[0].slot(0)?.addr + self.mcu.vtor_offset();
        info!("booting application at {entry:#010x}");
        self.mcu.jump_to_application(entry);
        Ok(BootOutcome::Jump(entry))
    }

    fn task_update_app(&mut self) -> Result<Option<BootOutcome>> {
        info!("checking update application image");

        if self.check_image(self.selected, self.ext_mem_encryption).is_err() {
            // A broken staged image is not fatal: keep the current app.
            self.state = BootState::RunApp;
            return Ok(None);
        }

        if self.ext_mem_encryption && !self.fallback {
            if self.fetch_cipher_key().is_err() {
                error!("failed to retrieve cipher key");
                self.state = BootState::RunApp;
                return Ok(None);
            }
        }

        info!("starting update procedure");
        match self.update_app(self.selected) {
            Ok(()) => {
                info!("update procedure finished, rebooting");
                self.mcu.system_reset();
                Ok(Some(BootOutcome::Reset))
            }
            Err(e) => {
                self.state = BootState::Error;
                Err(e)
            }
        }
    }

    fn task_fallback_app(&mut self) -> Option<BootOutcome> {
        match self.fallback_task() {
            Ok(()) => {
                info!("fallback procedure finished, rebooting");
                self.mcu.system_reset();
                Some(BootOutcome::Reset)
            }
            Err(_) => {
                info!("fallback procedure failed");
                self.state = BootState::RunApp;
                None
            }
        }
    }

    /// Pick the most recent valid image: the current application, unless a
    /// secondary slot holds one with a strictly greater index (and, under
    /// anti-rollback, a strictly greater firmware version).
    fn select_update_image_slot(&self) -> Result<SlotId> {
        let current = ImageHeader::read_from_slot(&self.memories[0], 0)?;
        let mut best = SlotId::new(0, 0);
        let mut best_index = current.img_index;
        let mut best_vers = current.data_vers;

        let candidates = if self.fallback { 2 } else { 1 };
        for slot in 0..candidates.min(self.memories[1].slot_count()) {
            let Ok(header) = ImageHeader::read_from_slot(&self.memories[1], slot) else {
                continue;
            };
            let newer = if self.anti_rollback {
                header.img_index > best_index && header.data_vers > best_vers
            } else {
                header.img_index > best_index
            };
            if newer {
                best_index = header.img_index;
                best_vers = header.data_vers;
                best = SlotId::new(1, slot);
            }
        }
        Ok(best)
    }

    /// Re-verify the image stored in a slot: structural header check, size
    /// check, then CRC32 over the header tag, the IV when the payload is
    /// encrypted, and the payload, compared against the trailer.
    pub(crate) fn check_image(&self, slot: SlotId, encrypted: bool) -> Result<()> {
        let memory = &self.memories[slot.memory];
        let mut buf = [0u8; 512];

        memory.read_slot(slot.slot, 0, &mut buf[..IMAGE_HEADER_SIZE])?;
        let raw: &[u8; IMAGE_HEADER_SIZE] = buf[..IMAGE_HEADER_SIZE].try_into().unwrap();
        ImageHeader::check(raw).map_err(|e| {
            error!("image header is not valid");
            e
        })?;
        let header = ImageHeader::decode(raw);

        let iv_len = if encrypted { AES_BLOCK_SIZE } else { 0 };
        let body_len = header.data_size as usize + iv_len;
        let slot_size = memory.slot(slot.slot)?.size;
        if IMAGE_HEADER_SIZE + body_len + CRC32_DIGEST_SIZE > slot_size {
            error!("image size is invalid");
            return Err(Error::InvalidLength);
        }

        let mut digest = CRC32.digest();
        digest.update(&header.head_crc.to_le_bytes());

        let mut offset = IMAGE_HEADER_SIZE as u32;
        let mut remaining = body_len;
        while remaining > 0 {
            let n = usize::min(buf.len(), remaining);
            memory.read_slot(slot.slot, offset, &mut buf[..n])?;
            digest.update(&buf[..n]);
            offset += n as u32;
            remaining -= n;
        }
        let computed = digest.finalize().to_le_bytes();

        let mut trailer = [0u8; CRC32_DIGEST_SIZE];
        memory.read_slot(slot.slot, offset, &mut trailer)?;
        if trailer != computed {
            error!("image check data is not valid");
            return Err(Error::InvalidImageCheck);
        }
        Ok(())
    }

    /// Sanity-check the application reset vector: the word after the stack
    /// pointer must not be erased flash and must point inside the slot.
    fn check_app_reset_vector(&self, slot: SlotId) -> Result<()> {
        let memory = &self.memories[slot.memory];
        let slot_info = memory.slot(slot.slot)?;
        let offset = self.mcu.vtor_offset() + 4;

        let mut word = [0u8; 4];
        memory.read_slot(slot.slot, offset, &mut word)?;
        let reset_vector = u32::from_le_bytes(word);

        let in_slot = (slot_info.addr..slot_info.addr + slot_info.size as u32)
            .contains(&reset_vector);
        if reset_vector == 0xFFFF_FFFF || !in_slot {
            error!("invalid application reset vector {reset_vector:#010x}");
            return Err(Error::Failure);
        }
        Ok(())
    }

    /// Retrieve the staged-image PSK from the mailbox, then zero the
    /// mailbox to deny any later reader.
    fn fetch_cipher_key(&mut self) -> Result<()> {
        info!("retrieving cipher key from mailbox");
        let mailbox = self.mailbox.as_mut().ok_or(Error::InvalidParameters)?;
        let record = mailbox.get();
        mailbox.set(&crate::mailbox::BootMailBox::zeroed());

        if !record.check() {
            return Err(Error::Failure);
        }
        let size = record.psk_size as usize;
        if size == 0 || size > record.psk.len() {
            return Err(Error::Failure);
        }
        self.psk = Some(record.psk[..size].to_vec());
        Ok(())
    }

    /// Single-bank migration: copy (and decrypt) the image in `src` into
    /// the primary slot, recomputing the CRC32 trailer in flight.
    ///
    /// The primary slot afterwards holds header || payload || CRC32, with
    /// the trailer immediately after the payload and any minimum-write
    /// padding after the trailer.
    pub(crate) fn update_app(&mut self, src: SlotId) -> Result<()> {
        if src.memory == 0 {
            return Err(Error::InvalidParameters);
        }
        let (primary, secondary) = self.memories.split_at_mut(1);
        let primary = &mut primary[0];
        let secondary = &secondary[src.memory - 1];

        let mut header_buf = [0u8; IMAGE_HEADER_SIZE];
        secondary.read_slot(src.slot, 0, &mut header_buf)?;
        let header = ImageHeader::decode(&header_buf);

        let mut pos = primary.write_slot(0, 0, &header_buf, WriteFlag::ResetAndContinue)? as u32;

        let mut digest = CRC32.digest();
        digest.update(&header_buf[60..64]);

        let mut read_offset = IMAGE_HEADER_SIZE as u32;
        let mut cipher = if self.ext_mem_encryption {
            let mut iv = [0u8; AES_BLOCK_SIZE];
            secondary.read_slot(src.slot, read_offset, &mut iv)?;
            read_offset += AES_BLOCK_SIZE as u32;
            let psk = self.psk.as_ref().ok_or(Error::InvalidParameters)?;
            let mut engine = CipherEngine::new(psk)?;
            engine.set_iv(&iv)?;
            Some(engine)
        } else {
            None
        };

        let mut buf = [0u8; 512];
        let mut remaining = header.data_size as usize;
        while remaining > 0 {
            let n = usize::min(buf.len(), remaining);
            secondary.read_slot(src.slot, read_offset, &mut buf[..n])?;
            if let Some(cipher) = &mut cipher {
                cipher.decrypt(&mut buf[..n])?;
            }
            digest.update(&buf[..n]);
            pos += primary.write_slot(0, pos, &buf[..n], WriteFlag::Continue)? as u32;
            read_offset += n as u32;
            remaining -= n;
        }

        let trailer = digest.finalize().to_le_bytes();
        pos += primary.write_slot(0, pos, &trailer, WriteFlag::Continue)? as u32;
        primary.write_slot(0, pos, &[], WriteFlag::Flush)?;
        Ok(())
    }

    /// Two-slot fallback: verify all three images, erase the secondary
    /// image equivalent to the current application, and migrate the older
    /// backup image back into the primary slot.
    fn fallback_task(&mut self) -> Result<()> {
        self.check_image(SlotId::new(0, 0), false)?;
        self.check_image(SlotId::new(1, 0), self.ext_mem_encryption)?;
        self.check_image(SlotId::new(1, 1), self.ext_mem_encryption)?;

        let equivalent = fallback::find_slot_with_equivalent_image(&self.memories)
            .map_err(|_| Error::Aborted)?;
        let backup = if equivalent == 0 { 1 } else { 0 };

        // No backup older than the running application means nothing to
        // revert to.
        let ordering = fallback::compare_slot_images(&self.memories, (1, backup), (0, 0))?;
        if ordering != core::cmp::Ordering::Less {
            return Err(Error::Aborted);
        }

        let size = self.memories[1].slot(equivalent)?.size;
        self.memories[1].erase_slot(equivalent, 0, size)?;

        self.update_app(SlotId::new(1, backup))
    }
}
