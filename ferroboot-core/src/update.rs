// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Update orchestrator.
//!
//! [`UpdateContext`] owns the memories and the streaming image processor
//! for the lifetime of one update session: `new` → repeated [`process`]
//! calls → [`finalize`] → [`reboot`]. A session that fails after bytes have
//! reached the output slot scrubs the slot's header region, so the
//! bootloader's next slot scan cannot mistake the partial write for a valid
//! update image.
//!
//! [`process`]: UpdateContext::process
//! [`finalize`]: UpdateContext::finalize
//! [`reboot`]: UpdateContext::reboot

use log::{error, info};

use crate::cipher::{CipherEngine, AES_BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::flash::FlashFlags;
use crate::image::{ImageHeader, IMAGE_HEADER_SIZE};
use crate::mailbox::{BootMailBox, MailboxPort};
use crate::mcu::McuPort;
use crate::memory::{Memory, MemoryRole, SlotContent, SlotId};
use crate::process::{
    AntiRollbackCallback, ImageProcess, ImageState, InputImage, OutputImage, PROCESS_BUFFER_SIZE,
};
use crate::verify::{IntegrityAlgo, VerifyConfig, VerifyContext};

/// Random data generation hook, used to derive the output image IV.
pub type RandCallback = fn(&mut [u8]) -> Result<()>;

/// Update architecture of the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Write the received binary into the inactive primary bank, then swap.
    DualBank,
    /// Stage a re-encoded image in secondary storage; the bootloader
    /// migrates it into the primary slot after reset.
    SingleBank {
        /// Two secondary slots, one keeping a backup of the running image.
        fallback: bool,
    },
}

/// User settings for one update session.
pub struct UpdateSettings {
    pub mode: UpdateMode,
    /// Version of the currently running application (anti-rollback input).
    pub app_version: u32,
    /// Anti-rollback decision hook; `None` disables the check.
    pub anti_rollback: Option<AntiRollbackCallback>,
    /// Verification settings for the received image.
    pub input_verify: VerifyConfig,
    /// AES key of the received image; `None` when the input is plaintext.
    pub input_cipher_key: Option<Vec<u8>>,
    /// PSK used to encrypt the staged image (single-bank only).
    pub output_psk: Option<Vec<u8>>,
    /// RNG hook; required when `output_psk` is set.
    pub rand: Option<RandCallback>,
    /// Cross-reset mailbox; required for encrypted secondary storage
    /// without fallback.
    pub mailbox: Option<Box<dyn MailboxPort>>,
    pub mcu: Box<dyn McuPort>,
    /// Primary memory first; secondary second in single-bank mode.
    pub memories: Vec<Memory>,
}

/// Context of one update session.
pub struct UpdateContext {
    mode: UpdateMode,
    memories: Vec<Memory>,
    process: ImageProcess,
    output_psk: Option<Vec<u8>>,
    mailbox: Option<Box<dyn MailboxPort>>,
    mcu: Box<dyn McuPort>,
}

impl UpdateContext {
    /// Validate the settings, initialize the memories and set up the
    /// streaming processor.
    pub fn new(settings: UpdateSettings) -> Result<Self> {
        info!("initializing update session");

        let UpdateSettings {
            mode,
            app_version,
            anti_rollback,
            input_verify,
            input_cipher_key,
            output_psk,
            rand,
            mailbox,
            mcu,
            mut memories,
        } = settings;

        match mode {
            UpdateMode::DualBank => {
                if memories.is_empty() || memories[0].slot_count() < 2 {
                    return Err(Error::InvalidParameters);
                }
                if output_psk.is_some() {
                    // Output encryption exists for staged secondary images only.
                    return Err(Error::InvalidParameters);
                }
            }
            UpdateMode::SingleBank { fallback } => {
                let slots_needed = if fallback { 2 } else { 1 };
                if memories.len() < 2 || memories[1].slot_count() < slots_needed {
                    return Err(Error::InvalidParameters);
                }
                if output_psk.is_some() {
                    if rand.is_none() {
                        return Err(Error::InvalidParameters);
                    }
                    if !fallback && mailbox.is_none() {
                        return Err(Error::InvalidParameters);
                    }
                }
            }
        }

        for memory in &mut memories {
            memory.init().map_err(|e| {
                error!("memory initialization failed");
                e
            })?;
        }

        let input_cipher = match &input_cipher_key {
            Some(key) => Some(CipherEngine::new(key)?),
            None => None,
        };
        let input = InputImage::new(VerifyContext::new(&input_verify)?, input_cipher);

        let (slot, binary) = select_update_slot(&memories, mode)?;
        match mode {
            UpdateMode::DualBank => {
                memories[slot.memory]
                    .slot_mut(slot.slot)?
                    .content
                    .insert(SlotContent::BINARY);
            }
            UpdateMode::SingleBank { .. } => {
                memories[slot.memory]
                    .slot_mut(slot.slot)?
                    .content
                    .remove(SlotContent::BINARY);
            }
        }

        let (output_cipher, output_verify) = match mode {
            UpdateMode::DualBank => (None, None),
            UpdateMode::SingleBank { .. } => {
                let cipher = match &output_psk {
                    Some(psk) => {
                        let mut engine = CipherEngine::new(psk)?;
                        let mut iv = [0u8; AES_BLOCK_SIZE];
                        rand.unwrap()(&mut iv)?;
                        engine.set_iv(&iv)?;
                        Some(engine)
                    }
                    None => None,
                };
                // The staged image always carries a CRC32 trailer.
                let verify = VerifyContext::new(&VerifyConfig::Integrity {
                    algo: IntegrityAlgo::Crc32,
                })?;
                (cipher, Some(verify))
            }
        };

        let mut output = OutputImage::new(slot, binary, output_cipher, output_verify);
        if let UpdateMode::SingleBank { .. } = mode {
            output.new_image_index = next_image_index(&memories)?;
        }

        Ok(Self {
            mode,
            memories,
            process: ImageProcess {
                input,
                output,
                current_app_version: app_version,
                anti_rollback,
            },
            output_psk,
            mailbox,
            mcu,
        })
    }

    /// Consume a chunk of the received image byte stream.
    pub fn process(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidParameters);
        }
        let mut data = data;
        while !data.is_empty() {
            if self.process.input.buf_len >= PROCESS_BUFFER_SIZE {
                error!("input buffer would overflow");
                return Err(Error::BufferOverflow);
            }
            let n = usize::min(data.len(), PROCESS_BUFFER_SIZE - self.process.input.buf_len);
            let len = self.process.input.buf_len;
            self.process.input.buf[len..len + n].copy_from_slice(&data[..n]);
            self.process.input.buf_len += n;
            data = &data[n..];

            if let Err(e) = self.process.process_input(&mut self.memories) {
                self.scrub_output_slot();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Validate the fully received image and arrange the activation step.
    ///
    /// On success the session moves to the reboot state: in dual-bank mode
    /// an immediate bank swap is performed unless the flash defers swaps to
    /// the next reset; in single-bank mode the PSK is handed to the
    /// bootloader through the mailbox when the staged image is encrypted
    /// and no fallback copy exists.
    pub fn finalize(&mut self) -> Result<()> {
        info!("finalizing firmware update");

        if self.process.input.state != ImageState::ValidateApp {
            error!("image is not ready for verification");
            self.scrub_output_slot();
            return Err(Error::ImageNotReady);
        }

        let check_data = core::mem::take(&mut self.process.input.check_data);
        if self.process.input.verify.confirm(&check_data).is_err() {
            error!("firmware image is invalid");
            self.scrub_output_slot();
            self.process.input.state = ImageState::Idle;
            return Err(Error::InvalidImageApp);
        }
        info!("firmware image is valid");

        match self.mode {
            UpdateMode::DualBank => {
                let primary = memory_by_role(&self.memories, MemoryRole::Primary)?;
                let info = self.memories[primary].info()?;
                if !info.flags.contains(FlashFlags::LATER_SWAP) {
                    self.memories[primary].swap_banks()?;
                }
            }
            UpdateMode::SingleBank { fallback } => {
                if let (Some(psk), false) = (&self.output_psk, fallback) {
                    let mailbox = self.mailbox.as_mut().ok_or(Error::InvalidParameters)?;
                    mailbox.set(&BootMailBox::with_psk(psk)?);
                }
            }
        }

        self.process.input.state = ImageState::AppReboot;
        Ok(())
    }

    /// Perform the deferred bank swap if one is pending, then reset.
    /// On real hardware this does not return.
    pub fn reboot(&mut self) -> Result<()> {
        info!("rebooting to complete the update");

        if self.process.input.state != ImageState::AppReboot {
            return Err(Error::InvalidState);
        }
        if self.mode == UpdateMode::DualBank {
            let info = self.memories[0].info()?;
            if info.flags.contains(FlashFlags::LATER_SWAP) {
                self.memories[0].swap_banks()?;
            }
        }
        self.mcu.system_reset();
        Ok(())
    }

    fn scrub_output_slot(&mut self) {
        let slot = self.process.output.slot;
        if self.memories[slot.memory]
            .erase_slot(slot.slot, 0, IMAGE_HEADER_SIZE)
            .is_err()
        {
            error!("failed to scrub the output slot header");
        }
    }
}

/// Pick the slot that receives the output image.
///
/// Dual bank: always the second primary slot (the inactive bank). Single
/// bank without fallback: the only secondary slot. Single bank with
/// fallback: whichever secondary slot does not hold the backup of the
/// running application — the slot whose header does not parse, or whose
/// image index differs from the primary image's.
fn select_update_slot(memories: &[Memory], mode: UpdateMode) -> Result<(SlotId, bool)> {
    match mode {
        UpdateMode::DualBank => Ok((SlotId::new(0, 1), true)),
        UpdateMode::SingleBank { fallback: false } => Ok((SlotId::new(1, 0), false)),
        UpdateMode::SingleBank { fallback: true } => {
            let primary = ImageHeader::read_from_slot(&memories[0], 0)?;
            match ImageHeader::read_from_slot(&memories[1], 0) {
                Ok(header) if header.img_index == primary.img_index => {
                    Ok((SlotId::new(1, 1), false))
                }
                Ok(_) | Err(Error::InvalidImageHeader) => Ok((SlotId::new(1, 0), false)),
                Err(e) => Err(e),
            }
        }
    }
}

/// Output image index: current application image index plus one.
fn next_image_index(memories: &[Memory]) -> Result<u32> {
    let app_slot = memories[0].slot_by_content(SlotContent::APP)?;
    let header = ImageHeader::read_from_slot(&memories[0], app_slot)?;
    Ok(header.img_index + 1)
}

/// Role lookup over an ordered memory list.
pub fn memory_by_role(memories: &[Memory], role: MemoryRole) -> Result<usize> {
    memories
        .iter()
        .position(|m| m.role() == role)
        .ok_or(Error::Failure)
}
