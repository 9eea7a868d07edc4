// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Streaming image processing.
//!
//! The input machine consumes the received update image byte stream
//! (header, optional IV, payload, check trailer) and verifies it on the
//! fly. Decrypted payload bytes are routed to the output producer, which
//! either writes a bare binary into the inactive flash bank (dual-bank
//! mode) or re-encodes a self-contained, optionally encrypted image into
//! secondary storage (single-bank mode).

use log::{debug, info, trace};

use crate::cipher::{CipherEngine, AES_BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::image::{ImageHeader, CRC32_DIGEST_SIZE, IMAGE_HEADER_SIZE};
use crate::memory::{Memory, SlotId, WriteFlag};
use crate::verify::VerifyContext;

/// Size of the streaming buffers of both machines.
pub const PROCESS_BUFFER_SIZE: usize = 128;

/// States of the input and output image machines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    Idle,
    RecvAppHeader,
    RecvAppData,
    RecvAppCheck,
    ValidateApp,
    AppReboot,
    WriteAppInit,
    WriteAppHeader,
    WriteAppData,
    WriteAppEnd,
}

/// Anti-rollback decision hook: current version, candidate version.
pub type AntiRollbackCallback = fn(u32, u32) -> bool;

/// Default anti-rollback policy: accept only strictly newer versions.
pub fn accept_strictly_newer(current: u32, candidate: u32) -> bool {
    candidate > current
}

/// Input side: receives and verifies the update image.
pub(crate) struct InputImage {
    pub buf: [u8; PROCESS_BUFFER_SIZE],
    pub buf_len: usize,
    pub state: ImageState,
    pub firmware_length: usize,
    pub written: usize,
    pub verify: VerifyContext,
    pub cipher: Option<CipherEngine>,
    pub iv_retrieved: bool,
    pub check_data: Vec<u8>,
    pub check_data_size: usize,
}

impl InputImage {
    pub fn new(verify: VerifyContext, cipher: Option<CipherEngine>) -> Self {
        let check_data_size = verify.check_data_size();
        Self {
            buf: [0; PROCESS_BUFFER_SIZE],
            buf_len: 0,
            state: ImageState::RecvAppHeader,
            firmware_length: 0,
            written: 0,
            verify,
            cipher,
            iv_retrieved: false,
            check_data: Vec::with_capacity(check_data_size),
            check_data_size,
        }
    }

    /// Drop the first `n` bytes of the buffer.
    fn consume(&mut self, n: usize) {
        self.buf.copy_within(n..self.buf_len, 0);
        self.buf_len -= n;
    }
}

/// Output side: produces the binary or the staged image.
pub(crate) struct OutputImage {
    pub buf: [u8; PROCESS_BUFFER_SIZE],
    pub buf_len: usize,
    pub state: ImageState,
    /// Slot receiving the output.
    pub slot: SlotId,
    /// Bare binary output (no image wrapping).
    pub binary: bool,
    pub new_image_index: u32,
    pub firmware_length: usize,
    pub written: usize,
    /// Committed byte count, passed back to the staged writer.
    pub pos: u32,
    pub cipher: Option<CipherEngine>,
    pub verify: Option<VerifyContext>,
}

impl OutputImage {
    pub fn new(
        slot: SlotId,
        binary: bool,
        cipher: Option<CipherEngine>,
        verify: Option<VerifyContext>,
    ) -> Self {
        Self {
            buf: [0; PROCESS_BUFFER_SIZE],
            buf_len: 0,
            state: if binary {
                ImageState::WriteAppInit
            } else {
                ImageState::WriteAppHeader
            },
            slot,
            binary,
            new_image_index: 0,
            firmware_length: 0,
            written: 0,
            pos: 0,
            cipher,
            verify,
        }
    }

    /// Trailer size of the produced image (zero for bare binaries).
    pub fn check_data_size(&self) -> usize {
        self.verify.as_ref().map_or(0, |v| v.check_data_size())
    }

    pub fn process(&mut self, memory: &mut Memory, data: &[u8]) -> Result<()> {
        if self.binary {
            self.process_binary(memory, data)
        } else {
            self.process_image(memory, data)
        }
    }

    /// Pass-through producer: keep only the firmware binary.
    fn process_binary(&mut self, memory: &mut Memory, data: &[u8]) -> Result<()> {
        let mut data = data;
        while !data.is_empty() {
            let n = usize::min(data.len(), PROCESS_BUFFER_SIZE - self.buf_len);
            self.buf[self.buf_len..self.buf_len + n].copy_from_slice(&data[..n]);
            self.buf_len += n;
            data = &data[n..];

            match self.state {
                ImageState::WriteAppInit => {
                    self.pos = 0;
                    let w = memory.write_slot(
                        self.slot.slot,
                        self.pos,
                        &self.buf[..self.buf_len],
                        WriteFlag::ResetAndContinue,
                    )?;
                    self.pos += w as u32;
                    self.written += self.buf_len;
                    self.buf_len = 0;
                    self.state = ImageState::WriteAppData;
                    self.finish_binary_if_done(memory)?;
                }
                ImageState::WriteAppData => {
                    let w = memory.write_slot(
                        self.slot.slot,
                        self.pos,
                        &self.buf[..self.buf_len],
                        WriteFlag::Continue,
                    )?;
                    self.pos += w as u32;
                    self.written += self.buf_len;
                    self.buf_len = 0;
                    self.finish_binary_if_done(memory)?;
                }
                _ => return Err(Error::InvalidState),
            }
            trace!("output written {:#x}/{:#x}", self.written, self.firmware_length);
        }
        Ok(())
    }

    fn finish_binary_if_done(&mut self, memory: &mut Memory) -> Result<()> {
        if self.state == ImageState::WriteAppData && self.written == self.firmware_length {
            let w = memory.write_slot(self.slot.slot, self.pos, &[], WriteFlag::Flush)?;
            self.pos += w as u32;
            self.state = ImageState::WriteAppEnd;
        }
        Ok(())
    }

    /// Re-encoding producer: emit header, optional IV, (optionally
    /// encrypted) payload and a CRC32 trailer.
    fn process_image(&mut self, memory: &mut Memory, data: &[u8]) -> Result<()> {
        let mut data = data;
        while !data.is_empty() {
            let n = usize::min(data.len(), PROCESS_BUFFER_SIZE - self.buf_len);
            self.buf[self.buf_len..self.buf_len + n].copy_from_slice(&data[..n]);
            self.buf_len += n;
            data = &data[n..];

            match self.state {
                ImageState::WriteAppHeader => {
                    if self.buf_len < IMAGE_HEADER_SIZE {
                        continue;
                    }
                    self.write_header(memory)?;
                }
                ImageState::WriteAppData => {
                    self.write_data(memory)?;
                }
                _ => return Err(Error::InvalidState),
            }
        }
        Ok(())
    }

    fn write_header(&mut self, memory: &mut Memory) -> Result<()> {
        let raw: &[u8; IMAGE_HEADER_SIZE] = self.buf[..IMAGE_HEADER_SIZE].try_into().unwrap();
        let mut header = ImageHeader::decode(raw);
        debug!("re-encoding image header, index {}", self.new_image_index);

        header.img_index = self.new_image_index;
        self.firmware_length = header.data_size as usize;
        if self.cipher.is_some() {
            // The encrypted payload is zero-padded to the cipher block.
            let rem = header.data_size as usize % AES_BLOCK_SIZE;
            if rem != 0 {
                header.data_size += (AES_BLOCK_SIZE - rem) as u32;
            }
        }
        header.update_crc();

        let verify = self.verify.as_mut().ok_or(Error::InvalidParameters)?;
        verify.update(&header.head_crc.to_le_bytes());

        let encoded = header.encode();
        let w = memory.write_slot(self.slot.slot, self.pos, &encoded, WriteFlag::ResetAndContinue)?;
        self.pos += w as u32;

        if let Some(cipher) = &self.cipher {
            let iv = *cipher.iv().ok_or(Error::InvalidParameters)?;
            let w = memory.write_slot(self.slot.slot, self.pos, &iv, WriteFlag::Continue)?;
            self.pos += w as u32;
            self.verify.as_mut().unwrap().update(&iv);
        }

        self.buf_len = 0;
        self.buf.fill(0);
        self.state = ImageState::WriteAppData;
        Ok(())
    }

    fn write_data(&mut self, memory: &mut Memory) -> Result<()> {
        let last = self.written + self.buf_len == self.firmware_length;

        if let Some(cipher) = &mut self.cipher {
            // Only whole cipher blocks can be transformed.
            let n = (self.buf_len / AES_BLOCK_SIZE) * AES_BLOCK_SIZE;
            if n > 0 {
                cipher.encrypt(&mut self.buf[..n])?;
                self.verify.as_mut().unwrap().update(&self.buf[..n]);
                let w =
                    memory.write_slot(self.slot.slot, self.pos, &self.buf[..n], WriteFlag::Continue)?;
                self.pos += w as u32;
                self.written += n;
            }
            let tail = self.buf_len - n;
            self.buf.copy_within(n..n + tail, 0);
            self.buf_len = tail;

            if last && tail > 0 {
                // Zero-pad the final partial block to the cipher block size.
                self.buf[tail..AES_BLOCK_SIZE].fill(0);
                cipher.encrypt(&mut self.buf[..AES_BLOCK_SIZE])?;
                self.verify.as_mut().unwrap().update(&self.buf[..AES_BLOCK_SIZE]);
                let w = memory.write_slot(
                    self.slot.slot,
                    self.pos,
                    &self.buf[..AES_BLOCK_SIZE],
                    WriteFlag::Continue,
                )?;
                self.pos += w as u32;
                self.written += tail;
                self.buf_len = 0;
            }
        } else {
            let verify = self.verify.as_mut().ok_or(Error::InvalidParameters)?;
            verify.update(&self.buf[..self.buf_len]);
            let w = memory.write_slot(
                self.slot.slot,
                self.pos,
                &self.buf[..self.buf_len],
                WriteFlag::Continue,
            )?;
            self.pos += w as u32;
            self.written += self.buf_len;
            self.buf_len = 0;
        }

        if last {
            self.write_trailer(memory)?;
        }
        Ok(())
    }

    fn write_trailer(&mut self, memory: &mut Memory) -> Result<()> {
        let mut trailer = [0u8; CRC32_DIGEST_SIZE];
        let n = self
            .verify
            .as_mut()
            .ok_or(Error::InvalidParameters)?
            .generate_check_data(&mut trailer)?;
        let w = memory.write_slot(self.slot.slot, self.pos, &trailer[..n], WriteFlag::Continue)?;
        self.pos += w as u32;
        let w = memory.write_slot(self.slot.slot, self.pos, &[], WriteFlag::Flush)?;
        self.pos += w as u32;
        self.state = ImageState::WriteAppEnd;
        Ok(())
    }
}

/// Input and output machines plus the update policy hooks.
pub(crate) struct ImageProcess {
    pub input: InputImage,
    pub output: OutputImage,
    pub current_app_version: u32,
    pub anti_rollback: Option<AntiRollbackCallback>,
}

impl ImageProcess {
    /// Advance the input machine over whatever is buffered.
    pub fn process_input(&mut self, memories: &mut [Memory]) -> Result<()> {
        match self.input.state {
            ImageState::RecvAppHeader => self.process_app_header(memories),
            ImageState::RecvAppData => self.process_app_data(memories),
            ImageState::RecvAppCheck => self.process_app_check(),
            _ => Err(Error::InvalidState),
        }
    }

    fn process_app_header(&mut self, memories: &mut [Memory]) -> Result<()> {
        if self.input.buf_len < IMAGE_HEADER_SIZE {
            return Ok(());
        }
        debug!("processing update image header");

        let header = ImageHeader::parse(&self.input.buf[..self.input.buf_len]).map_err(|e| {
            info!("update image header is invalid");
            e
        })?;

        if let Some(accept) = self.anti_rollback {
            if !accept(self.current_app_version, header.data_vers) {
                info!("update aborted, candidate application version rejected");
                return Err(Error::IncorrectImageAppVersion);
            }
        }

        if header.img_type != crate::image::ImageType::App {
            return Err(Error::InvalidHeaderAppType);
        }

        // Reject an image that would not fit the output slot.
        let output_size = if self.output.binary {
            header.data_size as usize
        } else {
            let mut payload = header.data_size as usize;
            let mut iv = 0;
            if self.output.cipher.is_some() {
                let rem = payload % AES_BLOCK_SIZE;
                if rem != 0 {
                    payload += AES_BLOCK_SIZE - rem;
                }
                iv = AES_BLOCK_SIZE;
            }
            IMAGE_HEADER_SIZE + iv + payload + self.output.check_data_size()
        };
        let slot_size = memories[self.output.slot.memory]
            .slot(self.output.slot.slot)?
            .size;
        if output_size > slot_size {
            info!("output image would not fit the target slot");
            return Err(Error::BufferOverflow);
        }

        self.input.firmware_length = header.data_size as usize;
        self.output.firmware_length = header.data_size as usize;

        if !self.output.binary {
            let raw = self.input.buf;
            let memory = &mut memories[self.output.slot.memory];
            self.output.process(memory, &raw[..IMAGE_HEADER_SIZE])?;
        }

        self.input.verify.update(&header.head_crc.to_le_bytes());
        self.input.consume(IMAGE_HEADER_SIZE);
        self.input.state = ImageState::RecvAppData;
        Ok(())
    }

    fn process_app_data(&mut self, memories: &mut [Memory]) -> Result<()> {
        let input = &mut self.input;

        if input.cipher.is_some() && !input.iv_retrieved {
            // The first block after the header is the cipher IV.
            if input.buf_len >= AES_BLOCK_SIZE {
                debug!("processing update image cipher IV");
                let mut iv = [0u8; AES_BLOCK_SIZE];
                iv.copy_from_slice(&input.buf[..AES_BLOCK_SIZE]);
                input.cipher.as_mut().unwrap().set_iv(&iv)?;
                input.iv_retrieved = true;
                input.verify.update(&iv);
                input.consume(AES_BLOCK_SIZE);
            }
            return Ok(());
        }

        let buffer_full = input.buf_len == PROCESS_BUFFER_SIZE;
        let stream_done = input.written + input.buf_len >= input.firmware_length;
        if !buffer_full && !stream_done {
            return Ok(());
        }

        let data_len = usize::min(input.buf_len, input.firmware_length - input.written);
        if data_len > 0 {
            input.verify.update(&input.buf[..data_len]);
            if let Some(cipher) = &mut input.cipher {
                cipher.decrypt(&mut input.buf[..data_len])?;
            }
            let memory = &mut memories[self.output.slot.memory];
            self.output.process(memory, &input.buf[..data_len])?;
            input.written += data_len;
            input.consume(data_len);
        }

        if input.written == input.firmware_length {
            input.state = ImageState::RecvAppCheck;
            if input.buf_len > 0 {
                // Trailer bytes already arrived with the last payload chunk.
                return self.process_app_check();
            }
        }
        Ok(())
    }

    fn process_app_check(&mut self) -> Result<()> {
        let input = &mut self.input;
        if input.check_data.len() + input.buf_len > input.check_data_size {
            info!("image check data is bigger than expected");
            return Err(Error::BufferOverflow);
        }
        input.check_data.extend_from_slice(&input.buf[..input.buf_len]);
        input.buf_len = 0;
        if input.check_data.len() == input.check_data_size {
            input.state = ImageState::ValidateApp;
        }
        Ok(())
    }
}
