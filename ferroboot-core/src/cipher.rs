// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Streaming AES-CBC cipher engine.
//!
//! One engine handles one payload in one direction. The chaining state is
//! kept across calls, so a payload can be pushed through in any number of
//! block-aligned chunks. The IV must be installed with [`CipherEngine::set_iv`]
//! before the first encrypt or decrypt call.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};

use crate::error::{Error, Result};

/// AES block and IV size in bytes.
pub const AES_BLOCK_SIZE: usize = 16;

enum CbcEncState {
    Aes128(cbc::Encryptor<Aes128>),
    Aes192(cbc::Encryptor<Aes192>),
    Aes256(cbc::Encryptor<Aes256>),
}

enum CbcDecState {
    Aes128(cbc::Decryptor<Aes128>),
    Aes192(cbc::Decryptor<Aes192>),
    Aes256(cbc::Decryptor<Aes256>),
}

/// AES-CBC engine with a preshared key.
pub struct CipherEngine {
    key: Vec<u8>,
    iv: Option<[u8; AES_BLOCK_SIZE]>,
    enc: Option<CbcEncState>,
    dec: Option<CbcDecState>,
}

impl CipherEngine {
    /// Create an engine for the given key. Key length selects the AES
    /// variant and must be 16, 24 or 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self> {
        match key.len() {
            16 | 24 | 32 => Ok(Self {
                key: key.to_vec(),
                iv: None,
                enc: None,
                dec: None,
            }),
            _ => Err(Error::InvalidLength),
        }
    }

    /// Install the initialization vector and reset the chaining state.
    pub fn set_iv(&mut self, iv: &[u8]) -> Result<()> {
        if iv.len() != AES_BLOCK_SIZE {
            return Err(Error::InvalidLength);
        }
        let mut buf = [0u8; AES_BLOCK_SIZE];
        buf.copy_from_slice(iv);
        self.iv = Some(buf);
        self.enc = None;
        self.dec = None;
        Ok(())
    }

    /// The installed IV, if any.
    pub fn iv(&self) -> Option<&[u8; AES_BLOCK_SIZE]> {
        self.iv.as_ref()
    }

    /// Encrypt `data` in place; the length must be a multiple of 16.
    pub fn encrypt(&mut self, data: &mut [u8]) -> Result<()> {
        if data.len() % AES_BLOCK_SIZE != 0 {
            return Err(Error::InvalidLength);
        }
        let iv = self.iv.ok_or(Error::InvalidParameters)?;
        if self.enc.is_none() {
            self.enc = Some(match self.key.len() {
                16 => CbcEncState::Aes128(
                    cbc::Encryptor::<Aes128>::new_from_slices(&self.key, &iv)
                        .map_err(|_| Error::InvalidLength)?,
                ),
                24 => CbcEncState::Aes192(
                    cbc::Encryptor::<Aes192>::new_from_slices(&self.key, &iv)
                        .map_err(|_| Error::InvalidLength)?,
                ),
                _ => CbcEncState::Aes256(
                    cbc::Encryptor::<Aes256>::new_from_slices(&self.key, &iv)
                        .map_err(|_| Error::InvalidLength)?,
                ),
            });
        }
        let enc = self.enc.as_mut().unwrap();
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(block);
            match enc {
                CbcEncState::Aes128(e) => e.encrypt_block_mut(block),
                CbcEncState::Aes192(e) => e.encrypt_block_mut(block),
                CbcEncState::Aes256(e) => e.encrypt_block_mut(block),
            }
        }
        Ok(())
    }

    /// Decrypt `data` in place; the length must be a multiple of 16.
    pub fn decrypt(&mut self, data: &mut [u8]) -> Result<()> {
        if data.len() % AES_BLOCK_SIZE != 0 {
            return Err(Error::InvalidLength);
        }
        let iv = self.iv.ok_or(Error::InvalidParameters)?;
        if self.dec.is_none() {
            self.dec = Some(match self.key.len() {
                16 => CbcDecState::Aes128(
                    cbc::Decryptor::<Aes128>::new_from_slices(&self.key, &iv)
                        .map_err(|_| Error::InvalidLength)?,
                ),
                24 => CbcDecState::Aes192(
                    cbc::Decryptor::<Aes192>::new_from_slices(&self.key, &iv)
                        .map_err(|_| Error::InvalidLength)?,
                ),
                _ => CbcDecState::Aes256(
                    cbc::Decryptor::<Aes256>::new_from_slices(&self.key, &iv)
                        .map_err(|_| Error::InvalidLength)?,
                ),
            });
        }
        let dec = self.dec.as_mut().unwrap();
        for block in data.chunks_exact_mut(AES_BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(block);
            match dec {
                CbcDecState::Aes128(d) => d.decrypt_block_mut(block),
                CbcDecState::Aes192(d) => d.decrypt_block_mut(block),
                CbcDecState::Aes256(d) => d.decrypt_block_mut(block),
            }
        }
        Ok(())
    }
}
