// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Image header layout and parsing.
//!
//! Every image starts with a fixed 64-byte, little-endian, packed header.
//! The header carries its own CRC32 over the first 60 bytes; a header is
//! structurally valid iff that CRC matches and the header version equals
//! [`IMAGE_HEADER_VERSION`].

use crc::{Crc, CRC_32_ISO_HDLC};

use crate::error::{Error, Result};
use crate::memory::Memory;

/// CRC32 used for header and image integrity tags.
pub static CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Size of a CRC32 digest in bytes.
pub const CRC32_DIGEST_SIZE: usize = 4;

/// Size of the on-flash/on-wire image header.
pub const IMAGE_HEADER_SIZE: usize = 64;

/// Pack a semantic version into `(major << 16) | (minor << 8) | patch`.
pub const fn pack_version(major: u8, minor: u8, patch: u8) -> u32 {
    ((major as u32) << 16) | ((minor as u32) << 8) | patch as u32
}

/// Header layout version emitted and accepted by this implementation (1.1.0).
pub const IMAGE_HEADER_VERSION: u32 = pack_version(1, 1, 0);

/// Parse a `major.minor.patch` string into a packed version.
pub fn parse_semver(s: &str) -> Result<u32> {
    let mut parts = s.split('.');
    let mut next = || -> Result<u8> {
        parts
            .next()
            .and_then(|p| p.parse::<u8>().ok())
            .ok_or(Error::InvalidValue)
    };
    let (major, minor, patch) = (next()?, next()?, next()?);
    if parts.next().is_some() {
        return Err(Error::InvalidValue);
    }
    Ok(pack_version(major, minor, patch))
}

/// Kind of content an image carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    None,
    App,
}

impl ImageType {
    /// Unknown type bytes decode to `None` and are rejected downstream.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ImageType::App,
            _ => ImageType::None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            ImageType::None => 0,
            ImageType::App => 1,
        }
    }
}

/// The 64-byte image header.
///
/// The `reserved` bytes (zero on emission, ignored on verification) are not
/// retained; re-encoding always emits them as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub head_vers: u32,
    pub img_index: u32,
    pub img_type: ImageType,
    pub data_padding: u32,
    pub data_size: u32,
    pub data_vers: u32,
    pub img_time: u64,
    pub head_crc: u32,
}

impl ImageHeader {
    /// Decode header fields without any validity check.
    pub fn decode(buf: &[u8; IMAGE_HEADER_SIZE]) -> Self {
        let u32_at = |o: usize| u32::from_le_bytes(buf[o..o + 4].try_into().unwrap());
        Self {
            head_vers: u32_at(0),
            img_index: u32_at(4),
            img_type: ImageType::from_u8(buf[8]),
            data_padding: u32_at(9),
            data_size: u32_at(13),
            data_vers: u32_at(17),
            img_time: u64::from_le_bytes(buf[21..29].try_into().unwrap()),
            head_crc: u32_at(60),
        }
    }

    /// Encode the header, reserved bytes zeroed.
    pub fn encode(&self) -> [u8; IMAGE_HEADER_SIZE] {
        let mut buf = [0u8; IMAGE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.head_vers.to_le_bytes());
        buf[4..8].copy_from_slice(&self.img_index.to_le_bytes());
        buf[8] = self.img_type.as_u8();
        buf[9..13].copy_from_slice(&self.data_padding.to_le_bytes());
        buf[13..17].copy_from_slice(&self.data_size.to_le_bytes());
        buf[17..21].copy_from_slice(&self.data_vers.to_le_bytes());
        buf[21..29].copy_from_slice(&self.img_time.to_le_bytes());
        buf[60..64].copy_from_slice(&self.head_crc.to_le_bytes());
        buf
    }

    /// Recompute `head_crc` from the current field values.
    pub fn update_crc(&mut self) {
        let buf = self.encode();
        self.head_crc = CRC32.checksum(&buf[..IMAGE_HEADER_SIZE - CRC32_DIGEST_SIZE]);
    }

    /// Check structural validity of raw header bytes.
    pub fn check(buf: &[u8; IMAGE_HEADER_SIZE]) -> Result<()> {
        let computed = CRC32.checksum(&buf[..IMAGE_HEADER_SIZE - CRC32_DIGEST_SIZE]);
        let stored = u32::from_le_bytes(buf[60..64].try_into().unwrap());
        if stored != computed {
            return Err(Error::InvalidImageHeader);
        }
        let head_vers = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if head_vers != IMAGE_HEADER_VERSION {
            return Err(Error::InvalidImageHeaderVersion);
        }
        Ok(())
    }

    /// Parse and validate a header from a byte buffer.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < IMAGE_HEADER_SIZE {
            return Err(Error::InvalidLength);
        }
        let raw: &[u8; IMAGE_HEADER_SIZE] = buf[..IMAGE_HEADER_SIZE].try_into().unwrap();
        Self::check(raw)?;
        Ok(Self::decode(raw))
    }

    /// Read and parse the header of the image stored in a slot.
    pub fn read_from_slot(memory: &Memory, slot: usize) -> Result<Self> {
        let mut buf = [0u8; IMAGE_HEADER_SIZE];
        memory.read_slot(slot, 0, &mut buf)?;
        Self::parse(&buf).map_err(|e| match e {
            // A torn or erased header is reported uniformly so slot scans
            // can treat "no image" as one condition.
            Error::InvalidImageHeaderVersion => Error::InvalidImageHeader,
            other => other,
        })
    }
}
