// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Update image builder.
//!
//! Emits the on-wire image format consumed by the updater: the 64-byte
//! header, an optional 16-byte IV followed by the CBC-encrypted payload,
//! and a check trailer computed over `headCrc || [IV] || payload` with the
//! selected verification method. Payload padding (VTOR alignment in front,
//! cipher-block zero padding at the end) is accounted for in the header's
//! `dataSize`.

use hmac::{Hmac, Mac};
use md5::Md5;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::SigningKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha1::Sha1;
use sha2::{Digest as _, Sha224, Sha256, Sha384, Sha512};

use crate::cipher::{CipherEngine, AES_BLOCK_SIZE};
use crate::error::{Error, Result};
use crate::image::{ImageHeader, ImageType, CRC32, IMAGE_HEADER_SIZE, IMAGE_HEADER_VERSION};
use crate::verify::{AuthAlgo, IntegrityAlgo};

/// How the image trailer is produced.
pub enum TrailerSpec {
    /// Unkeyed digest.
    Integrity(IntegrityAlgo),
    /// HMAC tag.
    Authentication { algo: AuthAlgo, key: Vec<u8> },
    /// RSA PKCS#1 v1.5 signature over a SHA-256 digest.
    RsaSha256(Box<RsaPrivateKey>),
    /// ECDSA P-256 signature (raw `r || s`) over a SHA-256 digest.
    EcdsaSha256(Box<SigningKey>),
}

impl TrailerSpec {
    /// Load an RSA signing key from a PEM private key (PKCS#8 or PKCS#1).
    pub fn rsa_sha256_from_pem(pem: &str) -> Result<Self> {
        let key = match RsaPrivateKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(_) => {
                RsaPrivateKey::from_pkcs1_pem(pem).map_err(|_| Error::InvalidParameters)?
            }
        };
        Ok(TrailerSpec::RsaSha256(Box::new(key)))
    }

    /// Load a P-256 signing key from a PEM private key (PKCS#8 or SEC1).
    pub fn ecdsa_sha256_from_pem(pem: &str) -> Result<Self> {
        let key = match SigningKey::from_pkcs8_pem(pem) {
            Ok(key) => key,
            Err(_) => p256::SecretKey::from_sec1_pem(pem)
                .map(Into::into)
                .map_err(|_| Error::InvalidParameters)?,
        };
        Ok(TrailerSpec::EcdsaSha256(Box::new(key)))
    }
}

/// Image builder configuration.
pub struct ImageBuilder {
    /// Image index stamped into the header.
    pub index: u32,
    /// Packed firmware version (see [`crate::image::pack_version`]).
    pub firmware_version: u32,
    /// Required alignment of the binary start, or 0 for none. Padding of
    /// `align - (header size % align)` bytes is inserted between the header
    /// and the binary so the vector table lands on a multiple of the
    /// alignment.
    pub vtor_align: u32,
    /// Opaque generation timestamp.
    pub timestamp: u64,
    /// AES-CBC key and IV; `None` emits a plaintext image.
    pub encryption: Option<(Vec<u8>, [u8; AES_BLOCK_SIZE])>,
    pub trailer: TrailerSpec,
}

impl ImageBuilder {
    pub fn new(trailer: TrailerSpec) -> Self {
        Self {
            index: 0,
            firmware_version: 0,
            vtor_align: 0,
            timestamp: 0,
            encryption: None,
            trailer,
        }
    }

    /// Assemble the image for a firmware binary.
    pub fn build(&self, binary: &[u8]) -> Result<Vec<u8>> {
        if binary.is_empty() {
            return Err(Error::InvalidParameters);
        }

        let padding = match self.vtor_align {
            0 => 0,
            align if align as usize == IMAGE_HEADER_SIZE => 0,
            align => (align - (IMAGE_HEADER_SIZE as u32 % align)) as usize,
        };

        let mut payload = vec![0u8; padding];
        payload.extend_from_slice(binary);
        if self.encryption.is_some() {
            let rem = payload.len() % AES_BLOCK_SIZE;
            if rem != 0 {
                payload.resize(payload.len() + AES_BLOCK_SIZE - rem, 0);
            }
        }

        let mut header = ImageHeader {
            head_vers: IMAGE_HEADER_VERSION,
            img_index: self.index,
            img_type: ImageType::App,
            data_padding: padding as u32,
            data_size: payload.len() as u32,
            data_vers: self.firmware_version,
            img_time: self.timestamp,
            head_crc: 0,
        };
        header.update_crc();

        let iv = if let Some((key, iv)) = &self.encryption {
            let mut engine = CipherEngine::new(key)?;
            engine.set_iv(iv)?;
            engine.encrypt(&mut payload)?;
            Some(*iv)
        } else {
            None
        };

        // The trailer covers the header identity tag, the IV when present,
        // and the payload as stored (ciphertext for encrypted images).
        let mut check_contents =
            Vec::with_capacity(4 + iv.map_or(0, |_| AES_BLOCK_SIZE) + payload.len());
        check_contents.extend_from_slice(&header.head_crc.to_le_bytes());
        if let Some(iv) = &iv {
            check_contents.extend_from_slice(iv);
        }
        check_contents.extend_from_slice(&payload);
        let trailer = self.make_trailer(&check_contents)?;

        let mut image = Vec::with_capacity(
            IMAGE_HEADER_SIZE + check_contents.len() - 4 + trailer.len(),
        );
        image.extend_from_slice(&header.encode());
        if let Some(iv) = &iv {
            image.extend_from_slice(iv);
        }
        image.extend_from_slice(&payload);
        image.extend_from_slice(&trailer);
        Ok(image)
    }

    fn make_trailer(&self, contents: &[u8]) -> Result<Vec<u8>> {
        match &self.trailer {
            TrailerSpec::Integrity(algo) => Ok(match algo {
                IntegrityAlgo::Crc32 => CRC32.checksum(contents).to_le_bytes().to_vec(),
                IntegrityAlgo::Md5 => Md5::digest(contents).to_vec(),
                IntegrityAlgo::Sha1 => Sha1::digest(contents).to_vec(),
                IntegrityAlgo::Sha224 => Sha224::digest(contents).to_vec(),
                IntegrityAlgo::Sha256 => Sha256::digest(contents).to_vec(),
                IntegrityAlgo::Sha384 => Sha384::digest(contents).to_vec(),
                IntegrityAlgo::Sha512 => Sha512::digest(contents).to_vec(),
            }),
            TrailerSpec::Authentication { algo, key } => match algo {
                AuthAlgo::HmacMd5 => {
                    let mut mac = Hmac::<Md5>::new_from_slice(key)
                        .map_err(|_| Error::InvalidParameters)?;
                    mac.update(contents);
                    Ok(mac.finalize().into_bytes().to_vec())
                }
                AuthAlgo::HmacSha256 => {
                    let mut mac = Hmac::<Sha256>::new_from_slice(key)
                        .map_err(|_| Error::InvalidParameters)?;
                    mac.update(contents);
                    Ok(mac.finalize().into_bytes().to_vec())
                }
                AuthAlgo::HmacSha512 => {
                    let mut mac = Hmac::<Sha512>::new_from_slice(key)
                        .map_err(|_| Error::InvalidParameters)?;
                    mac.update(contents);
                    Ok(mac.finalize().into_bytes().to_vec())
                }
            },
            TrailerSpec::RsaSha256(key) => {
                let digest = Sha256::digest(contents);
                key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
                    .map_err(|_| Error::Failure)
            }
            TrailerSpec::EcdsaSha256(key) => {
                let digest = Sha256::digest(contents);
                let signature: p256::ecdsa::Signature =
                    key.sign_prehash(&digest).map_err(|_| Error::Failure)?;
                Ok(signature.to_bytes().to_vec())
            }
        }
    }
}
