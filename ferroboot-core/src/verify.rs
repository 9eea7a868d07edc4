// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Streaming image verification pipeline.
//!
//! Three modes share one contract: feed the check-relevant bytes (the
//! header's CRC field, the IV when present, then the payload) through
//! [`VerifyContext::update`], and finish with [`VerifyContext::confirm`]
//! against the image trailer.
//!
//! - integrity: an unkeyed hash (CRC32 by default);
//! - authentication: HMAC over the same data;
//! - signature: SHA-256 over the data, verified with RSA PKCS#1 v1.5 or
//!   ECDSA P-256 against a PEM public key.

use digest::DynDigest;
use hmac::{Hmac, Mac};
use log::{debug, info};
use md5::Md5;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;
use sha2::{Digest as _, Sha224, Sha256, Sha384, Sha512};

use crate::error::{Error, Result};
use crate::image::{CRC32, CRC32_DIGEST_SIZE};

/// Integrity hash selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityAlgo {
    Crc32,
    Md5,
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl IntegrityAlgo {
    pub fn digest_size(self) -> usize {
        match self {
            IntegrityAlgo::Crc32 => CRC32_DIGEST_SIZE,
            IntegrityAlgo::Md5 => 16,
            IntegrityAlgo::Sha1 => 20,
            IntegrityAlgo::Sha224 => 28,
            IntegrityAlgo::Sha256 => 32,
            IntegrityAlgo::Sha384 => 48,
            IntegrityAlgo::Sha512 => 64,
        }
    }
}

/// Authentication (HMAC) selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAlgo {
    HmacMd5,
    HmacSha256,
    HmacSha512,
}

impl AuthAlgo {
    pub fn digest_size(self) -> usize {
        match self {
            AuthAlgo::HmacMd5 => 16,
            AuthAlgo::HmacSha256 => 32,
            AuthAlgo::HmacSha512 => 64,
        }
    }
}

/// Signature mechanism selection. The signed digest is always SHA-256.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgo {
    RsaSha256,
    EcdsaSha256,
}

/// Verification settings for one image direction.
#[derive(Debug, Clone)]
pub enum VerifyConfig {
    Integrity {
        algo: IntegrityAlgo,
    },
    Authentication {
        algo: AuthAlgo,
        key: Vec<u8>,
    },
    Signature {
        algo: SignatureAlgo,
        /// PEM-encoded public key (SubjectPublicKeyInfo; PKCS#1 is also
        /// accepted for RSA).
        public_key_pem: String,
    },
}

enum HmacState {
    Md5(Hmac<Md5>),
    Sha256(Hmac<Sha256>),
    Sha512(Hmac<Sha512>),
}

enum SignatureKey {
    Rsa(Box<RsaPublicKey>),
    Ecdsa(p256::ecdsa::VerifyingKey),
}

enum VerifyState {
    Crc32(crc::Digest<'static, u32>),
    Hash(Box<dyn DynDigest>),
    Hmac(HmacState),
    Signature { hash: Sha256, key: SignatureKey },
}

/// Streaming verifier over one image.
pub struct VerifyContext {
    state: VerifyState,
    check_data_size: usize,
}

impl VerifyContext {
    /// Initialize the verifier and compute the expected trailer size:
    /// the digest size for integrity, the MAC size for authentication, the
    /// RSA modulus size or twice the curve scalar size for signatures.
    pub fn new(config: &VerifyConfig) -> Result<Self> {
        match config {
            VerifyConfig::Integrity { algo } => {
                let state = match algo {
                    IntegrityAlgo::Crc32 => VerifyState::Crc32(CRC32.digest()),
                    IntegrityAlgo::Md5 => VerifyState::Hash(Box::new(Md5::new())),
                    IntegrityAlgo::Sha1 => VerifyState::Hash(Box::new(Sha1::new())),
                    IntegrityAlgo::Sha224 => VerifyState::Hash(Box::new(Sha224::new())),
                    IntegrityAlgo::Sha256 => VerifyState::Hash(Box::new(Sha256::new())),
                    IntegrityAlgo::Sha384 => VerifyState::Hash(Box::new(Sha384::new())),
                    IntegrityAlgo::Sha512 => VerifyState::Hash(Box::new(Sha512::new())),
                };
                Ok(Self {
                    state,
                    check_data_size: algo.digest_size(),
                })
            }
            VerifyConfig::Authentication { algo, key } => {
                if key.is_empty() {
                    return Err(Error::InvalidParameters);
                }
                let state = match algo {
                    AuthAlgo::HmacMd5 => HmacState::Md5(
                        Hmac::<Md5>::new_from_slice(key).map_err(|_| Error::InvalidParameters)?,
                    ),
                    AuthAlgo::HmacSha256 => HmacState::Sha256(
                        Hmac::<Sha256>::new_from_slice(key)
                            .map_err(|_| Error::InvalidParameters)?,
                    ),
                    AuthAlgo::HmacSha512 => HmacState::Sha512(
                        Hmac::<Sha512>::new_from_slice(key)
                            .map_err(|_| Error::InvalidParameters)?,
                    ),
                };
                Ok(Self {
                    state: VerifyState::Hmac(state),
                    check_data_size: algo.digest_size(),
                })
            }
            VerifyConfig::Signature {
                algo,
                public_key_pem,
            } => {
                if public_key_pem.is_empty() {
                    return Err(Error::InvalidParameters);
                }
                let (key, size) = match algo {
                    SignatureAlgo::RsaSha256 => {
                        let key = match RsaPublicKey::from_public_key_pem(public_key_pem) {
                            Ok(key) => key,
                            Err(_) => RsaPublicKey::from_pkcs1_pem(public_key_pem)
                                .map_err(|_| Error::InvalidParameters)?,
                        };
                        let size = key.size();
                        (SignatureKey::Rsa(Box::new(key)), size)
                    }
                    SignatureAlgo::EcdsaSha256 => {
                        let key =
                            p256::ecdsa::VerifyingKey::from_public_key_pem(public_key_pem)
                                .map_err(|_| Error::InvalidParameters)?;
                        // Raw r || s, two P-256 scalars.
                        (SignatureKey::Ecdsa(key), 64)
                    }
                };
                Ok(Self {
                    state: VerifyState::Signature {
                        hash: Sha256::new(),
                        key,
                    },
                    check_data_size: size,
                })
            }
        }
    }

    /// Expected trailer length in bytes.
    pub fn check_data_size(&self) -> usize {
        self.check_data_size
    }

    /// Absorb a chunk of check-relevant bytes.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            VerifyState::Crc32(digest) => digest.update(data),
            VerifyState::Hash(hash) => hash.update(data),
            VerifyState::Hmac(mac) => match mac {
                HmacState::Md5(m) => Mac::update(m, data),
                HmacState::Sha256(m) => Mac::update(m, data),
                HmacState::Sha512(m) => Mac::update(m, data),
            },
            VerifyState::Signature { hash, .. } => {
                sha2::Digest::update(hash, data);
            }
        }
    }

    /// Finalize and compare (integrity/authentication) or verify
    /// (signature) against the trailer. Fails with [`Error::Aborted`] on any
    /// mismatch.
    pub fn confirm(&mut self, trailer: &[u8]) -> Result<()> {
        if trailer.len() != self.check_data_size {
            return Err(Error::InvalidLength);
        }
        match &mut self.state {
            VerifyState::Crc32(digest) => {
                let digest = core::mem::replace(digest, CRC32.digest());
                let computed = digest.finalize().to_le_bytes();
                debug!("computed integrity tag: {:02x?}", computed);
                if trailer != computed {
                    info!("image integrity tag is not valid");
                    return Err(Error::Aborted);
                }
                Ok(())
            }
            VerifyState::Hash(hash) => {
                let computed = hash.finalize_reset();
                if trailer != computed.as_ref() {
                    info!("image integrity tag is not valid");
                    return Err(Error::Aborted);
                }
                Ok(())
            }
            VerifyState::Hmac(mac) => {
                let computed: Vec<u8> = match mac {
                    HmacState::Md5(m) => Mac::finalize_reset(m).into_bytes().to_vec(),
                    HmacState::Sha256(m) => Mac::finalize_reset(m).into_bytes().to_vec(),
                    HmacState::Sha512(m) => Mac::finalize_reset(m).into_bytes().to_vec(),
                };
                if trailer != computed.as_slice() {
                    info!("image authentication tag is not valid");
                    return Err(Error::Aborted);
                }
                Ok(())
            }
            VerifyState::Signature { hash, key } => {
                let digest = digest::Digest::finalize_reset(hash);
                let result = match key {
                    SignatureKey::Rsa(key) => key
                        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, trailer)
                        .map_err(|_| Error::Aborted),
                    SignatureKey::Ecdsa(key) => {
                        let sig = p256::ecdsa::Signature::from_slice(trailer)
                            .map_err(|_| Error::Aborted)?;
                        key.verify_prehash(&digest, &sig).map_err(|_| Error::Aborted)
                    }
                };
                if result.is_err() {
                    info!("image signature is not valid");
                }
                result
            }
        }
    }

    /// Finalize and emit the check data (integrity mode only); used when
    /// producing the staged single-bank image whose trailer is a CRC32.
    pub fn generate_check_data(&mut self, out: &mut [u8]) -> Result<usize> {
        match &mut self.state {
            VerifyState::Crc32(digest) => {
                if out.len() < CRC32_DIGEST_SIZE {
                    return Err(Error::BufferOverflow);
                }
                let digest = core::mem::replace(digest, CRC32.digest());
                out[..CRC32_DIGEST_SIZE].copy_from_slice(&digest.finalize().to_le_bytes());
                Ok(CRC32_DIGEST_SIZE)
            }
            VerifyState::Hash(hash) => {
                let size = hash.output_size();
                if out.len() < size {
                    return Err(Error::BufferOverflow);
                }
                let computed = hash.finalize_reset();
                out[..size].copy_from_slice(&computed);
                Ok(size)
            }
            _ => Err(Error::Aborted),
        }
    }
}
