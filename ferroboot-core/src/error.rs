// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Error codes shared by every layer of the update engine.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Error codes returned by the update engine.
///
/// Every fallible operation returns one of these; nothing in the engine
/// panics. Image-content errors abort the running update session (with the
/// output slot header scrubbed), configuration errors are raised at init
/// and never retried.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("operation failed")]
    Failure,
    #[error("feature not implemented")]
    NotImplemented,
    #[error("verification mismatch")]
    Aborted,
    #[error("invalid parameters")]
    InvalidParameters,
    #[error("invalid address")]
    InvalidAddress,
    #[error("invalid value")]
    InvalidValue,
    #[error("invalid state")]
    InvalidState,
    #[error("invalid length")]
    InvalidLength,
    #[error("buffer overflow")]
    BufferOverflow,

    #[error("invalid image header")]
    InvalidImageHeader,
    #[error("unsupported image header version")]
    InvalidImageHeaderVersion,
    #[error("image is not an application image")]
    InvalidHeaderAppType,
    #[error("image check data mismatch")]
    InvalidImageCheck,
    #[error("image integrity tag mismatch")]
    InvalidImageIntegrityTag,
    #[error("image authentication tag mismatch")]
    InvalidImageAuthenticationTag,
    #[error("image application is invalid")]
    InvalidImageApp,
    #[error("image application version rejected by anti-rollback")]
    IncorrectImageAppVersion,
    #[error("image is not ready for validation")]
    ImageNotReady,

    #[error("memory slots overlap")]
    SlotsOverlap,
    #[error("unknown slot type")]
    UnknownSlotType,
    #[error("unknown memory type")]
    UnknownMemoryType,

    #[error("memory driver init failed")]
    MemoryDriverInitFailed,
    #[error("memory driver read failed")]
    MemoryDriverReadFailed,
    #[error("memory driver write failed")]
    MemoryDriverWriteFailed,
    #[error("memory driver erase failed")]
    MemoryDriverEraseFailed,
    #[error("memory driver get info failed")]
    MemoryDriverGetInfoFailed,
    #[error("memory driver get status failed")]
    MemoryDriverGetStatusFailed,

    #[error("unsupported authentication algorithm")]
    UnsupportedAuthAlgo,
    #[error("unsupported signature algorithm")]
    UnsupportedSignatureAlgo,
    #[error("unsupported cipher algorithm")]
    UnsupportedCipherAlgo,
    #[error("unsupported cipher mode")]
    UnsupportedCipherMode,
}
