// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! In-application firmware update engine for 32-bit microcontrollers.
//!
//! Two cooperating roles share this crate:
//!
//! - the **updater** ([`update::UpdateContext`]) runs inside the
//!   application, receives an update image over any transport, verifies it
//!   on the fly and stores it — directly into the inactive flash bank
//!   (dual-bank targets) or as a re-encoded staging image in secondary
//!   storage (single-bank targets);
//! - the **bootloader** ([`boot::BootContext`]) runs at reset, picks the
//!   most recent valid image, migrates a staged image into the primary
//!   slot when needed, optionally reverts to the previous application
//!   (fallback), and jumps into the application.
//!
//! Hardware access goes through host-supplied traits
//! ([`flash::FlashDriver`], [`mcu::McuPort`], [`mailbox::MailboxPort`],
//! [`fallback::FallbackTrigger`]); in-RAM implementations are provided for
//! host tests and demos. [`builder::ImageBuilder`] emits the wire format
//! the updater consumes.

/// Engine version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod boot;
pub mod builder;
pub mod cipher;
pub mod error;
pub mod fallback;
pub mod flash;
pub mod image;
pub mod mailbox;
pub mod mcu;
pub mod memory;
pub mod process;
pub mod ram_flash;
pub mod update;
pub mod verify;

pub use boot::{BootContext, BootOutcome, BootSettings, BootState};
pub use builder::{ImageBuilder, TrailerSpec};
pub use error::{Error, Result};
pub use flash::{FlashDriver, FlashFlags, FlashInfo, FlashStatus};
pub use image::{ImageHeader, ImageType, IMAGE_HEADER_SIZE, IMAGE_HEADER_VERSION};
pub use memory::{Memory, MemoryRole, MemoryType, Slot, SlotContent, SlotId, WriteFlag};
pub use update::{UpdateContext, UpdateMode, UpdateSettings};
pub use verify::{AuthAlgo, IntegrityAlgo, SignatureAlgo, VerifyConfig};
