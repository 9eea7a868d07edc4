// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Bootloader tests, single-bank mode: staged-image migration, fallback,
//! mailbox handoff and the full update-then-boot cycle across simulated
//! resets.

mod common;

use ferroboot_core::error::Result;
use ferroboot_core::fallback::{FallbackTrigger, TriggerStatus};
use ferroboot_core::image::{pack_version, ImageHeader};
use ferroboot_core::mailbox::{MailboxPort, RamMailbox, BOOT_MAILBOX_SIZE};
use ferroboot_core::mcu::SimMcu;
use ferroboot_core::ram_flash::RamFlashStorage;
use ferroboot_core::verify::{IntegrityAlgo, SignatureAlgo, VerifyConfig};
use ferroboot_core::{
    BootContext, BootOutcome, BootSettings, BootState, ImageBuilder, TrailerSpec, UpdateContext,
    UpdateMode, UpdateSettings,
};

use p256::ecdsa::SigningKey;
use p256::pkcs8::{EncodePublicKey, LineEnding};
use rand::rngs::OsRng;

use common::{
    build_crc32_image, make_firmware, primary_memory, program, read_flash, secondary_memory,
    BACKUP_SLOT_ADDR, PRIMARY_ADDR, SECONDARY_ADDR,
};

struct TestTrigger {
    raised: bool,
}

impl FallbackTrigger for TestTrigger {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn status(&mut self) -> Result<TriggerStatus> {
        Ok(if self.raised {
            TriggerStatus::Raised
        } else {
            TriggerStatus::Idle
        })
    }
}

fn test_rand(buf: &mut [u8]) -> Result<()> {
    buf.fill(0x42);
    Ok(())
}

/// Bootloader over existing flash contents; returns the context and the
/// MCU recording handle.
fn make_boot(
    primary_storage: &RamFlashStorage,
    secondary_storage: &RamFlashStorage,
    fallback: bool,
    anti_rollback: bool,
    ext_mem_encryption: bool,
    trigger_raised: bool,
    mailbox: Option<Box<dyn MailboxPort>>,
) -> (
    BootContext,
    std::rc::Rc<std::cell::RefCell<ferroboot_core::mcu::SimMcuState>>,
) {
    let (primary, _) = primary_memory(Some(primary_storage.clone()));
    let (secondary, _) = secondary_memory(fallback, Some(secondary_storage.clone()));
    let mcu = SimMcu::new(64);
    let mcu_state = mcu.state();
    let context = BootContext::new(BootSettings {
        memories: vec![primary, secondary],
        fallback,
        anti_rollback,
        ext_mem_encryption,
        psk: None,
        trigger: fallback.then(|| {
            Box::new(TestTrigger {
                raised: trigger_raised,
            }) as Box<dyn FallbackTrigger>
        }),
        mailbox,
        mcu: Box::new(mcu),
    })
    .unwrap();
    (context, mcu_state)
}

// =============================================================================
// full single-bank cycle: update, migrate, run
// =============================================================================

#[test]
fn test_single_bank_plain_update_and_boot_cycle() {
    // current application, index 5
    let current = make_firmware(300, PRIMARY_ADDR);
    let current_image = build_crc32_image(&current, 5, (1, 0, 0));
    let (primary, primary_storage) = primary_memory(None);
    let (secondary, secondary_storage) = secondary_memory(false, None);
    program(&primary_storage, PRIMARY_ADDR, PRIMARY_ADDR, &current_image);

    // receive an update, index stamped by the updater as 5 + 1
    let update = make_firmware(400, PRIMARY_ADDR);
    let update_image = build_crc32_image(&update, 0, (1, 0, 1));
    let mcu = SimMcu::new(64);
    let mcu_state = mcu.state();
    let mut context = UpdateContext::new(UpdateSettings {
        mode: UpdateMode::SingleBank { fallback: false },
        app_version: pack_version(1, 0, 0),
        anti_rollback: None,
        input_verify: VerifyConfig::Integrity {
            algo: IntegrityAlgo::Crc32,
        },
        input_cipher_key: None,
        output_psk: None,
        rand: None,
        mailbox: None,
        mcu: Box::new(mcu),
        memories: vec![primary, secondary],
    })
    .unwrap();

    for chunk in update_image.chunks(53) {
        context.process(chunk).unwrap();
    }
    context.finalize().unwrap();
    context.reboot().unwrap();
    assert_eq!(mcu_state.borrow().reset_count, 1);

    // the staged image carries the incremented index and a CRC32 trailer
    let staged = read_flash(&secondary_storage, SECONDARY_ADDR, SECONDARY_ADDR, 64);
    let staged_header = ImageHeader::parse(&staged).unwrap();
    assert_eq!(staged_header.img_index, 6);
    assert_eq!(staged_header.data_size, 400);

    // reset #1: the bootloader migrates the staged image into the primary slot
    let (mut boot, boot_mcu) = make_boot(
        &primary_storage,
        &secondary_storage,
        false,
        false,
        false,
        false,
        None,
    );
    assert_eq!(boot.run().unwrap(), BootOutcome::Reset);
    assert_eq!(boot_mcu.borrow().reset_count, 1);

    let migrated = read_flash(&primary_storage, PRIMARY_ADDR, PRIMARY_ADDR, 64);
    let migrated_header = ImageHeader::parse(&migrated).unwrap();
    assert_eq!(migrated_header.img_index, 6);
    assert_eq!(
        read_flash(&primary_storage, PRIMARY_ADDR, PRIMARY_ADDR + 64, 400),
        update
    );

    // reset #2: nothing newer; verify the application and jump into it
    let (mut boot, boot_mcu) = make_boot(
        &primary_storage,
        &secondary_storage,
        false,
        false,
        false,
        false,
        None,
    );
    assert_eq!(boot.run().unwrap(), BootOutcome::Jump(PRIMARY_ADDR + 64));
    assert_eq!(boot_mcu.borrow().jump_addr, Some(PRIMARY_ADDR + 64));
}

// =============================================================================
// encrypted secondary + signature + mailbox (scenario S3)
// =============================================================================

#[test]
fn test_single_bank_encrypted_update_with_signature_and_mailbox() {
    let psk = b"aa3ff7d43cc015682c7dfd00de9379e7";

    let current = make_firmware(300, PRIMARY_ADDR);
    let current_image = build_crc32_image(&current, 5, (1, 0, 0));
    let (primary, primary_storage) = primary_memory(None);
    let (secondary, secondary_storage) = secondary_memory(false, None);
    program(&primary_storage, PRIMARY_ADDR, PRIMARY_ADDR, &current_image);

    // signed plaintext input image, 1024 payload bytes
    let signing_key = SigningKey::random(&mut OsRng);
    let public_pem = signing_key
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap();
    let update = make_firmware(1024, PRIMARY_ADDR);
    let mut builder = ImageBuilder::new(TrailerSpec::EcdsaSha256(Box::new(signing_key)));
    builder.firmware_version = pack_version(1, 1, 0);
    let update_image = builder.build(&update).unwrap();

    let mailbox = RamMailbox::new();
    let mailbox_probe = mailbox.share();
    let boot_mailbox = mailbox.share();

    let mcu = SimMcu::new(64);
    let mut context = UpdateContext::new(UpdateSettings {
        mode: UpdateMode::SingleBank { fallback: false },
        app_version: pack_version(1, 0, 0),
        anti_rollback: None,
        input_verify: VerifyConfig::Signature {
            algo: SignatureAlgo::EcdsaSha256,
            public_key_pem: public_pem,
        },
        input_cipher_key: None,
        output_psk: Some(psk.to_vec()),
        rand: Some(test_rand),
        mailbox: Some(Box::new(mailbox)),
        mcu: Box::new(mcu),
        memories: vec![primary, secondary],
    })
    .unwrap();

    for chunk in update_image.chunks(100) {
        context.process(chunk).unwrap();
    }
    context.finalize().unwrap();
    context.reboot().unwrap();

    // staged image: header || IV || ciphertext || CRC32
    let staged = read_flash(&secondary_storage, SECONDARY_ADDR, SECONDARY_ADDR, 64);
    let staged_header = ImageHeader::parse(&staged).unwrap();
    assert_eq!(staged_header.img_index, 6);
    assert_eq!(staged_header.data_size, 1024);
    assert_eq!(
        read_flash(&secondary_storage, SECONDARY_ADDR, SECONDARY_ADDR + 64, 16),
        vec![0x42; 16]
    );
    let ciphertext = read_flash(
        &secondary_storage,
        SECONDARY_ADDR,
        SECONDARY_ADDR + 80,
        1024,
    );
    assert_ne!(ciphertext, update);

    // the PSK was handed to the bootloader through the mailbox
    let record = mailbox_probe.get();
    assert!(record.check());
    assert_eq!(record.psk_size, 32);
    assert_eq!(&record.psk[..32], psk);

    // reset #1: decrypting migration
    let (mut boot, _) = make_boot(
        &primary_storage,
        &secondary_storage,
        false,
        false,
        true,
        false,
        Some(Box::new(boot_mailbox)),
    );
    assert_eq!(boot.run().unwrap(), BootOutcome::Reset);

    // the plaintext landed in the primary slot
    assert_eq!(
        read_flash(&primary_storage, PRIMARY_ADDR, PRIMARY_ADDR + 64, 1024),
        update
    );

    // the mailbox was zeroed after reading
    assert_eq!(mailbox_probe.raw(), [0u8; BOOT_MAILBOX_SIZE]);

    // reset #2: run the new application
    let mailbox_again = mailbox_probe.share();
    let (mut boot, _) = make_boot(
        &primary_storage,
        &secondary_storage,
        false,
        false,
        true,
        false,
        Some(Box::new(mailbox_again)),
    );
    assert_eq!(boot.run().unwrap(), BootOutcome::Jump(PRIMARY_ADDR + 64));
}

// =============================================================================
// fallback (scenario S4)
// =============================================================================

#[test]
fn test_fallback_restores_previous_image() {
    let current = make_firmware(300, PRIMARY_ADDR);
    let current_image = build_crc32_image(&current, 5, (1, 2, 0));
    let backup = make_firmware(200, PRIMARY_ADDR);
    let backup_image = build_crc32_image(&backup, 4, (1, 1, 0));

    let (_, primary_storage) = primary_memory(None);
    let (_, secondary_storage) = secondary_memory(true, None);
    program(&primary_storage, PRIMARY_ADDR, PRIMARY_ADDR, &current_image);
    // slot A: the equivalent of the running application (same index)
    program(&secondary_storage, SECONDARY_ADDR, SECONDARY_ADDR, &current_image);
    // slot B: the backup of the previous application
    program(&secondary_storage, SECONDARY_ADDR, BACKUP_SLOT_ADDR, &backup_image);

    let (mut boot, mcu) = make_boot(
        &primary_storage,
        &secondary_storage,
        true,
        false,
        false,
        true,
        None,
    );
    assert_eq!(boot.run().unwrap(), BootOutcome::Reset);
    assert_eq!(mcu.borrow().reset_count, 1);

    // the equivalent slot was erased
    assert_eq!(
        read_flash(&secondary_storage, SECONDARY_ADDR, SECONDARY_ADDR, 64),
        vec![0xFF; 64]
    );

    // the primary slot was rewritten from the backup image
    let restored = read_flash(&primary_storage, PRIMARY_ADDR, PRIMARY_ADDR, 64);
    let restored_header = ImageHeader::parse(&restored).unwrap();
    assert_eq!(restored_header.img_index, 4);
    assert_eq!(restored_header.data_vers, pack_version(1, 1, 0));
    assert_eq!(
        read_flash(&primary_storage, PRIMARY_ADDR, PRIMARY_ADDR + 64, 200),
        backup
    );

    // next reset runs the restored application
    let (mut boot, _) = make_boot(
        &primary_storage,
        &secondary_storage,
        true,
        false,
        false,
        false,
        None,
    );
    assert_eq!(boot.run().unwrap(), BootOutcome::Jump(PRIMARY_ADDR + 64));
}

#[test]
fn test_fallback_aborts_without_older_backup() {
    let current = make_firmware(300, PRIMARY_ADDR);
    let current_image = build_crc32_image(&current, 5, (1, 2, 0));
    let newer_image = build_crc32_image(&make_firmware(200, PRIMARY_ADDR), 7, (1, 3, 0));

    let (_, primary_storage) = primary_memory(None);
    let (_, secondary_storage) = secondary_memory(true, None);
    program(&primary_storage, PRIMARY_ADDR, PRIMARY_ADDR, &current_image);
    program(&secondary_storage, SECONDARY_ADDR, SECONDARY_ADDR, &current_image);
    // the other slot holds a NEWER image: nothing to fall back to
    program(&secondary_storage, SECONDARY_ADDR, BACKUP_SLOT_ADDR, &newer_image);

    let (mut boot, _) = make_boot(
        &primary_storage,
        &secondary_storage,
        true,
        false,
        false,
        true,
        None,
    );
    // the fallback aborts and the current application keeps running
    assert_eq!(boot.run().unwrap(), BootOutcome::Jump(PRIMARY_ADDR + 64));

    // all three images are intact
    assert!(ImageHeader::parse(&read_flash(
        &secondary_storage,
        SECONDARY_ADDR,
        SECONDARY_ADDR,
        64
    ))
    .is_ok());
    assert!(ImageHeader::parse(&read_flash(
        &secondary_storage,
        SECONDARY_ADDR,
        BACKUP_SLOT_ADDR,
        64
    ))
    .is_ok());
}

// =============================================================================
// rejection paths (scenario S6, selection rules)
// =============================================================================

#[test]
fn test_bad_staged_trailer_falls_back_to_current_app() {
    let current = make_firmware(300, PRIMARY_ADDR);
    let current_image = build_crc32_image(&current, 0, (1, 0, 0));
    let mut staged_image = build_crc32_image(&make_firmware(200, PRIMARY_ADDR), 1, (1, 0, 1));
    staged_image[100] ^= 0xFF; // corrupt one payload byte

    let (_, primary_storage) = primary_memory(None);
    let (_, secondary_storage) = secondary_memory(false, None);
    program(&primary_storage, PRIMARY_ADDR, PRIMARY_ADDR, &current_image);
    program(&secondary_storage, SECONDARY_ADDR, SECONDARY_ADDR, &staged_image);

    let (mut boot, _) = make_boot(
        &primary_storage,
        &secondary_storage,
        false,
        false,
        false,
        false,
        None,
    );
    assert_eq!(boot.run().unwrap(), BootOutcome::Jump(PRIMARY_ADDR + 64));

    // the broken staged image did not touch the primary slot
    let header = ImageHeader::parse(&read_flash(
        &primary_storage,
        PRIMARY_ADDR,
        PRIMARY_ADDR,
        64,
    ))
    .unwrap();
    assert_eq!(header.img_index, 0);
}

#[test]
fn test_anti_rollback_ignores_equal_firmware_version() {
    let current_image = build_crc32_image(&make_firmware(300, PRIMARY_ADDR), 0, (1, 0, 0));
    // newer index but identical firmware version
    let staged_image = build_crc32_image(&make_firmware(200, PRIMARY_ADDR), 1, (1, 0, 0));

    let (_, primary_storage) = primary_memory(None);
    let (_, secondary_storage) = secondary_memory(false, None);
    program(&primary_storage, PRIMARY_ADDR, PRIMARY_ADDR, &current_image);
    program(&secondary_storage, SECONDARY_ADDR, SECONDARY_ADDR, &staged_image);

    let (mut boot, _) = make_boot(
        &primary_storage,
        &secondary_storage,
        false,
        true,
        false,
        false,
        None,
    );
    assert_eq!(boot.run().unwrap(), BootOutcome::Jump(PRIMARY_ADDR + 64));
}

#[test]
fn test_boot_without_any_valid_image_errors() {
    let (_, primary_storage) = primary_memory(None);
    let (_, secondary_storage) = secondary_memory(false, None);

    let (mut boot, _) = make_boot(
        &primary_storage,
        &secondary_storage,
        false,
        false,
        false,
        false,
        None,
    );
    assert!(boot.run().is_err());
    assert_eq!(boot.state(), BootState::Error);
}
