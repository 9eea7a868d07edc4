// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the cross-reset mailbox record.

use ferroboot_core::mailbox::{
    BootMailBox, MailboxPort, RamMailbox, BOOT_MAILBOX_SIGNATURE, BOOT_MAILBOX_SIZE,
};

#[test]
fn test_with_psk_produces_a_valid_record() {
    let record = BootMailBox::with_psk(b"0123456789abcdef0123456789abcdef").unwrap();
    assert!(record.check());
    assert_eq!(record.signature, BOOT_MAILBOX_SIGNATURE);
    assert_eq!(record.psk_size, 32);
}

#[test]
fn test_with_psk_rejects_bad_lengths() {
    assert!(BootMailBox::with_psk(&[]).is_err());
    assert!(BootMailBox::with_psk(&[0u8; 33]).is_err());
}

#[test]
fn test_signature_value() {
    assert_eq!(BOOT_MAILBOX_SIGNATURE, 0x1B24_1671);
}

#[test]
fn test_encode_decode_roundtrip() {
    let record = BootMailBox::with_psk(b"sixteen-byte-key").unwrap();
    let decoded = BootMailBox::decode(&record.encode());
    assert_eq!(decoded, record);
}

#[test]
fn test_zeroed_record_fails_check() {
    assert!(!BootMailBox::zeroed().check());
}

#[test]
fn test_corrupted_signature_fails_check() {
    let mut record = BootMailBox::with_psk(b"sixteen-byte-key").unwrap();
    record.signature ^= 1;
    assert!(!record.check());
}

#[test]
fn test_ram_mailbox_is_shared_across_ports() {
    let mut writer = RamMailbox::new();
    let reader = writer.share();

    let record = BootMailBox::with_psk(b"sixteen-byte-key").unwrap();
    writer.set(&record);
    assert_eq!(reader.get(), record);

    // zeroing through one port is visible through the other
    writer.set(&BootMailBox::zeroed());
    assert_eq!(reader.raw(), [0u8; BOOT_MAILBOX_SIZE]);
}
