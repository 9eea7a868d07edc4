// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Unit tests for the image header codec and the image builder format.

mod common;

use ferroboot_core::error::Error;
use ferroboot_core::image::{
    pack_version, parse_semver, ImageHeader, ImageType, CRC32, IMAGE_HEADER_SIZE,
    IMAGE_HEADER_VERSION,
};
use ferroboot_core::verify::IntegrityAlgo;
use ferroboot_core::{ImageBuilder, TrailerSpec};

fn sample_header() -> ImageHeader {
    let mut header = ImageHeader {
        head_vers: IMAGE_HEADER_VERSION,
        img_index: 7,
        img_type: ImageType::App,
        data_padding: 448,
        data_size: 0x1234,
        data_vers: pack_version(2, 5, 19),
        img_time: 0x0102_0304_0506_0708,
        head_crc: 0,
    };
    header.update_crc();
    header
}

// =============================================================================
// version packing
// =============================================================================

#[test]
fn test_pack_version() {
    assert_eq!(pack_version(1, 1, 0), 0x0001_0100);
    assert_eq!(pack_version(1, 0, 0), 0x0001_0000);
    assert_eq!(pack_version(0, 9, 0), 0x0000_0900);
    assert_eq!(IMAGE_HEADER_VERSION, 0x0001_0100);
}

#[test]
fn test_parse_semver() {
    assert_eq!(parse_semver("1.2.3").unwrap(), pack_version(1, 2, 3));
    assert_eq!(parse_semver("0.0.1").unwrap(), 1);
    assert!(parse_semver("1.2").is_err());
    assert!(parse_semver("1.2.3.4").is_err());
    assert!(parse_semver("a.b.c").is_err());
}

// =============================================================================
// header codec
// =============================================================================

#[test]
fn test_header_roundtrip() {
    let header = sample_header();
    let encoded = header.encode();
    assert_eq!(encoded.len(), IMAGE_HEADER_SIZE);

    let parsed = ImageHeader::parse(&encoded).unwrap();
    assert_eq!(parsed, header);
}

#[test]
fn test_header_layout_offsets() {
    let header = sample_header();
    let encoded = header.encode();

    assert_eq!(&encoded[0..4], &IMAGE_HEADER_VERSION.to_le_bytes());
    assert_eq!(&encoded[4..8], &7u32.to_le_bytes());
    assert_eq!(encoded[8], 1); // APP
    assert_eq!(&encoded[9..13], &448u32.to_le_bytes());
    assert_eq!(&encoded[13..17], &0x1234u32.to_le_bytes());
    assert_eq!(&encoded[17..21], &pack_version(2, 5, 19).to_le_bytes());
    assert_eq!(&encoded[21..29], &0x0102_0304_0506_0708u64.to_le_bytes());
    // reserved bytes are emitted as zero
    assert!(encoded[29..60].iter().all(|&b| b == 0));
    assert_eq!(&encoded[60..64], &header.head_crc.to_le_bytes());
}

#[test]
fn test_header_crc_covers_first_sixty_bytes() {
    let header = sample_header();
    let encoded = header.encode();
    assert_eq!(CRC32.checksum(&encoded[..60]), header.head_crc);
}

#[test]
fn test_header_parse_rejects_corruption() {
    let mut encoded = sample_header().encode();
    encoded[13] ^= 0xFF;
    assert_eq!(ImageHeader::parse(&encoded), Err(Error::InvalidImageHeader));
}

#[test]
fn test_header_parse_rejects_unknown_version() {
    let mut header = sample_header();
    header.head_vers = pack_version(9, 0, 0);
    header.update_crc();
    assert_eq!(
        ImageHeader::parse(&header.encode()),
        Err(Error::InvalidImageHeaderVersion)
    );
}

#[test]
fn test_header_parse_rejects_short_buffer() {
    let encoded = sample_header().encode();
    assert_eq!(
        ImageHeader::parse(&encoded[..IMAGE_HEADER_SIZE - 1]),
        Err(Error::InvalidLength)
    );
}

#[test]
fn test_unknown_image_type_decodes_to_none() {
    let mut encoded = sample_header().encode();
    encoded[8] = 9;
    let raw: &[u8; IMAGE_HEADER_SIZE] = &encoded;
    assert_eq!(ImageHeader::decode(raw).img_type, ImageType::None);
}

// =============================================================================
// builder format
// =============================================================================

#[test]
fn test_builder_plain_image_layout() {
    let firmware = common::make_firmware(300, 0x0800_0000);
    let image = common::build_crc32_image(&firmware, 3, (1, 0, 1));

    let header = ImageHeader::parse(&image).unwrap();
    assert_eq!(header.img_index, 3);
    assert_eq!(header.data_vers, pack_version(1, 0, 1));
    assert_eq!(header.data_padding, 0);
    assert_eq!(header.data_size, 300);
    assert_eq!(image.len(), IMAGE_HEADER_SIZE + 300 + 4);
    assert_eq!(&image[IMAGE_HEADER_SIZE..IMAGE_HEADER_SIZE + 300], &firmware[..]);

    // trailer = CRC32 over headCrc || payload
    let mut digest = CRC32.digest();
    digest.update(&image[60..64]);
    digest.update(&firmware);
    assert_eq!(&image[364..368], &digest.finalize().to_le_bytes());
}

#[test]
fn test_builder_vtor_padding() {
    let firmware = common::make_firmware(100, 0x0800_0000);
    let mut builder = ImageBuilder::new(TrailerSpec::Integrity(IntegrityAlgo::Crc32));
    builder.vtor_align = 512;
    let image = builder.build(&firmware).unwrap();

    let header = ImageHeader::parse(&image).unwrap();
    assert_eq!(header.data_padding, 512 - 64);
    assert_eq!(header.data_size, 448 + 100);
    // the padding is part of the payload, before the binary
    assert!(image[64..64 + 448].iter().all(|&b| b == 0));
    assert_eq!(&image[64 + 448..64 + 448 + 100], &firmware[..]);
}

#[test]
fn test_builder_encrypted_image_pads_to_cipher_block() {
    let firmware = common::make_firmware(250, 0x0800_0000);
    let mut builder = ImageBuilder::new(TrailerSpec::Integrity(IntegrityAlgo::Crc32));
    builder.encryption = Some((b"0123456789abcdef".to_vec(), [0x11; 16]));
    let image = builder.build(&firmware).unwrap();

    let header = ImageHeader::parse(&image).unwrap();
    assert_eq!(header.data_size, 256);
    // header || IV || ciphertext || crc
    assert_eq!(image.len(), 64 + 16 + 256 + 4);
    assert_eq!(&image[64..80], &[0x11; 16]);
    assert_ne!(&image[80..80 + 250], &firmware[..]);
}
