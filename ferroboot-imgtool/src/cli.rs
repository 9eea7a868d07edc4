// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use rand::RngCore;

use ferroboot_core::builder::{ImageBuilder, TrailerSpec};
use ferroboot_core::cipher::AES_BLOCK_SIZE;
use ferroboot_core::image::parse_semver;
use ferroboot_core::verify::{AuthAlgo, IntegrityAlgo};

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "ferroboot-imgtool")]
#[command(about = "Build update images for the ferroboot IAP engine")]
pub struct Cli {
    /// Input firmware binary
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Output image file
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Image index
    #[arg(short = 'x', long, default_value = "0")]
    pub index: u32,

    /// VTOR alignment of the binary start, in bytes (0 = none)
    #[arg(short = 'p', long, default_value = "0")]
    pub vtor_align: u32,

    /// Firmware version (major.minor.patch)
    #[arg(short = 'f', long, default_value = "1.0.0")]
    pub firmware_version: String,

    /// Encryption algorithm (aes-cbc)
    #[arg(short = 'e', long, requires = "encryption_key")]
    pub encryption_algo: Option<String>,

    /// Encryption key (16, 24 or 32 bytes)
    #[arg(short = 'k', long)]
    pub encryption_key: Option<String>,

    /// Authentication algorithm (hmac-md5, hmac-sha256, hmac-sha512)
    #[arg(short = 'a', long, requires = "auth_key", conflicts_with_all = ["sign_algo", "integrity_algo"])]
    pub auth_algo: Option<String>,

    /// Authentication key
    #[arg(short = 'u', long)]
    pub auth_key: Option<String>,

    /// Signature algorithm (ecdsa-sha256, rsa-sha256)
    #[arg(short = 's', long, requires = "sign_key", conflicts_with = "integrity_algo")]
    pub sign_algo: Option<String>,

    /// PEM private key file for signing
    #[arg(short = 'g', long, value_name = "FILE")]
    pub sign_key: Option<PathBuf>,

    /// Integrity algorithm (crc32, md5, sha1, sha224, sha256, sha384, sha512)
    #[arg(short = 'n', long)]
    pub integrity_algo: Option<String>,
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let binary = fs::read(&cli.input)
        .with_context(|| format!("failed to read input binary {}", cli.input.display()))?;

    let mut builder = ImageBuilder::new(make_trailer(&cli)?);
    builder.index = cli.index;
    builder.vtor_align = cli.vtor_align;
    builder.firmware_version = parse_semver(&cli.firmware_version)
        .map_err(|_| anyhow::anyhow!("invalid firmware version '{}'", cli.firmware_version))?;
    builder.timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    if let Some(algo) = &cli.encryption_algo {
        if algo != "aes-cbc" {
            bail!("unsupported encryption algorithm '{algo}'");
        }
        let key = cli.encryption_key.as_ref().unwrap().as_bytes().to_vec();
        let mut iv = [0u8; AES_BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);
        builder.encryption = Some((key, iv));
    }

    let image = builder
        .build(&binary)
        .map_err(|e| anyhow::anyhow!("failed to build image: {e}"))?;

    fs::write(&cli.output, &image)
        .with_context(|| format!("failed to write image {}", cli.output.display()))?;

    info!(
        "wrote {} ({} bytes, binary {} bytes)",
        cli.output.display(),
        image.len(),
        binary.len()
    );
    Ok(())
}

fn make_trailer(cli: &Cli) -> Result<TrailerSpec> {
    if let Some(algo) = &cli.sign_algo {
        let pem_path = cli.sign_key.as_ref().unwrap();
        let pem = fs::read_to_string(pem_path)
            .with_context(|| format!("failed to read key {}", pem_path.display()))?;
        let spec = match algo.as_str() {
            "rsa-sha256" => TrailerSpec::rsa_sha256_from_pem(&pem),
            "ecdsa-sha256" => TrailerSpec::ecdsa_sha256_from_pem(&pem),
            other => bail!("unsupported signature algorithm '{other}'"),
        };
        return spec.map_err(|_| anyhow::anyhow!("failed to parse private key"));
    }

    if let Some(algo) = &cli.auth_algo {
        let algo = match algo.as_str() {
            "hmac-md5" => AuthAlgo::HmacMd5,
            "hmac-sha256" => AuthAlgo::HmacSha256,
            "hmac-sha512" => AuthAlgo::HmacSha512,
            other => bail!("unsupported authentication algorithm '{other}'"),
        };
        return Ok(TrailerSpec::Authentication {
            algo,
            key: cli.auth_key.as_ref().unwrap().as_bytes().to_vec(),
        });
    }

    // Default check data method: CRC32.
    let algo = match cli.integrity_algo.as_deref() {
        None | Some("crc32") => IntegrityAlgo::Crc32,
        Some("md5") => IntegrityAlgo::Md5,
        Some("sha1") => IntegrityAlgo::Sha1,
        Some("sha224") => IntegrityAlgo::Sha224,
        Some("sha256") => IntegrityAlgo::Sha256,
        Some("sha384") => IntegrityAlgo::Sha384,
        Some("sha512") => IntegrityAlgo::Sha512,
        Some(other) => bail!("unsupported integrity algorithm '{other}'"),
    };
    Ok(TrailerSpec::Integrity(algo))
}
