// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Update image builder CLI.
//!
//! Usage:
//!   ferroboot-imgtool -i firmware.bin -o update.img -f 1.2.0 -n crc32
//!   ferroboot-imgtool -i firmware.bin -o update.img -s rsa-sha256 -g key.pem
//!   ferroboot-imgtool -i firmware.bin -o update.img -e aes-cbc -k <key> -n crc32

mod cli;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    env_logger::init();
    let args = cli::Cli::parse();
    cli::run(args)
}
