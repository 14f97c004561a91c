//! wrc - multi-queue write/read/compare for block devices
//!
//! Writes a 64-bit data pattern across an LBA range, or reads the range back
//! and compares it, keeping `QCOUNT × QDEPTH` operations in flight through
//! io_uring.
//!
//! # Usage
//!
//! ```bash
//! # Fill the first 1000 blocks with 0xAA
//! wrc -w 0xAA -n 1000 /dev/nvme0n1
//!
//! # Verify them, dumping sample blocks every 10 seconds
//! wrc -r 0xAA -n 1000 -p 10 /dev/nvme0n1
//!
//! # Per-LBA incrementing pattern on an image file
//! wrc -w 0x1000 -i 1 disk.img && wrc -r 0x1000 -i 1 disk.img
//! ```
//!
//! The exit status is the number of data mismatches found; any other failure
//! exits with status 1.

mod cli;
mod report;
mod uring;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use uring::UringDriver;
use wrc_core::{Driver, Mode};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<u8> {
    let started = Instant::now();
    let request = cli.request();

    let mut driver = UringDriver::open(&cli.device, request.mode == Mode::Write)
        .with_context(|| format!("cannot open {}", cli.device.display()))?;
    let config = request
        .validate(driver.namespace())
        .context("invalid run parameters")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    report::banner(&mut out, driver.namespace(), &config)?;

    // Mismatch lines go to stderr as they are found, ahead of any fatal
    // error that ends the drain.
    let outcome = wrc_core::run_with_diagnostics(&mut driver, config, &mut out, io::stderr());
    driver.close();
    let run_report = outcome?;

    if cli.json {
        serde_json::to_writer_pretty(&mut out, &run_report).context("failed to encode report")?;
        writeln!(out)?;
    } else if run_report.mismatch_count() == 0 {
        report::completion(&mut out, started.elapsed())?;
    }
    out.flush()?;

    Ok(run_report.exit_code())
}
