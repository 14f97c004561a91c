//! Command-line interface for wrc.

use clap::{ArgGroup, Parser};
use std::path::PathBuf;
use std::time::Duration;
use wrc_core::{Mode, RunRequest, DEFAULT_QUEUE_COUNT, DEFAULT_QUEUE_DEPTH};

/// wrc - write a data pattern to a block device, or read it back and compare
#[derive(Parser, Debug)]
#[command(name = "wrc")]
#[command(author, version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").required(true).args(["write", "read"])))]
pub struct Cli {
    /// Write the specified (64-bit) data pattern
    #[arg(short = 'w', value_name = "PATTERN", value_parser = parse_number)]
    pub write: Option<u64>,

    /// Read and compare against the specified data pattern
    #[arg(short = 'r', value_name = "PATTERN", value_parser = parse_number)]
    pub read: Option<u64>,

    /// Increment data pattern at each LBA
    #[arg(short = 'i', value_name = "PATINC", default_value = "0", value_parser = parse_number)]
    pub increment: u64,

    /// Starting LBA
    #[arg(short = 'a', value_name = "LBA", default_value = "0", value_parser = parse_number)]
    pub start_lba: u64,

    /// Number of blocks to read/write (default to end of device)
    #[arg(short = 'n', value_name = "COUNT", value_parser = parse_number)]
    pub count: Option<u64>,

    /// Number of queues for async IO
    #[arg(short = 'q', value_name = "QCOUNT", default_value_t = DEFAULT_QUEUE_COUNT, value_parser = parse_u32)]
    pub queues: u32,

    /// Queue depth for async IO
    #[arg(short = 'd', value_name = "QDEPTH", default_value_t = DEFAULT_QUEUE_DEPTH, value_parser = parse_u32)]
    pub depth: u32,

    /// Number of blocks per IO (default max supported)
    #[arg(short = 'm', value_name = "NBPIO", value_parser = parse_u32)]
    pub blocks_per_io: Option<u32>,

    /// Print progress with LBA data every INTERVAL seconds
    #[arg(short = 'p', value_name = "INTERVAL", value_parser = parse_number)]
    pub interval: Option<u64>,

    /// Seconds without any completion before the run is declared stalled
    #[arg(long, value_name = "SECONDS", default_value_t = 60, value_parser = parse_number)]
    pub timeout: u64,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Block device or image file
    pub device: PathBuf,
}

impl Cli {
    /// Selected direction and pattern.
    #[must_use]
    pub fn mode(&self) -> (Mode, u64) {
        match (self.write, self.read) {
            (Some(pattern), _) => (Mode::Write, pattern),
            (None, Some(pattern)) => (Mode::Read, pattern),
            (None, None) => (Mode::Read, 0),
        }
    }

    /// Unvalidated run parameters.
    #[must_use]
    pub fn request(&self) -> RunRequest {
        let (mode, pattern) = self.mode();
        RunRequest {
            mode,
            start_lba: self.start_lba,
            block_count: self.count,
            pattern,
            pattern_increment: self.increment,
            queue_count: self.queues,
            queue_depth: self.depth,
            blocks_per_io: self.blocks_per_io,
            sample_interval: self.interval.map(Duration::from_secs),
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

/// Parse an unsigned integer the way C's `strtoull(s, 0, 0)` does: `0x`
/// prefix for hex, leading `0` for octal, decimal otherwise.
pub fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };
    u64::from_str_radix(digits, radix).map_err(|e| format!("invalid number '{s}': {e}"))
}

/// [`parse_number`] narrowed to `u32`.
pub fn parse_u32(s: &str) -> Result<u32, String> {
    let n = parse_number(s)?;
    u32::try_from(n).map_err(|_| format!("{s} exceeds {}", u32::MAX))
}
