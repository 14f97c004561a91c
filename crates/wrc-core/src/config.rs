//! Run configuration and validation against namespace capabilities.

use crate::error::ConfigError;
use crate::namespace::Namespace;
use serde::Serialize;
use std::time::Duration;

/// Fixed bound on time without any completion before a run is declared stalled.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Default number of I/O queues.
pub const DEFAULT_QUEUE_COUNT: u32 = 16;

/// Default depth per queue.
pub const DEFAULT_QUEUE_DEPTH: u32 = 64;

/// Direction of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Write the pattern.
    Write,
    /// Read back and compare against the pattern.
    Read,
}

impl Mode {
    /// Banner label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Mode::Write => "WRITE",
            Mode::Read => "READ",
        }
    }
}

/// Unvalidated run parameters, as collected from the command line.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub mode: Mode,
    pub start_lba: u64,
    /// `None` (or zero) means "to the end of the device".
    pub block_count: Option<u64>,
    pub pattern: u64,
    pub pattern_increment: u64,
    pub queue_count: u32,
    pub queue_depth: u32,
    /// `None` (or zero) means "device maximum".
    pub blocks_per_io: Option<u32>,
    /// `None` disables progress sampling.
    pub sample_interval: Option<Duration>,
    pub timeout: Duration,
}

impl RunRequest {
    /// Request with default queue layout and timeout.
    #[must_use]
    pub fn new(mode: Mode, pattern: u64) -> Self {
        Self {
            mode,
            start_lba: 0,
            block_count: None,
            pattern,
            pattern_increment: 0,
            queue_count: DEFAULT_QUEUE_COUNT,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            blocks_per_io: None,
            sample_interval: None,
            timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Validate against `ns`, filling in defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the range, queue layout or transfer size
    /// exceeds what the namespace supports.
    pub fn validate(&self, ns: &Namespace) -> Result<RunConfig, ConfigError> {
        let requested = self.block_count.filter(|&n| n > 0);
        let out_of_range = || ConfigError::OutOfRange {
            start_lba: self.start_lba,
            block_count: requested.unwrap_or(0),
            max: ns.block_count,
        };

        let end = self
            .start_lba
            .checked_add(requested.unwrap_or(0))
            .ok_or_else(out_of_range)?;
        if end > ns.block_count {
            return Err(out_of_range());
        }

        if self.queue_count == 0
            || self.queue_depth == 0
            || self.queue_count > ns.queue_count
            || self.queue_depth >= ns.queue_size
        {
            return Err(ConfigError::CapabilityExceeded {
                queues: self.queue_count,
                depth: self.queue_depth,
                max_queues: ns.queue_count,
                max_depth: ns.max_queue_depth(),
            });
        }

        let block_count = match requested {
            Some(n) => n,
            None if self.start_lba < ns.block_count => ns.block_count - self.start_lba,
            None => return Err(out_of_range()),
        };

        let blocks_per_io = self
            .blocks_per_io
            .filter(|&n| n > 0)
            .unwrap_or(ns.max_blocks_per_io);
        if blocks_per_io > ns.max_blocks_per_io
            || ns.blocks_per_page == 0
            || blocks_per_io % ns.blocks_per_page != 0
        {
            return Err(ConfigError::InvalidTransferSize {
                requested: blocks_per_io,
                max: ns.max_blocks_per_io,
                blocks_per_page: ns.blocks_per_page,
            });
        }

        Ok(RunConfig {
            mode: self.mode,
            start_lba: self.start_lba,
            block_count,
            pattern: self.pattern,
            pattern_increment: self.pattern_increment,
            queue_count: self.queue_count,
            queue_depth: self.queue_depth,
            blocks_per_io,
            sample_interval: self.sample_interval.filter(|d| !d.is_zero()),
            timeout: self.timeout,
        })
    }
}

/// Validated, immutable run parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    pub mode: Mode,
    pub start_lba: u64,
    pub block_count: u64,
    pub pattern: u64,
    pub pattern_increment: u64,
    pub queue_count: u32,
    pub queue_depth: u32,
    pub blocks_per_io: u32,
    #[serde(skip)]
    pub sample_interval: Option<Duration>,
    #[serde(skip)]
    pub timeout: Duration,
}

impl RunConfig {
    /// Last LBA covered by the run.
    #[inline]
    #[must_use]
    pub fn last_lba(&self) -> u64 {
        (self.start_lba + self.block_count).saturating_sub(1)
    }
}
