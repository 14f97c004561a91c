//! Block hex dumps and the periodic progress sampler.

use crate::pattern::word_at;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Blocks dumped each time the sampler arms.
pub const SAMPLE_BLOCKS: u32 = 2;

const LINE: usize = 32;

/// Write `block` as grouped hex, four words per line. A run of lines equal
/// to the previous one collapses to a single `*`.
///
/// # Errors
///
/// Propagates write failures from `out`.
pub fn dump_block<W: Write>(out: &mut W, block: &[u8], lba: u64) -> io::Result<()> {
    writeln!(out, "===== LBA {lba:#x} =====")?;

    let mut prev: Option<&[u8]> = None;
    let mut skipping = false;
    for (i, line) in block.chunks_exact(LINE).enumerate() {
        if prev == Some(line) {
            if !skipping {
                writeln!(out, "*")?;
                skipping = true;
            }
        } else {
            writeln!(
                out,
                "{:04x}: {:016x} {:016x} {:016x} {:016x}",
                i * LINE,
                word_at(line, 0),
                word_at(line, 1),
                word_at(line, 2),
                word_at(line, 3)
            )?;
            skipping = false;
        }
        prev = Some(line);
    }
    Ok(())
}

/// Arms a small dump budget every `interval` of wall-clock time.
#[derive(Debug, Clone)]
pub struct ProgressSampler {
    interval: Option<Duration>,
    last_sample: Instant,
    remaining: u32,
}

impl ProgressSampler {
    /// Sampler starting at `now`. An enabled sampler begins armed so the
    /// first blocks of the run are shown.
    #[must_use]
    pub fn new(interval: Option<Duration>, now: Instant) -> Self {
        Self {
            interval,
            last_sample: now,
            remaining: if interval.is_some() { SAMPLE_BLOCKS } else { 0 },
        }
    }

    #[inline]
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.remaining > 0
    }

    #[inline]
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Called on every completion. Re-arms once the interval has elapsed.
    pub fn on_completion(&mut self, now: Instant) {
        if let Some(interval) = self.interval {
            if now.duration_since(self.last_sample) > interval {
                self.last_sample = now;
                self.remaining = SAMPLE_BLOCKS;
            }
        }
    }

    /// Dump leading blocks of `buf` while the budget lasts.
    ///
    /// # Errors
    ///
    /// Propagates write failures from `out`.
    pub fn dump<W: Write>(
        &mut self,
        out: &mut W,
        buf: &[u8],
        lba: u64,
        nlb: u32,
        block_size: usize,
    ) -> io::Result<()> {
        for (block, blba) in buf.chunks_exact(block_size).take(nlb as usize).zip(lba..) {
            if self.remaining == 0 {
                break;
            }
            dump_block(out, block, blba)?;
            self.remaining -= 1;
        }
        Ok(())
    }
}
