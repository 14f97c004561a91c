//! Per-block data pattern generation.
//!
//! Every 64-bit word of a block carries the same value. In fixed mode that
//! value is the pattern itself; in incrementing mode it advances by the
//! increment once per block, counted from the run's starting LBA:
//!
//! ```text
//! value(L) = pattern + (L - start_lba) * increment
//! ```
//!
//! Arithmetic wraps, so any pattern/increment pair is valid for any range.

use crate::config::RunConfig;

const WORD: usize = std::mem::size_of::<u64>();

/// Generates and exposes the expected content of every block in a run.
#[derive(Debug, Clone)]
pub struct PatternEngine {
    pattern: u64,
    increment: u64,
    start_lba: u64,
    block_size: usize,
    /// One block of repeated pattern words, present only in fixed mode.
    reference: Option<Box<[u8]>>,
}

impl PatternEngine {
    /// Build the engine for a run over blocks of `block_size` bytes.
    #[must_use]
    pub fn new(pattern: u64, increment: u64, start_lba: u64, block_size: usize) -> Self {
        let reference = (increment == 0).then(|| {
            let mut block = vec![0u8; block_size].into_boxed_slice();
            fill_words(&mut block, pattern);
            block
        });
        Self {
            pattern,
            increment,
            start_lba,
            block_size,
            reference,
        }
    }

    /// Engine for a validated run configuration.
    #[must_use]
    pub fn for_run(config: &RunConfig, block_size: u32) -> Self {
        Self::new(
            config.pattern,
            config.pattern_increment,
            config.start_lba,
            block_size as usize,
        )
    }

    /// True when every block carries the same value.
    #[inline]
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        self.reference.is_some()
    }

    #[inline]
    #[must_use]
    pub fn pattern(&self) -> u64 {
        self.pattern
    }

    #[inline]
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Expected value of every word in block `lba`.
    #[inline]
    #[must_use]
    pub fn block_value(&self, lba: u64) -> u64 {
        self.pattern
            .wrapping_add(lba.wrapping_sub(self.start_lba).wrapping_mul(self.increment))
    }

    /// Expected value of word `word_offset` in block `lba`.
    #[inline]
    #[must_use]
    pub fn expected_value(&self, lba: u64, word_offset: usize) -> u64 {
        debug_assert!(word_offset < self.block_size / WORD);
        self.block_value(lba)
    }

    /// The fixed-mode reference block.
    #[inline]
    #[must_use]
    pub fn reference_block(&self) -> Option<&[u8]> {
        self.reference.as_deref()
    }

    /// Write the expected content of blocks `lba..lba + nlb` into `buf`.
    pub fn fill(&self, buf: &mut [u8], lba: u64, nlb: u32) {
        for (block, lba) in buf
            .chunks_exact_mut(self.block_size)
            .take(nlb as usize)
            .zip(lba..)
        {
            match &self.reference {
                Some(reference) => block.copy_from_slice(reference),
                None => fill_words(block, self.block_value(lba)),
            }
        }
    }

    /// Fill a whole buffer with the fixed reference block. No-op in
    /// incrementing mode, where [`fill`](Self::fill) runs per operation.
    pub fn prefill(&self, buf: &mut [u8]) {
        if let Some(reference) = &self.reference {
            for block in buf.chunks_exact_mut(self.block_size) {
                block.copy_from_slice(reference);
            }
        }
    }
}

/// Store `value` into every native-endian word of `block`.
#[inline]
pub fn fill_words(block: &mut [u8], value: u64) {
    let bytes = value.to_ne_bytes();
    for word in block.chunks_exact_mut(WORD) {
        word.copy_from_slice(&bytes);
    }
}

/// Read word `index` of `block` in native byte order.
#[inline]
#[must_use]
pub fn word_at(block: &[u8], index: usize) -> u64 {
    let mut bytes = [0u8; WORD];
    bytes.copy_from_slice(&block[index * WORD..(index + 1) * WORD]);
    u64::from_ne_bytes(bytes)
}
