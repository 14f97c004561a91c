//! Read-back verification against the pattern engine.

use crate::pattern::{word_at, PatternEngine};
use serde::Serialize;
use std::fmt;

/// First difference found in a completed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    /// Block that differs.
    pub lba: u64,
    /// Byte offset of the differing word. Fixed-mode checks compare whole
    /// blocks and leave this unset.
    pub offset: Option<usize>,
    /// Expected word value.
    pub expected: u64,
    /// Observed word value, when the check is word-granular.
    pub observed: Option<u64>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data mismatch at LBA {:#x}", self.lba)?;
        if let Some(offset) = self.offset {
            write!(f, " offset {offset:#x}")?;
        }
        write!(f, " exp {:#018x}", self.expected)?;
        if let Some(observed) = self.observed {
            write!(f, " obs {observed:#018x}")?;
        }
        Ok(())
    }
}

/// Compare blocks `lba..lba + nlb` of `buf` against the expected pattern.
///
/// Stops at the first differing block and returns its location together
/// with the block's bytes, for dumping.
#[must_use]
pub fn check<'a>(
    engine: &PatternEngine,
    buf: &'a [u8],
    lba: u64,
    nlb: u32,
) -> Option<(Mismatch, &'a [u8])> {
    let block_size = engine.block_size();
    let words = block_size / std::mem::size_of::<u64>();

    for (block, blba) in buf.chunks_exact(block_size).take(nlb as usize).zip(lba..) {
        if let Some(reference) = engine.reference_block() {
            if block != reference {
                let mismatch = Mismatch {
                    lba: blba,
                    offset: None,
                    expected: engine.pattern(),
                    observed: None,
                };
                return Some((mismatch, block));
            }
            continue;
        }

        let expected = engine.block_value(blba);
        if let Some(i) = (0..words).find(|&i| word_at(block, i) != expected) {
            let mismatch = Mismatch {
                lba: blba,
                offset: Some(i * std::mem::size_of::<u64>()),
                expected,
                observed: Some(word_at(block, i)),
            };
            return Some((mismatch, block));
        }
    }
    None
}
