//! Namespace capability descriptor.

use serde::Serialize;

/// Device capabilities as reported by the driver. Immutable for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Namespace {
    /// Device name used in the banner line.
    pub device: String,
    /// Bytes per logical block.
    pub block_size: u32,
    /// Total logical blocks.
    pub block_count: u64,
    /// Number of I/O queues available.
    pub queue_count: u32,
    /// Entries per queue. One entry is reserved, so usable depth is `queue_size - 1`.
    pub queue_size: u32,
    /// Largest transfer in blocks.
    pub max_blocks_per_io: u32,
    /// Blocks per memory page; transfers must be a multiple of this.
    pub blocks_per_page: u32,
}

impl Namespace {
    /// Largest queue depth a run may request.
    #[inline]
    #[must_use]
    pub fn max_queue_depth(&self) -> u32 {
        self.queue_size.saturating_sub(1)
    }

    /// Bytes covered by `nlb` blocks.
    #[inline]
    #[must_use]
    pub fn bytes_for(&self, nlb: u32) -> usize {
        nlb as usize * self.block_size as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns() -> Namespace {
        Namespace {
            device: "sim0".to_string(),
            block_size: 512,
            block_count: 1 << 20,
            queue_count: 16,
            queue_size: 1024,
            max_blocks_per_io: 256,
            blocks_per_page: 8,
        }
    }

    #[test]
    fn test_max_queue_depth_reserves_one_entry() {
        assert_eq!(ns().max_queue_depth(), 1023);
    }

    #[test]
    fn test_bytes_for() {
        assert_eq!(ns().bytes_for(10), 5120);
    }
}
