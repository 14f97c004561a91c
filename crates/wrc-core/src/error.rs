//! Error types for wrc-core.

use thiserror::Error;

/// Parameter validation failures, all detected before any I/O is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Requested LBA range runs past the end of the namespace.
    #[error("max block count is {max:#x} (requested start {start_lba:#x} count {block_count:#x})")]
    OutOfRange {
        /// Requested starting LBA.
        start_lba: u64,
        /// Requested block count.
        block_count: u64,
        /// Namespace block count.
        max: u64,
    },

    /// Queue count or depth exceeds what the namespace exposes.
    #[error("max qcount={max_queues} qdepth={max_depth} (requested qcount={queues} qdepth={depth})")]
    CapabilityExceeded {
        /// Requested queue count.
        queues: u32,
        /// Requested queue depth.
        depth: u32,
        /// Namespace queue count.
        max_queues: u32,
        /// Largest usable queue depth.
        max_depth: u32,
    },

    /// Blocks per I/O is too large or not page aligned.
    #[error("invalid nbpio {requested} (max {max}, must be a multiple of {blocks_per_page})")]
    InvalidTransferSize {
        /// Requested blocks per I/O.
        requested: u32,
        /// Namespace maximum.
        max: u32,
        /// Required granularity.
        blocks_per_page: u32,
    },
}

/// Errors that terminate a verification run.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or out-of-range run parameters.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Device could not be opened or probed.
    #[error("failed to open device {device}: {reason}")]
    Open {
        /// Device identifier as given.
        device: String,
        /// Cause.
        reason: String,
    },

    /// Device buffer allocation failed.
    #[error("buffer allocation of {size:#x} bytes failed")]
    Allocation {
        /// Requested size in bytes.
        size: usize,
    },

    /// Driver refused a submission.
    #[error("{op} submit q={queue} lba={lba:#x} nlb={nlb:#x} failed: {reason}")]
    Submit {
        /// Operation kind.
        op: crate::IoOp,
        /// Queue index.
        queue: u32,
        /// Starting LBA.
        lba: u64,
        /// Block count.
        nlb: u32,
        /// Cause.
        reason: String,
    },

    /// Device reported a hard failure on an operation.
    #[error("poll error={status:#x} slba={lba:#x} nlb={nlb:#x}")]
    Io {
        /// Driver status code.
        status: i32,
        /// Starting LBA of the failed operation.
        lba: u64,
        /// Block count of the failed operation.
        nlb: u32,
    },

    /// No completion observed within the timeout bound.
    #[error("poll timeout slba={lba:#x} nlb={nlb:#x}")]
    Timeout {
        /// Starting LBA of the stalled operation.
        lba: u64,
        /// Block count of the stalled operation.
        nlb: u32,
    },

    /// Writing progress output failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

/// Result type for verification runs.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_out_of_range() {
        let err = Error::from(ConfigError::OutOfRange {
            start_lba: 0x10,
            block_count: 0x100,
            max: 0x80,
        });
        let msg = err.to_string();
        assert!(msg.contains("config error"));
        assert!(msg.contains("max block count is 0x80"));
    }

    #[test]
    fn test_error_display_io() {
        let err = Error::Io {
            status: 0x281,
            lba: 0x1f4,
            nlb: 10,
        };
        assert_eq!(err.to_string(), "poll error=0x281 slba=0x1f4 nlb=0xa");
    }

    #[test]
    fn test_error_display_timeout() {
        let err = Error::Timeout { lba: 0x40, nlb: 8 };
        assert_eq!(err.to_string(), "poll timeout slba=0x40 nlb=0x8");
    }

    #[test]
    fn test_error_display_invalid_transfer() {
        let err = ConfigError::InvalidTransferSize {
            requested: 12,
            max: 256,
            blocks_per_page: 8,
        };
        assert!(err.to_string().contains("invalid nbpio 12"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
