//! Asynchronous write/read/compare verification for block devices.
//!
//! A run writes a deterministic per-block pattern over an LBA range, or reads
//! the range back and checks it, keeping up to `queues × depth` operations
//! in flight through a [`Driver`].
//!
//! # Example
//!
//! ```
//! use wrc_core::sim::SimDevice;
//! use wrc_core::{run, Driver, Mode, Namespace, RunRequest};
//!
//! let mut dev = SimDevice::new(Namespace {
//!     device: "sim0".to_string(),
//!     block_size: 512,
//!     block_count: 1024,
//!     queue_count: 4,
//!     queue_size: 16,
//!     max_blocks_per_io: 64,
//!     blocks_per_page: 8,
//! });
//!
//! let mut request = RunRequest::new(Mode::Write, 0xDEAD_BEEF);
//! request.queue_count = 4;
//! request.queue_depth = 8;
//! let config = request.validate(dev.namespace()).unwrap();
//! run(&mut dev, config, std::io::sink()).unwrap();
//!
//! let mut request = RunRequest::new(Mode::Read, 0xDEAD_BEEF);
//! request.queue_count = 4;
//! request.queue_depth = 8;
//! let config = request.validate(dev.namespace()).unwrap();
//! let report = run(&mut dev, config, std::io::sink()).unwrap();
//! assert_eq!(report.mismatch_count(), 0);
//! ```

#![warn(clippy::all)]

mod buffer;
mod config;
mod driver;
mod error;
mod namespace;
pub mod pattern;
pub mod sampler;
mod scheduler;
pub mod sim;
mod slots;
pub mod verify;

pub use buffer::{Buffer, BUFFER_ALIGN};
pub use config::{
    Mode, RunConfig, RunRequest, DEFAULT_IO_TIMEOUT, DEFAULT_QUEUE_COUNT, DEFAULT_QUEUE_DEPTH,
};
pub use driver::{Driver, IoHandle, IoOp, Poll, SubmitRejected};
pub use error::{ConfigError, Error, Result};
pub use namespace::Namespace;
pub use pattern::PatternEngine;
pub use scheduler::{run, run_with_diagnostics, Progress, RunReport, Scheduler};
pub use slots::{Slot, SlotPool};
pub use verify::Mismatch;
