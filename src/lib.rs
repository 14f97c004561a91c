//! # wrc
//!
//! Multi-queue write/read/compare verification for block devices.
//!
//! This is the workspace root crate that re-exports core functionality.
//! For direct usage, depend on individual sub-crates:
//!
//! - [`wrc-core`] - Run configuration, pattern engine, scheduler and the
//!   simulated device
//! - [`wrc-uring`] - io_uring driver and the `wrc` binary

pub use wrc_core::*;
