//! Driver interface consumed by the scheduler.
//!
//! The driver owns everything below the slot grid: queue mechanics, DMA and
//! the device itself. The scheduler only allocates buffers, submits
//! operations and polls them.
//!
//! Ownership of a slot buffer moves into the driver at [`Driver::submit`] and
//! comes back out of [`Driver::poll`] once the operation is terminal. A
//! handle is consumed by every poll and handed back only while pending, so
//! no operation can be observed complete twice.

use crate::buffer::Buffer;
use crate::namespace::Namespace;
use std::fmt;

/// Transfer direction of a single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IoOp::Read => "read",
            IoOp::Write => "write",
        })
    }
}

/// In-flight operation as seen by the scheduler.
pub trait IoHandle {
    /// Starting LBA.
    fn lba(&self) -> u64;

    /// Number of blocks.
    fn block_count(&self) -> u32;
}

/// Result of a non-blocking poll.
#[derive(Debug)]
pub enum Poll<H> {
    /// Finished without error; the buffer returns to the caller.
    Complete(Buffer),
    /// Not finished yet; the handle returns to the caller.
    Pending(H),
    /// Device reported a failure with the given status code.
    Error { status: i32, buffer: Buffer },
}

/// Reason a submission was refused.
#[derive(Debug)]
pub struct SubmitRejected {
    /// The buffer that was offered.
    pub buffer: Buffer,
    pub reason: String,
}

/// Narrow interface to an opened namespace.
///
/// Opening happens in the implementor's constructor; closing happens in
/// [`Driver::close`] or on drop.
pub trait Driver {
    /// Handle for one submitted operation.
    type Handle: IoHandle;

    /// Capabilities of the opened namespace.
    fn namespace(&self) -> &Namespace;

    /// Allocate a device-visible buffer of `size` bytes.
    fn alloc_buffer(&mut self, size: usize) -> Option<Buffer>;

    /// Return a buffer obtained from [`alloc_buffer`](Self::alloc_buffer).
    fn free_buffer(&mut self, buffer: Buffer) {
        drop(buffer);
    }

    /// Queue an asynchronous transfer of `nlb` blocks at `lba` on `queue`.
    ///
    /// # Errors
    ///
    /// Returns the buffer with a reason if the driver cannot accept the
    /// operation.
    fn submit(
        &mut self,
        op: IoOp,
        queue: u32,
        buffer: Buffer,
        lba: u64,
        nlb: u32,
    ) -> Result<Self::Handle, SubmitRejected>;

    /// Check an operation for completion without blocking.
    fn poll(&mut self, handle: Self::Handle) -> Poll<Self::Handle>;

    /// Release the namespace. Called once after the run, whatever its outcome.
    fn close(&mut self) {}
}
