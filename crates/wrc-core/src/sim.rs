//! In-memory simulated namespace.
//!
//! Stores written blocks sparsely and completes operations after a
//! configurable number of polls, so the scheduler can be exercised without
//! hardware. Faults (hard errors, stalls, refused submissions, corrupted
//! blocks) can be injected at chosen LBAs.

use crate::buffer::Buffer;
use crate::driver::{Driver, IoHandle, IoOp, Poll, SubmitRejected};
use crate::namespace::Namespace;
use rustc_hash::FxHashMap;

/// One accepted submission, in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitRecord {
    pub op: IoOp,
    pub queue: u32,
    pub lba: u64,
    pub nlb: u32,
}

/// Outstanding operation on a [`SimDevice`].
#[derive(Debug)]
pub struct SimHandle {
    op: IoOp,
    lba: u64,
    nlb: u32,
    buffer: Buffer,
    polls_left: u32,
}

impl IoHandle for SimHandle {
    fn lba(&self) -> u64 {
        self.lba
    }

    fn block_count(&self) -> u32 {
        self.nlb
    }
}

/// Simulated device backed by a sparse block map. Unwritten blocks read as
/// zeros.
#[derive(Debug)]
pub struct SimDevice {
    ns: Namespace,
    blocks: FxHashMap<u64, Box<[u8]>>,
    poll_latency: u32,
    stagger: bool,
    failures: Vec<(u64, i32)>,
    stalls: Vec<u64>,
    rejects: Vec<u64>,
    buffer_limit: Option<usize>,
    live_buffers: usize,
    submitted: u64,
    log: Vec<SubmitRecord>,
    completions: Vec<u64>,
}

fn covers(lba: u64, nlb: u32, target: u64) -> bool {
    (lba..lba + u64::from(nlb)).contains(&target)
}

impl SimDevice {
    #[must_use]
    pub fn new(ns: Namespace) -> Self {
        Self {
            ns,
            blocks: FxHashMap::default(),
            poll_latency: 0,
            stagger: false,
            failures: Vec::new(),
            stalls: Vec::new(),
            rejects: Vec::new(),
            buffer_limit: None,
            live_buffers: 0,
            submitted: 0,
            log: Vec::new(),
            completions: Vec::new(),
        }
    }

    /// Every operation reports pending for `polls` polls before finishing.
    #[must_use]
    pub fn with_poll_latency(mut self, polls: u32) -> Self {
        self.poll_latency = polls;
        self
    }

    /// Vary latency per operation (0, 1 or 2 extra polls) so completions
    /// arrive out of submission order.
    #[must_use]
    pub fn with_stagger(mut self) -> Self {
        self.stagger = true;
        self
    }

    /// Refuse buffer allocations beyond `limit` live buffers.
    #[must_use]
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = Some(limit);
        self
    }

    /// The operation covering `lba` completes with `status`.
    #[must_use]
    pub fn fail_at(mut self, lba: u64, status: i32) -> Self {
        self.failures.push((lba, status));
        self
    }

    /// The operation covering `lba` never completes.
    #[must_use]
    pub fn stall_at(mut self, lba: u64) -> Self {
        self.stalls.push(lba);
        self
    }

    /// Submission of the operation covering `lba` is refused.
    #[must_use]
    pub fn reject_at(mut self, lba: u64) -> Self {
        self.rejects.push(lba);
        self
    }

    /// Flip bits of one stored byte, as silent media corruption would.
    pub fn corrupt(&mut self, lba: u64, byte: usize, xor: u8) {
        let block_size = self.ns.block_size as usize;
        let block = self
            .blocks
            .entry(lba)
            .or_insert_with(|| vec![0u8; block_size].into_boxed_slice());
        block[byte] ^= xor;
    }

    /// Stored content of `lba`, if it was ever written.
    #[must_use]
    pub fn block(&self, lba: u64) -> Option<&[u8]> {
        self.blocks.get(&lba).map(AsRef::as_ref)
    }

    /// Submissions accepted so far, across all runs.
    #[must_use]
    pub fn submissions(&self) -> &[SubmitRecord] {
        &self.log
    }

    /// Starting LBAs of completed operations, in completion order.
    #[must_use]
    pub fn completions(&self) -> &[u64] {
        &self.completions
    }

    /// Forget recorded submissions and completions.
    pub fn clear_log(&mut self) {
        self.log.clear();
        self.completions.clear();
    }

    /// Buffers allocated and not yet freed.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.live_buffers
    }

    fn transfer(&mut self, handle: &mut SimHandle) {
        let block_size = self.ns.block_size as usize;
        let chunks = handle.buffer.as_mut_slice().chunks_exact_mut(block_size);
        for (chunk, lba) in chunks.take(handle.nlb as usize).zip(handle.lba..) {
            match handle.op {
                IoOp::Write => {
                    self.blocks.insert(lba, chunk.to_vec().into_boxed_slice());
                }
                IoOp::Read => match self.blocks.get(&lba) {
                    Some(stored) => chunk.copy_from_slice(stored),
                    None => chunk.fill(0),
                },
            }
        }
    }
}

impl Driver for SimDevice {
    type Handle = SimHandle;

    fn namespace(&self) -> &Namespace {
        &self.ns
    }

    fn alloc_buffer(&mut self, size: usize) -> Option<Buffer> {
        if self.buffer_limit.is_some_and(|limit| self.live_buffers >= limit) {
            return None;
        }
        let buffer = Buffer::alloc(size)?;
        self.live_buffers += 1;
        Some(buffer)
    }

    fn free_buffer(&mut self, buffer: Buffer) {
        self.live_buffers = self.live_buffers.saturating_sub(1);
        drop(buffer);
    }

    fn submit(
        &mut self,
        op: IoOp,
        queue: u32,
        buffer: Buffer,
        lba: u64,
        nlb: u32,
    ) -> Result<SimHandle, SubmitRejected> {
        if queue >= self.ns.queue_count {
            return Err(SubmitRejected {
                buffer,
                reason: format!("no such queue {queue}"),
            });
        }
        if lba + u64::from(nlb) > self.ns.block_count || buffer.len() < self.ns.bytes_for(nlb) {
            return Err(SubmitRejected {
                buffer,
                reason: "transfer out of bounds".to_string(),
            });
        }
        if self.rejects.iter().any(|&t| covers(lba, nlb, t)) {
            return Err(SubmitRejected {
                buffer,
                reason: "injected rejection".to_string(),
            });
        }

        let extra = if self.stagger { (self.submitted % 3) as u32 } else { 0 };
        self.submitted += 1;
        self.log.push(SubmitRecord { op, queue, lba, nlb });
        Ok(SimHandle {
            op,
            lba,
            nlb,
            buffer,
            polls_left: self.poll_latency + extra,
        })
    }

    fn poll(&mut self, mut handle: SimHandle) -> Poll<SimHandle> {
        if self.stalls.iter().any(|&t| covers(handle.lba, handle.nlb, t)) {
            return Poll::Pending(handle);
        }
        if handle.polls_left > 0 {
            handle.polls_left -= 1;
            return Poll::Pending(handle);
        }
        if let Some(&(_, status)) = self
            .failures
            .iter()
            .find(|(t, _)| covers(handle.lba, handle.nlb, *t))
        {
            return Poll::Error {
                status,
                buffer: handle.buffer,
            };
        }

        self.transfer(&mut handle);
        self.completions.push(handle.lba);
        Poll::Complete(handle.buffer)
    }
}
