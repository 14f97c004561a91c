//! io_uring-backed driver.
//!
//! Each I/O queue maps onto its own ring, created on first use. Submission
//! pushes one SQE and flushes it without waiting; polling drains whatever
//! CQEs the ring already holds, so neither path ever blocks.

pub mod probe;

use io_uring::{opcode, types, IoUring};
use nix::libc;
use rustc_hash::FxHashMap;
use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use wrc_core::{Buffer, Driver, Error, IoHandle, IoOp, Namespace, Poll, SubmitRejected};

/// Outstanding operation on a [`UringDriver`].
#[derive(Debug)]
pub struct UringHandle {
    token: u64,
    queue: u32,
    lba: u64,
    nlb: u32,
    /// The kernel may write into this until the CQE arrives.
    buffer: Option<Buffer>,
}

impl IoHandle for UringHandle {
    fn lba(&self) -> u64 {
        self.lba
    }

    fn block_count(&self) -> u32 {
        self.nlb
    }
}

impl Drop for UringHandle {
    fn drop(&mut self) {
        // Dropped while still in flight: the device may DMA into the buffer
        // at any time, so it must never go back to the allocator.
        if let Some(buffer) = self.buffer.take() {
            tracing::warn!(lba = self.lba, nlb = self.nlb, "leaking buffer of abandoned operation");
            std::mem::forget(buffer);
        }
    }
}

/// Driver for a block device or image file.
pub struct UringDriver {
    rings: Vec<Option<IoUring>>,
    /// CQE results reaped but not yet claimed by a poll, keyed by token.
    reaped: FxHashMap<u64, i32>,
    file: File,
    ns: Namespace,
    next_token: u64,
}

impl UringDriver {
    /// Open `path`. Read runs open the device read-only.
    ///
    /// # Errors
    ///
    /// [`Error::Open`] if the path cannot be opened or probed.
    pub fn open(path: &Path, writable: bool) -> Result<Self, Error> {
        let name = path.display().to_string();
        let open_err = |e: io::Error| Error::Open {
            device: name.clone(),
            reason: e.to_string(),
        };

        let (file, direct) = probe::open(path, writable).map_err(open_err)?;
        let ns = probe::namespace(&file, &name).map_err(open_err)?;
        tracing::info!(
            device = %name,
            direct,
            block_size = ns.block_size,
            block_count = ns.block_count,
            "opened namespace"
        );

        Ok(Self {
            rings: (0..ns.queue_count).map(|_| None).collect(),
            reaped: FxHashMap::default(),
            file,
            ns,
            next_token: 0,
        })
    }

    fn ring(&mut self, queue: u32) -> io::Result<&mut IoUring> {
        let slot = self
            .rings
            .get_mut(queue as usize)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("no such queue {queue}")))?;
        if slot.is_none() {
            tracing::debug!(queue, entries = self.ns.queue_size, "creating ring");
            *slot = Some(IoUring::new(self.ns.queue_size)?);
        }
        slot.as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "ring unavailable"))
    }

    fn finish(&self, mut handle: UringHandle, result: i32) -> Poll<UringHandle> {
        let Some(buffer) = handle.buffer.take() else {
            return Poll::Pending(handle);
        };
        let expected = self.ns.bytes_for(handle.nlb);
        if result < 0 {
            Poll::Error {
                status: -result,
                buffer,
            }
        } else if result as usize != expected {
            tracing::warn!(
                lba = handle.lba,
                transferred = result,
                expected,
                "short transfer"
            );
            Poll::Error {
                status: libc::EIO,
                buffer,
            }
        } else {
            Poll::Complete(buffer)
        }
    }
}

impl Driver for UringDriver {
    type Handle = UringHandle;

    fn namespace(&self) -> &Namespace {
        &self.ns
    }

    fn alloc_buffer(&mut self, size: usize) -> Option<Buffer> {
        Buffer::alloc(size)
    }

    fn submit(
        &mut self,
        op: IoOp,
        queue: u32,
        mut buffer: Buffer,
        lba: u64,
        nlb: u32,
    ) -> Result<UringHandle, SubmitRejected> {
        let len = self.ns.bytes_for(nlb);
        if len > buffer.len() {
            return Err(SubmitRejected {
                reason: format!("buffer of {:#x} bytes too small for {len:#x}", buffer.len()),
                buffer,
            });
        }

        let token = self.next_token;
        let fd = types::Fd(self.file.as_raw_fd());
        let offset = lba * u64::from(self.ns.block_size);
        let ptr = buffer.as_mut_ptr();
        let entry = match op {
            IoOp::Read => opcode::Read::new(fd, ptr, len as u32).offset(offset).build(),
            IoOp::Write => opcode::Write::new(fd, ptr.cast_const(), len as u32)
                .offset(offset)
                .build(),
        }
        .user_data(token);

        let ring = match self.ring(queue) {
            Ok(ring) => ring,
            Err(e) => {
                return Err(SubmitRejected {
                    buffer,
                    reason: e.to_string(),
                })
            }
        };

        // SAFETY: the buffer behind `ptr` moves into the returned handle and
        // is released only after the matching CQE is reaped.
        if unsafe { ring.submission().push(&entry) }.is_err() {
            return Err(SubmitRejected {
                buffer,
                reason: "submission queue full".to_string(),
            });
        }
        // A failed flush leaves the SQE queued; the next poll flushes again.
        if let Err(e) = ring.submit() {
            tracing::warn!(queue, lba, error = %e, "deferred submission flush");
        }

        self.next_token += 1;
        Ok(UringHandle {
            token,
            queue,
            lba,
            nlb,
            buffer: Some(buffer),
        })
    }

    fn poll(&mut self, handle: UringHandle) -> Poll<UringHandle> {
        if let Some(result) = self.reaped.remove(&handle.token) {
            return self.finish(handle, result);
        }

        let Some(Some(ring)) = self.rings.get_mut(handle.queue as usize) else {
            return Poll::Pending(handle);
        };
        if let Err(e) = ring.submit() {
            tracing::trace!(queue = handle.queue, error = %e, "flush during poll");
        }
        for cqe in ring.completion() {
            self.reaped.insert(cqe.user_data(), cqe.result());
        }

        match self.reaped.remove(&handle.token) {
            Some(result) => self.finish(handle, result),
            None => Poll::Pending(handle),
        }
    }

    fn close(&mut self) {
        self.rings.clear();
        self.reaped.clear();
        tracing::debug!(device = %self.ns.device, "closed namespace");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(blocks: usize) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "wrc-uring-{}-{blocks}.img",
            std::process::id()
        ));
        std::fs::write(&path, vec![0u8; blocks * probe::FILE_BLOCK_SIZE as usize]).unwrap();
        path
    }

    fn wait(driver: &mut UringDriver, mut handle: UringHandle) -> Poll<UringHandle> {
        for _ in 0..1_000_000 {
            match driver.poll(handle) {
                Poll::Pending(h) => handle = h,
                done => return done,
            }
        }
        Poll::Pending(handle)
    }

    #[test]
    fn test_open_missing_device() {
        let err = UringDriver::open(Path::new("/nonexistent/wrc.img"), false)
            .err()
            .unwrap();
        assert!(matches!(err, Error::Open { .. }));
    }

    /// io_uring can be compiled out or blocked by seccomp in containers.
    fn uring_unavailable() -> bool {
        match IoUring::new(2) {
            Ok(_) => false,
            Err(e) => matches!(e.raw_os_error(), Some(libc::ENOSYS | libc::EPERM)),
        }
    }

    #[test]
    fn test_write_read_roundtrip() {
        if uring_unavailable() {
            return;
        }
        let path = image(64);
        let mut driver = UringDriver::open(&path, true).unwrap();
        assert_eq!(driver.namespace().block_count, 64);

        let mut buf = driver.alloc_buffer(4096).unwrap();
        buf.as_mut_slice().fill(0xC3);
        let handle = driver.submit(IoOp::Write, 0, buf, 8, 8).unwrap();
        let mut buf = match wait(&mut driver, handle) {
            Poll::Complete(buf) => buf,
            other => panic!("write failed: {other:?}"),
        };

        buf.as_mut_slice().fill(0);
        let handle = driver.submit(IoOp::Read, 1, buf, 8, 8).unwrap();
        match wait(&mut driver, handle) {
            Poll::Complete(buf) => assert!(buf.as_slice().iter().all(|&b| b == 0xC3)),
            other => panic!("read failed: {other:?}"),
        }
        driver.close();
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_submit_to_unknown_queue_returns_buffer() {
        if uring_unavailable() {
            return;
        }
        let path = std::env::temp_dir().join(format!("wrc-uring-{}-q.img", std::process::id()));
        std::fs::write(&path, vec![0u8; 8 * probe::FILE_BLOCK_SIZE as usize]).unwrap();
        let mut driver = UringDriver::open(&path, false).unwrap();

        let buf = driver.alloc_buffer(4096).unwrap();
        let rejected = driver.submit(IoOp::Read, probe::MAX_QUEUES, buf, 0, 1).unwrap_err();
        assert_eq!(rejected.buffer.len(), 4096);
        assert!(rejected.reason.contains("no such queue"));
        std::fs::remove_file(&path).unwrap();
    }
}
