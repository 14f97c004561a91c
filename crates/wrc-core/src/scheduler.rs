//! The submission/completion control loop.
//!
//! A single loop visits the slot grid round-robin. Empty slots take the next
//! chunk of the LBA range while budget remains; in-flight slots are polled
//! without blocking. The loop ends when every requested block has been
//! accounted for as completed.
//!
//! Once a read mismatch is recorded no further chunks are submitted. The
//! unsubmitted remainder is deducted from the outstanding total at the next
//! empty-slot visit so the loop terminates as soon as in-flight reads drain.

use crate::config::{Mode, RunConfig};
use crate::driver::{Driver, IoHandle, IoOp, Poll};
use crate::error::{Error, Result};
use crate::pattern::PatternEngine;
use crate::sampler::{dump_block, ProgressSampler};
use crate::slots::{Slot, SlotPool};
use crate::verify::{self, Mismatch};
use serde::Serialize;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Counters owned by the control loop. Counts are in blocks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Blocks submitted so far.
    pub submitted: u64,
    /// Blocks completed so far.
    pub completed: u64,
    /// Next LBA to submit.
    pub next_lba: u64,
    /// Operations submitted so far.
    pub operations: u64,
    /// Blocks never submitted because a mismatch halted the run.
    pub skipped: u64,
}

/// Outcome of a run that reached its termination condition.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub config: RunConfig,
    pub progress: Progress,
    pub mismatches: Vec<Mismatch>,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
}

impl RunReport {
    #[inline]
    #[must_use]
    pub fn mismatch_count(&self) -> usize {
        self.mismatches.len()
    }

    /// Process exit status: the number of mismatch events.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::try_from(self.mismatch_count()).unwrap_or(u8::MAX)
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

/// Drives one validated run against a driver.
///
/// Block dumps go to `out`. Each mismatch is also reported to `diag` as an
/// `ERROR:` line the moment it is detected, so it survives a later fatal
/// error during drain.
pub struct Scheduler<'a, D: Driver, W: Write, E: Write = io::Sink> {
    driver: &'a mut D,
    config: RunConfig,
    engine: PatternEngine,
    sampler: ProgressSampler,
    out: W,
    diag: E,
    progress: Progress,
    mismatches: Vec<Mismatch>,
}

impl<'a, D: Driver, W: Write> Scheduler<'a, D, W> {
    /// Prepare a run. Block dumps are written to `out`; mismatch lines are
    /// discarded until [`with_diagnostics`](Self::with_diagnostics) is called.
    pub fn new(driver: &'a mut D, config: RunConfig, out: W) -> Self {
        let engine = PatternEngine::for_run(&config, driver.namespace().block_size);
        let sampler = ProgressSampler::new(config.sample_interval, Instant::now());
        let progress = Progress {
            next_lba: config.start_lba,
            ..Progress::default()
        };
        Self {
            driver,
            config,
            engine,
            sampler,
            out,
            diag: io::sink(),
            progress,
            mismatches: Vec::new(),
        }
    }

    /// Report mismatch lines to `diag`.
    pub fn with_diagnostics<E: Write>(self, diag: E) -> Scheduler<'a, D, W, E> {
        Scheduler {
            driver: self.driver,
            config: self.config,
            engine: self.engine,
            sampler: self.sampler,
            out: self.out,
            diag,
            progress: self.progress,
            mismatches: self.mismatches,
        }
    }
}

impl<'a, D: Driver, W: Write, E: Write> Scheduler<'a, D, W, E> {
    /// Allocate slots, drive the loop to completion and free every buffer,
    /// whether or not the loop succeeded.
    ///
    /// # Errors
    ///
    /// Allocation failure, a device error, a stalled operation, a refused
    /// submission, or failure writing dump output. Data mismatches are not
    /// errors; they are listed in the report.
    pub fn run(mut self) -> Result<RunReport> {
        let started = Instant::now();
        let buffer_size = self.driver.namespace().bytes_for(self.config.blocks_per_io);
        let mut slots = SlotPool::allocate(
            &mut *self.driver,
            self.config.queue_count,
            self.config.queue_depth,
            buffer_size,
        )?;

        if self.config.mode == Mode::Write && self.engine.is_fixed() {
            for buffer in slots.empty_buffers_mut() {
                self.engine.prefill(buffer.as_mut_slice());
            }
        }

        tracing::info!(
            mode = ?self.config.mode,
            start_lba = self.config.start_lba,
            block_count = self.config.block_count,
            slots = slots.len(),
            blocks_per_io = self.config.blocks_per_io,
            "starting run"
        );

        let outcome = self.drive(&mut slots);
        slots.release(&mut *self.driver);
        outcome?;

        let elapsed = started.elapsed();
        tracing::info!(
            operations = self.progress.operations,
            completed = self.progress.completed,
            mismatches = self.mismatches.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "run finished"
        );

        Ok(RunReport {
            config: self.config,
            progress: self.progress,
            mismatches: self.mismatches,
            elapsed,
        })
    }

    fn drive(&mut self, slots: &mut SlotPool<D::Handle>) -> Result<()> {
        let mut to_submit = self.config.block_count;
        let mut to_complete = self.config.block_count;
        let mut last_io = Instant::now();

        while to_complete > 0 {
            match slots.take_current() {
                Slot::Empty(buffer) => {
                    if to_submit > 0 && self.mismatches.is_empty() {
                        let nlb = u64::from(self.config.blocks_per_io).min(to_submit) as u32;
                        let (queue, _) = slots.cursor();
                        let lba = self.progress.next_lba;
                        let handle = self.submit(queue, buffer, lba, nlb)?;
                        slots.put_current(Slot::InFlight(handle));
                        self.progress.next_lba += u64::from(nlb);
                        self.progress.submitted += u64::from(nlb);
                        self.progress.operations += 1;
                        to_submit -= u64::from(nlb);
                    } else {
                        if to_submit > 0 {
                            tracing::debug!(skipped = to_submit, "mismatch recorded, retiring unsubmitted blocks");
                            to_complete -= to_submit;
                            self.progress.skipped += to_submit;
                            to_submit = 0;
                        }
                        slots.put_current(Slot::Empty(buffer));
                    }
                    slots.advance();
                }
                Slot::InFlight(handle) => {
                    // The handle is consumed by poll; keep what reporting needs.
                    let lba = handle.lba();
                    let nlb = handle.block_count();

                    match self.driver.poll(handle) {
                        Poll::Pending(handle) => {
                            slots.put_current(Slot::InFlight(handle));
                            if last_io.elapsed() > self.config.timeout {
                                return Err(Error::Timeout { lba, nlb });
                            }
                            slots.advance_queue();
                        }
                        Poll::Error { status, buffer } => {
                            slots.put_current(Slot::Empty(buffer));
                            return Err(Error::Io { status, lba, nlb });
                        }
                        Poll::Complete(buffer) => {
                            let (queue, depth) = slots.cursor();
                            tracing::trace!(queue, depth, lba, nlb, "completed");
                            to_complete -= u64::from(nlb);
                            self.progress.completed += u64::from(nlb);
                            last_io = Instant::now();
                            self.sampler.on_completion(last_io);

                            if self.config.mode == Mode::Read && self.mismatches.is_empty() {
                                self.inspect_read(buffer.as_slice(), lba, nlb)?;
                            }
                            slots.put_current(Slot::Empty(buffer));
                        }
                    }
                }
                Slot::Detached => slots.advance(),
            }
        }
        Ok(())
    }

    /// Prepare `buffer` for the transfer and hand it to the driver.
    fn submit(
        &mut self,
        queue: u32,
        mut buffer: crate::Buffer,
        lba: u64,
        nlb: u32,
    ) -> Result<D::Handle> {
        let op = match self.config.mode {
            Mode::Write => {
                if !self.engine.is_fixed() {
                    self.engine.fill(buffer.as_mut_slice(), lba, nlb);
                }
                if self.sampler.is_armed() {
                    self.sampler
                        .dump(&mut self.out, buffer.as_slice(), lba, nlb, self.engine.block_size())?;
                }
                IoOp::Write
            }
            Mode::Read => IoOp::Read,
        };

        tracing::trace!(%op, queue, lba, nlb, "submit");
        match self.driver.submit(op, queue, buffer, lba, nlb) {
            Ok(handle) => Ok(handle),
            Err(rejected) => {
                self.driver.free_buffer(rejected.buffer);
                Err(Error::Submit {
                    op,
                    queue,
                    lba,
                    nlb,
                    reason: rejected.reason,
                })
            }
        }
    }

    /// Sample and verify a completed read.
    fn inspect_read(&mut self, buf: &[u8], lba: u64, nlb: u32) -> Result<()> {
        if self.sampler.is_armed() {
            self.sampler
                .dump(&mut self.out, buf, lba, nlb, self.engine.block_size())?;
        }

        if let Some((mismatch, block)) = verify::check(&self.engine, buf, lba, nlb) {
            writeln!(self.diag, "ERROR: {mismatch}")?;
            dump_block(&mut self.out, block, mismatch.lba)?;
            tracing::warn!(
                lba = mismatch.lba,
                offset = ?mismatch.offset,
                expected = mismatch.expected,
                observed = ?mismatch.observed,
                "data mismatch"
            );
            self.mismatches.push(mismatch);
        }
        Ok(())
    }
}

/// Run `config` against `driver`, writing block dumps to `out`. `config`
/// must have been validated against the driver's namespace.
///
/// # Errors
///
/// As [`Scheduler::run`].
pub fn run<D: Driver, W: Write>(driver: &mut D, config: RunConfig, out: W) -> Result<RunReport> {
    Scheduler::new(driver, config, out).run()
}

/// [`run`], also writing an `ERROR:` line to `diag` for each mismatch as it
/// is found.
///
/// # Errors
///
/// As [`Scheduler::run`].
pub fn run_with_diagnostics<D: Driver, W: Write, E: Write>(
    driver: &mut D,
    config: RunConfig,
    out: W,
    diag: E,
) -> Result<RunReport> {
    Scheduler::new(driver, config, out).with_diagnostics(diag).run()
}
