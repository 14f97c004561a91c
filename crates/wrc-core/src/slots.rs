//! Fixed grid of (queue, depth) slots.
//!
//! Each slot owns one buffer for the lifetime of a run. Slot state follows
//!
//! | state      | event                       | next       |
//! |------------|-----------------------------|------------|
//! | `Empty`    | submit                      | `InFlight` |
//! | `InFlight` | poll: pending               | `InFlight` |
//! | `InFlight` | poll: complete / error      | `Empty`    |
//!
//! The cursor walks the grid row-major: depth index first, then queue, both
//! wrapping.

use crate::buffer::Buffer;
use crate::driver::Driver;
use crate::error::{Error, Result};

/// Contents of one slot.
#[derive(Debug)]
pub enum Slot<H> {
    /// Free, holding its buffer.
    Empty(Buffer),
    /// An operation is outstanding; the buffer travels with the handle.
    InFlight(H),
    /// Holds nothing. Only observed while the scheduler is moving a slot's
    /// contents between states.
    Detached,
}

impl<H> Slot<H> {
    #[inline]
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Slot::InFlight(_))
    }
}

/// The slot grid plus its round-robin cursor.
#[derive(Debug)]
pub struct SlotPool<H> {
    queue_count: u32,
    queue_depth: u32,
    slots: Vec<Slot<H>>,
    queue: u32,
    depth: u32,
}

impl<H> SlotPool<H> {
    /// Allocate `queue_count * queue_depth` slots with a `buffer_size` byte
    /// buffer each.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if the driver cannot supply a buffer.
    /// Buffers already allocated are returned to the driver first.
    pub fn allocate<D>(
        driver: &mut D,
        queue_count: u32,
        queue_depth: u32,
        buffer_size: usize,
    ) -> Result<Self>
    where
        D: Driver<Handle = H>,
    {
        let total = queue_count as usize * queue_depth as usize;
        let mut slots = Vec::with_capacity(total);
        for _ in 0..total {
            match driver.alloc_buffer(buffer_size) {
                Some(buffer) => slots.push(Slot::Empty(buffer)),
                None => {
                    let mut partial = Self::from_slots(queue_count, queue_depth, slots);
                    partial.release(driver);
                    return Err(Error::Allocation { size: buffer_size });
                }
            }
        }
        Ok(Self::from_slots(queue_count, queue_depth, slots))
    }

    fn from_slots(queue_count: u32, queue_depth: u32, slots: Vec<Slot<H>>) -> Self {
        Self {
            queue_count,
            queue_depth,
            slots,
            queue: 0,
            depth: 0,
        }
    }

    /// Current `(queue, depth)` cursor position.
    #[inline]
    #[must_use]
    pub fn cursor(&self) -> (u32, u32) {
        (self.queue, self.depth)
    }

    #[inline]
    fn index(&self, queue: u32, depth: u32) -> usize {
        queue as usize * self.queue_depth as usize + depth as usize
    }

    /// Move the cursor's slot contents out, leaving it `Detached`.
    pub fn take_current(&mut self) -> Slot<H> {
        let i = self.index(self.queue, self.depth);
        std::mem::replace(&mut self.slots[i], Slot::Detached)
    }

    /// Store `slot` at the cursor.
    pub fn put_current(&mut self, slot: Slot<H>) {
        let i = self.index(self.queue, self.depth);
        self.slots[i] = slot;
    }

    /// Next slot in row-major order.
    pub fn advance(&mut self) {
        self.depth += 1;
        if self.depth >= self.queue_depth {
            self.depth = 0;
            self.advance_queue();
        }
    }

    /// Same depth index on the next queue.
    pub fn advance_queue(&mut self) {
        self.queue += 1;
        if self.queue >= self.queue_count {
            self.queue = 0;
        }
    }

    /// Mutable access to every slot's free buffer.
    pub fn empty_buffers_mut(&mut self) -> impl Iterator<Item = &mut Buffer> {
        self.slots.iter_mut().filter_map(|slot| match slot {
            Slot::Empty(buffer) => Some(buffer),
            _ => None,
        })
    }

    /// Number of operations currently outstanding.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.slots.iter().filter(|s| s.is_in_flight()).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Return every free buffer to the driver. Handles still in flight are
    /// dropped and left to the driver's own teardown.
    pub fn release<D>(&mut self, driver: &mut D)
    where
        D: Driver<Handle = H>,
    {
        let abandoned = self.in_flight();
        if abandoned > 0 {
            tracing::warn!(abandoned, "releasing slot pool with operations in flight");
        }
        for slot in self.slots.drain(..) {
            if let Slot::Empty(buffer) = slot {
                driver.free_buffer(buffer);
            }
        }
    }
}
