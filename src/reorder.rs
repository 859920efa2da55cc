//! Bounded reorder buffer keyed by event sequence number.
//!
//! A ring of `capacity` slots holds events that have arrived ahead of the
//! current cursor. Each successful `insert` may drain a contiguous prefix
//! of the ring back to the caller in ascending `seq` order.

use crate::error::DispatchError;
use crate::event::Event;

pub struct ReorderBuffer {
    start_seq: u64,
    cursor: u64,
    slots: Vec<Option<Event>>,
}

impl ReorderBuffer {
    /// `start_seq` is the first sequence number the buffer expects;
    /// `capacity` bounds how far ahead of the cursor an event may arrive.
    pub fn new(start_seq: u64, capacity: usize) -> Self {
        assert!(capacity > 0, "reorder buffer capacity must be positive");
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            start_seq,
            cursor: 0,
            slots,
        }
    }

    fn capacity(&self) -> u64 {
        self.slots.len() as u64
    }

    /// Insert `event`. On success, returns the contiguous run of events
    /// (including `event`, if it was the one that completed the run) now
    /// released in ascending `seq` order.
    pub fn insert(&mut self, event: Event) -> Result<Vec<Event>, DispatchError> {
        if event.seq < self.start_seq {
            return Err(DispatchError::TooSmall);
        }
        let i = event.seq - self.start_seq;
        if i < self.cursor {
            return Err(DispatchError::TooSmall);
        }
        if i >= self.cursor + self.capacity() {
            return Err(DispatchError::TooLarge);
        }

        let slot = (i % self.capacity()) as usize;
        if self.slots[slot].is_some() {
            return Err(DispatchError::Duplicate);
        }
        self.slots[slot] = Some(event);

        let mut released = Vec::new();
        loop {
            let slot = (self.cursor % self.capacity()) as usize;
            match self.slots[slot].take() {
                Some(ev) => {
                    released.push(ev);
                    self.cursor += 1;
                }
                None => break,
            }
        }
        Ok(released)
    }

    /// Clear all pending slots and rewind the cursor. `start_seq` is
    /// unaffected — the source must resume at the same starting sequence.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.cursor = 0;
    }
}
