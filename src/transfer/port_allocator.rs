//! Passive port allocation
//!
//! Cyclic generator over the configured passive port range. Concurrent
//! callers receive an interleaving of one single sequence
//! `min, min + 1, ..., max, min, ...`: within a lap no value is handed out
//! twice and none is skipped.

use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug)]
pub struct PortAllocator {
    min: u16,
    max: u16,
    current: AtomicU32,
}

impl PortAllocator {
    /// Creates an allocator whose first emitted port is `min`.
    /// The caller guarantees `min <= max`.
    pub fn new(min: u16, max: u16) -> Self {
        Self {
            min,
            max,
            current: AtomicU32::new(u32::from(max)),
        }
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    /// Returns the next port of the cycle. Lock-free and O(1).
    pub fn next_port(&self) -> u16 {
        let previous = match self.current.fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| {
            Some(self.successor(c))
        }) {
            Ok(previous) | Err(previous) => previous,
        };
        self.successor(previous) as u16
    }

    fn successor(&self, current: u32) -> u32 {
        if current >= u32::from(self.max) || current < u32::from(self.min) {
            u32::from(self.min)
        } else {
            current + 1
        }
    }
}
