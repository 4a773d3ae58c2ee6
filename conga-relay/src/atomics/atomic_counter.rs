//! An abstraction over an `AtomicUsize` to provide a monotonically increasing counter with a single writer.
//! The value of the counter can only ever increase, and can only be mutated by a single reference.
//!
//! Used by the acceptor to hand out connection ids: the accept loop is the sole writer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct AtomicCounterWriter {
    inner: Arc<AtomicUsize>,
}

impl AtomicCounterWriter {
    pub fn zero() -> AtomicCounterWriter {
        AtomicCounterWriter::with_value(0)
    }

    pub fn with_value(value: usize) -> AtomicCounterWriter {
        AtomicCounterWriter {
            inner: Arc::new(AtomicUsize::new(value)),
        }
    }

    /// increments the value by the specified amount and returns the _new_ value.
    pub fn increment_and_get_relaxed(&mut self, amount: usize) -> usize {
        let old = self.fetch_add(amount, Ordering::Relaxed);
        old + amount
    }

    pub fn fetch_add(&mut self, amount: usize, ordering: Ordering) -> usize {
        self.inner.fetch_add(amount, ordering)
    }
}
