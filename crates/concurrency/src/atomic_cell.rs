//! Mutual-exclusion cell for shared mutable state
//!
//! `AtomicCell` gives any value safe concurrent read/mutate/write semantics
//! through one dedicated lock. `mutate` exists so compound updates (read,
//! modify, write back) happen under a single lock acquisition with no race
//! window between the read and the write.

use parking_lot::Mutex;

/// Minimal mutual-exclusion wrapper around a value
///
/// All three operations acquire the same exclusive lock for their whole
/// duration.
///
/// # Re-entrancy
///
/// Calling back into the same cell's `mutate` (or `read`/`write`) from
/// inside a `mutate` closure on that cell deadlocks. That is the designed
/// behavior of an exclusive lock, not a condition this type papers over;
/// keep mutate closures free of calls that can reach the same cell.
pub struct AtomicCell<T> {
    value: Mutex<T>,
}

impl<T> AtomicCell<T> {
    /// Wrap a value
    pub fn new(value: T) -> Self {
        Self {
            value: Mutex::new(value),
        }
    }

    /// Replace the value
    pub fn write(&self, value: T) {
        *self.value.lock() = value;
    }

    /// Run a compound update in place, returning the closure's result
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.value.lock())
    }

    /// Consume the cell, returning the inner value
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Clone> AtomicCell<T> {
    /// Clone the current value out
    pub fn read(&self) -> T {
        self.value.lock().clone()
    }
}

impl<T: Default> Default for AtomicCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
