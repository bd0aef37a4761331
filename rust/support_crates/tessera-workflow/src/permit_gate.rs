//! A blocking, bounded permit counter.
//!
//! `PermitGate` caps the number of concurrently running tasks: callers block in
//! [`acquire`](PermitGate::acquire) until a permit is free and hold it through
//! an RAII guard. Releasing a permit wakes one waiter, giving FIFO-ish
//! progression under contention.
//!
//! This is the generalization of a fixed-size blocking resource pool: a bounded
//! counter behind a mutex and condition variable, with blocking acquire and
//! guard-scoped release.

use std::sync::{Condvar, Mutex};

/// A bounded counter of execution permits.
///
/// The gate starts with `permits` available slots. Each [`acquire`](Self::acquire)
/// takes one slot, blocking while none are free; dropping the returned
/// [`Permit`] returns the slot and wakes one waiting thread.
pub struct PermitGate {
    available: Mutex<usize>,
    released: Condvar,
}

impl PermitGate {
    /// Creates a gate with the given number of permits.
    ///
    /// # Panics
    ///
    /// Panics if `permits` is 0.
    pub fn new(permits: usize) -> PermitGate {
        assert_ne!(permits, 0);
        PermitGate {
            available: Mutex::new(permits),
            released: Condvar::new(),
        }
    }

    /// Blocks until a permit is free, then takes it.
    pub fn acquire(&self) -> Permit<'_> {
        let guard = self.available.lock().expect("gate lock");
        let mut guard = self
            .released
            .wait_while(guard, |available| *available == 0)
            .expect("gate wait");
        *guard -= 1;
        Permit(self)
    }

    /// Takes a permit if one is immediately free.
    pub fn try_acquire(&self) -> Option<Permit<'_>> {
        let mut guard = self.available.lock().expect("gate lock");
        if *guard == 0 {
            return None;
        }
        *guard -= 1;
        Some(Permit(self))
    }

    /// Number of permits currently free.
    pub fn available(&self) -> usize {
        *self.available.lock().expect("gate lock")
    }

    fn release(&self) {
        let mut guard = self.available.lock().expect("gate lock");
        *guard += 1;
        self.released.notify_one();
    }
}

/// RAII guard for one acquired permit. The permit is returned to the gate
/// when the guard is dropped.
pub struct Permit<'a>(&'a PermitGate);

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.0.release();
    }
}
