//! One-time patch gate
//!
//! Code is patched while nothing else may run it. [`PatchGate`] makes that window
//! explicit: the batch runs inside [`PatchGate::open`] exactly once, and threads that
//! must not call into patched code before it finishes block in [`PatchGate::wait`].
//! The gate only moves forward: Unpatched, Patching, Patched.

use crate::error::GateError;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Where the gate is in its one-way lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    Unpatched,
    Patching,
    Patched,
}

#[derive(Debug)]
pub struct PatchGate {
    state: Mutex<PatchState>,
    done: Condvar,
}

impl Default for PatchGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchGate {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(PatchState::Unpatched),
            done: Condvar::new(),
        }
    }

    pub fn state(&self) -> PatchState {
        *self.lock()
    }

    pub fn is_patched(&self) -> bool {
        self.state() == PatchState::Patched
    }

    /// Run `patch` if the gate has never been opened
    ///
    /// The gate becomes Patched when `patch` returns or unwinds; a half-applied batch
    /// cannot be retried.
    pub fn open<T>(&self, patch: impl FnOnce() -> T) -> Result<T, GateError> {
        {
            let mut state = self.lock();
            if *state != PatchState::Unpatched {
                return Err(GateError::AlreadyPatched);
            }
            *state = PatchState::Patching;
        }

        let _close = CloseOnDrop(self);
        Ok(patch())
    }

    /// Block until the gate is Patched
    pub fn wait(&self) {
        let mut state = self.lock();
        while *state != PatchState::Patched {
            state = self.done.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`; returns whether the gate is Patched
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .done
            .wait_timeout_while(state, timeout, |s| *s != PatchState::Patched)
            .unwrap_or_else(|e| e.into_inner());
        *state == PatchState::Patched
    }

    fn lock(&self) -> MutexGuard<'_, PatchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct CloseOnDrop<'a>(&'a PatchGate);

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.lock() = PatchState::Patched;
        self.0.done.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_opens_exactly_once() {
        let gate = PatchGate::new();
        assert_eq!(gate.state(), PatchState::Unpatched);

        assert_eq!(gate.open(|| 7), Ok(7));
        assert!(gate.is_patched());
        assert_eq!(gate.open(|| 8), Err(GateError::AlreadyPatched));
    }

    #[test]
    fn test_state_is_patching_inside_batch() {
        let gate = PatchGate::new();
        let seen = gate.open(|| gate.state()).unwrap();
        assert_eq!(seen, PatchState::Patching);
    }

    #[test]
    fn test_waiters_released_after_batch() {
        let gate = Arc::new(PatchGate::new());
        let patched = Arc::new(AtomicBool::new(false));

        let waiter = {
            let gate = Arc::clone(&gate);
            let patched = Arc::clone(&patched);
            thread::spawn(move || {
                gate.wait();
                patched.load(Ordering::SeqCst)
            })
        };

        gate.open(|| {
            thread::sleep(Duration::from_millis(20));
            patched.store(true, Ordering::SeqCst);
        })
        .unwrap();

        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_wait_timeout_before_open() {
        let gate = PatchGate::new();
        assert!(!gate.wait_timeout(Duration::from_millis(5)));
        gate.open(|| ()).unwrap();
        assert!(gate.wait_timeout(Duration::from_millis(5)));
    }

    #[test]
    fn test_panicking_batch_still_closes() {
        let gate = PatchGate::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = gate.open(|| panic!("batch failed"));
        }));
        assert!(result.is_err());
        assert!(gate.is_patched());
        assert_eq!(gate.open(|| ()), Err(GateError::AlreadyPatched));
    }
}
