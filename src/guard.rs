//! Register access guard
//!
//! One lock for all five windows. Every read-modify-write sequence, and
//! every single-register write, happens with the guard held.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::mem::WindowSet;

/// Process-wide lock around the mapped register windows
#[derive(Debug)]
pub struct RegisterGuard {
    windows: Mutex<WindowSet>,
}

impl RegisterGuard {
    pub fn new(windows: WindowSet) -> Self {
        Self {
            windows: Mutex::new(windows),
        }
    }

    /// Acquire the lock
    ///
    /// A panic in another holder cannot leave the registers in a state we
    /// could repair, so a poisoned lock is simply taken over.
    pub fn lock(&self) -> MutexGuard<'_, WindowSet> {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Give back the windows for release
    pub fn into_inner(self) -> WindowSet {
        self.windows
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
