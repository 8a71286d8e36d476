//! mmap-backed register windows
//!
//! The only place in the crate that dereferences raw pointers.

use std::fs::File;
use std::io;
use std::os::fd::AsRawFd;
use std::ptr::{self, read_volatile, write_volatile};

use super::{Peripheral, RegisterBlock, WINDOW_SIZE, WINDOW_WORDS};
use crate::error::MapError;

// Peripheral bases sit above 2 GiB on BCM2711, past a 32-bit off_t.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
use libc::{mmap64 as mmap_at, off64_t as FileOffset};
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
use libc::{mmap as mmap_at, off_t as FileOffset};

/// A 4 KiB window mapped read-write from a device file
pub struct MappedWindow {
    peripheral: Peripheral,
    base: *mut u32,
}

// SAFETY: the mapping is process-wide shared memory; it is not tied to the
// thread that created it. Access is serialized by the register guard.
unsafe impl Send for MappedWindow {}

impl MappedWindow {
    /// Map `WINDOW_SIZE` bytes of `file` starting at byte `offset`
    ///
    /// `offset` must be page aligned. The file can be closed once this
    /// returns.
    pub fn map(file: &File, offset: u64, peripheral: Peripheral) -> Result<Self, MapError> {
        let file_offset = FileOffset::try_from(offset).map_err(|_| MapError::MapFailed {
            peripheral,
            source: io::Error::new(io::ErrorKind::InvalidInput, "offset out of range"),
        })?;

        // SAFETY: a fresh shared mapping is requested; the kernel picks the
        // address and validates the descriptor and offset.
        let addr = unsafe {
            mmap_at(
                ptr::null_mut(),
                WINDOW_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                file_offset,
            )
        };

        if addr == libc::MAP_FAILED {
            return Err(MapError::MapFailed {
                peripheral,
                source: io::Error::last_os_error(),
            });
        }

        log::debug!("mapped {} window at offset {:#x}", peripheral, offset);

        Ok(Self {
            peripheral,
            base: addr.cast::<u32>(),
        })
    }

    pub fn peripheral(&self) -> Peripheral {
        self.peripheral
    }

    fn register(&self, index: usize) -> *mut u32 {
        assert!(
            !self.base.is_null(),
            "{} window used after release",
            self.peripheral
        );
        assert!(index < WINDOW_WORDS, "register index {index} outside window");
        // SAFETY: index was checked against the mapping length.
        unsafe { self.base.add(index) }
    }
}

impl RegisterBlock for MappedWindow {
    fn read(&self, index: usize) -> u32 {
        // SAFETY: register() returns an aligned pointer inside the live mapping.
        unsafe { read_volatile(self.register(index)) }
    }

    fn write(&self, index: usize, value: u32) {
        // SAFETY: register() returns an aligned pointer inside the live mapping.
        unsafe { write_volatile(self.register(index), value) }
    }

    fn release(&mut self) -> io::Result<()> {
        if self.base.is_null() {
            return Ok(());
        }

        // SAFETY: base/WINDOW_SIZE is exactly the region returned by mmap.
        let result = unsafe { libc::munmap(self.base.cast(), WINDOW_SIZE) };
        self.base = ptr::null_mut();

        if result == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

impl Drop for MappedWindow {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            log::warn!("failed to unmap {} window: {}", self.peripheral, err);
        }
    }
}
