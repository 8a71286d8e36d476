//! Error types
//!
//! Only mapping and SPI setup can fail. Pin, clock and PWM operations are
//! total: unsupported pin/mode combinations are silent no-ops, matching what
//! the silicon does with an alt-function it does not have.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::mem::Peripheral;
use crate::spi::SpiStage;

/// Failures while opening or releasing the register windows
#[derive(Debug, Error)]
pub enum MapError {
    /// Neither the privileged nor the restricted device file could be opened
    #[error("permission denied opening {} and {}", mem.display(), gpiomem.display())]
    PermissionDenied { mem: PathBuf, gpiomem: PathBuf },

    /// No peripheral base address could be determined and fallback is disabled
    #[error("peripheral base address not found and legacy fallback disabled")]
    AddressNotFound,

    /// The device file exists but could not be opened for another reason
    #[error("failed to open {}: {source}", path.display())]
    Device {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// mmap rejected the request
    #[error("failed to map {peripheral} registers: {source}")]
    MapFailed {
        peripheral: Peripheral,
        #[source]
        source: io::Error,
    },

    /// munmap rejected the request
    #[error("failed to unmap {peripheral} registers: {source}")]
    UnmapFailed {
        peripheral: Peripheral,
        #[source]
        source: io::Error,
    },

    /// Memory mapping is only implemented on unix targets
    #[error("register mapping is not supported on this platform")]
    Unsupported,
}

/// SPI engine failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpiError {
    /// The control register read back as all zeroes after reset
    #[error("SPI registers not mapped correctly - are you root?")]
    RegistersNotMapped,

    /// A status bit never came up within the configured poll limit
    #[error("SPI {stage} did not complete after {polls} polls")]
    Timeout { stage: SpiStage, polls: u64 },
}

/// Configuration loading failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
