//! Runtime configuration
//!
//! Defaults describe a stock Raspberry Pi running Linux. Every field can be
//! overridden from a TOML file, e.g.
//!
//! ```toml
//! base_address = 0xFE000000
//! poll_limit = 1000000
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Privileged device file giving access to all physical memory
pub const DEFAULT_MEM_DEVICE: &str = "/dev/mem";

/// Restricted device file exposing only the GPIO block
pub const DEFAULT_GPIOMEM_DEVICE: &str = "/dev/gpiomem";

/// Device tree address translation table
pub const DEFAULT_RANGES_PATH: &str = "/proc/device-tree/soc/ranges";

/// Clock generator oscillator frequency
pub const DEFAULT_OSCILLATOR_HZ: u32 = 19_200_000;

/// SPI core clock
pub const DEFAULT_SPI_CORE_HZ: u32 = 250_000_000;

/// SPI spin budget, generous enough that real hardware never hits it
pub const DEFAULT_POLL_LIMIT: u64 = 50_000_000;

/// Clock busy-wait budget; each poll sleeps `BUSY_POLL`, so about 100 ms
pub const DEFAULT_CLOCK_POLL_LIMIT: u64 = 10_000;

/// Mapper and engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Privileged device file (read-write, all peripherals)
    pub mem_device: PathBuf,
    /// Restricted fallback device file (GPIO only)
    pub gpiomem_device: PathBuf,
    /// Address translation table used to discover the peripheral base
    pub ranges_path: PathBuf,
    /// Explicit peripheral base; skips discovery when set
    pub base_address: Option<u64>,
    /// Fall back to the BCM2835 base when discovery fails
    pub legacy_fallback: bool,
    /// Clock generator source frequency in Hz
    pub oscillator_hz: u32,
    /// SPI core clock in Hz
    pub spi_core_hz: u32,
    /// Maximum polls per SPI handshake step; `None` spins forever
    pub poll_limit: Option<u64>,
    /// Maximum sleeping polls on a busy clock generator; `None` waits forever
    pub clock_poll_limit: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mem_device: PathBuf::from(DEFAULT_MEM_DEVICE),
            gpiomem_device: PathBuf::from(DEFAULT_GPIOMEM_DEVICE),
            ranges_path: PathBuf::from(DEFAULT_RANGES_PATH),
            base_address: None,
            legacy_fallback: true,
            oscillator_hz: DEFAULT_OSCILLATOR_HZ,
            spi_core_hz: DEFAULT_SPI_CORE_HZ,
            poll_limit: Some(DEFAULT_POLL_LIMIT),
            clock_poll_limit: Some(DEFAULT_CLOCK_POLL_LIMIT),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML content
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Use an explicit peripheral base address
    pub fn with_base_address(mut self, base: u64) -> Self {
        self.base_address = Some(base);
        self
    }

    /// Set the SPI spin budget
    pub fn with_poll_limit(mut self, limit: Option<u64>) -> Self {
        self.poll_limit = limit;
        self
    }

    /// Set the clock busy-wait budget
    pub fn with_clock_poll_limit(mut self, limit: Option<u64>) -> Self {
        self.clock_poll_limit = limit;
        self
    }

    /// Use different device files
    pub fn with_devices(mut self, mem: impl Into<PathBuf>, gpiomem: impl Into<PathBuf>) -> Self {
        self.mem_device = mem.into();
        self.gpiomem_device = gpiomem.into();
        self
    }

    /// Use a different ranges table
    pub fn with_ranges_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ranges_path = path.into();
        self
    }
}
