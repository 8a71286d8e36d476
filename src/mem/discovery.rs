//! Peripheral base address discovery
//!
//! The device tree `soc/ranges` table maps bus addresses to CPU physical
//! addresses. The CPU address of the peripheral block is a big-endian word
//! at byte 4 on BCM2835/6/7 boards and at byte 8 on BCM2711, whose ranges
//! entries carry a 64-bit parent address.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt};

/// Peripheral base of the original BCM2835 (Pi 1, Zero)
pub const LEGACY_BASE: u64 = 0x2000_0000;

/// Ranges offsets to try, in order
pub const RANGES_OFFSETS: [u64; 2] = [4, 8];

/// Where a base address came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseSource {
    /// Read from the ranges table at this byte offset
    Ranges { offset: u64 },
    /// Supplied by configuration
    Configured,
    /// Hard-coded BCM2835 base
    Legacy,
}

/// Resolved peripheral base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseAddress {
    pub address: u64,
    pub source: BaseSource,
}

impl BaseAddress {
    /// The BCM2835 fallback
    pub const fn legacy() -> Self {
        Self {
            address: LEGACY_BASE,
            source: BaseSource::Legacy,
        }
    }
}

/// Read the ranges table, trying each known offset
///
/// Returns `None` if the file is missing, short, or holds zero at every
/// offset.
pub fn discover(ranges_path: &Path) -> Option<BaseAddress> {
    let mut file = match File::open(ranges_path) {
        Ok(file) => file,
        Err(err) => {
            log::debug!("cannot open {}: {}", ranges_path.display(), err);
            return None;
        }
    };

    RANGES_OFFSETS.iter().find_map(|&offset| {
        match read_be_word(&mut file, offset) {
            Some(0) | None => None,
            Some(address) => Some(BaseAddress {
                address: u64::from(address),
                source: BaseSource::Ranges { offset },
            }),
        }
    })
}

/// Discover the base, falling back to the BCM2835 constant
pub fn discover_or_legacy(ranges_path: &Path) -> BaseAddress {
    discover(ranges_path).unwrap_or_else(BaseAddress::legacy)
}

fn read_be_word<R: Read + Seek>(reader: &mut R, offset: u64) -> Option<u32> {
    reader.seek(SeekFrom::Start(offset)).ok()?;
    reader.read_u32::<BigEndian>().ok()
}
