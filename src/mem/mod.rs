//! Register windows
//!
//! Each peripheral block (GPIO, clock manager, PWM, SPI0, interrupt
//! controller) is a 4 KiB window of 32-bit registers. Higher layers only see
//! [`RegisterBlock`]: word-indexed, bounds-checked reads and writes. The
//! pointer arithmetic stays in [`mmap`].
//!
//! # Memory Map
//!
//! | Block     | Offset from peripheral base |
//! |-----------|-----------------------------|
//! | Interrupt | 0x00B000                    |
//! | Clock     | 0x101000                    |
//! | GPIO      | 0x200000                    |
//! | SPI0      | 0x204000                    |
//! | PWM       | 0x20C000                    |

pub mod discovery;
pub mod mapper;
#[cfg(unix)]
pub mod mmap;

use std::fmt;
use std::io;

use crate::error::MapError;

/// Size of every register window in bytes
pub const WINDOW_SIZE: usize = 4096;

/// Number of 32-bit registers in a window
pub const WINDOW_WORDS: usize = WINDOW_SIZE / 4;

/// Peripheral blocks the mapper knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peripheral {
    Gpio,
    Clock,
    Pwm,
    Spi,
    Interrupt,
}

impl Peripheral {
    /// All blocks, in mapping order
    pub const ALL: [Peripheral; 5] = [
        Peripheral::Gpio,
        Peripheral::Clock,
        Peripheral::Pwm,
        Peripheral::Spi,
        Peripheral::Interrupt,
    ];

    /// Byte offset of the block from the peripheral base
    pub const fn offset(self) -> u64 {
        match self {
            Peripheral::Gpio => 0x20_0000,
            Peripheral::Clock => 0x10_1000,
            Peripheral::Pwm => 0x20_C000,
            Peripheral::Spi => 0x20_4000,
            Peripheral::Interrupt => 0x00_B000,
        }
    }
}

impl fmt::Display for Peripheral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Peripheral::Gpio => write!(f, "GPIO"),
            Peripheral::Clock => write!(f, "clock"),
            Peripheral::Pwm => write!(f, "PWM"),
            Peripheral::Spi => write!(f, "SPI"),
            Peripheral::Interrupt => write!(f, "interrupt"),
        }
    }
}

/// Word-addressable view of one register window
///
/// Indices are register numbers (byte offset / 4). Implementations must
/// panic on `index >= WINDOW_WORDS` rather than touch memory outside the
/// window.
pub trait RegisterBlock: Send {
    /// Read the register at `index`
    fn read(&self, index: usize) -> u32;

    /// Write the register at `index`
    fn write(&self, index: usize, value: u32);

    /// Release the underlying mapping. Called once on close.
    fn release(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Read-modify-write: clear `mask`, then OR in `bits`
    fn modify(&self, index: usize, mask: u32, bits: u32) {
        let value = self.read(index);
        self.write(index, (value & !mask) | bits);
    }

    /// Set bits with a read-modify-write
    fn set_bits(&self, index: usize, bits: u32) {
        self.modify(index, 0, bits);
    }

    /// Clear bits with a read-modify-write
    fn clear_bits(&self, index: usize, bits: u32) {
        self.modify(index, bits, 0);
    }
}

/// A window with nothing behind it: reads return 0, writes vanish
///
/// Stands in for the clock, PWM, SPI and interrupt blocks when only the
/// restricted GPIO device could be opened.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertBlock;

impl RegisterBlock for InertBlock {
    fn read(&self, index: usize) -> u32 {
        assert!(index < WINDOW_WORDS, "register index {index} outside window");
        0
    }

    fn write(&self, index: usize, _value: u32) {
        assert!(index < WINDOW_WORDS, "register index {index} outside window");
    }
}

/// How much of the hardware the process could reach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// All five windows mapped read-write from the privileged device
    Full,
    /// GPIO only; clock, PWM, SPI and interrupt writes are no-ops
    Restricted,
}

/// Boxed register window
pub type Window = Box<dyn RegisterBlock>;

/// The five register windows owned by one process
pub struct WindowSet {
    access: Access,
    gpio: Window,
    clock: Window,
    pwm: Window,
    spi: Window,
    interrupt: Window,
    released: bool,
}

impl WindowSet {
    /// Assemble a window set from already-mapped blocks
    pub fn new(
        access: Access,
        gpio: Window,
        clock: Window,
        pwm: Window,
        spi: Window,
        interrupt: Window,
    ) -> Self {
        Self {
            access,
            gpio,
            clock,
            pwm,
            spi,
            interrupt,
            released: false,
        }
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn gpio(&self) -> &dyn RegisterBlock {
        self.gpio.as_ref()
    }

    pub fn clock(&self) -> &dyn RegisterBlock {
        self.clock.as_ref()
    }

    pub fn pwm(&self) -> &dyn RegisterBlock {
        self.pwm.as_ref()
    }

    pub fn spi(&self) -> &dyn RegisterBlock {
        self.spi.as_ref()
    }

    pub fn interrupt(&self) -> &dyn RegisterBlock {
        self.interrupt.as_ref()
    }

    /// Window for a peripheral
    pub fn window(&self, peripheral: Peripheral) -> &dyn RegisterBlock {
        match peripheral {
            Peripheral::Gpio => self.gpio(),
            Peripheral::Clock => self.clock(),
            Peripheral::Pwm => self.pwm(),
            Peripheral::Spi => self.spi(),
            Peripheral::Interrupt => self.interrupt(),
        }
    }

    /// Raw bytes of a window, little-endian per register
    pub fn dump(&self, peripheral: Peripheral) -> Vec<u8> {
        let window = self.window(peripheral);
        (0..WINDOW_WORDS)
            .flat_map(|index| window.read(index).to_le_bytes())
            .collect()
    }

    /// Release every window. Later calls are no-ops.
    ///
    /// All windows are released even if one fails; the first failure is
    /// returned.
    pub fn release(&mut self) -> Result<(), MapError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        let mut first_error = None;
        for peripheral in Peripheral::ALL {
            let window = match peripheral {
                Peripheral::Gpio => &mut self.gpio,
                Peripheral::Clock => &mut self.clock,
                Peripheral::Pwm => &mut self.pwm,
                Peripheral::Spi => &mut self.spi,
                Peripheral::Interrupt => &mut self.interrupt,
            };
            match window.release() {
                Ok(()) => log::debug!("released {} window", peripheral),
                Err(source) => {
                    log::debug!("failed to release {} window: {}", peripheral, source);
                    first_error.get_or_insert(MapError::UnmapFailed { peripheral, source });
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for WindowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowSet")
            .field("access", &self.access)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}
