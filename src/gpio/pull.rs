//! Pull resistor strategies
//!
//! BCM2835/6/7 latch pull settings with a clock-in sequence through GPPUD
//! and GPPUDCLKn. BCM2711 replaced that with GPIO_PUP_PDN_CNTRL_REGn, a
//! plain 2-bit field per pin that can also be read back. The strategy is
//! picked once from [`Revision::probe`].

use crate::delay::{Delay, PULL_SETTLE};
use crate::mem::RegisterBlock;

use super::{regs, Pin, Pull};

/// GPPUPPDN3 reads as ASCII "gpio" on controllers without direct pull fields
pub const LEGACY_PULL_SENTINEL: u32 = 0x6770_696f;

/// Pull configuration mechanism of the running controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    /// BCM2835/6/7: clocked GPPUD sequence, no read-back
    Legacy,
    /// BCM2711: direct 2-bit fields
    Bcm2711,
}

impl Revision {
    /// Identify the controller from its GPIO block
    pub fn probe(gpio: &dyn RegisterBlock) -> Self {
        if gpio.read(regs::GPPUPPDN3) == LEGACY_PULL_SENTINEL {
            Revision::Legacy
        } else {
            Revision::Bcm2711
        }
    }

    /// The pull strategy for this revision
    pub fn pull_control(self) -> Box<dyn PullControl> {
        match self {
            Revision::Legacy => Box::new(ClockedPull),
            Revision::Bcm2711 => Box::new(DirectPull),
        }
    }
}

/// One way of programming pull resistors
pub trait PullControl: Send + Sync {
    /// Apply `pull` to `pin`. `Pull::None` is ignored.
    fn set_pull(&self, gpio: &dyn RegisterBlock, delay: &dyn Delay, pin: Pin, pull: Pull);

    /// Current pull of `pin`, or `Pull::None` if it cannot be read
    fn read_pull(&self, gpio: &dyn RegisterBlock, pin: Pin) -> Pull;
}

/// Legacy clock-in sequence
///
/// The order and both pauses are required: without them the setting may not
/// latch.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClockedPull;

impl ClockedPull {
    const OFF: u32 = 0b00;
    const DOWN: u32 = 0b01;
    const UP: u32 = 0b10;
    const MASK: u32 = 0b11;
}

impl PullControl for ClockedPull {
    fn set_pull(&self, gpio: &dyn RegisterBlock, delay: &dyn Delay, pin: Pin, pull: Pull) {
        let code = match pull {
            Pull::Off => Self::OFF,
            Pull::Down => Self::DOWN,
            Pull::Up => Self::UP,
            Pull::None => return,
        };
        let clock = regs::GPPUDCLK0 + pin.bank();

        gpio.modify(regs::GPPUD, Self::MASK, code);
        delay.delay(PULL_SETTLE);
        gpio.write(clock, pin.bit());
        delay.delay(PULL_SETTLE);
        gpio.clear_bits(regs::GPPUD, Self::MASK);
        gpio.write(clock, 0);
    }

    fn read_pull(&self, _gpio: &dyn RegisterBlock, _pin: Pin) -> Pull {
        Pull::None
    }
}

/// BCM2711 direct pull fields
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectPull;

impl DirectPull {
    const OFF: u32 = 0b00;
    const UP: u32 = 0b01;
    const DOWN: u32 = 0b10;
    const MASK: u32 = 0b11;

    fn field(pin: Pin) -> (usize, u32) {
        let reg = regs::GPPUPPDN0 + usize::from(pin.number() / 16);
        let shift = u32::from(pin.number() % 16) * 2;
        (reg, shift)
    }
}

impl PullControl for DirectPull {
    fn set_pull(&self, gpio: &dyn RegisterBlock, _delay: &dyn Delay, pin: Pin, pull: Pull) {
        let code = match pull {
            Pull::Off => Self::OFF,
            Pull::Up => Self::UP,
            Pull::Down => Self::DOWN,
            Pull::None => return,
        };
        let (reg, shift) = Self::field(pin);
        gpio.modify(reg, Self::MASK << shift, code << shift);
    }

    fn read_pull(&self, gpio: &dyn RegisterBlock, pin: Pin) -> Pull {
        let (reg, shift) = Self::field(pin);
        match (gpio.read(reg) >> shift) & Self::MASK {
            Self::OFF => Pull::Off,
            Self::UP => Pull::Up,
            Self::DOWN => Pull::Down,
            _ => Pull::None,
        }
    }
}
