//! GPIO pin state machine
//!
//! Computes register indices and bit masks from a BCM pin number and drives
//! the function select, set/clear/level and edge detect registers.
//!
//! # Register Layout
//!
//! | Register   | Index     | Layout                        |
//! |------------|-----------|-------------------------------|
//! | GPFSELn    | pin / 10  | 3 bits per pin                |
//! | GPSETn     | 7 + bank  | write 1 to drive high         |
//! | GPCLRn     | 10 + bank | write 1 to drive low          |
//! | GPLEVn     | 13 + bank | current level                 |
//! | GPEDSn     | 16 + bank | event latch, write 1 to clear |
//! | GPRENn     | 19 + bank | rising edge enable            |
//! | GPFENn     | 22 + bank | falling edge enable           |
//!
//! `bank` is `pin / 32`.

pub mod pull;

use std::fmt;
use std::ops::{BitOr, Not};

use crate::irq;
use crate::mem::WindowSet;

pub use pull::{ClockedPull, DirectPull, PullControl, Revision};

/// GPIO register indices
pub mod regs {
    pub const GPFSEL0: usize = 0;
    pub const GPSET0: usize = 7;
    pub const GPCLR0: usize = 10;
    pub const GPLEV0: usize = 13;
    pub const GPEDS0: usize = 16;
    pub const GPREN0: usize = 19;
    pub const GPFEN0: usize = 22;
    /// Legacy pull control
    pub const GPPUD: usize = 37;
    /// Legacy pull clock, one per bank
    pub const GPPUDCLK0: usize = 38;
    /// BCM2711 pull fields, 16 pins per register
    pub const GPPUPPDN0: usize = 57;
    pub const GPPUPPDN3: usize = 60;
}

/// 3-bit function select codes
pub mod func {
    pub const INPUT: u32 = 0b000;
    pub const OUTPUT: u32 = 0b001;
    pub const ALT0: u32 = 0b100;
    pub const ALT1: u32 = 0b101;
    pub const ALT2: u32 = 0b110;
    pub const ALT3: u32 = 0b111;
    pub const ALT4: u32 = 0b011;
    pub const ALT5: u32 = 0b010;
    /// Width mask of one function select field
    pub const MASK: u32 = 0b111;
}

/// Interrupt lines masked while edge detection is armed: gpio_int[0] and
/// gpio_int[3]. Leaving them enabled without a kernel handler can hang the
/// system on some boards.
pub const EDGE_DETECT_IRQS: u64 = 1 << 49 | 1 << 52;

/// BCM GPIO line number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pin(pub u8);

impl Pin {
    pub const fn new(number: u8) -> Self {
        Self(number)
    }

    pub const fn number(self) -> u8 {
        self.0
    }

    /// Index into the 32-pin banked registers
    pub const fn bank(self) -> usize {
        (self.0 / 32) as usize
    }

    /// Bit within the pin's bank
    pub const fn bit(self) -> u32 {
        1 << (self.0 % 32)
    }

    /// Function select register and field shift
    pub const fn fsel(self) -> (usize, u32) {
        ((self.0 / 10) as usize, (self.0 % 10) as u32 * 3)
    }
}

impl From<u8> for Pin {
    fn from(number: u8) -> Self {
        Self(number)
    }
}

impl fmt::Display for Pin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.0)
    }
}

/// Pin function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Input,
    Output,
    /// General purpose clock output (only on clock-capable pins)
    Clock,
    /// PWM output (only on PWM-capable pins)
    Pwm,
    /// SPI bus line (only on SPI-capable pins)
    Spi,
    Alt0,
    Alt1,
    Alt2,
    Alt3,
    Alt4,
    Alt5,
}

impl Mode {
    /// Function select code for `pin`
    ///
    /// `None` when `pin` has no such function; callers treat that as a
    /// no-op.
    pub fn function_code(self, pin: Pin) -> Option<u32> {
        let code = match self {
            Mode::Input => func::INPUT,
            Mode::Output => func::OUTPUT,
            Mode::Clock => match pin.0 {
                4 | 5 | 6 | 32 | 34 | 42 | 43 | 44 => func::ALT0,
                20 | 21 => func::ALT5,
                _ => return None,
            },
            Mode::Pwm => match pin.0 {
                12 | 13 | 40 | 41 | 45 => func::ALT0,
                18 | 19 => func::ALT5,
                _ => return None,
            },
            Mode::Spi => match pin.0 {
                // SPI0
                7..=11 | 35..=39 => func::ALT0,
                // SPI1
                16..=21 => func::ALT4,
                // SPI2
                40..=45 => func::ALT4,
                _ => return None,
            },
            Mode::Alt0 => func::ALT0,
            Mode::Alt1 => func::ALT1,
            Mode::Alt2 => func::ALT2,
            Mode::Alt3 => func::ALT3,
            Mode::Alt4 => func::ALT4,
            Mode::Alt5 => func::ALT5,
        };
        Some(code)
    }

    /// Decode a raw function select field
    ///
    /// Clock, PWM and SPI come back as the alt function they use.
    pub fn from_code(code: u32) -> Mode {
        match code & func::MASK {
            func::INPUT => Mode::Input,
            func::OUTPUT => Mode::Output,
            func::ALT0 => Mode::Alt0,
            func::ALT1 => Mode::Alt1,
            func::ALT2 => Mode::Alt2,
            func::ALT3 => Mode::Alt3,
            func::ALT4 => Mode::Alt4,
            _ => Mode::Alt5,
        }
    }
}

/// Pin level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Low,
    High,
}

impl State {
    pub fn is_high(self) -> bool {
        self == State::High
    }
}

impl From<bool> for State {
    fn from(high: bool) -> Self {
        if high {
            State::High
        } else {
            State::Low
        }
    }
}

impl Not for State {
    type Output = State;

    fn not(self) -> State {
        match self {
            State::Low => State::High,
            State::High => State::Low,
        }
    }
}

/// Pull resistor setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pull {
    Off,
    Down,
    Up,
    /// Pull state cannot be read back (legacy controllers)
    None,
}

/// Transitions that arm a pin's event latch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    None = 0,
    Rising = 1,
    Falling = 2,
    Any = 3,
}

impl Edge {
    pub fn rising(self) -> bool {
        self as u8 & Edge::Rising as u8 != 0
    }

    pub fn falling(self) -> bool {
        self as u8 & Edge::Falling as u8 != 0
    }
}

impl BitOr for Edge {
    type Output = Edge;

    fn bitor(self, rhs: Edge) -> Edge {
        match self as u8 | rhs as u8 {
            0 => Edge::None,
            1 => Edge::Rising,
            2 => Edge::Falling,
            _ => Edge::Any,
        }
    }
}

// ============================================================================
// PIN OPERATIONS
// ============================================================================

/// Program a pin's function select field
///
/// Clock, PWM and SPI on a pin without that function is a no-op.
pub fn set_mode(windows: &WindowSet, pin: Pin, mode: Mode) {
    let Some(code) = mode.function_code(pin) else {
        log::debug!("{} has no {:?} function, ignoring", pin, mode);
        return;
    };

    let (reg, shift) = pin.fsel();
    windows
        .gpio()
        .modify(regs::GPFSEL0 + reg, func::MASK << shift, code << shift);
}

/// Raw 3-bit function select code of a pin
pub fn read_mode(windows: &WindowSet, pin: Pin) -> u32 {
    let (reg, shift) = pin.fsel();
    (windows.gpio().read(regs::GPFSEL0 + reg) >> shift) & func::MASK
}

/// Drive a pin through the set or clear register
pub fn write(windows: &WindowSet, pin: Pin, state: State) {
    let reg = match state {
        State::High => regs::GPSET0,
        State::Low => regs::GPCLR0,
    };
    windows.gpio().write(reg + pin.bank(), pin.bit());
}

/// Current level of a pin
pub fn read(windows: &WindowSet, pin: Pin) -> State {
    let level = windows.gpio().read(regs::GPLEV0 + pin.bank());
    State::from(level & pin.bit() != 0)
}

/// Invert a pin's level
pub fn toggle(windows: &WindowSet, pin: Pin) {
    let gpio = windows.gpio();
    let bank = pin.bank();
    let bit = pin.bit();
    if gpio.read(regs::GPLEV0 + bank) & bit != 0 {
        gpio.write(regs::GPCLR0 + bank, bit);
    } else {
        gpio.write(regs::GPSET0 + bank, bit);
    }
}

/// Arm or disarm edge detection and clear any stale event
pub fn set_edge_detect(windows: &WindowSet, pin: Pin, edge: Edge) {
    if edge != Edge::None {
        irq::disable_irqs(windows, EDGE_DETECT_IRQS);
    }

    let gpio = windows.gpio();
    let bank = pin.bank();
    let bit = pin.bit();

    if edge.rising() {
        gpio.set_bits(regs::GPREN0 + bank, bit);
    } else {
        gpio.clear_bits(regs::GPREN0 + bank, bit);
    }

    if edge.falling() {
        gpio.set_bits(regs::GPFEN0 + bank, bit);
    } else {
        gpio.clear_bits(regs::GPFEN0 + bank, bit);
    }

    gpio.write(regs::GPEDS0 + bank, bit);
}

/// Test and clear a pin's event latch
pub fn edge_detected(windows: &WindowSet, pin: Pin) -> bool {
    let gpio = windows.gpio();
    let reg = regs::GPEDS0 + pin.bank();
    let latched = gpio.read(reg) & pin.bit();
    gpio.write(reg, latched);
    latched != 0
}
