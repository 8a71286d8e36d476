//! Clock manager programming
//!
//! Four general purpose clock generators drive the clock-capable pins and
//! the PWM block. Each generator has a control word and a divisor word;
//! every write to either must carry the manager password in the top byte.
//!
//! Pins that share a generator share its frequency. Programming pin 20
//! reprograms pins 4, 32 and 34 as well.

pub mod pwm;

pub use pwm::{PwmChannel, PwmMode};

use crate::delay::{poll_until, Delay, BUSY_POLL, CLOCK_SETTLE};
use crate::gpio::Pin;
use crate::mem::WindowSet;

/// Clock manager control bits
pub mod ctl {
    /// Required in bits 24..32 of every write
    pub const PASSWORD: u32 = 0x5A00_0000;
    /// Oscillator source
    pub const SRC_OSC: u32 = 1;
    pub const ENAB: u32 = 1 << 4;
    /// Read-only: generator running
    pub const BUSY: u32 = 1 << 7;
    /// 1-stage MASH noise shaping
    pub const MASH_1: u32 = 1 << 9;
}

/// Integer and fractional divisor fields are 12 bits wide
const DIV_MASK: u32 = 0xFFF;

/// A clock generator and the pins it drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockGroup {
    /// GPCLK0: pins 4, 20, 32, 34
    Gp0,
    /// GPCLK1: pins 5, 21, 42, 44
    Gp1,
    /// GPCLK2: pins 6, 43
    Gp2,
    /// PWM clock: pins 12, 13, 18, 19, 40, 41, 45
    Pwm,
}

impl ClockGroup {
    pub fn for_pin(pin: Pin) -> Option<Self> {
        match pin.number() {
            4 | 20 | 32 | 34 => Some(ClockGroup::Gp0),
            5 | 21 | 42 | 44 => Some(ClockGroup::Gp1),
            6 | 43 => Some(ClockGroup::Gp2),
            12 | 13 | 18 | 19 | 40 | 41 | 45 => Some(ClockGroup::Pwm),
            _ => None,
        }
    }

    /// Control word index in the clock window
    pub const fn control(self) -> usize {
        match self {
            ClockGroup::Gp0 => 28,
            ClockGroup::Gp1 => 30,
            ClockGroup::Gp2 => 32,
            ClockGroup::Pwm => 40,
        }
    }

    /// Divisor word index, always right after the control word
    pub const fn divisor(self) -> usize {
        self.control() + 1
    }
}

/// Divisor and MASH settings for one frequency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Divisor {
    pub divi: u32,
    pub divf: u32,
    pub mash: u32,
}

impl Divisor {
    /// Split `source_hz / freq_hz` into 12-bit integer and fractional parts
    ///
    /// MASH is only used when the integer part is at least 2 and there is
    /// a fractional part; below that the fractional divider glitches.
    pub fn new(source_hz: u32, freq_hz: u32) -> Self {
        let divi = (source_hz / freq_hz) & DIV_MASK;
        let remainder = u64::from(source_hz % freq_hz);
        let divf = ((remainder << 12) / u64::from(freq_hz)) as u32 & DIV_MASK;
        let mash = if divi < 2 || divf == 0 { 0 } else { ctl::MASH_1 };
        Self { divi, divf, mash }
    }

    /// Value for the divisor word, password included
    pub fn register(self) -> u32 {
        ctl::PASSWORD | (self.divi << 12) | self.divf
    }
}

/// Program the generator behind `pin` to `freq_hz`
///
/// No-op for pins without a clock generator and for a frequency of 0. The
/// PWM outputs are stopped while the PWM clock is reprogrammed, since the
/// generator never reports idle while PWM consumes it.
pub fn set_frequency(
    windows: &WindowSet,
    delay: &dyn Delay,
    source_hz: u32,
    poll_limit: Option<u64>,
    pin: Pin,
    freq_hz: u32,
) {
    if freq_hz == 0 {
        return;
    }
    let Some(group) = ClockGroup::for_pin(pin) else {
        log::debug!("{} has no clock generator, ignoring", pin);
        return;
    };

    let divisor = Divisor::new(source_hz, freq_hz);
    log::trace!(
        "{:?} clock: {} Hz -> divi {} divf {} mash {}",
        group,
        freq_hz,
        divisor.divi,
        divisor.divf,
        divisor.mash != 0
    );

    if group == ClockGroup::Pwm {
        pwm::stop_pwm(windows);
    }

    let clock = windows.clock();
    let control = group.control();

    // Stop the generator without touching source or MASH. BUSY is read-only.
    let current = clock.read(control);
    clock.write(control, ctl::PASSWORD | (current & !(ctl::ENAB | ctl::BUSY)));

    let busy = poll_until(
        poll_limit,
        || clock.read(control) & ctl::BUSY == 0,
        || delay.delay(BUSY_POLL),
    );
    if let Err(polls) = busy {
        log::warn!("{:?} clock still busy after {} polls, programming anyway", group, polls);
    }

    // Source and MASH must settle before the generator is enabled.
    clock.write(control, ctl::PASSWORD | divisor.mash | ctl::SRC_OSC);
    clock.write(group.divisor(), divisor.register());
    delay.delay(CLOCK_SETTLE);
    clock.write(control, ctl::PASSWORD | divisor.mash | ctl::SRC_OSC | ctl::ENAB);

    if group == ClockGroup::Pwm {
        pwm::start_pwm(windows);
    }
}
