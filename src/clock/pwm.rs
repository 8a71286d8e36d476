//! PWM channel programming
//!
//! Two channels share one control word. Each owns an 8-bit control
//! sub-field (channel 1 at bit 0, channel 2 at bit 8) plus a range word
//! (cycle length) and a data word (high time).

use crate::delay::{Delay, CLOCK_SETTLE};
use crate::gpio::Pin;
use crate::mem::WindowSet;

/// PWM register indices and control bits
pub mod regs {
    pub const CTL: usize = 0;
    pub const RNG1: usize = 4;
    pub const DAT1: usize = 5;
    pub const RNG2: usize = 8;
    pub const DAT2: usize = 9;

    /// Channel enable
    pub const PWEN: u32 = 1 << 0;
    /// Mark/space mode
    pub const MSEN: u32 = 1 << 7;
    /// One channel's control sub-field
    pub const FIELD: u32 = 0xFF;
    /// Enable bits of both channels
    pub const PWEN_BOTH: u32 = PWEN | PWEN << 8;
}

/// PWM output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PwmChannel {
    /// Pins 12, 18, 40
    One,
    /// Pins 13, 19, 41, 45
    Two,
}

impl PwmChannel {
    pub fn for_pin(pin: Pin) -> Option<Self> {
        match pin.number() {
            12 | 18 | 40 => Some(PwmChannel::One),
            13 | 19 | 41 | 45 => Some(PwmChannel::Two),
            _ => None,
        }
    }

    pub const fn range(self) -> usize {
        match self {
            PwmChannel::One => regs::RNG1,
            PwmChannel::Two => regs::RNG2,
        }
    }

    pub const fn data(self) -> usize {
        match self {
            PwmChannel::One => regs::DAT1,
            PwmChannel::Two => regs::DAT2,
        }
    }

    /// Position of the channel's control sub-field
    pub const fn shift(self) -> u32 {
        match self {
            PwmChannel::One => 0,
            PwmChannel::Two => 8,
        }
    }
}

/// Output algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PwmMode {
    /// High for `duty` ticks, then low for the rest of the cycle
    #[default]
    MarkSpace,
    /// High ticks spread evenly over the cycle
    Balanced,
}

/// Set `duty` high ticks per `cycle` ticks on the channel behind `pin`
///
/// Resets the channel's control sub-field, so any other mode bits on that
/// channel are cleared. No-op for pins without PWM.
pub fn set_duty_cycle(
    windows: &WindowSet,
    delay: &dyn Delay,
    pin: Pin,
    duty: u32,
    cycle: u32,
    mode: PwmMode,
) {
    let Some(channel) = PwmChannel::for_pin(pin) else {
        log::debug!("{} has no PWM channel, ignoring", pin);
        return;
    };

    let mut bits = regs::PWEN;
    if mode == PwmMode::MarkSpace {
        bits |= regs::MSEN;
    }

    let pwm = windows.pwm();
    let shift = channel.shift();
    pwm.modify(regs::CTL, regs::FIELD << shift, bits << shift);
    pwm.write(channel.data(), duty);
    pwm.write(channel.range(), cycle);
    log::trace!("{:?} channel: {}/{} ({:?})", channel, duty, cycle, mode);

    // The new ratio takes effect at the end of the current cycle.
    delay.delay(CLOCK_SETTLE);
}

/// Enable both channels
pub fn start_pwm(windows: &WindowSet) {
    windows.pwm().set_bits(regs::CTL, regs::PWEN_BOTH);
}

/// Disable both channels
pub fn stop_pwm(windows: &WindowSet) {
    windows.pwm().clear_bits(regs::CTL, regs::PWEN_BOTH);
}
