//! User-space register control for BCM283x/BCM2711 peripherals
//!
//! Maps the GPIO, clock manager, PWM, SPI0 and interrupt controller register
//! windows of a Raspberry Pi and drives them directly: no kernel driver is
//! involved beyond the memory device.
//!
//! # Features
//!
//! - **Pins**: function select, set/clear/level, pull resistors on both the
//!   legacy clocked mechanism and the BCM2711 direct fields, polled edge
//!   detection
//! - **Clocks and PWM**: general purpose clock dividers, PWM duty/range
//! - **SPI**: polled full-duplex transfers on SPI0
//!
//! # Usage
//!
//! ```no_run
//! use rpio::{Mode, Pin, Rpio, State};
//!
//! let rpio = Rpio::open()?;
//! let led = Pin(17);
//! rpio.set_mode(led, Mode::Output);
//! rpio.write(led, State::High);
//! rpio.close()?;
//! # Ok::<(), rpio::MapError>(())
//! ```
//!
//! # Restricted Mode
//!
//! Without access to `/dev/mem` the GPIO block is mapped from
//! `/dev/gpiomem` instead. Pin operations keep working, but clock, PWM, SPI
//! and interrupt writes are silently discarded and their registers read as
//! zero. [`Rpio::access`] reports which mode is in effect.
//!
//! # Blocking
//!
//! Clock programming and SPI transfers wait on status bits. SPI steps spin up
//! to `Config::poll_limit` times; a busy clock generator is polled with a
//! short sleep up to `Config::clock_poll_limit` times. With a limit of `None`
//! a dead SPI slave blocks forever.
//!
//! # Ownership
//!
//! Only one process should map the peripherals at a time. Two processes
//! driving the same registers race in hardware and nothing here can detect
//! it.

pub mod clock;
pub mod config;
pub mod delay;
pub mod error;
pub mod gpio;
pub mod guard;
pub mod irq;
pub mod mem;
pub mod rpio;
pub mod spi;

#[cfg(test)]
mod sim;

pub use clock::{ClockGroup, PwmChannel, PwmMode};
pub use config::Config;
pub use delay::{Delay, ThreadSleep};
pub use error::{ConfigError, MapError, SpiError};
pub use gpio::{Edge, Mode, Pin, Pull, Revision, State};
pub use mem::{Access, Peripheral, RegisterBlock, WindowSet};
pub use rpio::Rpio;
pub use spi::{Spi, SpiChannel, SpiStage};
