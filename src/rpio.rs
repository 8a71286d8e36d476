//! The `Rpio` handle
//!
//! Owns the mapped windows behind one [`RegisterGuard`], the pull strategy
//! picked at open time and the interrupt mask to restore on close. Every
//! operation takes the guard for its whole register sequence.

use std::fmt;
use std::sync::MutexGuard;

use crate::clock::{self, pwm, PwmMode};
use crate::config::Config;
use crate::delay::{Delay, ThreadSleep};
use crate::error::{MapError, SpiError};
use crate::gpio::{self, Edge, Mode, Pin, Pull, PullControl, Revision, State};
use crate::guard::RegisterGuard;
use crate::irq;
use crate::mem::discovery::BaseAddress;
use crate::mem::{mapper, Access, Peripheral, WindowSet};
use crate::spi::{Spi, SpiChannel};

/// Mapped peripherals of one board
pub struct Rpio {
    guard: RegisterGuard,
    revision: Revision,
    pull: Box<dyn PullControl>,
    delay: Box<dyn Delay>,
    config: Config,
    base: Option<BaseAddress>,
    irq_backup: u64,
}

impl Rpio {
    /// Map the peripherals with the default configuration
    pub fn open() -> Result<Self, MapError> {
        Self::open_with(Config::default())
    }

    /// Map the peripherals described by `config`
    pub fn open_with(config: Config) -> Result<Self, MapError> {
        let mapping = mapper::map_windows(&config)?;
        let base = mapping.base;

        let mut rpio = Self::with_windows(mapping.windows, Box::new(ThreadSleep), config);
        rpio.base = base;

        match base {
            Some(base) => log::info!(
                "peripherals at {:#x} ({:?}), {:?} pull control",
                base.address,
                base.source,
                rpio.revision
            ),
            None => log::info!(
                "GPIO only through {}, {:?} pull control",
                rpio.config.gpiomem_device.display(),
                rpio.revision
            ),
        }
        Ok(rpio)
    }

    /// Build a handle over already-mapped windows
    ///
    /// Probes the pull revision and records the enabled interrupt lines.
    pub fn with_windows(windows: WindowSet, delay: Box<dyn Delay>, config: Config) -> Self {
        let revision = Revision::probe(windows.gpio());
        let irq_backup = irq::enabled_irqs(&windows);
        log::debug!("irq enable mask {:#018x}", irq_backup);

        Self {
            guard: RegisterGuard::new(windows),
            revision,
            pull: revision.pull_control(),
            delay,
            config,
            base: None,
            irq_backup,
        }
    }

    /// Restore the interrupt mask and unmap every window
    ///
    /// All windows are released even if one fails; the first failure is
    /// returned.
    pub fn close(self) -> Result<(), MapError> {
        let mut windows = self.guard.into_inner();
        irq::enable_irqs(&windows, self.irq_backup);
        windows.release()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, WindowSet> {
        self.guard.lock()
    }

    /// Whether clock, PWM, SPI and interrupt writes reach the hardware
    pub fn access(&self) -> Access {
        self.lock().access()
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Peripheral base the windows were mapped from
    pub fn base(&self) -> Option<BaseAddress> {
        self.base
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Interrupt lines that were enabled at open
    pub fn irq_backup(&self) -> u64 {
        self.irq_backup
    }

    /// Raw bytes of one register window
    pub fn dump(&self, peripheral: Peripheral) -> Vec<u8> {
        self.lock().dump(peripheral)
    }

    // ------------------------------------------------------------------
    // Pins
    // ------------------------------------------------------------------

    pub fn set_mode(&self, pin: Pin, mode: Mode) {
        gpio::set_mode(&self.lock(), pin, mode);
    }

    /// Raw function select code
    pub fn read_mode(&self, pin: Pin) -> u32 {
        gpio::read_mode(&self.lock(), pin)
    }

    pub fn write(&self, pin: Pin, state: State) {
        gpio::write(&self.lock(), pin, state);
    }

    pub fn read(&self, pin: Pin) -> State {
        gpio::read(&self.lock(), pin)
    }

    pub fn toggle(&self, pin: Pin) {
        gpio::toggle(&self.lock(), pin);
    }

    pub fn set_pull(&self, pin: Pin, pull: Pull) {
        let windows = self.lock();
        self.pull
            .set_pull(windows.gpio(), self.delay.as_ref(), pin, pull);
    }

    /// Current pull; always `Pull::None` on legacy controllers
    pub fn read_pull(&self, pin: Pin) -> Pull {
        self.pull.read_pull(self.lock().gpio(), pin)
    }

    /// Arm edge detection
    ///
    /// Arming any edge also masks the GPIO interrupt lines until
    /// [`Rpio::close`].
    pub fn set_edge_detect(&self, pin: Pin, edge: Edge) {
        gpio::set_edge_detect(&self.lock(), pin, edge);
    }

    /// Test and clear the pin's event latch
    pub fn edge_detected(&self, pin: Pin) -> bool {
        gpio::edge_detected(&self.lock(), pin)
    }

    // ------------------------------------------------------------------
    // Clocks and PWM
    // ------------------------------------------------------------------

    /// Program the clock generator behind `pin`, shared with its group
    pub fn set_frequency(&self, pin: Pin, freq_hz: u32) {
        clock::set_frequency(
            &self.lock(),
            self.delay.as_ref(),
            self.config.oscillator_hz,
            self.config.clock_poll_limit,
            pin,
            freq_hz,
        );
    }

    /// Mark/space PWM with `duty` high ticks per `cycle`
    pub fn set_duty_cycle(&self, pin: Pin, duty: u32, cycle: u32) {
        self.set_duty_cycle_with_mode(pin, duty, cycle, PwmMode::MarkSpace);
    }

    pub fn set_duty_cycle_with_mode(&self, pin: Pin, duty: u32, cycle: u32, mode: PwmMode) {
        pwm::set_duty_cycle(&self.lock(), self.delay.as_ref(), pin, duty, cycle, mode);
    }

    pub fn start_pwm(&self) {
        pwm::start_pwm(&self.lock());
    }

    pub fn stop_pwm(&self) {
        pwm::stop_pwm(&self.lock());
    }

    // ------------------------------------------------------------------
    // Interrupts
    // ------------------------------------------------------------------

    pub fn enable_irqs(&self, mask: u64) {
        irq::enable_irqs(&self.lock(), mask);
    }

    pub fn disable_irqs(&self, mask: u64) {
        irq::disable_irqs(&self.lock(), mask);
    }

    // ------------------------------------------------------------------
    // SPI
    // ------------------------------------------------------------------

    /// Start an SPI channel
    ///
    /// Fails with [`SpiError::RegistersNotMapped`] when the SPI block reads
    /// back as zeroes, as it does in restricted mode.
    pub fn spi_begin(&self, channel: SpiChannel) -> Result<Spi<'_>, SpiError> {
        Spi::begin(self, channel)
    }
}

impl fmt::Debug for Rpio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rpio")
            .field("revision", &self.revision)
            .field("base", &self.base)
            .field("irq_backup", &format_args!("{:#018x}", self.irq_backup))
            .finish_non_exhaustive()
    }
}
