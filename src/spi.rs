//! SPI master engine
//!
//! Drives the SPI0 controller in polled mode through its CS (control and
//! status), FIFO and CLK registers. There is no interrupt or DMA path: every
//! byte is handed over by spinning on the FIFO status bits.
//!
//! # Memory Map
//!
//! | Register | Index | Purpose                 |
//! |----------|-------|-------------------------|
//! | CS       | 0     | Control and status      |
//! | FIFO     | 1     | TX and RX FIFOs         |
//! | CLK      | 2     | Clock divider           |
//!
//! All three channels share these registers; the channel only selects which
//! pin group is switched to the SPI function.
//!
//! # Blocking
//!
//! A slave that never answers stalls the handshake. Each wait gives up after
//! `Config::poll_limit` polls with [`SpiError::Timeout`]; with no limit it
//! spins forever.

use std::fmt;
use std::ops::RangeInclusive;

use crate::delay::poll_until;
use crate::error::SpiError;
use crate::gpio::{self, Mode, Pin};
use crate::mem::{RegisterBlock, WindowSet};
use crate::rpio::Rpio;

/// SPI register indices
pub mod regs {
    pub const CS: usize = 0;
    pub const FIFO: usize = 1;
    pub const CLK: usize = 2;
}

/// CS register bits
pub mod cs {
    /// Chip select field (bits 0..2)
    pub const CS_MASK: u32 = 0b11;
    /// Clock phase
    pub const CPHA: u32 = 1 << 2;
    /// Clock polarity
    pub const CPOL: u32 = 1 << 3;
    pub const CLEAR_TX: u32 = 1 << 4;
    pub const CLEAR_RX: u32 = 1 << 5;
    /// Transfer active
    pub const TA: u32 = 1 << 7;
    /// Transfer complete
    pub const DONE: u32 = 1 << 16;
    /// RX FIFO holds data
    pub const RXD: u32 = 1 << 17;
    /// TX FIFO can accept data
    pub const TXD: u32 = 1 << 18;
    /// Polarity of chip select 0; chips 1 and 2 follow
    pub const CSPOL0: u32 = 1 << 21;
}

/// Clock divider programmed by `begin`
pub const DEFAULT_DIVIDER: u32 = 128;

/// CLK holds a 16-bit even divider
const DIVIDER_MASK: u32 = 0xFFFE;

/// Highest chip select line
const MAX_CHIP: u8 = 2;

/// SPI pin group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpiChannel {
    /// Pins 7..=11 (CE1, CE0, MISO, MOSI, SCLK)
    Spi0,
    /// Pins 16..=21
    Spi1,
    /// Pins 40..=45
    Spi2,
}

impl SpiChannel {
    pub fn pins(self) -> impl Iterator<Item = Pin> {
        let range: RangeInclusive<u8> = match self {
            SpiChannel::Spi0 => 7..=11,
            SpiChannel::Spi1 => 16..=21,
            SpiChannel::Spi2 => 40..=45,
        };
        range.map(Pin)
    }
}

/// Handshake step a transfer was waiting on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiStage {
    TxReady,
    RxData,
    Done,
}

impl fmt::Display for SpiStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpiStage::TxReady => write!(f, "TX FIFO ready"),
            SpiStage::RxData => write!(f, "RX FIFO data"),
            SpiStage::Done => write!(f, "transfer done"),
        }
    }
}

// ============================================================================
// REGISTER OPERATIONS
// ============================================================================

/// Reset the controller and switch `channel`'s pins to SPI
///
/// An unmapped block reads back all zeroes, while a reset controller always
/// reports some status bits; that difference is the mapping check.
pub fn begin(windows: &WindowSet, channel: SpiChannel) -> Result<(), SpiError> {
    let spi = windows.spi();
    spi.write(regs::CS, 0);
    if spi.read(regs::CS) == 0 {
        return Err(SpiError::RegistersNotMapped);
    }

    for pin in channel.pins() {
        gpio::set_mode(windows, pin, Mode::Spi);
    }
    clear_fifos(spi);
    set_clock_divider(windows, DEFAULT_DIVIDER);

    log::debug!("{:?} started", channel);
    Ok(())
}

/// Return `channel`'s pins to input
pub fn end(windows: &WindowSet, channel: SpiChannel) {
    for pin in channel.pins() {
        gpio::set_mode(windows, pin, Mode::Input);
    }
    log::debug!("{:?} released", channel);
}

/// Program the raw clock divider; bit 0 is forced low
pub fn set_clock_divider(windows: &WindowSet, divider: u32) {
    windows.spi().write(regs::CLK, divider & DIVIDER_MASK);
}

/// Program the divider closest to `hz` from the `core_hz` core clock
///
/// A speed of 0 is ignored.
pub fn set_speed(windows: &WindowSet, core_hz: u32, hz: u32) {
    if hz == 0 {
        return;
    }
    set_clock_divider(windows, core_hz / hz);
}

/// Drive chip select line `chip` during transfers
pub fn select_chip(windows: &WindowSet, chip: u8) {
    windows
        .spi()
        .modify(regs::CS, cs::CS_MASK, u32::from(chip) & cs::CS_MASK);
}

/// Chip select line currently selected
pub fn selected_chip(windows: &WindowSet) -> u8 {
    (windows.spi().read(regs::CS) & cs::CS_MASK) as u8
}

/// Set chip select `chip` to active high or active low
pub fn set_chip_select_polarity(windows: &WindowSet, chip: u8, active_high: bool) {
    if chip > MAX_CHIP {
        return;
    }
    let bit = cs::CSPOL0 << chip;
    if active_high {
        windows.spi().set_bits(regs::CS, bit);
    } else {
        windows.spi().clear_bits(regs::CS, bit);
    }
}

/// Select clock polarity (idle high) and phase (sample on the second edge)
pub fn set_clock_mode(windows: &WindowSet, polarity: bool, phase: bool) {
    let mut bits = 0;
    if polarity {
        bits |= cs::CPOL;
    }
    if phase {
        bits |= cs::CPHA;
    }
    windows.spi().modify(regs::CS, cs::CPOL | cs::CPHA, bits);
}

/// Full-duplex transfer, replacing each byte with the one received
///
/// Transfer-active is cleared again whether or not the transfer completes.
pub fn exchange(
    windows: &WindowSet,
    poll_limit: Option<u64>,
    data: &mut [u8],
) -> Result<(), SpiError> {
    let spi = windows.spi();
    clear_fifos(spi);
    spi.set_bits(regs::CS, cs::TA);

    let result = transfer(spi, poll_limit, data);

    spi.clear_bits(regs::CS, cs::TA);
    result
}

fn transfer(
    spi: &dyn RegisterBlock,
    poll_limit: Option<u64>,
    data: &mut [u8],
) -> Result<(), SpiError> {
    for byte in data.iter_mut() {
        wait_for(spi, poll_limit, cs::TXD, SpiStage::TxReady)?;
        spi.write(regs::FIFO, u32::from(*byte));

        wait_for(spi, poll_limit, cs::RXD, SpiStage::RxData)?;
        *byte = spi.read(regs::FIFO) as u8;
    }
    wait_for(spi, poll_limit, cs::DONE, SpiStage::Done)
}

fn wait_for(
    spi: &dyn RegisterBlock,
    poll_limit: Option<u64>,
    flag: u32,
    stage: SpiStage,
) -> Result<(), SpiError> {
    match poll_until(poll_limit, || spi.read(regs::CS) & flag != 0, std::hint::spin_loop) {
        Ok(_) => Ok(()),
        Err(polls) => {
            log::warn!("SPI {} not reached after {} polls, aborting transfer", stage, polls);
            Err(SpiError::Timeout { stage, polls })
        }
    }
}

fn clear_fifos(spi: &dyn RegisterBlock) {
    spi.set_bits(regs::CS, cs::CLEAR_TX | cs::CLEAR_RX);
}

// ============================================================================
// HANDLE
// ============================================================================

/// A started SPI channel
///
/// Dropping the handle (or calling [`Spi::end`]) returns the channel's pins
/// to input.
pub struct Spi<'a> {
    rpio: &'a Rpio,
    channel: SpiChannel,
}

impl<'a> Spi<'a> {
    pub(crate) fn begin(rpio: &'a Rpio, channel: SpiChannel) -> Result<Self, SpiError> {
        begin(&rpio.lock(), channel)?;
        Ok(Self { rpio, channel })
    }

    pub fn channel(&self) -> SpiChannel {
        self.channel
    }

    /// Set the bus clock from the configured core clock
    pub fn set_speed(&self, hz: u32) {
        set_speed(&self.rpio.lock(), self.rpio.config().spi_core_hz, hz);
    }

    pub fn set_clock_divider(&self, divider: u32) {
        set_clock_divider(&self.rpio.lock(), divider);
    }

    pub fn select_chip(&self, chip: u8) {
        select_chip(&self.rpio.lock(), chip);
    }

    pub fn selected_chip(&self) -> u8 {
        selected_chip(&self.rpio.lock())
    }

    pub fn set_chip_select_polarity(&self, chip: u8, active_high: bool) {
        set_chip_select_polarity(&self.rpio.lock(), chip, active_high);
    }

    pub fn set_clock_mode(&self, polarity: bool, phase: bool) {
        set_clock_mode(&self.rpio.lock(), polarity, phase);
    }

    /// Full-duplex transfer in place
    ///
    /// Holds the register lock for the whole transfer.
    pub fn exchange(&self, data: &mut [u8]) -> Result<(), SpiError> {
        exchange(&self.rpio.lock(), self.rpio.config().poll_limit, data)
    }

    /// Send `data`, discarding what comes back
    pub fn transmit(&self, data: &[u8]) -> Result<(), SpiError> {
        let mut copy = data.to_vec();
        self.exchange(&mut copy)
    }

    /// Read `len` bytes. Zeroes are clocked out while reading.
    pub fn receive(&self, len: usize) -> Result<Vec<u8>, SpiError> {
        let mut data = vec![0; len];
        self.exchange(&mut data)?;
        Ok(data)
    }

    /// Release the channel's pins
    pub fn end(self) {
        drop(self);
    }
}

impl Drop for Spi<'_> {
    fn drop(&mut self) {
        end(&self.rpio.lock(), self.channel);
    }
}

impl fmt::Debug for Spi<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spi").field("channel", &self.channel).finish()
    }
}
