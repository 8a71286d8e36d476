//! Simulated register blocks for unit tests
//!
//! Models just enough of the BCM283x peripherals to exercise the register
//! protocols: write-1-to-set/clear GPIO outputs with edge latches, the
//! legacy pull clock-in latch, and an SPI0 block whose FIFO loops back
//! through a programmable slave. Every write and every delay lands in a
//! shared [`Journal`] so tests can assert exact sequences.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::Config;
use crate::delay::Delay;
use crate::gpio::pull::LEGACY_PULL_SENTINEL;
use crate::mem::{Access, Peripheral, RegisterBlock, WindowSet, WINDOW_WORDS};
use crate::rpio::Rpio;

/// Something that happened to the simulated hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Write {
        peripheral: Peripheral,
        index: usize,
        value: u32,
    },
    Sleep(Duration),
}

impl Event {
    pub fn write(peripheral: Peripheral, index: usize, value: u32) -> Self {
        Event::Write {
            peripheral,
            index,
            value,
        }
    }
}

#[derive(Default)]
struct JournalState {
    events: Vec<Event>,
    releases: usize,
}

/// Shared, ordered record of writes and delays
#[derive(Clone, Default)]
pub struct Journal {
    state: Arc<Mutex<JournalState>>,
}

impl Journal {
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, JournalState> {
        self.state.lock().unwrap()
    }

    fn record(&self, event: Event) {
        self.state().events.push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    /// Writes to one peripheral, in order
    pub fn writes(&self, peripheral: Peripheral) -> Vec<(usize, u32)> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match *event {
                Event::Write {
                    peripheral: p,
                    index,
                    value,
                } if p == peripheral => Some((index, value)),
                _ => None,
            })
            .collect()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match *event {
                Event::Sleep(duration) => Some(duration),
                _ => None,
            })
            .collect()
    }

    pub fn releases(&self) -> usize {
        self.state().releases
    }

    pub fn clear(&self) {
        self.state().events.clear();
    }
}

/// [`Delay`] that records instead of sleeping
#[derive(Clone)]
pub struct SimDelay {
    journal: Journal,
}

impl SimDelay {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: journal.clone(),
        }
    }
}

impl Delay for SimDelay {
    fn delay(&self, duration: Duration) {
        self.journal.record(Event::Sleep(duration));
    }
}

struct HeldBits {
    index: usize,
    mask: u32,
    reads: usize,
}

struct MemoryState {
    words: Vec<u32>,
    held: Vec<HeldBits>,
}

/// Plain read/write memory
#[derive(Clone)]
pub struct SimMemory {
    peripheral: Peripheral,
    journal: Journal,
    state: Arc<Mutex<MemoryState>>,
    fail_release: bool,
}

impl SimMemory {
    pub fn new(peripheral: Peripheral, journal: &Journal) -> Self {
        Self {
            peripheral,
            journal: journal.clone(),
            state: Arc::new(Mutex::new(MemoryState {
                words: vec![0; WINDOW_WORDS],
                held: Vec::new(),
            })),
            fail_release: false,
        }
    }

    /// Make `release` report an error
    pub fn failing_release(mut self) -> Self {
        self.fail_release = true;
        self
    }

    /// Force `mask` to read as set for the next `reads` reads of `index`
    pub fn hold_bits(&self, index: usize, mask: u32, reads: usize) {
        self.state.lock().unwrap().held.push(HeldBits { index, mask, reads });
    }

    /// Store a value without journaling it
    pub fn poke(&self, index: usize, value: u32) {
        self.state.lock().unwrap().words[index] = value;
    }

    /// Read a value without consuming held bits
    pub fn peek(&self, index: usize) -> u32 {
        self.state.lock().unwrap().words[index]
    }
}

impl RegisterBlock for SimMemory {
    fn read(&self, index: usize) -> u32 {
        assert!(index < WINDOW_WORDS, "register index {index} outside window");
        let mut state = self.state.lock().unwrap();
        let mut value = state.words[index];
        for held in state.held.iter_mut().filter(|h| h.index == index && h.reads > 0) {
            value |= held.mask;
            held.reads -= 1;
        }
        value
    }

    fn write(&self, index: usize, value: u32) {
        assert!(index < WINDOW_WORDS, "register index {index} outside window");
        self.journal.record(Event::write(self.peripheral, index, value));
        self.state.lock().unwrap().words[index] = value;
    }

    fn release(&mut self) -> io::Result<()> {
        self.journal.state().releases += 1;
        if self.fail_release {
            Err(io::Error::new(io::ErrorKind::Other, "munmap failed"))
        } else {
            Ok(())
        }
    }
}

/// GPIO block with set/clear/level and edge latch semantics
#[derive(Clone)]
pub struct SimGpio {
    memory: SimMemory,
    latched_pulls: Arc<Mutex<HashMap<u8, u32>>>,
}

impl SimGpio {
    pub fn new(journal: &Journal, legacy: bool) -> Self {
        let memory = SimMemory::new(Peripheral::Gpio, journal);
        if legacy {
            memory.poke(60, LEGACY_PULL_SENTINEL);
        }
        Self {
            memory,
            latched_pulls: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Drive a pin from outside, as a connected device would
    pub fn drive(&self, pin: u8, high: bool) {
        let bank = usize::from(pin / 32);
        let bit = 1u32 << (pin % 32);
        let level = self.memory.peek(13 + bank);
        let next = if high { level | bit } else { level & !bit };
        self.set_level(bank, next);
    }

    /// Pull value clocked into a pin by the legacy sequence
    pub fn latched_pull(&self, pin: u8) -> Option<u32> {
        self.latched_pulls.lock().unwrap().get(&pin).copied()
    }

    pub fn memory(&self) -> &SimMemory {
        &self.memory
    }

    fn set_level(&self, bank: usize, next: u32) {
        let level = self.memory.peek(13 + bank);
        let rising = next & !level & self.memory.peek(19 + bank);
        let falling = level & !next & self.memory.peek(22 + bank);
        let events = self.memory.peek(16 + bank) | rising | falling;
        self.memory.poke(13 + bank, next);
        self.memory.poke(16 + bank, events);
    }
}

impl RegisterBlock for SimGpio {
    fn read(&self, index: usize) -> u32 {
        self.memory.read(index)
    }

    fn write(&self, index: usize, value: u32) {
        match index {
            // GPSET0/1
            7 | 8 => {
                self.memory.journal.record(Event::write(Peripheral::Gpio, index, value));
                let bank = index - 7;
                self.set_level(bank, self.memory.peek(13 + bank) | value);
            }
            // GPCLR0/1
            10 | 11 => {
                self.memory.journal.record(Event::write(Peripheral::Gpio, index, value));
                let bank = index - 10;
                self.set_level(bank, self.memory.peek(13 + bank) & !value);
            }
            // GPEDS0/1: write 1 to clear
            16 | 17 => {
                self.memory.journal.record(Event::write(Peripheral::Gpio, index, value));
                self.memory.poke(index, self.memory.peek(index) & !value);
            }
            // GPPUDCLK0/1: latch GPPUD into every clocked pin
            38 | 39 if value != 0 => {
                self.memory.write(index, value);
                let pull = self.memory.peek(37) & 0b11;
                let first = (index as u8 - 38) * 32;
                let mut latched = self.latched_pulls.lock().unwrap();
                for bit in 0..32u8 {
                    if value & (1 << bit) != 0 {
                        latched.insert(first + bit, pull);
                    }
                }
            }
            _ => self.memory.write(index, value),
        }
    }

    fn release(&mut self) -> io::Result<()> {
        self.memory.release()
    }
}

/// SPI control/status bits the simulator reports
const SPI_CS_DONE: u32 = 1 << 16;
const SPI_CS_RXD: u32 = 1 << 17;
const SPI_CS_TXD: u32 = 1 << 18;
const SPI_CS_TA: u32 = 1 << 7;
const SPI_CS_CLEAR: u32 = 0b11 << 4;
const SPI_CS_STATUS: u32 = SPI_CS_DONE | SPI_CS_RXD | SPI_CS_TXD;

type Responder = Box<dyn FnMut(u8) -> u8 + Send>;

struct SpiState {
    rx: VecDeque<u8>,
    sent: Vec<u8>,
    responder: Responder,
    stall_tx: bool,
}

/// SPI0 block: status bits derived from FIFO state, FIFO answered by a slave
#[derive(Clone)]
pub struct SimSpi {
    memory: SimMemory,
    state: Arc<Mutex<SpiState>>,
}

impl SimSpi {
    /// Slave with MISO tied to MOSI
    pub fn loopback(journal: &Journal) -> Self {
        Self::with_responder(journal, |byte| byte)
    }

    pub fn with_responder(
        journal: &Journal,
        responder: impl FnMut(u8) -> u8 + Send + 'static,
    ) -> Self {
        Self {
            memory: SimMemory::new(Peripheral::Spi, journal),
            state: Arc::new(Mutex::new(SpiState {
                rx: VecDeque::new(),
                sent: Vec::new(),
                responder: Box::new(responder),
                stall_tx: false,
            })),
        }
    }

    /// Never report TX FIFO space
    pub fn stall_tx(&self) {
        self.state.lock().unwrap().stall_tx = true;
    }

    /// Bytes the master shifted out, in order
    pub fn sent(&self) -> Vec<u8> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn memory(&self) -> &SimMemory {
        &self.memory
    }
}

impl RegisterBlock for SimSpi {
    fn read(&self, index: usize) -> u32 {
        let mut state = self.state.lock().unwrap();
        match index {
            0 => {
                let mut cs = self.memory.read(0);
                if !state.stall_tx {
                    cs |= SPI_CS_TXD;
                }
                if !state.rx.is_empty() {
                    cs |= SPI_CS_RXD;
                }
                cs | SPI_CS_DONE
            }
            1 => u32::from(state.rx.pop_front().unwrap_or(0)),
            _ => self.memory.read(index),
        }
    }

    fn write(&self, index: usize, value: u32) {
        match index {
            0 => {
                self.memory.journal.record(Event::write(Peripheral::Spi, 0, value));
                if value & SPI_CS_CLEAR != 0 {
                    self.state.lock().unwrap().rx.clear();
                }
                // Clear bits self-reset, status bits are read-only
                self.memory.poke(0, value & !(SPI_CS_CLEAR | SPI_CS_STATUS));
            }
            1 => {
                self.memory.write(1, value);
                if self.memory.peek(0) & SPI_CS_TA != 0 {
                    let mut state = self.state.lock().unwrap();
                    let byte = value as u8;
                    state.sent.push(byte);
                    let reply = (state.responder)(byte);
                    state.rx.push_back(reply);
                }
            }
            _ => self.memory.write(index, value),
        }
    }

    fn release(&mut self) -> io::Result<()> {
        self.memory.release()
    }
}

/// A complete simulated board
pub struct SimBoard {
    pub journal: Journal,
    pub gpio: SimGpio,
    pub clock: SimMemory,
    pub pwm: SimMemory,
    pub spi: SimSpi,
    pub interrupt: SimMemory,
}

impl SimBoard {
    /// BCM2835/6/7: clocked pull configuration
    pub fn legacy() -> Self {
        Self::build(true)
    }

    /// BCM2711: direct pull configuration
    pub fn bcm2711() -> Self {
        Self::build(false)
    }

    fn build(legacy: bool) -> Self {
        let journal = Journal::new();
        Self {
            gpio: SimGpio::new(&journal, legacy),
            clock: SimMemory::new(Peripheral::Clock, &journal),
            pwm: SimMemory::new(Peripheral::Pwm, &journal),
            spi: SimSpi::loopback(&journal),
            interrupt: SimMemory::new(Peripheral::Interrupt, &journal),
            journal,
        }
    }

    /// Replace the SPI slave
    pub fn with_spi(mut self, spi: SimSpi) -> Self {
        self.spi = spi;
        self
    }

    pub fn windows(&self) -> WindowSet {
        WindowSet::new(
            Access::Full,
            Box::new(self.gpio.clone()),
            Box::new(self.clock.clone()),
            Box::new(self.pwm.clone()),
            Box::new(self.spi.clone()),
            Box::new(self.interrupt.clone()),
        )
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay::new(&self.journal)
    }

    /// An `Rpio` over this board with a small poll budget
    pub fn rpio(&self) -> Rpio {
        self.rpio_with(Config::default().with_poll_limit(Some(1_000)))
    }

    pub fn rpio_with(&self, config: Config) -> Rpio {
        Rpio::with_windows(self.windows(), Box::new(self.delay()), config)
    }
}
