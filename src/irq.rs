//! Interrupt controller masks
//!
//! The ARM interrupt controller exposes 64 GPU interrupt lines through two
//! enable and two disable registers, each write-1-to-act. Bit `n` of the
//! 64-bit masks used here is line `n`: bits 0..32 go to the first register
//! of a pair, bits 32..64 to the second.

use crate::mem::WindowSet;

/// Interrupt controller register indices
pub mod regs {
    /// IRQ pending 1, also the readable enable state of lines 0..32
    pub const ENABLE_1: usize = 0x210 / 4;
    pub const ENABLE_2: usize = 0x214 / 4;
    pub const DISABLE_1: usize = 0x21C / 4;
    pub const DISABLE_2: usize = 0x220 / 4;
}

fn split(mask: u64) -> (u32, u32) {
    (mask as u32, (mask >> 32) as u32)
}

/// Enable the interrupt lines set in `mask`
pub fn enable_irqs(windows: &WindowSet, mask: u64) {
    let (low, high) = split(mask);
    let irq = windows.interrupt();
    irq.write(regs::ENABLE_1, low);
    irq.write(regs::ENABLE_2, high);
    log::trace!("enabled irqs {:#018x}", mask);
}

/// Disable the interrupt lines set in `mask`
pub fn disable_irqs(windows: &WindowSet, mask: u64) {
    let (low, high) = split(mask);
    let irq = windows.interrupt();
    irq.write(regs::DISABLE_1, low);
    irq.write(regs::DISABLE_2, high);
    log::trace!("disabled irqs {:#018x}", mask);
}

/// Currently enabled lines, as read from the enable registers
pub fn enabled_irqs(windows: &WindowSet) -> u64 {
    let irq = windows.interrupt();
    u64::from(irq.read(regs::ENABLE_2)) << 32 | u64::from(irq.read(regs::ENABLE_1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::Peripheral;
    use crate::sim::SimBoard;

    #[test]
    fn test_register_offsets() {
        assert_eq!(regs::ENABLE_1, 132);
        assert_eq!(regs::ENABLE_2, 133);
        assert_eq!(regs::DISABLE_1, 135);
        assert_eq!(regs::DISABLE_2, 136);
    }

    #[test]
    fn test_mask_halves() {
        let board = SimBoard::legacy();
        let windows = board.windows();

        enable_irqs(&windows, 0x0000_0002_8000_0001);
        disable_irqs(&windows, 1 << 63);

        assert_eq!(
            board.journal.writes(Peripheral::Interrupt),
            vec![
                (regs::ENABLE_1, 0x8000_0001),
                (regs::ENABLE_2, 0x2),
                (regs::DISABLE_1, 0),
                (regs::DISABLE_2, 0x8000_0000),
            ]
        );
    }

    #[test]
    fn test_backup_reads_both_halves() {
        let board = SimBoard::legacy();
        let windows = board.windows();
        board.interrupt.poke(regs::ENABLE_1, 0xDEAD_BEEF);
        board.interrupt.poke(regs::ENABLE_2, 0x0012_0000);

        assert_eq!(enabled_irqs(&windows), 0x0012_0000_DEAD_BEEF);
    }
}
