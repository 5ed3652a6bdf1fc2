// See: https://www.nesdev.org/wiki/CPU_interrupts#IRQ_and_NMI_tick-by-tick_execution

use crate::nes::snapshot::Ordinal;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InterruptType {
    Nmi, // Edge-triggered, raised by the PPU at vblank
    Irq,
    Brk,
    Reset,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Interrupt {
    pub interrupt_type: InterruptType,
    pub vector_addr: u16,
    /// Bits forced into the status byte pushed on the stack.
    pub b_flag_mask: u8,
    pub cpu_cycles: u8,
}

pub const NMI: Interrupt = Interrupt {
    interrupt_type: InterruptType::Nmi,
    vector_addr: 0xFFFA,
    b_flag_mask: 0b0010_0000,
    cpu_cycles: 7,
};

pub const BRK: Interrupt = Interrupt {
    interrupt_type: InterruptType::Brk,
    vector_addr: 0xFFFE,
    b_flag_mask: 0b0011_0000,
    cpu_cycles: 7,
};

pub const IRQ: Interrupt = Interrupt {
    interrupt_type: InterruptType::Irq,
    vector_addr: 0xFFFE,
    b_flag_mask: 0b0010_0000,
    cpu_cycles: 7,
};

/// Reset reuses the interrupt sequence with its stack writes turned into reads.
pub const RESET: Interrupt = Interrupt {
    interrupt_type: InterruptType::Reset,
    vector_addr: 0xFFFC,
    b_flag_mask: 0,
    cpu_cycles: 7,
};

impl Interrupt {
    pub fn for_type(interrupt_type: InterruptType) -> Interrupt {
        match interrupt_type {
            InterruptType::Nmi => NMI,
            InterruptType::Irq => IRQ,
            InterruptType::Brk => BRK,
            InterruptType::Reset => RESET,
        }
    }
}

impl Ordinal for InterruptType {
    fn ordinal(&self) -> u8 {
        *self as u8
    }

    fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(InterruptType::Nmi),
            1 => Some(InterruptType::Irq),
            2 => Some(InterruptType::Brk),
            3 => Some(InterruptType::Reset),
            _ => None,
        }
    }
}
