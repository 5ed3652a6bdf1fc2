use bitflags::bitflags;
use thiserror::Error;

use crate::nes::snapshot::{Ordinal, Snapshot, Snapshotable};
use crate::nes::tracer::Traceable;
use interrupts::{Interrupt, InterruptType};
use opcodes::Opcode;

mod instruction_handlers;
pub mod interrupts;
pub mod opcodes;
mod processor;

#[cfg(test)]
mod processor_tests;

pub const CPU_STACK_BASE: u16 = 0x0100;

/// What the CPU needs from the rest of the machine.
pub trait CpuBusInterface {
    fn cpu_bus_read(&mut self, addr: u16) -> u8;
    fn cpu_bus_write(&mut self, addr: u16, value: u8);
    /// Level of the PPU's /NMI output (true = asserted).
    fn nmi_line(&self) -> bool;
    /// Wired-OR of every /IRQ source (true = asserted).
    fn irq_line(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("CPU jammed by opcode ${opcode:02X} at ${addr:04X}")]
    Jam { opcode: u8, addr: u16 },
}

bitflags! {
    /// https://www.nesdev.org/wiki/Status_flags
    ///
    ///  7 6 5 4 3 2 1 0
    ///  N V _ B D I Z C
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        const CARRY             = 0b0000_0001;
        const ZERO              = 0b0000_0010;
        const INTERRUPT_DISABLE = 0b0000_0100;
        const DECIMAL_MODE      = 0b0000_1000;
        const BREAK             = 0b0001_0000;
        const BREAK2            = 0b0010_0000;
        const OVERFLOW          = 0b0100_0000;
        const NEGATIVE          = 0b1000_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    IndirectX,
    IndirectY,
    Indirect,
    Relative,
    Implied,
    Accumulator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessType {
    #[default]
    None,
    Read,
    Write,
    ReadModifyWrite,
    Register,
    Stack,
    Jam,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum ExecPhase {
    #[default]
    Idle,
    Read,
    Internal,
    Write,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum AddrResult {
    #[default]
    InProgress,
    Ready(u16),
    ReadyImmediate,
}

/// Progress through the instruction (or interrupt sequence) in flight.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CpuCycleState {
    pub opcode: Option<&'static Opcode>,
    pub mode: Option<AddressingMode>,
    pub micro_cycle: u8,
    pub exec_phase: ExecPhase,
    pub tmp_addr: u16,
    pub tmp_data: u8,
    pub page_crossed: bool,
    pub base_addr: u16,
    pub access_type: AccessType,
    pub addr_result: AddrResult,
}

pub struct CPU {
    pub register_a: u8,
    pub register_x: u8,
    pub register_y: u8,
    pub stack_pointer: u8,
    pub program_counter: u16,
    pub status: Flags,
    /// Total cycles executed since power-on.
    pub cycles: u64,

    pub(crate) current_op: CpuCycleState,
    pub(crate) active_interrupt: Option<Interrupt>,

    // Interrupt line sampling. The `prev_*` values hold what was seen at the
    // end of the previous cycle; they decide whether the next instruction
    // boundary enters the interrupt sequence.
    prev_nmi_line: bool,
    need_nmi: bool,
    prev_need_nmi: bool,
    run_irq: bool,
    prev_run_irq: bool,

    pub(crate) jammed: Option<CpuError>,
    pub last_opcode: u8,
}

impl Default for CPU {
    fn default() -> Self {
        Self::new()
    }
}

impl CPU {
    pub fn new() -> Self {
        let mut cpu = CPU {
            register_a: 0,
            register_x: 0,
            register_y: 0,
            stack_pointer: 0,
            program_counter: 0,
            status: Flags::from_bits_truncate(0x34),
            cycles: 0,
            current_op: CpuCycleState::default(),
            active_interrupt: None,
            prev_nmi_line: false,
            need_nmi: false,
            prev_need_nmi: false,
            run_irq: false,
            prev_run_irq: false,
            jammed: None,
            last_opcode: 0,
        };
        cpu.reset(false);
        cpu
    }

    /// Schedules the 7-cycle reset sequence. A hard reset also clears the
    /// registers; a soft reset only sets I and lets the sequence drop SP by 3.
    pub fn reset(&mut self, soft: bool) {
        if !soft {
            self.register_a = 0;
            self.register_x = 0;
            self.register_y = 0;
            self.stack_pointer = 0;
            self.status = Flags::from_bits_truncate(0x34);
            self.cycles = 0;
        }
        self.status.insert(Flags::INTERRUPT_DISABLE);
        self.current_op = CpuCycleState::default();
        self.active_interrupt = Some(interrupts::RESET);
        self.prev_nmi_line = false;
        self.need_nmi = false;
        self.prev_need_nmi = false;
        self.run_irq = false;
        self.prev_run_irq = false;
        self.jammed = None;
    }

    /// True between instructions, when the next cycle fetches an opcode or
    /// starts an interrupt sequence.
    pub fn at_instruction_boundary(&self) -> bool {
        self.current_op.opcode.is_none() && self.active_interrupt.is_none()
    }

    pub fn is_jammed(&self) -> bool {
        self.jammed.is_some()
    }
}

impl Ordinal for ExecPhase {
    fn ordinal(&self) -> u8 {
        *self as u8
    }

    fn from_ordinal(ordinal: u8) -> Option<Self> {
        [
            ExecPhase::Idle,
            ExecPhase::Read,
            ExecPhase::Internal,
            ExecPhase::Write,
            ExecPhase::Done,
        ]
        .get(ordinal as usize)
        .copied()
    }
}

impl Snapshotable for CPU {
    fn save(&self, s: &mut Snapshot) {
        s.write("a", self.register_a);
        s.write("x", self.register_x);
        s.write("y", self.register_y);
        s.write("sp", self.stack_pointer);
        s.write("pc", self.program_counter);
        s.write("status", self.status.bits());
        s.write("cycles", self.cycles);
        s.write("prevNmiLine", self.prev_nmi_line);
        s.write("needNmi", self.need_nmi);
        s.write("prevNeedNmi", self.prev_need_nmi);
        s.write("runIrq", self.run_irq);
        s.write("prevRunIrq", self.prev_run_irq);
        s.write("lastOpcode", self.last_opcode);
        s.write("jammed", self.jammed.is_some());

        let op = &self.current_op;
        if let Some(opcode) = op.opcode {
            s.write("opcode", opcode.code);
        }
        if let Some(interrupt) = self.active_interrupt {
            s.write_enum("interrupt", interrupt.interrupt_type);
        }
        s.write("microCycle", op.micro_cycle);
        s.write_enum("execPhase", op.exec_phase);
        s.write("tmpAddr", op.tmp_addr);
        s.write("tmpData", op.tmp_data);
        s.write("pageCrossed", op.page_crossed);
        s.write("baseAddr", op.base_addr);
        let (kind, addr) = match op.addr_result {
            AddrResult::InProgress => (0u8, 0u16),
            AddrResult::Ready(addr) => (1, addr),
            AddrResult::ReadyImmediate => (2, 0),
        };
        s.write("addrResult", kind);
        s.write("addrReady", addr);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.register_a = s.read("a");
        self.register_x = s.read("x");
        self.register_y = s.read("y");
        self.stack_pointer = s.read("sp");
        self.program_counter = s.read("pc");
        self.status = Flags::from_bits_truncate(s.read("status"));
        self.cycles = s.read("cycles");
        self.prev_nmi_line = s.read("prevNmiLine");
        self.need_nmi = s.read("needNmi");
        self.prev_need_nmi = s.read("prevNeedNmi");
        self.run_irq = s.read("runIrq");
        self.prev_run_irq = s.read("prevRunIrq");
        self.last_opcode = s.read("lastOpcode");

        let opcode = s
            .read_opt::<u8>("opcode")
            .map(|code| opcodes::OPCODE_TABLE[code as usize]);
        self.current_op = CpuCycleState {
            opcode,
            mode: opcode.map(|o| o.mode),
            micro_cycle: s.read("microCycle"),
            exec_phase: s.read_enum("execPhase", ExecPhase::Idle),
            tmp_addr: s.read("tmpAddr"),
            tmp_data: s.read("tmpData"),
            page_crossed: s.read("pageCrossed"),
            base_addr: s.read("baseAddr"),
            access_type: opcode.map(|o| o.access_type).unwrap_or_default(),
            addr_result: match s.read::<u8>("addrResult") {
                1 => AddrResult::Ready(s.read("addrReady")),
                2 => AddrResult::ReadyImmediate,
                _ => AddrResult::InProgress,
            },
        };
        self.active_interrupt = s
            .read_opt::<u8>("interrupt")
            .and_then(InterruptType::from_ordinal)
            .map(Interrupt::for_type);
        self.jammed = s.read::<bool>("jammed").then(|| CpuError::Jam {
            opcode: self.last_opcode,
            addr: self.program_counter.wrapping_sub(1),
        });
    }
}

impl Traceable for CPU {
    fn trace_name(&self) -> &'static str {
        "CPU"
    }

    fn trace_state(&self) -> Option<String> {
        self.at_instruction_boundary().then(|| {
            format!(
                "PC={:04X} A={:02X} X={:02X} Y={:02X} P={:02X} SP={:02X} CYC={} [{:02X}]",
                self.program_counter,
                self.register_a,
                self.register_x,
                self.register_y,
                self.status.bits(),
                self.stack_pointer,
                self.cycles,
                self.last_opcode
            )
        })
    }
}
