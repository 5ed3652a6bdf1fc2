use crate::nes::cpu::{CPU, CpuBusInterface, CpuError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAccess {
    Read(u16),
    Write(u16, u8),
}

/// Flat 64KB of RAM with settable interrupt lines and an access log.
pub struct SimpleBus {
    pub memory: Vec<u8>,
    pub nmi: bool,
    pub irq: bool,
    pub accesses: Vec<BusAccess>,
}

impl SimpleBus {
    /// Loads `program` at `origin` and points the reset vector at it.
    pub fn new(program: &[u8], origin: u16) -> SimpleBus {
        let mut bus = SimpleBus {
            memory: vec![0; 0x10000],
            nmi: false,
            irq: false,
            accesses: Vec::new(),
        };
        bus.load(origin, program);
        bus.set_vector(0xFFFC, origin);
        bus
    }

    pub fn load(&mut self, addr: u16, bytes: &[u8]) {
        let start = addr as usize;
        self.memory[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn set_vector(&mut self, vector: u16, target: u16) {
        self.memory[vector as usize] = target as u8;
        self.memory[vector as usize + 1] = (target >> 8) as u8;
    }

    /// Powers the CPU on and runs the reset sequence, leaving the access log
    /// empty.
    pub fn boot(&mut self) -> CPU {
        let mut cpu = CPU::new();
        while !matches!(cpu.tick(self), Ok(true)) {}
        self.accesses.clear();
        cpu
    }

    /// Ticks until the instruction (or interrupt sequence) in flight
    /// finishes and returns how many cycles it took.
    pub fn step_instruction(&mut self, cpu: &mut CPU) -> Result<u64, CpuError> {
        let start = cpu.cycles;
        while !cpu.tick(self)? {}
        Ok(cpu.cycles - start)
    }

    /// Runs until the CPU jams and returns the elapsed cycle count.
    pub fn run_until_jam(&mut self, cpu: &mut CPU) -> u64 {
        let start = cpu.cycles;
        for _ in 0..1_000_000 {
            if cpu.tick(self).is_err() {
                return cpu.cycles - start;
            }
        }
        panic!("program never reached a JAM opcode");
    }
}

impl CpuBusInterface for SimpleBus {
    fn cpu_bus_read(&mut self, addr: u16) -> u8 {
        self.accesses.push(BusAccess::Read(addr));
        self.memory[addr as usize]
    }

    fn cpu_bus_write(&mut self, addr: u16, value: u8) {
        self.accesses.push(BusAccess::Write(addr, value));
        self.memory[addr as usize] = value;
    }

    fn nmi_line(&self) -> bool {
        self.nmi
    }

    fn irq_line(&self) -> bool {
        self.irq
    }
}
