use super::interrupts;
use super::opcodes::OPCODE_TABLE;
use super::{AccessType, CPU, CpuBusInterface, CpuCycleState, CpuError, Flags};
use crate::trace_cpu_event;

impl CPU {
    pub(super) fn advance_program_counter(&mut self) {
        self.program_counter = self.program_counter.wrapping_add(1);
    }

    pub(super) fn read_program_counter(&mut self, bus: &mut dyn CpuBusInterface) -> u8 {
        bus.cpu_bus_read(self.program_counter)
    }

    pub(super) fn consume_program_counter(&mut self, bus: &mut dyn CpuBusInterface) -> u8 {
        let byte = self.read_program_counter(bus);
        self.advance_program_counter();
        byte
    }

    /// Runs one CPU cycle.
    ///
    /// Returns `Ok(true)` when this cycle completed an instruction or an
    /// interrupt sequence. A JAM opcode returns an
    /// error, and every later tick keeps returning it until reset.
    pub fn tick(&mut self, bus: &mut dyn CpuBusInterface) -> Result<bool, CpuError> {
        if let Some(err) = self.jammed {
            return Err(err);
        }

        let done = self.tick_inner(bus)?;
        self.cycles += 1;
        self.poll_interrupts(bus);
        Ok(done)
    }

    /// A cycle in which the CPU is halted by DMA. Interrupt lines are still
    /// sampled.
    pub fn stall_cycle(&mut self, bus: &mut dyn CpuBusInterface) {
        self.cycles += 1;
        self.poll_interrupts(bus);
    }

    fn tick_inner(&mut self, bus: &mut dyn CpuBusInterface) -> Result<bool, CpuError> {
        if self.current_op.opcode.is_none() {
            if self.active_interrupt.is_none() && (self.prev_need_nmi || self.prev_run_irq) {
                // NMI can still take over an IRQ sequence up to the push of P
                self.current_op = CpuCycleState::default();
                self.active_interrupt = Some(if self.prev_need_nmi {
                    interrupts::NMI
                } else {
                    interrupts::IRQ
                });
            }

            if let Some(interrupt) = self.active_interrupt {
                let done = self.exec_interrupt_cycle(bus, interrupt);
                if done {
                    self.active_interrupt = None;
                    self.current_op = CpuCycleState::default();
                }
                return Ok(done);
            }

            let code = self.consume_program_counter(bus);
            self.last_opcode = code;
            let opcode = OPCODE_TABLE[code as usize];

            if opcode.access_type == AccessType::Jam {
                self.program_counter = self.program_counter.wrapping_sub(1);
                let err = CpuError::Jam {
                    opcode: code,
                    addr: self.program_counter,
                };
                log::warn!("{err}");
                self.jammed = Some(err);
                return Err(err);
            }

            self.current_op = CpuCycleState {
                opcode: Some(opcode),
                mode: Some(opcode.mode),
                access_type: opcode.access_type,
                ..CpuCycleState::default()
            };
            return Ok(false);
        }

        let Some(opcode) = self.current_op.opcode else {
            return Ok(false);
        };
        let done = (opcode.exec)(self, bus);
        if done {
            self.current_op = CpuCycleState::default();
        }
        Ok(done)
    }

    /// Samples the interrupt lines at the end of a cycle. What is seen here
    /// becomes effective one cycle later, at the next instruction boundary.
    fn poll_interrupts(&mut self, bus: &mut dyn CpuBusInterface) {
        self.prev_need_nmi = self.need_nmi;
        let nmi = bus.nmi_line();
        if nmi && !self.prev_nmi_line {
            self.need_nmi = true;
            trace_cpu_event!("[NMI EDGE] PC={:04X} cyc={}", self.program_counter, self.cycles);
        }
        self.prev_nmi_line = nmi;

        self.prev_run_irq = self.run_irq;
        self.run_irq = bus.irq_line() && !self.status.contains(Flags::INTERRUPT_DISABLE);
    }

    /// Clears the latch that would start an interrupt at the next boundary.
    /// Used by BRK after a hijack so the handler's first instruction runs.
    pub(super) fn suppress_pending_nmi(&mut self) {
        self.prev_need_nmi = false;
    }

    pub(super) fn take_pending_nmi(&mut self) -> bool {
        std::mem::take(&mut self.need_nmi)
    }
}
