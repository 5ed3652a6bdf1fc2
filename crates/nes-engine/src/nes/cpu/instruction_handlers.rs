use super::interrupts::{Interrupt, InterruptType};
use super::{
    AccessType, AddrResult, AddressingMode, CPU, CPU_STACK_BASE, CpuBusInterface, ExecPhase,
    Flags,
};
use crate::trace_cpu_event;

const NMI_VECTOR: u16 = 0xFFFA;
const RESET_VECTOR: u16 = 0xFFFC;
const IRQ_VECTOR: u16 = 0xFFFE;

impl CPU {
    /// Software-defined interrupt
    pub(super) fn brk(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        match self.current_op.micro_cycle {
            0 => {
                let _ = self.consume_program_counter(bus); // padding byte
            }
            1 => {
                let hi = (self.program_counter >> 8) as u8;
                self.stack_push(bus, hi);
            }
            2 => {
                let lo = self.program_counter as u8;
                self.stack_push(bus, lo);
            }
            3 => {
                let mut status_flags = self.status;
                status_flags.insert(Flags::BREAK | Flags::BREAK2);
                // An NMI arriving before this push takes over the vector
                self.current_op.base_addr = if self.take_pending_nmi() {
                    NMI_VECTOR
                } else {
                    IRQ_VECTOR
                };
                self.stack_push(bus, status_flags.bits());
                self.status.insert(Flags::INTERRUPT_DISABLE);
            }
            4 => {
                let lo = bus.cpu_bus_read(self.current_op.base_addr);
                self.current_op.tmp_addr = lo as u16;
            }
            5 => {
                let hi = bus.cpu_bus_read(self.current_op.base_addr.wrapping_add(1));
                self.program_counter = ((hi as u16) << 8) | self.current_op.tmp_addr;
                self.suppress_pending_nmi();
                return true;
            }
            _ => unreachable!(),
        }
        self.current_op.micro_cycle += 1;
        false
    }

    /// General NOP
    pub(super) fn nop(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |_| {})
    }

    /// Unofficial NOPs that consume extra bytes
    pub(super) fn fat_nop(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |_| {})
    }

    /// Never dispatched: the fetch cycle stops the CPU on these opcodes.
    pub(super) fn jam(&mut self, _bus: &mut dyn CpuBusInterface) -> bool {
        true
    }

    //
    // Transfers
    //////////////
    pub(super) fn tax(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            cpu.set_register_x(cpu.register_a);
        })
    }

    pub(super) fn tay(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            cpu.set_register_y(cpu.register_a);
        })
    }

    pub(super) fn tsx(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            cpu.set_register_x(cpu.stack_pointer);
        })
    }

    pub(super) fn txa(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            cpu.set_register_a(cpu.register_x);
        })
    }

    pub(super) fn txs(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            cpu.stack_pointer = cpu.register_x;
        })
    }

    pub(super) fn tya(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            cpu.set_register_a(cpu.register_y);
        })
    }

    //
    // Flags
    //////////
    pub(super) fn sed(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| cpu.status.insert(Flags::DECIMAL_MODE))
    }

    pub(super) fn sei(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| cpu.status.insert(Flags::INTERRUPT_DISABLE))
    }

    pub(super) fn sec(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| cpu.status.insert(Flags::CARRY))
    }

    pub(super) fn cld(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| cpu.status.remove(Flags::DECIMAL_MODE))
    }

    pub(super) fn cli(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| cpu.status.remove(Flags::INTERRUPT_DISABLE))
    }

    pub(super) fn clc(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| cpu.status.remove(Flags::CARRY))
    }

    pub(super) fn clv(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| cpu.status.remove(Flags::OVERFLOW))
    }

    //
    // Loads
    //////////
    pub(super) fn lda(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            cpu.set_register_a(cpu.current_op.tmp_data);
        })
    }

    pub(super) fn ldx(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            cpu.set_register_x(cpu.current_op.tmp_data);
        })
    }

    pub(super) fn ldy(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            cpu.set_register_y(cpu.current_op.tmp_data);
        })
    }

    //
    // Stores
    //////////
    pub(super) fn sta(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_write_cycle(bus, |cpu| {
            cpu.current_op.tmp_data = cpu.register_a;
        })
    }

    pub(super) fn stx(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_write_cycle(bus, |cpu| {
            cpu.current_op.tmp_data = cpu.register_x;
        })
    }

    pub(super) fn sty(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_write_cycle(bus, |cpu| {
            cpu.current_op.tmp_data = cpu.register_y;
        })
    }

    //
    // Stack
    //////////

    /// Pop stack into accumulator
    pub(super) fn pla(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_stack_pop_cycle(bus, |cpu, value| {
            cpu.set_register_a(value);
        })
    }

    /// Pop stack into processor_status
    pub(super) fn plp(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_stack_pop_cycle(bus, |cpu, value| {
            cpu.status = Flags::from_bits_truncate(value);
            cpu.status.remove(Flags::BREAK);
            cpu.status.insert(Flags::BREAK2);
        })
    }

    pub(super) fn pha(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_stack_push_cycle(bus, |cpu| cpu.register_a)
    }

    /// B is pushed as 1 but never exists in the live register.
    /// https://www.nesdev.org/wiki/Status_flags
    pub(super) fn php(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_stack_push_cycle(bus, |cpu| (cpu.status | Flags::BREAK | Flags::BREAK2).bits())
    }

    //
    // Shifts
    ///////////
    pub(super) fn asl_reg(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            let carry = cpu.register_a & 0x80 != 0;
            cpu.status.set(Flags::CARRY, carry);
            cpu.set_register_a(cpu.register_a << 1);
        })
    }

    pub(super) fn asl_mem(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_modify_write_cycle(bus, |cpu| {
            let value = cpu.current_op.tmp_data;
            cpu.status.set(Flags::CARRY, value & 0x80 != 0);
            cpu.current_op.tmp_data = value << 1;
            cpu.update_zero_and_negative_flags(cpu.current_op.tmp_data);
        })
    }

    pub(super) fn lsr_reg(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            let carry = cpu.register_a & 1 != 0;
            cpu.status.set(Flags::CARRY, carry);
            cpu.set_register_a(cpu.register_a >> 1);
        })
    }

    pub(super) fn lsr_mem(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_modify_write_cycle(bus, |cpu| {
            let value = cpu.current_op.tmp_data;
            cpu.status.set(Flags::CARRY, value & 1 != 0);
            cpu.current_op.tmp_data = value >> 1;
            cpu.update_zero_and_negative_flags(cpu.current_op.tmp_data);
        })
    }

    //
    // Rotates
    ///////////////
    pub(super) fn rol_reg(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            let carry = cpu.status.contains(Flags::CARRY);
            let (value, new_carry) = Self::rotate_value_left(cpu.register_a, carry);
            cpu.set_register_a(value);
            cpu.status.set(Flags::CARRY, new_carry);
        })
    }

    pub(super) fn rol_mem(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_modify_write_cycle(bus, |cpu| {
            cpu.rol_tmp();
        })
    }

    pub(super) fn ror_reg(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            let carry = cpu.status.contains(Flags::CARRY);
            let (value, new_carry) = Self::rotate_value_right(cpu.register_a, carry);
            cpu.set_register_a(value);
            cpu.status.set(Flags::CARRY, new_carry);
        })
    }

    pub(super) fn ror_mem(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_modify_write_cycle(bus, |cpu| {
            cpu.ror_tmp();
        })
    }

    //
    // Increments / Decrements
    ////////////////////////////
    pub(super) fn inc(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_modify_write_cycle(bus, |cpu| {
            cpu.current_op.tmp_data = cpu.current_op.tmp_data.wrapping_add(1);
            cpu.update_zero_and_negative_flags(cpu.current_op.tmp_data);
        })
    }

    pub(super) fn inx(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            cpu.set_register_x(cpu.register_x.wrapping_add(1));
        })
    }

    pub(super) fn iny(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            cpu.set_register_y(cpu.register_y.wrapping_add(1));
        })
    }

    pub(super) fn dec(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_modify_write_cycle(bus, |cpu| {
            cpu.current_op.tmp_data = cpu.current_op.tmp_data.wrapping_sub(1);
            cpu.update_zero_and_negative_flags(cpu.current_op.tmp_data);
        })
    }

    pub(super) fn dex(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            cpu.set_register_x(cpu.register_x.wrapping_sub(1));
        })
    }

    pub(super) fn dey(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_modify_register(bus, |cpu| {
            cpu.set_register_y(cpu.register_y.wrapping_sub(1));
        })
    }

    //
    // Comparisons
    /////////////////
    fn compare(&mut self, compare_val: u8) {
        let value = self.current_op.tmp_data;
        self.status.set(Flags::CARRY, compare_val >= value);
        self.update_zero_and_negative_flags(compare_val.wrapping_sub(value));
    }

    pub(super) fn cmp(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| cpu.compare(cpu.register_a))
    }

    pub(super) fn cpx(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| cpu.compare(cpu.register_x))
    }

    pub(super) fn cpy(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| cpu.compare(cpu.register_y))
    }

    //
    // Addition/Subtraction
    ///////////////////////////
    pub(super) fn adc(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            cpu.add_to_register_a(cpu.current_op.tmp_data);
        })
    }

    /// Also serves the unofficial $EB.
    pub(super) fn sbc(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            cpu.sub_from_register_a(cpu.current_op.tmp_data);
        })
    }

    //
    // Bitwise ops
    //////////////////
    pub(super) fn and(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            cpu.set_register_a(cpu.register_a & cpu.current_op.tmp_data);
        })
    }

    pub(super) fn eor(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            cpu.set_register_a(cpu.register_a ^ cpu.current_op.tmp_data);
        })
    }

    pub(super) fn ora(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            cpu.set_register_a(cpu.register_a | cpu.current_op.tmp_data);
        })
    }

    pub(super) fn bit(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            let value = cpu.current_op.tmp_data;
            cpu.status.set(Flags::NEGATIVE, value & (1 << 7) != 0);
            cpu.status.set(Flags::OVERFLOW, value & (1 << 6) != 0);
            cpu.status.set(Flags::ZERO, value & cpu.register_a == 0);
        })
    }

    //
    // Jumps
    ///////////////
    pub(super) fn jmp(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_jmp_cycle(bus, |cpu| {
            cpu.program_counter = cpu.current_op.tmp_addr;
        })
    }

    /// Jump to subroutine. The high operand byte is fetched last, after the
    /// return address has been pushed.
    pub(super) fn jsr(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        match self.current_op.micro_cycle {
            0 => {
                self.current_op.tmp_data = self.consume_program_counter(bus);
            }
            1 => {
                let _ = bus.cpu_bus_read(self.stack_address()); // internal
            }
            2 => {
                let hi = (self.program_counter >> 8) as u8;
                self.stack_push(bus, hi);
            }
            3 => {
                let lo = self.program_counter as u8;
                self.stack_push(bus, lo);
            }
            4 => {
                let hi = self.read_program_counter(bus);
                self.program_counter = ((hi as u16) << 8) | self.current_op.tmp_data as u16;
                return true;
            }
            _ => unreachable!(),
        }
        self.current_op.micro_cycle += 1;
        false
    }

    //
    // Returns
    //////////////
    pub(super) fn rts(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        match self.current_op.micro_cycle {
            0 => {
                let _ = self.read_program_counter(bus); // dummy read
            }
            1 => {
                let _ = bus.cpu_bus_read(self.stack_address()); // dummy read
            }
            2 => {
                let lo = self.stack_pop(bus);
                self.current_op.tmp_addr = lo as u16;
            }
            3 => {
                let hi = self.stack_pop(bus);
                self.program_counter = ((hi as u16) << 8) | self.current_op.tmp_addr;
            }
            4 => {
                let _ = self.consume_program_counter(bus); // dummy read
                return true;
            }
            _ => unreachable!(),
        }
        self.current_op.micro_cycle += 1;
        false
    }

    pub(super) fn rti(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        match self.current_op.micro_cycle {
            0 => {
                let _ = self.read_program_counter(bus); // dummy read
            }
            1 => {
                let _ = bus.cpu_bus_read(self.stack_address()); // dummy read
            }
            2 => {
                let mut flags = Flags::from_bits_truncate(self.stack_pop(bus));
                flags.remove(Flags::BREAK);
                flags.insert(Flags::BREAK2);
                self.status = flags;
            }
            3 => {
                let lo = self.stack_pop(bus);
                self.current_op.tmp_addr = lo as u16;
            }
            4 => {
                let hi = self.stack_pop(bus);
                self.program_counter = ((hi as u16) << 8) | self.current_op.tmp_addr;
                return true;
            }
            _ => unreachable!(),
        }
        self.current_op.micro_cycle += 1;
        false
    }

    //
    // Branches
    ////////////////
    pub(super) fn bne(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_branch_cycle(bus, |cpu| !cpu.status.contains(Flags::ZERO))
    }

    pub(super) fn bvs(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_branch_cycle(bus, |cpu| cpu.status.contains(Flags::OVERFLOW))
    }

    pub(super) fn bvc(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_branch_cycle(bus, |cpu| !cpu.status.contains(Flags::OVERFLOW))
    }

    pub(super) fn bmi(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_branch_cycle(bus, |cpu| cpu.status.contains(Flags::NEGATIVE))
    }

    pub(super) fn beq(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_branch_cycle(bus, |cpu| cpu.status.contains(Flags::ZERO))
    }

    pub(super) fn bcs(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_branch_cycle(bus, |cpu| cpu.status.contains(Flags::CARRY))
    }

    pub(super) fn bcc(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_branch_cycle(bus, |cpu| !cpu.status.contains(Flags::CARRY))
    }

    pub(super) fn bpl(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_branch_cycle(bus, |cpu| !cpu.status.contains(Flags::NEGATIVE))
    }
}

////////////////////////////////
// Unofficial Opcodes
////////////////////////////////
impl CPU {
    /// DCP => DEC oper + CMP oper
    pub(super) fn dcp(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_modify_write_cycle(bus, |cpu| {
            cpu.current_op.tmp_data = cpu.current_op.tmp_data.wrapping_sub(1);
            cpu.compare(cpu.register_a);
        })
    }

    /// RLA => ROL oper + AND oper
    pub(super) fn rla(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_modify_write_cycle(bus, |cpu| {
            let result = cpu.rol_tmp();
            cpu.set_register_a(cpu.register_a & result);
        })
    }

    /// SLO => ASL oper + ORA oper
    pub(super) fn slo(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_modify_write_cycle(bus, |cpu| {
            let value = cpu.current_op.tmp_data;
            cpu.status.set(Flags::CARRY, value & 0x80 != 0);
            cpu.current_op.tmp_data = value << 1;
            cpu.set_register_a(cpu.register_a | cpu.current_op.tmp_data);
        })
    }

    /// SRE => LSR oper + EOR oper
    pub(super) fn sre(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_modify_write_cycle(bus, |cpu| {
            let value = cpu.current_op.tmp_data;
            cpu.status.set(Flags::CARRY, value & 1 != 0);
            cpu.current_op.tmp_data = value >> 1;
            cpu.set_register_a(cpu.register_a ^ cpu.current_op.tmp_data);
        })
    }

    /// RRA => ROR oper + ADC oper
    pub(super) fn rra(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_modify_write_cycle(bus, |cpu| {
            let result = cpu.ror_tmp();
            cpu.add_to_register_a(result);
        })
    }

    /// ISC => INC oper + SBC oper
    pub(super) fn isc(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_modify_write_cycle(bus, |cpu| {
            cpu.current_op.tmp_data = cpu.current_op.tmp_data.wrapping_add(1);
            cpu.sub_from_register_a(cpu.current_op.tmp_data);
        })
    }

    /// LAX => LDA oper + LDX oper
    pub(super) fn lax(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            cpu.register_x = cpu.current_op.tmp_data;
            cpu.set_register_a(cpu.current_op.tmp_data);
        })
    }

    /// SAX => A AND X -> M
    pub(super) fn sax(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_write_cycle(bus, |cpu| {
            cpu.current_op.tmp_data = cpu.register_a & cpu.register_x;
        })
    }

    /// SBX (AXS) => (A AND X) - oper -> X, flags like CMP
    pub(super) fn sbx(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            let and = cpu.register_a & cpu.register_x;
            let value = cpu.current_op.tmp_data;
            cpu.status.set(Flags::CARRY, and >= value);
            cpu.set_register_x(and.wrapping_sub(value));
        })
    }

    /// ARR => AND oper + ROR, with C from bit 6 and V from bit 6 ^ bit 5
    pub(super) fn arr(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            let anded = cpu.register_a & cpu.current_op.tmp_data;
            let carry = cpu.status.contains(Flags::CARRY);
            let (value, _) = Self::rotate_value_right(anded, carry);
            cpu.set_register_a(value);

            let b5 = value & (1 << 5) != 0;
            let b6 = value & (1 << 6) != 0;
            cpu.status.set(Flags::CARRY, b6);
            cpu.status.set(Flags::OVERFLOW, b5 ^ b6);
        })
    }

    /// ANC => A AND oper, bit(7) -> C
    pub(super) fn anc(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            cpu.set_register_a(cpu.register_a & cpu.current_op.tmp_data);
            cpu.status.set(Flags::CARRY, cpu.register_a & 0x80 != 0);
        })
    }

    /// ALR => AND oper + LSR
    pub(super) fn alr(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            let value = cpu.register_a & cpu.current_op.tmp_data;
            cpu.status.set(Flags::CARRY, value & 1 != 0);
            cpu.set_register_a(value >> 1);
        })
    }

    /// LAS (LAR) => oper AND SP -> A, X, SP
    pub(super) fn las(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            let result = cpu.stack_pointer & cpu.current_op.tmp_data;
            cpu.register_x = result;
            cpu.stack_pointer = result;
            cpu.set_register_a(result);
        })
    }

    /// XAA (ANE) => (A OR magic) AND X AND oper -> A
    pub(super) fn xaa(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            let value = (cpu.register_a | 0xEE) & cpu.register_x & cpu.current_op.tmp_data;
            cpu.set_register_a(value);
        })
    }

    /// LXA (LAX #imm) => (A OR magic) AND oper -> A, X
    pub(super) fn lxa(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_read_cycle(bus, |cpu| {
            let value = (cpu.register_a | 0xFF) & cpu.current_op.tmp_data;
            cpu.register_x = value;
            cpu.set_register_a(value);
        })
    }

    /// SHY => Y AND (H+1) -> M
    pub(super) fn shy(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_unstable_store(bus, |cpu| cpu.register_y)
    }

    /// SHX => X AND (H+1) -> M
    pub(super) fn shx(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_unstable_store(bus, |cpu| cpu.register_x)
    }

    /// SHA (AHX) => A AND X AND (H+1) -> M
    pub(super) fn sha(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_unstable_store(bus, |cpu| cpu.register_a & cpu.register_x)
    }

    /// TAS (SHS) => A AND X -> SP, SP AND (H+1) -> M
    pub(super) fn tas(&mut self, bus: &mut dyn CpuBusInterface) -> bool {
        self.exec_unstable_store(bus, |cpu| {
            cpu.stack_pointer = cpu.register_a & cpu.register_x;
            cpu.stack_pointer
        })
    }
}

//////////////////
// Helpers
//////////////////
impl CPU {
    pub(super) fn rotate_value_left(value: u8, current_carry: bool) -> (u8, bool) {
        let new_carry = value & 0b1000_0000 != 0;
        ((value << 1) | current_carry as u8, new_carry)
    }

    pub(super) fn rotate_value_right(value: u8, current_carry: bool) -> (u8, bool) {
        let new_carry = value & 0b0000_0001 != 0;
        ((value >> 1) | ((current_carry as u8) << 7), new_carry)
    }

    fn rol_tmp(&mut self) -> u8 {
        let carry = self.status.contains(Flags::CARRY);
        let (result, new_carry) = Self::rotate_value_left(self.current_op.tmp_data, carry);
        self.current_op.tmp_data = result;
        self.update_zero_and_negative_flags(result);
        self.status.set(Flags::CARRY, new_carry);
        result
    }

    fn ror_tmp(&mut self) -> u8 {
        let carry = self.status.contains(Flags::CARRY);
        let (result, new_carry) = Self::rotate_value_right(self.current_op.tmp_data, carry);
        self.current_op.tmp_data = result;
        self.update_zero_and_negative_flags(result);
        self.status.set(Flags::CARRY, new_carry);
        result
    }

    pub(super) fn set_register_a(&mut self, value: u8) {
        self.register_a = value;
        self.update_zero_and_negative_flags(value);
    }

    pub(super) fn set_register_x(&mut self, value: u8) {
        self.register_x = value;
        self.update_zero_and_negative_flags(value);
    }

    pub(super) fn set_register_y(&mut self, value: u8) {
        self.register_y = value;
        self.update_zero_and_negative_flags(value);
    }

    fn stack_address(&self) -> u16 {
        CPU_STACK_BASE | self.stack_pointer as u16
    }

    fn stack_push(&mut self, bus: &mut dyn CpuBusInterface, value: u8) {
        bus.cpu_bus_write(self.stack_address(), value);
        self.stack_pointer = self.stack_pointer.wrapping_sub(1);
    }

    fn stack_pop(&mut self, bus: &mut dyn CpuBusInterface) -> u8 {
        self.stack_pointer = self.stack_pointer.wrapping_add(1);
        bus.cpu_bus_read(self.stack_address())
    }

    fn update_zero_and_negative_flags(&mut self, result: u8) {
        self.status.set(Flags::ZERO, result == 0);
        self.status.set(Flags::NEGATIVE, result & 0b1000_0000 != 0);
    }

    /// Binary add; the NES CPU has no decimal mode.
    fn add_to_register_a(&mut self, value: u8) {
        let curr_carry = self.status.contains(Flags::CARRY) as u16;
        let sum = self.register_a as u16 + value as u16 + curr_carry;
        let result = sum as u8;

        // Overflow when both inputs share a sign the result does not.
        // See: https://forums.nesdev.org/viewtopic.php?t=6331
        let signed_overflow =
            ((self.register_a ^ result) & 0x80 != 0) && ((self.register_a ^ value) & 0x80 == 0);

        self.status.set(Flags::OVERFLOW, signed_overflow);
        self.status.set(Flags::CARRY, sum > 0xFF);
        self.set_register_a(result);
    }

    fn sub_from_register_a(&mut self, data: u8) {
        self.add_to_register_a(!data);
    }
}

////////////////////////////////////
// Address resolver and executors
////////////////////////////////////
impl CPU {
    /// Indexed reads only take the fix-up cycle on a page cross; writes and
    /// read-modify-writes always take it.
    fn needs_dummy_cycle(&self) -> bool {
        match self.current_op.access_type {
            AccessType::Read => self.current_op.page_crossed,
            _ => true,
        }
    }

    fn tick_addressing_mode(&mut self, bus: &mut dyn CpuBusInterface) -> AddrResult {
        let Some(mode) = self.current_op.mode else {
            return AddrResult::ReadyImmediate;
        };
        match mode {
            AddressingMode::Implied | AddressingMode::Accumulator => {
                self.current_op.addr_result = AddrResult::ReadyImmediate;
            }
            AddressingMode::Immediate => {
                if self.current_op.micro_cycle == 0 {
                    self.current_op.tmp_data = self.consume_program_counter(bus);
                    self.current_op.addr_result = AddrResult::ReadyImmediate;
                }
            }
            AddressingMode::ZeroPage => {
                if self.current_op.micro_cycle == 0 {
                    let zero_page = self.consume_program_counter(bus);
                    self.current_op.tmp_addr = zero_page as u16;
                    self.current_op.addr_result = AddrResult::Ready(self.current_op.tmp_addr);
                }
            }
            AddressingMode::ZeroPageX | AddressingMode::ZeroPageY => {
                let index = if mode == AddressingMode::ZeroPageX {
                    self.register_x
                } else {
                    self.register_y
                };
                match self.current_op.micro_cycle {
                    0 => {
                        let zero_page = self.consume_program_counter(bus);
                        self.current_op.tmp_addr = zero_page as u16;
                    }
                    1 => {
                        let _ = bus.cpu_bus_read(self.current_op.tmp_addr); // dummy read
                        self.current_op.tmp_addr =
                            self.current_op.tmp_addr.wrapping_add(index as u16) & 0x00FF;
                        self.current_op.addr_result = AddrResult::Ready(self.current_op.tmp_addr);
                    }
                    _ => {}
                }
            }
            AddressingMode::Absolute => match self.current_op.micro_cycle {
                0 => {
                    let lo = self.consume_program_counter(bus);
                    self.current_op.tmp_addr = lo as u16;
                }
                1 => {
                    let hi = self.consume_program_counter(bus);
                    self.current_op.tmp_addr |= (hi as u16) << 8;
                    self.current_op.addr_result = AddrResult::Ready(self.current_op.tmp_addr);
                }
                _ => {}
            },
            AddressingMode::AbsoluteX | AddressingMode::AbsoluteY => {
                let index = if mode == AddressingMode::AbsoluteX {
                    self.register_x
                } else {
                    self.register_y
                };
                match self.current_op.micro_cycle {
                    0 => {
                        let lo = self.consume_program_counter(bus);
                        self.current_op.tmp_addr = lo as u16;
                    }
                    1 => {
                        let hi = self.consume_program_counter(bus);
                        let base = self.current_op.tmp_addr | ((hi as u16) << 8);
                        self.set_indexed_target(base, index);
                    }
                    2 => self.indexed_fixup_cycle(bus),
                    _ => {}
                }
            }
            AddressingMode::IndirectX => match self.current_op.micro_cycle {
                0 => {
                    let zero_page = self.consume_program_counter(bus);
                    self.current_op.tmp_addr = zero_page as u16;
                }
                1 => {
                    let _ = bus.cpu_bus_read(self.current_op.tmp_addr); // dummy read
                    self.current_op.tmp_addr =
                        self.current_op.tmp_addr.wrapping_add(self.register_x as u16) & 0x00FF;
                }
                2 => {
                    self.current_op.tmp_data = bus.cpu_bus_read(self.current_op.tmp_addr);
                }
                3 => {
                    let hi = bus.cpu_bus_read(self.current_op.tmp_addr.wrapping_add(1) & 0x00FF);
                    self.current_op.tmp_addr = ((hi as u16) << 8) | self.current_op.tmp_data as u16;
                    self.current_op.addr_result = AddrResult::Ready(self.current_op.tmp_addr);
                }
                _ => {}
            },
            AddressingMode::IndirectY => match self.current_op.micro_cycle {
                0 => {
                    let zero_page = self.consume_program_counter(bus);
                    self.current_op.tmp_addr = zero_page as u16;
                }
                1 => {
                    self.current_op.tmp_data = bus.cpu_bus_read(self.current_op.tmp_addr);
                }
                2 => {
                    let hi = bus.cpu_bus_read(self.current_op.tmp_addr.wrapping_add(1) & 0x00FF);
                    let base = ((hi as u16) << 8) | self.current_op.tmp_data as u16;
                    self.set_indexed_target(base, self.register_y);
                }
                3 => self.indexed_fixup_cycle(bus),
                _ => {}
            },
            AddressingMode::Indirect => match self.current_op.micro_cycle {
                0 => {
                    let lo = self.consume_program_counter(bus);
                    self.current_op.tmp_addr = lo as u16;
                }
                1 => {
                    let hi = self.consume_program_counter(bus);
                    self.current_op.tmp_addr |= (hi as u16) << 8;
                }
                2 => {
                    self.current_op.tmp_data = bus.cpu_bus_read(self.current_op.tmp_addr);
                }
                3 => {
                    // the pointer's high byte never carries into the next page
                    let ptr = self.current_op.tmp_addr;
                    let hi_addr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
                    let hi = bus.cpu_bus_read(hi_addr);
                    self.current_op.tmp_addr = ((hi as u16) << 8) | self.current_op.tmp_data as u16;
                    self.current_op.addr_result = AddrResult::Ready(self.current_op.tmp_addr);
                }
                _ => {}
            },
            AddressingMode::Relative => {
                // Note: Branch opcodes exclusively use this address mode
                if self.current_op.micro_cycle == 0 {
                    self.current_op.tmp_data = self.consume_program_counter(bus);
                    self.current_op.addr_result = AddrResult::Ready(self.program_counter);
                }
            }
        }
        self.current_op.micro_cycle += 1;
        self.current_op.addr_result
    }

    fn set_indexed_target(&mut self, base: u16, index: u8) {
        let addr = base.wrapping_add(index as u16);
        self.current_op.page_crossed = (base & 0xFF00) != (addr & 0xFF00);
        self.current_op.base_addr = base;
        self.current_op.tmp_addr = addr;
        if !self.needs_dummy_cycle() {
            self.current_op.addr_result = AddrResult::Ready(addr);
        }
    }

    /// Reads from the un-carried address while the high byte is fixed up.
    fn indexed_fixup_cycle(&mut self, bus: &mut dyn CpuBusInterface) {
        if self.needs_dummy_cycle() {
            let dummy = (self.current_op.base_addr & 0xFF00) | (self.current_op.tmp_addr & 0x00FF);
            let _ = bus.cpu_bus_read(dummy);
        }
        self.current_op.addr_result = AddrResult::Ready(self.current_op.tmp_addr);
    }

    fn exec_read_cycle<F>(&mut self, bus: &mut dyn CpuBusInterface, op: F) -> bool
    where
        F: Fn(&mut CPU),
    {
        match self.tick_addressing_mode(bus) {
            AddrResult::InProgress => false,
            AddrResult::Ready(addr) => match self.current_op.exec_phase {
                ExecPhase::Idle => {
                    self.current_op.exec_phase = ExecPhase::Read;
                    false
                }
                ExecPhase::Read => {
                    self.current_op.tmp_data = bus.cpu_bus_read(addr);
                    op(self);
                    self.current_op.exec_phase = ExecPhase::Done;
                    true
                }
                _ => unreachable!(),
            },
            AddrResult::ReadyImmediate => {
                op(self);
                self.current_op.exec_phase = ExecPhase::Done;
                true
            }
        }
    }

    fn exec_write_cycle<F>(&mut self, bus: &mut dyn CpuBusInterface, op: F) -> bool
    where
        F: Fn(&mut CPU),
    {
        match self.tick_addressing_mode(bus) {
            AddrResult::InProgress => false,
            AddrResult::Ready(addr) => match self.current_op.exec_phase {
                ExecPhase::Idle => {
                    self.current_op.exec_phase = ExecPhase::Write;
                    false
                }
                ExecPhase::Write => {
                    op(self);
                    bus.cpu_bus_write(addr, self.current_op.tmp_data);
                    self.current_op.exec_phase = ExecPhase::Done;
                    true
                }
                _ => unreachable!(),
            },
            AddrResult::ReadyImmediate => unreachable!("store without an address"),
        }
    }

    fn exec_unstable_store<F>(&mut self, bus: &mut dyn CpuBusInterface, value: F) -> bool
    where
        F: Fn(&mut CPU) -> u8,
    {
        match self.tick_addressing_mode(bus) {
            AddrResult::InProgress => false,
            AddrResult::Ready(addr) => match self.current_op.exec_phase {
                ExecPhase::Idle => {
                    self.current_op.exec_phase = ExecPhase::Write;
                    false
                }
                ExecPhase::Write => {
                    let hi = (self.current_op.base_addr >> 8) as u8;
                    let data = value(self) & hi.wrapping_add(1);
                    let target = if self.current_op.page_crossed {
                        ((data as u16) << 8) | (addr & 0x00FF)
                    } else {
                        addr
                    };
                    bus.cpu_bus_write(target, data);
                    self.current_op.exec_phase = ExecPhase::Done;
                    true
                }
                _ => unreachable!(),
            },
            AddrResult::ReadyImmediate => unreachable!("store without an address"),
        }
    }

    fn exec_read_modify_write_cycle<F>(&mut self, bus: &mut dyn CpuBusInterface, op: F) -> bool
    where
        F: Fn(&mut CPU),
    {
        match self.tick_addressing_mode(bus) {
            AddrResult::InProgress => false,
            AddrResult::Ready(addr) => match self.current_op.exec_phase {
                ExecPhase::Idle => {
                    self.current_op.exec_phase = ExecPhase::Read;
                    false
                }
                ExecPhase::Read => {
                    self.current_op.tmp_data = bus.cpu_bus_read(addr);
                    self.current_op.exec_phase = ExecPhase::Internal;
                    false
                }
                ExecPhase::Internal => {
                    bus.cpu_bus_write(addr, self.current_op.tmp_data); // dummy write
                    op(self);
                    self.current_op.exec_phase = ExecPhase::Write;
                    false
                }
                ExecPhase::Write => {
                    bus.cpu_bus_write(addr, self.current_op.tmp_data);
                    self.current_op.exec_phase = ExecPhase::Done;
                    true
                }
                _ => unreachable!(),
            },
            AddrResult::ReadyImmediate => unreachable!("read-modify-write without an address"),
        }
    }

    fn exec_stack_pop_cycle<F>(&mut self, bus: &mut dyn CpuBusInterface, op: F) -> bool
    where
        F: Fn(&mut CPU, u8),
    {
        match self.current_op.exec_phase {
            ExecPhase::Idle => {
                let _ = self.read_program_counter(bus); // dummy read
                self.current_op.exec_phase = ExecPhase::Read;
                false
            }
            ExecPhase::Read => {
                let _ = bus.cpu_bus_read(self.stack_address()); // dummy read
                self.current_op.exec_phase = ExecPhase::Write;
                false
            }
            ExecPhase::Write => {
                let value = self.stack_pop(bus);
                op(self, value);
                self.current_op.exec_phase = ExecPhase::Done;
                true
            }
            _ => unreachable!(),
        }
    }

    fn exec_stack_push_cycle<F>(&mut self, bus: &mut dyn CpuBusInterface, value: F) -> bool
    where
        F: Fn(&mut CPU) -> u8,
    {
        match self.current_op.exec_phase {
            ExecPhase::Idle => {
                let _ = self.read_program_counter(bus); // dummy read
                self.current_op.exec_phase = ExecPhase::Write;
                false
            }
            ExecPhase::Write => {
                let value = value(self);
                self.stack_push(bus, value);
                self.current_op.exec_phase = ExecPhase::Done;
                true
            }
            _ => unreachable!(),
        }
    }

    fn exec_modify_register<F>(&mut self, bus: &mut dyn CpuBusInterface, op: F) -> bool
    where
        F: Fn(&mut CPU),
    {
        let _ = self.read_program_counter(bus); // dummy read
        op(self);
        self.current_op.exec_phase = ExecPhase::Done;
        true
    }

    fn exec_jmp_cycle<F>(&mut self, bus: &mut dyn CpuBusInterface, op: F) -> bool
    where
        F: Fn(&mut CPU),
    {
        match self.tick_addressing_mode(bus) {
            AddrResult::InProgress => false,
            AddrResult::Ready(_) | AddrResult::ReadyImmediate => {
                op(self);
                self.current_op.exec_phase = ExecPhase::Done;
                true
            }
        }
    }

    fn exec_branch_cycle<F>(&mut self, bus: &mut dyn CpuBusInterface, condition: F) -> bool
    where
        F: Fn(&mut CPU) -> bool,
    {
        match self.tick_addressing_mode(bus) {
            AddrResult::InProgress => false,
            AddrResult::Ready(_) => match self.current_op.exec_phase {
                ExecPhase::Idle => {
                    if condition(self) {
                        self.current_op.exec_phase = ExecPhase::Internal;
                        false
                    } else {
                        self.current_op.exec_phase = ExecPhase::Done;
                        true
                    }
                }
                ExecPhase::Internal => {
                    // A taken branch does not poll IRQ during this cycle, so an
                    // IRQ that only rose last cycle waits one more instruction.
                    if self.run_irq && !self.prev_run_irq {
                        self.run_irq = false;
                    }
                    let _ = self.read_program_counter(bus); // dummy read

                    let offset = self.current_op.tmp_data as i8;
                    let old_pc = self.program_counter;
                    let new_pc = old_pc.wrapping_add(offset as u16);
                    if (old_pc & 0xFF00) != (new_pc & 0xFF00) {
                        self.current_op.page_crossed = true;
                        self.current_op.tmp_addr = new_pc;
                        self.current_op.exec_phase = ExecPhase::Write;
                        false
                    } else {
                        self.program_counter = new_pc;
                        self.current_op.exec_phase = ExecPhase::Done;
                        true
                    }
                }
                ExecPhase::Write => {
                    let new_pc = self.current_op.tmp_addr;
                    let _ = bus.cpu_bus_read((self.program_counter & 0xFF00) | (new_pc & 0x00FF));
                    self.program_counter = new_pc;
                    self.current_op.exec_phase = ExecPhase::Done;
                    true
                }
                _ => unreachable!(),
            },
            AddrResult::ReadyImmediate => unreachable!("branch without an offset"),
        }
    }

    /// One cycle of the shared 7-cycle IRQ/NMI/RESET sequence. Reset turns
    /// the three pushes into reads and leaves the stack untouched.
    pub(super) fn exec_interrupt_cycle(
        &mut self,
        bus: &mut dyn CpuBusInterface,
        interrupt: Interrupt,
    ) -> bool {
        let is_reset = interrupt.interrupt_type == InterruptType::Reset;
        match self.current_op.micro_cycle {
            0 => {
                trace_cpu_event!(
                    "[CPU {:?} ENTRY] PC={:04X} cycle={} flags=0b{:08b}",
                    interrupt.interrupt_type,
                    self.program_counter,
                    self.cycles,
                    self.status.bits()
                );
                let _ = self.read_program_counter(bus); // dummy read
            }
            1 => {
                let _ = self.read_program_counter(bus); // dummy read
            }
            2..=4 if is_reset => {
                let _ = bus.cpu_bus_read(self.stack_address());
                self.stack_pointer = self.stack_pointer.wrapping_sub(1);
                if self.current_op.micro_cycle == 4 {
                    self.current_op.base_addr = RESET_VECTOR;
                    self.status.insert(Flags::INTERRUPT_DISABLE);
                }
            }
            2 => {
                let hi = (self.program_counter >> 8) as u8;
                self.stack_push(bus, hi);
            }
            3 => {
                let lo = self.program_counter as u8;
                self.stack_push(bus, lo);
            }
            4 => {
                let mut status = self.status;
                status.remove(Flags::BREAK);
                status.insert(Flags::from_bits_truncate(interrupt.b_flag_mask));
                self.current_op.base_addr = if self.take_pending_nmi() {
                    NMI_VECTOR
                } else {
                    interrupt.vector_addr
                };
                self.stack_push(bus, status.bits());
                self.status.insert(Flags::INTERRUPT_DISABLE);
            }
            5 => {
                let lo = bus.cpu_bus_read(self.current_op.base_addr);
                self.current_op.tmp_addr = lo as u16;
            }
            6 => {
                let hi = bus.cpu_bus_read(self.current_op.base_addr.wrapping_add(1));
                self.program_counter = ((hi as u16) << 8) | self.current_op.tmp_addr;
                self.current_op.exec_phase = ExecPhase::Done;
                return true;
            }
            _ => unreachable!(),
        }
        self.current_op.micro_cycle += 1;
        false
    }
}
