use super::{CPU, CpuError, Flags};
use crate::nes::bus::simple_bus::{BusAccess, SimpleBus};
use crate::nes::snapshot::{Snapshot, Snapshotable};

const ORIGIN: u16 = 0x8000;

fn init_cpu(program: &[u8]) -> (CPU, SimpleBus) {
    let mut bus = SimpleBus::new(program, ORIGIN);
    let cpu = bus.boot();
    (cpu, bus)
}

fn cycles_for(program: &[u8], setup: impl Fn(&mut CPU, &mut SimpleBus)) -> u64 {
    let (mut cpu, mut bus) = init_cpu(program);
    setup(&mut cpu, &mut bus);
    bus.step_instruction(&mut cpu).unwrap()
}

#[test]
fn test_power_on_reset_sequence() {
    let (cpu, _) = init_cpu(&[0x02]);
    assert_eq!(cpu.cycles, 7);
    assert_eq!(cpu.program_counter, ORIGIN);
    assert_eq!(cpu.stack_pointer, 0xFD);
    assert!(cpu.status.contains(Flags::INTERRUPT_DISABLE));
    assert!(cpu.at_instruction_boundary());
}

#[test]
fn test_soft_reset_keeps_registers_and_drops_stack_pointer() {
    let (mut cpu, mut bus) = init_cpu(&[0xA9, 0x42, 0x02]);
    bus.run_until_jam(&mut cpu);
    assert!(cpu.is_jammed());

    cpu.reset(true);
    assert!(!cpu.is_jammed());
    assert_eq!(bus.step_instruction(&mut cpu), Ok(7));
    assert_eq!(cpu.register_a, 0x42);
    assert_eq!(cpu.stack_pointer, 0xFA);
    assert_eq!(cpu.program_counter, ORIGIN);
    // reset never writes to the stack
    assert!(bus.accesses.iter().all(|a| matches!(a, BusAccess::Read(_))));
}

#[test]
fn test_0xaa_tax_0xa8_tay() {
    let program = &[
        0xA9, // LDA immediate
        0x42, //    with $42
        0xAA, // TAX
        0xA8, // TAY
        0x02, // JAM
    ];
    let (mut cpu, mut bus) = init_cpu(program);
    assert_eq!(bus.run_until_jam(&mut cpu), 6);
    assert_eq!(cpu.register_x, 0x42);
    assert_eq!(cpu.register_y, 0x42);
    assert!(!cpu.status.contains(Flags::ZERO));
    assert!(!cpu.status.contains(Flags::NEGATIVE));
}

#[test]
fn test_0xa9_lda_zero_flag() {
    let (mut cpu, mut bus) = init_cpu(&[0xA9, 0x00, 0x02]);
    bus.run_until_jam(&mut cpu);
    assert!(cpu.status.contains(Flags::ZERO));
}

#[test]
fn test_0xb5_lda_zero_page_x_wraps() {
    let program = &[
        0xA2, 0x20, // LDX #$20
        0xB5, 0xF0, // LDA $F0,X -> $10
        0x02,
    ];
    let (mut cpu, mut bus) = init_cpu(program);
    bus.memory[0x0010] = 0x99;
    bus.run_until_jam(&mut cpu);
    assert_eq!(cpu.register_a, 0x99);
    assert!(cpu.status.contains(Flags::NEGATIVE));
}

#[test]
fn test_0xad_lda_absolute_load_data() {
    let program = &[
        0xAD, // LDA absolute (4 cycles)
        0xEF, //
        0xBE, // $BEEF
        0xAA, // TAX (2 cycles)
        0x02, // JAM
    ];
    let (mut cpu, mut bus) = init_cpu(program);
    bus.memory[0xBEEF] = 0x42;
    assert_eq!(bus.run_until_jam(&mut cpu), 4 + 2);
    assert_eq!(cpu.register_x, 0x42);
}

#[test]
fn test_instruction_cycle_counts() {
    let with_x = |x: u8| move |cpu: &mut CPU, _: &mut SimpleBus| cpu.register_x = x;
    let with_y_ptr = |y: u8| {
        move |cpu: &mut CPU, bus: &mut SimpleBus| {
            cpu.register_y = y;
            bus.memory[0x10] = 0xF0;
            bus.memory[0x11] = 0x10;
        }
    };

    assert_eq!(cycles_for(&[0xEA], |_, _| {}), 2); // NOP
    assert_eq!(cycles_for(&[0x0A], |_, _| {}), 2); // ASL A
    assert_eq!(cycles_for(&[0xA5, 0x10], |_, _| {}), 3); // LDA zp
    assert_eq!(cycles_for(&[0xBD, 0x00, 0x10], with_x(0x20)), 4); // LDA abs,X
    assert_eq!(cycles_for(&[0xBD, 0xF0, 0x10], with_x(0x20)), 5); // LDA abs,X (cross)
    assert_eq!(cycles_for(&[0x9D, 0x00, 0x10], with_x(0x20)), 5); // STA abs,X
    assert_eq!(cycles_for(&[0xFE, 0x00, 0x10], with_x(0x20)), 7); // INC abs,X
    assert_eq!(cycles_for(&[0xE6, 0x10], |_, _| {}), 5); // INC zp
    assert_eq!(cycles_for(&[0x16, 0x10], with_x(1)), 6); // ASL zp,X
    assert_eq!(cycles_for(&[0xA1, 0x10], with_x(0)), 6); // LDA (zp,X)
    assert_eq!(cycles_for(&[0xB1, 0x10], with_y_ptr(0x01)), 5); // LDA (zp),Y
    assert_eq!(cycles_for(&[0xB1, 0x10], with_y_ptr(0x20)), 6); // LDA (zp),Y (cross)
    assert_eq!(cycles_for(&[0x91, 0x10], with_y_ptr(0x01)), 6); // STA (zp),Y
    assert_eq!(cycles_for(&[0xD3, 0x10], with_y_ptr(0x01)), 8); // DCP (zp),Y
    assert_eq!(cycles_for(&[0x48], |_, _| {}), 3); // PHA
    assert_eq!(cycles_for(&[0x68], |_, _| {}), 4); // PLA
    assert_eq!(cycles_for(&[0x08], |_, _| {}), 3); // PHP
    assert_eq!(cycles_for(&[0x28], |_, _| {}), 4); // PLP
    assert_eq!(cycles_for(&[0x4C, 0x00, 0x90], |_, _| {}), 3); // JMP abs
    assert_eq!(cycles_for(&[0x6C, 0x00, 0x02], |_, _| {}), 5); // JMP (ind)
    assert_eq!(cycles_for(&[0x20, 0x00, 0x90], |_, _| {}), 6); // JSR
    assert_eq!(cycles_for(&[0x00, 0x00], |_, _| {}), 7); // BRK
    assert_eq!(cycles_for(&[0x1C, 0xF0, 0x10], with_x(0x20)), 5); // *NOP abs,X (cross)
}

#[test]
fn test_branch_timing() {
    // BNE taken without a page cross: Z is clear after reset
    let (mut cpu, mut bus) = init_cpu(&[0xD0, 0x02]);
    assert_eq!(bus.step_instruction(&mut cpu), Ok(3));
    assert_eq!(cpu.program_counter, 0x8004);

    // BEQ not taken
    let (mut cpu, mut bus) = init_cpu(&[0xF0, 0x02]);
    assert_eq!(bus.step_instruction(&mut cpu), Ok(2));
    assert_eq!(cpu.program_counter, 0x8002);

    // backwards into the previous page
    let (mut cpu, mut bus) = init_cpu(&[0xD0, 0xFC]);
    assert_eq!(bus.step_instruction(&mut cpu), Ok(4));
    assert_eq!(cpu.program_counter, 0x7FFE);
}

#[test]
fn test_branch_page_cross_dummy_reads() {
    let mut bus = SimpleBus::new(&[0xD0, 0x20], 0x80F0);
    let mut cpu = bus.boot();
    assert_eq!(bus.step_instruction(&mut cpu), Ok(4));
    assert_eq!(cpu.program_counter, 0x8112);
    assert_eq!(
        bus.accesses,
        vec![
            BusAccess::Read(0x80F0),
            BusAccess::Read(0x80F1),
            BusAccess::Read(0x80F2),
            BusAccess::Read(0x8012),
        ]
    );
}

#[test]
fn test_indexed_read_dummy_read_on_page_cross() {
    let (mut cpu, mut bus) = init_cpu(&[0xBD, 0xF0, 0x10]);
    cpu.register_x = 0x20;
    bus.step_instruction(&mut cpu).unwrap();
    assert_eq!(
        bus.accesses,
        vec![
            BusAccess::Read(0x8000),
            BusAccess::Read(0x8001),
            BusAccess::Read(0x8002),
            BusAccess::Read(0x1010),
            BusAccess::Read(0x1110),
        ]
    );
}

#[test]
fn test_read_modify_write_writes_twice() {
    let (mut cpu, mut bus) = init_cpu(&[0xE6, 0x10]);
    bus.memory[0x10] = 0x41;
    bus.step_instruction(&mut cpu).unwrap();
    assert_eq!(
        bus.accesses,
        vec![
            BusAccess::Read(0x8000),
            BusAccess::Read(0x8001),
            BusAccess::Read(0x0010),
            BusAccess::Write(0x0010, 0x41),
            BusAccess::Write(0x0010, 0x42),
        ]
    );
}

#[test]
fn test_implied_instruction_reads_next_byte() {
    let (mut cpu, mut bus) = init_cpu(&[0xE8]);
    bus.step_instruction(&mut cpu).unwrap();
    assert_eq!(
        bus.accesses,
        vec![BusAccess::Read(0x8000), BusAccess::Read(0x8001)]
    );
}

#[test]
fn test_jsr_bus_order_and_rts() {
    let (mut cpu, mut bus) = init_cpu(&[0x20, 0x00, 0x90]);
    bus.memory[0x9000] = 0x60; // RTS
    bus.step_instruction(&mut cpu).unwrap();
    assert_eq!(cpu.program_counter, 0x9000);
    assert_eq!(
        bus.accesses,
        vec![
            BusAccess::Read(0x8000),
            BusAccess::Read(0x8001),
            BusAccess::Read(0x01FD),
            BusAccess::Write(0x01FD, 0x80),
            BusAccess::Write(0x01FC, 0x02),
            BusAccess::Read(0x8002),
        ]
    );

    assert_eq!(bus.step_instruction(&mut cpu), Ok(6));
    assert_eq!(cpu.program_counter, 0x8003);
    assert_eq!(cpu.stack_pointer, 0xFD);
}

#[test]
fn test_jmp_indirect_page_wrap_bug() {
    let (mut cpu, mut bus) = init_cpu(&[0x6C, 0xFF, 0x02]);
    bus.memory[0x02FF] = 0x00;
    bus.memory[0x0200] = 0x90;
    bus.memory[0x0300] = 0x40;
    bus.step_instruction(&mut cpu).unwrap();
    assert_eq!(cpu.program_counter, 0x9000);
}

#[test]
fn test_nmi_is_taken_after_current_instruction() {
    let (mut cpu, mut bus) = init_cpu(&[0xE8, 0xE8, 0xE8, 0x02]);
    bus.set_vector(0xFFFA, 0x9000);
    bus.memory[0x9000] = 0x02;
    bus.nmi = true;

    assert_eq!(bus.step_instruction(&mut cpu), Ok(2));
    assert_eq!(bus.step_instruction(&mut cpu), Ok(7));
    assert_eq!(cpu.program_counter, 0x9000);
    assert_eq!(cpu.register_x, 1);
    assert_eq!(bus.memory[0x01FD], 0x80);
    assert_eq!(bus.memory[0x01FC], 0x01);
    // pushed P has B clear and bit 5 set
    assert_eq!(bus.memory[0x01FB] & 0x30, 0x20);
    assert_eq!(cpu.stack_pointer, 0xFA);

    // a held line does not retrigger
    assert!(matches!(bus.step_instruction(&mut cpu), Err(CpuError::Jam { .. })));
}

#[test]
fn test_irq_masked_while_interrupt_disable_is_set() {
    let (mut cpu, mut bus) = init_cpu(&[0xE8, 0xE8, 0x02]);
    bus.irq = true;
    bus.run_until_jam(&mut cpu);
    assert_eq!(cpu.register_x, 2);
}

#[test]
fn test_cli_delays_irq_by_one_instruction() {
    let (mut cpu, mut bus) = init_cpu(&[0x58, 0xE8, 0xE8, 0x02]);
    bus.set_vector(0xFFFE, 0x9000);
    bus.memory[0x9000] = 0x02;
    bus.irq = true;

    assert_eq!(bus.step_instruction(&mut cpu), Ok(2)); // CLI
    assert_eq!(bus.step_instruction(&mut cpu), Ok(2)); // INX
    assert_eq!(bus.step_instruction(&mut cpu), Ok(7)); // IRQ
    assert_eq!(cpu.register_x, 1);
    assert_eq!(cpu.program_counter, 0x9000);
    assert!(cpu.status.contains(Flags::INTERRUPT_DISABLE));
    assert_eq!(bus.memory[0x01FB] & 0x30, 0x20);
}

#[test]
fn test_brk_and_rti() {
    let (mut cpu, mut bus) = init_cpu(&[0x00, 0xFF, 0xE8, 0x02]);
    bus.set_vector(0xFFFE, 0x9000);
    bus.memory[0x9000] = 0x40; // RTI

    assert_eq!(bus.step_instruction(&mut cpu), Ok(7));
    assert_eq!(cpu.program_counter, 0x9000);
    assert_eq!(bus.memory[0x01FD], 0x80);
    assert_eq!(bus.memory[0x01FC], 0x02);
    assert_eq!(bus.memory[0x01FB] & 0x30, 0x30);

    assert_eq!(bus.step_instruction(&mut cpu), Ok(6));
    assert_eq!(cpu.program_counter, 0x8002);
    bus.run_until_jam(&mut cpu);
    assert_eq!(cpu.register_x, 1);
}

#[test]
fn test_nmi_hijacks_brk() {
    let (mut cpu, mut bus) = init_cpu(&[0x00, 0x00]);
    bus.set_vector(0xFFFE, 0x9000);
    bus.set_vector(0xFFFA, 0xA000);

    cpu.tick(&mut bus).unwrap(); // opcode
    cpu.tick(&mut bus).unwrap(); // padding
    bus.nmi = true;
    while !cpu.tick(&mut bus).unwrap() {}

    assert_eq!(cpu.program_counter, 0xA000);
    // still looks like a BRK on the stack
    assert_eq!(bus.memory[0x01FB] & 0x30, 0x30);
}

#[test]
fn test_jam_halts_until_reset() {
    let (mut cpu, mut bus) = init_cpu(&[0x02]);
    let expected = CpuError::Jam {
        opcode: 0x02,
        addr: ORIGIN,
    };
    assert_eq!(bus.step_instruction(&mut cpu), Err(expected));
    assert_eq!(cpu.tick(&mut bus), Err(expected));
    assert_eq!(cpu.program_counter, ORIGIN);

    cpu.reset(true);
    assert_eq!(cpu.tick(&mut bus), Ok(false));
}

#[test]
fn test_adc_signed_overflow() {
    let (mut cpu, mut bus) = init_cpu(&[0xA9, 0x50, 0x69, 0x50, 0x02]);
    bus.run_until_jam(&mut cpu);
    assert_eq!(cpu.register_a, 0xA0);
    assert!(cpu.status.contains(Flags::OVERFLOW));
    assert!(cpu.status.contains(Flags::NEGATIVE));
    assert!(!cpu.status.contains(Flags::CARRY));
}

#[test]
fn test_sbc_with_borrow() {
    let (mut cpu, mut bus) = init_cpu(&[0x38, 0xA9, 0x50, 0xE9, 0xF0, 0x02]);
    bus.run_until_jam(&mut cpu);
    assert_eq!(cpu.register_a, 0x60);
    assert!(!cpu.status.contains(Flags::CARRY));
    assert!(!cpu.status.contains(Flags::OVERFLOW));
}

#[test]
fn test_unofficial_lax_and_sax() {
    let program = &[
        0xA7, 0x10, // LAX $10
        0xA9, 0x0F, // LDA #$0F
        0x87, 0x11, // SAX $11
        0x02,
    ];
    let (mut cpu, mut bus) = init_cpu(program);
    bus.memory[0x10] = 0x3C;
    bus.run_until_jam(&mut cpu);
    assert_eq!(cpu.register_x, 0x3C);
    assert_eq!(bus.memory[0x11], 0x0C);
}

#[test]
fn test_shx_page_cross_corrupts_high_byte() {
    let (mut cpu, mut bus) = init_cpu(&[0x9E, 0xF0, 0x10]);
    cpu.register_x = 0x0F;
    cpu.register_y = 0x20;
    assert_eq!(bus.step_instruction(&mut cpu), Ok(5));
    // X & ($10 + 1) = $01 becomes the high byte
    assert_eq!(bus.memory[0x0110], 0x01);
    assert_eq!(bus.memory[0x1110], 0x00);

    let (mut cpu, mut bus) = init_cpu(&[0x9E, 0x00, 0x10]);
    cpu.register_x = 0xFF;
    cpu.register_y = 0x20;
    bus.step_instruction(&mut cpu).unwrap();
    assert_eq!(bus.memory[0x1020], 0x11);
}

#[test]
fn test_xaa_and_lxa_magic_constants() {
    let (mut cpu, mut bus) = init_cpu(&[0xA2, 0xFF, 0x8B, 0xFF, 0x02]);
    bus.run_until_jam(&mut cpu);
    assert_eq!(cpu.register_a, 0xEE);

    let (mut cpu, mut bus) = init_cpu(&[0xAB, 0x5A, 0x02]);
    bus.run_until_jam(&mut cpu);
    assert_eq!(cpu.register_a, 0x5A);
    assert_eq!(cpu.register_x, 0x5A);
}

#[test]
fn test_snapshot_mid_instruction_resumes_identically() {
    let program = &[
        0xAD, 0xEF, 0xBE, // LDA $BEEF
        0x8D, 0x00, 0x02, // STA $0200
        0x02,
    ];
    let (mut cpu, mut bus) = init_cpu(program);
    bus.memory[0xBEEF] = 0x77;
    cpu.tick(&mut bus).unwrap();
    cpu.tick(&mut bus).unwrap();
    assert!(!cpu.at_instruction_boundary());

    let bytes = cpu.snapshot().to_bytes();
    let mut restored = CPU::new();
    restored.restore(&Snapshot::from_bytes(&bytes));

    let mut other_bus = SimpleBus::new(program, ORIGIN);
    other_bus.memory[0xBEEF] = 0x77;
    let a = bus.run_until_jam(&mut cpu);
    let b = other_bus.run_until_jam(&mut restored);
    assert_eq!(a, b);
    assert_eq!(restored.register_a, 0x77);
    assert_eq!(restored.cycles, cpu.cycles);
    assert_eq!(other_bus.memory[0x0200], 0x77);
}
