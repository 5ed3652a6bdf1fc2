use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use super::*;
use crate::nes::config::RamPowerOnState;

/// LDA $0301 / CLC / ADC #1 / STA $0301 / JMP *
const COUNT_RESETS: &[u8] = &[
    0xAD, 0x01, 0x03, 0x18, 0x69, 0x01, 0x8D, 0x01, 0x03, 0x4C, 0x09, 0x80,
];

/// NROM image with `program` at $8000 and every vector pointing at it.
fn program_rom(program: &[u8], flags6: u8) -> Vec<u8> {
    let mut raw = vec![0x4E, 0x45, 0x53, 0x1A, 1, 1, flags6, 0, 0, 0, 0, 0, 0, 0, 0, 0];
    let mut prg = vec![0xEA; 0x4000];
    prg[..program.len()].copy_from_slice(program);
    for vector in [0x3FFA, 0x3FFC, 0x3FFE] {
        prg[vector] = 0x00;
        prg[vector + 1] = 0x80;
    }
    raw.extend_from_slice(&prg);
    raw.extend(std::iter::repeat_n(0u8, 0x2000));
    raw
}

fn console_with(program: &[u8]) -> Console {
    let mut console = Console::default();
    console.load(&program_rom(program, 0), None).unwrap();
    console
}

#[derive(Clone, Default)]
struct SharedStore(Rc<RefCell<HashMap<String, Vec<u8>>>>);

impl BatteryStore for SharedStore {
    fn load(&mut self, key: &str) -> Option<Vec<u8>> {
        self.0.borrow().get(key).cloned()
    }

    fn save(&mut self, key: &str, data: &[u8]) {
        self.0.borrow_mut().insert(key.to_string(), data.to_vec());
    }
}

#[test]
fn test_nothing_runs_without_a_cartridge() {
    let mut console = Console::default();
    assert_eq!(console.step_cycle(), Err(ConsoleError::NoCartridge));
    assert_eq!(
        console.save_state(),
        Err(ConsoleError::State(StateError::NoCartridge))
    );
    assert!(console.frame_buffer().is_none());
}

#[test]
fn test_failed_load_keeps_previous_cartridge() {
    let mut console = console_with(COUNT_RESETS);
    let err = console.load(b"not a rom", None).unwrap_err();
    assert!(matches!(err, ConsoleError::Rom(_)));
    assert!(console.is_loaded());
}

#[test]
fn test_reset_sequence_then_first_instruction() {
    let mut console = console_with(COUNT_RESETS);
    assert_eq!(console.step_instruction().unwrap(), 7);
    assert_eq!(console.cpu().program_counter, 0x8000);
    assert_eq!(console.cpu().stack_pointer, 0xFD);
    assert_eq!(console.step_instruction().unwrap(), 4);
}

#[test]
fn test_soft_reset_preserves_ram() {
    let mut console = console_with(COUNT_RESETS);
    console.step_frame().unwrap();
    assert_eq!(console.peek(0x0301), Some(1));

    console.reset(true).unwrap();
    console.step_frame().unwrap();
    assert_eq!(console.peek(0x0301), Some(2));

    console.reset(false).unwrap();
    console.step_frame().unwrap();
    assert_eq!(console.peek(0x0301), Some(1));
}

#[test]
fn test_hard_reset_uses_power_on_policy() {
    let config = ConsoleConfig::default().with_ram_power_on(RamPowerOnState::AllOnes);
    let mut console = Console::new(config);
    console.load(&program_rom(COUNT_RESETS, 0), None).unwrap();
    console.step_frame().unwrap();
    // $FF + 1
    assert_eq!(console.peek(0x0301), Some(0x00));
    assert_eq!(console.peek(0x0302), Some(0xFF));
}

#[test]
fn test_jam_surfaces_as_cpu_error() {
    let mut console = console_with(&[0x02]);
    let err = console.step_frame().unwrap_err();
    assert_eq!(
        err,
        ConsoleError::Cpu(CpuError::Jam {
            opcode: 0x02,
            addr: 0x8000
        })
    );
    assert!(console.step_cycle().is_err());
}

#[test]
fn test_sinks_receive_each_frame() {
    let mut console = console_with(COUNT_RESETS);
    let frames = Rc::new(Cell::new(0));
    let samples = Rc::new(Cell::new(0));

    let seen = frames.clone();
    console.set_video_sink(move |pixels: &[u32], width: usize, height: usize| {
        assert_eq!(pixels.len(), width * height);
        assert_eq!((width, height), (256, 240));
        seen.set(seen.get() + 1);
    });
    let heard = samples.clone();
    console.set_audio_sink(move |pcm: &[i16], count: usize, rate: u32, stereo: bool| {
        assert_eq!(pcm.len(), count);
        assert_eq!(rate, 44_100);
        assert!(!stereo);
        heard.set(heard.get() + count);
    });

    console.step_frame().unwrap();
    console.step_frame().unwrap();
    assert_eq!(frames.get(), 2);
    assert_eq!(console.frame_count(), 2);
    assert!(samples.get() > 1000, "{} samples", samples.get());
}

#[test]
fn test_input_polled_at_frame_end() {
    let mut console = console_with(COUNT_RESETS);
    console.set_input_provider(|port: usize| {
        if port == 0 {
            JoypadButtons::START
        } else {
            JoypadButtons::empty()
        }
    });
    console.step_frame().unwrap();
    let bus = console.bus().unwrap();
    assert_eq!(bus.joypads[0].buttons(), JoypadButtons::START);
    assert_eq!(bus.joypads[1].buttons(), JoypadButtons::empty());
}

#[test]
fn test_pause_is_honored_by_run_frame() {
    let mut console = console_with(COUNT_RESETS);
    console.pause();
    assert_eq!(console.run_frame(), Ok(false));
    assert_eq!(console.frame_count(), 0);

    // Debug stepping still works while paused
    console.step_frame().unwrap();
    assert_eq!(console.frame_count(), 1);

    console.resume();
    assert_eq!(console.run_frame(), Ok(true));
    assert_eq!(console.frame_count(), 2);
}

#[test]
fn test_dot_and_scanline_stepping() {
    let mut console = console_with(COUNT_RESETS);
    console.step_dot().unwrap();
    let ppu = &console.bus().unwrap().ppu;
    assert_eq!(ppu.ppu_cycles, 1);
    assert_eq!(console.cpu().cycles, 0);

    console.step_dot().unwrap();
    console.step_dot().unwrap();
    assert_eq!(console.cpu().cycles, 1);

    let line = console.bus().unwrap().ppu.scanline;
    console.step_scanline().unwrap();
    assert_eq!(console.bus().unwrap().ppu.scanline, line + 1);
}

#[test]
fn test_save_state_resumes_identically() {
    let mut console = console_with(COUNT_RESETS);
    for _ in 0..3 {
        console.step_frame().unwrap();
    }
    let state = console.save_state().unwrap();
    assert_eq!(&state[..4], b"NESS");

    for _ in 0..2 {
        console.step_frame().unwrap();
    }
    let cycles = console.cpu().cycles;
    let ram = console.bus().unwrap().cpu_ram;

    console.load_state(&state).unwrap();
    assert_eq!(console.frame_count(), 3);
    for _ in 0..2 {
        console.step_frame().unwrap();
    }
    assert_eq!(console.cpu().cycles, cycles);
    assert_eq!(console.bus().unwrap().cpu_ram, ram);
}

#[test]
fn test_bad_states_restore_nothing() {
    let mut console = console_with(COUNT_RESETS);
    console.step_frame().unwrap();
    let mut state = console.save_state().unwrap();
    let cycles = console.cpu().cycles;

    assert_eq!(
        console.load_state(b"garbage"),
        Err(ConsoleError::State(StateError::BadMagic))
    );

    state[4] = 9;
    assert_eq!(
        console.load_state(&state),
        Err(ConsoleError::State(StateError::UnsupportedVersion(9)))
    );
    state[4] = 1;

    let mut other = console_with(&[0xEA, 0x4C, 0x00, 0x80]);
    assert!(matches!(
        other.load_state(&state),
        Err(ConsoleError::State(StateError::RomMismatch { .. }))
    ));
    assert_eq!(console.cpu().cycles, cycles);
}

#[test]
fn test_truncated_state_body_restores_nothing() {
    let mut console = console_with(COUNT_RESETS);
    for _ in 0..3 {
        console.step_frame().unwrap();
    }
    let mut state = console.save_state().unwrap();
    state.pop();
    let pc = console.cpu().program_counter;
    let frames = console.frame_count();

    assert_eq!(
        console.load_state(&state),
        Err(ConsoleError::State(StateError::Corrupt))
    );
    assert_eq!(
        console.load_state(&state[..STATE_HEADER_LEN]),
        Err(ConsoleError::State(StateError::Corrupt))
    );
    assert_eq!(console.peek(0x0301), Some(1));
    assert_eq!(console.cpu().program_counter, pc);
    assert_eq!(console.frame_count(), frames);
}

#[test]
fn test_battery_ram_survives_unload() {
    // LDA #$5A / STA $6000 / JMP *
    let program = [0xA9, 0x5A, 0x8D, 0x00, 0x60, 0x4C, 0x05, 0x80];
    let rom = program_rom(&program, 0b0010);
    let store = SharedStore::default();

    let mut console = Console::default();
    console.set_battery_store(store.clone());
    console.load(&rom, None).unwrap();
    console.step_frame().unwrap();
    let key = console.cartridge().unwrap().sha1().to_string();
    console.unload();

    let saved = store.0.borrow().get(&key).cloned().unwrap();
    assert_eq!(saved.len(), 0x2000);
    assert_eq!(saved[0], 0x5A);

    let mut next = Console::default();
    next.set_battery_store(store.clone());
    next.load(&rom, None).unwrap();
    assert_eq!(next.peek(0x6000), Some(0x5A));
}
