use super::*;

fn run(apu: &mut APU, cycles: usize) {
    for _ in 0..cycles {
        apu.clock();
    }
}

/// Pulse 1 at a constant volume of 15 with a long length counter
fn start_pulse1(apu: &mut APU) {
    apu.write(0x4015, 0x01);
    apu.write(0x4000, 0b1001_1111);
    apu.write(0x4002, 0xFD);
    apu.write(0x4003, 0x08);
    apu.clock();
}

#[test]
fn test_frame_irq_in_four_step_mode() {
    let mut apu = APU::default();
    run(&mut apu, 29_800);
    assert!(!apu.irq_line());
    run(&mut apu, 100);
    assert!(apu.irq_line());
    assert_ne!(apu.peek_status() & 0x40, 0);
}

#[test]
fn test_status_read_acknowledges_frame_irq() {
    let mut apu = APU::default();
    run(&mut apu, 29_900);
    assert_ne!(apu.read_status() & 0x40, 0);
    assert_eq!(apu.read_status() & 0x40, 0);
    assert!(!apu.irq_line());
}

#[test]
fn test_status_read_on_rising_cycle_does_not_clear() {
    let mut apu = APU::default();
    while !apu.irq_line() {
        apu.clock();
    }
    assert_ne!(apu.read_status() & 0x40, 0);
    assert!(apu.irq_line());
}

#[test]
fn test_irq_inhibit_and_five_step_mode() {
    let mut apu = APU::default();
    apu.write(0x4017, 0x40);
    run(&mut apu, 40_000);
    assert!(!apu.irq_line());

    let mut apu = APU::default();
    apu.write(0x4017, 0x80);
    run(&mut apu, 40_000);
    assert!(!apu.irq_line());
}

#[test]
fn test_inhibit_clears_pending_frame_irq() {
    let mut apu = APU::default();
    run(&mut apu, 29_900);
    assert!(apu.irq_line());
    apu.write(0x4017, 0x40);
    assert!(!apu.irq_line());
}

#[test]
fn test_pal_frame_irq_comes_later() {
    let mut apu = APU::new(Region::Pal, 44_100);
    run(&mut apu, 33_200);
    assert!(!apu.irq_line());
    run(&mut apu, 100);
    assert!(apu.irq_line());
}

#[test]
fn test_five_step_write_clocks_length_immediately() {
    let mut apu = APU::default();
    start_pulse1(&mut apu);
    assert_eq!(apu.pulse1.length_counter.output(), 254);

    apu.write(0x4017, 0x80);
    run(&mut apu, 6);
    assert_eq!(apu.pulse1.length_counter.output(), 253);
}

#[test]
fn test_length_status_bits() {
    let mut apu = APU::default();
    start_pulse1(&mut apu);
    assert_eq!(apu.peek_status() & 0x1F, 0x01);

    apu.write(0x4015, 0x00);
    assert_eq!(apu.peek_status() & 0x1F, 0x00);
}

#[test]
fn test_dmc_dma_round_trip() {
    let mut apu = APU::default();
    apu.write(0x4010, 0x8F);
    apu.write(0x4012, 0x10);
    apu.write(0x4013, 0x00);
    apu.write(0x4015, 0x10);
    assert_ne!(apu.peek_status() & 0x10, 0);

    run(&mut apu, 3);
    assert_eq!(apu.dmc_dma_request(), Some(0xC400));

    apu.dmc_dma_complete(0xAA);
    assert_eq!(apu.dmc_dma_request(), None);
    assert!(apu.irq_line());
    assert_eq!(apu.peek_status() & 0x90, 0x80);

    // $4015 writes acknowledge the DMC interrupt
    apu.write(0x4015, 0x00);
    assert!(!apu.irq_line());
}

#[test]
fn test_frame_of_audio() {
    let mut apu = APU::default();
    start_pulse1(&mut apu);
    run(&mut apu, 29_780);
    apu.end_frame();

    let available = apu.samples_available();
    assert!((733..=737).contains(&available), "{available} samples");

    let mut out = vec![0i16; available];
    assert_eq!(apu.read_samples(&mut out, false), available);
    assert!(out.iter().any(|&s| s != 0));
    assert_eq!(apu.samples_available(), 0);
}

#[test]
fn test_stereo_read_duplicates_channels() {
    let mut apu = APU::default();
    start_pulse1(&mut apu);
    run(&mut apu, 10_000);
    apu.end_frame();

    let mut out = vec![0i16; 64];
    let frames = apu.read_samples(&mut out, true);
    assert_eq!(frames, 32);
    assert!(out.chunks(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn test_muted_channel_is_silent() {
    let mut apu = APU::default();
    apu.set_channel_muted(ApuChannel::Pulse1, true);
    start_pulse1(&mut apu);
    run(&mut apu, 10_000);
    apu.end_frame();

    let mut out = vec![0i16; apu.samples_available()];
    apu.read_samples(&mut out, false);
    assert!(out.iter().all(|&s| s == 0));
}

#[test]
fn test_mixer_tables() {
    assert_eq!(PULSE_TABLE[0], 0.0);
    assert!((PULSE_TABLE[30] - 0.2575).abs() < 0.001);
    assert!((TND_TABLE[202] - 0.7425).abs() < 0.001);
}

#[test]
fn test_soft_reset_silences_channels() {
    let mut apu = APU::default();
    start_pulse1(&mut apu);
    apu.write(0x4017, 0x80);
    apu.reset(true);
    assert_eq!(apu.peek_status() & 0x1F, 0);
    assert_eq!(apu.master_sequence_mode, SequenceMode::Mode1);

    apu.reset(false);
    assert_eq!(apu.master_sequence_mode, SequenceMode::Mode0);
}

#[test]
fn test_snapshot_resume() {
    let mut apu = APU::default();
    start_pulse1(&mut apu);
    apu.write(0x400C, 0x1F);
    apu.write(0x400E, 0x03);
    apu.write(0x4015, 0x09);
    apu.write(0x400F, 0x08);
    run(&mut apu, 12_345);

    let mut restored = APU::default();
    restored.restore(&apu.snapshot());
    assert_eq!(restored.snapshot(), apu.snapshot());

    run(&mut apu, 20_000);
    run(&mut restored, 20_000);
    assert_eq!(restored.snapshot(), apu.snapshot());
    assert_eq!(restored.peek_status(), apu.peek_status());
}
