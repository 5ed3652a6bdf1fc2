use super::FrameClock;
use super::units::envelope::Envelope;
use super::units::length_counter::LengthCounter;
use super::units::sequence_timer::SequenceTimer;
use super::units::sweep::{PulseType, Sweep};
use crate::nes::snapshot::{Snapshot, Snapshotable};

#[rustfmt::skip]
const DUTY_SEQUENCES: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1],
    [0, 0, 0, 0, 0, 0, 1, 1],
    [0, 0, 0, 0, 1, 1, 1, 1],
    [1, 1, 1, 1, 1, 1, 0, 0],
];

pub struct PulseChannel {
    seq_timer: SequenceTimer,
    pub(super) length_counter: LengthCounter,
    envelope: Envelope,
    sweep: Sweep,

    duty_cycle: u8,
    sequence_step: u8,
}

impl PulseChannel {
    pub fn new(pulse_type: PulseType) -> PulseChannel {
        PulseChannel {
            seq_timer: SequenceTimer::new(),
            sweep: Sweep::new(pulse_type),
            envelope: Envelope::new(),
            duty_cycle: 0,
            sequence_step: 0,
            length_counter: LengthCounter::new(),
        }
    }

    /*
        0x4000 : Pulse1 Main register
            7654 3210
            DDLC VVVV
                DD: Duty cycle.
                L : Loop. If set, its counter will not decrease,
                resulting in a tone that plays continuously.
                C: Const volume. If 1, the sweep will not change its
                volume over time.
                VVVV: Volume (C=1) or Envelope(C=0)
    */
    pub fn write_4000(&mut self, value: u8) {
        self.duty_cycle = (value & 0b1100_0000) >> 6;

        let length_counter_halt = value & 0b0010_0000 != 0;
        self.length_counter.set_halt(length_counter_halt);

        self.envelope.set(value);
    }

    /*
       0x4001: Sweep controls
           7654 3210
           EPPP NSSS
               E: Enable
               P: Period
               N: Negate or flip
               S: Shift
    */
    pub fn write_4001(&mut self, value: u8) {
        self.sweep.set(value);
    }

    // 0x4002 : Timer lower bits
    pub fn write_4002(&mut self, value: u8) {
        self.seq_timer.set_reload_low(value);
    }

    /*
       0x4003 : Length & Timer upper bits
          LLLL LTTT
               L: Length
               T: Upper timer bits.
    */
    pub fn write_4003(&mut self, value: u8) {
        let length_counter_load = (value & 0b1111_1000) >> 3;
        self.length_counter.load_index(length_counter_load);

        self.seq_timer.set_reload_high(value & 0b111);

        // restart envelope and duty sequencer; the timer keeps running
        self.envelope.set_start_flag(true);
        self.sequence_step = 0;
    }
}

impl PulseChannel {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.length_counter.set_enabled(enabled);
    }

    pub fn length_active(&self) -> bool {
        self.length_counter.output() > 0
    }

    /// Clocked every CPU cycle; `timer_tick` is true on APU cycles (every
    /// other CPU cycle).
    pub fn clock(&mut self, frame_clock: &FrameClock, timer_tick: bool) {
        if timer_tick && self.seq_timer.clock() {
            self.sequence_step = (self.sequence_step + 7) & 0x07;
        }

        if frame_clock.is_quarter() {
            self.envelope.clock();
        }

        if frame_clock.is_half() {
            self.length_counter.clock();
            let mut seq_timer_reload = self.seq_timer.get_reload();
            self.sweep.clock(&mut seq_timer_reload);
            self.seq_timer.set_reload(seq_timer_reload);
        }
    }

    pub fn sample(&self) -> u8 {
        let seq_active = DUTY_SEQUENCES[self.duty_cycle as usize][self.sequence_step as usize] != 0;
        let reload = self.seq_timer.get_reload();

        if !seq_active || !self.length_active() || self.sweep.is_muting(reload) {
            0
        } else {
            self.envelope.output()
        }
    }
}

impl Snapshotable for PulseChannel {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("timer", &self.seq_timer);
        s.write_snapshot("lengthCounter", &self.length_counter);
        s.write_snapshot("envelope", &self.envelope);
        s.write_snapshot("sweep", &self.sweep);
        s.write("duty", self.duty_cycle);
        s.write("dutyPos", self.sequence_step);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("timer", &mut self.seq_timer);
        s.restore_nested("lengthCounter", &mut self.length_counter);
        s.restore_nested("envelope", &mut self.envelope);
        s.restore_nested("sweep", &mut self.sweep);
        self.duty_cycle = s.read::<u8>("duty") & 0b11;
        self.sequence_step = s.read::<u8>("dutyPos") & 0x07;
    }
}
