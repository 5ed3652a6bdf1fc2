use super::FrameClock;
use super::units::envelope::Envelope;
use super::units::length_counter::LengthCounter;
use super::units::sequence_timer::SequenceTimer;
use crate::nes::region::Region;
use crate::nes::snapshot::{Snapshot, Snapshotable};

// Periods in CPU cycles
const NOISE_PERIODS_NTSC: [u16; 16] = [
    4, 8, 16, 32, 64, 96, 128, 160, 202, 254, 380, 508, 762, 1016, 2034, 4068,
];
const NOISE_PERIODS_PAL: [u16; 16] = [
    4, 8, 14, 30, 60, 88, 118, 148, 188, 236, 354, 472, 708, 944, 1890, 3778,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseMode {
    Long,
    Short,
}

pub struct NoiseChannel {
    seq_timer: SequenceTimer,
    pub(super) length_counter: LengthCounter,
    envelope: Envelope,
    mode: NoiseMode,
    periods: &'static [u16; 16],

    shifter: u16,
}

impl NoiseChannel {
    pub fn new(region: Region) -> NoiseChannel {
        NoiseChannel {
            seq_timer: SequenceTimer::new(),
            length_counter: LengthCounter::new(),
            envelope: Envelope::new(),
            mode: NoiseMode::Long,
            periods: Self::period_table(region),

            shifter: 1,
        }
    }

    fn period_table(region: Region) -> &'static [u16; 16] {
        match region {
            Region::Pal => &NOISE_PERIODS_PAL,
            Region::Ntsc | Region::Dendy => &NOISE_PERIODS_NTSC,
        }
    }

    pub fn set_region(&mut self, region: Region) {
        self.periods = Self::period_table(region);
    }

    pub fn write_400c(&mut self, value: u8) {
        let length_counter_halt = value & 0b0010_0000 != 0;
        self.envelope.set(value);
        self.length_counter.set_halt(length_counter_halt);
    }

    /*
       0x400E: M--- PPPP
           M: Mode (1 = 93-step sequence)
           P: Period index
    */
    pub fn write_400e(&mut self, value: u8) {
        self.mode = if value & 0b1000_0000 == 0 {
            NoiseMode::Long
        } else {
            NoiseMode::Short
        };

        let period = self.periods[(value & 0b0000_1111) as usize];
        self.seq_timer.set_reload(period - 1);
    }

    pub fn write_400f(&mut self, value: u8) {
        self.length_counter.load_index(value >> 3);
        self.envelope.set_start_flag(true);
    }
}

impl NoiseChannel {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.length_counter.set_enabled(enabled);
    }

    pub fn length_active(&self) -> bool {
        self.length_counter.output() > 0
    }

    fn shift_noise(&mut self) {
        // Linear feedback shifter: bit 0 XOR bit 1 (long) or bit 6 (short)
        let tap = match self.mode {
            NoiseMode::Long => 1,
            NoiseMode::Short => 6,
        };
        let feedback = (self.shifter ^ (self.shifter >> tap)) & 0b1;
        self.shifter = (feedback << 14) | (self.shifter >> 1);
    }

    /// Clocked every CPU cycle
    pub fn clock(&mut self, frame_clock: &FrameClock) {
        if self.seq_timer.clock() {
            self.shift_noise();
        }

        if frame_clock.is_quarter() {
            self.envelope.clock();
        }

        if frame_clock.is_half() {
            self.length_counter.clock();
        }
    }

    pub fn sample(&self) -> u8 {
        if !self.length_active() || (self.shifter & 0b1) != 0 {
            0
        } else {
            self.envelope.output()
        }
    }
}

impl Snapshotable for NoiseChannel {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("timer", &self.seq_timer);
        s.write_snapshot("lengthCounter", &self.length_counter);
        s.write_snapshot("envelope", &self.envelope);
        s.write("modeFlag", self.mode == NoiseMode::Short);
        s.write("shiftRegister", self.shifter);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("timer", &mut self.seq_timer);
        s.restore_nested("lengthCounter", &mut self.length_counter);
        s.restore_nested("envelope", &mut self.envelope);
        self.mode = if s.read("modeFlag") {
            NoiseMode::Short
        } else {
            NoiseMode::Long
        };
        // An all-zero register would lock the generator
        self.shifter = s.read_or::<u16>("shiftRegister", 1) & 0x7FFF;
        if self.shifter == 0 {
            self.shifter = 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sequence_length(mode_bit: u8) -> usize {
        let mut n = NoiseChannel::new(Region::Ntsc);
        n.write_400e(mode_bit);
        // step the register until the start state comes back
        let start = n.shifter;
        for i in 1..=40_000 {
            n.shift_noise();
            if n.shifter == start {
                return i;
            }
        }
        panic!("sequence never repeated");
    }

    #[test]
    fn long_mode_repeats_after_32767_steps() {
        assert_eq!(sequence_length(0x00), 32767);
    }

    #[test]
    fn short_mode_repeats_after_31_or_93_steps() {
        let len = sequence_length(0x80);
        assert!(len == 31 || len == 93, "got {len}");
    }

    #[test]
    fn period_table_follows_region() {
        let mut n = NoiseChannel::new(Region::Ntsc);
        n.write_400e(0x0F);
        assert_eq!(n.seq_timer.get_reload(), 4067);

        n.set_region(Region::Pal);
        n.write_400e(0x0F);
        assert_eq!(n.seq_timer.get_reload(), 3777);
    }

    #[test]
    fn set_bit_zero_mutes() {
        let mut n = NoiseChannel::new(Region::Ntsc);
        n.set_enabled(true);
        n.write_400c(0b0001_1111);
        n.write_400f(0x08);
        n.length_counter.commit();
        assert_eq!(n.shifter & 1, 1);
        assert_eq!(n.sample(), 0);

        n.shifter = 0b10;
        assert_eq!(n.sample(), 15);
    }
}
