use super::FrameClock;
use super::units::length_counter::LengthCounter;
use super::units::sequence_timer::SequenceTimer;
use crate::nes::snapshot::{Snapshot, Snapshotable};

const TRIANGLE_TABLE: [u8; 32] = [
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12,
    13, 14, 15,
];

pub struct TriangleChannel {
    sequence_timer: SequenceTimer,
    pub(super) length_counter: LengthCounter,

    linear_counter_reload_flag: bool,
    sequence_index: u8,
    output: u8,

    // $4008
    linear_counter_control_flag: bool, // C (1 bit)
    linear_counter_reload_value: u8,   // RRRR RRR (7 bits)
    linear_counter_value: u8,

    /// Freeze the output instead of stepping at ultrasonic rates
    silence_ultrasonic: bool,
}

impl TriangleChannel {
    pub fn new() -> TriangleChannel {
        TriangleChannel {
            sequence_timer: SequenceTimer::new(),
            length_counter: LengthCounter::new(),

            linear_counter_reload_flag: false,
            sequence_index: 0,
            output: TRIANGLE_TABLE[0],

            linear_counter_control_flag: false,
            linear_counter_reload_value: 0,
            linear_counter_value: 0,

            silence_ultrasonic: false,
        }
    }

    pub fn write_4008(&mut self, value: u8) {
        self.linear_counter_control_flag = (value & 0b1000_0000) != 0;
        self.linear_counter_reload_value = value & 0b0111_1111;

        // bit 7 doubles as the length counter halt for triangle
        self.length_counter
            .set_halt(self.linear_counter_control_flag);
    }

    pub fn write_400a(&mut self, value: u8) {
        self.sequence_timer.set_reload_low(value);
    }

    pub fn write_400b(&mut self, value: u8) {
        self.length_counter.load_index(value >> 3);
        self.sequence_timer.set_reload_high(value & 0b0000_0111);
        self.linear_counter_reload_flag = true;
    }
}

impl TriangleChannel {
    pub fn set_enabled(&mut self, enabled: bool) {
        self.length_counter.set_enabled(enabled);
    }

    pub fn set_silence_ultrasonic(&mut self, silence: bool) {
        self.silence_ultrasonic = silence;
    }

    pub fn silence_ultrasonic(&self) -> bool {
        self.silence_ultrasonic
    }

    pub fn length_active(&self) -> bool {
        self.length_counter.output() > 0
    }

    /// Clocked every CPU cycle; the triangle timer runs at CPU rate.
    pub fn clock(&mut self, frame_clock: &FrameClock) {
        if self.sequence_timer.clock()
            && self.linear_counter_value > 0
            && self.length_counter.output() > 0
        {
            self.sequence_index = (self.sequence_index + 1) & 0x1F;
            if self.sequence_timer.get_reload() >= 2 || !self.silence_ultrasonic {
                self.output = TRIANGLE_TABLE[self.sequence_index as usize];
            }
        }

        if frame_clock.is_quarter() {
            if self.linear_counter_reload_flag {
                self.linear_counter_value = self.linear_counter_reload_value;
            } else if self.linear_counter_value > 0 {
                self.linear_counter_value -= 1;
            }

            // If control flag is clear, the reload flag is cleared on quarter frame clock
            if !self.linear_counter_control_flag {
                self.linear_counter_reload_flag = false;
            }
        }

        if frame_clock.is_half() {
            self.length_counter.clock();
        }
    }

    /// A halted triangle keeps driving its last step into the mixer.
    pub fn sample(&self) -> u8 {
        self.output
    }
}

impl Snapshotable for TriangleChannel {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("timer", &self.sequence_timer);
        s.write_snapshot("lengthCounter", &self.length_counter);
        s.write("linearReload", self.linear_counter_reload_flag);
        s.write("linearControl", self.linear_counter_control_flag);
        s.write("linearReloadValue", self.linear_counter_reload_value);
        s.write("linearCounter", self.linear_counter_value);
        s.write("sequencePosition", self.sequence_index);
        s.write("output", self.output);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("timer", &mut self.sequence_timer);
        s.restore_nested("lengthCounter", &mut self.length_counter);
        self.linear_counter_reload_flag = s.read("linearReload");
        self.linear_counter_control_flag = s.read("linearControl");
        self.linear_counter_reload_value = s.read::<u8>("linearReloadValue") & 0x7F;
        self.linear_counter_value = s.read::<u8>("linearCounter") & 0x7F;
        self.sequence_index = s.read::<u8>("sequencePosition") & 0x1F;
        self.output = s.read_or("output", TRIANGLE_TABLE[self.sequence_index as usize]) & 0x0F;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing_triangle(period: u16) -> TriangleChannel {
        let mut t = TriangleChannel::new();
        t.set_enabled(true);
        t.write_4008(0x7F);
        t.write_400a(period as u8);
        t.write_400b(0b0000_1000 | (period >> 8) as u8);
        t.length_counter.commit();
        t.clock(&FrameClock::Quarter); // loads the linear counter
        t
    }

    #[test]
    fn steps_through_the_sequence() {
        let mut t = playing_triangle(0);
        let start = t.sequence_index;
        t.clock(&FrameClock::None);
        assert_ne!(t.sequence_index, start);
    }

    #[test]
    fn linear_counter_gates_the_sequencer() {
        let mut t = TriangleChannel::new();
        t.set_enabled(true);
        t.write_400a(4);
        t.write_400b(0b0000_1000);
        t.length_counter.commit();
        for _ in 0..20 {
            t.clock(&FrameClock::None);
        }
        assert_eq!(t.sequence_index, 0);
    }

    #[test]
    fn control_flag_keeps_reload_flag_set() {
        let mut t = playing_triangle(100);
        assert_eq!(t.linear_counter_value, 0x7F);
        assert!(!t.linear_counter_reload_flag);

        t.write_4008(0x85);
        t.write_400b(0b0000_1000);
        t.clock(&FrameClock::Quarter);
        t.clock(&FrameClock::Quarter);
        assert_eq!(t.linear_counter_value, 0x05);
        assert!(t.linear_counter_reload_flag);

        t.write_4008(0x05);
        t.clock(&FrameClock::Quarter);
        assert!(!t.linear_counter_reload_flag);
        t.clock(&FrameClock::Quarter);
        assert_eq!(t.linear_counter_value, 0x04);
    }

    #[test]
    fn ultrasonic_periods_freeze_output_when_silenced() {
        let mut t = playing_triangle(1);
        t.set_silence_ultrasonic(true);
        let frozen = t.sample();
        for _ in 0..16 {
            t.clock(&FrameClock::None);
        }
        assert_eq!(t.sample(), frozen);
        assert_ne!(t.sequence_index, 0);

        let mut t = playing_triangle(1);
        for _ in 0..4 {
            t.clock(&FrameClock::None);
        }
        assert_ne!(t.sample(), frozen);
    }
}
