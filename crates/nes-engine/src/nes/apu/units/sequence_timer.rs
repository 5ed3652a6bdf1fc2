use crate::nes::snapshot::{Snapshot, Snapshotable};

/// Down-counting divider shared by every channel. One output clock is
/// produced every `reload + 1` input clocks.
#[derive(Debug, Clone, Default)]
pub struct SequenceTimer {
    timer_low: u8,
    timer_high: u8,
    reload_value: u16,
    value: u16,
}

impl SequenceTimer {
    pub fn new() -> SequenceTimer {
        SequenceTimer::default()
    }

    pub fn set_reload(&mut self, reload_value: u16) {
        self.reload_value = reload_value;
        self.timer_low = reload_value as u8;
        self.timer_high = ((reload_value >> 8) & 0b111) as u8;
    }

    pub fn set_reload_low(&mut self, lo: u8) {
        self.timer_low = lo;
        self.update_reload();
    }

    pub fn set_reload_high(&mut self, hi: u8) {
        self.timer_high = hi & 0b111;
        self.update_reload();
    }

    fn update_reload(&mut self) {
        self.reload_value = ((self.timer_high as u16) << 8 | self.timer_low as u16) & 0x7FF;
    }

    /// returns `true` if waveform generator needs clocking
    pub fn clock(&mut self) -> bool {
        if self.value == 0 {
            self.value = self.reload_value;
            true
        } else {
            self.value -= 1;
            false
        }
    }

    pub fn reset(&mut self) {
        self.value = self.reload_value;
    }

    pub fn get_reload(&self) -> u16 {
        self.reload_value
    }
}

#[cfg(test)]
impl SequenceTimer {
    pub fn output(&self) -> u16 {
        self.value
    }

    pub fn get_reload_high_bits(&self) -> u8 {
        self.timer_high
    }
}

impl Snapshotable for SequenceTimer {
    fn save(&self, s: &mut Snapshot) {
        s.write("period", self.reload_value);
        s.write("value", self.value);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.set_reload(s.read("period"));
        self.value = s.read("value");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clocks_out_every_reload_plus_one() {
        let mut t = SequenceTimer::new();
        t.set_reload(3);
        t.reset();
        let fired: Vec<bool> = (0..8).map(|_| t.clock()).collect();
        assert_eq!(fired, [false, false, false, true, false, false, false, true]);
    }

    #[test]
    fn halves_combine_into_eleven_bits() {
        let mut t = SequenceTimer::new();
        t.set_reload_low(0xAB);
        t.set_reload_high(0xFF);
        assert_eq!(t.get_reload(), 0x7AB);
        assert_eq!(t.get_reload_high_bits(), 0b111);
    }
}
