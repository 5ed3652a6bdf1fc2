use crate::nes::snapshot::{Snapshot, Snapshotable};

/// Shift register and 7-bit level counter of the DMC.
#[derive(Debug, Clone)]
pub struct DmcOutput {
    shift_register: u8,
    level: u8,
    bits_remaining: u8,
    silence: bool,
}

impl Default for DmcOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl DmcOutput {
    pub fn new() -> DmcOutput {
        DmcOutput {
            shift_register: 0,
            level: 0,
            bits_remaining: 8,
            silence: true,
        }
    }

    /// $4011 direct load (7-bit)
    pub fn direct_load(&mut self, value: u8) {
        self.level = value & 0x7F;
    }

    /// Clock the output unit once (at the DMC rate).
    /// Returns `true` when an output cycle ends and the unit wants the next
    /// byte from the sample buffer.
    pub fn clock(&mut self) -> bool {
        if !self.silence {
            if self.shift_register & 1 != 0 {
                if self.level <= 125 {
                    self.level += 2;
                }
            } else if self.level >= 2 {
                self.level -= 2;
            }
            self.shift_register >>= 1;
        }

        self.bits_remaining -= 1;
        if self.bits_remaining == 0 {
            self.bits_remaining = 8;
            return true;
        }
        false
    }

    /// Starts a new output cycle from the sample buffer; `None` silences it.
    pub fn begin_cycle(&mut self, sample: Option<u8>) {
        match sample {
            Some(byte) => {
                self.shift_register = byte;
                self.silence = false;
            }
            None => self.silence = true,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }
}

impl Snapshotable for DmcOutput {
    fn save(&self, s: &mut Snapshot) {
        s.write("shiftRegister", self.shift_register);
        s.write("outputLevel", self.level);
        s.write("bitsRemaining", self.bits_remaining);
        s.write("silence", self.silence);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.shift_register = s.read("shiftRegister");
        self.level = s.read::<u8>("outputLevel") & 0x7F;
        self.bits_remaining = s.read_or::<u8>("bitsRemaining", 8).clamp(1, 8);
        self.silence = s.read_or("silence", true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_bits_raise_level_and_clear_bits_lower_it() {
        let mut out = DmcOutput::new();
        out.direct_load(64);
        out.begin_cycle(Some(0b0000_0101));
        out.clock();
        assert_eq!(out.level(), 66);
        out.clock();
        assert_eq!(out.level(), 64);
        out.clock();
        assert_eq!(out.level(), 66);
    }

    #[test]
    fn level_is_clamped() {
        let mut out = DmcOutput::new();
        out.direct_load(126);
        out.begin_cycle(Some(0xFF));
        out.clock();
        assert_eq!(out.level(), 126);

        out.direct_load(1);
        out.begin_cycle(Some(0x00));
        out.clock();
        assert_eq!(out.level(), 1);
    }

    #[test]
    fn silence_holds_level() {
        let mut out = DmcOutput::new();
        out.direct_load(40);
        for _ in 0..7 {
            assert!(!out.clock());
        }
        assert!(out.clock());
        assert_eq!(out.level(), 40);
    }
}
