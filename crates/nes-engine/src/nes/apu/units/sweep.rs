use crate::nes::snapshot::{Snapshot, Snapshotable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseType {
    Pulse1,
    Pulse2,
}

#[derive(Debug, Clone)]
pub struct Sweep {
    pulse_type: PulseType,
    enabled: bool,
    reload: bool,
    negate: bool,

    period: u8,  // 0-7
    shift: u8,   // 0-7
    divider: u8, // counts down
}

impl Sweep {
    pub fn new(pulse_type: PulseType) -> Sweep {
        Sweep {
            pulse_type,
            enabled: false,
            reload: false,
            negate: false,

            period: 0,
            shift: 0,
            divider: 0,
        }
    }

    pub fn set(&mut self, value: u8) {
        // value: 0bEPPP_NSSS
        self.enabled = value & 0b1000_0000 != 0;
        self.period = (value >> 4) & 0b111;
        self.negate = value & 0b0000_1000 != 0;
        self.shift = value & 0b0000_0111;
        self.reload = true;
    }

    /// Pulse 1 negates with ones' complement, pulse 2 with two's complement.
    pub fn compute_target(&self, timer: u16) -> u16 {
        let change = timer >> self.shift;
        if self.negate {
            match self.pulse_type {
                PulseType::Pulse1 => timer.saturating_sub(change).saturating_sub(1),
                PulseType::Pulse2 => timer.saturating_sub(change),
            }
        } else {
            timer + change
        }
    }

    /// Called on half-frame clocks
    pub fn clock(&mut self, timer: &mut u16) {
        if self.divider == 0 && self.enabled && self.shift > 0 && !self.is_muting(*timer) {
            *timer = self.compute_target(*timer);
        }

        if self.divider == 0 || self.reload {
            self.divider = self.period;
            self.reload = false;
        } else {
            self.divider -= 1;
        }
    }

    /// The target period is computed continuously, so an overflowing target
    /// mutes the channel even while the sweep is disabled.
    pub fn is_muting(&self, timer: u16) -> bool {
        timer < 8 || (!self.negate && self.compute_target(timer) > 0x7FF)
    }

    #[cfg(test)]
    fn divider(&self) -> u8 {
        self.divider
    }
}

impl Snapshotable for Sweep {
    fn save(&self, s: &mut Snapshot) {
        s.write("enabled", self.enabled);
        s.write("reload", self.reload);
        s.write("negate", self.negate);
        s.write("period", self.period);
        s.write("shift", self.shift);
        s.write("divider", self.divider);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.enabled = s.read("enabled");
        self.reload = s.read("reload");
        self.negate = s.read("negate");
        self.period = s.read::<u8>("period") & 0b111;
        self.shift = s.read::<u8>("shift") & 0b111;
        self.divider = s.read::<u8>("divider") & 0b111;
    }
}
