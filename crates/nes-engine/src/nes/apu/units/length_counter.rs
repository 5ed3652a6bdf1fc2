use crate::nes::snapshot::{Snapshot, Snapshotable};

/* Source: nes-test-roms/apu_test/source/2-len_table.s
   table:  .byte 10, 254, 20,  2, 40,  4, 80,  6
           .byte 160,  8, 60, 10, 14, 12, 26, 14
           .byte 12,  16, 24, 18, 48, 20, 96, 22
           .byte 192, 24, 72, 26, 16, 28, 32, 30
*/
#[rustfmt::skip]
const COUNT_LOOKUP: [u8; 32] = [
    10, 254, 20,  2, 40,  4, 80,  6,
    160,  8, 60, 10, 14, 12, 26, 14,
    12,  16, 24, 18, 48, 20, 96, 22,
    192, 24, 72, 26, 16, 28, 32, 30,
];

/// Register writes to the counter (load and halt) are staged and land after
/// the frame sequencer has had its chance to clock the counter. A load that
/// races a half-frame clock on a non-zero counter is dropped.
#[derive(Debug, Clone, Default)]
pub struct LengthCounter {
    enabled: bool,
    halted: bool,
    value: u8,

    pending_halt: bool,
    pending_load: Option<u8>,
    value_at_load: u8,
}

impl LengthCounter {
    pub fn new() -> LengthCounter {
        LengthCounter::default()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !self.enabled {
            self.value = 0;
            self.pending_load = None;
        }
    }

    pub fn set_halt(&mut self, halted: bool) {
        self.pending_halt = halted;
    }

    pub fn load_index(&mut self, index: u8) {
        // ignore load when not enabled
        if !self.enabled {
            return;
        }
        self.pending_load = Some(COUNT_LOOKUP[(index & 0b1_1111) as usize]);
        self.value_at_load = self.value;
    }

    /// Half-frame clock
    pub fn clock(&mut self) {
        if self.value > 0 && !self.halted {
            self.value -= 1;
        }
    }

    /// Applies staged register writes. Runs once per CPU cycle after the
    /// frame sequencer.
    pub fn commit(&mut self) {
        if let Some(load) = self.pending_load.take() {
            if self.value == self.value_at_load {
                self.value = load;
            }
        }
        self.halted = self.pending_halt;
    }

    pub fn output(&self) -> u8 {
        self.value
    }
}

impl Snapshotable for LengthCounter {
    fn save(&self, s: &mut Snapshot) {
        s.write("enabled", self.enabled);
        s.write("halt", self.halted);
        s.write("newHalt", self.pending_halt);
        s.write("counter", self.value);
        s.write("reloadValue", self.pending_load.unwrap_or(0));
        s.write("previousValue", self.value_at_load);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.enabled = s.read("enabled");
        self.halted = s.read("halt");
        self.pending_halt = s.read("newHalt");
        self.value = s.read("counter");
        let reload: u8 = s.read("reloadValue");
        self.pending_load = (reload != 0).then_some(reload);
        self.value_at_load = s.read("previousValue");
    }
}
