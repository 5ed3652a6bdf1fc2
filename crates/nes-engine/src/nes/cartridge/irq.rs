//! IRQ counters shared between boards.

use crate::nes::snapshot::{Snapshot, Snapshotable};

/// PPU dots A12 has to stay low before a rising edge counts. Filters the
/// short dips between sprite pattern fetches.
const A12_LOW_DOTS: u64 = 10;

/// Detects filtered rising edges of PPU address line A12.
#[derive(Debug, Clone, Default)]
pub struct A12Watcher {
    high: bool,
    low_since: u64,
}

impl A12Watcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the address currently on the PPU bus. Returns true on a
    /// qualifying rising edge.
    pub fn update(&mut self, addr: u16, ppu_cycle: u64) -> bool {
        let high = addr & 0x1000 != 0;
        let rising = high && !self.high && ppu_cycle.saturating_sub(self.low_since) >= A12_LOW_DOTS;
        if !high && self.high {
            self.low_since = ppu_cycle;
        }
        self.high = high;
        rising
    }
}

impl Snapshotable for A12Watcher {
    fn save(&self, s: &mut Snapshot) {
        s.write("a12High", self.high);
        s.write("lowSince", self.low_since);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.high = s.read("a12High");
        self.low_since = s.read("lowSince");
    }
}

/// Konami VRC IRQ: an 8-bit up-counter fed either every CPU cycle or by a
/// scanline prescaler (341 PPU dots, counted three per CPU cycle).
#[derive(Debug, Clone, Default)]
pub struct VrcIrq {
    latch: u8,
    counter: u8,
    prescaler: i16,
    enabled: bool,
    enable_after_ack: bool,
    cycle_mode: bool,
    pending: bool,
}

impl VrcIrq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_latch(&mut self, value: u8) {
        self.latch = value;
    }

    pub fn write_latch_low(&mut self, value: u8) {
        self.latch = (self.latch & 0xF0) | (value & 0x0F);
    }

    pub fn write_latch_high(&mut self, value: u8) {
        self.latch = (self.latch & 0x0F) | ((value & 0x0F) << 4);
    }

    /// Control register: A (bit 0), E (bit 1), M (bit 2)
    pub fn write_control(&mut self, value: u8) {
        self.enable_after_ack = value & 0x01 != 0;
        self.enabled = value & 0x02 != 0;
        self.cycle_mode = value & 0x04 != 0;
        if self.enabled {
            self.counter = self.latch;
            self.prescaler = 341;
        }
        self.pending = false;
    }

    pub fn acknowledge(&mut self) {
        self.pending = false;
        self.enabled = self.enable_after_ack;
    }

    pub fn clock(&mut self) {
        if !self.enabled {
            return;
        }
        if self.cycle_mode {
            self.clock_counter();
        } else {
            self.prescaler -= 3;
            if self.prescaler <= 0 {
                self.prescaler += 341;
                self.clock_counter();
            }
        }
    }

    fn clock_counter(&mut self) {
        if self.counter == 0xFF {
            self.counter = self.latch;
            self.pending = true;
        } else {
            self.counter += 1;
        }
    }

    pub fn pending(&self) -> bool {
        self.pending
    }
}

impl Snapshotable for VrcIrq {
    fn save(&self, s: &mut Snapshot) {
        s.write("latch", self.latch);
        s.write("counter", self.counter);
        s.write("prescaler", self.prescaler);
        s.write("enabled", self.enabled);
        s.write("enableAfterAck", self.enable_after_ack);
        s.write("cycleMode", self.cycle_mode);
        s.write("pending", self.pending);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.latch = s.read("latch");
        self.counter = s.read("counter");
        self.prescaler = s.read::<i16>("prescaler").clamp(-2, 341);
        self.enabled = s.read("enabled");
        self.enable_after_ack = s.read("enableAfterAck");
        self.cycle_mode = s.read("cycleMode");
        self.pending = s.read("pending");
    }
}

/// 16-bit down-counter clocked every CPU cycle; fires when it wraps past zero.
#[derive(Debug, Clone, Default)]
pub struct CpuCycleIrq {
    counter: u16,
    counting: bool,
    irq_enabled: bool,
    pending: bool,
}

impl CpuCycleIrq {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_counter_low(&mut self, value: u8) {
        self.counter = (self.counter & 0xFF00) | value as u16;
    }

    pub fn set_counter_high(&mut self, value: u8) {
        self.counter = (self.counter & 0x00FF) | (value as u16) << 8;
    }

    /// Writing the control register also acknowledges a pending IRQ.
    pub fn set_control(&mut self, irq_enabled: bool, counting: bool) {
        self.irq_enabled = irq_enabled;
        self.counting = counting;
        self.pending = false;
    }

    pub fn clock(&mut self) {
        if !self.counting {
            return;
        }
        self.counter = self.counter.wrapping_sub(1);
        if self.counter == 0xFFFF && self.irq_enabled {
            self.pending = true;
        }
    }

    pub fn pending(&self) -> bool {
        self.pending
    }
}

impl Snapshotable for CpuCycleIrq {
    fn save(&self, s: &mut Snapshot) {
        s.write("counter", self.counter);
        s.write("counting", self.counting);
        s.write("irqEnabled", self.irq_enabled);
        s.write("pending", self.pending);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.counter = s.read("counter");
        self.counting = s.read("counting");
        self.irq_enabled = s.read("irqEnabled");
        self.pending = s.read("pending");
    }
}
