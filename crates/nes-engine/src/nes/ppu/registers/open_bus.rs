/// PPU I/O latch. Each bit remembers the frame it was last driven and fades
/// to 0 once it has gone undriven for about 600ms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenBus {
    value: u8,
    refreshed: [u32; 8],
    period: u32,
}

impl OpenBus {
    pub fn new(period: u32) -> OpenBus {
        OpenBus {
            value: 0,
            refreshed: [0; 8],
            period,
        }
    }

    /// Drives every bit (register writes).
    pub fn set(&mut self, value: u8, frame: u32) {
        self.set_masked(value, 0xFF, frame);
    }

    /// Drives only the bits in `mask`; the others keep their decaying value.
    pub fn set_masked(&mut self, value: u8, mask: u8, frame: u32) {
        self.value = (self.value & !mask) | (value & mask);
        for (bit, stamp) in self.refreshed.iter_mut().enumerate() {
            if mask & (1 << bit) != 0 {
                *stamp = frame;
            }
        }
    }

    /// Called once per frame.
    pub fn decay(&mut self, frame: u32) {
        for (bit, stamp) in self.refreshed.iter().enumerate() {
            if frame.wrapping_sub(*stamp) > self.period {
                self.value &= !(1 << bit);
            }
        }
    }

    pub fn output(&self) -> u8 {
        self.value
    }

    pub(crate) fn stamps(&self) -> &[u32; 8] {
        &self.refreshed
    }

    pub(crate) fn restore(&mut self, value: u8, stamps: &[u32]) {
        self.value = value;
        for (dst, src) in self.refreshed.iter_mut().zip(stamps) {
            *dst = *src;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bits_decay_independently() {
        let mut bus = OpenBus::new(30);
        bus.set(0xFF, 0);
        bus.set_masked(0x0F, 0x0F, 20);

        bus.decay(31);
        assert_eq!(bus.output(), 0x0F, "high nibble was last driven at frame 0");

        bus.decay(51);
        assert_eq!(bus.output(), 0x00);
    }

    #[test]
    fn test_value_survives_within_period() {
        let mut bus = OpenBus::new(30);
        bus.set(0xA5, 100);
        bus.decay(130);
        assert_eq!(bus.output(), 0xA5);
    }
}
