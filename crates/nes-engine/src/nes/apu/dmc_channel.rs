use super::units::dmc_output::DmcOutput;
use super::units::sequence_timer::SequenceTimer;
use crate::nes::region::Region;
use crate::nes::snapshot::{Snapshot, Snapshotable};

// Periods in CPU cycles
const RATE_TABLE_NTSC: [u16; 16] = [
    428, 380, 340, 320, 286, 254, 226, 214, 190, 160, 142, 128, 106, 84, 72, 54,
];
const RATE_TABLE_PAL: [u16; 16] = [
    398, 354, 316, 298, 276, 236, 210, 198, 176, 148, 132, 118, 98, 78, 66, 50,
];

/// Delta modulation channel. Sample bytes are fetched by DMA: the channel
/// raises a request with [`DmcChannel::dma_request`] and the bus answers with
/// [`DmcChannel::fill_sample_buffer`] once it has stolen the cycles.
pub struct DmcChannel {
    seq_timer: SequenceTimer,
    output: DmcOutput,
    rates: &'static [u16; 16],

    irq_enabled: bool,
    pub(super) irq_pending: bool,
    loop_flag: bool,

    sample_address: u16,
    current_address: u16,

    sample_length: u16,
    bytes_remaining: u16,

    sample_buffer: Option<u8>,
    /// CPU cycles before a DMA started by a $4015 write is requested
    start_delay: u8,
}

impl DmcChannel {
    pub fn new(region: Region) -> DmcChannel {
        let rates = Self::rate_table(region);
        let mut seq_timer = SequenceTimer::new();
        seq_timer.set_reload(rates[0] - 1);
        seq_timer.reset();

        DmcChannel {
            seq_timer,
            output: DmcOutput::new(),
            rates,

            irq_enabled: false,
            irq_pending: false,
            loop_flag: false,

            sample_address: 0xC000,
            sample_length: 1,

            current_address: 0xC000,
            bytes_remaining: 0,

            sample_buffer: None,
            start_delay: 0,
        }
    }

    fn rate_table(region: Region) -> &'static [u16; 16] {
        match region {
            Region::Pal => &RATE_TABLE_PAL,
            Region::Ntsc | Region::Dendy => &RATE_TABLE_NTSC,
        }
    }

    pub fn set_region(&mut self, region: Region) {
        self.rates = Self::rate_table(region);
    }

    pub fn write_4010(&mut self, value: u8) {
        /* $4010:       IL--.RRRR (write)
              bit 7    I---.---- IRQ enabled flag
              bit 6    -L--.---- Loop flag
              bits 3-0 ----.RRRR Rate index
        */
        self.irq_enabled = value & 0b1000_0000 != 0;
        self.loop_flag = value & 0b0100_0000 != 0;
        if !self.irq_enabled {
            self.irq_pending = false;
        }

        let rate_index = value & 0b0000_1111;
        self.seq_timer.set_reload(self.rates[rate_index as usize] - 1);
    }

    pub fn write_4011(&mut self, value: u8) {
        // $4011:  -DDD.DDDD  direct load of the output level
        self.output.direct_load(value & 0x7F);
    }

    pub fn write_4012(&mut self, value: u8) {
        // $4012:  AAAA.AAAA  sample address = %11AAAAAA.AA000000
        self.sample_address = 0xC000 | ((value as u16) << 6);
    }

    pub fn write_4013(&mut self, value: u8) {
        // $4013:  LLLL.LLLL  sample length = %LLLL.LLLL0001
        self.sample_length = ((value as u16) << 4) | 1;
    }
}

impl DmcChannel {
    fn restart(&mut self) {
        self.current_address = self.sample_address;
        self.bytes_remaining = self.sample_length;
    }

    /// $4015 bit 4. `odd_cycle` is the parity of the CPU cycle of the write.
    pub fn set_enabled(&mut self, enabled: bool, odd_cycle: bool) {
        if !enabled {
            self.bytes_remaining = 0;
        } else if self.bytes_remaining == 0 {
            self.restart();
            // The fetch lands two or three cycles after the write
            self.start_delay = if odd_cycle { 3 } else { 2 };
        }
    }

    pub fn is_active(&self) -> bool {
        self.bytes_remaining > 0
    }

    /// Address of the next sample byte while the buffer is empty and the
    /// sample has bytes left.
    pub fn dma_request(&self) -> Option<u16> {
        let wants_byte =
            self.sample_buffer.is_none() && self.bytes_remaining > 0 && self.start_delay == 0;
        wants_byte.then_some(self.current_address)
    }

    pub fn fill_sample_buffer(&mut self, byte: u8) {
        if self.bytes_remaining == 0 {
            return;
        }
        self.sample_buffer = Some(byte);

        self.current_address = if self.current_address == 0xFFFF {
            0x8000
        } else {
            self.current_address + 1
        };

        self.bytes_remaining -= 1;
        if self.bytes_remaining == 0 {
            if self.loop_flag {
                self.restart();
            } else if self.irq_enabled {
                self.irq_pending = true;
            }
        }
    }

    /// Clocked every CPU cycle
    pub fn clock(&mut self) {
        if self.start_delay > 0 {
            self.start_delay -= 1;
        }

        if self.seq_timer.clock() && self.output.clock() {
            let next = self.sample_buffer.take();
            self.output.begin_cycle(next);
        }
    }

    pub fn sample(&self) -> u8 {
        self.output.level()
    }
}

impl Snapshotable for DmcChannel {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("timer", &self.seq_timer);
        s.write_snapshot("output", &self.output);
        s.write("irqEnabled", self.irq_enabled);
        s.write("irqPending", self.irq_pending);
        s.write("loopFlag", self.loop_flag);
        s.write("sampleAddr", self.sample_address);
        s.write("sampleLength", self.sample_length);
        s.write("currentAddr", self.current_address);
        s.write("bytesRemaining", self.bytes_remaining);
        s.write("bufferEmpty", self.sample_buffer.is_none());
        s.write("readBuffer", self.sample_buffer.unwrap_or(0));
        s.write("startDelay", self.start_delay);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("timer", &mut self.seq_timer);
        s.restore_nested("output", &mut self.output);
        self.irq_enabled = s.read("irqEnabled");
        self.irq_pending = s.read("irqPending");
        self.loop_flag = s.read("loopFlag");
        self.sample_address = s.read_or("sampleAddr", 0xC000u16) | 0xC000;
        self.sample_length = s.read_or("sampleLength", 1u16) & 0x0FF1;
        self.current_address = s.read_or("currentAddr", 0xC000u16) | 0x8000;
        self.bytes_remaining = s.read::<u16>("bytesRemaining").min(0x0FF1);
        self.sample_buffer = if s.read_or("bufferEmpty", true) {
            None
        } else {
            Some(s.read("readBuffer"))
        };
        self.start_delay = s.read::<u8>("startDelay").min(3);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing_dmc(length_reg: u8) -> DmcChannel {
        let mut dmc = DmcChannel::new(Region::Ntsc);
        dmc.write_4010(0x8F); // IRQ on, fastest rate
        dmc.write_4012(0x00);
        dmc.write_4013(length_reg);
        dmc.set_enabled(true, false);
        dmc
    }

    #[test]
    fn register_decoding() {
        let mut dmc = DmcChannel::new(Region::Ntsc);
        dmc.write_4012(0xFF);
        dmc.write_4013(0xFF);
        assert_eq!(dmc.sample_address, 0xFFC0);
        assert_eq!(dmc.sample_length, 0x0FF1);
        dmc.write_4011(0xFF);
        assert_eq!(dmc.sample(), 0x7F);
    }

    #[test]
    fn enabling_requests_first_byte_after_delay() {
        let mut dmc = playing_dmc(0);
        assert!(dmc.is_active());
        assert_eq!(dmc.dma_request(), None);
        dmc.clock();
        dmc.clock();
        assert_eq!(dmc.dma_request(), Some(0xC000));

        dmc.fill_sample_buffer(0xAA);
        assert_eq!(dmc.dma_request(), None);
        assert!(!dmc.is_active());
    }

    #[test]
    fn last_byte_raises_irq_unless_looping() {
        let mut dmc = playing_dmc(0);
        dmc.fill_sample_buffer(0x00);
        assert!(dmc.irq_pending);

        let mut dmc = playing_dmc(0);
        dmc.write_4010(0xCF); // loop
        dmc.fill_sample_buffer(0x00);
        assert!(!dmc.irq_pending);
        assert!(dmc.is_active());
    }

    #[test]
    fn clearing_irq_enable_acknowledges() {
        let mut dmc = playing_dmc(0);
        dmc.fill_sample_buffer(0x00);
        dmc.write_4010(0x0F);
        assert!(!dmc.irq_pending);
    }

    #[test]
    fn address_wraps_to_8000() {
        let mut dmc = playing_dmc(1); // 17 bytes
        dmc.current_address = 0xFFFF;
        dmc.fill_sample_buffer(0);
        assert_eq!(dmc.current_address, 0x8000);
    }

    #[test]
    fn buffer_empties_into_output_unit() {
        let mut dmc = playing_dmc(1);
        dmc.write_4011(0x40);
        dmc.fill_sample_buffer(0xFF);

        // The silent output cycle running at power-on ends and pulls the byte
        let mut cycles = 0;
        while dmc.sample_buffer.is_some() {
            dmc.clock();
            cycles += 1;
            assert!(cycles < 8 * 428, "buffer never consumed");
        }
        assert!(dmc.dma_request().is_some());

        for _ in 0..54 * 8 {
            dmc.clock();
        }
        assert_eq!(dmc.sample(), 0x40 + 16);
    }
}
