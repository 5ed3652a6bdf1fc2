use crate::nes::snapshot::{Snapshot, Snapshotable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OamDmaOp {
    /// Halt or alignment cycle; the CPU bus is idle
    Dummy,
    /// "get" cycle: read the byte at this address
    Read(u16),
    /// "put" cycle: write the latched byte to $2004
    Write(u8),
}

/// $4014 sprite DMA. One halt cycle, one more to align on an odd start, then
/// 256 read/write pairs: 513 or 514 cycles in total.
#[derive(Debug, Clone, Default)]
pub struct OamDma {
    active: bool,
    page: u8,
    cycle: u16,
    latch: u8,
    dummy_cycles: u8,
}

impl OamDma {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Start OAM DMA. `cpu_odd_cycle` decides whether an alignment cycle is needed
    pub fn start(&mut self, page: u8, cpu_odd_cycle: bool) {
        log::debug!("OAM DMA from page ${page:02X}");
        self.active = true;
        self.page = page;
        self.cycle = 0;
        self.dummy_cycles = if cpu_odd_cycle { 2 } else { 1 };
    }

    pub fn step(&mut self) -> OamDmaOp {
        if !self.active {
            return OamDmaOp::Dummy;
        }

        if self.dummy_cycles > 0 {
            self.dummy_cycles -= 1;
            return OamDmaOp::Dummy;
        }

        // 512 cycles to complete 256 read/write pairs
        let phase = self.cycle & 1;
        let index = self.cycle >> 1;

        let op = if phase == 0 {
            let addr = ((self.page as u16) << 8) | index;
            OamDmaOp::Read(addr)
        } else {
            OamDmaOp::Write(self.latch)
        };

        self.cycle += 1;

        // done when 256 bytes have been written
        if index == 255 && phase == 1 {
            self.active = false;
        }

        op
    }

    /// Stores the byte fetched by the last `Read` op.
    pub fn latch(&mut self, value: u8) {
        self.latch = value;
    }
}

impl Snapshotable for OamDma {
    fn save(&self, s: &mut Snapshot) {
        s.write("active", self.active);
        s.write("page", self.page);
        s.write("cycle", self.cycle);
        s.write("latch", self.latch);
        s.write("dummyCycles", self.dummy_cycles);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.active = s.read("active");
        self.page = s.read("page");
        self.cycle = s.read::<u16>("cycle").min(511);
        self.latch = s.read("latch");
        self.dummy_cycles = s.read::<u8>("dummyCycles").min(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_end(dma: &mut OamDma) -> Vec<OamDmaOp> {
        let mut ops = Vec::new();
        while dma.active() {
            let op = dma.step();
            if let OamDmaOp::Read(addr) = op {
                dma.latch(addr as u8);
            }
            ops.push(op);
        }
        ops
    }

    #[test]
    fn even_start_takes_513_cycles() {
        let mut dma = OamDma::new();
        dma.start(0x02, false);
        let ops = run_to_end(&mut dma);
        assert_eq!(ops.len(), 513);
        assert_eq!(ops[0], OamDmaOp::Dummy);
        assert_eq!(ops[1], OamDmaOp::Read(0x0200));
        assert_eq!(ops[2], OamDmaOp::Write(0x00));
        assert_eq!(ops[512], OamDmaOp::Write(0xFF));
    }

    #[test]
    fn odd_start_adds_alignment_cycle() {
        let mut dma = OamDma::new();
        dma.start(0x07, true);
        let ops = run_to_end(&mut dma);
        assert_eq!(ops.len(), 514);
        assert_eq!(ops[2], OamDmaOp::Read(0x0700));
    }
}
