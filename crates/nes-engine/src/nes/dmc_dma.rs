use crate::nes::snapshot::{Snapshot, Snapshotable};

/// CPU cycles stolen by a DMC sample fetch: halt, dummy, alignment, get
const DMC_STALL_CYCLES: u8 = 4;
/// A fetch that lands inside an OAM DMA reuses its halt and alignment
const DMC_STALL_CYCLES_DURING_OAM: u8 = 2;

#[derive(Debug, Clone, Default)]
pub struct DmcDma {
    // request address latched from the DMC channel
    req_addr: Option<u16>,

    // active transfer state
    active: bool,
    cycles_left: u8, // counts down CPU cycles remaining in the stall
    active_addr: u16,
}

impl DmcDma {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&mut self, addr: u16) {
        if self.req_addr.is_none() && !self.active {
            self.req_addr = Some(addr);
        }
    }

    pub fn pending(&self) -> bool {
        self.req_addr.is_some()
    }

    pub fn active(&self) -> bool {
        self.active
    }

    /// Start the DMA stall
    pub fn begin(&mut self, during_oam_dma: bool) {
        if self.active {
            return;
        }
        if let Some(addr) = self.req_addr.take() {
            self.active = true;
            self.active_addr = addr;
            self.cycles_left = if during_oam_dma {
                DMC_STALL_CYCLES_DURING_OAM
            } else {
                DMC_STALL_CYCLES
            };
        }
    }

    /// Called once per CPU cycle while DMC owns the bus.
    /// Returns Some(addr) when a memory read should happen
    pub fn step(&mut self) -> Option<u16> {
        if !self.active {
            return None;
        }

        self.cycles_left -= 1;

        // Do the read on the last stolen cycle
        if self.cycles_left == 0 {
            self.active = false;
            return Some(self.active_addr);
        }

        None
    }
}

impl Snapshotable for DmcDma {
    fn save(&self, s: &mut Snapshot) {
        s.write("requested", self.req_addr.is_some());
        s.write("requestAddr", self.req_addr.unwrap_or(0));
        s.write("active", self.active);
        s.write("cyclesLeft", self.cycles_left);
        s.write("activeAddr", self.active_addr);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.req_addr = if s.read("requested") {
            Some(s.read("requestAddr"))
        } else {
            None
        };
        self.cycles_left = s.read::<u8>("cyclesLeft").min(DMC_STALL_CYCLES);
        self.active = s.read::<bool>("active") && self.cycles_left > 0;
        self.active_addr = s.read("activeAddr");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stall_reads_on_last_cycle() {
        let mut dma = DmcDma::new();
        dma.request(0xC123);
        assert!(dma.pending());
        dma.begin(false);
        assert!(!dma.pending());
        let reads: Vec<Option<u16>> = (0..4).map(|_| dma.step()).collect();
        assert_eq!(reads, [None, None, None, Some(0xC123)]);
        assert!(!dma.active());
    }

    #[test]
    fn shorter_stall_inside_oam_dma() {
        let mut dma = DmcDma::new();
        dma.request(0xC000);
        dma.begin(true);
        assert_eq!(dma.step(), None);
        assert_eq!(dma.step(), Some(0xC000));
    }

    #[test]
    fn requests_are_ignored_while_busy() {
        let mut dma = DmcDma::new();
        dma.request(0xC000);
        dma.begin(false);
        dma.request(0xD000);
        assert!(!dma.pending());
    }
}
