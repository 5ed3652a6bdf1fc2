use super::Mapper;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

/// Fixed PRG, switchable 8 KiB CHR bank.
#[derive(Debug)]
pub struct CnRom {
    pub(crate) mem: CartridgeMemory,
    mirroring: Mirroring,
    bus_conflicts: bool,
    chr_bank: u8,
}

impl CnRom {
    pub fn new(rom: &Rom) -> CnRom {
        CnRom {
            mem: CartridgeMemory::new(rom),
            mirroring: rom.header.mirroring,
            bus_conflicts: rom.header.submapper == 2,
            chr_bank: 0,
        }
    }
}

impl Mapper for CnRom {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x8000..=0xFFFF => {
                self.chr_bank = if self.bus_conflicts {
                    self.mem.bus_conflict(addr, value)
                } else {
                    value
                };
                self.mem.map_chr(0x0000, 0x2000, self.chr_bank as usize);
            }
            _ => self.mem.write_mapped(addr, value),
        }
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        self.mem.write_mapped(addr, value);
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn reset(&mut self, soft: bool) {
        if !soft {
            self.chr_bank = 0;
            self.mem.map_chr(0x0000, 0x2000, 0);
        }
    }
}

impl Snapshotable for CnRom {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write("chrBank", self.chr_bank);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        self.chr_bank = s.read("chrBank");
        self.mem.map_chr(0x0000, 0x2000, self.chr_bank as usize);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_chr_bank() {
        let chr = (0..0x8000).map(|i| (i / 0x2000) as u8).collect();
        let mut cart = CnRom::new(&Rom::new_custom(vec![0xFF; 0x8000], chr, 3, Mirroring::Vertical));
        cart.map_write(0x8000, 2);
        assert_eq!(cart.mem.read_mapped(0x0000), Some(2));
        cart.map_write(0x8000, 5);
        assert_eq!(cart.mem.read_mapped(0x1FFF), Some(1));
    }
}
