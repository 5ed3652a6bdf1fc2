use super::Mapper;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

const CHR_RAM_SIZE: usize = 0x4000;

/// CPROM: 16 KiB CHR-RAM, fixed first 4 KiB, switchable second 4 KiB.
#[derive(Debug)]
pub struct CpRom {
    pub(crate) mem: CartridgeMemory,
    mirroring: Mirroring,
    chr_bank: u8,
}

impl CpRom {
    pub fn new(rom: &Rom) -> CpRom {
        let mut mem = CartridgeMemory::new(rom);
        if mem.has_chr_ram() && mem.chr_ram.len() < CHR_RAM_SIZE {
            mem.chr_ram.resize(CHR_RAM_SIZE, 0);
        }
        mem.unmap_prg(0x6000, 0x2000);
        let mut cart = CpRom {
            mem,
            mirroring: rom.header.mirroring,
            chr_bank: 0,
        };
        cart.update_banks();
        cart
    }

    fn update_banks(&mut self) {
        self.mem.map_chr(0x0000, 0x1000, 0);
        self.mem.map_chr(0x1000, 0x1000, (self.chr_bank & 0x03) as usize);
    }
}

impl Mapper for CpRom {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        if addr >= 0x8000 {
            self.chr_bank = self.mem.bus_conflict(addr, value);
            self.update_banks();
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
            self.update_banks();
        }
    }
}

impl Snapshotable for CpRom {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write("chrBank", self.chr_bank);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        self.chr_bank = s.read("chrBank");
        self.update_banks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upper_pattern_table_switches() {
        let mut cart = CpRom::new(&Rom::new_custom(vec![0xFF; 0x8000], vec![], 13, Mirroring::Vertical));
        assert_eq!(cart.mem.chr_ram.len(), CHR_RAM_SIZE);

        cart.map_write(0x8000, 2);
        cart.chr_write(0x1000, 0xAB);
        assert_eq!(cart.mem.chr_ram[0x2000], 0xAB);

        cart.map_write(0x8000, 1);
        cart.chr_write(0x0000, 0xCD);
        assert_eq!(cart.mem.read_mapped(0x0000), Some(0xCD));
        assert_eq!(cart.mem.read_mapped(0x1000), Some(0x00));
    }
}
