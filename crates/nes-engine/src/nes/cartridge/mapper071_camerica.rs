use super::Mapper;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

/// Camerica BF909x: UxROM-like PRG latch at $C000-$FFFF. The Fire Hawk
/// board adds a single-screen select at $9000-$9FFF.
#[derive(Debug)]
pub struct Camerica {
    pub(crate) mem: CartridgeMemory,
    mirroring: Mirroring,
    prg_bank: u8,
}

impl Camerica {
    pub fn new(rom: &Rom) -> Self {
        let mut cart = Camerica {
            mem: CartridgeMemory::new(rom),
            mirroring: rom.header.mirroring,
            prg_bank: 0,
        };
        cart.mem.unmap_prg(0x6000, 0x2000);
        cart.update_banks();
        cart
    }

    fn update_banks(&mut self) {
        self.mem.map_prg(0x8000, 0x4000, self.prg_bank as usize);
        self.mem.map_prg_last(0xC000, 0x4000);
    }
}

impl Mapper for Camerica {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x9000..=0x9FFF => {
                self.mirroring = if value & 0x10 != 0 {
                    Mirroring::Single1
                } else {
                    Mirroring::Single0
                };
            }
            0xC000..=0xFFFF => {
                self.prg_bank = value & 0x0F;
                self.update_banks();
            }
            _ => {}
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
            self.prg_bank = 0;
            self.update_banks();
        }
    }
}

impl Snapshotable for Camerica {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write("prgBank", self.prg_bank);
        s.write_enum("mirroring", self.mirroring);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        self.prg_bank = s.read("prgBank");
        self.mirroring = s.read_enum("mirroring", self.mirroring);
        self.update_banks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prg_latch_and_single_screen() {
        let prg = (0..0x20000).map(|i| (i / 0x4000) as u8).collect();
        let mut cart = Camerica::new(&Rom::new_custom(prg, vec![], 71, Mirroring::Vertical));
        cart.map_write(0xC000, 3);
        assert_eq!(cart.mem.read_mapped(0x8000), Some(3));
        assert_eq!(cart.mem.read_mapped(0xC000), Some(7));

        // $8000-$BFFF outside $9000 is ignored
        cart.map_write(0x8000, 0x10);
        assert_eq!(cart.mirroring(), Mirroring::Vertical);
        cart.map_write(0x9000, 0x10);
        assert_eq!(cart.mirroring(), Mirroring::Single1);
    }
}
