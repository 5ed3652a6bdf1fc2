use super::Mapper;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

/// Mapper 34 covers two unrelated boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Wiring {
    /// 32 KiB PRG latch at $8000-$FFFF, CHR-RAM
    BnRom,
    /// Registers at $7FFD-$7FFF on top of PRG-RAM, 4 KiB CHR banks
    Nina001,
}

#[derive(Debug)]
pub struct Mapper034 {
    pub(crate) mem: CartridgeMemory,
    wiring: Wiring,
    mirroring: Mirroring,
    prg_bank: u8,
    chr_banks: [u8; 2],
}

impl Mapper034 {
    pub fn new(rom: &Rom) -> Self {
        let wiring = match rom.header.submapper {
            1 => Wiring::Nina001,
            2 => Wiring::BnRom,
            _ if rom.chr_rom.len() > 0x2000 => Wiring::Nina001,
            _ => Wiring::BnRom,
        };
        let mut cart = Mapper034 {
            mem: CartridgeMemory::new(rom),
            wiring,
            mirroring: rom.header.mirroring,
            prg_bank: 0,
            chr_banks: [0, 1],
        };
        cart.update_banks();
        cart
    }

    fn update_banks(&mut self) {
        self.mem.map_prg(0x8000, 0x8000, self.prg_bank as usize);
        match self.wiring {
            Wiring::BnRom => self.mem.map_chr(0x0000, 0x2000, 0),
            Wiring::Nina001 => {
                self.mem.map_chr(0x0000, 0x1000, self.chr_banks[0] as usize);
                self.mem.map_chr(0x1000, 0x1000, self.chr_banks[1] as usize);
            }
        }
    }
}

impl Mapper for Mapper034 {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        match (self.wiring, addr) {
            (Wiring::BnRom, 0x8000..=0xFFFF) => {
                self.prg_bank = self.mem.bus_conflict(addr, value);
            }
            (Wiring::Nina001, 0x6000..=0x7FFF) => {
                self.mem.write_mapped(addr, value);
                match addr {
                    0x7FFD => self.prg_bank = value & 0x01,
                    0x7FFE => self.chr_banks[0] = value & 0x0F,
                    0x7FFF => self.chr_banks[1] = value & 0x0F,
                    _ => return,
                }
            }
            _ => {
                self.mem.write_mapped(addr, value);
                return;
            }
        }
        self.update_banks();
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
            self.chr_banks = [0, 1];
            self.update_banks();
        }
    }
}

impl Snapshotable for Mapper034 {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write("prgBank", self.prg_bank);
        s.write_bytes("chrBanks", &self.chr_banks);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        self.prg_bank = s.read("prgBank");
        s.read_bytes_into("chrBanks", &mut self.chr_banks);
        self.update_banks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prg() -> Vec<u8> {
        let mut prg: Vec<u8> = (0..0x10000).map(|i| (i / 0x8000) as u8 | 0xFE).collect();
        // Bank-switch table entry
        prg[0x0010] = 0xFF;
        prg
    }

    #[test]
    fn bnrom_switches_32k() {
        let mut cart = Mapper034::new(&Rom::new_custom(prg(), vec![], 34, Mirroring::Vertical));
        assert_eq!(cart.wiring, Wiring::BnRom);
        cart.map_write(0x8000, 0x01);
        // Bus conflict with $FE in bank 0
        assert_eq!(cart.mem.read_mapped(0x8000), Some(0xFE));
        cart.map_write(0x8010, 0x01);
        assert_eq!(cart.mem.read_mapped(0x8000), Some(0xFF));
    }

    #[test]
    fn nina001_registers_overlay_ram() {
        let chr = (0..0x10000).map(|i| (i / 0x1000) as u8).collect();
        let mut cart = Mapper034::new(&Rom::new_custom(prg(), chr, 34, Mirroring::Vertical));
        assert_eq!(cart.wiring, Wiring::Nina001);
        cart.map_write(0x7FFD, 1);
        cart.map_write(0x7FFE, 5);
        cart.map_write(0x7FFF, 9);
        assert_eq!(cart.mem.read_mapped(0x8000), Some(0xFF));
        assert_eq!(cart.mem.read_mapped(0x0000), Some(5));
        assert_eq!(cart.mem.read_mapped(0x1000), Some(9));
        assert_eq!(cart.mem.read_mapped(0x7FFE), Some(5));
    }
}
