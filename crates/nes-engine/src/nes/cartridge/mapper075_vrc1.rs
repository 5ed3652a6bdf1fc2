use super::Mapper;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

/// Konami VRC1: three 8 KiB PRG banks and two 4 KiB CHR banks whose fifth
/// bit lives in the mirroring register.
#[derive(Debug)]
pub struct Vrc1 {
    pub(crate) mem: CartridgeMemory,
    four_screen: bool,
    prg_banks: [u8; 3],
    chr_banks: [u8; 2],
    /// $9000: bit 0 mirroring, bits 1-2 CHR high bits
    control: u8,
}

impl Vrc1 {
    pub fn new(rom: &Rom) -> Self {
        let mut cart = Vrc1 {
            mem: CartridgeMemory::new(rom),
            four_screen: rom.header.mirroring == Mirroring::FourScreen,
            prg_banks: [0; 3],
            chr_banks: [0; 2],
            control: 0,
        };
        cart.mem.unmap_prg(0x6000, 0x2000);
        cart.update_banks();
        cart
    }

    fn update_banks(&mut self) {
        for (i, bank) in self.prg_banks.iter().enumerate() {
            self.mem.map_prg(0x8000 + i as u16 * 0x2000, 0x2000, *bank as usize);
        }
        self.mem.map_prg_last(0xE000, 0x2000);

        let low = self.chr_banks[0] | (self.control & 0x02) << 3;
        let high = self.chr_banks[1] | (self.control & 0x04) << 2;
        self.mem.map_chr(0x0000, 0x1000, low as usize);
        self.mem.map_chr(0x1000, 0x1000, high as usize);
    }
}

impl Mapper for Vrc1 {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        match addr & 0xF000 {
            0x8000 => self.prg_banks[0] = value & 0x0F,
            0x9000 => self.control = value & 0x07,
            0xA000 => self.prg_banks[1] = value & 0x0F,
            0xC000 => self.prg_banks[2] = value & 0x0F,
            0xE000 => self.chr_banks[0] = value & 0x0F,
            0xF000 => self.chr_banks[1] = value & 0x0F,
            _ => return,
        }
        self.update_banks();
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        self.mem.write_mapped(addr, value);
    }

    fn mirroring(&self) -> Mirroring {
        if self.four_screen {
            Mirroring::FourScreen
        } else if self.control & 0x01 != 0 {
            Mirroring::Horizontal
        } else {
            Mirroring::Vertical
        }
    }

    fn reset(&mut self, soft: bool) {
        if !soft {
            self.prg_banks = [0; 3];
            self.chr_banks = [0; 2];
            self.control = 0;
            self.update_banks();
        }
    }
}

impl Snapshotable for Vrc1 {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write_bytes("prgBanks", &self.prg_banks);
        s.write_bytes("chrBanks", &self.chr_banks);
        s.write("control", self.control);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        s.read_bytes_into("prgBanks", &mut self.prg_banks);
        s.read_bytes_into("chrBanks", &mut self.chr_banks);
        self.control = s.read("control");
        self.update_banks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chr_high_bits_come_from_control() {
        let prg = (0..0x20000).map(|i| (i / 0x2000) as u8).collect();
        let chr = (0..0x20000).map(|i| (i / 0x1000) as u8).collect();
        let mut cart = Vrc1::new(&Rom::new_custom(prg, chr, 75, Mirroring::Vertical));

        cart.map_write(0xA000, 9);
        assert_eq!(cart.mem.read_mapped(0xA000), Some(9));
        assert_eq!(cart.mem.read_mapped(0xE000), Some(15));

        cart.map_write(0xF000, 0x03);
        cart.map_write(0x9000, 0x05);
        assert_eq!(cart.mem.read_mapped(0x1000), Some(0x13));
        assert_eq!(cart.mirroring(), Mirroring::Horizontal);
    }
}
