use super::Mapper;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mmc2Variant {
    /// PxROM: 8 KiB PRG bank, latch 0 triggers on $0FD8/$0FE8 only
    Mmc2,
    /// FxROM: 16 KiB PRG bank and PRG-RAM
    Mmc4,
}

/// MMC2 / MMC4: CHR banks switch when the PPU fetches tile $FD or $FE.
#[derive(Debug)]
pub struct Mmc2 {
    pub(crate) mem: CartridgeMemory,
    variant: Mmc2Variant,
    prg_bank: u8,
    /// [latch 0 = $FD, latch 0 = $FE, latch 1 = $FD, latch 1 = $FE]
    chr_banks: [u8; 4],
    /// true = $FE
    latch_fe: [bool; 2],
    horizontal: bool,
}

impl Mmc2 {
    pub fn new(rom: &Rom, variant: Mmc2Variant) -> Self {
        let mut mmc2 = Mmc2 {
            mem: CartridgeMemory::new(rom),
            variant,
            prg_bank: 0,
            chr_banks: [0; 4],
            latch_fe: [true, true],
            horizontal: false,
        };
        if variant == Mmc2Variant::Mmc2 {
            mmc2.mem.unmap_prg(0x6000, 0x2000);
        }
        mmc2.update_banks();
        mmc2
    }

    fn update_banks(&mut self) {
        match self.variant {
            Mmc2Variant::Mmc2 => {
                let count = self.mem.prg_bank_count(0x2000);
                self.mem.map_prg(0x8000, 0x2000, self.prg_bank as usize);
                self.mem.map_prg(0xA000, 0x2000, count.saturating_sub(3));
                self.mem.map_prg(0xC000, 0x2000, count.saturating_sub(2));
                self.mem.map_prg_last(0xE000, 0x2000);
            }
            Mmc2Variant::Mmc4 => {
                self.mem.map_prg(0x8000, 0x4000, self.prg_bank as usize);
                self.mem.map_prg_last(0xC000, 0x4000);
            }
        }
        let low = self.chr_banks[self.latch_fe[0] as usize];
        let high = self.chr_banks[2 + self.latch_fe[1] as usize];
        self.mem.map_chr(0x0000, 0x1000, low as usize);
        self.mem.map_chr(0x1000, 0x1000, high as usize);
    }
}

impl Mapper for Mmc2 {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x6000..=0x7FFF => self.mem.write_mapped(addr, value),
            0xA000..=0xAFFF => self.prg_bank = value & 0x0F,
            0xB000..=0xEFFF => {
                let index = ((addr - 0xB000) >> 12) as usize;
                self.chr_banks[index] = value & 0x1F;
            }
            0xF000..=0xFFFF => self.horizontal = value & 1 != 0,
            _ => return,
        }
        self.update_banks();
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        self.mem.write_mapped(addr, value);
    }

    fn mirroring(&self) -> Mirroring {
        if self.horizontal {
            Mirroring::Horizontal
        } else {
            Mirroring::Vertical
        }
    }

    // The latch flips after the fetch, so the trigger tile itself still
    // comes from the old bank.
    fn chr_read_done(&mut self, addr: u16) {
        let latch = match (addr, self.variant) {
            (0x0FD8, _) => Some((0, false)),
            (0x0FE8, _) => Some((0, true)),
            (0x0FD9..=0x0FDF, Mmc2Variant::Mmc4) => Some((0, false)),
            (0x0FE9..=0x0FEF, Mmc2Variant::Mmc4) => Some((0, true)),
            (0x1FD8..=0x1FDF, _) => Some((1, false)),
            (0x1FE8..=0x1FEF, _) => Some((1, true)),
            _ => None,
        };
        if let Some((index, fe)) = latch {
            if self.latch_fe[index] != fe {
                self.latch_fe[index] = fe;
                self.update_banks();
            }
        }
    }

    fn reset(&mut self, soft: bool) {
        if !soft {
            self.prg_bank = 0;
            self.chr_banks = [0; 4];
            self.latch_fe = [true, true];
            self.update_banks();
        }
    }
}

impl Snapshotable for Mmc2 {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write("prgBank", self.prg_bank);
        s.write_bytes("chrBanks", &self.chr_banks);
        s.write("latch0", self.latch_fe[0]);
        s.write("latch1", self.latch_fe[1]);
        s.write("horizontal", self.horizontal);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        self.prg_bank = s.read("prgBank");
        s.read_bytes_into("chrBanks", &mut self.chr_banks);
        self.latch_fe = [s.read_or("latch0", true), s.read_or("latch1", true)];
        self.horizontal = s.read("horizontal");
        self.update_banks();
    }
}
