use log::debug;

use super::Mapper;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

const OUTER_PRG_BANK_SIZE: usize = 0x40000;

// MMC1 mapper (iNES mapper #1, #155 for MMC1A)
#[derive(Debug)]
pub struct Mmc1 {
    pub(crate) mem: CartridgeMemory,
    /// MMC1A has no PRG-RAM disable bit
    mmc1a: bool,

    // Shift register state
    shift_reg: u8,
    shift_count: u8,

    // Internal MMC1 registers
    control: u8,
    chr_bank0: u8,
    chr_bank1: u8,
    prg_bank: u8,

    cpu_cycle: u64,
    last_write_cycle: Option<u64>,
}

impl Mmc1 {
    pub fn new(rom: &Rom, mmc1a: bool) -> Self {
        let mut mmc1 = Mmc1 {
            mem: CartridgeMemory::new(rom),
            mmc1a,
            shift_reg: 0x10,
            shift_count: 0,
            control: 0x0C, // default: PRG mode=3, CHR mode=0, nametable=0
            chr_bank0: 0,
            chr_bank1: 0,
            prg_bank: 0,
            cpu_cycle: 0,
            last_write_cycle: None,
        };
        mmc1.update_banks();
        mmc1
    }

    // Helper to update MMC1 shift register
    fn serial_write(&mut self, addr: u16, data: u8) {
        // Writes on back-to-back cycles (RMW instructions) only see the first
        let consecutive = self.last_write_cycle == Some(self.cpu_cycle.wrapping_sub(1));
        self.last_write_cycle = Some(self.cpu_cycle);
        if consecutive {
            return;
        }

        // Reset shift register if bit 7 set ($80-$FF)
        if data & 0x80 != 0 {
            self.shift_reg = 0x10;
            self.shift_count = 0;
            self.control |= 0x0C; // set PRG mode = 3
            self.update_banks();
            return;
        }

        // Shift in one bit (LSB first)
        let bit = data & 1;
        self.shift_reg = (self.shift_reg >> 1) | (bit << 4);
        self.shift_count += 1;

        if self.shift_count == 5 {
            let value = self.shift_reg & 0x1F;
            match addr {
                0x8000..=0x9FFF => self.control = value,
                0xA000..=0xBFFF => self.chr_bank0 = value,
                0xC000..=0xDFFF => self.chr_bank1 = value,
                _ => self.prg_bank = value,
            }
            debug!("MMC1 register ${addr:04X} = {value:#04X}");
            // Reset for next series of writes
            self.shift_reg = 0x10;
            self.shift_count = 0;
            self.update_banks();
        }
    }

    fn update_banks(&mut self) {
        let mode_4k = self.control & 0x10 != 0;

        // SUROM: CHR bank bit 4 picks the 256 KiB PRG half
        let outer = if self.mem.prg_rom.len() > OUTER_PRG_BANK_SIZE {
            (self.chr_bank0 & 0x10) as usize
        } else {
            0
        };
        let bank = (self.prg_bank & 0x0F) as usize;
        match (self.control >> 2) & 0b11 {
            0 | 1 => {
                let base = (bank & 0x0E) | outer;
                self.mem.map_prg(0x8000, 0x4000, base);
                self.mem.map_prg(0xC000, 0x4000, base + 1);
            }
            2 => {
                self.mem.map_prg(0x8000, 0x4000, outer);
                self.mem.map_prg(0xC000, 0x4000, bank | outer);
            }
            _ => {
                self.mem.map_prg(0x8000, 0x4000, bank | outer);
                self.mem.map_prg(0xC000, 0x4000, 0x0F | outer);
            }
        }

        if mode_4k {
            self.mem.map_chr(0x0000, 0x1000, self.chr_bank0 as usize);
            self.mem.map_chr(0x1000, 0x1000, self.chr_bank1 as usize);
        } else {
            self.mem.map_chr(0x0000, 0x2000, (self.chr_bank0 >> 1) as usize);
        }

        let ram_enabled = self.mmc1a || self.prg_bank & 0x10 == 0;
        if ram_enabled {
            // SXROM uses CHR bank bits 2-3 for the 8 KiB RAM bank, SOROM bit 3
            let ram_bank = if self.mem.prg_ram.len() > 0x4000 {
                (self.chr_bank0 >> 2) & 0x03
            } else {
                (self.chr_bank0 >> 3) & 0x01
            };
            self.mem.map_prg_ram(0x6000, ram_bank as usize);
        } else {
            self.mem.unmap_prg(0x6000, 0x2000);
        }
    }
}

impl Mapper for Mmc1 {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x6000..=0x7FFF => self.mem.write_mapped(addr, value),
            0x8000..=0xFFFF => self.serial_write(addr, value),
            _ => {}
        }
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        self.mem.write_mapped(addr, value);
    }

    fn mirroring(&self) -> Mirroring {
        match self.control & 0x03 {
            0 => Mirroring::Single0,
            1 => Mirroring::Single1,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        }
    }

    fn reset(&mut self, soft: bool) {
        if !soft {
            self.control = 0x0C;
            self.chr_bank0 = 0;
            self.chr_bank1 = 0;
            self.prg_bank = 0;
        }
        self.shift_reg = 0x10;
        self.shift_count = 0;
        self.control |= 0x0C;
        self.last_write_cycle = None;
        self.update_banks();
    }

    fn clock_cpu(&mut self) {
        self.cpu_cycle = self.cpu_cycle.wrapping_add(1);
    }
}

impl Snapshotable for Mmc1 {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write("shiftRegister", self.shift_reg);
        s.write("shiftCount", self.shift_count);
        s.write("control", self.control);
        s.write("chrBank0", self.chr_bank0);
        s.write("chrBank1", self.chr_bank1);
        s.write("prgBank", self.prg_bank);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        self.shift_reg = s.read_or("shiftRegister", 0x10);
        self.shift_count = s.read::<u8>("shiftCount").min(4);
        self.control = s.read_or("control", 0x0C);
        self.chr_bank0 = s.read("chrBank0");
        self.chr_bank1 = s.read("chrBank1");
        self.prg_bank = s.read("prgBank");
        self.last_write_cycle = None;
        self.update_banks();
    }
}
