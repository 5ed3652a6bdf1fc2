//! Konami VRC2 and VRC4 (mappers 21, 22, 23 and 25).
//!
//! Every variant has the same register file. Boards differ in which CPU
//! address lines feed the chip's A0/A1 register-select pins; without a
//! submapper both candidate lines are ORed together.

use log::debug;

use super::Mapper;
use crate::nes::cartridge::irq::VrcIrq;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

#[derive(Debug)]
pub struct Vrc2And4 {
    pub(crate) mem: CartridgeMemory,
    /// CPU address bits wired to register select A0 and A1
    a0_mask: u16,
    a1_mask: u16,
    vrc2: bool,
    /// VRC2a drops the low CHR bank bit
    chr_shift: u8,

    prg_banks: [u8; 2],
    prg_swap: bool,
    chr_banks: [u16; 8],
    mirroring: u8,
    irq: VrcIrq,
}

impl Vrc2And4 {
    pub fn new(rom: &Rom) -> Self {
        let (mapper, submapper) = (rom.header.mapper, rom.header.submapper);
        let (a0_mask, a1_mask) = match (mapper, submapper) {
            (21, 1) => (0x02, 0x04),
            (21, 2) => (0x40, 0x80),
            (21, _) => (0x42, 0x84),
            (22, _) => (0x02, 0x01),
            (23, 1) | (23, 3) => (0x01, 0x02),
            (23, 2) => (0x04, 0x08),
            (23, _) => (0x05, 0x0A),
            (25, 1) | (25, 3) => (0x02, 0x01),
            (25, 2) => (0x08, 0x04),
            _ => (0x0A, 0x05),
        };
        let vrc2 = mapper == 22 || (matches!(mapper, 23 | 25) && submapper == 3);

        let mut cart = Vrc2And4 {
            mem: CartridgeMemory::new(rom),
            a0_mask,
            a1_mask,
            vrc2,
            chr_shift: if mapper == 22 { 1 } else { 0 },
            prg_banks: [0, 0],
            prg_swap: false,
            chr_banks: [0; 8],
            mirroring: 0,
            irq: VrcIrq::new(),
        };
        cart.update_banks();
        cart
    }

    /// Folds the board's wiring back to a register index 0-3.
    fn register(&self, addr: u16) -> u16 {
        let a0 = (addr & self.a0_mask != 0) as u16;
        let a1 = (addr & self.a1_mask != 0) as u16;
        (addr & 0xF000) | (a1 << 1) | a0
    }

    fn update_banks(&mut self) {
        let second_last = self.mem.prg_bank_count(0x2000) - 2;
        let (bank_8000, bank_c000) = if self.prg_swap {
            (second_last, self.prg_banks[0] as usize)
        } else {
            (self.prg_banks[0] as usize, second_last)
        };
        self.mem.map_prg(0x8000, 0x2000, bank_8000);
        self.mem.map_prg(0xA000, 0x2000, self.prg_banks[1] as usize);
        self.mem.map_prg(0xC000, 0x2000, bank_c000);
        self.mem.map_prg_last(0xE000, 0x2000);

        for (i, bank) in self.chr_banks.iter().enumerate() {
            let bank = (*bank >> self.chr_shift) as usize;
            self.mem.map_chr(i as u16 * 0x400, 0x400, bank);
        }
    }

    fn write_chr_nibble(&mut self, reg: u16, value: u8) {
        // $B000-$E003: two registers per page, low nibble then high bits
        let page = ((reg >> 12) - 0xB) as usize;
        let index = page * 2 + ((reg >> 1) & 1) as usize;
        let bank = &mut self.chr_banks[index];
        if reg & 1 == 0 {
            *bank = (*bank & 0x1F0) | (value & 0x0F) as u16;
        } else {
            *bank = (*bank & 0x00F) | ((value & 0x1F) as u16) << 4;
        }
    }
}

impl Mapper for Vrc2And4 {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        if addr < 0x8000 {
            self.mem.write_mapped(addr, value);
            return;
        }

        let reg = self.register(addr);
        match reg {
            0x8000..=0x8003 => self.prg_banks[0] = value & 0x1F,
            0x9000..=0x9001 if self.vrc2 => self.mirroring = value & 0x01,
            0x9000 => self.mirroring = value & 0x03,
            0x9002 if !self.vrc2 => self.prg_swap = value & 0x02 != 0,
            0x9001 | 0x9003 => {}
            0xA000..=0xA003 => self.prg_banks[1] = value & 0x1F,
            0xB000..=0xE003 => self.write_chr_nibble(reg, value),
            0xF000 if !self.vrc2 => self.irq.write_latch_low(value),
            0xF001 if !self.vrc2 => self.irq.write_latch_high(value),
            0xF002 if !self.vrc2 => self.irq.write_control(value),
            0xF003 if !self.vrc2 => self.irq.acknowledge(),
            _ => return,
        }
        debug!("VRC register ${reg:04X} = {value:#04X}");
        self.update_banks();
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        self.mem.write_mapped(addr, value);
    }

    fn mirroring(&self) -> Mirroring {
        match self.mirroring {
            0 => Mirroring::Vertical,
            1 => Mirroring::Horizontal,
            2 => Mirroring::Single0,
            _ => Mirroring::Single1,
        }
    }

    fn reset(&mut self, soft: bool) {
        if !soft {
            self.prg_banks = [0, 0];
            self.prg_swap = false;
            self.chr_banks = [0; 8];
            self.mirroring = 0;
            self.irq = VrcIrq::new();
            self.update_banks();
        }
    }

    fn clock_cpu(&mut self) {
        self.irq.clock();
    }

    fn irq_line(&self) -> bool {
        self.irq.pending()
    }
}

impl Snapshotable for Vrc2And4 {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write_bytes("prgBanks", &self.prg_banks);
        s.write("prgSwap", self.prg_swap);
        s.write("chrBanks", self.chr_banks.to_vec());
        s.write("mirroring", self.mirroring);
        s.write_snapshot("irq", &self.irq);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        s.read_bytes_into("prgBanks", &mut self.prg_banks);
        self.prg_swap = s.read("prgSwap");
        let chr: Vec<u16> = s.read("chrBanks");
        for (dest, bank) in self.chr_banks.iter_mut().zip(chr) {
            *dest = bank;
        }
        self.mirroring = s.read("mirroring");
        s.restore_nested("irq", &mut self.irq);
        self.update_banks();
    }
}
