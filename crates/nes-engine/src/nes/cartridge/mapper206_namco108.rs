use super::Mapper;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

/// Namco 108 / DxROM: the MMC3's bank registers with fixed modes, hardwired
/// mirroring and no IRQ.
#[derive(Debug)]
pub struct Namco108 {
    pub(crate) mem: CartridgeMemory,
    mirroring: Mirroring,
    bank_select: u8,
    registers: [u8; 8],
}

impl Namco108 {
    pub fn new(rom: &Rom) -> Self {
        let mut cart = Namco108 {
            mem: CartridgeMemory::new(rom),
            mirroring: rom.header.mirroring,
            bank_select: 0,
            registers: [0, 2, 4, 5, 6, 7, 0, 1],
        };
        cart.mem.unmap_prg(0x6000, 0x2000);
        cart.update_banks();
        cart
    }

    fn update_banks(&mut self) {
        let r = self.registers;
        self.mem.map_chr(0x0000, 0x0800, (r[0] >> 1) as usize);
        self.mem.map_chr(0x0800, 0x0800, (r[1] >> 1) as usize);
        for (i, bank) in r[2..6].iter().enumerate() {
            self.mem.map_chr(0x1000 + i as u16 * 0x400, 0x400, *bank as usize);
        }
        self.mem.map_prg(0x8000, 0x2000, r[6] as usize);
        self.mem.map_prg(0xA000, 0x2000, r[7] as usize);
        self.mem.map_prg_last(0xC000, 0x4000);
    }
}

impl Mapper for Namco108 {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        if !(0x8000..=0x9FFF).contains(&addr) {
            return;
        }
        if addr & 1 == 0 {
            self.bank_select = value & 0x07;
        } else {
            let mask = if self.bank_select >= 6 { 0x0F } else { 0x3F };
            self.registers[self.bank_select as usize] = value & mask;
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
            self.bank_select = 0;
            self.registers = [0, 2, 4, 5, 6, 7, 0, 1];
            self.update_banks();
        }
    }
}

impl Snapshotable for Namco108 {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write("bankSelect", self.bank_select);
        s.write_bytes("registers", &self.registers);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        self.bank_select = s.read::<u8>("bankSelect") & 0x07;
        s.read_bytes_into("registers", &mut self.registers);
        self.update_banks();
    }
}
