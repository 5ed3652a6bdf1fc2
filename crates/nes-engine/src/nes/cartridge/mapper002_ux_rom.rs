use super::Mapper;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

/// Switchable 16 KiB bank at $8000, last bank fixed at $C000.
#[derive(Debug)]
pub struct UxRom {
    pub(crate) mem: CartridgeMemory,
    mirroring: Mirroring,
    bus_conflicts: bool,
    bank_select: u8,
}

impl UxRom {
    pub fn new(rom: &Rom) -> UxRom {
        let mut cart = UxRom {
            mem: CartridgeMemory::new(rom),
            mirroring: rom.header.mirroring,
            bus_conflicts: rom.header.submapper == 2,
            bank_select: 0,
        };
        cart.update_banks();
        cart
    }

    fn update_banks(&mut self) {
        self.mem.map_prg(0x8000, 0x4000, self.bank_select as usize);
        self.mem.map_prg_last(0xC000, 0x4000);
    }
}

impl Mapper for UxRom {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x8000..=0xFFFF => {
                self.bank_select = if self.bus_conflicts {
                    self.mem.bus_conflict(addr, value)
                } else {
                    value
                };
                self.update_banks();
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
            self.bank_select = 0;
            self.update_banks();
        }
    }
}

impl Snapshotable for UxRom {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write("bankSelect", self.bank_select);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        self.bank_select = s.read("bankSelect");
        self.update_banks();
    }
}
