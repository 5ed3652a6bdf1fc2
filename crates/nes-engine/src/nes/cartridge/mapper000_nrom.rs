use super::Mapper;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

/// No banking: 16 KiB (mirrored) or 32 KiB PRG, 8 KiB CHR.
#[derive(Debug)]
pub struct Nrom {
    pub(crate) mem: CartridgeMemory,
    mirroring: Mirroring,
}

impl Nrom {
    pub fn new(rom: &Rom) -> Nrom {
        Nrom {
            mem: CartridgeMemory::new(rom),
            mirroring: rom.header.mirroring,
        }
    }
}

impl Mapper for Nrom {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        self.mem.write_mapped(addr, value);
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        self.mem.write_mapped(addr, value);
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }
}

impl Snapshotable for Nrom {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
    }
}
