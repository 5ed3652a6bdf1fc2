//! Boards built from a single 74-series latch: one write selects PRG and/or
//! CHR banks and sometimes single-screen mirroring.

use super::Mapper;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchKind {
    /// 7: 32K PRG, single screen by bit 4
    AxRom,
    /// 11
    ColorDreams,
    /// 66
    GxRom,
    /// 70
    Bandai74161,
    /// 152
    Bandai74161SingleScreen,
    /// 78, Cosmo Carrier or Holy Diver wiring
    Irem74161,
    /// 79, register in the $4100 range
    Nina03,
    /// 87, register at $6000-$7FFF with swapped CHR bits
    Jaleco87,
    /// 93
    Sunsoft2,
    /// 94
    Un1Rom,
    /// 140
    Jaleco140,
    /// 180, fixed first bank and switchable $C000
    Unrom180,
    /// 184, two 4K CHR banks
    Sunsoft1,
}

impl LatchKind {
    fn register_in_work_ram(self) -> bool {
        matches!(self, LatchKind::Jaleco87 | LatchKind::Jaleco140 | LatchKind::Sunsoft1)
    }

    fn decodes(self, addr: u16) -> bool {
        match self {
            LatchKind::Nina03 => (addr & 0xE100) == 0x4100,
            kind if kind.register_in_work_ram() => (0x6000..=0x7FFF).contains(&addr),
            _ => addr >= 0x8000,
        }
    }
}

#[derive(Debug)]
pub struct LatchBoard {
    pub(crate) mem: CartridgeMemory,
    kind: LatchKind,
    header_mirroring: Mirroring,
    bus_conflicts: bool,
    holy_diver: bool,
    latch: u8,
}

impl LatchBoard {
    pub fn new(rom: &Rom, kind: LatchKind) -> Self {
        let mut board = LatchBoard {
            mem: CartridgeMemory::new(rom),
            kind,
            header_mirroring: rom.header.mirroring,
            bus_conflicts: rom.header.submapper == 2,
            holy_diver: rom.header.submapper == 3,
            latch: 0,
        };
        if kind.register_in_work_ram() || kind == LatchKind::Nina03 {
            board.mem.unmap_prg(0x6000, 0x2000);
        }
        board.apply();
        board
    }

    pub fn kind(&self) -> LatchKind {
        self.kind
    }

    fn apply(&mut self) {
        let v = self.latch as usize;
        let mem = &mut self.mem;
        match self.kind {
            LatchKind::AxRom => mem.map_prg(0x8000, 0x8000, v & 0x07),
            LatchKind::ColorDreams => {
                mem.map_prg(0x8000, 0x8000, v & 0x03);
                mem.map_chr(0x0000, 0x2000, v >> 4);
            }
            LatchKind::GxRom => {
                mem.map_prg(0x8000, 0x8000, (v >> 4) & 0x03);
                mem.map_chr(0x0000, 0x2000, v & 0x03);
            }
            LatchKind::Bandai74161 => {
                mem.map_prg(0x8000, 0x4000, v >> 4);
                mem.map_prg_last(0xC000, 0x4000);
                mem.map_chr(0x0000, 0x2000, v & 0x0F);
            }
            LatchKind::Bandai74161SingleScreen => {
                mem.map_prg(0x8000, 0x4000, (v >> 4) & 0x07);
                mem.map_prg_last(0xC000, 0x4000);
                mem.map_chr(0x0000, 0x2000, v & 0x0F);
            }
            LatchKind::Irem74161 => {
                mem.map_prg(0x8000, 0x4000, v & 0x07);
                mem.map_prg_last(0xC000, 0x4000);
                mem.map_chr(0x0000, 0x2000, v >> 4);
            }
            LatchKind::Nina03 => {
                mem.map_prg(0x8000, 0x8000, (v >> 3) & 0x01);
                mem.map_chr(0x0000, 0x2000, v & 0x07);
            }
            LatchKind::Jaleco87 => {
                mem.map_prg(0x8000, 0x8000, 0);
                mem.map_chr(0x0000, 0x2000, ((v & 0x01) << 1) | ((v >> 1) & 0x01));
            }
            LatchKind::Sunsoft2 => {
                mem.map_prg(0x8000, 0x4000, (v >> 4) & 0x07);
                mem.map_prg_last(0xC000, 0x4000);
            }
            LatchKind::Un1Rom => {
                mem.map_prg(0x8000, 0x4000, (v >> 2) & 0x07);
                mem.map_prg_last(0xC000, 0x4000);
            }
            LatchKind::Jaleco140 => {
                mem.map_prg(0x8000, 0x8000, (v >> 4) & 0x03);
                mem.map_chr(0x0000, 0x2000, v & 0x0F);
            }
            LatchKind::Unrom180 => {
                mem.map_prg(0x8000, 0x4000, 0);
                mem.map_prg(0xC000, 0x4000, v & 0x07);
            }
            LatchKind::Sunsoft1 => {
                mem.map_chr(0x0000, 0x1000, v & 0x07);
                mem.map_chr(0x1000, 0x1000, 0x04 | ((v >> 4) & 0x03));
            }
        }
    }
}

impl Mapper for LatchBoard {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        if !self.kind.decodes(addr) {
            self.mem.write_mapped(addr, value);
            return;
        }
        self.latch = if self.bus_conflicts && addr >= 0x8000 {
            self.mem.bus_conflict(addr, value)
        } else {
            value
        };
        self.apply();
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        self.mem.write_mapped(addr, value);
    }

    fn mirroring(&self) -> Mirroring {
        let single = |high: bool| if high { Mirroring::Single1 } else { Mirroring::Single0 };
        match self.kind {
            LatchKind::AxRom => single(self.latch & 0x10 != 0),
            LatchKind::Bandai74161SingleScreen => single(self.latch & 0x80 != 0),
            LatchKind::Irem74161 if self.holy_diver => {
                if self.latch & 0x08 != 0 {
                    Mirroring::Vertical
                } else {
                    Mirroring::Horizontal
                }
            }
            LatchKind::Irem74161 => single(self.latch & 0x08 != 0),
            _ => self.header_mirroring,
        }
    }

    fn reset(&mut self, soft: bool) {
        if !soft {
            self.latch = 0;
            self.apply();
        }
    }
}

impl Snapshotable for LatchBoard {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write("latch", self.latch);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        self.latch = s.read("latch");
        self.apply();
    }
}
