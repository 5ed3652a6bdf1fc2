//! Bank windows shared by every board.
//!
//! The CPU side is split into five 8 KiB windows ($6000-$FFFF) and the PPU
//! pattern space into eight 1 KiB windows ($0000-$1FFF). Boards only move
//! windows around; reads and writes resolve through [`CartridgeMemory::map`].

use crate::nes::cartridge::rom::{Rom, TRAINER_ADDR};
use crate::nes::snapshot::{Ordinal, Snapshot, Snapshotable};

const PRG_WINDOW: usize = 0x2000;
const CHR_WINDOW: usize = 0x0400;
const PRG_WINDOWS: usize = 5;
const CHR_WINDOWS: usize = 8;

/// Which memory chip an address resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Source {
    PrgRom,
    PrgRam,
    ChrRom,
    ChrRam,
    #[default]
    OpenBus,
}

impl Ordinal for Source {
    fn ordinal(&self) -> u8 {
        match self {
            Source::PrgRom => 0,
            Source::PrgRam => 1,
            Source::ChrRom => 2,
            Source::ChrRam => 3,
            Source::OpenBus => 4,
        }
    }

    fn from_ordinal(ordinal: u8) -> Option<Self> {
        Some(match ordinal {
            0 => Source::PrgRom,
            1 => Source::PrgRam,
            2 => Source::ChrRom,
            3 => Source::ChrRam,
            4 => Source::OpenBus,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Window {
    source: Source,
    base: usize,
    writable: bool,
}

#[derive(Debug, Clone)]
pub struct CartridgeMemory {
    pub prg_rom: Vec<u8>,
    pub chr_rom: Vec<u8>,
    pub chr_ram: Vec<u8>,
    pub prg_ram: Vec<u8>,
    /// Leading bytes of `prg_ram` that survive power-off
    pub battery_size: usize,
    prg_windows: [Window; PRG_WINDOWS],
    chr_windows: [Window; CHR_WINDOWS],
}

impl CartridgeMemory {
    pub fn new(rom: &Rom) -> Self {
        let header = &rom.header;
        let mut prg_ram = vec![0u8; header.work_ram_size()];
        if let Some(trainer) = &rom.trainer {
            let offset = (TRAINER_ADDR - 0x6000) as usize;
            if prg_ram.len() < offset + trainer.len() {
                prg_ram.resize(PRG_WINDOW, 0);
            }
            prg_ram[offset..offset + trainer.len()].copy_from_slice(trainer);
        }

        let chr_ram_size = if rom.chr_rom.is_empty() {
            header.chr_ram_size.max(PRG_WINDOW)
        } else {
            header.chr_ram_size
        };

        let mut memory = CartridgeMemory {
            prg_rom: rom.prg_rom.clone(),
            chr_rom: rom.chr_rom.clone(),
            chr_ram: vec![0u8; chr_ram_size],
            prg_ram,
            battery_size: if header.has_battery { header.work_ram_size() } else { 0 },
            prg_windows: [Window::default(); PRG_WINDOWS],
            chr_windows: [Window::default(); CHR_WINDOWS],
        };
        memory.map_prg_ram(0x6000, 0);
        memory.map_prg(0x8000, 0x8000, 0);
        memory.map_chr(0x0000, 0x2000, 0);
        memory
    }

    pub fn has_chr_ram(&self) -> bool {
        self.chr_rom.is_empty()
    }

    /// Number of `size`-byte PRG-ROM banks, at least one.
    pub fn prg_bank_count(&self, size: usize) -> usize {
        (self.prg_rom.len() / size).max(1)
    }

    pub fn chr_bank_count(&self, size: usize) -> usize {
        let len = if self.has_chr_ram() {
            self.chr_ram.len()
        } else {
            self.chr_rom.len()
        };
        (len / size).max(1)
    }

    /// Maps PRG-ROM bank `bank` (in units of `size`) at `addr`.
    pub fn map_prg(&mut self, addr: u16, size: usize, bank: usize) {
        let bank = bank % self.prg_bank_count(size);
        self.set_prg_windows(addr, size, Source::PrgRom, bank * size, false);
    }

    /// Maps the last `size`-byte PRG-ROM bank at `addr`.
    pub fn map_prg_last(&mut self, addr: u16, size: usize) {
        let last = self.prg_bank_count(size) - 1;
        self.map_prg(addr, size, last);
    }

    /// Maps an 8 KiB PRG-RAM bank at `addr`, open bus if the board has none.
    pub fn map_prg_ram(&mut self, addr: u16, bank: usize) {
        if self.prg_ram.is_empty() {
            self.unmap_prg(addr, PRG_WINDOW);
            return;
        }
        let banks = (self.prg_ram.len() / PRG_WINDOW).max(1);
        let base = (bank % banks) * PRG_WINDOW;
        self.set_prg_windows(addr, PRG_WINDOW, Source::PrgRam, base, true);
    }

    pub fn unmap_prg(&mut self, addr: u16, size: usize) {
        self.set_prg_windows(addr, size, Source::OpenBus, 0, false);
    }

    /// Write-protects a RAM window without unmapping it.
    pub fn set_prg_ram_writable(&mut self, addr: u16, writable: bool) {
        let window = &mut self.prg_windows[prg_slot(addr)];
        window.writable = writable && window.source == Source::PrgRam;
    }

    fn set_prg_windows(&mut self, addr: u16, size: usize, source: Source, base: usize, writable: bool) {
        let first = prg_slot(addr);
        let count = (size / PRG_WINDOW).max(1);
        for (i, window) in self.prg_windows[first..].iter_mut().take(count).enumerate() {
            *window = Window {
                source,
                base: base + i * PRG_WINDOW,
                writable,
            };
        }
    }

    /// Maps CHR bank `bank` (in units of `size`) at pattern address `addr`.
    pub fn map_chr(&mut self, addr: u16, size: usize, bank: usize) {
        let bank = bank % self.chr_bank_count(size);
        let (source, writable) = if self.has_chr_ram() {
            (Source::ChrRam, true)
        } else {
            (Source::ChrRom, false)
        };
        let first = (addr as usize & 0x1FFF) / CHR_WINDOW;
        let count = (size / CHR_WINDOW).max(1);
        for (i, window) in self.chr_windows[first..].iter_mut().take(count).enumerate() {
            *window = Window {
                source,
                base: bank * size + i * CHR_WINDOW,
                writable,
            };
        }
    }

    /// Resolves a CPU ($6000-$FFFF) or PPU pattern ($0000-$1FFF) address.
    pub fn map(&self, addr: u16) -> (Source, usize) {
        match addr {
            0x0000..=0x1FFF => {
                let window = self.chr_windows[addr as usize / CHR_WINDOW];
                (window.source, window.base + (addr as usize % CHR_WINDOW))
            }
            0x6000..=0xFFFF => {
                let window = self.prg_windows[prg_slot(addr)];
                (window.source, window.base + (addr as usize % PRG_WINDOW))
            }
            _ => (Source::OpenBus, 0),
        }
    }

    pub fn read(&self, source: Source, offset: usize) -> Option<u8> {
        let chip = match source {
            Source::PrgRom => &self.prg_rom,
            Source::PrgRam => &self.prg_ram,
            Source::ChrRom => &self.chr_rom,
            Source::ChrRam => &self.chr_ram,
            Source::OpenBus => return None,
        };
        if chip.is_empty() {
            None
        } else {
            Some(chip[offset % chip.len()])
        }
    }

    pub fn read_mapped(&self, addr: u16) -> Option<u8> {
        let (source, offset) = self.map(addr);
        self.read(source, offset)
    }

    /// Value a discrete-logic latch sees when the ROM drives the bus too.
    pub fn bus_conflict(&self, addr: u16, value: u8) -> u8 {
        value & self.read_mapped(addr).unwrap_or(0xFF)
    }

    /// Writes through the window at `addr`; ROM and protected RAM ignore it.
    pub fn write_mapped(&mut self, addr: u16, value: u8) {
        let writable = match addr {
            0x0000..=0x1FFF => self.chr_windows[addr as usize / CHR_WINDOW].writable,
            0x6000..=0xFFFF => self.prg_windows[prg_slot(addr)].writable,
            _ => false,
        };
        if !writable {
            return;
        }
        let (source, offset) = self.map(addr);
        let chip = match source {
            Source::PrgRam => &mut self.prg_ram,
            Source::ChrRam => &mut self.chr_ram,
            _ => return,
        };
        if !chip.is_empty() {
            let len = chip.len();
            chip[offset % len] = value;
        }
    }
}

fn prg_slot(addr: u16) -> usize {
    (addr.max(0x6000) as usize - 0x6000) / PRG_WINDOW
}

impl Snapshotable for CartridgeMemory {
    fn save(&self, s: &mut Snapshot) {
        s.write_bytes("prgRam", &self.prg_ram);
        if self.has_chr_ram() {
            s.write_bytes("chrRam", &self.chr_ram);
        }
        let windows = self.prg_windows.iter().chain(self.chr_windows.iter());
        let (sources, bases): (Vec<u8>, Vec<u32>) =
            windows.clone().map(|w| (w.source.ordinal(), w.base as u32)).unzip();
        s.write("windowSources", sources);
        s.write("windowBases", bases);
        s.write("windowWritable", windows.map(|w| w.writable).collect::<Vec<bool>>());
    }

    fn restore(&mut self, s: &Snapshot) {
        s.read_bytes_into("prgRam", &mut self.prg_ram);
        if self.has_chr_ram() {
            s.read_bytes_into("chrRam", &mut self.chr_ram);
        }
        let sources: Vec<u8> = s.read("windowSources");
        let bases: Vec<u32> = s.read("windowBases");
        let writable: Vec<bool> = s.read("windowWritable");
        if sources.len() != PRG_WINDOWS + CHR_WINDOWS
            || bases.len() != sources.len()
            || writable.len() != sources.len()
        {
            return;
        }
        let windows = self.prg_windows.iter_mut().chain(self.chr_windows.iter_mut());
        for (i, window) in windows.enumerate() {
            *window = Window {
                source: Source::from_ordinal(sources[i]).unwrap_or_default(),
                base: bases[i] as usize,
                writable: writable[i],
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cartridge::rom::Mirroring;

    fn memory(prg_kb: usize, chr_kb: usize) -> CartridgeMemory {
        let prg = (0..prg_kb * 1024).map(|i| (i / 0x2000) as u8).collect();
        let chr = (0..chr_kb * 1024).map(|i| (i / 0x400) as u8).collect();
        CartridgeMemory::new(&Rom::new_custom(prg, chr, 0, Mirroring::Horizontal))
    }

    #[test]
    fn power_on_layout() {
        let mem = memory(32, 8);
        assert_eq!(mem.map(0x6000), (Source::PrgRam, 0));
        assert_eq!(mem.map(0x8000), (Source::PrgRom, 0));
        assert_eq!(mem.read_mapped(0xE000), Some(3));
        assert_eq!(mem.read_mapped(0x1C00), Some(7));
        assert_eq!(mem.map(0x5000).0, Source::OpenBus);
    }

    #[test]
    fn banks_wrap_and_last_bank() {
        let mut mem = memory(64, 8);
        mem.map_prg(0x8000, 0x2000, 9);
        assert_eq!(mem.read_mapped(0x8000), Some(1));
        mem.map_prg_last(0xC000, 0x4000);
        assert_eq!(mem.read_mapped(0xC000), Some(6));
        assert_eq!(mem.read_mapped(0xE000), Some(7));
    }

    #[test]
    fn chr_rom_is_read_only_chr_ram_is_not() {
        let mut mem = memory(16, 8);
        mem.write_mapped(0x0000, 0x55);
        assert_eq!(mem.read_mapped(0x0000), Some(0));

        let mut mem = memory(16, 0);
        assert!(mem.has_chr_ram());
        mem.map_chr(0x0000, 0x1000, 1);
        mem.write_mapped(0x0010, 0x55);
        assert_eq!(mem.chr_ram[0x1010], 0x55);
    }

    #[test]
    fn prg_ram_protect_and_open_bus() {
        let mut mem = memory(16, 8);
        mem.write_mapped(0x6001, 0x12);
        assert_eq!(mem.read_mapped(0x6001), Some(0x12));
        mem.set_prg_ram_writable(0x6000, false);
        mem.write_mapped(0x6001, 0x34);
        assert_eq!(mem.read_mapped(0x6001), Some(0x12));
        mem.unmap_prg(0x6000, 0x2000);
        assert_eq!(mem.read_mapped(0x6001), None);
    }

    #[test]
    fn snapshot_restores_windows() {
        let mut mem = memory(64, 32);
        mem.map_prg(0xA000, 0x2000, 5);
        mem.map_chr(0x0800, 0x0400, 17);
        mem.prg_ram[3] = 9;

        let mut other = memory(64, 32);
        other.restore(&mem.snapshot());
        assert_eq!(other.read_mapped(0xA000), Some(5));
        assert_eq!(other.read_mapped(0x0800), Some(17));
        assert_eq!(other.prg_ram[3], 9);
    }
}
