use log::{info, warn};

use crate::nes::cartridge::database::{GameDatabase, apply_overrides};
use crate::nes::cartridge::discrete::{LatchBoard, LatchKind};
use crate::nes::cartridge::mapper000_nrom::Nrom;
use crate::nes::cartridge::mapper001_mmc1::Mmc1;
use crate::nes::cartridge::mapper002_ux_rom::UxRom;
use crate::nes::cartridge::mapper003_cn_rom::CnRom;
use crate::nes::cartridge::mapper004_mmc3::{Mmc3, Mmc3Variant};
use crate::nes::cartridge::mapper009_mmc2::{Mmc2, Mmc2Variant};
use crate::nes::cartridge::mapper013_cp_rom::CpRom;
use crate::nes::cartridge::mapper021_vrc2_4::Vrc2And4;
use crate::nes::cartridge::mapper034_bnrom::Mapper034;
use crate::nes::cartridge::mapper069_fme7::Fme7;
use crate::nes::cartridge::mapper071_camerica::Camerica;
use crate::nes::cartridge::mapper075_vrc1::Vrc1;
use crate::nes::cartridge::mapper206_namco108::Namco108;
use crate::nes::cartridge::memory::{CartridgeMemory, Source};
use crate::nes::cartridge::rom::{Mirroring, Rom, RomError};
use crate::nes::ppu::PpuBusInterface;
use crate::nes::region::Region;
use crate::nes::snapshot::{Snapshot, Snapshotable};

pub mod database;
pub mod discrete;
pub mod irq;
pub mod mapper000_nrom;
pub mod mapper001_mmc1;
pub mod mapper002_ux_rom;
pub mod mapper003_cn_rom;
pub mod mapper004_mmc3;
pub mod mapper009_mmc2;
pub mod mapper013_cp_rom;
pub mod mapper021_vrc2_4;
pub mod mapper034_bnrom;
pub mod mapper069_fme7;
pub mod mapper071_camerica;
pub mod mapper075_vrc1;
pub mod mapper206_namco108;
pub mod memory;
pub mod rom;

/// Behavior shared by every cartridge board.
pub trait Mapper: Snapshotable {
    fn memory(&self) -> &CartridgeMemory;

    /// Resolves CPU $4020-$FFFF or PPU $0000-$1FFF to a chip and offset.
    /// The two ranges don't overlap, so one decoder covers both buses.
    fn map_read(&self, addr: u16) -> (Source, usize) {
        self.memory().map(addr)
    }

    /// CPU write to $4020-$FFFF: bank registers and PRG-RAM.
    fn map_write(&mut self, addr: u16, value: u8);

    /// PPU write to pattern space. Only CHR-RAM keeps it.
    fn chr_write(&mut self, addr: u16, value: u8);

    fn mirroring(&self) -> Mirroring;

    fn reset(&mut self, _soft: bool) {}

    /// Once per CPU cycle, before the CPU's bus access.
    fn clock_cpu(&mut self) {}

    /// Every address the PPU drives, for A12-clocked counters.
    fn notify_vram_address(&mut self, _addr: u16, _ppu_cycle: u64) {}

    /// After a pattern fetch, for boards that latch on the tile read.
    fn chr_read_done(&mut self, _addr: u16) {}

    fn irq_line(&self) -> bool {
        false
    }
}

macro_rules! boards {
    ($($variant:ident($board:ty)),* $(,)?) => {
        /// Every supported circuit board.
        pub enum Board {
            $($variant($board)),*
        }

        impl Board {
            fn mapper(&self) -> &dyn Mapper {
                match self {
                    $(Board::$variant(board) => board),*
                }
            }

            fn mapper_mut(&mut self) -> &mut dyn Mapper {
                match self {
                    $(Board::$variant(board) => board),*
                }
            }

            fn memory_mut(&mut self) -> &mut CartridgeMemory {
                match self {
                    $(Board::$variant(board) => &mut board.mem),*
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Board::$variant(_) => stringify!($variant)),*
                }
            }
        }

        impl Snapshotable for Board {
            fn save(&self, s: &mut Snapshot) {
                match self {
                    $(Board::$variant(board) => board.save(s)),*
                }
            }

            fn restore(&mut self, s: &Snapshot) {
                match self {
                    $(Board::$variant(board) => board.restore(s)),*
                }
            }
        }
    };
}

boards! {
    Nrom(Nrom),
    Mmc1(Mmc1),
    UxRom(UxRom),
    CnRom(CnRom),
    Mmc3(Mmc3),
    Mmc2(Mmc2),
    CpRom(CpRom),
    Vrc2And4(Vrc2And4),
    Mapper034(Mapper034),
    Fme7(Fme7),
    Camerica(Camerica),
    Vrc1(Vrc1),
    Namco108(Namco108),
    Latch(LatchBoard),
}

impl Board {
    /// Picks the board for a mapper/submapper pair.
    pub fn new(rom: &Rom) -> Result<Board, RomError> {
        let header = &rom.header;
        let latch = |kind: LatchKind| -> Result<Board, RomError> {
            Ok(Board::Latch(LatchBoard::new(rom, kind)))
        };
        match header.mapper {
            0 => Ok(Board::Nrom(Nrom::new(rom))),
            1 => Ok(Board::Mmc1(Mmc1::new(rom, false))),
            155 => Ok(Board::Mmc1(Mmc1::new(rom, true))),
            2 => Ok(Board::UxRom(UxRom::new(rom))),
            3 => Ok(Board::CnRom(CnRom::new(rom))),
            4 if header.submapper == 4 => Ok(Board::Mmc3(Mmc3::new(rom, Mmc3Variant::Mmc3A))),
            4 => Ok(Board::Mmc3(Mmc3::new(rom, Mmc3Variant::Mmc3))),
            118 => Ok(Board::Mmc3(Mmc3::new(rom, Mmc3Variant::TxSrom))),
            7 => latch(LatchKind::AxRom),
            9 => Ok(Board::Mmc2(Mmc2::new(rom, Mmc2Variant::Mmc2))),
            10 => Ok(Board::Mmc2(Mmc2::new(rom, Mmc2Variant::Mmc4))),
            11 => latch(LatchKind::ColorDreams),
            13 => Ok(Board::CpRom(CpRom::new(rom))),
            21 | 22 | 23 | 25 => Ok(Board::Vrc2And4(Vrc2And4::new(rom))),
            34 => Ok(Board::Mapper034(Mapper034::new(rom))),
            66 => latch(LatchKind::GxRom),
            69 => Ok(Board::Fme7(Fme7::new(rom))),
            70 => latch(LatchKind::Bandai74161),
            152 => latch(LatchKind::Bandai74161SingleScreen),
            71 => Ok(Board::Camerica(Camerica::new(rom))),
            75 => Ok(Board::Vrc1(Vrc1::new(rom))),
            78 => latch(LatchKind::Irem74161),
            79 => latch(LatchKind::Nina03),
            87 => latch(LatchKind::Jaleco87),
            93 => latch(LatchKind::Sunsoft2),
            94 => latch(LatchKind::Un1Rom),
            140 => latch(LatchKind::Jaleco140),
            180 => latch(LatchKind::Unrom180),
            184 => latch(LatchKind::Sunsoft1),
            206 => Ok(Board::Namco108(Namco108::new(rom))),
            mapper => Err(RomError::UnsupportedMapper {
                mapper,
                submapper: header.submapper,
            }),
        }
    }
}

/// A loaded cartridge: the board plus what the header said about it.
pub struct Cartridge {
    board: Board,
    mapper_id: u16,
    submapper: u8,
    region: Option<Region>,
    has_battery: bool,
    sha1: String,
}

impl Cartridge {
    /// Parses an iNES / NES 2.0 image, applies database overrides and builds
    /// the board. Nothing is retained on error.
    pub fn load(raw: &[u8], db: Option<&dyn GameDatabase>) -> Result<Cartridge, RomError> {
        let mut rom = Rom::parse(raw)?;
        if let Some(db) = db {
            apply_overrides(&mut rom, db)?;
        }
        Self::from_rom(rom)
    }

    pub fn from_rom(rom: Rom) -> Result<Cartridge, RomError> {
        let board = Board::new(&rom)?;
        let header = &rom.header;
        info!(
            "Cartridge board {} (mapper {}.{}), battery={}",
            board.name(),
            header.mapper,
            header.submapper,
            header.has_battery
        );
        Ok(Cartridge {
            board,
            mapper_id: header.mapper,
            submapper: header.submapper,
            region: header.region,
            has_battery: header.has_battery,
            sha1: rom.sha1,
        })
    }

    pub fn mapper_id(&self) -> u16 {
        self.mapper_id
    }

    pub fn submapper(&self) -> u8 {
        self.submapper
    }

    /// Region declared by the header or database, if any.
    pub fn region(&self) -> Option<Region> {
        self.region
    }

    /// SHA-1 of PRG+CHR; keys battery saves and save states.
    pub fn sha1(&self) -> &str {
        &self.sha1
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Returns None for open bus.
    pub fn cpu_read(&mut self, addr: u16) -> Option<u8> {
        self.peek(addr)
    }

    /// CPU-side read without side effects.
    pub fn peek(&self, addr: u16) -> Option<u8> {
        let mapper = self.board.mapper();
        let (source, offset) = mapper.map_read(addr);
        mapper.memory().read(source, offset)
    }

    pub fn cpu_write(&mut self, addr: u16, value: u8) {
        self.board.mapper_mut().map_write(addr, value);
    }

    pub fn clock_cpu(&mut self) {
        self.board.mapper_mut().clock_cpu();
    }

    pub fn irq_line(&self) -> bool {
        self.board.mapper().irq_line()
    }

    pub fn reset(&mut self, soft: bool) {
        self.board.mapper_mut().reset(soft);
    }

    pub fn has_battery(&self) -> bool {
        self.has_battery
    }

    /// Battery-backed PRG-RAM, if the board has any.
    pub fn battery_ram(&self) -> Option<&[u8]> {
        let memory = self.board.mapper().memory();
        if !self.has_battery || memory.battery_size == 0 {
            return None;
        }
        Some(&memory.prg_ram[..memory.battery_size.min(memory.prg_ram.len())])
    }

    /// Restores battery RAM. A blob of the wrong size is ignored.
    pub fn load_battery_ram(&mut self, data: &[u8]) -> bool {
        let Some(expected) = self.battery_ram().map(<[u8]>::len) else {
            return false;
        };
        if data.len() != expected {
            warn!(
                "Battery RAM is {} bytes, expected {expected}; ignoring it",
                data.len()
            );
            return false;
        }
        let memory = self.board.memory_mut();
        memory.prg_ram[..expected].copy_from_slice(data);
        true
    }
}

impl PpuBusInterface for Cartridge {
    fn ppu_bus_read(&mut self, addr: u16) -> u8 {
        let value = self.chr_peek(addr);
        self.board.mapper_mut().chr_read_done(addr);
        value
    }

    fn ppu_bus_write(&mut self, addr: u16, value: u8) {
        self.board.mapper_mut().chr_write(addr & 0x1FFF, value);
    }

    fn mirroring(&self) -> Mirroring {
        self.board.mapper().mirroring()
    }

    fn notify_vram_address(&mut self, addr: u16, ppu_cycle: u64) {
        self.board.mapper_mut().notify_vram_address(addr, ppu_cycle);
    }

    fn chr_peek(&self, addr: u16) -> u8 {
        let mapper = self.board.mapper();
        let (source, offset) = mapper.map_read(addr & 0x1FFF);
        mapper.memory().read(source, offset).unwrap_or(0)
    }
}

impl Snapshotable for Cartridge {
    fn save(&self, s: &mut Snapshot) {
        s.write("mapper", self.mapper_id);
        s.write("submapper", self.submapper);
        s.write_snapshot("board", &self.board);
    }

    fn restore(&mut self, s: &Snapshot) {
        if s.read::<u16>("mapper") != self.mapper_id {
            warn!("Snapshot was taken with a different mapper, board state not restored");
            return;
        }
        s.restore_nested("board", &mut self.board);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cartridge::database::{GameInfo, InMemoryGameDatabase};
    use crate::nes::cartridge::rom::test_rom::ines;

    #[test]
    fn every_catalogued_mapper_builds() {
        let ids = [
            0, 1, 2, 3, 4, 7, 9, 10, 11, 13, 21, 22, 23, 25, 34, 66, 69, 70, 71, 75, 78, 79, 87, 93,
            94, 118, 140, 152, 155, 180, 184, 206,
        ];
        for id in ids {
            let rom = Rom::new_custom(vec![0; 0x20000], vec![0; 0x8000], id, Mirroring::Vertical);
            let cart = Cartridge::from_rom(rom);
            assert!(cart.is_ok(), "mapper {id}");
        }
    }

    #[test]
    fn unknown_mapper_is_fatal() {
        let rom = Rom::new_custom(vec![0; 0x8000], vec![0; 0x2000], 5, Mirroring::Vertical);
        assert!(matches!(
            Cartridge::from_rom(rom).err(),
            Some(RomError::UnsupportedMapper { mapper: 5, submapper: 0 })
        ));
    }

    #[test]
    fn database_picks_the_board() {
        let raw = ines(2, 1, 5, 0);
        let rom = Rom::parse(&raw).unwrap();
        let mut db = InMemoryGameDatabase::new();
        db.insert(&rom.prg_sha1(), GameInfo::new(66, 0));

        let cart = Cartridge::load(&raw, Some(&db)).unwrap();
        assert_eq!(cart.mapper_id(), 66);
        assert_eq!(cart.board().name(), "Latch");
    }

    #[test]
    fn battery_ram_round_trip() {
        let raw = ines(2, 1, 0, 0b0010);
        let mut cart = Cartridge::load(&raw, None).unwrap();
        cart.cpu_write(0x6000, 0x42);
        let saved = cart.battery_ram().unwrap().to_vec();
        assert_eq!(saved.len(), 0x2000);
        assert_eq!(saved[0], 0x42);

        let mut fresh = Cartridge::load(&raw, None).unwrap();
        assert!(!fresh.load_battery_ram(&saved[..16]));
        assert!(fresh.load_battery_ram(&saved));
        assert_eq!(fresh.cpu_read(0x6000), Some(0x42));
    }

    #[test]
    fn no_battery_means_no_battery_ram() {
        let cart = Cartridge::load(&ines(1, 1, 0, 0), None).unwrap();
        assert!(cart.battery_ram().is_none());
    }

    #[test]
    fn ppu_side_reads_chr() {
        let mut cart = Cartridge::load(&ines(1, 1, 0, 0), None).unwrap();
        assert_eq!(cart.ppu_bus_read(0x0123), 0x80);
        cart.ppu_bus_write(0x0123, 0x00);
        assert_eq!(cart.chr_peek(0x0123), 0x80);
    }
}
