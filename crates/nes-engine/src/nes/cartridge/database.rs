//! Per-game overrides for ROMs whose headers can't be trusted.

use std::collections::HashMap;

use log::warn;

use crate::nes::cartridge::rom::{Mirroring, Rom, RomError};
use crate::nes::region::Region;

/// Known-good description of a cartridge board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameInfo {
    pub mapper: u16,
    pub submapper: u8,
    pub mirroring: Option<Mirroring>,
    pub region: Option<Region>,
    pub has_battery: Option<bool>,
    pub prg_ram_size: Option<usize>,
    pub chr_ram_size: Option<usize>,
    /// SHA-1 of the CHR-ROM this entry was recorded with
    pub chr_sha1: Option<String>,
}

impl GameInfo {
    pub fn new(mapper: u16, submapper: u8) -> Self {
        GameInfo {
            mapper,
            submapper,
            ..Default::default()
        }
    }
}

/// Lookup service keyed by the SHA-1 of the PRG-ROM.
pub trait GameDatabase {
    fn lookup(&self, prg_sha1: &str) -> Option<&GameInfo>;
}

#[derive(Debug, Default)]
pub struct InMemoryGameDatabase {
    entries: HashMap<String, GameInfo>,
}

impl InMemoryGameDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, prg_sha1: &str, info: GameInfo) {
        self.entries.insert(prg_sha1.to_ascii_lowercase(), info);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GameDatabase for InMemoryGameDatabase {
    fn lookup(&self, prg_sha1: &str) -> Option<&GameInfo> {
        self.entries.get(&prg_sha1.to_ascii_lowercase())
    }
}

/// Rewrites the header of `rom` from a database entry, if one exists.
pub fn apply_overrides(rom: &mut Rom, db: &dyn GameDatabase) -> Result<(), RomError> {
    let Some(info) = db.lookup(&rom.prg_sha1()) else {
        return Ok(());
    };

    if let Some(expected) = &info.chr_sha1 {
        let actual = rom.chr_sha1();
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(RomError::ChecksumMismatch {
                expected: expected.clone(),
                actual,
            });
        }
    }

    let header = &mut rom.header;
    if header.mapper != info.mapper || header.submapper != info.submapper {
        warn!(
            "Game database overrides mapper {}.{} with {}.{}",
            header.mapper, header.submapper, info.mapper, info.submapper
        );
    }
    header.mapper = info.mapper;
    header.submapper = info.submapper;
    if let Some(mirroring) = info.mirroring {
        header.mirroring = mirroring;
    }
    if let Some(region) = info.region {
        header.region = Some(region);
    }
    if let Some(has_battery) = info.has_battery {
        header.has_battery = has_battery;
    }
    if let Some(size) = info.prg_ram_size {
        if header.has_battery {
            header.prg_nvram_size = size;
            header.prg_ram_size = 0;
        } else {
            header.prg_ram_size = size;
            header.prg_nvram_size = 0;
        }
    }
    if let Some(size) = info.chr_ram_size {
        header.chr_ram_size = size;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cartridge::rom::test_rom::ines;

    #[test]
    fn entry_overrides_header() {
        let mut rom = Rom::parse(&ines(2, 1, 0, 0)).unwrap();
        let mut db = InMemoryGameDatabase::new();
        let mut info = GameInfo::new(66, 0);
        info.mirroring = Some(Mirroring::Vertical);
        info.region = Some(Region::Dendy);
        db.insert(&rom.prg_sha1().to_ascii_uppercase(), info);

        apply_overrides(&mut rom, &db).unwrap();
        assert_eq!(rom.header.mapper, 66);
        assert_eq!(rom.header.mirroring, Mirroring::Vertical);
        assert_eq!(rom.header.region, Some(Region::Dendy));
    }

    #[test]
    fn chr_checksum_is_validated() {
        let mut rom = Rom::parse(&ines(2, 1, 0, 0)).unwrap();
        let mut db = InMemoryGameDatabase::new();
        let mut info = GameInfo::new(0, 0);
        info.chr_sha1 = Some("00".repeat(20));
        db.insert(&rom.prg_sha1(), info);

        assert!(matches!(
            apply_overrides(&mut rom, &db),
            Err(RomError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn unknown_rom_is_untouched() {
        let mut rom = Rom::parse(&ines(1, 1, 3, 1)).unwrap();
        apply_overrides(&mut rom, &InMemoryGameDatabase::new()).unwrap();
        assert_eq!(rom.header.mapper, 3);
    }
}
