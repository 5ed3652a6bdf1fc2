use std::fmt::Write;

use log::{info, warn};
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::nes::region::Region;
use crate::nes::snapshot::Ordinal;

const NES_MAGIC_BYTES: &[u8; 4] = b"NES\x1A";
const HEADER_SIZE: usize = 16;
const TRAINER_SIZE: usize = 512;
const PRG_ROM_PAGE_SIZE: usize = 0x4000;
const CHR_ROM_PAGE_SIZE: usize = 0x2000;
const DEFAULT_PRG_RAM_SIZE: usize = 0x2000;
const DEFAULT_CHR_RAM_SIZE: usize = 0x2000;

/// Trainers are copied to this CPU address, inside PRG-RAM.
pub const TRAINER_ADDR: u16 = 0x7000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RomError {
    #[error("{0}")]
    InvalidFormat(String),

    #[error("ROM file is truncated: expected {expected} bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("Unsupported ROM version: v{0}")]
    UnsupportedVersion(u8),

    #[error("Unsupported mapper: {mapper} (submapper {submapper})")]
    UnsupportedMapper { mapper: u16, submapper: u8 },

    #[error("CHR checksum mismatch: database expects {expected}, ROM has {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mirroring {
    Vertical,
    Horizontal,
    FourScreen,
    Single0,
    Single1,
    /// Board-controlled page for each of the four nametables
    Mapped([u8; 4]),
}

impl Mirroring {
    /// Physical 1 KiB page backing logical nametable `table` (0-3).
    pub fn page(self, table: u8) -> u8 {
        let table = (table & 0x03) as usize;
        match self {
            Mirroring::Vertical => [0, 1, 0, 1][table],
            Mirroring::Horizontal => [0, 0, 1, 1][table],
            Mirroring::FourScreen => [0, 1, 2, 3][table],
            Mirroring::Single0 => 0,
            Mirroring::Single1 => 1,
            Mirroring::Mapped(pages) => pages[table] & 0x03,
        }
    }
}

impl Ordinal for Mirroring {
    fn ordinal(&self) -> u8 {
        match self {
            Mirroring::Vertical => 0,
            Mirroring::Horizontal => 1,
            Mirroring::FourScreen => 2,
            Mirroring::Single0 => 3,
            Mirroring::Single1 => 4,
            Mirroring::Mapped(_) => 5,
        }
    }

    fn from_ordinal(ordinal: u8) -> Option<Self> {
        Some(match ordinal {
            0 => Mirroring::Vertical,
            1 => Mirroring::Horizontal,
            2 => Mirroring::FourScreen,
            3 => Mirroring::Single0,
            4 => Mirroring::Single1,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    INes,
    Nes2,
}

/// Fields decoded from the 16-byte iNES / NES 2.0 header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RomHeader {
    pub format: HeaderFormat,
    pub mapper: u16,
    pub submapper: u8,
    pub prg_rom_size: usize,
    pub chr_rom_size: usize,
    /// Volatile PRG-RAM
    pub prg_ram_size: usize,
    /// Battery-backed PRG-RAM
    pub prg_nvram_size: usize,
    pub chr_ram_size: usize,
    pub mirroring: Mirroring,
    pub has_battery: bool,
    pub has_trainer: bool,
    /// None when the header doesn't say, or says "multi-region"
    pub region: Option<Region>,
}

impl RomHeader {
    pub fn parse(raw: &[u8]) -> Result<RomHeader, RomError> {
        if raw.len() < HEADER_SIZE || &raw[0..4] != NES_MAGIC_BYTES {
            return Err(RomError::InvalidFormat("Not an iNES file".into()));
        }

        let mut header = [0u8; HEADER_SIZE];
        header.copy_from_slice(&raw[..HEADER_SIZE]);
        if &header[7..16] == b"DiskDude!" {
            warn!("Cleaning \"DiskDude!\" signature out of ROM header");
            header[7..16].fill(0);
        }

        let version = (header[7] >> 2) & 0b11;
        match version {
            0b10 => Ok(Self::parse_nes2(&header)),
            0b00 => Ok(Self::parse_ines(&header, header[12..16].iter().all(|&b| b == 0))),
            // Archaic iNES: everything past byte 6 is garbage
            0b01 => Ok(Self::parse_ines(&header, false)),
            v => Err(RomError::UnsupportedVersion(v)),
        }
    }

    fn mirroring(flags6: u8) -> Mirroring {
        let four_screen = flags6 & 0b1000 != 0;
        let vertical_mirroring = flags6 & 0b1 != 0;
        match (four_screen, vertical_mirroring) {
            (true, _) => Mirroring::FourScreen,
            (false, true) => Mirroring::Vertical,
            (false, false) => Mirroring::Horizontal,
        }
    }

    fn parse_ines(raw: &[u8; HEADER_SIZE], clean: bool) -> RomHeader {
        let mapper = if clean {
            (raw[7] & 0xF0) as u16 | (raw[6] >> 4) as u16
        } else {
            warn!("ROM header has junk in bytes 7-15, ignoring them");
            (raw[6] >> 4) as u16
        };
        let has_battery = raw[6] & 0b10 != 0;

        let prg_ram_size = match (clean, raw[8]) {
            (true, n) if n > 0 => n as usize * 0x2000,
            _ => DEFAULT_PRG_RAM_SIZE,
        };
        let region = (clean && raw[9] & 0x01 != 0).then_some(Region::Pal);
        let chr_rom_size = raw[5] as usize * CHR_ROM_PAGE_SIZE;

        RomHeader {
            format: HeaderFormat::INes,
            mapper,
            submapper: 0,
            prg_rom_size: raw[4] as usize * PRG_ROM_PAGE_SIZE,
            chr_rom_size,
            prg_ram_size: if has_battery { 0 } else { prg_ram_size },
            prg_nvram_size: if has_battery { prg_ram_size } else { 0 },
            chr_ram_size: if chr_rom_size == 0 { DEFAULT_CHR_RAM_SIZE } else { 0 },
            mirroring: Self::mirroring(raw[6]),
            has_battery,
            has_trainer: raw[6] & 0b100 != 0,
            region,
        }
    }

    fn parse_nes2(raw: &[u8; HEADER_SIZE]) -> RomHeader {
        let mapper = (raw[6] >> 4) as u16 | (raw[7] & 0xF0) as u16 | ((raw[8] & 0x0F) as u16) << 8;
        let region = match raw[12] & 0b11 {
            0 => Some(Region::Ntsc),
            1 => Some(Region::Pal),
            3 => Some(Region::Dendy),
            _ => None,
        };

        RomHeader {
            format: HeaderFormat::Nes2,
            mapper,
            submapper: raw[8] >> 4,
            prg_rom_size: nes2_rom_size(raw[4], raw[9] & 0x0F, PRG_ROM_PAGE_SIZE),
            chr_rom_size: nes2_rom_size(raw[5], raw[9] >> 4, CHR_ROM_PAGE_SIZE),
            prg_ram_size: nes2_ram_size(raw[10] & 0x0F),
            prg_nvram_size: nes2_ram_size(raw[10] >> 4),
            chr_ram_size: nes2_ram_size(raw[11] & 0x0F),
            mirroring: Self::mirroring(raw[6]),
            has_battery: raw[6] & 0b10 != 0,
            has_trainer: raw[6] & 0b100 != 0,
            region,
        }
    }

    /// Total PRG-RAM, volatile and battery-backed.
    pub fn work_ram_size(&self) -> usize {
        self.prg_ram_size + self.prg_nvram_size
    }
}

fn nes2_rom_size(lsb: u8, msb: u8, page_size: usize) -> usize {
    if msb == 0x0F {
        // Exponent-multiplier notation: 2^E * (2M + 1)
        let exponent = (lsb >> 2) as u32;
        let multiplier = (lsb & 0b11) as usize * 2 + 1;
        1usize.checked_shl(exponent).unwrap_or(0) * multiplier
    } else {
        (((msb as usize) << 8) | lsb as usize) * page_size
    }
}

fn nes2_ram_size(shift: u8) -> usize {
    if shift == 0 { 0 } else { 64 << shift }
}

pub fn sha1_hex(chunks: &[&[u8]]) -> String {
    let mut hasher = Sha1::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(40);
    for byte in digest.iter() {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

pub struct Rom {
    pub header: RomHeader,
    pub prg_rom: Vec<u8>,
    pub chr_rom: Vec<u8>,
    pub trainer: Option<Vec<u8>>,
    /// SHA-1 of PRG followed by CHR, lowercase hex
    pub sha1: String,
}

impl Rom {
    pub fn parse(raw: &[u8]) -> Result<Rom, RomError> {
        let header = RomHeader::parse(raw)?;
        if header.prg_rom_size == 0 {
            return Err(RomError::InvalidFormat("ROM declares no PRG-ROM".into()));
        }

        let prg_rom_start = HEADER_SIZE + if header.has_trainer { TRAINER_SIZE } else { 0 };
        let chr_rom_start = prg_rom_start + header.prg_rom_size;
        let expected = chr_rom_start + header.chr_rom_size;
        if raw.len() < expected {
            return Err(RomError::Truncated {
                expected,
                actual: raw.len(),
            });
        }

        let prg_rom = raw[prg_rom_start..chr_rom_start].to_vec();
        let chr_rom = raw[chr_rom_start..expected].to_vec();
        let trainer = header
            .has_trainer
            .then(|| raw[HEADER_SIZE..HEADER_SIZE + TRAINER_SIZE].to_vec());
        let sha1 = sha1_hex(&[&prg_rom, &chr_rom]);

        info!(
            "Parsed {:?} ROM: mapper {} submapper {}, PRG {} KiB, CHR {} KiB, {:?}, battery={}",
            header.format,
            header.mapper,
            header.submapper,
            prg_rom.len() / 1024,
            chr_rom.len() / 1024,
            header.mirroring,
            header.has_battery
        );

        Ok(Rom {
            header,
            prg_rom,
            chr_rom,
            trainer,
            sha1,
        })
    }

    pub fn prg_sha1(&self) -> String {
        sha1_hex(&[&self.prg_rom])
    }

    pub fn chr_sha1(&self) -> String {
        sha1_hex(&[&self.chr_rom])
    }

    #[cfg(test)]
    pub fn new_custom(prg_rom: Vec<u8>, chr_rom: Vec<u8>, mapper: u16, mirroring: Mirroring) -> Rom {
        let sha1 = sha1_hex(&[&prg_rom, &chr_rom]);
        Rom {
            header: RomHeader {
                format: HeaderFormat::INes,
                mapper,
                submapper: 0,
                prg_rom_size: prg_rom.len(),
                chr_rom_size: chr_rom.len(),
                prg_ram_size: DEFAULT_PRG_RAM_SIZE,
                prg_nvram_size: 0,
                chr_ram_size: if chr_rom.is_empty() { DEFAULT_CHR_RAM_SIZE } else { 0 },
                mirroring,
                has_battery: false,
                has_trainer: false,
                region: None,
            },
            prg_rom,
            chr_rom,
            trainer: None,
            sha1,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_rom::*;
    use super::*;

    #[test]
    fn parses_ines_header() {
        let raw = ines(2, 1, 0x42, 0b0011);
        let rom = Rom::parse(&raw).unwrap();
        assert_eq!(rom.header.format, HeaderFormat::INes);
        assert_eq!(rom.header.mapper, 0x42);
        assert_eq!(rom.header.mirroring, Mirroring::Vertical);
        assert!(rom.header.has_battery);
        assert_eq!(rom.header.prg_nvram_size, 0x2000);
        assert_eq!(rom.prg_rom.len(), 0x8000);
        assert_eq!(rom.prg_rom[0x4000], 1);
        assert_eq!(rom.chr_rom.len(), 0x2000);
        assert_eq!(rom.sha1.len(), 40);
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        assert!(matches!(
            Rom::parse(b"NOPE").err(),
            Some(RomError::InvalidFormat(_))
        ));

        let mut raw = ines(2, 1, 0, 0);
        raw.truncate(0x5000);
        assert_eq!(
            Rom::parse(&raw).err(),
            Some(RomError::Truncated {
                expected: 16 + 0x8000 + 0x2000,
                actual: 0x5000
            })
        );
    }

    #[test]
    fn trainer_is_split_out() {
        let mut header = [0u8; 16];
        header[0..4].copy_from_slice(b"NES\x1A");
        header[4] = 1;
        header[6] = 0b0100;
        let raw = build(header, Some(&[0xAB; 512]));
        let rom = Rom::parse(&raw).unwrap();
        assert_eq!(rom.trainer.as_deref(), Some(&[0xAB; 512][..]));
        assert_eq!(rom.prg_rom[0], 0);
        assert_eq!(rom.header.chr_ram_size, 0x2000);
    }

    #[test]
    fn diskdude_header_is_cleaned() {
        let mut header = [0u8; 16];
        header[0..4].copy_from_slice(b"NES\x1A");
        header[4] = 1;
        header[6] = 0x10;
        header[7..16].copy_from_slice(b"DiskDude!");
        let rom = Rom::parse(&build(header, None)).unwrap();
        assert_eq!(rom.header.mapper, 1);
    }

    #[test]
    fn parses_nes2_header() {
        let mut header = [0u8; 16];
        header[0..4].copy_from_slice(b"NES\x1A");
        header[4] = 2;
        header[5] = 0;
        header[6] = 0x40 | 0b0010;
        header[7] = 0x08;
        header[8] = 0x41; // submapper 4, mapper bits 8-11 = 1
        header[10] = 0x70; // 8 KiB NVRAM
        header[11] = 0x08; // 16 KiB CHR-RAM
        header[12] = 0x01;
        let rom = Rom::parse(&build(header, None)).unwrap();
        assert_eq!(rom.header.format, HeaderFormat::Nes2);
        assert_eq!(rom.header.mapper, 0x104);
        assert_eq!(rom.header.submapper, 4);
        assert_eq!(rom.header.prg_nvram_size, 0x2000);
        assert_eq!(rom.header.prg_ram_size, 0);
        assert_eq!(rom.header.chr_ram_size, 0x4000);
        assert_eq!(rom.header.region, Some(Region::Pal));
    }

    #[test]
    fn nes2_exponent_sizes() {
        assert_eq!(nes2_rom_size(0b0000_1001, 0x0F, PRG_ROM_PAGE_SIZE), 4 * 3);
        assert_eq!(nes2_rom_size(0x02, 0x01, PRG_ROM_PAGE_SIZE), 0x102 * 0x4000);
    }

    #[test]
    fn unsupported_version() {
        let mut raw = ines(1, 1, 0, 0);
        raw[7] = 0b1100;
        assert_eq!(Rom::parse(&raw).err(), Some(RomError::UnsupportedVersion(3)));
    }

    #[test]
    fn mirroring_pages() {
        let pages = |m: Mirroring| (0..4).map(|t| m.page(t)).collect::<Vec<_>>();
        assert_eq!(pages(Mirroring::Vertical), [0, 1, 0, 1]);
        assert_eq!(pages(Mirroring::Horizontal), [0, 0, 1, 1]);
        assert_eq!(pages(Mirroring::FourScreen), [0, 1, 2, 3]);
        assert_eq!(pages(Mirroring::Single1), [1, 1, 1, 1]);
        assert_eq!(pages(Mirroring::Mapped([1, 0, 0, 1])), [1, 0, 0, 1]);
    }
}
