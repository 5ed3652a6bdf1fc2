use log::debug;

use super::Mapper;
use crate::nes::cartridge::irq::A12Watcher;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mmc3Variant {
    Mmc3,
    /// Revision A: reloading to zero doesn't fire
    Mmc3A,
    /// TKSROM / TLSROM: CHR bank bit 7 selects the nametable page
    TxSrom,
}

#[derive(Debug)]
pub struct Mmc3 {
    pub(crate) mem: CartridgeMemory,
    variant: Mmc3Variant,

    bank_select: u8,
    bank_registers: [u8; 8],

    horizontal: bool,
    four_screen: bool,
    ram_enabled: bool,
    ram_write_protect: bool,

    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,

    a12: A12Watcher,
}

impl Mmc3 {
    pub fn new(rom: &Rom, variant: Mmc3Variant) -> Self {
        let mut mmc3 = Mmc3 {
            mem: CartridgeMemory::new(rom),
            variant,
            bank_select: 0,
            bank_registers: [0, 2, 4, 5, 6, 7, 0, 1],
            horizontal: rom.header.mirroring == Mirroring::Horizontal,
            four_screen: rom.header.mirroring == Mirroring::FourScreen,
            ram_enabled: true,
            ram_write_protect: false,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
            a12: A12Watcher::new(),
        };
        mmc3.update_banks();
        mmc3
    }

    fn prg_mode(&self) -> bool {
        self.bank_select & 0x40 != 0
    }

    fn chr_mode(&self) -> bool {
        self.bank_select & 0x80 != 0
    }

    fn update_banks(&mut self) {
        let second_last = self.mem.prg_bank_count(0x2000) - 2;
        let r6 = self.bank_registers[6] as usize;
        let r7 = self.bank_registers[7] as usize;
        if self.prg_mode() {
            self.mem.map_prg(0x8000, 0x2000, second_last);
            self.mem.map_prg(0xC000, 0x2000, r6);
        } else {
            self.mem.map_prg(0x8000, 0x2000, r6);
            self.mem.map_prg(0xC000, 0x2000, second_last);
        }
        self.mem.map_prg(0xA000, 0x2000, r7);
        self.mem.map_prg_last(0xE000, 0x2000);

        // R0/R1 are 2 KiB banks, R2-R5 1 KiB; CHR mode swaps the halves
        let invert: u16 = if self.chr_mode() { 0x1000 } else { 0 };
        let r = self.bank_registers;
        let layout = [
            (r[0] & 0xFE, 0x0000),
            (r[0] | 0x01, 0x0400),
            (r[1] & 0xFE, 0x0800),
            (r[1] | 0x01, 0x0C00),
            (r[2], 0x1000),
            (r[3], 0x1400),
            (r[4], 0x1800),
            (r[5], 0x1C00),
        ];
        for (bank, addr) in layout {
            self.mem.map_chr(addr ^ invert, 0x0400, bank as usize);
        }

        if self.ram_enabled {
            self.mem.map_prg_ram(0x6000, 0);
            self.mem.set_prg_ram_writable(0x6000, !self.ram_write_protect);
        } else {
            self.mem.unmap_prg(0x6000, 0x2000);
        }
    }

    fn clock_irq_counter(&mut self) {
        let count = self.irq_counter;
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
        } else {
            self.irq_counter -= 1;
        }

        let fire = match self.variant {
            Mmc3Variant::Mmc3A => (count > 0 || self.irq_reload) && self.irq_counter == 0,
            _ => self.irq_counter == 0,
        };
        if fire && self.irq_enabled {
            self.irq_pending = true;
        }
        self.irq_reload = false;
    }
}

impl Mapper for Mmc3 {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        let even = addr & 1 == 0;
        match addr {
            0x6000..=0x7FFF => self.mem.write_mapped(addr, value),
            0x8000..=0x9FFF => {
                if even {
                    self.bank_select = value;
                } else {
                    let r = (self.bank_select & 0x07) as usize;
                    self.bank_registers[r] = value;
                    debug!("MMC3 R{r} = {value:#04X}");
                }
                self.update_banks();
            }
            0xA000..=0xBFFF => {
                if even {
                    self.horizontal = value & 1 != 0;
                } else {
                    self.ram_enabled = value & 0x80 != 0;
                    self.ram_write_protect = value & 0x40 != 0;
                    self.update_banks();
                }
            }
            0xC000..=0xDFFF => {
                if even {
                    self.irq_latch = value;
                } else {
                    self.irq_counter = 0;
                    self.irq_reload = true;
                }
            }
            0xE000..=0xFFFF => {
                if even {
                    self.irq_enabled = false;
                    self.irq_pending = false;
                } else {
                    self.irq_enabled = true;
                }
            }
            _ => {}
        }
    }

    fn chr_write(&mut self, addr: u16, value: u8) {
        self.mem.write_mapped(addr, value);
    }

    fn mirroring(&self) -> Mirroring {
        if self.four_screen {
            return Mirroring::FourScreen;
        }
        if self.variant == Mmc3Variant::TxSrom {
            let r = self.bank_registers;
            let pages = if self.chr_mode() {
                [r[2], r[3], r[4], r[5]]
            } else {
                [r[0], r[0], r[1], r[1]]
            };
            return Mirroring::Mapped(pages.map(|bank| bank >> 7));
        }
        if self.horizontal {
            Mirroring::Horizontal
        } else {
            Mirroring::Vertical
        }
    }

    fn reset(&mut self, soft: bool) {
        if !soft {
            self.bank_select = 0;
            self.bank_registers = [0, 2, 4, 5, 6, 7, 0, 1];
            self.irq_latch = 0;
            self.irq_counter = 0;
            self.irq_reload = false;
        }
        self.irq_enabled = false;
        self.irq_pending = false;
        self.update_banks();
    }

    fn notify_vram_address(&mut self, addr: u16, ppu_cycle: u64) {
        if self.a12.update(addr, ppu_cycle) {
            self.clock_irq_counter();
        }
    }

    fn irq_line(&self) -> bool {
        self.irq_pending
    }
}

impl Snapshotable for Mmc3 {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write("bankSelect", self.bank_select);
        s.write_bytes("registers", &self.bank_registers);
        s.write("horizontal", self.horizontal);
        s.write("ramEnabled", self.ram_enabled);
        s.write("ramWriteProtect", self.ram_write_protect);
        s.write("irqLatch", self.irq_latch);
        s.write("irqCounter", self.irq_counter);
        s.write("irqReload", self.irq_reload);
        s.write("irqEnabled", self.irq_enabled);
        s.write("irqPending", self.irq_pending);
        s.write_snapshot("a12", &self.a12);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        self.bank_select = s.read("bankSelect");
        s.read_bytes_into("registers", &mut self.bank_registers);
        self.horizontal = s.read("horizontal");
        self.ram_enabled = s.read_or("ramEnabled", true);
        self.ram_write_protect = s.read("ramWriteProtect");
        self.irq_latch = s.read("irqLatch");
        self.irq_counter = s.read("irqCounter");
        self.irq_reload = s.read("irqReload");
        self.irq_enabled = s.read("irqEnabled");
        self.irq_pending = s.read("irqPending");
        s.restore_nested("a12", &mut self.a12);
        self.update_banks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mmc3(variant: Mmc3Variant) -> Mmc3 {
        let prg = (0..0x20000).map(|i| (i / 0x2000) as u8).collect();
        let chr = (0..0x20000).map(|i| (i / 0x400) as u8).collect();
        Mmc3::new(&Rom::new_custom(prg, chr, 4, Mirroring::Vertical), variant)
    }

    /// One rising A12 edge per call, like one rendered scanline.
    fn scanline(mmc3: &mut Mmc3, cycle: &mut u64) {
        *cycle += 341;
        mmc3.notify_vram_address(0x0000, *cycle - 20);
        mmc3.notify_vram_address(0x1000, *cycle);
    }

    #[test]
    fn prg_modes() {
        let mut mmc3 = mmc3(Mmc3Variant::Mmc3);
        mmc3.map_write(0x8000, 6);
        mmc3.map_write(0x8001, 3);
        mmc3.map_write(0x8000, 7);
        mmc3.map_write(0x8001, 5);
        assert_eq!(mmc3.mem.read_mapped(0x8000), Some(3));
        assert_eq!(mmc3.mem.read_mapped(0xA000), Some(5));
        assert_eq!(mmc3.mem.read_mapped(0xC000), Some(14));
        assert_eq!(mmc3.mem.read_mapped(0xE000), Some(15));

        mmc3.map_write(0x8000, 0x46);
        assert_eq!(mmc3.mem.read_mapped(0x8000), Some(14));
        assert_eq!(mmc3.mem.read_mapped(0xC000), Some(3));
    }

    #[test]
    fn chr_modes() {
        let mut mmc3 = mmc3(Mmc3Variant::Mmc3);
        mmc3.map_write(0x8000, 0);
        mmc3.map_write(0x8001, 9);
        mmc3.map_write(0x8000, 2);
        mmc3.map_write(0x8001, 20);
        assert_eq!(mmc3.mem.read_mapped(0x0000), Some(8));
        assert_eq!(mmc3.mem.read_mapped(0x0400), Some(9));
        assert_eq!(mmc3.mem.read_mapped(0x1000), Some(20));

        mmc3.map_write(0x8000, 0x80);
        assert_eq!(mmc3.mem.read_mapped(0x1000), Some(8));
        assert_eq!(mmc3.mem.read_mapped(0x0000), Some(20));
    }

    #[test]
    fn scanline_irq() {
        let mut mmc3 = mmc3(Mmc3Variant::Mmc3);
        let mut cycle = 0;
        mmc3.map_write(0xC000, 2);
        mmc3.map_write(0xC001, 0);
        mmc3.map_write(0xE001, 0);

        scanline(&mut mmc3, &mut cycle); // reload to 2
        scanline(&mut mmc3, &mut cycle); // 1
        assert!(!mmc3.irq_line());
        scanline(&mut mmc3, &mut cycle); // 0
        assert!(mmc3.irq_line());

        mmc3.map_write(0xE000, 0);
        assert!(!mmc3.irq_line());
    }

    #[test]
    fn latch_zero_fires_every_line_on_new_revision_only() {
        let mut cycle = 0;
        let mut new = mmc3(Mmc3Variant::Mmc3);
        new.map_write(0xC000, 0);
        new.map_write(0xC001, 0);
        new.map_write(0xE001, 0);
        scanline(&mut new, &mut cycle);
        assert!(new.irq_line());

        let mut old = mmc3(Mmc3Variant::Mmc3A);
        old.map_write(0xC000, 0);
        old.map_write(0xE001, 0);
        // Counter already 0 and no reload request: reload to 0 is silent
        scanline(&mut old, &mut cycle);
        assert!(!old.irq_line());
        // An explicit reload still fires
        old.map_write(0xC001, 0);
        scanline(&mut old, &mut cycle);
        assert!(old.irq_line());
    }

    #[test]
    fn tx_srom_nametables_follow_chr_banks() {
        let mut mmc3 = mmc3(Mmc3Variant::TxSrom);
        mmc3.map_write(0x8000, 0);
        mmc3.map_write(0x8001, 0x80);
        mmc3.map_write(0x8000, 1);
        mmc3.map_write(0x8001, 0x00);
        assert_eq!(mmc3.mirroring(), Mirroring::Mapped([1, 1, 0, 0]));
    }

    #[test]
    fn ram_protect() {
        let mut mmc3 = mmc3(Mmc3Variant::Mmc3);
        mmc3.map_write(0x6000, 1);
        mmc3.map_write(0xA001, 0xC0);
        mmc3.map_write(0x6000, 2);
        assert_eq!(mmc3.mem.read_mapped(0x6000), Some(1));
        mmc3.map_write(0xA001, 0x00);
        assert_eq!(mmc3.mem.read_mapped(0x6000), None);
    }
}
