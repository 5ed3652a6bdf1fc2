use log::debug;

use super::Mapper;
use crate::nes::cartridge::irq::CpuCycleIrq;
use crate::nes::cartridge::memory::CartridgeMemory;
use crate::nes::cartridge::rom::{Mirroring, Rom};
use crate::nes::snapshot::{Snapshot, Snapshotable};

/// Sunsoft FME-7: command/parameter register pair, 1 KiB CHR banks, ROM or
/// RAM at $6000 and a 16-bit CPU cycle IRQ counter.
#[derive(Debug)]
pub struct Fme7 {
    pub(crate) mem: CartridgeMemory,
    command: u8,
    chr_banks: [u8; 8],
    /// $6000 window: bank in bits 0-5, bit 6 RAM, bit 7 RAM enable
    prg_6000: u8,
    prg_banks: [u8; 3],
    mirroring: u8,
    irq: CpuCycleIrq,
}

impl Fme7 {
    pub fn new(rom: &Rom) -> Self {
        let mut cart = Fme7 {
            mem: CartridgeMemory::new(rom),
            command: 0,
            chr_banks: [0; 8],
            prg_6000: 0,
            prg_banks: [0; 3],
            mirroring: 0,
            irq: CpuCycleIrq::new(),
        };
        cart.update_banks();
        cart
    }

    fn update_banks(&mut self) {
        let bank = (self.prg_6000 & 0x3F) as usize;
        match (self.prg_6000 & 0x40 != 0, self.prg_6000 & 0x80 != 0) {
            (false, _) => self.mem.map_prg(0x6000, 0x2000, bank),
            (true, true) => self.mem.map_prg_ram(0x6000, bank),
            (true, false) => self.mem.unmap_prg(0x6000, 0x2000),
        }
        for (i, bank) in self.prg_banks.iter().enumerate() {
            self.mem.map_prg(0x8000 + i as u16 * 0x2000, 0x2000, *bank as usize);
        }
        self.mem.map_prg_last(0xE000, 0x2000);
        for (i, bank) in self.chr_banks.iter().enumerate() {
            self.mem.map_chr(i as u16 * 0x400, 0x400, *bank as usize);
        }
    }

    fn write_parameter(&mut self, value: u8) {
        match self.command {
            0x0..=0x7 => self.chr_banks[self.command as usize] = value,
            0x8 => self.prg_6000 = value,
            0x9..=0xB => self.prg_banks[(self.command - 9) as usize] = value & 0x3F,
            0xC => self.mirroring = value & 0x03,
            0xD => self.irq.set_control(value & 0x01 != 0, value & 0x80 != 0),
            0xE => self.irq.set_counter_low(value),
            _ => self.irq.set_counter_high(value),
        }
        if self.command <= 0xC {
            debug!("FME-7 command {:X} = {value:#04X}", self.command);
            self.update_banks();
        }
    }
}

impl Mapper for Fme7 {
    fn memory(&self) -> &CartridgeMemory {
        &self.mem
    }

    fn map_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x6000..=0x7FFF => self.mem.write_mapped(addr, value),
            0x8000..=0x9FFF => self.command = value & 0x0F,
            0xA000..=0xBFFF => self.write_parameter(value),
            // $C000-$FFFF drives the 5B sound chip
            _ => {}
        }
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
            self.command = 0;
            self.chr_banks = [0; 8];
            self.prg_6000 = 0;
            self.prg_banks = [0; 3];
            self.mirroring = 0;
            self.irq = CpuCycleIrq::new();
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

impl Snapshotable for Fme7 {
    fn save(&self, s: &mut Snapshot) {
        s.write_snapshot("memory", &self.mem);
        s.write("command", self.command);
        s.write_bytes("chrBanks", &self.chr_banks);
        s.write("prg6000", self.prg_6000);
        s.write_bytes("prgBanks", &self.prg_banks);
        s.write("mirroring", self.mirroring);
        s.write_snapshot("irq", &self.irq);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.restore_nested("memory", &mut self.mem);
        self.command = s.read("command");
        s.read_bytes_into("chrBanks", &mut self.chr_banks);
        self.prg_6000 = s.read("prg6000");
        s.read_bytes_into("prgBanks", &mut self.prg_banks);
        self.mirroring = s.read("mirroring");
        s.restore_nested("irq", &mut self.irq);
        self.update_banks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fme7() -> Fme7 {
        let prg = (0..0x40000).map(|i| (i / 0x2000) as u8).collect();
        let chr = (0..0x40000).map(|i| (i / 0x400) as u8).collect();
        Fme7::new(&Rom::new_custom(prg, chr, 69, Mirroring::Vertical))
    }

    fn command(cart: &mut Fme7, command: u8, value: u8) {
        cart.map_write(0x8000, command);
        cart.map_write(0xA000, value);
    }

    #[test]
    fn prg_and_chr_banks() {
        let mut cart = fme7();
        command(&mut cart, 0x9, 3);
        command(&mut cart, 0xB, 7);
        command(&mut cart, 0x5, 0x42);
        assert_eq!(cart.mem.read_mapped(0x8000), Some(3));
        assert_eq!(cart.mem.read_mapped(0xC000), Some(7));
        assert_eq!(cart.mem.read_mapped(0xE000), Some(31));
        assert_eq!(cart.mem.read_mapped(0x1400), Some(0x42));
    }

    #[test]
    fn window_at_6000_maps_rom_or_ram() {
        let mut cart = fme7();
        command(&mut cart, 0x8, 0x05);
        assert_eq!(cart.mem.read_mapped(0x6000), Some(5));

        command(&mut cart, 0x8, 0xC0);
        cart.map_write(0x6000, 0x99);
        assert_eq!(cart.mem.read_mapped(0x6000), Some(0x99));

        command(&mut cart, 0x8, 0x40);
        assert_eq!(cart.mem.read_mapped(0x6000), None);
    }

    #[test]
    fn cycle_counter_irq() {
        let mut cart = fme7();
        command(&mut cart, 0xE, 0x01);
        command(&mut cart, 0xF, 0x00);
        command(&mut cart, 0xD, 0x81);
        cart.clock_cpu();
        assert!(!cart.irq_line());
        cart.clock_cpu();
        assert!(cart.irq_line());
        command(&mut cart, 0xD, 0x00);
        assert!(!cart.irq_line());
    }
}
