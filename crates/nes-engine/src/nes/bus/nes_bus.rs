use log::warn;

use crate::nes::apu::APU;
use crate::nes::bus::consts::*;
use crate::nes::cartridge::Cartridge;
use crate::nes::config::ConsoleConfig;
use crate::nes::controller::NesController;
use crate::nes::controller::joypad::Joypad;
use crate::nes::cpu::CpuBusInterface;
use crate::nes::dmc_dma::DmcDma;
use crate::nes::oam_dma::{OamDma, OamDmaOp};
use crate::nes::ppu::{PPU, PpuOptions};
use crate::nes::region::Region;
use crate::nes::snapshot::{Snapshot, Snapshotable};

/// Everything the CPU can reach, plus the clocks that run alongside it.
///
/// A CPU cycle is split in two: `begin_cycle` works out how many PPU dots
/// the cycle owes, `run_dot` pays them one at a time, and `finish_cycle`
/// clocks the APU and the mapper. Only then does the CPU (or a DMA unit)
/// touch the bus.
pub struct NesBus {
    pub cpu_ram: [u8; CPU_RAM_SIZE],
    pub ppu: PPU,
    pub apu: APU,
    pub cartridge: Cartridge,
    pub joypads: [Joypad; 2],

    oam_dma: OamDma,
    dmc_dma: DmcDma,

    region: Region,
    /// Master clock ticks not yet turned into PPU dots.
    master_clock: u32,
    dots_owed: u8,
    /// CPU cycles since power-on; its parity aligns OAM DMA.
    cycle: u64,

    // Reads from unmapped space return the last value on the data bus
    last_cpu_read: u8,
    frame_complete: bool,
}

impl NesBus {
    pub fn new(cartridge: Cartridge, region: Region, config: &ConsoleConfig) -> NesBus {
        let options = PpuOptions {
            remove_sprite_limit: config.remove_sprite_limit,
            disable_sprite_overflow: config.disable_sprite_overflow,
        };
        let mut apu = APU::new(region, config.sample_rate);
        apu.set_volume(config.volume);
        apu.set_silence_triangle_ultrasonic(config.silence_triangle_ultrasonic);

        let mut cpu_ram = [0; CPU_RAM_SIZE];
        config.ram_power_on.fill(&mut cpu_ram);

        NesBus {
            cpu_ram,
            ppu: PPU::new(region, options),
            apu,
            cartridge,
            joypads: [Joypad::new(), Joypad::new()],
            oam_dma: OamDma::new(),
            dmc_dma: DmcDma::new(),
            region,
            master_clock: 0,
            dots_owed: 0,
            cycle: 0,
            last_cpu_read: 0,
            frame_complete: false,
        }
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Soft reset leaves RAM, OAM and VRAM alone; a hard reset refills RAM
    /// according to the power-on policy.
    pub fn reset(&mut self, soft: bool, config: &ConsoleConfig) {
        if !soft {
            config.ram_power_on.fill(&mut self.cpu_ram);
            self.joypads = [Joypad::new(), Joypad::new()];
            self.master_clock = 0;
            self.dots_owed = 0;
            self.cycle = 0;
            self.last_cpu_read = 0;
        }
        self.oam_dma = OamDma::new();
        self.dmc_dma = DmcDma::new();
        self.frame_complete = false;
        self.ppu.reset(soft);
        self.apu.reset(soft);
        self.cartridge.reset(soft);
    }

    pub fn dots_owed(&self) -> u8 {
        self.dots_owed
    }

    /// Starts a CPU cycle by converting its share of the master clock into
    /// PPU dots.
    pub fn begin_cycle(&mut self) {
        self.cycle += 1;
        self.master_clock += self.region.cpu_divider();
        let divider = self.region.ppu_divider();
        while self.master_clock >= divider {
            self.master_clock -= divider;
            self.dots_owed += 1;
        }
    }

    /// Runs one owed PPU dot. Returns true if the frame finished on it.
    pub fn run_dot(&mut self) -> bool {
        if self.dots_owed == 0 {
            return false;
        }
        self.dots_owed -= 1;
        let done = self.ppu.tick(&mut self.cartridge);
        if done {
            self.frame_complete = true;
        }
        done
    }

    /// Clocks the units that run once per CPU cycle and latches any DMC
    /// fetch request.
    pub fn finish_cycle(&mut self) {
        while self.dots_owed > 0 {
            self.run_dot();
        }
        self.apu.clock();
        self.cartridge.clock_cpu();
        if let Some(addr) = self.apu.dmc_dma_request() {
            self.dmc_dma.request(addr);
        }
    }

    /// Gives this cycle to a DMA unit if one wants it. Returns false when the
    /// CPU owns the bus.
    pub fn run_dma_cycle(&mut self) -> bool {
        if self.dmc_dma.pending() {
            self.dmc_dma.begin(self.oam_dma.active());
        }

        if self.dmc_dma.active() {
            if let Some(addr) = self.dmc_dma.step() {
                let value = self.read(addr);
                self.apu.dmc_dma_complete(value);
            }
            return true;
        }

        if !self.oam_dma.active() {
            return false;
        }
        match self.oam_dma.step() {
            OamDmaOp::Dummy => {}
            OamDmaOp::Read(addr) => {
                let value = self.read(addr);
                self.oam_dma.latch(value);
            }
            OamDmaOp::Write(value) => self.ppu.write_register(0x2004, value, &mut self.cartridge),
        }
        true
    }

    /// Returns and clears the end-of-frame flag.
    pub fn take_frame_complete(&mut self) -> bool {
        std::mem::take(&mut self.frame_complete)
    }

    /// Side-effect free read for debuggers. Registers read as open bus.
    pub fn peek(&self, addr: u16) -> u8 {
        match addr {
            CPU_RAM_START..=CPU_RAM_END => self.cpu_ram[(addr & 0x07FF) as usize],
            CART_START..=CART_END => self.cartridge.peek(addr).unwrap_or(self.last_cpu_read),
            _ => self.last_cpu_read,
        }
    }

    fn read(&mut self, addr: u16) -> u8 {
        let value = match addr {
            CPU_RAM_START..=CPU_RAM_END => self.cpu_ram[(addr & 0x07FF) as usize],
            PPU_REGISTERS_START..=PPU_REGISTERS_END => {
                self.ppu.read_register(addr, &mut self.cartridge)
            }
            APU_STATUS => {
                // Bit 5 is not driven by the APU
                (self.apu.read_status() & !0x20) | (self.last_cpu_read & 0x20)
            }
            JOYPAD1 => (self.last_cpu_read & 0xE0) | self.joypads[0].read(),
            JOYPAD2 => (self.last_cpu_read & 0xE0) | self.joypads[1].read(),
            CART_START..=CART_END => self
                .cartridge
                .cpu_read(addr)
                .unwrap_or(self.last_cpu_read),
            // $4000-$4014 and $4018-$401F are write-only or unused
            _ => self.last_cpu_read,
        };
        self.last_cpu_read = value;
        value
    }

    fn write(&mut self, addr: u16, value: u8) {
        self.last_cpu_read = value;
        match addr {
            CPU_RAM_START..=CPU_RAM_END => self.cpu_ram[(addr & 0x07FF) as usize] = value,
            PPU_REGISTERS_START..=PPU_REGISTERS_END => {
                self.ppu.write_register(addr, value, &mut self.cartridge)
            }
            OAM_DMA => self.oam_dma.start(value, self.cycle % 2 == 1),
            JOYPAD1 => {
                for joypad in &mut self.joypads {
                    joypad.write(value);
                }
            }
            0x4000..=0x4013 | APU_STATUS | JOYPAD2 => self.apu.write(addr, value),
            0x4018..=0x401F => warn!("write ${value:02X} to unused CPU test register ${addr:04X}"),
            CART_START..=CART_END => self.cartridge.cpu_write(addr, value),
        }
    }
}

impl CpuBusInterface for NesBus {
    fn cpu_bus_read(&mut self, addr: u16) -> u8 {
        self.read(addr)
    }

    fn cpu_bus_write(&mut self, addr: u16, value: u8) {
        self.write(addr, value);
    }

    fn nmi_line(&self) -> bool {
        self.ppu.nmi_line()
    }

    fn irq_line(&self) -> bool {
        self.apu.irq_line() || self.cartridge.irq_line()
    }
}

impl Snapshotable for NesBus {
    fn save(&self, s: &mut Snapshot) {
        s.write_bytes("cpuRam", &self.cpu_ram);
        s.write_snapshot("ppu", &self.ppu);
        s.write_snapshot("apu", &self.apu);
        s.write_snapshot("cartridge", &self.cartridge);
        s.write_snapshot("joypad1", &self.joypads[0]);
        s.write_snapshot("joypad2", &self.joypads[1]);
        s.write_snapshot("oamDma", &self.oam_dma);
        s.write_snapshot("dmcDma", &self.dmc_dma);
        s.write("masterClock", self.master_clock);
        s.write("dotsOwed", self.dots_owed);
        s.write("cycle", self.cycle);
        s.write("openBus", self.last_cpu_read);
    }

    fn restore(&mut self, s: &Snapshot) {
        s.read_bytes_into("cpuRam", &mut self.cpu_ram);
        s.restore_nested("ppu", &mut self.ppu);
        s.restore_nested("apu", &mut self.apu);
        s.restore_nested("cartridge", &mut self.cartridge);
        let [joypad1, joypad2] = &mut self.joypads;
        s.restore_nested("joypad1", joypad1);
        s.restore_nested("joypad2", joypad2);
        s.restore_nested("oamDma", &mut self.oam_dma);
        s.restore_nested("dmcDma", &mut self.dmc_dma);
        self.master_clock = s.read::<u32>("masterClock") % self.region.ppu_divider();
        self.dots_owed = s.read::<u8>("dotsOwed").min(4);
        self.cycle = s.read("cycle");
        self.last_cpu_read = s.read("openBus");
        self.frame_complete = false;
    }
}

#[cfg(feature = "tracing")]
use crate::nes::tracer::Traceable;
#[cfg(feature = "tracing")]
impl Traceable for NesBus {
    fn trace_name(&self) -> &'static str {
        "BUS"
    }

    fn trace_state(&self) -> Option<String> {
        let ppu_trace = self.ppu.trace().unwrap_or_else(|| "---".to_string());
        Some(format!("cyc={} {}", self.cycle, ppu_trace))
    }
}
