pub mod apu;
pub mod blip;
pub mod bus;
pub mod cartridge;
pub mod config;
pub mod controller;
pub mod cpu;
pub mod dmc_dma;
pub mod oam_dma;
pub mod ppu;
pub mod region;
pub mod sinks;
pub mod snapshot;
pub mod tracer;

use log::{info, warn};
use thiserror::Error;

use crate::trace_obj;
use bus::nes_bus::NesBus;
use cartridge::Cartridge;
use cartridge::database::GameDatabase;
use cartridge::rom::RomError;
use config::ConsoleConfig;
use controller::joypad::JoypadButtons;
use cpu::{CPU, CpuError};
use ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};
use region::Region;
use sinks::{AudioSink, BatteryStore, InputProvider, VideoSink};
use snapshot::Snapshot;

/// First bytes of every save-state file.
pub const STATE_MAGIC: &[u8; 4] = b"NESS";
pub const STATE_VERSION: u16 = 1;
const SHA1_HEX_LEN: usize = 40;
const STATE_HEADER_LEN: usize = STATE_MAGIC.len() + 2 + SHA1_HEX_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("not a save state")]
    BadMagic,
    #[error("unsupported save-state version {0}")]
    UnsupportedVersion(u16),
    #[error("save state is for ROM {expected}, loaded ROM is {actual}")]
    RomMismatch { expected: String, actual: String },
    #[error("save-state body is truncated or corrupt")]
    Corrupt,
    #[error("no cartridge loaded")]
    NoCartridge,
}

#[derive(Debug, PartialEq, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Rom(#[from] RomError),
    #[error(transparent)]
    Cpu(#[from] CpuError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("no cartridge loaded")]
    NoCartridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
}

/// The whole machine: CPU, bus (PPU, APU, cartridge, pads) and the host
/// callbacks.
///
/// Normal operation is [`Console::run_frame`]. The `step_*` methods are for
/// debuggers and ignore the pause flag.
pub struct Console {
    config: ConsoleConfig,
    cpu: CPU,
    bus: Option<NesBus>,
    run_state: RunState,
    frame_count: u64,

    video_sink: Option<Box<dyn VideoSink>>,
    audio_sink: Option<Box<dyn AudioSink>>,
    input: Option<Box<dyn InputProvider>>,
    battery: Option<Box<dyn BatteryStore>>,

    argb: Vec<u32>,
    audio: Vec<i16>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new(ConsoleConfig::default())
    }
}

impl Console {
    pub fn new(config: ConsoleConfig) -> Self {
        Console {
            config,
            cpu: CPU::new(),
            bus: None,
            run_state: RunState::Running,
            frame_count: 0,
            video_sink: None,
            audio_sink: None,
            input: None,
            battery: None,
            argb: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            audio: Vec::new(),
        }
    }

    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }

    pub fn set_video_sink(&mut self, sink: impl VideoSink + 'static) {
        self.video_sink = Some(Box::new(sink));
    }

    pub fn set_audio_sink(&mut self, sink: impl AudioSink + 'static) {
        self.audio_sink = Some(Box::new(sink));
    }

    pub fn set_input_provider(&mut self, input: impl InputProvider + 'static) {
        self.input = Some(Box::new(input));
    }

    pub fn set_battery_store(&mut self, store: impl BatteryStore + 'static) {
        self.battery = Some(Box::new(store));
    }

    /// Loads a ROM image and powers the console on. On error the previous
    /// cartridge, if any, stays in place.
    pub fn load(&mut self, raw: &[u8], db: Option<&dyn GameDatabase>) -> Result<(), ConsoleError> {
        let cartridge = Cartridge::load(raw, db)?;
        self.unload();

        let region = self
            .config
            .region
            .or(cartridge.region())
            .unwrap_or_default();
        info!(
            "Loaded ROM {} (mapper {}.{}, {:?})",
            cartridge.sha1(),
            cartridge.mapper_id(),
            cartridge.submapper(),
            region
        );

        let mut bus = NesBus::new(cartridge, region, &self.config);
        if let Some(store) = self.battery.as_mut() {
            if bus.cartridge.has_battery() {
                if let Some(data) = store.load(bus.cartridge.sha1()) {
                    bus.cartridge.load_battery_ram(&data);
                }
            }
        }

        self.cpu = CPU::new();
        self.bus = Some(bus);
        self.frame_count = 0;
        self.run_state = RunState::Running;
        Ok(())
    }

    /// Writes battery RAM back to the store and drops the cartridge.
    pub fn unload(&mut self) {
        self.flush_battery();
        if let Some(bus) = self.bus.take() {
            info!("Unloaded ROM {}", bus.cartridge.sha1());
        }
    }

    pub fn flush_battery(&mut self) {
        let (Some(bus), Some(store)) = (self.bus.as_ref(), self.battery.as_mut()) else {
            return;
        };
        if let Some(ram) = bus.cartridge.battery_ram() {
            store.save(bus.cartridge.sha1(), ram);
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.bus.is_some()
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.bus.as_ref().map(|bus| &bus.cartridge)
    }

    pub fn region(&self) -> Option<Region> {
        self.bus.as_ref().map(NesBus::region)
    }

    pub fn cpu(&self) -> &CPU {
        &self.cpu
    }

    pub fn bus(&self) -> Option<&NesBus> {
        self.bus.as_ref()
    }

    pub fn bus_mut(&mut self) -> Option<&mut NesBus> {
        self.bus.as_mut()
    }

    /// Completed frames since the ROM was loaded.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Last completed picture: palette index in bits 0-5, emphasis in 6-8.
    pub fn frame_buffer(&self) -> Option<&[u16]> {
        self.bus.as_ref().map(|bus| bus.ppu.frame_buffer())
    }

    /// CPU-visible byte without read side effects.
    pub fn peek(&self, addr: u16) -> Option<u8> {
        self.bus.as_ref().map(|bus| bus.peek(addr))
    }

    pub fn set_buttons(&mut self, port: usize, buttons: JoypadButtons) {
        if let Some(joypad) = self.bus.as_mut().and_then(|bus| bus.joypads.get_mut(port)) {
            joypad.set_buttons(buttons);
        }
    }

    /// Soft reset keeps RAM; a hard reset is a power cycle and refills RAM
    /// per the configured power-on state.
    pub fn reset(&mut self, soft: bool) -> Result<(), ConsoleError> {
        let bus = self.bus.as_mut().ok_or(ConsoleError::NoCartridge)?;
        bus.reset(soft, &self.config);
        self.cpu.reset(soft);
        self.run_state = RunState::Running;
        info!("{}", if soft { "Soft reset" } else { "Power cycle" });
        Ok(())
    }

    pub fn pause(&mut self) {
        self.run_state = RunState::Paused;
    }

    pub fn resume(&mut self) {
        self.run_state = RunState::Running;
    }

    pub fn is_paused(&self) -> bool {
        self.run_state == RunState::Paused
    }

    /// Emulates one frame unless paused. Returns whether it ran.
    pub fn run_frame(&mut self) -> Result<bool, ConsoleError> {
        if self.is_paused() {
            return Ok(false);
        }
        self.step_frame()?;
        Ok(true)
    }

    /// Runs one CPU cycle (with its PPU dots). Returns true when an
    /// instruction or interrupt sequence finished on it.
    pub fn step_cycle(&mut self) -> Result<bool, ConsoleError> {
        let bus = self.bus.as_mut().ok_or(ConsoleError::NoCartridge)?;
        if bus.dots_owed() == 0 {
            bus.begin_cycle();
        }
        let done = Self::finish_cycle(&mut self.cpu, bus);
        self.check_frame_end();
        Ok(done?)
    }

    /// Runs a single PPU dot. The CPU part of a cycle runs after its last
    /// dot.
    pub fn step_dot(&mut self) -> Result<(), ConsoleError> {
        let bus = self.bus.as_mut().ok_or(ConsoleError::NoCartridge)?;
        if bus.dots_owed() == 0 {
            bus.begin_cycle();
        }
        bus.run_dot();
        let result = if bus.dots_owed() == 0 {
            Self::finish_cycle(&mut self.cpu, bus).map(|_| ())
        } else {
            Ok(())
        };
        self.check_frame_end();
        Ok(result?)
    }

    /// Runs until the instruction in flight completes. Returns the number of
    /// CPU cycles spent, DMA stalls included.
    pub fn step_instruction(&mut self) -> Result<u64, ConsoleError> {
        let mut cycles = 1;
        while !self.step_cycle()? {
            cycles += 1;
        }
        trace_obj!(&self.cpu);
        Ok(cycles)
    }

    pub fn step_scanline(&mut self) -> Result<(), ConsoleError> {
        let start = self.bus.as_ref().ok_or(ConsoleError::NoCartridge)?.ppu.scanline;
        loop {
            self.step_dot()?;
            if self.bus.as_ref().is_some_and(|bus| bus.ppu.scanline != start) {
                return Ok(());
            }
        }
    }

    pub fn step_frame(&mut self) -> Result<(), ConsoleError> {
        let start = self.frame_count;
        while self.frame_count == start {
            self.step_cycle()?;
        }
        Ok(())
    }

    /// The "NESS" file: magic, version, ROM SHA-1, snapshot bytes.
    pub fn save_state(&self) -> Result<Vec<u8>, ConsoleError> {
        let bus = self.bus.as_ref().ok_or(StateError::NoCartridge)?;
        let mut s = Snapshot::new();
        s.write_snapshot("cpu", &self.cpu);
        s.write_snapshot("bus", bus);
        s.write_enum("region", bus.region());
        s.write("frameCount", self.frame_count);

        let body = s.to_bytes();
        let mut out = Vec::with_capacity(STATE_HEADER_LEN + body.len());
        out.extend_from_slice(STATE_MAGIC);
        out.extend_from_slice(&STATE_VERSION.to_le_bytes());
        out.extend_from_slice(bus.cartridge.sha1().as_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Verifies the header before touching any component; a rejected file
    /// restores nothing.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), ConsoleError> {
        let bus = self.bus.as_mut().ok_or(StateError::NoCartridge)?;

        if data.len() < STATE_HEADER_LEN || &data[..STATE_MAGIC.len()] != STATE_MAGIC {
            warn!("Rejected save state: bad magic");
            return Err(StateError::BadMagic.into());
        }
        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != STATE_VERSION {
            warn!("Rejected save state: version {version}");
            return Err(StateError::UnsupportedVersion(version).into());
        }
        let sha1 = String::from_utf8_lossy(&data[6..STATE_HEADER_LEN]);
        if sha1 != bus.cartridge.sha1() {
            warn!("Rejected save state: made for ROM {sha1}");
            return Err(StateError::RomMismatch {
                expected: sha1.into_owned(),
                actual: bus.cartridge.sha1().to_string(),
            }
            .into());
        }

        let s = Snapshot::from_bytes(&data[STATE_HEADER_LEN..]);
        if s.nested("cpu").is_none() || s.nested("bus").is_none() {
            warn!("Rejected save state: body does not decode");
            return Err(StateError::Corrupt.into());
        }
        let region = s.read_enum("region", bus.region());
        if region != bus.region() {
            warn!("Save state was made on {region:?}, console runs {:?}", bus.region());
        }
        s.restore_nested("bus", bus);
        s.restore_nested("cpu", &mut self.cpu);
        self.frame_count = s.read("frameCount");
        info!("Loaded save state ({} bytes)", data.len());
        Ok(())
    }

    fn finish_cycle(cpu: &mut CPU, bus: &mut NesBus) -> Result<bool, CpuError> {
        bus.finish_cycle();
        if bus.run_dma_cycle() {
            cpu.stall_cycle(bus);
            return Ok(false);
        }
        cpu.tick(bus)
    }

    fn check_frame_end(&mut self) {
        if self.bus.as_mut().is_some_and(NesBus::take_frame_complete) {
            self.end_frame();
        }
    }

    /// Hands the frame and its audio to the sinks, then polls input for the
    /// next one.
    fn end_frame(&mut self) {
        self.frame_count += 1;
        let Some(bus) = self.bus.as_mut() else {
            return;
        };

        if let Some(sink) = self.video_sink.as_mut() {
            bus.ppu.write_argb(&mut self.argb);
            sink.frame(&self.argb, SCREEN_WIDTH, SCREEN_HEIGHT);
        }

        // Always drain so the resampler never fills up
        bus.apu.end_frame();
        let stereo = self.config.stereo;
        let channels = if stereo { 2 } else { 1 };
        self.audio.resize(bus.apu.samples_available() * channels, 0);
        let count = bus.apu.read_samples(&mut self.audio, stereo);
        if let Some(sink) = self.audio_sink.as_mut() {
            sink.samples(&self.audio[..count * channels], count, bus.apu.sample_rate(), stereo);
        }

        if let Some(input) = self.input.as_mut() {
            for (port, joypad) in bus.joypads.iter_mut().enumerate() {
                joypad.set_buttons(input.poll(port));
            }
        }
    }
}

impl Drop for Console {
    fn drop(&mut self) {
        self.flush_battery();
    }
}

#[cfg(test)]
mod console_tests;
