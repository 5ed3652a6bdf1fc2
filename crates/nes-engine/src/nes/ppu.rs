use crate::nes::cartridge::rom::Mirroring;
use crate::nes::ppu::nmi::{NmiEvent, NmiLine};
use crate::nes::ppu::registers::control_register::ControlRegister;
use crate::nes::ppu::registers::mask_register::MaskRegister;
use crate::nes::ppu::registers::open_bus::OpenBus;
use crate::nes::ppu::registers::scroll_register::ScrollRegister;
use crate::nes::ppu::registers::status_register::StatusRegister;
use crate::nes::ppu::scheduler::{PpuOperation, RENDER_OPS, ScanlineKind, bit, dot_operations};
use crate::nes::ppu::sprites::SpriteEvaluation;
use crate::nes::region::Region;
use crate::nes::snapshot::{Snapshot, Snapshotable};
use crate::nes::tracer::Traceable;
use crate::{trace, trace_ppu_event};

mod background;
pub mod nmi;
pub mod palette;
pub mod registers;
mod scheduler;
mod sprites;

pub const SCREEN_WIDTH: usize = 256;
pub const SCREEN_HEIGHT: usize = 240;

/// Sprite slots per line when the 8-sprite limit is lifted.
pub const MAX_SPRITES: usize = 64;

const PRIMARY_OAM_SIZE: usize = 256;
const SECONDARY_OAM_SIZE: usize = 32;
const VRAM_SIZE: usize = 0x1000; // room for four-screen boards
const NAME_TABLE_SIZE: u16 = 0x400;
const PALETTE_SIZE: usize = 0x20;
const OPEN_BUS_DECAY_FRAMES: u32 = 30;
const VRAM_ADDR_DELAY: u8 = 3;

// Blargg's power-up palette
const POWER_UP_PALETTE: [u8; PALETTE_SIZE] = [
    0x09, 0x01, 0x00, 0x01, 0x00, 0x02, 0x02, 0x0D, 0x08, 0x10, 0x08, 0x24, 0x00, 0x00, 0x04, 0x2C,
    0x09, 0x01, 0x34, 0x03, 0x00, 0x04, 0x00, 0x14, 0x08, 0x3A, 0x00, 0x02, 0x00, 0x20, 0x2C, 0x08,
];

/// The PPU's view of the cartridge: pattern tables, nametable mirroring and
/// the address lines mappers watch.
pub trait PpuBusInterface {
    fn ppu_bus_read(&mut self, addr: u16) -> u8;
    fn ppu_bus_write(&mut self, addr: u16, value: u8);
    fn mirroring(&self) -> Mirroring;

    /// Called with every address the PPU puts on its bus.
    fn notify_vram_address(&mut self, _addr: u16, _ppu_cycle: u64) {}

    /// Side-effect free pattern read.
    fn chr_peek(&self, addr: u16) -> u8;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PpuOptions {
    pub remove_sprite_limit: bool,
    pub disable_sprite_overflow: bool,
}

enum PaletteKind {
    Background,
    Sprite,
}

pub struct PPU {
    region: Region,
    pub dot: u16,
    pub scanline: i16,
    pub frame_count: u32,
    pub ppu_cycles: u64,
    frame_is_odd: bool,

    pub vram: [u8; VRAM_SIZE],
    read_buffer: u8,
    open_bus: OpenBus,
    pub palette_table: [u8; PALETTE_SIZE],

    pub ctrl_register: ControlRegister,  // $2000 (W)
    pub mask_register: MaskRegister,     // $2001 (W)
    pub status_register: StatusRegister, // $2002 (R)
    pub scroll_register: ScrollRegister, // $2005 / $2006 (write latched)
    nmi: NmiLine,
    pending_vram_addr: Option<u16>,
    vram_addr_delay: u8,

    pub oam_addr: u8,                            // $2003 (W)
    pub oam_data: [u8; PRIMARY_OAM_SIZE],        // $2004 (R/W)
    pub secondary_oam: [u8; SECONDARY_OAM_SIZE], // up to 8 sprites for the next line
    oam_latch: u8,
    sprite_eval: SpriteEvaluation,
    sprite_fetch_low: u8,
    extra_sprites: Vec<usize>,
    remove_sprite_limit: bool,
    disable_sprite_overflow: bool,

    // Sprite output units
    sprite_pattern_low: [u8; MAX_SPRITES],
    sprite_pattern_high: [u8; MAX_SPRITES],
    sprite_x_counter: [u8; MAX_SPRITES],
    sprite_attributes: [u8; MAX_SPRITES],
    sprite_count: usize,
    sprite_zero_in_range: bool,

    // Background shifters & latches
    bg_pattern_shift_low: u16,
    bg_pattern_shift_high: u16,
    bg_attr_shift_low: u16,
    bg_attr_shift_high: u16,
    bg_attr_latch_low: u8,
    bg_attr_latch_high: u8,
    next_tile_id: u8,
    next_tile_attr: u8,
    next_tile_lsb: u8,
    next_tile_msb: u8,

    /// Palette index (bits 0-5) and emphasis (bits 6-8) per pixel
    frame_buffer: Vec<u16>,
}

impl PPU {
    pub fn new(region: Region, options: PpuOptions) -> Self {
        PPU {
            region,
            dot: 0,
            scanline: -1,
            frame_count: 0,
            ppu_cycles: 0,
            frame_is_odd: false,

            vram: [0; VRAM_SIZE],
            read_buffer: 0,
            open_bus: OpenBus::new(OPEN_BUS_DECAY_FRAMES),
            palette_table: POWER_UP_PALETTE,

            ctrl_register: ControlRegister::new(),
            mask_register: MaskRegister::new(),
            status_register: StatusRegister::new(),
            scroll_register: ScrollRegister::new(),
            nmi: NmiLine::default(),
            pending_vram_addr: None,
            vram_addr_delay: 0,

            oam_addr: 0,
            oam_data: [0; PRIMARY_OAM_SIZE],
            secondary_oam: [0xFF; SECONDARY_OAM_SIZE],
            oam_latch: 0xFF,
            sprite_eval: SpriteEvaluation::default(),
            sprite_fetch_low: 0,
            extra_sprites: Vec::with_capacity(MAX_SPRITES),
            remove_sprite_limit: options.remove_sprite_limit,
            disable_sprite_overflow: options.disable_sprite_overflow,

            sprite_pattern_low: [0; MAX_SPRITES],
            sprite_pattern_high: [0; MAX_SPRITES],
            sprite_x_counter: [0xFF; MAX_SPRITES],
            sprite_attributes: [0; MAX_SPRITES],
            sprite_count: 0,
            sprite_zero_in_range: false,

            bg_pattern_shift_low: 0,
            bg_pattern_shift_high: 0,
            bg_attr_shift_low: 0,
            bg_attr_shift_high: 0,
            bg_attr_latch_low: 0,
            bg_attr_latch_high: 0,
            next_tile_id: 0,
            next_tile_attr: 0,
            next_tile_lsb: 0,
            next_tile_msb: 0,

            frame_buffer: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
        }
    }

    /// A soft reset only clears the registers the reset line reaches; memory,
    /// OAM and palette survive. A hard reset is a power cycle.
    pub fn reset(&mut self, soft: bool) {
        if !soft {
            let options = PpuOptions {
                remove_sprite_limit: self.remove_sprite_limit,
                disable_sprite_overflow: self.disable_sprite_overflow,
            };
            *self = PPU::new(self.region, options);
            return;
        }

        self.ctrl_register = ControlRegister::new();
        self.mask_register = MaskRegister::new();
        self.scroll_register.w = false;
        self.scroll_register.t = 0;
        self.scroll_register.x = 0;
        self.read_buffer = 0;
        self.pending_vram_addr = None;
        self.vram_addr_delay = 0;
        self.nmi.on_event(NmiEvent::EnableChanged(false));
        self.frame_is_odd = false;
        self.scanline = -1;
        self.dot = 0;
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn set_options(&mut self, options: PpuOptions) {
        self.remove_sprite_limit = options.remove_sprite_limit;
        self.disable_sprite_overflow = options.disable_sprite_overflow;
    }

    /// Level of the /NMI output.
    pub fn nmi_line(&self) -> bool {
        self.nmi.level()
    }

    pub fn frame_buffer(&self) -> &[u16] {
        &self.frame_buffer
    }

    /// Converts the current frame to packed 0xAARRGGBB.
    pub fn write_argb(&self, out: &mut [u32]) {
        for (dst, &pixel) in out.iter_mut().zip(self.frame_buffer.iter()) {
            *dst = palette::to_argb(pixel);
        }
    }

    pub fn read_register(&mut self, addr: u16, bus: &mut dyn PpuBusInterface) -> u8 {
        match addr & 7 {
            2 => self.read_status(),
            4 => {
                let value = if self.is_rendering() {
                    self.oam_latch
                } else {
                    self.oam_data[self.oam_addr as usize]
                };
                self.open_bus.set(value, self.frame_count);
                value
            }
            7 => self.read_data(bus),
            // write-only registers return open bus
            _ => self.open_bus.output(),
        }
    }

    pub fn write_register(&mut self, addr: u16, value: u8, bus: &mut dyn PpuBusInterface) {
        self.open_bus.set(value, self.frame_count);

        match addr & 7 {
            0 => self.write_to_ctrl(value),
            1 => self.mask_register.update(value),
            2 => {}
            3 => self.oam_addr = value,
            4 => self.write_to_oam_data(value),
            5 => self.scroll_register.write_scroll(value),
            6 => {
                if let Some(addr) = self.scroll_register.write_to_addr(value) {
                    self.pending_vram_addr = Some(addr);
                    self.vram_addr_delay = VRAM_ADDR_DELAY;
                }
            }
            _ => self.write_data(value, bus),
        }
    }

    /// Advances the PPU by one dot. Returns true when the last visible line
    /// has been output.
    pub fn tick(&mut self, bus: &mut dyn PpuBusInterface) -> bool {
        let frame_complete = self.advance_position();
        self.ppu_cycles += 1;
        self.run_dot(bus);
        frame_complete
    }

    #[cfg(test)]
    pub fn run_until_vblank(&mut self, bus: &mut dyn PpuBusInterface) {
        while !self.status_register.vblank_active() {
            self.tick(bus);
        }
    }
}

// Private implementations
impl PPU {
    fn advance_position(&mut self) -> bool {
        if self.scanline == -1
            && self.dot == 339
            && self.frame_is_odd
            && self.region.skips_odd_frame_dot()
            && self.mask_register.rendering_enabled()
        {
            trace_ppu_event!(
                "ODD SKIP      frame={} ppu_cycle={}",
                self.frame_count,
                self.ppu_cycles
            );
            self.dot = 340;
        }

        self.dot += 1;
        if self.dot > 340 {
            self.dot = 0;
            self.scanline += 1;
            if self.scanline > self.region.last_scanline() {
                self.scanline = -1;
                self.frame_is_odd = !self.frame_is_odd;
            }
        }
        debug_assert!(self.scanline <= self.region.last_scanline(), "scanline out of range");

        if self.scanline == SCREEN_HEIGHT as i16 && self.dot == 0 {
            self.frame_count = self.frame_count.wrapping_add(1);
            self.open_bus.decay(self.frame_count);
            trace!("[FRAME END] frame={} odd={}", self.frame_count, self.frame_is_odd);
            return true;
        }
        false
    }

    fn run_dot(&mut self, bus: &mut dyn PpuBusInterface) {
        let dot = self.dot;
        let scanline = self.scanline;

        if self.vram_addr_delay > 0 {
            self.vram_addr_delay -= 1;
            if self.vram_addr_delay == 0
                && let Some(addr) = self.pending_vram_addr.take()
            {
                self.scroll_register.v = addr;
                if !self.is_rendering() {
                    bus.notify_vram_address(addr & 0x3FFF, self.ppu_cycles);
                }
            }
        }

        if scanline == -1 && dot == 1 {
            trace_ppu_event!("VBLANK CLEAR  frame={} ppu_cycle={}", self.frame_count, self.ppu_cycles);
            self.status_register.reset_vblank_status();
            self.status_register.set_sprite_zero_hit(false);
            self.status_register.set_sprite_overflow(false);
            self.nmi.on_event(NmiEvent::VBlankCleared);
        }

        if scanline == self.region.vblank_scanline() && dot == 1 {
            let suppressed = self.nmi.vblank_suppressed();
            trace_ppu_event!(
                "VBLANK SET    frame={} ppu_cycle={} suppressed={}",
                self.frame_count,
                self.ppu_cycles,
                suppressed
            );
            if !suppressed {
                self.status_register.set_vblank_started();
            }
            self.nmi.on_event(NmiEvent::VBlankSet);
        }

        let rendering = self.mask_register.rendering_enabled();
        for op in dot_operations(ScanlineKind::of(scanline), dot).iter() {
            if !rendering && bit(op) & RENDER_OPS != 0 {
                continue;
            }
            match op {
                PpuOperation::RenderPixel => self.render_dot(dot - 1),
                PpuOperation::ShiftRegisters => {
                    self.shift_background_registers();
                    if scanline >= 0 && dot <= 256 {
                        self.shift_sprite_registers();
                    }
                }
                PpuOperation::FetchNameTable => self.fetch_name_table_byte(bus),
                PpuOperation::FetchAttribute => self.fetch_attribute_byte(bus),
                PpuOperation::FetchTileLow => self.fetch_tile_low_byte(bus),
                PpuOperation::FetchTileHigh => self.fetch_tile_high_byte(bus),
                PpuOperation::LoadBackgroundRegisters => self.load_background_registers(),
                PpuOperation::IncCoarseX => self.scroll_register.increment_x(),
                PpuOperation::IncFineY => self.scroll_register.increment_y(),
                PpuOperation::CopyHorizV => self.scroll_register.copy_horizontal_bits(),
                PpuOperation::CopyVertV => self.scroll_register.copy_vertical_bits(),
                PpuOperation::ClearSecondaryOam => self.clear_secondary_oam(dot),
                PpuOperation::EvaluateSprites => self.evaluate_sprites(dot),
                PpuOperation::FetchSprites => self.fetch_sprites(bus, dot),
                PpuOperation::None => {}
            }
        }
    }

    fn is_rendering(&self) -> bool {
        self.scanline < SCREEN_HEIGHT as i16 && self.mask_register.rendering_enabled()
    }

    fn render_dot(&mut self, x: u16) {
        let color = if self.mask_register.rendering_enabled() {
            self.composite_pixel(x)
        } else {
            // Backdrop, unless v points into palette RAM
            let v = self.scroll_register.v & 0x3FFF;
            if v >= 0x3F00 {
                self.palette_table[self.mirror_palette_addr(v)]
            } else {
                self.palette_table[0]
            }
        };

        let gray_mask = if self.mask_register.is_grayscale() { 0x30 } else { 0x3F };
        let emphasis = self.mask_register.emphasis(self.region.swaps_emphasis()) as u16;
        let index = self.scanline as usize * SCREEN_WIDTH + x as usize;
        self.frame_buffer[index] = (color & gray_mask) as u16 | (emphasis << 6);
    }

    fn composite_pixel(&mut self, x: u16) -> u8 {
        let (bg_palette_index, bg_pixel) = self.get_background_pixel(x);
        let (sprite_palette_index, sprite_pixel, sprite_in_front, sprite_zero_rendered) =
            self.get_sprite_pixel(x);

        // Clipping and show bits already zeroed the clipped pixels above
        if sprite_zero_rendered
            && bg_pixel != 0
            && x != 255
            && !self.status_register.sprite_zero_hit()
        {
            trace!("set_sprite_zero_hit @ scanline {} dot {}", self.scanline, self.dot);
            self.status_register.set_sprite_zero_hit(true);
        }

        let (palette, pixel, kind) = if sprite_pixel == 0 {
            (bg_palette_index, bg_pixel, PaletteKind::Background)
        } else if bg_pixel == 0 || sprite_in_front {
            (sprite_palette_index, sprite_pixel, PaletteKind::Sprite)
        } else {
            (bg_palette_index, bg_pixel, PaletteKind::Background)
        };

        self.read_palette_color(palette, pixel, kind)
    }

    fn read_palette_color(&self, palette: u8, pixel: u8, palette_kind: PaletteKind) -> u8 {
        if pixel == 0 {
            return self.palette_table[0]; // universal background color
        }
        let base = match palette_kind {
            PaletteKind::Background => 0x3F00,
            PaletteKind::Sprite => 0x3F10,
        };
        let addr = base + ((palette as u16) << 2) + pixel as u16;
        self.palette_table[self.mirror_palette_addr(addr)]
    }

    fn read_status(&mut self) -> u8 {
        // bits 7-5 real status, bits 4-0 open bus
        let result = (self.status_register.bits() & 0xE0) | (self.open_bus.output() & 0x1F);

        self.status_register.reset_vblank_status();
        self.scroll_register.reset_latch();
        self.nmi.on_event(NmiEvent::StatusReadClearsVBlank);

        // One dot before the flag goes up: neither flag nor NMI this frame
        if self.scanline == self.region.vblank_scanline() && self.dot == 0 {
            trace_ppu_event!("VBLANK RACE   frame={} ppu_cycle={}", self.frame_count, self.ppu_cycles);
            self.nmi.on_event(NmiEvent::StatusReadBeforeVBlank);
        }

        self.open_bus.set_masked(result, 0xE0, self.frame_count);
        result
    }

    fn read_data(&mut self, bus: &mut dyn PpuBusInterface) -> u8 {
        let addr = self.scroll_register.get_addr() & 0x3FFF;

        let result = if addr >= 0x3F00 {
            // Palette reads are immediate; the buffer gets the nametable
            // byte "underneath" the palette
            let gray_mask = if self.mask_register.is_grayscale() { 0x30 } else { 0x3F };
            let value = (self.palette_table[self.mirror_palette_addr(addr)] & gray_mask)
                | (self.open_bus.output() & 0xC0);
            self.read_buffer = self.read_bus(bus, addr & 0x2FFF);
            self.open_bus.set_masked(value, 0x3F, self.frame_count);
            value
        } else {
            let value = self.read_buffer;
            self.read_buffer = self.read_bus(bus, addr);
            self.open_bus.set(value, self.frame_count);
            value
        };

        self.advance_vram_addr(bus);
        result
    }

    fn write_data(&mut self, value: u8, bus: &mut dyn PpuBusInterface) {
        let addr = self.scroll_register.get_addr() & 0x3FFF;

        match addr {
            0x0000..=0x1FFF => {
                bus.notify_vram_address(addr, self.ppu_cycles);
                bus.ppu_bus_write(addr, value);
            }
            0x2000..=0x3EFF => {
                bus.notify_vram_address(addr, self.ppu_cycles);
                let mirrored = self.mirror_ram_addr(addr, bus.mirroring());
                self.vram[mirrored as usize] = value;
            }
            _ => {
                let index = self.mirror_palette_addr(addr);
                self.palette_table[index] = value & 0x3F;
            }
        }

        self.advance_vram_addr(bus);
    }

    /// $2007 access moves v by 1 or 32, except while rendering where the
    /// fetch logic's coarse X and Y increments fire together.
    fn advance_vram_addr(&mut self, bus: &mut dyn PpuBusInterface) {
        if self.is_rendering() {
            self.scroll_register.increment_x();
            self.scroll_register.increment_y();
        } else {
            self.scroll_register
                .increment_addr(self.ctrl_register.addr_increment());
            bus.notify_vram_address(self.scroll_register.v & 0x3FFF, self.ppu_cycles);
        }
    }

    /// Unbuffered read from PPU address space, visible to the cartridge.
    fn read_bus(&mut self, bus: &mut dyn PpuBusInterface, addr: u16) -> u8 {
        let addr = addr & 0x3FFF;
        bus.notify_vram_address(addr, self.ppu_cycles);
        match addr {
            0x0000..=0x1FFF => bus.ppu_bus_read(addr),
            0x2000..=0x3EFF => {
                let mirrored = self.mirror_ram_addr(addr, bus.mirroring());
                self.vram[mirrored as usize]
            }
            _ => self.palette_table[self.mirror_palette_addr(addr)],
        }
    }

    fn write_to_oam_data(&mut self, value: u8) {
        if self.is_rendering() {
            // Writes are dropped but bump the sprite index
            self.oam_addr = self.oam_addr.wrapping_add(4);
            return;
        }
        // Attribute bits 2-4 do not exist
        let value = if self.oam_addr & 0x03 == 2 { value & 0xE3 } else { value };
        self.oam_data[self.oam_addr as usize] = value;
        self.oam_addr = self.oam_addr.wrapping_add(1);
    }

    fn write_to_ctrl(&mut self, value: u8) {
        self.ctrl_register.update(value);
        self.nmi
            .on_event(NmiEvent::EnableChanged(self.ctrl_register.nmi_enabled()));

        // Bits 0-1 select the base nametable, bits 10-11 of t
        const NT_BITS_MASK: u16 = 0x0C00;
        self.scroll_register.t =
            (self.scroll_register.t & !NT_BITS_MASK) | self.ctrl_register.nametable_bits();
    }

    pub fn mirror_palette_addr(&self, addr: u16) -> usize {
        let index = (addr & 0x1F) as usize;
        // $3F10/$3F14/$3F18/$3F1C mirror the background entries
        if index >= 0x10 && index & 0x03 == 0 {
            index - 0x10
        } else {
            index
        }
    }

    pub fn mirror_ram_addr(&self, addr: u16, mirroring: Mirroring) -> u16 {
        let index = (addr & 0x2FFF) - 0x2000;
        let table = (index / NAME_TABLE_SIZE) as u8;
        let offset = index % NAME_TABLE_SIZE;
        mirroring.page(table) as u16 * NAME_TABLE_SIZE + offset
    }
}

impl Snapshotable for PPU {
    fn save(&self, s: &mut Snapshot) {
        s.write("dot", self.dot);
        s.write("scanline", self.scanline);
        s.write("frameCount", self.frame_count);
        s.write("ppuCycles", self.ppu_cycles);
        s.write("oddFrame", self.frame_is_odd);

        s.write_bytes("vram", &self.vram);
        s.write("readBuffer", self.read_buffer);
        s.write("openBus", self.open_bus.output());
        s.write("openBusStamps", self.open_bus.stamps().to_vec());
        s.write_bytes("palette", &self.palette_table);

        s.write("ctrl", self.ctrl_register.bits());
        s.write("mask", self.mask_register.bits());
        s.write("status", self.status_register.bits());
        s.write("v", self.scroll_register.v);
        s.write("t", self.scroll_register.t);
        s.write("x", self.scroll_register.x);
        s.write("w", self.scroll_register.w);
        s.write("nmiEnabled", self.nmi.enabled());
        s.write("nmiVBlank", self.nmi.vblank());
        s.write("nmiSuppress", self.nmi.vblank_suppressed());
        if let Some(addr) = self.pending_vram_addr {
            s.write("pendingVramAddr", addr);
        }
        s.write("vramAddrDelay", self.vram_addr_delay);

        s.write("oamAddr", self.oam_addr);
        s.write_bytes("oam", &self.oam_data);
        s.write_bytes("secondaryOam", &self.secondary_oam);
        s.write("oamLatch", self.oam_latch);
        s.write("evalSecondaryAddr", self.sprite_eval.secondary_addr);
        s.write("evalCopyRemaining", self.sprite_eval.copy_remaining);
        s.write("evalDone", self.sprite_eval.done);
        s.write("evalOverflowCopy", self.sprite_eval.overflow_copy);
        s.write("evalSpriteZero", self.sprite_eval.sprite_zero_found);
        s.write("spriteFetchLow", self.sprite_fetch_low);
        s.write_bytes("spritePatternLow", &self.sprite_pattern_low);
        s.write_bytes("spritePatternHigh", &self.sprite_pattern_high);
        s.write_bytes("spriteX", &self.sprite_x_counter);
        s.write_bytes("spriteAttributes", &self.sprite_attributes);
        s.write("spriteCount", self.sprite_count as u8);
        s.write("spriteZeroInRange", self.sprite_zero_in_range);
        let extra: Vec<u8> = self.extra_sprites.iter().map(|&n| n as u8).collect();
        s.write("extraSprites", extra);

        s.write("bgPatternLow", self.bg_pattern_shift_low);
        s.write("bgPatternHigh", self.bg_pattern_shift_high);
        s.write("bgAttrLow", self.bg_attr_shift_low);
        s.write("bgAttrHigh", self.bg_attr_shift_high);
        s.write("bgAttrLatchLow", self.bg_attr_latch_low);
        s.write("bgAttrLatchHigh", self.bg_attr_latch_high);
        s.write("nextTileId", self.next_tile_id);
        s.write("nextTileAttr", self.next_tile_attr);
        s.write("nextTileLsb", self.next_tile_lsb);
        s.write("nextTileMsb", self.next_tile_msb);

        s.write("frameBuffer", self.frame_buffer.clone());
    }

    fn restore(&mut self, s: &Snapshot) {
        self.dot = s.read::<u16>("dot").min(340);
        self.scanline = s
            .read::<i16>("scanline")
            .clamp(-1, self.region.last_scanline());
        self.frame_count = s.read("frameCount");
        self.ppu_cycles = s.read("ppuCycles");
        self.frame_is_odd = s.read("oddFrame");

        s.read_bytes_into("vram", &mut self.vram);
        self.read_buffer = s.read("readBuffer");
        let stamps: Vec<u32> = s.read("openBusStamps");
        self.open_bus.restore(s.read("openBus"), &stamps);
        s.read_bytes_into("palette", &mut self.palette_table);

        self.ctrl_register = ControlRegister::from_bits_truncate(s.read("ctrl"));
        self.mask_register = MaskRegister::from_bits_truncate(s.read("mask"));
        self.status_register = StatusRegister::from_bits_truncate(s.read("status"));
        self.scroll_register.v = s.read::<u16>("v") & 0x7FFF;
        self.scroll_register.t = s.read::<u16>("t") & 0x7FFF;
        self.scroll_register.x = s.read::<u8>("x") & 0x07;
        self.scroll_register.w = s.read("w");
        self.nmi.restore(
            s.read("nmiEnabled"),
            s.read("nmiVBlank"),
            s.read("nmiSuppress"),
        );
        self.pending_vram_addr = s.read_opt("pendingVramAddr");
        self.vram_addr_delay = s.read("vramAddrDelay");

        self.oam_addr = s.read("oamAddr");
        s.read_bytes_into("oam", &mut self.oam_data);
        s.read_bytes_into("secondaryOam", &mut self.secondary_oam);
        self.oam_latch = s.read("oamLatch");
        self.sprite_eval = SpriteEvaluation {
            secondary_addr: s.read::<u8>("evalSecondaryAddr").min(SECONDARY_OAM_SIZE as u8),
            copy_remaining: s.read("evalCopyRemaining"),
            done: s.read("evalDone"),
            overflow_copy: s.read("evalOverflowCopy"),
            sprite_zero_found: s.read("evalSpriteZero"),
        };
        self.sprite_fetch_low = s.read("spriteFetchLow");
        s.read_bytes_into("spritePatternLow", &mut self.sprite_pattern_low);
        s.read_bytes_into("spritePatternHigh", &mut self.sprite_pattern_high);
        s.read_bytes_into("spriteX", &mut self.sprite_x_counter);
        s.read_bytes_into("spriteAttributes", &mut self.sprite_attributes);
        self.sprite_count = (s.read::<u8>("spriteCount") as usize).min(MAX_SPRITES);
        self.sprite_zero_in_range = s.read("spriteZeroInRange");
        let extra: Vec<u8> = s.read("extraSprites");
        self.extra_sprites = extra
            .into_iter()
            .map(|n| n as usize % 64)
            .take(MAX_SPRITES - 8)
            .collect();

        self.bg_pattern_shift_low = s.read("bgPatternLow");
        self.bg_pattern_shift_high = s.read("bgPatternHigh");
        self.bg_attr_shift_low = s.read("bgAttrLow");
        self.bg_attr_shift_high = s.read("bgAttrHigh");
        self.bg_attr_latch_low = s.read("bgAttrLatchLow");
        self.bg_attr_latch_high = s.read("bgAttrLatchHigh");
        self.next_tile_id = s.read("nextTileId");
        self.next_tile_attr = s.read("nextTileAttr");
        self.next_tile_lsb = s.read("nextTileLsb");
        self.next_tile_msb = s.read("nextTileMsb");

        let frame: Vec<u16> = s.read("frameBuffer");
        if frame.len() == self.frame_buffer.len() {
            self.frame_buffer = frame;
        }
    }
}

impl Traceable for PPU {
    fn trace_name(&self) -> &'static str {
        "PPU"
    }

    fn trace_state(&self) -> Option<String> {
        Some(format!(
            "scanline={} dot={} vblank={} nmi={} odd={} ppu_cycles={} status={:08b} v={:04X}",
            self.scanline,
            self.dot,
            self.status_register.vblank_active(),
            self.nmi.level(),
            self.frame_is_odd,
            self.ppu_cycles,
            self.status_register.bits(),
            self.scroll_register.v
        ))
    }
}
