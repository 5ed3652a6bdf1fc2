use super::{PPU, PpuBusInterface};

impl PPU {
    /// Palette and color index of the background pixel at screen column `x`.
    pub(super) fn get_background_pixel(&self, x: u16) -> (u8, u8) {
        if !self.mask_register.show_background() {
            return (0, 0);
        }
        if x < 8 && !self.mask_register.leftmost_8pxl_background() {
            return (0, 0);
        }

        let bit = 15 - self.scroll_register.x as u16;

        let pixel_low = (self.bg_pattern_shift_low >> bit) & 1;
        let pixel_high = (self.bg_pattern_shift_high >> bit) & 1;
        let pixel = ((pixel_high << 1) | pixel_low) as u8;

        let attr_low = (self.bg_attr_shift_low >> bit) & 1;
        let attr_high = (self.bg_attr_shift_high >> bit) & 1;
        let palette_index = ((attr_high << 1) | attr_low) as u8;

        (palette_index, pixel)
    }

    /// Load the next tile's pattern bytes into the low byte of the shifters
    pub(super) fn load_background_registers(&mut self) {
        self.bg_pattern_shift_low =
            (self.bg_pattern_shift_low & 0xFF00) | self.next_tile_lsb as u16;
        self.bg_pattern_shift_high =
            (self.bg_pattern_shift_high & 0xFF00) | self.next_tile_msb as u16;

        self.bg_attr_latch_low = self.next_tile_attr & 0b01;
        self.bg_attr_latch_high = (self.next_tile_attr & 0b10) >> 1;

        // Attribute bits repeated for all 8 pixels of the tile
        let attr_low_byte = if self.bg_attr_latch_low != 0 { 0xFF } else { 0x00 };
        let attr_high_byte = if self.bg_attr_latch_high != 0 { 0xFF } else { 0x00 };
        self.bg_attr_shift_low = (self.bg_attr_shift_low & 0xFF00) | attr_low_byte;
        self.bg_attr_shift_high = (self.bg_attr_shift_high & 0xFF00) | attr_high_byte;
    }

    pub(super) fn shift_background_registers(&mut self) {
        self.bg_pattern_shift_low <<= 1;
        self.bg_pattern_shift_high <<= 1;

        self.bg_attr_shift_low = (self.bg_attr_shift_low << 1) | self.bg_attr_latch_low as u16;
        self.bg_attr_shift_high = (self.bg_attr_shift_high << 1) | self.bg_attr_latch_high as u16;
    }

    // dot % 8 == 1 (and the two unused fetches at 337/339)
    pub(super) fn fetch_name_table_byte(&mut self, bus: &mut dyn PpuBusInterface) {
        let addr = 0x2000 | (self.scroll_register.v & 0x0FFF);
        self.next_tile_id = self.read_bus(bus, addr);
    }

    // dot % 8 == 3
    pub(super) fn fetch_attribute_byte(&mut self, bus: &mut dyn PpuBusInterface) {
        let v = self.scroll_register.v;

        let addr = 0x23C0
            | (v & 0x0C00)            // nametable select
            | ((v >> 4) & 0b111_000)  // (coarse_y / 4) << 3
            | ((v >> 2) & 0b000_111); // coarse_x / 4
        let attr_byte = self.read_bus(bus, addr);

        let coarse_x = v & 0b11111;
        let coarse_y = (v >> 5) & 0b11111;

        // Quadrant within the 32x32 pixel attribute area
        let shift = ((coarse_y & 0x02) << 1) | (coarse_x & 0x02);
        self.next_tile_attr = (attr_byte >> shift) & 0b11;
    }

    fn tile_row_addr(&self) -> u16 {
        let base = self.ctrl_register.background_pattern_addr();
        base + (self.next_tile_id as u16) * 16 + self.scroll_register.fine_y()
    }

    // dot % 8 == 5
    pub(super) fn fetch_tile_low_byte(&mut self, bus: &mut dyn PpuBusInterface) {
        let addr = self.tile_row_addr();
        self.next_tile_lsb = self.read_bus(bus, addr);
    }

    // dot % 8 == 7
    pub(super) fn fetch_tile_high_byte(&mut self, bus: &mut dyn PpuBusInterface) {
        let addr = self.tile_row_addr() + 8;
        self.next_tile_msb = self.read_bus(bus, addr);
    }
}
