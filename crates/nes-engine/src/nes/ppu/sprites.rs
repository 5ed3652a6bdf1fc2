use super::{MAX_SPRITES, PPU, PpuBusInterface};

/// Per-line progress of the sprite evaluation state machine (dots 65-256).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(super) struct SpriteEvaluation {
    /// Next free byte in secondary OAM; 32 once eight sprites are found
    pub secondary_addr: u8,
    /// Bytes of the current in-range sprite still to copy
    pub copy_remaining: u8,
    /// Every primary entry has been visited
    pub done: bool,
    /// Reading out the sprite that raised the overflow flag
    pub overflow_copy: bool,
    /// Primary OAM entry 0 was the first in-range sprite
    pub sprite_zero_found: bool,
}

impl SpriteEvaluation {
    pub fn found(&self) -> usize {
        (self.secondary_addr / 4) as usize
    }
}

impl PPU {
    /// Color, palette, priority and sprite-zero flag of the first opaque
    /// sprite pixel at column `x`.
    /// Returns (sprite_palette, sprite_pixel, sprite_in_front, sprite_zero_rendered)
    pub(super) fn get_sprite_pixel(&self, x: u16) -> (u8, u8, bool, bool) {
        if !self.mask_register.show_sprites() {
            return (0, 0, false, false);
        }
        if x < 8 && !self.mask_register.leftmost_8pxl_sprite() {
            return (0, 0, false, false);
        }

        for i in 0..self.sprite_count {
            if self.sprite_x_counter[i] != 0 {
                continue;
            }
            let low_bit = (self.sprite_pattern_low[i] >> 7) & 1;
            let high_bit = (self.sprite_pattern_high[i] >> 7) & 1;
            let pixel = (high_bit << 1) | low_bit;
            if pixel == 0 {
                continue;
            }

            let attributes = self.sprite_attributes[i];
            return (
                attributes & 0b11,
                pixel,
                attributes & 0b0010_0000 == 0,
                i == 0 && self.sprite_zero_in_range,
            );
        }

        (0, 0, false, false)
    }

    pub(super) fn shift_sprite_registers(&mut self) {
        for i in 0..self.sprite_count {
            if self.sprite_x_counter[i] > 0 {
                self.sprite_x_counter[i] -= 1;
            } else {
                self.sprite_pattern_low[i] <<= 1;
                self.sprite_pattern_high[i] <<= 1;
            }
        }
    }

    fn sprite_in_range(&self, y: u8) -> bool {
        let row = self.scanline as i32 - y as i32;
        row >= 0 && row < self.ctrl_register.sprite_size() as i32
    }

    /// Dots 1-64: secondary OAM is filled with $FF, one byte every two dots.
    pub(super) fn clear_secondary_oam(&mut self, dot: u16) {
        if dot == 1 {
            self.sprite_eval = SpriteEvaluation::default();
        }
        self.oam_latch = 0xFF;
        if dot % 2 == 0 {
            self.secondary_oam[((dot - 1) / 2) as usize] = 0xFF;
        }
    }

    /// Dots 65-256: odd dots read primary OAM, even dots write secondary OAM.
    /// Once eight sprites are found the hardware keeps scanning for an
    /// overflow but advances both the sprite index and the byte index on a
    /// miss, so it compares tile/attribute/X bytes as if they were Y.
    pub(super) fn evaluate_sprites(&mut self, dot: u16) {
        if dot % 2 == 1 {
            self.oam_latch = self.oam_data[self.oam_addr as usize];
            return;
        }

        if self.sprite_eval.done {
            // Writes to secondary OAM fail and read it back instead
            self.oam_addr = self.oam_addr.wrapping_add(4) & 0xFC;
            self.oam_latch = self.secondary_oam[(self.sprite_eval.secondary_addr & 0x1F) as usize];
            return;
        }

        if self.sprite_eval.copy_remaining > 0 {
            let addr = self.sprite_eval.secondary_addr;
            if addr < 32 && !self.sprite_eval.overflow_copy {
                self.secondary_oam[addr as usize] = self.oam_latch;
                self.sprite_eval.secondary_addr += 1;
            }
            self.sprite_eval.copy_remaining -= 1;
            self.oam_addr = self.oam_addr.wrapping_add(1);
            let finished = self.sprite_eval.copy_remaining == 0 && self.sprite_eval.overflow_copy;
            if self.oam_addr == 0 || finished {
                self.sprite_eval.done = true;
            }
            return;
        }

        let in_range = self.sprite_in_range(self.oam_latch);
        if self.sprite_eval.secondary_addr < 32 {
            self.secondary_oam[self.sprite_eval.secondary_addr as usize] = self.oam_latch;
            if in_range {
                if dot == 66 {
                    self.sprite_eval.sprite_zero_found = true;
                }
                self.sprite_eval.secondary_addr += 1;
                self.sprite_eval.copy_remaining = 3;
                self.oam_addr = self.oam_addr.wrapping_add(1);
            } else {
                self.advance_sprite_index(false);
            }
        } else if self.disable_sprite_overflow {
            self.sprite_eval.done = true;
        } else if in_range {
            self.status_register.set_sprite_overflow(true);
            self.sprite_eval.overflow_copy = true;
            self.sprite_eval.copy_remaining = 3;
            self.oam_addr = self.oam_addr.wrapping_add(1);
        } else {
            self.advance_sprite_index(true);
        }
    }

    /// n++ and, in overflow mode, m++ without carry into n.
    pub(super) fn advance_sprite_index(&mut self, buggy: bool) {
        let n = ((self.oam_addr >> 2) + 1) & 0x3F;
        let m = if buggy {
            self.oam_addr.wrapping_add(1) & 0x03
        } else {
            self.oam_addr & 0x03
        };
        self.oam_addr = (n << 2) | m;
        if n == 0 {
            self.sprite_eval.done = true;
        }
    }

    /// Dots 257-320: eight dots per sprite slot; OAMADDR is held at 0.
    pub(super) fn fetch_sprites(&mut self, bus: &mut dyn PpuBusInterface, dot: u16) {
        self.oam_addr = 0;
        if dot == 257 {
            self.sprite_count = if self.scanline >= 0 {
                self.sprite_eval.found()
            } else {
                0
            };
            self.sprite_zero_in_range = self.scanline >= 0 && self.sprite_eval.sprite_zero_found;
            if self.remove_sprite_limit && self.sprite_count == 8 {
                self.collect_extra_sprites();
            }
        }

        let slot = ((dot - 257) / 8) as usize;
        let base = slot * 4;
        match (dot - 257) % 8 {
            0 => {
                // Unused nametable fetch; the slot's Y and tile are read here
                let addr = 0x2000 | (self.scroll_register.v & 0x0FFF);
                self.read_bus(bus, addr);
                self.oam_latch = self.secondary_oam[base];
            }
            2 => {
                let addr = 0x2000 | (self.scroll_register.v & 0x0FFF);
                self.read_bus(bus, addr);
                self.oam_latch = self.secondary_oam[base + 2];
            }
            4 => {
                let addr = self.sprite_row_addr(slot);
                self.sprite_fetch_low = self.read_bus(bus, addr);
                self.oam_latch = self.secondary_oam[base + 3];
            }
            6 => {
                let addr = self.sprite_row_addr(slot) + 8;
                let high = self.read_bus(bus, addr);
                let low = self.sprite_fetch_low;
                self.load_sprite_slot(slot, low, high);
            }
            7 if slot == 7 && self.sprite_count > 8 => self.fetch_extra_sprites(bus),
            _ => {}
        }
    }

    /// Pattern address for the row of `slot` drawn on the next scanline.
    /// Empty slots fetch tile $FF.
    fn sprite_row_addr(&self, slot: usize) -> u16 {
        let (y, tile, attributes) = if slot < self.sprite_count.min(8) {
            let base = slot * 4;
            (
                self.secondary_oam[base],
                self.secondary_oam[base + 1],
                self.secondary_oam[base + 2],
            )
        } else {
            (self.scanline as u8, 0xFF, 0)
        };
        self.pattern_row_addr(y, tile, attributes)
    }

    fn pattern_row_addr(&self, y: u8, tile: u8, attributes: u8) -> u16 {
        let height = self.ctrl_register.sprite_size() as i16;
        let mut row = (self.scanline - y as i16).clamp(0, height - 1);
        if attributes & 0x80 != 0 {
            row = (height - 1) - row;
        }
        let row = row as u16;

        if height == 16 {
            let table = (tile & 0x01) as u16 * 0x1000;
            let tile_num = (tile & 0xFE) as u16 + (row >> 3);
            table + tile_num * 16 + (row & 0x07)
        } else {
            self.ctrl_register.sprite_pattern_addr() + (tile as u16) * 16 + row
        }
    }

    fn load_sprite_slot(&mut self, slot: usize, mut low: u8, mut high: u8) {
        if slot >= self.sprite_count {
            self.sprite_x_counter[slot] = 0xFF;
            self.sprite_attributes[slot] = 0;
            self.sprite_pattern_low[slot] = 0;
            self.sprite_pattern_high[slot] = 0;
            return;
        }

        let base = slot * 4;
        let attributes = self.secondary_oam[base + 2];
        if attributes & 0x40 != 0 {
            low = low.reverse_bits();
            high = high.reverse_bits();
        }
        self.sprite_x_counter[slot] = self.secondary_oam[base + 3];
        self.sprite_attributes[slot] = attributes;
        self.sprite_pattern_low[slot] = low;
        self.sprite_pattern_high[slot] = high;
    }

    /// Finds the in-range sprites past the eighth when the limit is lifted.
    /// Overflow detection is left to the hardware state machine.
    fn collect_extra_sprites(&mut self) {
        let mut found = 0;
        self.extra_sprites.clear();
        for n in 0..64 {
            if !self.sprite_in_range(self.oam_data[n * 4]) {
                continue;
            }
            found += 1;
            if found > 8 {
                self.extra_sprites.push(n);
            }
        }
        self.sprite_count = (8 + self.extra_sprites.len()).min(MAX_SPRITES);
    }

    /// Extra slots read CHR without touching the PPU address bus.
    fn fetch_extra_sprites(&mut self, bus: &mut dyn PpuBusInterface) {
        for (i, &n) in self.extra_sprites.iter().enumerate() {
            let slot = 8 + i;
            let entry = &self.oam_data[n * 4..n * 4 + 4];
            let (y, tile, attributes, x) = (entry[0], entry[1], entry[2], entry[3]);
            let addr = self.pattern_row_addr(y, tile, attributes);
            let (mut low, mut high) = (bus.chr_peek(addr), bus.chr_peek(addr + 8));
            if attributes & 0x40 != 0 {
                low = low.reverse_bits();
                high = high.reverse_bits();
            }
            self.sprite_x_counter[slot] = x;
            self.sprite_attributes[slot] = attributes;
            self.sprite_pattern_low[slot] = low;
            self.sprite_pattern_high[slot] = high;
        }
    }
}
