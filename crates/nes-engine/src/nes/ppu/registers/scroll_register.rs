/* See: https://www.nesdev.org/wiki/PPU_scrolling#PPU_internal_registers

   v/t layout (15 bits)

   yyy NN YYYYY XXXXX
   ||| || ||||| +++++-- coarse X scroll
   ||| || +++++-------- coarse Y scroll
   ||| ++-------------- nametable select
   +++----------------- fine Y scroll
*/

/// Loopy registers shared by $2005 and $2006.
///
/// - `v`: current VRAM address, used for fetches and $2007 accesses.
/// - `t`: temporary address, copied into `v` at fixed dots while rendering.
/// - `x`: fine X scroll (3 bits).
/// - `w`: first/second write toggle shared by $2005 and $2006.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScrollRegister {
    pub v: u16,
    pub t: u16,
    pub x: u8,
    pub w: bool,
}

impl ScrollRegister {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_scroll(&mut self, data: u8) {
        if !self.w {
            // First write: coarse X and fine X
            self.x = data & 0b0000_0111;
            let coarse_x = (data >> 3) as u16;
            self.t = (self.t & !0b00000_00000_11111) | coarse_x;
        } else {
            // Second write: coarse Y and fine Y, nametable bits untouched
            let fine_y = (data & 0b0000_0111) as u16;
            let coarse_y = ((data >> 3) & 0b1_1111) as u16;
            self.t = (self.t & !0b0111_0011_1110_0000) | (coarse_y << 5) | (fine_y << 12);
        }
        self.w = !self.w;
    }

    /// Returns the completed address after the second write. The caller
    /// decides when it reaches `v`.
    pub fn write_to_addr(&mut self, data: u8) -> Option<u16> {
        let completed = if !self.w {
            // High byte; bit 14 of t is cleared as well
            self.t = (self.t & 0x00FF) | (((data as u16) & 0x3F) << 8);
            None
        } else {
            self.t = (self.t & 0xFF00) | (data as u16);
            Some(self.t)
        };
        self.w = !self.w;
        completed
    }

    pub fn get_addr(&self) -> u16 {
        self.v & 0x3FFF
    }

    pub fn increment_addr(&mut self, inc: u16) {
        self.v = self.v.wrapping_add(inc) & 0x7FFF;
    }

    pub fn reset_latch(&mut self) {
        self.w = false;
    }

    pub fn increment_x(&mut self) {
        if (self.v & 0x001F) == 31 {
            self.v &= !0x001F;
            self.v ^= 0x0400;
        } else {
            self.v += 1;
        }
    }

    pub fn increment_y(&mut self) {
        if (self.v & 0x7000) != 0x7000 {
            self.v += 0x1000;
        } else {
            self.v &= !0x7000;
            let mut y = (self.v >> 5) & 0x1F;

            if y == 29 {
                y = 0;
                self.v ^= 0x0800;
            } else if y == 31 {
                // Out-of-range coarse Y wraps without switching nametable
                y = 0;
            } else {
                y += 1;
            }

            self.v = (self.v & !0x03E0) | (y << 5);
        }
    }

    pub fn copy_horizontal_bits(&mut self) {
        const MASK: u16 = 0b0000_0100_0001_1111;
        self.v = (self.v & !MASK) | (self.t & MASK);
    }

    pub fn copy_vertical_bits(&mut self) {
        const MASK: u16 = 0b0111_1011_1110_0000;
        self.v = (self.v & !MASK) | (self.t & MASK);
    }

    pub fn fine_y(&self) -> u16 {
        (self.v >> 12) & 0b111
    }
}
