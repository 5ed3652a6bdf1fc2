use bitflags::bitflags;

bitflags! {
    /* See: https://www.nesdev.org/wiki/PPU_registers#PPUMASK
        7  bit  0
        ---- ----
        BGRs bMmG
        |||| ||||
        |||| |||+- Greyscale (0: normal color, 1: greyscale)
        |||| ||+-- 1: Show background in leftmost 8 pixels of screen, 0: Hide
        |||| |+--- 1: Show sprites in leftmost 8 pixels of screen, 0: Hide
        |||| +---- 1: Enable background rendering
        |||+------ 1: Enable sprite rendering
        ||+------- Emphasize red (green on PAL/Dendy)
        |+-------- Emphasize green (red on PAL/Dendy)
        +--------- Emphasize blue
     */
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MaskRegister: u8 {
        const GREYSCALE                 = 0b0000_0001;
        const LEFTMOST_8PXL_BACKGROUND  = 0b0000_0010;
        const LEFTMOST_8PXL_SPRITE      = 0b0000_0100;
        const SHOW_BACKGROUND           = 0b0000_1000;
        const SHOW_SPRITES              = 0b0001_0000;
        const EMPHASISE_RED             = 0b0010_0000;
        const EMPHASISE_GREEN           = 0b0100_0000;
        const EMPHASISE_BLUE            = 0b1000_0000;
    }
}

impl MaskRegister {
    pub fn new() -> Self {
        MaskRegister::empty()
    }

    pub fn is_grayscale(&self) -> bool {
        self.contains(MaskRegister::GREYSCALE)
    }

    pub fn leftmost_8pxl_background(&self) -> bool {
        self.contains(MaskRegister::LEFTMOST_8PXL_BACKGROUND)
    }

    pub fn leftmost_8pxl_sprite(&self) -> bool {
        self.contains(MaskRegister::LEFTMOST_8PXL_SPRITE)
    }

    pub fn show_background(&self) -> bool {
        self.contains(MaskRegister::SHOW_BACKGROUND)
    }

    pub fn show_sprites(&self) -> bool {
        self.contains(MaskRegister::SHOW_SPRITES)
    }

    pub fn rendering_enabled(&self) -> bool {
        self.intersects(MaskRegister::SHOW_BACKGROUND | MaskRegister::SHOW_SPRITES)
    }

    /// Emphasis bits as stored next to a pixel: bit 0 red, bit 1 green,
    /// bit 2 blue. PAL and Dendy wire red and green the other way round.
    pub fn emphasis(&self, swap_red_green: bool) -> u8 {
        let bits = self.bits() >> 5;
        if swap_red_green {
            (bits & 0b100) | ((bits & 0b01) << 1) | ((bits & 0b10) >> 1)
        } else {
            bits
        }
    }

    pub fn update(&mut self, data: u8) {
        *self = MaskRegister::from_bits_truncate(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rendering_enabled() {
        let mut mask = MaskRegister::new();
        assert!(!mask.rendering_enabled());
        mask.update(0b0000_1000);
        assert!(mask.rendering_enabled());
        mask.update(0b0001_0000);
        assert!(mask.rendering_enabled());
    }

    #[test]
    fn test_emphasis_swap() {
        let mut mask = MaskRegister::new();
        mask.update(0b0010_0000); // red
        assert_eq!(mask.emphasis(false), 0b001);
        assert_eq!(mask.emphasis(true), 0b010);

        mask.update(0b1100_0000); // green + blue
        assert_eq!(mask.emphasis(false), 0b110);
        assert_eq!(mask.emphasis(true), 0b101);
    }
}
