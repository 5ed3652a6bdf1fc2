use bitflags::bitflags;

bitflags! {

/* See: https://www.nesdev.org/wiki/PPU_registers#PPUCTRL
    7  bit  0
    ---- ----
    VPHB SINN
    |||| ||||
    |||| ||++- Base nametable address
    |||| ||    (0 = $2000; 1 = $2400; 2 = $2800; 3 = $2C00)
    |||| |+--- VRAM address increment per CPU read/write of PPUDATA
    |||| |     (0: add 1, going across; 1: add 32, going down)
    |||| +---- Sprite pattern table address for 8x8 sprites
    ||||       (0: $0000; 1: $1000; ignored in 8x16 mode)
    |||+------ Background pattern table address (0: $0000; 1: $1000)
    ||+------- Sprite size (0: 8x8 pixels; 1: 8x16 pixels)
    |+-------- PPU master/slave select
    +--------- Vblank NMI enable (0: off, 1: on)
 */
   #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
   pub struct ControlRegister: u8 {
       const NAMETABLE1              = 0b00000001;
       const NAMETABLE2              = 0b00000010;
       const VRAM_ADD_INCREMENT      = 0b00000100;
       const SPRITE_PATTERN_ADDR     = 0b00001000;
       const BACKGROUND_PATTERN_ADDR = 0b00010000;
       const SPRITE_SIZE             = 0b00100000;
       const MASTER_SLAVE_SELECT     = 0b01000000;
       const GENERATE_NMI            = 0b10000000;
   }
}

impl ControlRegister {
    pub fn new() -> Self {
        ControlRegister::empty()
    }

    pub fn addr_increment(&self) -> u16 {
        match self.contains(ControlRegister::VRAM_ADD_INCREMENT) {
            true => 32,
            false => 1,
        }
    }

    pub fn nmi_enabled(&self) -> bool {
        self.contains(Self::GENERATE_NMI)
    }

    /// Nametable select bits, already positioned for the `t` register.
    pub fn nametable_bits(&self) -> u16 {
        ((self.bits() & 0b11) as u16) << 10
    }

    pub fn background_pattern_addr(&self) -> u16 {
        match self.contains(Self::BACKGROUND_PATTERN_ADDR) {
            true => 0x1000,
            false => 0x0,
        }
    }

    pub fn sprite_pattern_addr(&self) -> u16 {
        match self.contains(ControlRegister::SPRITE_PATTERN_ADDR) {
            true => 0x1000,
            false => 0x0,
        }
    }

    pub fn sprite_size(&self) -> u8 {
        if !self.contains(ControlRegister::SPRITE_SIZE) {
            8
        } else {
            16
        }
    }

    pub fn update(&mut self, data: u8) {
        *self = ControlRegister::from_bits_truncate(data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_control_register() {
        let ctrl = ControlRegister::new();
        assert_eq!(ctrl.bits(), 0);
        assert_eq!(ctrl.addr_increment(), 1);
        assert!(!ctrl.nmi_enabled());
        assert_eq!(ctrl.background_pattern_addr(), 0x0000);
        assert_eq!(ctrl.sprite_size(), 8);
    }

    #[test]
    fn test_update_control_register() {
        let mut ctrl = ControlRegister::new();
        ctrl.update(0b10110000);
        assert!(ctrl.nmi_enabled());
        assert_eq!(ctrl.sprite_size(), 16);
        assert_eq!(ctrl.background_pattern_addr(), 0x1000);
        assert_eq!(ctrl.addr_increment(), 1);
    }

    #[test]
    fn test_vram_increment() {
        let mut ctrl = ControlRegister::new();
        ctrl.update(ControlRegister::VRAM_ADD_INCREMENT.bits());
        assert_eq!(ctrl.addr_increment(), 32);
    }

    #[test]
    fn test_nametable_bits_land_in_t_position() {
        let mut ctrl = ControlRegister::new();
        ctrl.update(0b0000_0011);
        assert_eq!(ctrl.nametable_bits(), 0x0C00);
        ctrl.update(0b0000_0010);
        assert_eq!(ctrl.nametable_bits(), 0x0800);
    }
}
