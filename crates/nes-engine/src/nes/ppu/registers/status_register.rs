use bitflags::bitflags;

use crate::trace;

bitflags! {
    /* See: https://www.nesdev.org/wiki/PPU_registers#PPUSTATUS
        7  bit  0
        ---- ----
        VSOx xxxx
        |||| ||||
        |||+-++++- PPU open bus
        ||+------- Sprite overflow flag
        |+-------- Sprite 0 hit flag
        +--------- Vblank flag, cleared on read.
     */
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StatusRegister: u8 {
        const SPRITE_OVERFLOW  = 0b00100000;
        const SPRITE_ZERO_HIT  = 0b01000000;
        const VBLANK_STARTED   = 0b10000000;
    }
}

impl StatusRegister {
    pub fn new() -> Self {
        StatusRegister::empty()
    }

    pub fn set_vblank_started(&mut self) {
        trace!("SET VBLANK");
        self.insert(StatusRegister::VBLANK_STARTED);
    }

    pub fn reset_vblank_status(&mut self) {
        if self.contains(StatusRegister::VBLANK_STARTED) {
            trace!("CLEAR VBLANK: set -> unset");
        }
        self.remove(StatusRegister::VBLANK_STARTED);
    }

    pub fn vblank_active(&self) -> bool {
        self.contains(StatusRegister::VBLANK_STARTED)
    }

    pub fn set_sprite_zero_hit(&mut self, status: bool) {
        self.set(StatusRegister::SPRITE_ZERO_HIT, status);
    }

    pub fn sprite_zero_hit(&self) -> bool {
        self.contains(StatusRegister::SPRITE_ZERO_HIT)
    }

    pub fn set_sprite_overflow(&mut self, status: bool) {
        self.set(StatusRegister::SPRITE_OVERFLOW, status);
    }

    pub fn sprite_overflow(&self) -> bool {
        self.contains(StatusRegister::SPRITE_OVERFLOW)
    }
}
