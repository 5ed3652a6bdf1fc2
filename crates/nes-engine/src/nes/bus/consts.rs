pub const CPU_RAM_SIZE: usize = 2048;
pub const CPU_RAM_START: u16 = 0x0000;
pub const CPU_RAM_END: u16 = 0x1FFF;

pub const PPU_REGISTERS_START: u16 = 0x2000;
pub const PPU_REGISTERS_END: u16 = 0x3FFF;

pub const OAM_DMA: u16 = 0x4014;
pub const APU_STATUS: u16 = 0x4015;
pub const JOYPAD1: u16 = 0x4016;
pub const JOYPAD2: u16 = 0x4017;

pub const CART_START: u16 = 0x4020;
pub const CART_END: u16 = 0xFFFF;
