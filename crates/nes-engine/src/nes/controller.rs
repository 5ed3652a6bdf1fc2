pub mod joypad;

/// A device plugged into one of the $4016/$4017 ports.
pub trait NesController {
    /// Serial read; only bit 0 is driven.
    fn read(&mut self) -> u8;
    /// $4016 write; bit 0 is the strobe/latch line.
    fn write(&mut self, data: u8);
}
