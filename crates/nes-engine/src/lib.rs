// NES emulation engine
pub mod nes;
pub mod prelude;

// Re-exports
pub use nes::{Console, ConsoleError, StateError};

pub use nes::cartridge::Cartridge;
pub use nes::cartridge::rom::{Rom, RomError};
