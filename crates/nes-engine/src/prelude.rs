//! Convenient imports for hosts of nes-engine
//!
//! ```rust
//! use nes_engine::prelude::*;
//! ```

// Console and its errors
pub use crate::nes::{Console, ConsoleError, RunState, StateError};
pub use crate::nes::config::{ConsoleConfig, RamPowerOnState};
pub use crate::nes::region::Region;

// Loading
pub use crate::nes::cartridge::database::{GameDatabase, GameInfo, InMemoryGameDatabase};
pub use crate::nes::cartridge::rom::{Mirroring, Rom, RomError};

// Host callbacks
pub use crate::nes::controller::joypad::JoypadButtons;
pub use crate::nes::sinks::{AudioSink, BatteryStore, InputProvider, VideoSink};

pub use crate::nes::cpu::CpuError;
pub use crate::nes::ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};

// Macros
pub use crate::trace_dump;
