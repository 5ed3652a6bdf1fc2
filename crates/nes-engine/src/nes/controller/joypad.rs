// See: https://www.nesdev.org/wiki/Standard_controller

use super::NesController;
use crate::nes::snapshot::{Snapshot, Snapshotable};
use bitflags::bitflags;

bitflags! {
    /// Report order of the 4021 shift register, A first.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct JoypadButtons: u8 {
        const BUTTON_A = 0b0000_0001;
        const BUTTON_B = 0b0000_0010;
        const SELECT   = 0b0000_0100;
        const START    = 0b0000_1000;
        const UP       = 0b0001_0000;
        const DOWN     = 0b0010_0000;
        const LEFT     = 0b0100_0000;
        const RIGHT    = 0b1000_0000;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Joypad {
    buttons: JoypadButtons,
    shift: u8,
    reads: u8,
    strobe: bool,
}

impl NesController for Joypad {
    fn read(&mut self) -> u8 {
        if self.strobe {
            return self.buttons.bits() & 1;
        }
        // Official pads shift in 1s once all eight buttons are out
        if self.reads >= 8 {
            return 1;
        }
        let bit = self.shift & 1;
        self.shift >>= 1;
        self.reads += 1;
        bit
    }

    fn write(&mut self, data: u8) {
        let strobe = data & 1 != 0;
        if self.strobe && !strobe {
            self.latch();
        }
        self.strobe = strobe;
        if strobe {
            self.latch();
        }
    }
}

impl Joypad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buttons(&self) -> JoypadButtons {
        self.buttons
    }

    pub fn set_buttons(&mut self, buttons: JoypadButtons) {
        self.buttons = buttons;
    }

    pub fn set_button_status(&mut self, button: JoypadButtons, pressed: bool) {
        self.buttons.set(button, pressed);
    }

    fn latch(&mut self) {
        self.shift = self.buttons.bits();
        self.reads = 0;
    }
}

impl Snapshotable for Joypad {
    fn save(&self, s: &mut Snapshot) {
        s.write("buttons", self.buttons.bits());
        s.write("shift", self.shift);
        s.write("reads", self.reads);
        s.write("strobe", self.strobe);
    }

    fn restore(&mut self, s: &Snapshot) {
        self.buttons = JoypadButtons::from_bits_truncate(s.read("buttons"));
        self.shift = s.read("shift");
        self.reads = s.read::<u8>("reads").min(8);
        self.strobe = s.read("strobe");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_joypad_default_state() {
        let joypad = Joypad::new();
        assert_eq!(joypad.buttons().bits(), 0);
        assert!(!joypad.strobe);
    }

    #[test]
    fn test_strobe_high_repeats_button_a() {
        let mut joypad = Joypad::new();
        joypad.set_button_status(JoypadButtons::BUTTON_A, true);
        joypad.write(1);
        for _ in 0..10 {
            assert_eq!(joypad.read(), 1);
        }
    }

    #[test]
    fn test_serial_report_order() {
        let mut joypad = Joypad::new();
        joypad.set_button_status(JoypadButtons::START, true);
        joypad.set_button_status(JoypadButtons::RIGHT, true);
        joypad.write(1);
        joypad.write(0);

        let bits: Vec<u8> = (0..8).map(|_| joypad.read()).collect();
        assert_eq!(bits, vec![0, 0, 0, 1, 0, 0, 0, 1]);

        assert_eq!(joypad.read(), 1);
        assert_eq!(joypad.read(), 1);
    }

    #[test]
    fn test_buttons_latched_at_strobe_fall() {
        let mut joypad = Joypad::new();
        joypad.write(1);
        joypad.write(0);
        // Pressed after the latch: not visible until the next strobe
        joypad.set_button_status(JoypadButtons::BUTTON_A, true);
        assert_eq!(joypad.read(), 0);

        joypad.write(1);
        joypad.write(0);
        assert_eq!(joypad.read(), 1);
    }
}
