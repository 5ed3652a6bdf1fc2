//! Callbacks through which the console talks to its host.
//!
//! Each trait is also implemented for matching closures, so a host can pass
//! `|frame, w, h| ...` instead of writing a type.

use crate::nes::controller::joypad::JoypadButtons;

/// Receives every completed frame as packed 0xAARRGGBB pixels.
pub trait VideoSink {
    fn frame(&mut self, pixels: &[u32], width: usize, height: usize);
}

/// Receives PCM after each frame. `count` is the number of sample frames;
/// with `stereo` the slice holds `count * 2` interleaved values.
pub trait AudioSink {
    fn samples(&mut self, samples: &[i16], count: usize, sample_rate: u32, stereo: bool);
}

/// Polled once per frame for each controller port.
pub trait InputProvider {
    fn poll(&mut self, port: usize) -> JoypadButtons;
}

/// Persists battery-backed RAM, keyed by the ROM's SHA-1.
pub trait BatteryStore {
    fn load(&mut self, key: &str) -> Option<Vec<u8>>;
    fn save(&mut self, key: &str, data: &[u8]);
}

impl<F: FnMut(&[u32], usize, usize)> VideoSink for F {
    fn frame(&mut self, pixels: &[u32], width: usize, height: usize) {
        self(pixels, width, height)
    }
}

impl<F: FnMut(&[i16], usize, u32, bool)> AudioSink for F {
    fn samples(&mut self, samples: &[i16], count: usize, sample_rate: u32, stereo: bool) {
        self(samples, count, sample_rate, stereo)
    }
}

impl<F: FnMut(usize) -> JoypadButtons> InputProvider for F {
    fn poll(&mut self, port: usize) -> JoypadButtons {
        self(port)
    }
}
