use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::nes::region::Region;

/// Contents of work RAM after a power cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RamPowerOnState {
    #[default]
    AllZeros,
    AllOnes,
    /// Pseudo-random contents. A fixed seed makes power-on reproducible.
    Random { seed: Option<u64> },
}

impl RamPowerOnState {
    pub fn fill(&self, ram: &mut [u8]) {
        match *self {
            RamPowerOnState::AllZeros => ram.fill(0x00),
            RamPowerOnState::AllOnes => ram.fill(0xFF),
            RamPowerOnState::Random { seed } => {
                let mut rng = match seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_os_rng(),
                };
                rng.fill_bytes(ram);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsoleConfig {
    /// Forces a region instead of the one declared by the ROM header.
    pub region: Option<Region>,
    pub ram_power_on: RamPowerOnState,
    pub sample_rate: u32,
    pub stereo: bool,
    pub volume: f32,
    /// Draw every in-range sprite instead of the first eight.
    pub remove_sprite_limit: bool,
    /// Skip the sprite overflow flag entirely.
    pub disable_sprite_overflow: bool,
    /// Silence the triangle when its period is too short to be audible.
    pub silence_triangle_ultrasonic: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            region: None,
            ram_power_on: RamPowerOnState::AllZeros,
            sample_rate: 44_100,
            stereo: false,
            volume: 1.0,
            remove_sprite_limit: false,
            disable_sprite_overflow: false,
            silence_triangle_ultrasonic: false,
        }
    }
}

impl ConsoleConfig {
    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_ram_power_on(mut self, state: RamPowerOnState) -> Self {
        self.ram_power_on = state;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_stereo(mut self, stereo: bool) -> Self {
        self.stereo = stereo;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_sprite_limit_removed(mut self, removed: bool) -> Self {
        self.remove_sprite_limit = removed;
        self
    }

    pub fn with_sprite_overflow_disabled(mut self, disabled: bool) -> Self {
        self.disable_sprite_overflow = disabled;
        self
    }

    pub fn with_triangle_ultrasonic_silenced(mut self, silenced: bool) -> Self {
        self.silence_triangle_ultrasonic = silenced;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_policies() {
        let mut ram = [0x55u8; 64];
        RamPowerOnState::AllZeros.fill(&mut ram);
        assert!(ram.iter().all(|&b| b == 0));
        RamPowerOnState::AllOnes.fill(&mut ram);
        assert!(ram.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_seeded_random_fill_is_reproducible() {
        let mut a = [0u8; 256];
        let mut b = [0u8; 256];
        RamPowerOnState::Random { seed: Some(7) }.fill(&mut a);
        RamPowerOnState::Random { seed: Some(7) }.fill(&mut b);
        assert_eq!(a, b);
        assert!(a.iter().any(|&x| x != a[0]));
    }

    #[test]
    fn test_builder() {
        let config = ConsoleConfig::default()
            .with_region(Region::Pal)
            .with_sample_rate(48_000)
            .with_stereo(true);
        assert_eq!(config.region, Some(Region::Pal));
        assert_eq!(config.sample_rate, 48_000);
        assert!(config.stereo);
    }
}
