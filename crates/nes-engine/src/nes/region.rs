use crate::nes::snapshot::Ordinal;

/// Video standard of the emulated console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    #[default]
    Ntsc,
    Pal,
    Dendy,
}

impl Region {
    /// Master clock ticks per CPU cycle.
    pub const fn cpu_divider(self) -> u32 {
        match self {
            Region::Ntsc => 12,
            Region::Pal => 16,
            Region::Dendy => 15,
        }
    }

    /// Master clock ticks per PPU dot.
    pub const fn ppu_divider(self) -> u32 {
        match self {
            Region::Ntsc => 4,
            Region::Pal | Region::Dendy => 5,
        }
    }

    pub const fn master_clock_hz(self) -> f64 {
        match self {
            Region::Ntsc => 21_477_272.0,
            Region::Pal => 26_601_712.0,
            Region::Dendy => 26_601_712.0,
        }
    }

    pub fn cpu_clock_hz(self) -> f64 {
        self.master_clock_hz() / self.cpu_divider() as f64
    }

    /// Scanlines per frame, pre-render line included.
    pub const fn scanlines_per_frame(self) -> u16 {
        match self {
            Region::Ntsc => 262,
            Region::Pal | Region::Dendy => 312,
        }
    }

    /// Scanline on which the vblank flag is raised.
    pub const fn vblank_scanline(self) -> i16 {
        match self {
            Region::Ntsc | Region::Pal => 241,
            Region::Dendy => 291,
        }
    }

    /// Last scanline before the pre-render line wraps to -1.
    pub const fn last_scanline(self) -> i16 {
        self.scanlines_per_frame() as i16 - 2
    }

    /// Only NTSC drops a dot on odd frames.
    pub const fn skips_odd_frame_dot(self) -> bool {
        matches!(self, Region::Ntsc)
    }

    /// PAL and Dendy swap the red and green emphasis bits.
    pub const fn swaps_emphasis(self) -> bool {
        !matches!(self, Region::Ntsc)
    }

    pub fn frame_rate(self) -> f64 {
        let dots_per_frame = self.scanlines_per_frame() as f64 * 341.0;
        self.master_clock_hz() / self.ppu_divider() as f64 / dots_per_frame
    }
}

impl Ordinal for Region {
    fn ordinal(&self) -> u8 {
        *self as u8
    }

    fn from_ordinal(ordinal: u8) -> Option<Self> {
        match ordinal {
            0 => Some(Region::Ntsc),
            1 => Some(Region::Pal),
            2 => Some(Region::Dendy),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_clock_rates() {
        assert!((Region::Ntsc.cpu_clock_hz() - 1_789_772.67).abs() < 1.0);
        assert!((Region::Pal.cpu_clock_hz() - 1_662_607.0).abs() < 1.0);
        assert!((Region::Dendy.cpu_clock_hz() - 1_773_447.47).abs() < 1.0);
    }

    #[test]
    fn test_frame_geometry() {
        assert_eq!(Region::Ntsc.last_scanline(), 260);
        assert_eq!(Region::Pal.last_scanline(), 310);
        assert!(Region::Dendy.vblank_scanline() > 240);
        assert!((Region::Ntsc.frame_rate() - 60.1).abs() < 0.01);
        assert!((Region::Pal.frame_rate() - 50.0).abs() < 0.01);
    }
}
