use once_cell::sync::Lazy;

/// 2C02 colors as RGB, indexed by the 6-bit palette value.
#[rustfmt::skip]
pub static SYSTEM_PALETTE: [(u8, u8, u8); 64] = [
   (0x80, 0x80, 0x80), (0x00, 0x3D, 0xA6), (0x00, 0x12, 0xB0), (0x44, 0x00, 0x96), (0xA1, 0x00, 0x5E),
   (0xC7, 0x00, 0x28), (0xBA, 0x06, 0x00), (0x8C, 0x17, 0x00), (0x5C, 0x2F, 0x00), (0x10, 0x45, 0x00),
   (0x05, 0x4A, 0x00), (0x00, 0x47, 0x2E), (0x00, 0x41, 0x66), (0x00, 0x00, 0x00), (0x05, 0x05, 0x05),
   (0x05, 0x05, 0x05), (0xC7, 0xC7, 0xC7), (0x00, 0x77, 0xFF), (0x21, 0x55, 0xFF), (0x82, 0x37, 0xFA),
   (0xEB, 0x2F, 0xB5), (0xFF, 0x29, 0x50), (0xFF, 0x22, 0x00), (0xD6, 0x32, 0x00), (0xC4, 0x62, 0x00),
   (0x35, 0x80, 0x00), (0x05, 0x8F, 0x00), (0x00, 0x8A, 0x55), (0x00, 0x99, 0xCC), (0x21, 0x21, 0x21),
   (0x09, 0x09, 0x09), (0x09, 0x09, 0x09), (0xFF, 0xFF, 0xFF), (0x0F, 0xD7, 0xFF), (0x69, 0xA2, 0xFF),
   (0xD4, 0x80, 0xFF), (0xFF, 0x45, 0xF3), (0xFF, 0x61, 0x8B), (0xFF, 0x88, 0x33), (0xFF, 0x9C, 0x12),
   (0xFA, 0xBC, 0x20), (0x9F, 0xE3, 0x0E), (0x2B, 0xF0, 0x35), (0x0C, 0xF0, 0xA4), (0x05, 0xFB, 0xFF),
   (0x5E, 0x5E, 0x5E), (0x0D, 0x0D, 0x0D), (0x0D, 0x0D, 0x0D), (0xFF, 0xFF, 0xFF), (0xA6, 0xFC, 0xFF),
   (0xB3, 0xEC, 0xFF), (0xDA, 0xAB, 0xEB), (0xFF, 0xA8, 0xF9), (0xFF, 0xAB, 0xB3), (0xFF, 0xD2, 0xB0),
   (0xFF, 0xEF, 0xA6), (0xFF, 0xF7, 0x9C), (0xD7, 0xE8, 0x95), (0xA6, 0xED, 0xAF), (0xA2, 0xF2, 0xDA),
   (0x99, 0xFF, 0xFC), (0xDD, 0xDD, 0xDD), (0x11, 0x11, 0x11), (0x11, 0x11, 0x11),
];

/// ARGB for every (emphasis, palette index) pair a frame buffer pixel can
/// hold: bits 0-5 palette index, bits 6-8 emphasis (red, green, blue).
pub static ARGB_TABLE: Lazy<[u32; 512]> = Lazy::new(|| {
    let mut table = [0u32; 512];
    for (pixel, argb) in table.iter_mut().enumerate() {
        let (r, g, b) = SYSTEM_PALETTE[pixel & 0x3F];
        let emphasis = pixel >> 6;
        let (mut r, mut g, mut b) = (r as u32, g as u32, b as u32);

        // Each emphasis bit dims the two other channels
        if emphasis & 0b001 != 0 {
            g = g * 13 / 16;
            b = b * 13 / 16;
        }
        if emphasis & 0b010 != 0 {
            r = r * 13 / 16;
            b = b * 13 / 16;
        }
        if emphasis & 0b100 != 0 {
            r = r * 13 / 16;
            g = g * 13 / 16;
        }
        *argb = 0xFF00_0000 | (r << 16) | (g << 8) | b;
    }
    table
});

#[inline]
pub fn to_argb(pixel: u16) -> u32 {
    ARGB_TABLE[(pixel & 0x1FF) as usize]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_colors_match_system_palette() {
        assert_eq!(to_argb(0x00), 0xFF80_8080);
        assert_eq!(to_argb(0x30), 0xFFFF_FFFF);
        assert_eq!(to_argb(0x0D), 0xFF00_0000);
    }

    #[test]
    fn test_emphasis_dims_other_channels() {
        let white = 0x30;
        let red_emphasis = to_argb(white | (0b001 << 6));
        assert_eq!(red_emphasis, 0xFFFF_CFCF);

        let all = to_argb(white | (0b111 << 6));
        let (r, g, b) = ((all >> 16) & 0xFF, (all >> 8) & 0xFF, all & 0xFF);
        assert_eq!(r, g);
        assert_eq!(g, b);
        assert!(r < 0xFF);
    }
}
