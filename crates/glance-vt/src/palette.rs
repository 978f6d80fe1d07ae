//! xterm-256color palette used to resolve SGR color codes to RGB.

use crate::style::Rgb;

/// Standard xterm-256color ANSI palette.
const ANSI_COLORS: [Rgb; 16] = [
    Rgb::new(0, 0, 0),       // Black
    Rgb::new(205, 0, 0),     // Red
    Rgb::new(0, 205, 0),     // Green
    Rgb::new(205, 205, 0),   // Yellow
    Rgb::new(0, 0, 238),     // Blue
    Rgb::new(205, 0, 205),   // Magenta
    Rgb::new(0, 205, 205),   // Cyan
    Rgb::new(229, 229, 229), // White
    Rgb::new(127, 127, 127), // Bright Black
    Rgb::new(255, 0, 0),     // Bright Red
    Rgb::new(0, 255, 0),     // Bright Green
    Rgb::new(255, 255, 0),   // Bright Yellow
    Rgb::new(92, 92, 255),   // Bright Blue
    Rgb::new(255, 0, 255),   // Bright Magenta
    Rgb::new(0, 255, 255),   // Bright Cyan
    Rgb::new(255, 255, 255), // Bright White
];

/// One of the eight standard colors (codes 30-37 / 40-47).
pub fn standard(n: u8) -> Rgb {
    ANSI_COLORS[(n & 0x07) as usize]
}

/// One of the eight bright colors (codes 90-97 / 100-107).
pub fn bright(n: u8) -> Rgb {
    ANSI_COLORS[8 + (n & 0x07) as usize]
}

/// Resolve a 256-color index (`38;5;N` / `48;5;N`).
pub fn indexed(idx: u8) -> Rgb {
    let idx = idx as usize;
    if idx < 16 {
        ANSI_COLORS[idx]
    } else if idx < 232 {
        // 216-color cube (indices 16..232).
        let n = idx - 16;
        let r = (n / 36) % 6;
        let g = (n / 6) % 6;
        let b = n % 6;
        let to_byte = |v: usize| if v == 0 { 0u8 } else { (55 + 40 * v) as u8 };
        Rgb::new(to_byte(r), to_byte(g), to_byte(b))
    } else {
        // Grayscale ramp (indices 232..256).
        let v = (8 + 10 * (idx - 232)) as u8;
        Rgb::new(v, v, v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_low_indices_match_named_colors() {
        for n in 0..8 {
            assert_eq!(indexed(n), standard(n));
            assert_eq!(indexed(n + 8), bright(n));
        }
    }

    #[test]
    fn test_cube_corners() {
        assert_eq!(indexed(16), Rgb::new(0, 0, 0));
        assert_eq!(indexed(17), Rgb::new(0, 0, 95));
        assert_eq!(indexed(196), Rgb::new(255, 0, 0));
        assert_eq!(indexed(231), Rgb::new(255, 255, 255));
    }

    #[test]
    fn test_grayscale_ramp_ends() {
        assert_eq!(indexed(232), Rgb::new(8, 8, 8));
        assert_eq!(indexed(255), Rgb::new(238, 238, 238));
    }
}
