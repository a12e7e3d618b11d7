//! xterm 256-colour approximation
//!
//! Used when the viewer's terminal cannot display 24-bit colour. Colours are
//! mapped onto the 6×6×6 cube (16-231) or the grey ramp (232-255), whichever
//! is closer. The 16 system colours are never chosen since their values vary
//! between terminals.

const CUBE_LEVELS: [u8; 6] = [0, 95, 135, 175, 215, 255];

use crate::core::Rgb;

/// Nearest xterm palette index for `color`
pub fn to_ansi256(color: Rgb) -> u8 {
    let (ri, gi, bi) = (
        cube_index(color.r),
        cube_index(color.g),
        cube_index(color.b),
    );
    let cube = Rgb::new(
        CUBE_LEVELS[ri as usize],
        CUBE_LEVELS[gi as usize],
        CUBE_LEVELS[bi as usize],
    );
    let cube_slot = 16 + 36 * ri + 6 * gi + bi;

    let average = (u16::from(color.r) + u16::from(color.g) + u16::from(color.b)) / 3;
    let grey_index = if average > 238 {
        23
    } else {
        (average.saturating_sub(3) / 10) as u8
    };
    let level = 8 + 10 * grey_index;
    let grey = Rgb::new(level, level, level);

    if distance(color, grey) < distance(color, cube) {
        232 + grey_index
    } else {
        cube_slot
    }
}

fn cube_index(v: u8) -> u8 {
    match v {
        0..=47 => 0,
        48..=114 => 1,
        _ => (v - 35) / 40,
    }
}

fn distance(a: Rgb, b: Rgb) -> u32 {
    let d = |x: u8, y: u8| {
        let d = i32::from(x) - i32::from(y);
        (d * d) as u32
    };
    d(a.r, b.r) + d(a.g, b.g) + d(a.b, b.b)
}

#[cfg(test)]
pub(crate) fn indexed_to_rgb(index: u8) -> Rgb {
    match index {
        16..=231 => {
            let i = index - 16;
            Rgb::new(
                CUBE_LEVELS[(i / 36) as usize],
                CUBE_LEVELS[((i / 6) % 6) as usize],
                CUBE_LEVELS[(i % 6) as usize],
            )
        }
        232..=255 => {
            let level = 8 + 10 * (index - 232);
            Rgb::new(level, level, level)
        }
        _ => Rgb::BLACK,
    }
}
