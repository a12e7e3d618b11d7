//! Cell Encoder
//!
//! Turns a pixel buffer into the byte stream a terminal needs to draw it:
//! one absolute cursor move per row, SGR colour changes, and a half block
//! per cell.

use serde::{Deserialize, Serialize};

use super::palette::to_ansi256;
use crate::core::{fit_grid, CellGrid, GridSize, InvalidDimensions, PixelBuffer, Rgb, HALF_BLOCK};

/// Sent after the last row of every frame: reset SGR, cursor home
pub const FRAME_END: &[u8] = b"\x1b[0m\x1b[H";

/// How colours are written to the terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorDepth {
    /// `38;2;r;g;b` / `48;2;r;g;b`
    #[default]
    TrueColor,
    /// `38;5;n` / `48;5;n`
    Ansi256,
}

/// Errors from encoding a frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error(transparent)]
    InvalidDimensions(#[from] InvalidDimensions),
}

/// Colour as it will appear on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Paint {
    Direct(Rgb),
    Indexed(u8),
}

/// Stateless frame encoder
///
/// Output depends only on the buffer, the target size and the colour depth,
/// so encoding the same buffer twice yields identical bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellEncoder {
    depth: ColorDepth,
    row_limit: Option<u32>,
}

impl CellEncoder {
    pub fn new(depth: ColorDepth) -> Self {
        Self {
            depth,
            row_limit: None,
        }
    }

    /// Also limit the grid to `rows` cell rows (the terminal height)
    pub fn with_row_limit(mut self, rows: Option<u32>) -> Self {
        self.row_limit = rows;
        self
    }

    /// Grid a `width × height` buffer would be drawn into
    pub fn fit(&self, width: u32, height: u32, target_columns: u32) -> Result<GridSize, EncodeError> {
        Ok(fit_grid(width, height, target_columns, self.row_limit)?)
    }

    /// Encode a whole frame for a terminal `target_columns` wide
    pub fn encode(&self, buffer: &PixelBuffer, target_columns: u32) -> Result<Vec<u8>, EncodeError> {
        let size = self.fit(buffer.width(), buffer.height(), target_columns)?;
        let grid = CellGrid::sample(buffer, size);
        let mut out = Vec::with_capacity(estimated_len(size));
        self.encode_grid(&grid, &mut out);
        Ok(out)
    }

    /// Append the escape sequences for an already sampled grid to `out`
    pub fn encode_grid(&self, grid: &CellGrid, out: &mut Vec<u8>) {
        let mut glyph = [0u8; 4];
        let glyph = HALF_BLOCK.encode_utf8(&mut glyph).as_bytes();

        for (row, cells) in grid.rows().enumerate() {
            // CUP row;1H
            out.extend_from_slice(b"\x1b[");
            push_decimal(out, row as u32 + 1);
            out.extend_from_slice(b";1H");

            let mut fg: Option<Paint> = None;
            let mut bg: Option<Paint> = None;
            for cell in cells {
                let upper = self.paint(cell.fg);
                if fg != Some(upper) {
                    push_sgr(out, 38, upper);
                    fg = Some(upper);
                }
                let lower = self.paint(cell.bg);
                if bg != Some(lower) {
                    push_sgr(out, 48, lower);
                    bg = Some(lower);
                }
                out.extend_from_slice(glyph);
            }
        }

        out.extend_from_slice(FRAME_END);
    }

    fn paint(&self, color: Rgb) -> Paint {
        match self.depth {
            ColorDepth::TrueColor => Paint::Direct(color),
            ColorDepth::Ansi256 => Paint::Indexed(to_ansi256(color)),
        }
    }
}

/// Upper bound for a frame with every colour changing on every cell
pub fn estimated_len(size: GridSize) -> usize {
    size.cell_count() * 41 + usize::from(size.rows) * 10 + FRAME_END.len()
}

fn push_sgr(out: &mut Vec<u8>, selector: u32, paint: Paint) {
    out.extend_from_slice(b"\x1b[");
    push_decimal(out, selector);
    match paint {
        Paint::Direct(c) => {
            out.extend_from_slice(b";2;");
            push_decimal(out, u32::from(c.r));
            out.push(b';');
            push_decimal(out, u32::from(c.g));
            out.push(b';');
            push_decimal(out, u32::from(c.b));
        }
        Paint::Indexed(n) => {
            out.extend_from_slice(b";5;");
            push_decimal(out, u32::from(n));
        }
    }
    out.push(b'm');
}

fn push_decimal(out: &mut Vec<u8>, mut value: u32) {
    let mut digits = [0u8; 10];
    let mut i = digits.len();
    loop {
        i -= 1;
        digits[i] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    out.extend_from_slice(&digits[i..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: Rgb) -> PixelBuffer {
        PixelBuffer::from_fn(width, height, |_, _| color).unwrap()
    }

    #[test]
    fn test_push_decimal() {
        let mut out = Vec::new();
        for n in [0, 7, 42, 255, 4_000_000_000] {
            push_decimal(&mut out, n);
            out.push(b' ');
        }
        assert_eq!(out, b"0 7 42 255 4000000000 ");
    }

    #[test]
    fn test_single_cell_truecolor() {
        let buffer = PixelBuffer::from_fn(1, 2, |_, y| {
            if y == 0 {
                Rgb::new(255, 0, 0)
            } else {
                Rgb::new(0, 0, 255)
            }
        })
        .unwrap();
        let out = CellEncoder::new(ColorDepth::TrueColor).encode(&buffer, 80).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\x1b[1;1H\x1b[38;2;255;0;0m\x1b[48;2;0;0;255m\u{2580}\x1b[0m\x1b[H"
        );
    }

    #[test]
    fn test_runs_share_sgr() {
        let out = CellEncoder::new(ColorDepth::TrueColor)
            .encode(&solid(3, 4, Rgb::new(1, 2, 3)), 3)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        // one fg and one bg per row
        assert_eq!(text.matches("\x1b[38;2;").count(), 2);
        assert_eq!(text.matches("\x1b[48;2;").count(), 2);
        assert_eq!(text.matches('\u{2580}').count(), 6);
        assert!(text.contains("\x1b[2;1H"));
    }

    #[test]
    fn test_ansi256_mode() {
        let out = CellEncoder::new(ColorDepth::Ansi256)
            .encode(&solid(1, 2, Rgb::WHITE), 1)
            .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\x1b[1;1H\x1b[38;5;231m\x1b[48;5;231m\u{2580}\x1b[0m\x1b[H"
        );
    }

    #[test]
    fn test_rejects_degenerate_input() {
        let encoder = CellEncoder::default();
        let short = solid(4, 1, Rgb::BLACK);
        assert!(matches!(
            encoder.encode(&short, 80),
            Err(EncodeError::InvalidDimensions(_))
        ));
        assert!(encoder.encode(&solid(4, 4, Rgb::BLACK), 0).is_err());
    }

    #[test]
    fn test_row_limit() {
        let encoder = CellEncoder::default().with_row_limit(Some(24));
        assert_eq!(encoder.fit(640, 480, 80).unwrap(), GridSize::new(64, 24));
    }

    #[test]
    fn test_estimate_covers_worst_case() {
        let buffer = PixelBuffer::from_fn(16, 16, |x, y| {
            Rgb::new((x * 8) as u8 + 100, (y * 8) as u8 + 100, 255)
        })
        .unwrap();
        let size = GridSize::new(16, 8);
        let out = CellEncoder::default().encode(&buffer, 16).unwrap();
        assert!(out.len() <= estimated_len(size));
    }
}
