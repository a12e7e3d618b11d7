//! Half-Block Cells
//!
//! A terminal cell shows two vertically stacked pixels: the upper half block
//! glyph is drawn in the foreground colour and the rest of the cell shows the
//! background colour.

use serde::{Deserialize, Serialize};

use super::geometry::GridSize;
use super::pixels::{PixelBuffer, Rgb};

/// Upper half block, U+2580
pub const HALF_BLOCK: char = '\u{2580}';

/// A single rendered cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// Upper pixel
    pub fg: Rgb,
    /// Lower pixel
    pub bg: Rgb,
}

impl Cell {
    pub const fn new(fg: Rgb, bg: Rgb) -> Self {
        Self { fg, bg }
    }

    /// The glyph every cell is drawn with
    pub const fn glyph(&self) -> char {
        HALF_BLOCK
    }
}

/// Row-major grid of cells sampled from one pixel buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellGrid {
    size: GridSize,
    cells: Vec<Cell>,
}

impl CellGrid {
    /// Sample `buffer` into a grid of `size` with nearest-neighbour lookup.
    ///
    /// The sampled region keeps the buffer's aspect ratio: when the grid was
    /// fitted with a row limit it covers the full width and the top
    /// `pixel_rows * width / columns` source rows. Cell `(c, r)` takes its
    /// colours from source pixel rows `2r` and `2r + 1` of that region.
    pub fn sample(buffer: &PixelBuffer, size: GridSize) -> Self {
        let width = u64::from(buffer.width());
        let columns = u64::from(size.columns.max(1));
        let pixel_rows = u64::from(size.pixel_rows().max(1));
        let source_height =
            (pixel_rows * width / columns).clamp(1, u64::from(buffer.height()));

        let source_x: Vec<u32> = (0..columns)
            .map(|c| (c * width / columns) as u32)
            .collect();
        let source_y = |p: u64| (p * source_height / pixel_rows) as u32;

        let mut cells = Vec::with_capacity(size.cell_count());
        for row in 0..u64::from(size.rows) {
            let upper = source_y(row * 2);
            let lower = source_y(row * 2 + 1);
            for &x in &source_x {
                cells.push(Cell::new(buffer.pixel(x, upper), buffer.pixel(x, lower)));
            }
        }

        Self { size, cells }
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn cell(&self, column: u16, row: u16) -> Option<&Cell> {
        if column >= self.size.columns || row >= self.size.rows {
            return None;
        }
        self.cells
            .get(usize::from(row) * usize::from(self.size.columns) + usize::from(column))
    }

    /// Iterate over the rows of the grid, top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(usize::from(self.size.columns.max(1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fit_grid;

    #[test]
    fn test_native_size_uses_adjacent_rows() {
        let buffer = PixelBuffer::from_fn(2, 4, |x, y| Rgb::new(x as u8, y as u8, 0)).unwrap();
        let grid = CellGrid::sample(&buffer, GridSize::new(2, 2));

        let cell = grid.cell(1, 1).unwrap();
        assert_eq!(cell.fg, Rgb::new(1, 2, 0));
        assert_eq!(cell.bg, Rgb::new(1, 3, 0));
        assert_eq!(cell.glyph(), HALF_BLOCK);
    }

    #[test]
    fn test_odd_height_ignores_last_row() {
        let buffer = PixelBuffer::from_fn(1, 5, |_, y| Rgb::new(0, 0, y as u8)).unwrap();
        let size = fit_grid(1, 5, 1, None).unwrap();
        let grid = CellGrid::sample(&buffer, size);

        assert_eq!(grid.size(), GridSize::new(1, 2));
        let blues: Vec<u8> = grid.rows().flat_map(|r| [r[0].fg.b, r[0].bg.b]).collect();
        assert_eq!(blues, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_downsample_picks_nearest() {
        let buffer = PixelBuffer::from_fn(8, 8, |x, y| Rgb::new(x as u8, y as u8, 0)).unwrap();
        let grid = CellGrid::sample(&buffer, GridSize::new(4, 2));

        assert_eq!(grid.cell(3, 1).unwrap().fg, Rgb::new(6, 4, 0));
        assert_eq!(grid.cell(3, 1).unwrap().bg, Rgb::new(6, 6, 0));
        assert!(grid.cell(4, 0).is_none());
    }
}
