//! Grid Geometry
//!
//! Sizing a pixel buffer into terminal cells, and mapping terminal cell
//! coordinates back into display pixels.

use serde::{Deserialize, Serialize};

use super::pixels::InvalidDimensions;

/// A size in terminal cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub columns: u16,
    pub rows: u16,
}

impl GridSize {
    pub const fn new(columns: u16, rows: u16) -> Self {
        Self { columns, rows }
    }

    /// Number of source pixel rows covered by this grid (two per cell row)
    pub fn pixel_rows(&self) -> u32 {
        u32::from(self.rows) * 2
    }

    pub fn cell_count(&self) -> usize {
        usize::from(self.columns) * usize::from(self.rows)
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self::new(80, 24)
    }
}

/// Fit a `width × height` image into at most `max_columns` columns and,
/// optionally, `max_rows` rows.
///
/// Columns never exceed the image width (no upsampling). The number of pixel
/// rows follows the aspect ratio and is rounded down to an even count, so an
/// odd-height image rendered at native width loses its last row.
pub fn fit_grid(
    width: u32,
    height: u32,
    max_columns: u32,
    max_rows: Option<u32>,
) -> Result<GridSize, InvalidDimensions> {
    let invalid = |reason| InvalidDimensions {
        width,
        height,
        reason,
    };

    if width == 0 || height == 0 {
        return Err(invalid("buffer has no pixels"));
    }
    if max_columns == 0 {
        return Err(invalid("target has no columns"));
    }

    let mut columns = max_columns.min(width).min(u32::from(u16::MAX));
    let pixel_rows = if columns == width {
        height
    } else {
        (u64::from(height) * u64::from(columns) / u64::from(width)) as u32
    };
    let mut rows = (pixel_rows & !1) / 2;

    if let Some(limit) = max_rows {
        if rows > limit {
            rows = limit;
            let fitted = u64::from(rows) * 2 * u64::from(width) / u64::from(height);
            columns = (fitted as u32).clamp(1, columns);
        }
    }

    if rows == 0 {
        return Err(invalid("image is shorter than one cell row"));
    }

    Ok(GridSize::new(columns as u16, rows.min(u32::from(u16::MAX)) as u16))
}

/// What a session is currently looking at: the rendered grid and the
/// resolution of the display it was sampled from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub grid: GridSize,
    pub display_width: u32,
    pub display_height: u32,
}

impl Geometry {
    pub fn new(grid: GridSize, display_width: u32, display_height: u32) -> Self {
        Self {
            grid,
            display_width,
            display_height,
        }
    }

    /// Rescale a 0-based cell position into display pixels.
    ///
    /// `x = col * width / columns`, `y = row * height / rows`. Rows here are
    /// cell rows, each covering two pixel rows of the rendered image, so the
    /// 2:1 packing is already part of the ratio. Results are clamped to the
    /// display.
    pub fn cell_to_display(&self, col: u16, row: u16) -> (i32, i32) {
        if self.grid.columns == 0 || self.grid.rows == 0 {
            return (0, 0);
        }
        let scale = |cell: u16, cells: u16, pixels: u32| -> i32 {
            let p = u64::from(cell) * u64::from(pixels) / u64::from(cells);
            p.min(u64::from(pixels.saturating_sub(1))) as i32
        };
        (
            scale(col, self.grid.columns, self.display_width),
            scale(row, self.grid.rows, self.display_height),
        )
    }
}
