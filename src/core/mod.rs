//! Frame Core Module
//!
//! Platform-independent data model shared by the renderer and the input path:
//! - Pixel buffers captured from a display
//! - Half-block cells and the cell grid built from a buffer
//! - Grid sizes and the mapping between terminal cells and display pixels
//!
//! Everything here is deterministic: the same pixel buffer and target size
//! always produce the same grid.

mod cell;
mod geometry;
mod pixels;

pub use cell::{Cell, CellGrid, HALF_BLOCK};
pub use geometry::{fit_grid, Geometry, GridSize};
pub use pixels::{InvalidDimensions, PixelBuffer, Rgb};
