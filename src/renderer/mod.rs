//! Terminal Renderer Module
//!
//! Turns captured frames into terminal output. Each character cell carries
//! two vertically stacked pixels using the upper half block glyph, coloured
//! with 24-bit SGR sequences (or the xterm 256-colour palette).

mod display_loop;
mod encoder;
mod palette;

pub(crate) use display_loop::closed;
pub use display_loop::{
    DisplayLoop, DisplayLoopConfig, FrameStats, LoopSignals, LoopState, StopReason, EPILOGUE,
    PREAMBLE, SIZE_QUERY,
};
pub use encoder::{estimated_len, CellEncoder, ColorDepth, EncodeError, FRAME_END};
pub use palette::to_ansi256;
