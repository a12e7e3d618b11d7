//! termframe
//!
//! Streams virtual displays into ordinary truecolor terminals and replays
//! the terminal's mouse and keyboard on the display.
//!
//! - `core`: pixel buffers, half-block cells, grid geometry
//! - `renderer`: cell encoding and the per-session display loop
//! - `input`: terminal input decoding and translation to synthetic input
//! - `backend`: frame capture and input injection for a display
//! - `session`: session table, display pool, input pipeline
//! - `transport`: TCP and local terminal front ends
//! - `app`: configuration

pub mod app;
pub mod backend;
pub mod core;
pub mod input;
pub mod renderer;
pub mod session;
pub mod transport;
