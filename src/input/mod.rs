//! Input Module
//!
//! The path from a viewer's keyboard and mouse to the display:
//! - `decoder`: terminal bytes to `InputEvent`s (keys, mouse reports, size
//!   replies)
//! - `translator`: events to `SyntheticCommand`s in display pixel space,
//!   honouring the session's mouse mode
//! - `hold`: key-hold emulation for terminals that only send key repeats
//!
//! # Mouse Decoding
//!
//! Both SGR (`CSI < b ; x ; y M|m`) and X10 (`CSI M cb cx cy`) reports are
//! accepted. Button bits 0-1 select Left/Middle/Right, bit 5 (32) marks
//! motion, bit 6 (64) marks the wheel and bit 7 (128) the extra buttons.

mod decoder;
mod event;
mod hold;
mod translator;

pub use decoder::{InputDecoder, MAX_SEQUENCE_LEN, TOGGLE_KEY};
pub use event::{InputEvent, KeyCode, KeyStroke, Modifiers, MouseButton};
pub use hold::KeyHoldTracker;
pub use translator::InputTranslator;
