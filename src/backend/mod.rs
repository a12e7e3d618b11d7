//! Display Backends
//!
//! A backend connects a session to one virtual display. It provides:
//! - A `FrameSource` that snapshots the display's framebuffer
//! - An `InputInjector` that replays synthetic pointer and keyboard input
//!
//! Two backends ship with the crate: `x11` drives a real X display through
//! `ffmpeg` and `xdotool`, and `pattern` is an in-process display used for
//! demos and tests.

mod keysym;
mod pattern;
mod x11;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::PixelBuffer;
use crate::input::{KeyStroke, MouseButton};

pub use keysym::keysym_name;
pub use pattern::{InjectionLog, PatternBackend, PatternFrameSource, PatternInjector};
pub use x11::{xdotool_args, X11Backend, X11FrameSource, XdotoolInjector};

/// One virtual display a session can be bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DisplayHandle {
    /// Slot in the display pool
    #[serde(skip)]
    pub index: usize,
    /// Display name as the display server knows it, e.g. `:1`
    pub name: String,
    pub width: u32,
    pub height: u32,
}

impl DisplayHandle {
    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            index: 0,
            name: name.into(),
            width,
            height,
        }
    }
}

/// Input to replay on a display. Fire-and-forget: nothing is reported back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntheticCommand {
    MoveAbsolute { x: i32, y: i32 },
    MoveRelative { dx: i32, dy: i32 },
    ButtonDown(MouseButton),
    ButtonUp(MouseButton),
    /// Wheel clicks, positive is up
    Scroll(i32),
    KeyDown(KeyStroke),
    KeyUp(KeyStroke),
    KeyTap(KeyStroke),
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum InjectionFailed {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
    },
    #[error("command not supported: {0:?}")]
    Unsupported(SyntheticCommand),
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to start {program} for display {display}: {source}")]
    Spawn {
        program: String,
        display: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid display {display}: {reason}")]
    InvalidDisplay { display: String, reason: String },
}

/// Snapshots a display's framebuffer. Never changes application state.
pub trait FrameSource: Send {
    /// Most recent frame, or `CaptureUnavailable` when the display
    /// connection is not up
    fn capture(&mut self) -> Result<PixelBuffer, CaptureError>;
}

/// Replays synthetic input on a display
#[async_trait]
pub trait InputInjector: Send + Sync {
    async fn inject(
        &self,
        command: &SyntheticCommand,
        display: &DisplayHandle,
    ) -> Result<(), InjectionFailed>;
}

/// What a backend hands a session when it opens a display
pub struct BackendParts {
    pub source: Box<dyn FrameSource>,
    pub injector: Arc<dyn InputInjector>,
}

/// Factory for frame sources and injectors bound to one display
pub trait DisplayBackend: Send + Sync {
    fn open(&self, display: &DisplayHandle) -> Result<BackendParts, BackendError>;
}
