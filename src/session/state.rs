//! Per-session state

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::backend::DisplayHandle;
use crate::core::{Geometry, GridSize};

/// How pointer reports are replayed on the display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseMode {
    /// Pointer warps to the mapped position
    #[default]
    Absolute,
    /// Pointer moves by the scaled difference between reports
    Relative,
}

impl MouseMode {
    pub fn toggled(self) -> Self {
        match self {
            MouseMode::Absolute => MouseMode::Relative,
            MouseMode::Relative => MouseMode::Absolute,
        }
    }
}

impl fmt::Display for MouseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MouseMode::Absolute => f.write_str("absolute"),
            MouseMode::Relative => f.write_str("relative"),
        }
    }
}

/// Stable name of a session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// State the input path keeps for one attached viewer
#[derive(Debug, Clone)]
pub struct SessionState {
    pub id: SessionId,
    pub display: DisplayHandle,
    pub mouse_mode: MouseMode,
    /// Last pointer position in display pixels
    pub last_known_position: Option<(i32, i32)>,
    /// Rendered grid and the display resolution it was sampled from
    pub geometry: Geometry,
    pub relative_sensitivity: i32,
}

impl SessionState {
    pub fn new(id: SessionId, display: DisplayHandle, mouse_mode: MouseMode) -> Self {
        let geometry = Geometry::new(GridSize::default(), display.width, display.height);
        Self {
            id,
            display,
            mouse_mode,
            last_known_position: None,
            geometry,
            relative_sensitivity: 5,
        }
    }

    pub fn with_sensitivity(mut self, sensitivity: i32) -> Self {
        self.relative_sensitivity = sensitivity;
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }
}
