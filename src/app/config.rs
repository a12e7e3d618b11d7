//! Configuration for the display server

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::DisplayHandle;
use crate::renderer::{ColorDepth, DisplayLoopConfig};
use crate::session::MouseMode;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address `serve` listens on
    pub listen_address: String,
    /// Which display backend sessions are bound to
    pub backend: BackendKind,
    /// Virtual displays available to sessions
    pub displays: Vec<DisplayHandle>,
    /// Let sessions share a display when every display is taken
    pub share_displays: bool,
    /// Frame rendering
    pub render: RenderConfig,
    /// Input handling
    pub input: InputConfig,
    /// X11 backend tools
    pub x11: X11Config,
    /// Viewer terminal defaults
    pub terminal: TerminalConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: "127.0.0.1:9867".to_string(),
            backend: BackendKind::X11,
            displays: (1..=4)
                .map(|n| DisplayHandle::new(format!(":{n}"), 640, 480))
                .collect(),
            share_displays: false,
            render: RenderConfig::default(),
            input: InputConfig::default(),
            x11: X11Config::default(),
            terminal: TerminalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// `ffmpeg` capture and `xdotool` injection
    X11,
    /// In-process animated test pattern
    Pattern,
}

/// Rendering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Time between frames in milliseconds
    pub frame_interval_ms: u64,
    /// `truecolor` or `ansi256`
    pub color_depth: ColorDepth,
    /// Wrap frames in synchronized update markers
    pub synchronized_updates: bool,
    /// Consecutive capture failures before a session is ended
    pub max_capture_failures: u32,
    /// How often to ask the viewer's terminal for its size, 0 = never
    pub size_query_interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 33,
            color_depth: ColorDepth::TrueColor,
            synchronized_updates: true,
            max_capture_failures: 150,
            size_query_interval_ms: 1000,
        }
    }
}

impl RenderConfig {
    /// Display loop settings; size queries only when the transport wants them
    pub fn display_loop(&self, size_queries: bool) -> DisplayLoopConfig {
        DisplayLoopConfig {
            frame_interval: Duration::from_millis(self.frame_interval_ms),
            max_capture_failures: self.max_capture_failures,
            synchronized_updates: self.synchronized_updates,
            size_query_interval: (size_queries && self.size_query_interval_ms > 0)
                .then(|| Duration::from_millis(self.size_query_interval_ms)),
            color_depth: self.color_depth,
        }
    }
}

/// Input configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Mouse mode new sessions start in
    pub default_mouse_mode: MouseMode,
    /// Multiplier for pointer deltas in relative mode
    pub relative_sensitivity: i32,
    /// Quiet time after which a pending ESC is taken as the Escape key
    pub escape_timeout_ms: u64,
    /// Keys sent as held while the terminal keeps repeating them
    pub hold_keys: Vec<char>,
    /// How long a hold key stays down after its last repeat
    pub key_hold_ms: u64,
    /// Ctrl+C ends the session. When off it reaches the display as a key.
    pub interrupt_ends_session: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            default_mouse_mode: MouseMode::Absolute,
            relative_sensitivity: 5,
            escape_timeout_ms: 50,
            hold_keys: vec!['w', 'a', 's', 'd'],
            key_hold_ms: 100,
            interrupt_ends_session: true,
        }
    }
}

/// External tools used by the X11 backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct X11Config {
    pub ffmpeg: String,
    pub xdotool: String,
    /// Frame rate requested from `x11grab`
    pub capture_fps: u32,
}

impl Default for X11Config {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            xdotool: "xdotool".to_string(),
            capture_fps: 30,
        }
    }
}

/// Size assumed for viewers that have not reported one
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    pub default_columns: u16,
    pub default_rows: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            default_columns: 80,
            default_rows: 24,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from default location or return default config
    pub fn load_or_default() -> Self {
        // Try to load from ~/.config/termframe/config.json
        if let Some(config_path) = default_path() {
            if config_path.exists() {
                match Self::load(&config_path) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(path = %config_path.display(), error = %e, "Ignoring config file")
                    }
                }
            }
        }
        Self::default()
    }

    /// Load `path` if given (failing if it cannot be read), else the default
    /// location
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::load_or_default()),
        }
    }

    /// Check values a session cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| Err(ConfigError::Invalid(reason.to_string()));

        if self.displays.is_empty() {
            return invalid("at least one display is required");
        }
        if let Some(display) = self
            .displays
            .iter()
            .find(|d| d.width < 1 || d.height < 2 || d.name.is_empty())
        {
            return Err(ConfigError::Invalid(format!(
                "display {:?} needs a name and a resolution of at least 1x2",
                display.name
            )));
        }
        if self.render.frame_interval_ms == 0 {
            return invalid("render.frame_interval_ms must be positive");
        }
        if self.render.max_capture_failures == 0 {
            return invalid("render.max_capture_failures must be positive");
        }
        if self.input.relative_sensitivity <= 0 {
            return invalid("input.relative_sensitivity must be positive");
        }
        if self.terminal.default_columns == 0 || self.terminal.default_rows == 0 {
            return invalid("terminal size must be positive");
        }
        Ok(())
    }
}

/// Default configuration file path
pub fn default_path() -> Option<PathBuf> {
    dirs_config_path().map(|dir| dir.join("config.json"))
}

/// Get the configuration directory path
fn dirs_config_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".config").join("termframe"))
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
