//! Application glue module
//!
//! Configuration and the settings derived from it.

mod config;

pub use config::{
    default_path, BackendKind, Config, ConfigError, InputConfig, RenderConfig, TerminalConfig,
    X11Config,
};
