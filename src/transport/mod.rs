//! Transports
//!
//! Ways a viewer's terminal reaches the session manager:
//! - `tcp`: raw TCP socket, one session per connection
//! - `local`: the controlling terminal, e.g. an SSH login running
//!   `termframe local` as its forced command

pub mod local;
pub mod tcp;

use crate::session::AttachError;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("standard input is not a terminal: {0}")]
    NotATerminal(nix::Error),
    #[error("attach failed: {0}")]
    Attach(#[from] AttachError),
}
