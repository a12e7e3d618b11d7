//! Local transport
//!
//! Runs one session on the controlling terminal. Meant to be the forced
//! command of an SSH login, where stdin/stdout already are the viewer's
//! terminal and the window size is available from the pty.

use std::io;
use std::time::Duration;

use nix::sys::termios::{self, InputFlags, LocalFlags, SetArg, SpecialCharacterIndices, Termios};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::TransportError;
use crate::core::GridSize;
use crate::session::{Connection, SessionManager};

/// How often the session is checked for having ended, and the window size
/// re-read in case SIGWINCH was missed
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Attach the controlling terminal and run until the session ends
pub async fn run(
    manager: &SessionManager,
    identity: Option<String>,
    fallback_size: GridSize,
) -> Result<(), TransportError> {
    let _raw = RawModeGuard::new()?;

    let mut size = terminal_size().unwrap_or(fallback_size);
    let id = manager
        .attach(Connection {
            identity,
            reader: Box::new(tokio::io::stdin()),
            writer: Box::new(tokio::io::stdout()),
            size,
            size_queries: false,
        })
        .await?;
    info!(session = %id, columns = size.columns, rows = size.rows, "Local session started");

    let mut winch = signal(SignalKind::window_change())?;
    let mut poll = time::interval(POLL_INTERVAL);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = winch.recv() => {}
            _ = poll.tick() => {
                if !manager.contains(&id).await {
                    break;
                }
            }
        }
        if let Some(current) = terminal_size() {
            if current != size {
                debug!(columns = current.columns, rows = current.rows, "Terminal resized");
                size = current;
                manager.resize(&id, size).await;
            }
        }
    }

    manager.detach(&id).await;
    info!(session = %id, "Local session ended");
    Ok(())
}

/// Window size of the terminal on stdout
pub fn terminal_size() -> Option<GridSize> {
    use nix::libc;
    use nix::pty::Winsize;

    let mut ws = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };

    // SAFETY: TIOCGWINSZ only writes into the Winsize we pass
    let result = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };

    if result == 0 && ws.ws_col > 0 && ws.ws_row > 0 {
        Some(GridSize::new(ws.ws_col, ws.ws_row))
    } else {
        None
    }
}

/// Puts stdin in raw mode until dropped
pub struct RawModeGuard {
    original: Termios,
}

impl RawModeGuard {
    pub fn new() -> Result<Self, TransportError> {
        let original = termios::tcgetattr(io::stdin()).map_err(TransportError::NotATerminal)?;

        let mut raw = original.clone();
        // Ctrl+C arrives as a byte, not a signal
        raw.local_flags
            .remove(LocalFlags::ICANON | LocalFlags::ECHO | LocalFlags::ISIG | LocalFlags::IEXTEN);
        // Keep Ctrl+S/Ctrl+Q and a bare CR for the display
        raw.input_flags.remove(InputFlags::IXON | InputFlags::ICRNL);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;

        termios::tcsetattr(io::stdin(), SetArg::TCSANOW, &raw)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        Ok(Self { original })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(io::stdin(), SetArg::TCSANOW, &self.original);
    }
}
