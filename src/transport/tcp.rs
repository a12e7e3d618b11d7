//! TCP transport
//!
//! Each accepted connection becomes one session with no identity. The
//! socket carries raw terminal bytes both ways, so any `nc`-style client
//! in a truecolor terminal works as a viewer.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tracing::{debug, info, warn};

use super::TransportError;
use crate::core::GridSize;
use crate::session::{AttachError, Connection, Reservation, SessionManager};

/// Shown while every display is taken
pub const WAITING_BANNER: &[u8] =
    b"\x1b[2J\x1b[HAll displays are busy, waiting for one to free up...\r\n";

const RETRY_INTERVAL: Duration = Duration::from_secs(1);
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept viewers forever
pub async fn serve(
    listener: TcpListener,
    manager: SessionManager,
    initial_size: GridSize,
) -> std::io::Result<()> {
    info!(address = %listener.local_addr()?, "Listening for viewers");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                // Usually fd exhaustion; give sessions a moment to close
                warn!(error = %e, "Accept failed");
                time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
        }

        let manager = manager.clone();
        tokio::spawn(async move {
            match handle_viewer(stream, peer, &manager, initial_size).await {
                Ok(()) => {}
                Err(e) => warn!(%peer, error = %e, "Viewer rejected"),
            }
        });
    }
}

async fn handle_viewer(
    mut stream: TcpStream,
    peer: SocketAddr,
    manager: &SessionManager,
    initial_size: GridSize,
) -> Result<(), TransportError> {
    let Some(reservation) = wait_for_display(&mut stream, peer, manager).await? else {
        debug!(%peer, "Viewer left while waiting");
        return Ok(());
    };
    debug!(%peer, session = %reservation.id(), "Display reserved for viewer");

    let (reader, writer) = stream.into_split();
    let id = manager
        .start(
            reservation,
            Connection {
                identity: None,
                reader: Box::new(reader),
                writer: Box::new(writer),
                size: initial_size,
                size_queries: true,
            },
        )
        .await?;
    info!(%peer, session = %id, "Viewer connected");
    Ok(())
}

/// Reserve a display, showing the waiting banner and retrying while the
/// pool is exhausted. `None` when the viewer disconnects first.
async fn wait_for_display(
    stream: &mut TcpStream,
    peer: SocketAddr,
    manager: &SessionManager,
) -> Result<Option<Reservation>, TransportError> {
    let mut announced = false;
    let mut discard = [0u8; 256];

    loop {
        match manager.reserve(None).await {
            Ok(reservation) => return Ok(Some(reservation)),
            Err(AttachError::NoDisplayAvailable) => {}
            Err(e) => return Err(e.into()),
        }

        if !announced {
            info!(%peer, "No display free, viewer waiting");
            stream.write_all(WAITING_BANNER).await?;
            announced = true;
        }

        tokio::select! {
            _ = time::sleep(RETRY_INTERVAL) => {}
            read = stream.read(&mut discard) => match read {
                Ok(0) | Err(_) => return Ok(None),
                Ok(_) => {}
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{BackendKind, Config};
    use crate::backend::{DisplayHandle, PatternBackend};
    use crate::renderer::PREAMBLE;
    use std::sync::Arc;

    async fn read_at_least(stream: &mut TcpStream, n: usize) -> Vec<u8> {
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        while received.len() < n {
            let read = stream.read(&mut buf).await.unwrap();
            assert!(read > 0, "connection closed early");
            received.extend_from_slice(&buf[..read]);
        }
        received
    }

    async fn wait_for_sessions(manager: &SessionManager, count: usize) -> bool {
        for _ in 0..100 {
            if manager.sessions().await.len() == count {
                return true;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn start_server(displays: usize) -> (SocketAddr, SessionManager) {
        let mut config = Config::default();
        config.backend = BackendKind::Pattern;
        config.displays = (1..=displays)
            .map(|n| DisplayHandle::new(format!(":{n}"), 32, 16))
            .collect();
        let manager = SessionManager::new(Arc::new(PatternBackend::new()), &config);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, manager.clone(), GridSize::new(32, 8)));
        (address, manager)
    }

    #[tokio::test]
    async fn test_viewer_receives_frames() {
        let (address, manager) = start_server(1).await;
        let mut viewer = TcpStream::connect(address).await.unwrap();

        let received = read_at_least(&mut viewer, PREAMBLE.len() + 64).await;
        assert!(received.starts_with(PREAMBLE));
        assert!(wait_for_sessions(&manager, 1).await);
    }

    #[tokio::test]
    async fn test_waiting_viewer_gets_freed_display() {
        let (address, manager) = start_server(1).await;
        let mut first = TcpStream::connect(address).await.unwrap();
        read_at_least(&mut first, PREAMBLE.len()).await;

        let mut second = TcpStream::connect(address).await.unwrap();
        let banner = read_at_least(&mut second, WAITING_BANNER.len()).await;
        assert!(banner.starts_with(WAITING_BANNER));

        drop(first);
        let received = time::timeout(Duration::from_secs(5), async {
            let mut seen = Vec::new();
            let mut buf = [0u8; 4096];
            while !seen.windows(PREAMBLE.len()).any(|w| w == PREAMBLE) {
                let n = second.read(&mut buf).await.unwrap();
                assert!(n > 0);
                seen.extend_from_slice(&buf[..n]);
            }
        })
        .await;
        assert!(received.is_ok(), "waiting viewer never attached");
        assert!(wait_for_sessions(&manager, 1).await);
    }
}
