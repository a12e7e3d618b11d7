//! Session Manager
//!
//! Owns every attached session. Attaching binds a viewer connection to a
//! display from the pool and spawns two tasks for it: the display loop
//! (frames out) and the input pipeline (commands in). Both watch a shared
//! close signal; detaching raises it, waits for both and hands the display
//! back.
//!
//! Sessions that stop on their own (viewer disconnected, capture gone) are
//! reported through a channel and removed by a reaper task, so the table
//! never holds dead sessions for long.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::pipeline::{InputPipeline, PipelineConfig, PipelineOutcome, PipelineSignals};
use super::pool::DisplayPool;
use super::state::{SessionId, SessionState};
use crate::app::{Config, InputConfig, RenderConfig};
use crate::backend::{BackendError, BackendParts, DisplayBackend, DisplayHandle};
use crate::core::{Geometry, GridSize};
use crate::renderer::{DisplayLoop, FrameStats, LoopSignals, StopReason};

/// Viewer side of a session, as handed over by a transport
pub struct Connection {
    /// Stable identity (e.g. an SSH key fingerprint). Reconnecting with the
    /// same identity takes over the old session and its display.
    pub identity: Option<String>,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
    /// Terminal size at attach time
    pub size: GridSize,
    /// Ask the terminal for its size periodically. Off for transports that
    /// can read the size themselves.
    pub size_queries: bool,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("identity", &self.identity)
            .field("size", &self.size)
            .field("size_queries", &self.size_queries)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AttachError {
    #[error("no display available")]
    NoDisplayAvailable,
    #[error("session manager is shutting down")]
    ShuttingDown,
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Snapshot of one attached session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub identity: Option<String>,
    pub display: String,
    pub size: GridSize,
    pub frames_written: u64,
    pub capture_failures: u64,
}

/// A display taken from the pool for a session that has not started yet.
/// Dropping it puts the display back.
pub struct Reservation {
    inner: Weak<Inner>,
    id: SessionId,
    identity: Option<String>,
    display: Option<DisplayHandle>,
}

impl Reservation {
    pub fn id(&self) -> &SessionId {
        &self.id
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if let (Some(assigned), Some(inner)) = (self.display.take(), self.inner.upgrade()) {
            debug!(display = %assigned.name, "Reservation dropped");
            inner.lock_pool().release(assigned.index);
        }
    }
}

struct SessionHandle {
    serial: u64,
    identity: Option<String>,
    display: DisplayHandle,
    close: watch::Sender<bool>,
    terminal_size: watch::Sender<GridSize>,
    stats: Arc<FrameStats>,
    display_task: JoinHandle<StopReason>,
    input_task: JoinHandle<PipelineOutcome>,
}

struct Inner {
    backend: Arc<dyn DisplayBackend>,
    render: RenderConfig,
    input: InputConfig,
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    pool: Mutex<DisplayPool>,
    next_serial: AtomicU64,
    next_viewer: AtomicU64,
    shutting_down: AtomicBool,
    ended: mpsc::UnboundedSender<(SessionId, u64)>,
}

impl Inner {
    fn lock_pool(&self) -> MutexGuard<'_, DisplayPool> {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared handle to the session table. Cheap to clone.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// Must be called inside a tokio runtime; spawns the reaper task.
    pub fn new(backend: Arc<dyn DisplayBackend>, config: &Config) -> Self {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner {
            backend,
            render: config.render.clone(),
            input: config.input.clone(),
            sessions: RwLock::new(HashMap::new()),
            pool: Mutex::new(DisplayPool::new(
                config.displays.iter().cloned(),
                config.share_displays,
            )),
            next_serial: AtomicU64::new(1),
            next_viewer: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
            ended: ended_tx,
        });

        tokio::spawn(reap(Arc::downgrade(&inner), ended_rx));
        Self { inner }
    }

    /// Reserve and start in one step
    pub async fn attach(&self, connection: Connection) -> Result<SessionId, AttachError> {
        let reservation = self.reserve(connection.identity.clone()).await?;
        self.start(reservation, connection).await
    }

    /// Take a display for a new session. An attached session with the same
    /// identity is detached first.
    pub async fn reserve(&self, identity: Option<String>) -> Result<Reservation, AttachError> {
        if self.inner.shutting_down.load(Ordering::Acquire) {
            return Err(AttachError::ShuttingDown);
        }

        if let Some(identity) = &identity {
            let previous = SessionId::new(identity.clone());
            if self.detach(&previous).await {
                info!(session = %previous, "Previous session taken over");
            }
        }

        let assigned = {
            let mut pool = self.inner.lock_pool();
            let preferred = identity.as_deref().and_then(|identity| pool.slot_for(identity));
            pool.acquire(preferred).ok_or(AttachError::NoDisplayAvailable)?
        };

        let id = match &identity {
            Some(identity) => SessionId::new(identity.clone()),
            None => {
                let n = self.inner.next_viewer.fetch_add(1, Ordering::Relaxed);
                SessionId::new(format!("viewer-{n}"))
            }
        };

        debug!(session = %id, display = %assigned.name, "Display reserved");
        Ok(Reservation {
            inner: Arc::downgrade(&self.inner),
            id,
            identity,
            display: Some(assigned),
        })
    }

    /// Open the reserved display and start streaming to `connection`
    pub async fn start(
        &self,
        mut reservation: Reservation,
        connection: Connection,
    ) -> Result<SessionId, AttachError> {
        let inner = &self.inner;
        let Some(assigned) = reservation.display.clone() else {
            return Err(AttachError::NoDisplayAvailable);
        };
        // On failure the reservation drops here and returns the display
        let BackendParts { source, injector } = inner.backend.open(&assigned)?;

        let id = reservation.id.clone();
        let serial = inner.next_serial.fetch_add(1, Ordering::Relaxed);
        let Connection {
            identity,
            reader,
            writer,
            size,
            size_queries,
        } = connection;
        let identity = identity.or_else(|| reservation.identity.clone());

        let (close_tx, close_rx) = watch::channel(false);
        let (size_tx, size_rx) = watch::channel(size);
        let geometry = Geometry::new(size, assigned.width, assigned.height);
        let (geometry_tx, geometry_rx) = watch::channel(geometry);

        let mut display_loop = DisplayLoop::new(
            inner.render.display_loop(size_queries),
            source,
            writer,
            LoopSignals {
                terminal_size: size_rx,
                geometry: geometry_tx,
                close: close_rx.clone(),
            },
        );
        let stats = display_loop.stats();

        let state = SessionState::new(id.clone(), assigned.clone(), inner.input.default_mouse_mode)
            .with_sensitivity(inner.input.relative_sensitivity)
            .with_geometry(geometry);
        let mut pipeline = InputPipeline::new(
            PipelineConfig::from(&inner.input),
            reader,
            state,
            injector,
            PipelineSignals {
                terminal_size: size_tx.clone(),
                geometry: geometry_rx,
                close: close_rx,
            },
        );

        let ended = inner.ended.clone();
        let session = id.clone();
        let display_task = tokio::spawn(async move {
            let reason = display_loop.run().await;
            if reason != StopReason::Detached {
                let _ = ended.send((session, serial));
            }
            reason
        });

        let ended = inner.ended.clone();
        let session = id.clone();
        let input_task = tokio::spawn(async move {
            let outcome = pipeline.run().await;
            if outcome.ends_session() {
                let _ = ended.send((session, serial));
            }
            outcome
        });

        let handle = SessionHandle {
            serial,
            identity: identity.clone(),
            display: assigned.clone(),
            close: close_tx,
            terminal_size: size_tx,
            stats,
            display_task,
            input_task,
        };

        // The display now belongs to the session handle
        reservation.display = None;
        if let Some(identity) = &identity {
            inner.lock_pool().remember(assigned.index, identity);
        }

        let replaced = inner.sessions.write().await.insert(id.clone(), handle);
        if let Some(old) = replaced {
            warn!(session = %id, "Replaced a session attached concurrently");
            self.teardown(&id, old).await;
        }
        if inner.shutting_down.load(Ordering::Acquire) {
            self.detach(&id).await;
            return Err(AttachError::ShuttingDown);
        }

        info!(
            session = %id,
            display = %assigned.name,
            columns = size.columns,
            rows = size.rows,
            "Session attached"
        );
        Ok(id)
    }

    /// Stop a session and give its display back. Returns whether the
    /// session was attached.
    pub async fn detach(&self, id: &SessionId) -> bool {
        let handle = self.inner.sessions.write().await.remove(id);
        match handle {
            Some(handle) => {
                self.teardown(id, handle).await;
                true
            }
            None => false,
        }
    }

    /// Detach `id` only if it is still the session started as `serial`
    async fn detach_if(&self, id: &SessionId, serial: u64) -> bool {
        let handle = {
            let mut sessions = self.inner.sessions.write().await;
            match sessions.get(id) {
                Some(handle) if handle.serial == serial => sessions.remove(id),
                _ => None,
            }
        };
        match handle {
            Some(handle) => {
                self.teardown(id, handle).await;
                true
            }
            None => false,
        }
    }

    async fn teardown(&self, id: &SessionId, handle: SessionHandle) {
        handle.close.send_replace(true);

        let reason = match handle.display_task.await {
            Ok(reason) => Some(reason),
            Err(e) => {
                warn!(session = %id, error = %e, "Display task failed");
                None
            }
        };
        let outcome = match handle.input_task.await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(session = %id, error = %e, "Input task failed");
                None
            }
        };

        self.inner.lock_pool().release(handle.display.index);
        info!(
            session = %id,
            display = %handle.display.name,
            frames = handle.stats.frames_written(),
            reason = ?reason,
            input = ?outcome,
            "Session detached"
        );
    }

    /// Report a new terminal size for `id`
    pub async fn resize(&self, id: &SessionId, size: GridSize) -> bool {
        let sessions = self.inner.sessions.read().await;
        match sessions.get(id) {
            Some(handle) => {
                handle.terminal_size.send_replace(size);
                true
            }
            None => false,
        }
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        self.inner.sessions.read().await.contains_key(id)
    }

    /// Attached sessions, ordered by id
    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.inner.sessions.read().await;
        let mut infos: Vec<SessionInfo> = sessions
            .iter()
            .map(|(id, handle)| SessionInfo {
                id: id.clone(),
                identity: handle.identity.clone(),
                display: handle.display.name.clone(),
                size: *handle.terminal_size.borrow(),
                frames_written: handle.stats.frames_written(),
                capture_failures: handle.stats.capture_failures(),
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Sessions bound to display slot `index`
    pub fn sessions_on_display(&self, index: usize) -> usize {
        self.inner.lock_pool().sessions_on(index)
    }

    /// Refuse new sessions and detach every attached one
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::Release);
        let drained: Vec<(SessionId, SessionHandle)> =
            self.inner.sessions.write().await.drain().collect();
        if !drained.is_empty() {
            info!(sessions = drained.len(), "Detaching all sessions");
        }
        for (id, handle) in drained {
            self.teardown(&id, handle).await;
        }
    }
}

/// Removes sessions whose tasks stopped on their own
async fn reap(inner: Weak<Inner>, mut ended: mpsc::UnboundedReceiver<(SessionId, u64)>) {
    while let Some((id, serial)) = ended.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let manager = SessionManager { inner };
        if manager.detach_if(&id, serial).await {
            debug!(session = %id, "Ended session removed");
        }
    }
}
