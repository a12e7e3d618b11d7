//! Display Loop
//!
//! Drives one session's output: capture a frame, encode it for the viewer's
//! current terminal size, write it, and repeat on a fixed interval. Ticks
//! that fall behind are skipped rather than queued, so a slow viewer sees a
//! lower frame rate instead of growing latency.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::{self, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::encoder::{estimated_len, CellEncoder, ColorDepth};
use crate::backend::FrameSource;
use crate::core::{CellGrid, Geometry, GridSize};

/// Enter alternate screen, hide cursor, any-event mouse tracking in SGR
/// encoding, clear
pub const PREAMBLE: &[u8] = b"\x1b[?1049h\x1b[?25l\x1b[?1003h\x1b[?1006h\x1b[2J";

/// Undo the preamble and reset attributes
pub const EPILOGUE: &[u8] = b"\x1b[?1006l\x1b[?1003l\x1b[?25h\x1b[?1049l\x1b[0m";

/// Text area size query, answered with `CSI 8 ; rows ; cols t`
pub const SIZE_QUERY: &[u8] = b"\x1b[18t";

const SYNC_BEGIN: &[u8] = b"\x1b[?2026h";
const SYNC_END: &[u8] = b"\x1b[?2026l";
const CLEAR: &[u8] = b"\x1b[0m\x1b[2J";

/// Upper bound on restoring the viewer's terminal when a session stops
const EPILOGUE_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct DisplayLoopConfig {
    pub frame_interval: Duration,
    /// Consecutive failed captures before the loop gives up
    pub max_capture_failures: u32,
    pub synchronized_updates: bool,
    /// Interval for `CSI 18t`, `None` when the transport reports sizes itself
    pub size_query_interval: Option<Duration>,
    pub color_depth: ColorDepth,
}

impl Default for DisplayLoopConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            max_capture_failures: 150,
            synchronized_updates: true,
            size_query_interval: None,
            color_depth: ColorDepth::TrueColor,
        }
    }
}

/// Why a display loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Close signal from the session manager
    Detached,
    /// Too many consecutive capture failures
    CaptureUnavailable,
    /// The viewer's output stream failed
    OutputWriteFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Streaming,
    Stopped(StopReason),
}

/// Counters readable while the loop runs
#[derive(Debug, Default)]
pub struct FrameStats {
    frames_written: AtomicU64,
    capture_failures: AtomicU64,
}

impl FrameStats {
    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    /// Ticks skipped because no frame could be captured
    pub fn capture_failures(&self) -> u64 {
        self.capture_failures.load(Ordering::Relaxed)
    }
}

/// Channels linking a display loop to the rest of its session
pub struct LoopSignals {
    /// Viewer terminal size, updated by the input path or the transport
    pub terminal_size: watch::Receiver<GridSize>,
    /// Published whenever the rendered grid or display resolution changes
    pub geometry: watch::Sender<Geometry>,
    /// Becomes `true` when the session is detached
    pub close: watch::Receiver<bool>,
}

pub struct DisplayLoop<W> {
    config: DisplayLoopConfig,
    encoder: CellEncoder,
    source: Box<dyn FrameSource>,
    output: W,
    signals: LoopSignals,
    stats: Arc<FrameStats>,
    state: LoopState,
    rendered: Option<Geometry>,
    consecutive_failures: u32,
    frame: Vec<u8>,
}

impl<W: AsyncWrite + Unpin + Send> DisplayLoop<W> {
    pub fn new(
        config: DisplayLoopConfig,
        source: Box<dyn FrameSource>,
        output: W,
        signals: LoopSignals,
    ) -> Self {
        Self {
            encoder: CellEncoder::new(config.color_depth),
            config,
            source,
            output,
            signals,
            stats: Arc::new(FrameStats::default()),
            state: LoopState::Idle,
            rendered: None,
            consecutive_failures: 0,
            frame: Vec::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> Arc<FrameStats> {
        Arc::clone(&self.stats)
    }

    /// Stream frames until detached or until the source or output fails
    pub async fn run(&mut self) -> StopReason {
        if is_closed(&self.signals.close) {
            return self.stop(StopReason::Detached).await;
        }

        if let Err(e) = write_flush(&mut self.output, PREAMBLE).await {
            warn!(error = %e, "Failed to write session preamble");
            return self.stop(StopReason::OutputWriteFailed).await;
        }
        self.state = LoopState::Streaming;

        let mut ticker = time::interval(self.config.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut size_query = self.config.size_query_interval.map(|period| {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            let has_query = size_query.is_some();
            tokio::select! {
                biased;

                _ = closed(&mut self.signals.close) => {
                    return self.stop(StopReason::Detached).await;
                }
                _ = ticker.tick() => {
                    if let Some(reason) = self.tick().await {
                        return self.stop(reason).await;
                    }
                }
                _ = next_tick(&mut size_query), if has_query => {
                    if let Err(e) = write_flush(&mut self.output, SIZE_QUERY).await {
                        debug!(error = %e, "Size query failed");
                        return self.stop(StopReason::OutputWriteFailed).await;
                    }
                }
            }
        }
    }

    /// One frame. Returns a reason when the loop has to stop.
    async fn tick(&mut self) -> Option<StopReason> {
        let buffer = match self.source.capture() {
            Ok(buffer) => {
                self.consecutive_failures = 0;
                buffer
            }
            Err(e) => {
                self.consecutive_failures += 1;
                self.stats.capture_failures.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, failures = self.consecutive_failures, "Skipping frame");
                if self.consecutive_failures >= self.config.max_capture_failures {
                    warn!(error = %e, "Giving up on capture");
                    return Some(StopReason::CaptureUnavailable);
                }
                return None;
            }
        };

        let terminal = *self.signals.terminal_size.borrow_and_update();
        let grid = match self
            .encoder
            .with_row_limit(Some(u32::from(terminal.rows)))
            .fit(buffer.width(), buffer.height(), u32::from(terminal.columns))
        {
            Ok(grid) => grid,
            Err(e) => {
                warn!(error = %e, "Cannot render frame");
                return None;
            }
        };

        let geometry = Geometry::new(grid, buffer.width(), buffer.height());
        let changed = self.rendered != Some(geometry);

        self.frame.clear();
        self.frame.reserve(estimated_len(grid) + 32);
        if self.config.synchronized_updates {
            self.frame.extend_from_slice(SYNC_BEGIN);
        }
        if changed {
            self.frame.extend_from_slice(CLEAR);
        }
        self.encoder
            .encode_grid(&CellGrid::sample(&buffer, grid), &mut self.frame);
        if self.config.synchronized_updates {
            self.frame.extend_from_slice(SYNC_END);
        }

        if changed {
            debug!(columns = grid.columns, rows = grid.rows, "Rendering at new size");
            self.rendered = Some(geometry);
            self.signals.geometry.send_replace(geometry);
        }

        tokio::select! {
            biased;

            _ = closed(&mut self.signals.close) => Some(StopReason::Detached),
            result = write_flush(&mut self.output, &self.frame) => match result {
                Ok(()) => {
                    self.stats.frames_written.fetch_add(1, Ordering::Relaxed);
                    None
                }
                Err(e) => {
                    debug!(error = %e, "Output write failed");
                    Some(StopReason::OutputWriteFailed)
                }
            },
        }
    }

    async fn stop(&mut self, reason: StopReason) -> StopReason {
        if reason != StopReason::OutputWriteFailed && self.state == LoopState::Streaming {
            // Best effort: the viewer may already be gone
            let _ = time::timeout(EPILOGUE_TIMEOUT, write_flush(&mut self.output, EPILOGUE)).await;
        }
        self.state = LoopState::Stopped(reason);
        info!(
            ?reason,
            frames = self.stats.frames_written(),
            capture_failures = self.stats.capture_failures(),
            "Display loop stopped"
        );
        reason
    }
}

async fn write_flush<W: AsyncWrite + Unpin>(output: &mut W, bytes: &[u8]) -> std::io::Result<()> {
    output.write_all(bytes).await?;
    output.flush().await
}

fn is_closed(close: &watch::Receiver<bool>) -> bool {
    *close.borrow()
}

/// Resolves once the close flag is set or its sender is gone
pub(crate) async fn closed(close: &mut watch::Receiver<bool>) {
    loop {
        if *close.borrow_and_update() {
            return;
        }
        if close.changed().await.is_err() {
            return;
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
