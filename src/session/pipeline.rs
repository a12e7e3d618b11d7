//! Session input pipeline
//!
//! Reads the viewer's input stream, decodes it, translates events against
//! the session state, and injects the resulting commands one at a time.
//! Whatever stops the pipeline, keys it is holding down are let go before
//! `run` returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

use super::state::SessionState;
use crate::app::InputConfig;
use crate::backend::{InputInjector, SyntheticCommand};
use crate::core::{Geometry, GridSize};
use crate::input::{
    InputDecoder, InputEvent, InputTranslator, KeyCode, KeyHoldTracker, KeyStroke, Modifiers,
};
use crate::renderer::closed;

const READ_BUFFER: usize = 4096;

/// Why the pipeline stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Close signal from the session manager
    Closed,
    /// The viewer closed its input stream
    ViewerGone,
    /// Reading the input stream failed
    ReadFailed,
    /// The viewer pressed Ctrl+C
    Interrupted,
}

impl PipelineOutcome {
    /// Whether the session should be torn down because of this outcome
    pub fn ends_session(self) -> bool {
        self != PipelineOutcome::Closed
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub escape_timeout: Duration,
    pub interrupt_ends_session: bool,
    pub hold_keys: Vec<char>,
    pub key_hold: Duration,
}

impl From<&InputConfig> for PipelineConfig {
    fn from(input: &InputConfig) -> Self {
        Self {
            escape_timeout: Duration::from_millis(input.escape_timeout_ms),
            interrupt_ends_session: input.interrupt_ends_session,
            hold_keys: input.hold_keys.clone(),
            key_hold: Duration::from_millis(input.key_hold_ms),
        }
    }
}

/// Channels linking the pipeline to the rest of its session
pub struct PipelineSignals {
    /// Terminal size reported by the viewer
    pub terminal_size: watch::Sender<GridSize>,
    /// Grid the display loop is currently rendering
    pub geometry: watch::Receiver<Geometry>,
    pub close: watch::Receiver<bool>,
}

pub struct InputPipeline<R> {
    reader: R,
    decoder: InputDecoder,
    translator: InputTranslator,
    state: SessionState,
    injector: Arc<dyn InputInjector>,
    signals: PipelineSignals,
    escape_timeout: Duration,
    interrupt_ends_session: bool,
    /// When the decoder last received bytes while a sequence was open
    pending_since: Option<Instant>,
    injection_failures: u64,
}

impl<R: AsyncRead + Unpin + Send> InputPipeline<R> {
    pub fn new(
        config: PipelineConfig,
        reader: R,
        state: SessionState,
        injector: Arc<dyn InputInjector>,
        signals: PipelineSignals,
    ) -> Self {
        let holds = KeyHoldTracker::new(config.hold_keys, config.key_hold);
        Self {
            reader,
            decoder: InputDecoder::new(),
            translator: InputTranslator::new(holds),
            state,
            injector,
            signals,
            escape_timeout: config.escape_timeout,
            interrupt_ends_session: config.interrupt_ends_session,
            pending_since: None,
            injection_failures: 0,
        }
    }

    /// Process input until closed, the viewer leaves, or it interrupts
    pub async fn run(&mut self) -> PipelineOutcome {
        let outcome = self.process().await;
        self.release_held_keys().await;
        outcome
    }

    async fn process(&mut self) -> PipelineOutcome {
        let mut buf = [0u8; READ_BUFFER];

        loop {
            let deadline = self.next_deadline();

            tokio::select! {
                biased;

                _ = closed(&mut self.signals.close) => return PipelineOutcome::Closed,
                read = self.reader.read(&mut buf) => {
                    let n = match read {
                        Ok(0) => {
                            debug!(session = %self.state.id, "Viewer input closed");
                            return PipelineOutcome::ViewerGone;
                        }
                        Ok(n) => n,
                        Err(e) => {
                            debug!(session = %self.state.id, error = %e, "Viewer input failed");
                            return PipelineOutcome::ReadFailed;
                        }
                    };
                    let events = self.decoder.feed(&buf[..n]);
                    self.pending_since = self.decoder.has_pending().then(Instant::now);
                    if let Some(outcome) = self.dispatch(events).await {
                        return outcome;
                    }
                }
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    let events = self.timed_events(Instant::now());
                    if let Some(outcome) = self.dispatch(events).await {
                        return outcome;
                    }
                }
            }
        }
    }

    /// Key-ups for every hold key still down. These are the only commands
    /// sent after the close signal, so the display is never left with a key
    /// pressed.
    async fn release_held_keys(&mut self) {
        let releases = self.translator.holds_mut().release_all();
        for event in releases {
            if let Some(command) = self.translator.translate(event, &mut self.state) {
                self.inject(&command).await;
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        let escape = self.pending_since.map(|since| since + self.escape_timeout);
        let hold = self.translator.holds().next_release();
        match (escape, hold) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Events that come from time passing: a lone ESC resolving, and hold
    /// keys lapsing
    fn timed_events(&mut self, now: Instant) -> Vec<InputEvent> {
        let mut events = Vec::new();
        if let Some(since) = self.pending_since {
            if now >= since + self.escape_timeout {
                events.extend(self.decoder.flush());
                self.pending_since = None;
            }
        }
        events.extend(self.translator.holds_mut().expired(now));
        events
    }

    async fn dispatch(&mut self, events: Vec<InputEvent>) -> Option<PipelineOutcome> {
        for event in events {
            match event {
                InputEvent::Resize(size) => {
                    debug!(session = %self.state.id, columns = size.columns, rows = size.rows, "Viewer resized");
                    self.signals.terminal_size.send_replace(size);
                }
                InputEvent::Interrupt if self.interrupt_ends_session => {
                    info!(session = %self.state.id, "Viewer interrupted the session");
                    return Some(PipelineOutcome::Interrupted);
                }
                _ => {}
            }
            // Ctrl+C that does not end the session goes to the application
            let event = match event {
                InputEvent::Interrupt => {
                    InputEvent::KeyPress(KeyStroke::new(KeyCode::Char('c'), Modifiers::CTRL))
                }
                event => event,
            };

            self.state.geometry = *self.signals.geometry.borrow();
            let Some(command) = self.translator.translate(event, &mut self.state) else {
                continue;
            };

            // No new injections once the session is closing
            if *self.signals.close.borrow() {
                return Some(PipelineOutcome::Closed);
            }
            self.inject(&command).await;
        }
        None
    }

    /// A failed injection is logged and dropped; the session carries on
    async fn inject(&mut self, command: &SyntheticCommand) {
        if let Err(e) = self.injector.inject(command, &self.state.display).await {
            self.injection_failures += 1;
            warn!(
                session = %self.state.id,
                error = %e,
                failures = self.injection_failures,
                "Injection failed"
            );
        }
    }
}
