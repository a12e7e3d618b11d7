//! Pattern backend
//!
//! An in-process display: frames are an animated gradient drawn at the
//! display's resolution, and injected input is recorded instead of replayed.
//! Useful for trying the renderer without a display server, and in tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::trace;

use super::{
    BackendError, BackendParts, CaptureError, DisplayBackend, DisplayHandle, FrameSource,
    InjectionFailed, InputInjector, SyntheticCommand,
};
use crate::core::{PixelBuffer, Rgb};

/// Commands kept per log; older ones are dropped first
const INJECTION_LOG_LIMIT: usize = 4096;

#[derive(Debug, Clone)]
struct Injected {
    display: String,
    command: SyntheticCommand,
}

/// Shared record of the most recent commands injected through a
/// `PatternBackend`
#[derive(Debug, Clone, Default)]
pub struct InjectionLog {
    entries: Arc<Mutex<VecDeque<Injected>>>,
}

impl InjectionLog {
    fn lock(&self) -> MutexGuard<'_, VecDeque<Injected>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, display: &DisplayHandle, command: &SyntheticCommand) {
        let mut entries = self.lock();
        if entries.len() == INJECTION_LOG_LIMIT {
            entries.pop_front();
        }
        entries.push_back(Injected {
            display: display.name.clone(),
            command: command.clone(),
        });
    }

    /// Commands injected on the display called `name`, in order
    pub fn for_display(&self, name: &str) -> Vec<SyntheticCommand> {
        self.lock()
            .iter()
            .filter(|entry| entry.display == name)
            .map(|entry| entry.command.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternBackend {
    log: InjectionLog,
}

impl PatternBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the injections recorded by every display this backend opens
    pub fn log(&self) -> InjectionLog {
        self.log.clone()
    }
}

impl DisplayBackend for PatternBackend {
    fn open(&self, display: &DisplayHandle) -> Result<BackendParts, BackendError> {
        let source = PatternFrameSource::new(display.width, display.height).map_err(|e| {
            BackendError::InvalidDisplay {
                display: display.name.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(BackendParts {
            source: Box::new(source),
            injector: Arc::new(PatternInjector::new(self.log.clone())),
        })
    }
}

/// Animated gradient; each capture advances one step
#[derive(Debug, Clone)]
pub struct PatternFrameSource {
    width: u32,
    height: u32,
    frame: u64,
}

impl PatternFrameSource {
    pub fn new(width: u32, height: u32) -> Result<Self, crate::core::InvalidDimensions> {
        if width == 0 || height == 0 {
            return Err(crate::core::InvalidDimensions {
                width,
                height,
                reason: "display has no pixels",
            });
        }
        Ok(Self {
            width,
            height,
            frame: 0,
        })
    }
}

impl FrameSource for PatternFrameSource {
    fn capture(&mut self) -> Result<PixelBuffer, CaptureError> {
        self.frame += 1;
        let (w, h, t) = (self.width, self.height, self.frame);
        let shift = (t * 4 % 256) as u32;
        let buffer = PixelBuffer::from_fn(w, h, |x, y| {
            Rgb::new(
                ((x * 255 / w + shift) % 256) as u8,
                (y * 255 / h) as u8,
                ((x + y + shift) % 256) as u8,
            )
        })
        .map_err(|e| CaptureError::CaptureUnavailable(e.to_string()))?;
        Ok(buffer.with_sequence(t))
    }
}

/// Records commands instead of replaying them
#[derive(Debug, Clone)]
pub struct PatternInjector {
    log: InjectionLog,
}

impl PatternInjector {
    pub fn new(log: InjectionLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl InputInjector for PatternInjector {
    async fn inject(
        &self,
        command: &SyntheticCommand,
        target: &DisplayHandle,
    ) -> Result<(), InjectionFailed> {
        trace!(display = %target.name, ?command, "Injected");
        self.log.record(target, command);
        Ok(())
    }
}
