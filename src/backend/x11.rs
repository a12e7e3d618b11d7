//! X11 backend
//!
//! Frames come from `ffmpeg -f x11grab` writing raw rgb24 to a pipe; a reader
//! thread keeps only the newest complete frame. Input is replayed with
//! `xdotool` against the same display.

use std::io::{self, Read};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::keysym::keysym_name;
use super::{
    BackendError, BackendParts, CaptureError, DisplayBackend, DisplayHandle, FrameSource,
    InjectionFailed, InputInjector, SyntheticCommand,
};
use crate::core::PixelBuffer;
use crate::input::KeyCode;

/// Opens `X11FrameSource`s and `XdotoolInjector`s
#[derive(Debug, Clone)]
pub struct X11Backend {
    ffmpeg: String,
    xdotool: String,
    capture_fps: u32,
}

impl X11Backend {
    pub fn new(ffmpeg: impl Into<String>, xdotool: impl Into<String>, capture_fps: u32) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            xdotool: xdotool.into(),
            capture_fps,
        }
    }
}

impl DisplayBackend for X11Backend {
    fn open(&self, display: &DisplayHandle) -> Result<BackendParts, BackendError> {
        let source = X11FrameSource::spawn(&self.ffmpeg, display, self.capture_fps)?;
        Ok(BackendParts {
            source: Box::new(source),
            injector: Arc::new(XdotoolInjector::new(self.xdotool.clone())),
        })
    }
}

/// State shared between the source and its reader thread
#[derive(Debug, Default)]
struct CaptureSlot {
    latest: Mutex<Option<PixelBuffer>>,
    alive: AtomicBool,
}

impl CaptureSlot {
    fn latest(&self) -> MutexGuard<'_, Option<PixelBuffer>> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Frame source backed by an `ffmpeg` child process
#[derive(Debug)]
pub struct X11FrameSource {
    display: String,
    child: Child,
    slot: Arc<CaptureSlot>,
}

impl X11FrameSource {
    /// Start capturing `display` at `fps` frames per second
    pub fn spawn(program: &str, display: &DisplayHandle, fps: u32) -> Result<Self, BackendError> {
        if display.width == 0 || display.height == 0 {
            return Err(BackendError::InvalidDisplay {
                display: display.name.clone(),
                reason: format!("resolution {}x{} is empty", display.width, display.height),
            });
        }

        let spawn_error = |source: io::Error| BackendError::Spawn {
            program: program.to_string(),
            display: display.name.clone(),
            source,
        };

        let mut child = Command::new(program)
            .args(ffmpeg_args(display, fps))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(spawn_error)?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            return Err(spawn_error(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "ffmpeg stdout not captured",
            )));
        };

        let slot = Arc::new(CaptureSlot::default());
        slot.alive.store(true, Ordering::SeqCst);

        let (width, height) = (display.width, display.height);
        let reader_slot = Arc::clone(&slot);
        let spawned = thread::Builder::new()
            .name(format!("capture{}", display.name))
            .spawn(move || read_frames(stdout, width, height, &reader_slot));
        if let Err(e) = spawned {
            let _ = child.kill();
            let _ = child.wait();
            return Err(spawn_error(e));
        }

        let source = Self {
            display: display.name.clone(),
            child,
            slot,
        };
        info!(display = %source.display, pid = source.child.id(), "Started frame capture");
        Ok(source)
    }
}

impl FrameSource for X11FrameSource {
    fn capture(&mut self) -> Result<PixelBuffer, CaptureError> {
        if !self.slot.alive.load(Ordering::SeqCst) {
            return Err(CaptureError::CaptureUnavailable(format!(
                "capture process for {} exited",
                self.display
            )));
        }
        self.slot.latest().clone().ok_or_else(|| {
            CaptureError::CaptureUnavailable(format!("no frame from {} yet", self.display))
        })
    }
}

impl Drop for X11FrameSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!(display = %self.display, "Stopped frame capture");
    }
}

/// Command line for capturing `display` as raw rgb24 on stdout
pub fn ffmpeg_args(display: &DisplayHandle, fps: u32) -> Vec<String> {
    [
        "-loglevel",
        "quiet",
        "-f",
        "x11grab",
        "-framerate",
        &fps.max(1).to_string(),
        "-video_size",
        &format!("{}x{}", display.width, display.height),
        "-i",
        &display.name,
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
        "pipe:",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Read whole frames until the stream ends, overwriting the slot each time
fn read_frames(mut stream: impl Read, width: u32, height: u32, slot: &CaptureSlot) {
    let frame_len = width as usize * height as usize * 3;
    let mut sequence = 0u64;

    loop {
        let mut data = vec![0u8; frame_len];
        if let Err(e) = stream.read_exact(&mut data) {
            debug!(error = %e, frames = sequence, "Capture stream ended");
            break;
        }
        sequence += 1;
        match PixelBuffer::new(width, height, data) {
            Ok(buffer) => *slot.latest() = Some(buffer.with_sequence(sequence)),
            Err(e) => {
                warn!(error = %e, "Dropping capture stream");
                break;
            }
        }
    }

    slot.alive.store(false, Ordering::SeqCst);
}

/// Injector that shells out to `xdotool`
#[derive(Debug, Clone)]
pub struct XdotoolInjector {
    program: String,
}

impl XdotoolInjector {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl InputInjector for XdotoolInjector {
    async fn inject(
        &self,
        command: &SyntheticCommand,
        display: &DisplayHandle,
    ) -> Result<(), InjectionFailed> {
        let args =
            xdotool_args(command).ok_or_else(|| InjectionFailed::Unsupported(command.clone()))?;

        let status = tokio::process::Command::new(&self.program)
            .args(&args)
            .env("DISPLAY", &display.name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|source| InjectionFailed::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(InjectionFailed::Exit {
                program: self.program.clone(),
                status,
            })
        }
    }
}

/// `xdotool` arguments for a command, or `None` if it cannot be expressed
pub fn xdotool_args(command: &SyntheticCommand) -> Option<Vec<String>> {
    let args = match command {
        SyntheticCommand::MoveAbsolute { x, y } => {
            vec!["mousemove".into(), x.to_string(), y.to_string()]
        }
        SyntheticCommand::MoveRelative { dx, dy } => vec![
            "mousemove_relative".into(),
            "--".into(),
            dx.to_string(),
            dy.to_string(),
        ],
        SyntheticCommand::ButtonDown(button) => {
            vec!["mousedown".into(), button.x11_number().to_string()]
        }
        SyntheticCommand::ButtonUp(button) => {
            vec!["mouseup".into(), button.x11_number().to_string()]
        }
        SyntheticCommand::Scroll(0) => return None,
        SyntheticCommand::Scroll(amount) => {
            let wheel = if *amount > 0 { "4" } else { "5" };
            vec![
                "click".into(),
                "--repeat".into(),
                amount.unsigned_abs().to_string(),
                wheel.into(),
            ]
        }
        SyntheticCommand::KeyDown(stroke) => vec!["keydown".into(), keysym_name(stroke)?],
        SyntheticCommand::KeyUp(stroke) => vec!["keyup".into(), keysym_name(stroke)?],
        SyntheticCommand::KeyTap(stroke) => match keysym_name(stroke) {
            Some(name) => vec!["key".into(), name],
            None => match &stroke.key {
                KeyCode::Unknown(bytes) => {
                    let text = std::str::from_utf8(bytes).ok()?;
                    vec!["type".into(), "--".into(), text.to_string()]
                }
                _ => return None,
            },
        },
    };
    Some(args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeyStroke, MouseButton};

    fn args(command: SyntheticCommand) -> Option<Vec<String>> {
        xdotool_args(&command)
    }

    fn strings(items: &[&str]) -> Option<Vec<String>> {
        Some(items.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn test_pointer_commands() {
        assert_eq!(
            args(SyntheticCommand::MoveAbsolute { x: 640, y: 360 }),
            strings(&["mousemove", "640", "360"])
        );
        assert_eq!(
            args(SyntheticCommand::MoveRelative { dx: -5, dy: 10 }),
            strings(&["mousemove_relative", "--", "-5", "10"])
        );
        assert_eq!(
            args(SyntheticCommand::ButtonDown(MouseButton::Right)),
            strings(&["mousedown", "3"])
        );
        assert_eq!(
            args(SyntheticCommand::Scroll(-2)),
            strings(&["click", "--repeat", "2", "5"])
        );
        assert_eq!(args(SyntheticCommand::Scroll(0)), None);
    }

    #[test]
    fn test_key_commands() {
        assert_eq!(
            args(SyntheticCommand::KeyDown(KeyStroke::char('w'))),
            strings(&["keydown", "w"])
        );
        assert_eq!(
            args(SyntheticCommand::KeyTap(KeyStroke::plain(KeyCode::Enter))),
            strings(&["key", "Return"])
        );
        assert_eq!(
            args(SyntheticCommand::KeyTap(KeyStroke::plain(KeyCode::Unknown(b"\x1b[99~".to_vec())))),
            strings(&["type", "--", "\x1b[99~"])
        );
        assert_eq!(
            args(SyntheticCommand::KeyTap(KeyStroke::plain(KeyCode::Unknown(vec![0xff])))),
            None
        );
    }

    #[test]
    fn test_ffmpeg_args() {
        let display = DisplayHandle::new(":3", 640, 480);
        let args = ffmpeg_args(&display, 30);
        let joined = args.join(" ");
        assert!(joined.contains("-f x11grab -framerate 30 -video_size 640x480 -i :3"));
        assert!(joined.ends_with("-pix_fmt rgb24 pipe:"));
    }

    #[test]
    fn test_reader_keeps_latest_frame() {
        let mut stream = vec![1u8; 12];
        stream.extend(vec![2u8; 12]);
        // trailing partial frame is ignored
        stream.extend(vec![3u8; 5]);

        let slot = CaptureSlot::default();
        slot.alive.store(true, Ordering::SeqCst);
        read_frames(io::Cursor::new(stream), 2, 2, &slot);

        let latest = slot.latest().clone().unwrap();
        assert_eq!(latest.sequence(), 2);
        assert_eq!(latest.as_bytes(), &[2u8; 12][..]);
        assert!(!slot.alive.load(Ordering::SeqCst));
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let display = DisplayHandle::new(":9", 64, 48);
        let err = X11FrameSource::spawn("/nonexistent/ffmpeg", &display, 30).unwrap_err();
        assert!(matches!(err, BackendError::Spawn { .. }));

        let empty = DisplayHandle::new(":9", 0, 48);
        assert!(matches!(
            X11FrameSource::spawn("ffmpeg", &empty, 30),
            Err(BackendError::InvalidDisplay { .. })
        ));
    }
}
