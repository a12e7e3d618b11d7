//! Sessions
//!
//! One session per attached viewer: its display, its mouse mode, and the
//! tasks moving frames out and input in.

mod manager;
mod pipeline;
mod pool;
mod state;

pub use manager::{AttachError, Connection, Reservation, SessionInfo, SessionManager};
pub use pipeline::{InputPipeline, PipelineConfig, PipelineOutcome, PipelineSignals};
pub use pool::DisplayPool;
pub use state::{MouseMode, SessionId, SessionState};
