//! Browser engine lifecycle management.
//!
//! This module owns the single external browser process and hands out
//! isolated render sessions to capture calls.
//!
//! # Module Structure
//!
//! - [`engine`] - the process handle: lazy launch, serialized startup,
//!   idle-gated teardown, stdio multiplexing
//! - [`session`] - per-request isolated render sessions
//! - `helper` - the embedded Playwright helper script and wire format

mod engine;
mod helper;
mod session;

pub use engine::{ActivityGuard, Engine, EnginePhase};
pub use session::RenderSession;
