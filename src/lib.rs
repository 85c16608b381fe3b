//! pageshot
//!
//! An on-demand web page screenshot service. The interesting part is not
//! the HTTP routing or image encoding but the lifecycle of the one
//! expensive external resource: a headless browser process that is
//! launched lazily on the first capture, shared by concurrent requests
//! through isolated render sessions, and torn down after an idle window.
//!
//! # Module Overview
//!
//! - [`browser`] - engine process handle and per-request render sessions
//! - [`service`] - the capture orchestrator (public entry point)
//! - [`idle`] - the re-armable idle countdown
//! - [`server`] - the HTTP routing collaborator
//! - [`config`] - options structs and defaults
//! - [`error`] - failure taxonomy
//!
//! # Example
//!
//! ```no_run
//! use pageshot::{CaptureRequest, ScreenshotService, ServiceConfig};
//!
//! # async fn example() -> pageshot::Result<()> {
//! let service = ScreenshotService::new(ServiceConfig::default());
//! let result = service
//!     .capture(CaptureRequest::new("https://example.com"))
//!     .await?;
//! println!("captured {} bytes at {}", result.bytes.len(), result.viewport);
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod error;
pub mod formatting;
pub mod idle;
pub mod server;
pub mod service;
pub mod viewport;

pub use browser::{Engine, EnginePhase, RenderSession};
pub use config::{
    CaptureDefaults, EngineOptions, ServiceConfig, DEFAULT_IDLE_WINDOW, DEFAULT_JPEG_QUALITY,
    DEFAULT_MAX_SESSIONS, DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_SETTLE_TIME,
};
pub use error::{CapturePhase, PageshotError, Result};
pub use idle::IdleTimer;
pub use server::router;
pub use service::{CaptureRequest, CaptureResult, ScreenshotService, IMAGE_CONTENT_TYPE};
pub use viewport::Viewport;
