//! The capture orchestrator: the public entry point that coordinates the
//! idle timer, the engine handle, and per-request render sessions.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::browser::{Engine, EnginePhase, RenderSession};
use crate::config::{CaptureDefaults, ServiceConfig};
use crate::error::{PageshotError, Result};
use crate::formatting::format_duration;
use crate::idle::IdleTimer;
use crate::Viewport;

/// MIME type of captured images.
pub const IMAGE_CONTENT_TYPE: &str = "image/jpeg";

/// One capture request. Omitted fields fall back to the service defaults.
#[derive(Debug, Clone)]
pub struct CaptureRequest {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub settle: Option<Duration>,
}

impl CaptureRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            width: None,
            height: None,
            settle: None,
        }
    }
}

/// A successfully captured screenshot.
#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub bytes: Vec<u8>,
    pub viewport: Viewport,
    pub elapsed: Duration,
}

/// Renders web pages to images on demand, lazily starting the browser
/// engine and tearing it down after an idle window.
pub struct ScreenshotService {
    engine: Arc<Engine>,
    idle: IdleTimer,
    limiter: Semaphore,
    defaults: CaptureDefaults,
}

impl ScreenshotService {
    pub fn new(config: ServiceConfig) -> Arc<Self> {
        let engine = Arc::new(Engine::new(config.engine));
        let window = config.idle_window;
        let idle = IdleTimer::spawn(window, {
            let engine = Arc::clone(&engine);
            move || {
                let engine = Arc::clone(&engine);
                async move {
                    engine.shutdown_if_idle(window).await;
                }
            }
        });

        Arc::new(Self {
            engine,
            idle,
            limiter: Semaphore::new(config.max_sessions.max(1)),
            defaults: config.defaults,
        })
    }

    /// Current liveness of the engine process handle.
    pub fn engine_phase(&self) -> EnginePhase {
        self.engine.phase()
    }

    /// Captures `request.url` at the requested (or default) viewport and
    /// returns the encoded image bytes.
    ///
    /// The session opened for this call is closed on every path, and the
    /// idle countdown is re-armed on entry and on exit whatever the
    /// outcome.
    pub async fn capture(&self, request: CaptureRequest) -> Result<CaptureResult> {
        let viewport = Viewport {
            width: request.width.unwrap_or(self.defaults.viewport.width),
            height: request.height.unwrap_or(self.defaults.viewport.height),
        };
        let settle = request.settle.unwrap_or(self.defaults.settle);
        let url = request.url;

        self.mark_activity();
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|_| PageshotError::Config("screenshot service is shut down".to_string()))?;
        let _activity = self.engine.begin_activity();

        let started = Instant::now();
        info!(
            %url,
            %viewport,
            settle_ms = settle.as_millis() as u64,
            "generating screenshot"
        );

        let conn = self.engine.connection().await?;
        let session = RenderSession::open(conn, &url).await?;

        let outcome = self.run_session(&session, viewport, settle).await;
        let close_result = session.close().await;
        self.mark_activity();

        match (outcome, close_result) {
            (Ok(bytes), Ok(())) => {
                info!(
                    %url,
                    bytes = bytes.len(),
                    elapsed = %format_duration(started.elapsed()),
                    "generated screenshot"
                );
                Ok(CaptureResult {
                    bytes,
                    viewport,
                    elapsed: started.elapsed(),
                })
            }
            (Ok(_), Err(close_err)) => {
                warn!(%url, error = %close_err, "screenshot discarded; session close failed");
                Err(close_err)
            }
            (Err(err), close_result) => {
                if let Err(close_err) = close_result {
                    warn!(%url, error = %close_err, "render session close failed");
                }
                warn!(%url, error = %err, "screenshot generation failed");
                Err(err)
            }
        }
    }

    async fn run_session(
        &self,
        session: &RenderSession,
        viewport: Viewport,
        settle: Duration,
    ) -> Result<Vec<u8>> {
        session.configure(viewport).await?;
        session.navigate(self.defaults.navigation_timeout).await?;
        session.settle(settle).await;
        session.capture(self.defaults.quality).await
    }

    /// Records activity for the idle-teardown gate and re-arms the timer.
    /// The clock is touched first so a countdown firing at the exact
    /// deadline still observes the activity.
    fn mark_activity(&self) {
        self.engine.touch();
        self.idle.reset();
    }

    /// Tears down the engine if running. Called on service shutdown.
    pub async fn shutdown(&self) {
        self.engine.shutdown().await;
    }
}
