//! A single-use, isolated render session.
//!
//! Each session maps to one Playwright browser context inside the engine
//! process: no cookies, storage, or history are shared with any other
//! session. A session is owned by exactly one capture call and must be
//! closed exactly once, whichever step failed.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::debug;

use crate::browser::engine::EngineConnection;
use crate::browser::helper::EngineRequest;
use crate::error::{CapturePhase, PageshotError, Result};
use crate::Viewport;

/// Engine-side budget for quick commands (open, configure, capture, close).
/// Navigation has its own caller-supplied timeout.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

pub struct RenderSession {
    conn: Arc<EngineConnection>,
    session: u64,
    url: String,
    closed: bool,
}

impl RenderSession {
    /// Acquires a fresh execution context from the engine. The URL is only
    /// recorded here for error context; navigation happens later.
    pub(crate) async fn open(conn: Arc<EngineConnection>, url: &str) -> Result<Self> {
        let request = EngineRequest::open(conn.next_request_id());
        let reply = conn
            .request(request, COMMAND_TIMEOUT)
            .await
            .map_err(|msg| PageshotError::capture(CapturePhase::Open, url, msg))?;
        if !reply.is_ok() {
            return Err(PageshotError::capture(
                CapturePhase::Open,
                url,
                reply.error_message(),
            ));
        }
        let session = reply.session.ok_or_else(|| {
            PageshotError::capture(CapturePhase::Open, url, "engine reply missing session id")
        })?;

        debug!(session, %url, "render session opened");
        Ok(Self {
            conn,
            session,
            url: url.to_string(),
            closed: false,
        })
    }

    /// Creates the session's browsing context with a fixed viewport and a
    /// device scale factor of 1.
    pub async fn configure(&self, viewport: Viewport) -> Result<()> {
        let request = EngineRequest::configure(
            self.conn.next_request_id(),
            self.session,
            viewport.width,
            viewport.height,
        );
        self.expect_ok(request, COMMAND_TIMEOUT, CapturePhase::Configure)
            .await
    }

    /// Navigates to the session URL and waits for network-idle, or fails
    /// with a typed timeout once the budget elapses.
    pub async fn navigate(&self, timeout: Duration) -> Result<()> {
        let request =
            EngineRequest::navigate(self.conn.next_request_id(), self.session, &self.url, timeout);
        match self.conn.request(request, timeout).await {
            Ok(reply) if reply.is_ok() => Ok(()),
            Ok(reply) if reply.is_timeout() => Err(PageshotError::NavigationTimeout {
                url: self.url.clone(),
                timeout,
            }),
            Ok(reply) => Err(PageshotError::capture(
                CapturePhase::Navigate,
                &self.url,
                reply.error_message(),
            )),
            Err(msg) => Err(PageshotError::capture(CapturePhase::Navigate, &self.url, msg)),
        }
    }

    /// Fixed extra wait after network-idle, for client-side rendering to
    /// finish. Not subject to early exit.
    pub async fn settle(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Captures the current viewport as JPEG bytes.
    pub async fn capture(&self, quality: u8) -> Result<Vec<u8>> {
        let request =
            EngineRequest::capture(self.conn.next_request_id(), self.session, quality);
        let reply = self
            .conn
            .request(request, COMMAND_TIMEOUT)
            .await
            .map_err(|msg| PageshotError::capture(CapturePhase::Capture, &self.url, msg))?;
        if !reply.is_ok() {
            return Err(PageshotError::capture(
                CapturePhase::Capture,
                &self.url,
                reply.error_message(),
            ));
        }
        let data = reply.data.ok_or_else(|| {
            PageshotError::capture(CapturePhase::Capture, &self.url, "engine reply missing data")
        })?;
        BASE64
            .decode(data.as_bytes())
            .map_err(|err| PageshotError::capture(CapturePhase::Capture, &self.url, err.to_string()))
    }

    /// Releases the execution context. Consumes the session; the drop
    /// backstop will not fire after this, even if the close itself failed.
    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        let request = EngineRequest::close(self.conn.next_request_id(), self.session);
        let result = self
            .expect_ok(request, COMMAND_TIMEOUT, CapturePhase::Close)
            .await;
        debug!(session = self.session, url = %self.url, "render session closed");
        result
    }

    async fn expect_ok(
        &self,
        request: EngineRequest<'_>,
        deadline: Duration,
        phase: CapturePhase,
    ) -> Result<()> {
        let reply = self
            .conn
            .request(request, deadline)
            .await
            .map_err(|msg| PageshotError::capture(phase, &self.url, msg))?;
        if reply.is_ok() {
            Ok(())
        } else {
            Err(PageshotError::capture(phase, &self.url, reply.error_message()))
        }
    }
}

impl Drop for RenderSession {
    fn drop(&mut self) {
        // The orchestrator closes sessions explicitly on every path; this
        // only covers a capture future dropped mid-flight (client gone).
        if self.closed || !self.conn.is_alive() {
            return;
        }
        let conn = Arc::clone(&self.conn);
        let session = self.session;
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let request = EngineRequest::close(conn.next_request_id(), session);
                let _ = conn.request(request, COMMAND_TIMEOUT).await;
            });
        }
    }
}
