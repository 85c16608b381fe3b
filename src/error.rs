use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::ParseError;

/// Phase of a capture call in which a failure occurred. Carried in
/// [`PageshotError::Capture`] so callers can log where a request died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CapturePhase {
    Open,
    Configure,
    Navigate,
    Settle,
    Capture,
    Close,
}

impl std::fmt::Display for CapturePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CapturePhase::Open => "open",
            CapturePhase::Configure => "configure",
            CapturePhase::Navigate => "navigate",
            CapturePhase::Settle => "settle",
            CapturePhase::Capture => "capture",
            CapturePhase::Close => "close",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum PageshotError {
    /// The browser engine process could not be launched or did not become
    /// ready in time. The engine is left absent; the next capture retries.
    #[error("engine startup failed: {0}")]
    Startup(String),

    /// The page did not reach network-idle within the navigation timeout.
    /// Only the requesting session is affected; the engine stays usable.
    #[error("navigation to {url} did not reach network-idle within {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    /// Any other failure while driving a render session.
    #[error("capture of {url} failed during {phase}: {message}")]
    Capture {
        phase: CapturePhase,
        url: String,
        message: String,
    },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PageshotError {
    pub fn capture(
        phase: CapturePhase,
        url: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        PageshotError::Capture {
            phase,
            url: url.into(),
            message: message.into(),
        }
    }

    /// HTTP status the routing layer should map this failure to.
    pub fn status_code(&self) -> u16 {
        match self {
            PageshotError::Startup(_) => 503,
            PageshotError::NavigationTimeout { .. } => 504,
            PageshotError::BadRequest(_) | PageshotError::InvalidUrl(_) => 400,
            PageshotError::Capture { .. }
            | PageshotError::Io(_)
            | PageshotError::Serialization(_)
            | PageshotError::Config(_) => 500,
        }
    }
}

pub type Result<T> = std::result::Result<T, PageshotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_maps_to_service_unavailable() {
        let err = PageshotError::Startup("chromium executable is missing".to_string());
        assert_eq!(err.status_code(), 503);
    }

    #[test]
    fn navigation_timeout_maps_to_gateway_timeout() {
        let err = PageshotError::NavigationTimeout {
            url: "https://example.com".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(err.status_code(), 504);
        let msg = err.to_string();
        assert!(
            msg.contains("https://example.com"),
            "expected URL in message, got: {msg}"
        );
    }

    #[test]
    fn capture_error_carries_url_and_phase() {
        let err = PageshotError::capture(
            CapturePhase::Navigate,
            "https://example.com",
            "engine connection closed",
        );
        assert_eq!(err.status_code(), 500);
        let msg = err.to_string();
        assert!(msg.contains("navigate"), "expected phase, got: {msg}");
        assert!(
            msg.contains("https://example.com"),
            "expected URL, got: {msg}"
        );
    }

    #[test]
    fn invalid_input_maps_to_bad_request() {
        assert_eq!(
            PageshotError::BadRequest("missing url".to_string()).status_code(),
            400
        );
        let parse_err = url::Url::parse("not a url").unwrap_err();
        assert_eq!(PageshotError::from(parse_err).status_code(), 400);
    }
}
