//! Service configuration: engine launch options, per-capture defaults, and
//! the idle-teardown window.

use std::time::Duration;

use crate::Viewport;

/// Default timeout for page navigation (to network-idle).
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default extra settle wait after network-idle is reached.
pub const DEFAULT_SETTLE_TIME: Duration = Duration::from_millis(500);

/// Default inactivity window after which the browser engine is torn down.
pub const DEFAULT_IDLE_WINDOW: Duration = Duration::from_secs(60);

/// Default timeout for the engine process to become ready after spawn.
pub const DEFAULT_LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default grace period for the engine to exit after a shutdown command.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// Default slack added on top of per-command deadlines for the stdio
/// round-trip to the engine helper.
pub const DEFAULT_REPLY_GRACE: Duration = Duration::from_secs(5);

/// Default JPEG quality for captured screenshots.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// Default cap on concurrently open render sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 4;

/// Options for launching and supervising the browser engine process.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// The Node.js command used to run the Playwright helper (default: "node").
    pub node_command: String,
    /// Whether the browser runs headless.
    pub headless: bool,
    /// Timeout for the engine to report readiness after spawn.
    pub launch_timeout: Duration,
    /// Grace period for a clean engine exit before it is killed.
    pub shutdown_timeout: Duration,
    /// Round-trip slack added to per-command reply deadlines.
    pub reply_grace: Duration,
    /// Full replacement for the `node -e <script>` helper invocation
    /// (program followed by its arguments). The stock invocation is used
    /// when unset.
    pub engine_command: Option<Vec<String>>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            headless: true,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            reply_grace: DEFAULT_REPLY_GRACE,
            engine_command: None,
        }
    }
}

/// Defaults applied to capture requests that omit a parameter.
#[derive(Debug, Clone)]
pub struct CaptureDefaults {
    /// Viewport used when a request specifies no dimensions.
    pub viewport: Viewport,
    /// Settle wait used when a request specifies none.
    pub settle: Duration,
    /// Hard timeout for reaching network-idle during navigation.
    pub navigation_timeout: Duration,
    /// JPEG quality for the captured image (1-100).
    pub quality: u8,
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            settle: DEFAULT_SETTLE_TIME,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

/// Top-level configuration for the screenshot service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub engine: EngineOptions,
    pub defaults: CaptureDefaults,
    /// Inactivity window before the engine process is torn down.
    pub idle_window: Duration,
    /// Maximum number of concurrently open render sessions.
    pub max_sessions: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            engine: EngineOptions::default(),
            defaults: CaptureDefaults::default(),
            idle_window: DEFAULT_IDLE_WINDOW,
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_options_default_values() {
        let opts = EngineOptions::default();
        assert_eq!(opts.node_command, "node");
        assert!(opts.headless);
        assert_eq!(opts.launch_timeout, DEFAULT_LAUNCH_TIMEOUT);
        assert!(opts.engine_command.is_none());
    }

    #[test]
    fn capture_defaults_match_contract() {
        let defaults = CaptureDefaults::default();
        assert_eq!(defaults.viewport.width, 1920);
        assert_eq!(defaults.viewport.height, 1080);
        assert_eq!(defaults.settle, Duration::from_millis(500));
        assert_eq!(defaults.navigation_timeout, Duration::from_secs(30));
        assert_eq!(defaults.quality, 90);
    }

    #[test]
    fn service_config_default_sets_idle_window() {
        let config = ServiceConfig::default();
        assert_eq!(config.idle_window, Duration::from_secs(60));
        assert_eq!(config.max_sessions, DEFAULT_MAX_SESSIONS);
    }
}
